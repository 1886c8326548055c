// Globals table: open addressing with linear probing.
//
// Capacity is always a power of two and grows at 0.75 load. Deleted slots
// become tombstones so probe chains stay intact; a tombstone is a None key
// carrying Integer(1), an empty slot a None key carrying Integer(0). The
// sentinel value is only meaningful under a None key, so Integer(0) remains
// a perfectly storable user value.
//
// Keys are hashed strings compared hash-first, bytes second. Troll
// expressions hold a handful of globals at most, so there is no interning.

use crate::object::StrObj;
use crate::value::Value;
use std::rc::Rc;

const MAX_LOAD: f64 = 0.75;

#[derive(Clone)]
struct Entry {
    key: Option<Rc<StrObj>>,
    value: Value,
}

impl Entry {
    fn empty() -> Entry {
        Entry {
            key: None,
            value: Value::Integer(0),
        }
    }

    fn is_empty_slot(&self) -> bool {
        self.key.is_none() && matches!(self.value, Value::Integer(0))
    }
}

pub struct Table {
    count: usize, // live entries plus tombstones
    entries: Vec<Entry>,
}

impl Table {
    pub fn new() -> Table {
        Table {
            count: 0,
            entries: Vec::new(),
        }
    }

    pub fn get(&self, key: &StrObj) -> Option<Value> {
        if self.count == 0 {
            return None;
        }
        let entry = &self.entries[find_entry(&self.entries, key)];
        if entry.key.is_none() {
            return None;
        }
        Some(entry.value.clone())
    }

    /// Returns true when the key was not present before.
    pub fn set(&mut self, key: Rc<StrObj>, value: Value) -> bool {
        if (self.count + 1) as f64 > self.entries.len() as f64 * MAX_LOAD {
            self.grow();
        }

        let index = find_entry(&self.entries, &key);
        let entry = &mut self.entries[index];
        let is_new_key = entry.key.is_none();
        // A reused tombstone was already counted.
        if entry.is_empty_slot() {
            self.count += 1;
        }
        entry.key = Some(key);
        entry.value = value;
        is_new_key
    }

    pub fn delete(&mut self, key: &StrObj) -> bool {
        if self.count == 0 {
            return false;
        }
        let index = find_entry(&self.entries, key);
        let entry = &mut self.entries[index];
        if entry.key.is_none() {
            return false;
        }
        entry.key = None;
        entry.value = Value::Integer(1);
        true
    }

    fn grow(&mut self) {
        let capacity = if self.entries.len() < 8 {
            8
        } else {
            self.entries.len() * 2
        };

        let old = std::mem::replace(&mut self.entries, vec![Entry::empty(); capacity]);
        // Tombstones are dropped on the way over, so recount.
        self.count = 0;
        for entry in old {
            if let Some(key) = entry.key {
                let dest = find_entry(&self.entries, &key);
                self.entries[dest] = Entry {
                    key: Some(key),
                    value: entry.value,
                };
                self.count += 1;
            }
        }
    }
}

impl Default for Table {
    fn default() -> Table {
        Table::new()
    }
}

// Index of the entry for `key`: its current slot if present, otherwise the
// first tombstone on its probe chain (or the chain's empty slot). The load
// factor guarantees an empty slot exists, so the probe terminates.
fn find_entry(entries: &[Entry], key: &StrObj) -> usize {
    let capacity = entries.len();
    let mut index = key.hash as usize % capacity;
    let mut tombstone: Option<usize> = None;

    loop {
        let entry = &entries[index];
        match &entry.key {
            None => {
                if entry.is_empty_slot() {
                    return tombstone.unwrap_or(index);
                }
                if tombstone.is_none() {
                    tombstone = Some(index);
                }
            }
            Some(existing) => {
                if existing.as_ref() == key {
                    return index;
                }
            }
        }
        index = (index + 1) % capacity;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> Rc<StrObj> {
        Rc::new(StrObj::new(name))
    }

    #[test]
    fn test_set_then_get() {
        let mut table = Table::new();
        assert!(table.set(key("x"), Value::Integer(42)));
        match table.get(&key("x")) {
            Some(Value::Integer(42)) => (),
            other => panic!("unexpected lookup result: {:?}", other),
        }
        assert!(table.get(&key("y")).is_none());
    }

    #[test]
    fn test_overwrite_is_not_a_new_key() {
        let mut table = Table::new();
        assert!(table.set(key("x"), Value::Integer(1)));
        assert!(!table.set(key("x"), Value::Integer(2)));
        match table.get(&key("x")) {
            Some(Value::Integer(2)) => (),
            other => panic!("unexpected lookup result: {:?}", other),
        }
    }

    #[test]
    fn test_integer_zero_is_a_real_value() {
        // The empty-slot sentinel must not shadow a stored Integer(0).
        let mut table = Table::new();
        table.set(key("zero"), Value::Integer(0));
        assert!(matches!(table.get(&key("zero")), Some(Value::Integer(0))));
    }

    #[test]
    fn test_delete_leaves_probe_chains_intact() {
        let mut table = Table::new();
        // Enough keys to force collisions in an 8-slot table.
        for i in 0..6 {
            table.set(key(&format!("k{}", i)), Value::Integer(i));
        }
        assert!(table.delete(&key("k2")));
        assert!(!table.delete(&key("k2")));
        assert!(table.get(&key("k2")).is_none());
        for &i in &[0, 1, 3, 4, 5] {
            assert!(table.get(&key(&format!("k{}", i))).is_some(), "k{} lost", i);
        }
        // The tombstone slot is reusable.
        table.set(key("k2"), Value::Integer(99));
        assert!(matches!(table.get(&key("k2")), Some(Value::Integer(99))));
    }

    #[test]
    fn test_growth_preserves_entries() {
        let mut table = Table::new();
        for i in 0..100 {
            table.set(key(&format!("name{}", i)), Value::Integer(i));
        }
        for i in 0..100 {
            match table.get(&key(&format!("name{}", i))) {
                Some(Value::Integer(n)) => assert_eq!(n, i),
                other => panic!("name{} lookup failed: {:?}", i, other),
            }
        }
    }
}
