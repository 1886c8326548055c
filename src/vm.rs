// (C) 2020 Brandon Lewis
//
// A stack machine for compiled Troll chunks.
//
// *Execution model*
//
// The VM walks a chunk's byte array with an instruction pointer,
// manipulating a bounded operand stack of tagged values until OP_RETURN
// pops the final result or an instruction fails. There is no control flow
// in the instruction set, so a run is a straight line through the chunk.
//
// *Truth*
//
// The language has no boolean type. Relational operators (and '?') push
// Integer(1) for truth and the empty collection for falsity; operators
// that consume a truth value treat the empty collection as false and
// everything else, Integer(0) included, as true.
//
// *Errors*
//
// The Error enum covers every way an instruction can fail. All are
// non-recoverable: the stack is reset, the failure is reported to stderr
// with the source line of the offending instruction, and the caller gets
// the error back.
//
// *Randomness*
//
// Dice are the only source of non-determinism and arrive through the
// Roller trait, so a run can be replayed against a seeded (or scripted)
// roller.

use crate::chunk::{Chunk, OpCode};
use crate::object::{find_first, member, StrObj};
use crate::table::Table;
use crate::value::{TypeSet, TypeTag, Value};
use enumflags2::BitFlags;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::rc::Rc;

pub const STACK_MAX: usize = 256;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    Overflow,
    Underflow,
    IllegalOpcode(u8),
    Truncated,
    BadConstant(u8),
    TypeError { expect: TypeSet, got: TypeTag },
    DieRange,
    PickCount,
    EmptyCollection(&'static str),
    DivideByZero,
    QuestionDomain,
    UndefinedGlobal(String),
}

fn type_name(tag: TypeTag) -> &'static str {
    match tag {
        TypeTag::Integer => "an integer",
        TypeTag::Real => "a real",
        TypeTag::Collection => "a collection",
        TypeTag::Pair => "a pair",
        TypeTag::Str => "a string",
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Overflow => write!(f, "Stack overflow."),
            Error::Underflow => write!(f, "Stack underflow."),
            Error::IllegalOpcode(byte) => write!(f, "Unknown opcode {}.", byte),
            Error::Truncated => write!(f, "Unexpected end of bytecode."),
            Error::BadConstant(index) => write!(f, "Constant index {} out of range.", index),
            Error::TypeError { expect, got } => {
                write!(f, "Expected ")?;
                let mut first = true;
                for &tag in &[
                    TypeTag::Integer,
                    TypeTag::Real,
                    TypeTag::Collection,
                    TypeTag::Pair,
                    TypeTag::Str,
                ] {
                    if !expect.contains(tag) {
                        continue;
                    }
                    if !first {
                        write!(f, " or ")?;
                    }
                    write!(f, "{}", type_name(tag))?;
                    first = false;
                }
                write!(f, " operand, got {}.", type_name(*got))
            }
            Error::DieRange => write!(f, "Die operand must be a positive integer."),
            Error::PickCount => write!(f, "Operand to 'pick' must be a positive integer."),
            Error::EmptyCollection(op) => {
                write!(f, "Operand to '{}' must be a non-empty collection.", op)
            }
            Error::DivideByZero => write!(f, "Division by zero."),
            Error::QuestionDomain => write!(f, "Probability must lie in (0, 1)."),
            Error::UndefinedGlobal(name) => write!(f, "Undefined variable '{}'.", name),
        }
    }
}

fn expected(expect: TypeSet, got: &Value) -> Error {
    Error::TypeError {
        expect,
        got: got.get_type(),
    }
}

// Platform randomness, abstracted so tests can script the draws.
pub trait Roller {
    /// Uniform integer in [0, upper).
    fn randomi(&mut self, upper: i32) -> i32;
    /// Uniform real in [0, 1).
    fn uniform(&mut self) -> f64;
}

pub struct Dice {
    rng: StdRng,
}

impl Dice {
    pub fn new() -> Dice {
        Dice {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic roller for reproducible runs.
    pub fn seeded(seed: u64) -> Dice {
        Dice {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Roller for Dice {
    fn randomi(&mut self, upper: i32) -> i32 {
        self.rng.gen_range(0..upper)
    }

    fn uniform(&mut self) -> f64 {
        self.rng.gen()
    }
}

enum ControlFlow {
    Advance,
    Return(Value),
}

pub struct VM {
    stack: Vec<Value>,
    globals: Table,
    ip: usize,
}

impl VM {
    pub fn new() -> VM {
        VM {
            stack: Vec::with_capacity(STACK_MAX),
            globals: Table::new(),
            ip: 0,
        }
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Run a chunk to its OP_RETURN and hand back the result value.
    ///
    /// On a runtime error the stack is reset and the error is reported to
    /// stderr as "<msg>" / "[line N] in script".
    pub fn interpret(&mut self, chunk: &Chunk, dice: &mut dyn Roller) -> Result<Value> {
        self.ip = 0;
        self.stack.clear();

        loop {
            let offset = self.ip;
            match self.step(chunk, dice) {
                Ok(ControlFlow::Advance) => (),
                Ok(ControlFlow::Return(value)) => return Ok(value),
                Err(e) => {
                    eprintln!("{}", e);
                    let line = chunk.lines.get(offset).cloned().unwrap_or(-1);
                    eprintln!("[line {}] in script", line);
                    self.stack.clear();
                    return Err(e);
                }
            }
        }
    }

    fn step(&mut self, chunk: &Chunk, dice: &mut dyn Roller) -> Result<ControlFlow> {
        let byte = self.read_byte(chunk)?;
        let op = OpCode::from_byte(byte).ok_or(Error::IllegalOpcode(byte))?;

        trace!("{:04} {:?} {:?}", self.ip - 1, op, self.stack);

        self.dispatch(op, chunk, dice)
    }

    fn dispatch(
        &mut self,
        op: OpCode,
        chunk: &Chunk,
        dice: &mut dyn Roller,
    ) -> Result<ControlFlow> {
        use OpCode::*;
        match op {
            Constant => self.constant(chunk),
            Return => Ok(ControlFlow::Return(self.pop()?)),

            Add | Subtract | Multiply | Divide | Mod => self.binary_int(op),
            Negate => {
                let a = self.pop_integer()?;
                self.yield_value(Value::Integer(a.wrapping_neg()))
            }
            Sgn => {
                let a = self.pop_integer()?;
                self.yield_value(Value::Integer(a.signum()))
            }

            Eq | Neq | Lt | Gt | Le | Ge => self.relational(op),

            Die => {
                let sides = self.pop_die_operand()?;
                self.yield_value(Value::Integer(dice.randomi(sides) + 1))
            }
            ZeroDie => {
                let sides = self.pop_die_operand()?;
                self.yield_value(Value::Integer(dice.randomi(sides + 1)))
            }
            MDie => self.multi_die(dice, false),
            MZDie => self.multi_die(dice, true),
            Question => self.question(dice),

            MkCollection => self.yield_value(Value::empty_collection()),
            Add2Collection => self.add_to_collection(chunk),
            Union => self.union(),
            And => self.and(),
            SetMinus => self.set_minus(),
            Drop => self.sift(false),
            Keep => self.sift(true),
            Pick => self.pick(dice),
            Choose => self.choose(dice),
            Largest => self.select(true),
            Least => self.select(false),
            Count => {
                let c = self.pop_collection()?;
                self.yield_value(Value::Integer(c.len() as i32))
            }
            Sum => {
                let c = self.pop_collection()?;
                let total = c.iter().fold(0i32, |acc, &x| acc.wrapping_add(x));
                self.yield_value(Value::Integer(total))
            }
            Max => self.extremum(true),
            Min => self.extremum(false),
            Maximal => self.extremal_set(true),
            Minimal => self.extremal_set(false),
            Median => self.median(),
            Different => self.different(),
            Not => {
                let v = self.pop()?;
                self.yield_value(bool_value(!v.is_truthy()))
            }
            Range => self.range(),

            MkPair => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.yield_value(Value::pair(a, b))
            }
            First => {
                let p = self.pop_pair()?;
                self.yield_value(p.0.clone())
            }
            Second => {
                let p = self.pop_pair()?;
                self.yield_value(p.1.clone())
            }

            HConc | VConcL | VConcR | VConcC => self.concat(),

            DefineGlobal => self.define_global(chunk),
            GetGlobal => self.get_global(chunk),
        }
    }

    // Stack primitives.

    fn push(&mut self, value: Value) -> Result<()> {
        if self.stack.len() == STACK_MAX {
            return Err(Error::Overflow);
        }
        self.stack.push(value);
        Ok(())
    }

    fn yield_value(&mut self, value: Value) -> Result<ControlFlow> {
        self.push(value)?;
        Ok(ControlFlow::Advance)
    }

    fn pop(&mut self) -> Result<Value> {
        self.stack.pop().ok_or(Error::Underflow)
    }

    fn pop_integer(&mut self) -> Result<i32> {
        match self.pop()? {
            Value::Integer(n) => Ok(n),
            v => Err(expected(BitFlags::from_flag(TypeTag::Integer), &v)),
        }
    }

    fn pop_collection(&mut self) -> Result<Rc<Vec<i32>>> {
        match self.pop()? {
            Value::Collection(c) => Ok(c),
            v => Err(expected(BitFlags::from_flag(TypeTag::Collection), &v)),
        }
    }

    fn pop_pair(&mut self) -> Result<Rc<(Value, Value)>> {
        match self.pop()? {
            Value::Pair(p) => Ok(p),
            v => Err(expected(BitFlags::from_flag(TypeTag::Pair), &v)),
        }
    }

    fn pop_string(&mut self) -> Result<Rc<StrObj>> {
        match self.pop()? {
            Value::Str(s) => Ok(s),
            v => Err(expected(BitFlags::from_flag(TypeTag::Str), &v)),
        }
    }

    fn pop_die_operand(&mut self) -> Result<i32> {
        match self.pop()? {
            Value::Integer(n) if n > 0 => Ok(n),
            _ => Err(Error::DieRange),
        }
    }

    fn read_byte(&mut self, chunk: &Chunk) -> Result<u8> {
        let byte = chunk.code.get(self.ip).cloned().ok_or(Error::Truncated)?;
        self.ip += 1;
        Ok(byte)
    }

    // Opcode implementations.

    fn constant(&mut self, chunk: &Chunk) -> Result<ControlFlow> {
        let index = self.read_byte(chunk)?;
        let value = chunk
            .constants
            .get(index as usize)
            .cloned()
            .ok_or(Error::BadConstant(index))?;
        self.yield_value(value)
    }

    fn binary_int(&mut self, op: OpCode) -> Result<ControlFlow> {
        let b = self.pop_integer()?;
        let a = self.pop_integer()?;
        let value = match op {
            OpCode::Add => a.wrapping_add(b),
            OpCode::Subtract => a.wrapping_sub(b),
            OpCode::Multiply => a.wrapping_mul(b),
            OpCode::Divide => {
                if b == 0 {
                    return Err(Error::DivideByZero);
                }
                a.wrapping_div(b)
            }
            OpCode::Mod => {
                if b == 0 {
                    return Err(Error::DivideByZero);
                }
                a.wrapping_rem(b)
            }
            _ => unreachable!("not a binary integer opcode"),
        };
        self.yield_value(Value::Integer(value))
    }

    fn relational(&mut self, op: OpCode) -> Result<ControlFlow> {
        let b = self.pop()?;
        let a = self.pop()?;
        let truth = match op {
            OpCode::Eq => a.equals(&b),
            OpCode::Neq => !a.equals(&b),
            _ => {
                let x = integer_operand(a)?;
                let y = integer_operand(b)?;
                match op {
                    OpCode::Lt => x < y,
                    OpCode::Gt => x > y,
                    OpCode::Le => x <= y,
                    OpCode::Ge => x >= y,
                    _ => unreachable!("not a relational opcode"),
                }
            }
        };
        self.yield_value(bool_value(truth))
    }

    fn multi_die(&mut self, dice: &mut dyn Roller, zero_based: bool) -> Result<ControlFlow> {
        let sides = self.pop_die_operand()?;
        let count = self.pop_die_operand()?;
        let rolls = (0..count)
            .map(|_| {
                if zero_based {
                    dice.randomi(sides + 1)
                } else {
                    dice.randomi(sides) + 1
                }
            })
            .collect();
        self.yield_value(Value::collection(rolls))
    }

    fn question(&mut self, dice: &mut dyn Roller) -> Result<ControlFlow> {
        let p = match self.pop()? {
            Value::Real(p) => p,
            v => return Err(expected(BitFlags::from_flag(TypeTag::Real), &v)),
        };
        if p <= 0.0 || p >= 1.0 {
            return Err(Error::QuestionDomain);
        }
        self.yield_value(bool_value(dice.uniform() < p))
    }

    fn add_to_collection(&mut self, chunk: &Chunk) -> Result<ControlFlow> {
        let count = self.read_byte(chunk)? as usize;
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(self.pop_integer()?);
        }
        // Popping reversed the elements; restore source order so that
        // first-occurrence operators see the program text's order.
        items.reverse();
        let mut c = self.pop_collection()?;
        Rc::make_mut(&mut c).extend(items);
        self.yield_value(Value::Collection(c))
    }

    fn union(&mut self) -> Result<ControlFlow> {
        let b = self.pop_collection()?;
        let a = self.pop_collection()?;
        let mut out = (*a).clone();
        out.extend(b.iter().copied());
        self.yield_value(Value::collection(out))
    }

    fn and(&mut self) -> Result<ControlFlow> {
        let b = self.pop()?;
        let a = self.pop()?;
        if b.is_truthy() {
            self.yield_value(a)
        } else {
            self.yield_value(Value::empty_collection())
        }
    }

    fn set_minus(&mut self) -> Result<ControlFlow> {
        let b = self.pop_collection()?;
        let a = self.pop_collection()?;
        let mut out = (*a).clone();
        for &x in b.iter() {
            if let Some(index) = find_first(&out, x) {
                out.remove(index);
            }
        }
        self.yield_value(Value::collection(out))
    }

    // keep = true retains elements present in the right operand; false
    // retains the ones absent from it.
    fn sift(&mut self, keep: bool) -> Result<ControlFlow> {
        let b = self.pop_collection()?;
        let a = self.pop_collection()?;
        let out = a
            .iter()
            .copied()
            .filter(|&x| member(&b, x) == keep)
            .collect();
        self.yield_value(Value::collection(out))
    }

    fn pick(&mut self, dice: &mut dyn Roller) -> Result<ControlFlow> {
        let n = match self.pop()? {
            Value::Integer(n) if n >= 1 => n,
            Value::Integer(_) => return Err(Error::PickCount),
            v => return Err(expected(BitFlags::from_flag(TypeTag::Integer), &v)),
        };
        let c = self.pop_collection()?;
        let mut working = (*c).clone();
        let count = (n as usize).min(working.len());
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            let index = dice.randomi(working.len() as i32) as usize;
            out.push(working.remove(index));
        }
        self.yield_value(Value::collection(out))
    }

    fn choose(&mut self, dice: &mut dyn Roller) -> Result<ControlFlow> {
        let c = self.pop_collection()?;
        if c.is_empty() {
            return Err(Error::EmptyCollection("choose"));
        }
        let index = dice.randomi(c.len() as i32) as usize;
        self.yield_value(Value::Integer(c[index]))
    }

    // 'largest'/'least': the n extreme elements, ties kept.
    fn select(&mut self, largest: bool) -> Result<ControlFlow> {
        let c = self.pop_collection()?;
        let n = self.pop_integer()?;
        let mut sorted = (*c).clone();
        if largest {
            sorted.sort_unstable_by(|a, b| b.cmp(a));
        } else {
            sorted.sort_unstable();
        }
        sorted.truncate(n.max(0) as usize);
        self.yield_value(Value::collection(sorted))
    }

    fn extremum(&mut self, max: bool) -> Result<ControlFlow> {
        let c = self.pop_collection()?;
        let result = if max {
            c.iter().max()
        } else {
            c.iter().min()
        };
        match result {
            Some(&value) => self.yield_value(Value::Integer(value)),
            None => Err(Error::EmptyCollection(if max { "max" } else { "min" })),
        }
    }

    fn extremal_set(&mut self, max: bool) -> Result<ControlFlow> {
        let c = self.pop_collection()?;
        let bound = if max { c.iter().max() } else { c.iter().min() };
        match bound {
            Some(&bound) => {
                let out = c.iter().copied().filter(|&x| x == bound).collect();
                self.yield_value(Value::collection(out))
            }
            None => Err(Error::EmptyCollection(if max { "maximal" } else { "minimal" })),
        }
    }

    // Upper median for even sizes.
    fn median(&mut self) -> Result<ControlFlow> {
        let c = self.pop_collection()?;
        if c.is_empty() {
            return Err(Error::EmptyCollection("median"));
        }
        let mut sorted = (*c).clone();
        sorted.sort_unstable();
        self.yield_value(Value::Integer(sorted[sorted.len() / 2]))
    }

    fn different(&mut self) -> Result<ControlFlow> {
        let c = self.pop_collection()?;
        let mut out: Vec<i32> = Vec::new();
        for &x in c.iter() {
            if !member(&out, x) {
                out.push(x);
            }
        }
        self.yield_value(Value::collection(out))
    }

    fn range(&mut self) -> Result<ControlFlow> {
        let r = self.pop_integer()?;
        let l = self.pop_integer()?;
        let out = if l >= r { Vec::new() } else { (l..r).collect() };
        self.yield_value(Value::collection(out))
    }

    fn concat(&mut self) -> Result<ControlFlow> {
        let b = self.pop_string()?;
        let a = self.pop_string()?;
        let joined = format!("{}{}", a.chars, b.chars);
        self.yield_value(Value::Str(Rc::new(StrObj::from_owned(joined))))
    }

    fn name_constant(&mut self, chunk: &Chunk) -> Result<Rc<StrObj>> {
        let index = self.read_byte(chunk)?;
        match chunk.constants.get(index as usize) {
            Some(Value::Str(name)) => Ok(name.clone()),
            _ => Err(Error::BadConstant(index)),
        }
    }

    fn define_global(&mut self, chunk: &Chunk) -> Result<ControlFlow> {
        let name = self.name_constant(chunk)?;
        let value = self.pop()?;
        self.globals.set(name, value);
        Ok(ControlFlow::Advance)
    }

    fn get_global(&mut self, chunk: &Chunk) -> Result<ControlFlow> {
        let name = self.name_constant(chunk)?;
        match self.globals.get(&name) {
            Some(value) => self.yield_value(value),
            None => Err(Error::UndefinedGlobal(name.chars.clone())),
        }
    }
}

impl Default for VM {
    fn default() -> VM {
        VM::new()
    }
}

fn bool_value(truth: bool) -> Value {
    if truth {
        Value::Integer(1)
    } else {
        Value::empty_collection()
    }
}

fn integer_operand(v: Value) -> Result<i32> {
    match v {
        Value::Integer(n) => Ok(n),
        v => Err(expected(BitFlags::from_flag(TypeTag::Integer), &v)),
    }
}

// Behavior-driven: programs go through the real compiler and the results
// are asserted on, so any conforming rework of the internals should keep
// these green.
#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;

    // Replays a fixed script of draws; records the bound passed to each
    // randomi call so tests can check dice ranges.
    struct Scripted {
        draws: Vec<i32>,
        reals: Vec<f64>,
        uppers: Vec<i32>,
    }

    impl Scripted {
        fn draws(draws: Vec<i32>) -> Scripted {
            Scripted {
                draws,
                reals: Vec::new(),
                uppers: Vec::new(),
            }
        }

        fn reals(reals: Vec<f64>) -> Scripted {
            Scripted {
                draws: Vec::new(),
                reals,
                uppers: Vec::new(),
            }
        }
    }

    impl Roller for Scripted {
        fn randomi(&mut self, upper: i32) -> i32 {
            self.uppers.push(upper);
            self.draws.remove(0)
        }

        fn uniform(&mut self) -> f64 {
            self.reals.remove(0)
        }
    }

    fn eval(source: &str) -> Result<Value> {
        let mut chunk = Chunk::new();
        assert!(compile(source, &mut chunk), "compile failed: {:?}", source);
        VM::new().interpret(&chunk, &mut Dice::seeded(0))
    }

    fn eval_with(source: &str, dice: &mut dyn Roller) -> Result<Value> {
        let mut chunk = Chunk::new();
        assert!(compile(source, &mut chunk), "compile failed: {:?}", source);
        VM::new().interpret(&chunk, dice)
    }

    fn shows(source: &str) -> String {
        eval(source).expect("evaluation failed").to_string()
    }

    fn shows_with(source: &str, dice: &mut dyn Roller) -> String {
        eval_with(source, dice).expect("evaluation failed").to_string()
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(shows("3 + 4 * 2"), "11");
        assert_eq!(shows("(3 + 4) * 2"), "14");
        assert_eq!(shows("10 - 3 - 2"), "5");
        assert_eq!(shows("7 / 2"), "3");
        assert_eq!(shows("7 mod 3"), "1");
        assert_eq!(shows("-(2 + 3)"), "-5");
        assert_eq!(shows("sgn (0 - 9)"), "-1");
        assert_eq!(shows("sgn 0"), "0");
    }

    #[test]
    fn test_arithmetic_errors() {
        assert_eq!(eval("1 / 0"), Err(Error::DivideByZero));
        assert_eq!(eval("1 mod 0"), Err(Error::DivideByZero));
        assert!(matches!(
            eval("1 + {2}"),
            Err(Error::TypeError { got: TypeTag::Collection, .. })
        ));
    }

    #[test]
    fn test_relational_truth_convention() {
        assert_eq!(shows("2 < 3"), "1");
        assert_eq!(shows("3 < 2"), "");
        assert_eq!(shows("2 = 2"), "1");
        assert_eq!(shows("2 =/= 2"), "");
        assert_eq!(shows("3 >= 3"), "1");
        assert_eq!(shows("\"ab\" = \"ab\""), "1");
        // Collections compare as multisets.
        assert_eq!(shows("{1, 2} = {2, 1}"), "1");
        assert_eq!(shows("{1} = {1, 1}"), "");
        assert!(matches!(eval("{1} < {2}"), Err(Error::TypeError { .. })));
    }

    #[test]
    fn test_boolean_operators() {
        assert_eq!(shows("! {}"), "1");
        assert_eq!(shows("! 0"), "");
        assert_eq!(shows("{1} & {2}"), "1");
        assert_eq!(shows("{1} & {}"), "");
        assert_eq!(shows("1 = 1 & 2 = 2"), "1");
        assert_eq!(shows("1 = 1 & 2 = 3"), "");
    }

    #[test]
    fn test_collections() {
        assert_eq!(shows("{3, 1, 2}"), "1, 2, 3");
        assert_eq!(shows("{}"), "");
        assert_eq!(shows("{1, 2, 3} U {3, 4}"), "1, 2, 3, 3, 4");
        assert_eq!(shows("{1, 2} @ {3}"), "1, 2, 3");
        assert_eq!(shows("sum {1, 2, 3, 4}"), "10");
        assert_eq!(shows("count {5, 5, 5}"), "3");
        assert_eq!(shows("min {3, 1, 2}"), "1");
        assert_eq!(shows("max {3, 1, 2}"), "3");
        assert_eq!(shows("minimal {2, 1, 1, 3}"), "1, 1");
        assert_eq!(shows("maximal {2, 3, 1, 3}"), "3, 3");
        assert_eq!(shows("median {5, 1, 3}"), "3");
        // Upper median for even sizes.
        assert_eq!(shows("median {1, 2, 3, 4}"), "3");
        assert_eq!(shows("different {1, 3, 1, 2, 3}"), "1, 2, 3");
    }

    #[test]
    fn test_collection_algebra() {
        assert_eq!(shows("{5, 1, 5, 3} -- {5}"), "1, 3, 5");
        assert_eq!(shows("{1, 1, 2} -- {1, 1}"), "2");
        assert_eq!(shows("{1, 2} -- {9}"), "1, 2");
        assert_eq!(shows("{1, 2, 3, 4} drop {2, 4}"), "1, 3");
        assert_eq!(shows("{1, 2, 2, 3} keep {2, 9}"), "2, 2");
        assert_eq!(shows("1 .. 5"), "1, 2, 3, 4");
        assert_eq!(shows("5 .. 1"), "");
        assert_eq!(shows("3 .. 3"), "");
    }

    #[test]
    fn test_empty_collection_errors() {
        assert_eq!(eval("min {}"), Err(Error::EmptyCollection("min")));
        assert_eq!(eval("max {}"), Err(Error::EmptyCollection("max")));
        assert_eq!(eval("median {}"), Err(Error::EmptyCollection("median")));
        assert_eq!(eval("choose {}"), Err(Error::EmptyCollection("choose")));
    }

    #[test]
    fn test_selection() {
        assert_eq!(shows("largest 2 {3, 1, 4}"), "3, 4");
        assert_eq!(shows("least 2 {3, 1, 4}"), "1, 3");
        assert_eq!(shows("largest 9 {1, 2}"), "1, 2");
        assert_eq!(shows("least 0 {1, 2}"), "");
    }

    #[test]
    fn test_pairs() {
        assert_eq!(shows("[1 + 2, 3 * 4] %1"), "3");
        assert_eq!(shows("[1 + 2, 3 * 4] %2"), "12");
        assert_eq!(shows("%1 [7, 8]"), "7");
        assert_eq!(shows("[1, {2, 3}]"), "[1, 2, 3]");
        // Components round-trip whatever their variant.
        assert_eq!(shows("[{1, 2}, \"s\"] %1"), "1, 2");
        assert_eq!(shows("[{1, 2}, \"s\"] %2"), "s");
        assert!(matches!(eval("%1 3"), Err(Error::TypeError { .. })));
    }

    #[test]
    fn test_strings() {
        assert_eq!(shows("\"ab\" || \"cd\""), "abcd");
        assert_eq!(shows("\"a\" <| \"b\""), "ab");
        assert_eq!(shows("\"a\" |> \"b\""), "ab");
        assert_eq!(shows("\"a\" <> \"b\""), "ab");
        assert!(matches!(eval("\"a\" || 1"), Err(Error::TypeError { .. })));
    }

    #[test]
    fn test_dice_with_scripted_rolls() {
        let mut dice = Scripted::draws(vec![0, 3, 5]);
        assert_eq!(shows_with("3 D 6", &mut dice), "1, 4, 6");
        // Three draws, each over [0, 6).
        assert_eq!(dice.uppers, vec![6, 6, 6]);

        let mut dice = Scripted::draws(vec![2]);
        assert_eq!(shows_with("D 6", &mut dice), "3");

        // Zero-inclusive dice draw over [0, n] — the bound is n + 1.
        let mut dice = Scripted::draws(vec![6]);
        assert_eq!(shows_with("Z 6", &mut dice), "6");
        assert_eq!(dice.uppers, vec![7]);

        let mut dice = Scripted::draws(vec![0, 2]);
        assert_eq!(shows_with("2 z 4", &mut dice), "0, 2");
        assert_eq!(dice.uppers, vec![5, 5]);
    }

    #[test]
    fn test_dice_errors() {
        assert_eq!(eval("D 0"), Err(Error::DieRange));
        assert_eq!(eval("D (0 - 6)"), Err(Error::DieRange));
        assert_eq!(eval("{1} D 6"), Err(Error::DieRange));
    }

    #[test]
    fn test_dice_bounds_with_seeded_rng() {
        match eval("100 D 6").unwrap() {
            Value::Collection(c) => {
                assert_eq!(c.len(), 100);
                assert!(c.iter().all(|&x| (1..=6).contains(&x)));
            }
            other => panic!("expected a collection, got {:?}", other),
        }
        match eval("100 Z 6").unwrap() {
            Value::Collection(c) => assert!(c.iter().all(|&x| (0..=6).contains(&x))),
            other => panic!("expected a collection, got {:?}", other),
        }
    }

    #[test]
    fn test_pick_and_choose() {
        let mut dice = Scripted::draws(vec![0, 0]);
        assert_eq!(shows_with("{4, 5, 6} pick 2", &mut dice), "4, 5");
        // Sampling without replacement shrinks the bound.
        assert_eq!(dice.uppers, vec![3, 2]);

        let mut dice = Scripted::draws(vec![1]);
        assert_eq!(shows_with("choose {4, 5, 6}", &mut dice), "5");

        assert_eq!(shows("{1, 2} pick 9"), "1, 2");
        assert_eq!(eval("{1, 2} pick 0"), Err(Error::PickCount));
    }

    #[test]
    fn test_question() {
        let mut dice = Scripted::reals(vec![0.3]);
        assert_eq!(shows_with("? 0.5", &mut dice), "1");
        let mut dice = Scripted::reals(vec![0.7]);
        assert_eq!(shows_with("? 0.5", &mut dice), "");
    }

    #[test]
    fn test_globals() {
        assert_eq!(shows("x := 5; x + 1"), "6");
        assert_eq!(shows("a := 1; b := 2; a + b"), "3");
        assert_eq!(shows("c := {1, 2}; sum c"), "3");
        assert_eq!(
            eval("nope"),
            Err(Error::UndefinedGlobal(String::from("nope")))
        );
    }

    #[test]
    fn test_stack_is_empty_after_success_and_after_error() {
        let mut chunk = Chunk::new();
        assert!(compile("1 .. 4", &mut chunk));
        let mut vm = VM::new();
        assert!(vm.interpret(&chunk, &mut Dice::seeded(0)).is_ok());
        assert_eq!(vm.depth(), 0);

        let mut chunk = Chunk::new();
        assert!(compile("1 + {2}", &mut chunk));
        assert!(vm.interpret(&chunk, &mut Dice::seeded(0)).is_err());
        assert_eq!(vm.depth(), 0);
    }

    #[test]
    fn test_stack_overflow() {
        // A chunk the compiler would never emit: 257 pushes, no consumers.
        let mut chunk = Chunk::new();
        let k = chunk.add_constant(Value::Integer(1)) as u8;
        for _ in 0..=STACK_MAX {
            chunk.write_op(OpCode::Constant, 1);
            chunk.write(k, 1);
        }
        chunk.write_op(OpCode::Return, 1);
        assert_eq!(
            VM::new().interpret(&chunk, &mut Dice::seeded(0)),
            Err(Error::Overflow)
        );
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let mut chunk = Chunk::new();
        assert!(compile("sum 10 D 6 + D 4", &mut chunk));
        let a = VM::new().interpret(&chunk, &mut Dice::seeded(42)).unwrap();
        let b = VM::new().interpret(&chunk, &mut Dice::seeded(42)).unwrap();
        assert!(a.equals(&b));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            Error::DieRange.to_string(),
            "Die operand must be a positive integer."
        );
        assert_eq!(
            Error::UndefinedGlobal(String::from("x")).to_string(),
            "Undefined variable 'x'."
        );
        assert_eq!(
            Error::EmptyCollection("min").to_string(),
            "Operand to 'min' must be a non-empty collection."
        );
        let e = expected(
            BitFlags::from_flag(TypeTag::Integer),
            &Value::empty_collection(),
        );
        assert_eq!(e.to_string(), "Expected an integer operand, got a collection.");
    }
}
