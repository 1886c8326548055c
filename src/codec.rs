// On-disk chunk format.
//
// Little-endian throughout; counts and line numbers are i32, code is raw
// bytes. Constants are tagged; string payloads live in a trailing section
// keyed by constant index and are reattached on load:
//
//   n_ops:i32  n_constants:i32
//   n_ops * u8                      code
//   n_ops * i32                     lines
//   n_constants * (tag:u8 payload)  0x00 i32 | 0x01 f64 | 0x02 (placeholder)
//   n_strings:i32
//   n_strings * (constant_index:i32 length:i32 length * u8)
//
// Only integers, reals and strings can appear in a persisted pool; the
// compiler never emits anything else.

use crate::chunk::Chunk;
use crate::object::StrObj;
use crate::value::Value;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::rc::Rc;

const TAG_INTEGER: u8 = 0x00;
const TAG_REAL: u8 = 0x01;
const TAG_STRING: u8 = 0x02;

pub fn save_chunk(chunk: &Chunk, path: &str) -> io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);

    write_i32(&mut out, chunk.code.len() as i32)?;
    write_i32(&mut out, chunk.constants.len() as i32)?;

    out.write_all(&chunk.code)?;
    for &line in &chunk.lines {
        write_i32(&mut out, line)?;
    }

    for value in &chunk.constants {
        match value {
            Value::Integer(n) => {
                out.write_all(&[TAG_INTEGER])?;
                write_i32(&mut out, *n)?;
            }
            Value::Real(r) => {
                out.write_all(&[TAG_REAL])?;
                out.write_all(&r.to_le_bytes())?;
            }
            Value::Str(_) => {
                out.write_all(&[TAG_STRING])?;
            }
            _ => {
                return Err(invalid(
                    "constant pool may only hold integers, reals and strings",
                ));
            }
        }
    }

    let strings: Vec<(usize, &Rc<StrObj>)> = chunk
        .constants
        .iter()
        .enumerate()
        .filter_map(|(i, v)| match v {
            Value::Str(s) => Some((i, s)),
            _ => None,
        })
        .collect();

    write_i32(&mut out, strings.len() as i32)?;
    for (index, s) in strings {
        write_i32(&mut out, index as i32)?;
        write_i32(&mut out, s.len() as i32)?;
        out.write_all(s.chars.as_bytes())?;
    }

    out.flush()
}

pub fn load_chunk(path: &str) -> io::Result<Chunk> {
    let mut input = BufReader::new(File::open(path)?);

    let n_ops = read_count(&mut input)?;
    let n_constants = read_count(&mut input)?;

    let mut chunk = Chunk::new();

    let mut code = vec![0u8; n_ops];
    input.read_exact(&mut code)?;
    let mut lines = Vec::with_capacity(n_ops);
    for _ in 0..n_ops {
        lines.push(read_i32(&mut input)?);
    }
    chunk.code = code;
    chunk.lines = lines;

    for _ in 0..n_constants {
        let mut tag = [0u8; 1];
        input.read_exact(&mut tag)?;
        let value = match tag[0] {
            TAG_INTEGER => Value::Integer(read_i32(&mut input)?),
            TAG_REAL => Value::Real(read_f64(&mut input)?),
            // Placeholder; bytes are reattached below.
            TAG_STRING => Value::string(""),
            other => return Err(invalid(&format!("unknown constant tag {}", other))),
        };
        chunk.add_constant(value);
    }

    let n_strings = read_count(&mut input)?;
    for _ in 0..n_strings {
        let index = read_count(&mut input)?;
        let length = read_count(&mut input)?;
        let mut bytes = vec![0u8; length];
        input.read_exact(&mut bytes)?;
        let chars =
            String::from_utf8(bytes).map_err(|_| invalid("string constant is not valid utf-8"))?;
        match chunk.constants.get_mut(index) {
            Some(slot) => match slot {
                Value::Str(_) => *slot = Value::Str(Rc::new(StrObj::from_owned(chars))),
                _ => return Err(invalid("string record points at a non-string constant")),
            },
            None => return Err(invalid("string record points outside the constant pool")),
        }
    }

    Ok(chunk)
}

fn invalid(message: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.to_string())
}

fn write_i32(out: &mut dyn Write, value: i32) -> io::Result<()> {
    out.write_all(&value.to_le_bytes())
}

fn read_i32(input: &mut dyn Read) -> io::Result<i32> {
    let mut buf = [0u8; 4];
    input.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn read_f64(input: &mut dyn Read) -> io::Result<f64> {
    let mut buf = [0u8; 8];
    input.read_exact(&mut buf)?;
    Ok(f64::from_le_bytes(buf))
}

fn read_count(input: &mut dyn Read) -> io::Result<usize> {
    let value = read_i32(input)?;
    if value < 0 {
        return Err(invalid("negative count in chunk header"));
    }
    Ok(value as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::debug::disassemble_chunk;
    use crate::vm::{Dice, VM};
    use tempfile::tempdir;

    fn compiled(source: &str) -> Chunk {
        let mut chunk = Chunk::new();
        assert!(compile(source, &mut chunk), "compile failed: {:?}", source);
        chunk
    }

    fn round_trip(chunk: &Chunk) -> Chunk {
        let dir = tempdir().unwrap();
        let path = dir.path().join("chunk.g");
        let path = path.to_str().unwrap();
        save_chunk(chunk, path).unwrap();
        load_chunk(path).unwrap()
    }

    fn listing(chunk: &Chunk) -> String {
        let mut out = Vec::new();
        disassemble_chunk(&mut out, chunk, "chunk").unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_round_trip_preserves_code_lines_and_constants() {
        let chunk = compiled("x := 3 D 6;\nsum x + \"hi\" = \"hi\"");
        let loaded = round_trip(&chunk);
        assert_eq!(loaded.code, chunk.code);
        assert_eq!(loaded.lines, chunk.lines);
        assert_eq!(loaded.constants, chunk.constants);
    }

    #[test]
    fn test_round_trip_preserves_reals() {
        let chunk = compiled("? 0.125");
        let loaded = round_trip(&chunk);
        match (&chunk.constants[0], &loaded.constants[0]) {
            (Value::Real(a), Value::Real(b)) => assert_eq!(a.to_bits(), b.to_bits()),
            other => panic!("expected real constants, got {:?}", other),
        }
    }

    #[test]
    fn test_round_trip_disassembles_identically() {
        let chunk = compiled("s := \"ab\" || \"cd\";\nlargest 2 (3 D 6)");
        let loaded = round_trip(&chunk);
        assert_eq!(listing(&loaded), listing(&chunk));
    }

    #[test]
    fn test_round_trip_runs_identically_under_one_seed() {
        let chunk = compiled("sum 5 D 8 + 2 * D 4");
        let loaded = round_trip(&chunk);
        let a = VM::new().interpret(&chunk, &mut Dice::seeded(7)).unwrap();
        let b = VM::new().interpret(&loaded, &mut Dice::seeded(7)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_heap_constants_are_rejected() {
        let mut chunk = Chunk::new();
        chunk.add_constant(Value::collection(vec![1, 2]));
        chunk.write_op(crate::chunk::OpCode::Return, 1);
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.g");
        let err = save_chunk(&chunk, path.to_str().unwrap()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_truncated_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("short.g");
        std::fs::write(&path, &[1, 0, 0, 0]).unwrap();
        assert!(load_chunk(path.to_str().unwrap()).is_err());
    }
}
