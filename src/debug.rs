// Human-readable chunk dumps.
//
// One instruction per line: byte offset, source line (or "   | " when the
// line repeats), mnemonic, and for operand-carrying opcodes the operand —
// quoted with its printed value when it indexes the constant pool.

use crate::chunk::{Chunk, OpCode};
use std::io::{self, Write};

pub fn disassemble_chunk(out: &mut dyn Write, chunk: &Chunk, name: &str) -> io::Result<()> {
    writeln!(out, "== {} ==", name)?;

    let mut offset = 0;
    while offset < chunk.code.len() {
        offset = disassemble_instruction(out, chunk, offset)?;
    }
    Ok(())
}

pub fn disassemble_instruction(
    out: &mut dyn Write,
    chunk: &Chunk,
    offset: usize,
) -> io::Result<usize> {
    write!(out, "{:04} ", offset)?;
    if offset > 0 && chunk.lines[offset] == chunk.lines[offset - 1] {
        write!(out, "   | ")?;
    } else {
        write!(out, "{:4} ", chunk.lines[offset])?;
    }

    let byte = chunk.code[offset];
    let op = match OpCode::from_byte(byte) {
        Some(op) => op,
        None => {
            writeln!(out, "Unknown opcode {}", byte)?;
            return Ok(offset + 1);
        }
    };

    match op {
        OpCode::Constant | OpCode::DefineGlobal | OpCode::GetGlobal => {
            constant_instruction(out, mnemonic(op), chunk, offset)
        }
        OpCode::Add2Collection => byte_instruction(out, mnemonic(op), chunk, offset),
        _ => simple_instruction(out, mnemonic(op), offset),
    }
}

fn simple_instruction(out: &mut dyn Write, name: &str, offset: usize) -> io::Result<usize> {
    writeln!(out, "{}", name)?;
    Ok(offset + 1)
}

fn byte_instruction(
    out: &mut dyn Write,
    name: &str,
    chunk: &Chunk,
    offset: usize,
) -> io::Result<usize> {
    let operand = chunk.code[offset + 1];
    writeln!(out, "{:<16} {:4}", name, operand)?;
    Ok(offset + 2)
}

fn constant_instruction(
    out: &mut dyn Write,
    name: &str,
    chunk: &Chunk,
    offset: usize,
) -> io::Result<usize> {
    let index = chunk.code[offset + 1];
    write!(out, "{:<16} {:4} '", name, index)?;
    match chunk.constants.get(index as usize) {
        Some(value) => write!(out, "{}", value)?,
        None => write!(out, "???")?,
    }
    writeln!(out, "'")?;
    Ok(offset + 2)
}

fn mnemonic(op: OpCode) -> &'static str {
    use OpCode::*;
    match op {
        Constant => "OP_CONSTANT",
        Return => "OP_RETURN",
        Add => "OP_ADD",
        Subtract => "OP_SUBTRACT",
        Multiply => "OP_MULTIPLY",
        Divide => "OP_DIVIDE",
        Mod => "OP_MOD",
        Negate => "OP_NEGATE",
        Sgn => "OP_SGN",
        Eq => "OP_EQ",
        Neq => "OP_NEQ",
        Lt => "OP_LT",
        Gt => "OP_GT",
        Le => "OP_LE",
        Ge => "OP_GE",
        Die => "OP_DIE",
        ZeroDie => "OP_ZERO_DIE",
        MDie => "OP_MDIE",
        MZDie => "OP_MZDIE",
        Question => "OP_QUESTION",
        MkCollection => "OP_MKCOLLECTION",
        Add2Collection => "OP_ADD2CLLCTN",
        Union => "OP_UNION",
        And => "OP_AND",
        SetMinus => "OP_SETMINUS",
        Drop => "OP_DROP",
        Keep => "OP_KEEP",
        Pick => "OP_PICK",
        Choose => "OP_CHOOSE",
        Largest => "OP_LARGEST",
        Least => "OP_LEAST",
        Count => "OP_COUNT",
        Sum => "OP_SUM",
        Max => "OP_MAX",
        Min => "OP_MIN",
        Maximal => "OP_MAXIMAL",
        Minimal => "OP_MINIMAL",
        Median => "OP_MEDIAN",
        Different => "OP_DIFFERENT",
        Not => "OP_NOT",
        Range => "OP_RANGE",
        MkPair => "OP_MKPAIR",
        First => "OP_FIRST",
        Second => "OP_SECOND",
        HConc => "OP_HCONC",
        VConcL => "OP_VCONCL",
        VConcR => "OP_VCONCR",
        VConcC => "OP_VCONCC",
        DefineGlobal => "OP_DEFINE_GLOBAL",
        GetGlobal => "OP_GET_GLOBAL",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;

    fn listing(source: &str) -> String {
        let mut chunk = Chunk::new();
        assert!(compile(source, &mut chunk));
        let mut out = Vec::new();
        disassemble_chunk(&mut out, &chunk, "test").unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_simple_listing() {
        assert_eq!(
            listing("2 + 3"),
            "== test ==\n\
             0000    1 OP_CONSTANT         0 '2'\n\
             0002    | OP_CONSTANT         1 '3'\n\
             0004    | OP_ADD\n\
             0005    | OP_RETURN\n"
        );
    }

    #[test]
    fn test_line_numbers_reset_on_new_line() {
        let text = listing("2 +\n3");
        assert!(text.contains("0002    2 OP_CONSTANT"));
    }

    #[test]
    fn test_byte_operand_listing() {
        let text = listing("{7}");
        assert!(text.contains("OP_MKCOLLECTION"));
        assert!(text.contains("OP_ADD2CLLCTN       1"));
    }

    #[test]
    fn test_global_listing_shows_name() {
        let text = listing("x := 1; x");
        assert!(text.contains("OP_DEFINE_GLOBAL    0 'x'"));
        assert!(text.contains("OP_GET_GLOBAL       2 'x'"));
    }

    #[test]
    fn test_median_has_its_own_mnemonic() {
        let text = listing("median {1, 2}");
        assert!(text.contains("OP_MEDIAN"));
        assert!(!text.contains("OP_MDIE"));
    }
}
