//! Persisted bytecode
//!
//! Layout (little endian): the signature, the version string, then the main
//! prototype. A prototype is its name, source, line defined, parameter count,
//! vararg flag, register count, code words, positions, typed constants,
//! upvalue descriptors and nested prototypes (recursively).

use crate::bytecode::{FunctionPrototype, SourcePosition, UpvalueDescriptor};
use crate::sync::Arc;
use crate::value::Value;
use anyhow::{bail, ensure, Context, Result};

pub const SIGNATURE: [u8; 4] = *b"\x1bGlm";
pub const VERSION: &str = "gloam-bc 1";

/// Deepest prototype nesting accepted when loading
const MAX_NESTING: usize = 200;

const TAG_NIL: u8 = 0;
const TAG_FALSE: u8 = 1;
const TAG_TRUE: u8 = 2;
const TAG_INTEGER: u8 = 3;
const TAG_FLOAT: u8 = 4;
const TAG_STRING: u8 = 5;

/// Serialize a prototype tree
pub fn dump_prototype(proto: &FunctionPrototype) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    out.extend_from_slice(&SIGNATURE);
    write_str(&mut out, VERSION);
    encode_prototype(&mut out, proto)?;
    Ok(out)
}

/// Load a prototype tree written by `dump_prototype`
pub fn undump_prototype(bytes: &[u8]) -> Result<Arc<FunctionPrototype>> {
    ensure!(bytes.len() >= SIGNATURE.len(), "chunk too small");
    ensure!(bytes[..4] == SIGNATURE, "not a precompiled chunk");

    let mut cursor = SIGNATURE.len();
    let version = read_string(bytes, &mut cursor).context("reading version")?;
    ensure!(
        version == VERSION,
        "version mismatch: chunk is '{}', loader expects '{}'",
        version,
        VERSION
    );

    let proto = decode_prototype(bytes, &mut cursor, 0)?;
    ensure!(cursor == bytes.len(), "extra data at end of chunk");
    Ok(Arc::new(proto))
}

fn encode_prototype(out: &mut Vec<u8>, proto: &FunctionPrototype) -> Result<()> {
    ensure!(
        proto.positions.len() == proto.code.len(),
        "prototype '{}' has {} positions for {} instructions",
        proto.name,
        proto.positions.len(),
        proto.code.len()
    );
    write_str(out, &proto.name);
    write_str(out, &proto.source);
    write_u32(out, proto.line_defined);
    write_u8(out, proto.param_count);
    write_u8(out, proto.is_vararg as u8);
    write_u16(out, proto.max_stack);

    write_len(out, proto.code.len())?;
    for word in &proto.code {
        write_u32(out, *word);
    }
    for pos in &proto.positions {
        write_u32(out, pos.line);
        write_u32(out, pos.column);
    }

    write_len(out, proto.constants.len())?;
    for constant in &proto.constants.constants {
        encode_constant(out, constant)?;
    }

    write_len(out, proto.upvalues.len())?;
    for upvalue in &proto.upvalues {
        write_str(out, &upvalue.name);
        write_u8(out, upvalue.in_stack as u8);
        write_u8(out, upvalue.index);
    }

    write_len(out, proto.prototypes.len())?;
    for child in &proto.prototypes {
        encode_prototype(out, child)?;
    }
    Ok(())
}

fn encode_constant(out: &mut Vec<u8>, value: &Value) -> Result<()> {
    match value {
        Value::Nil => write_u8(out, TAG_NIL),
        Value::Boolean(false) => write_u8(out, TAG_FALSE),
        Value::Boolean(true) => write_u8(out, TAG_TRUE),
        Value::Integer(i) => {
            write_u8(out, TAG_INTEGER);
            out.extend_from_slice(&i.to_le_bytes());
        }
        Value::Float(f) => {
            write_u8(out, TAG_FLOAT);
            out.extend_from_slice(&f.to_le_bytes());
        }
        Value::String(s) => {
            write_u8(out, TAG_STRING);
            write_str(out, s);
        }
        other => bail!("cannot dump a {} constant", other.type_name()),
    }
    Ok(())
}

fn decode_prototype(bytes: &[u8], cursor: &mut usize, depth: usize) -> Result<FunctionPrototype> {
    ensure!(depth < MAX_NESTING, "prototypes nested too deeply");

    let name = read_string(bytes, cursor)?;
    let source = read_string(bytes, cursor)?;
    let mut proto = FunctionPrototype::new(&name, &source);
    proto.line_defined = read_u32(bytes, cursor)?;
    proto.param_count = read_u8(bytes, cursor)?;
    proto.is_vararg = read_u8(bytes, cursor)? != 0;
    proto.max_stack = read_u16(bytes, cursor)?;

    let ncode = read_u32(bytes, cursor)? as usize;
    // each instruction costs 12 bytes with its position
    ensure!(
        ncode.saturating_mul(12) <= bytes.len() - *cursor,
        "truncated code in '{}'",
        name
    );
    proto.code = (0..ncode)
        .map(|_| read_u32(bytes, cursor))
        .collect::<Result<_>>()?;
    proto.positions = (0..ncode)
        .map(|_| {
            Ok(SourcePosition {
                line: read_u32(bytes, cursor)?,
                column: read_u32(bytes, cursor)?,
            })
        })
        .collect::<Result<_>>()?;

    let nconstants = read_u32(bytes, cursor)?;
    for _ in 0..nconstants {
        let constant = decode_constant(bytes, cursor)
            .with_context(|| format!("constant in '{}'", name))?;
        proto.constants.constants.push(constant);
    }

    let nupvalues = read_u32(bytes, cursor)?;
    for _ in 0..nupvalues {
        let upvalue_name = read_string(bytes, cursor)?;
        let in_stack = read_u8(bytes, cursor)? != 0;
        let index = read_u8(bytes, cursor)?;
        proto.upvalues.push(UpvalueDescriptor {
            name: upvalue_name,
            in_stack,
            index,
        });
    }

    let nchildren = read_u32(bytes, cursor)?;
    for _ in 0..nchildren {
        let child = decode_prototype(bytes, cursor, depth + 1)?;
        proto.prototypes.push(Arc::new(child));
    }
    Ok(proto)
}

fn decode_constant(bytes: &[u8], cursor: &mut usize) -> Result<Value> {
    Ok(match read_u8(bytes, cursor)? {
        TAG_NIL => Value::Nil,
        TAG_FALSE => Value::Boolean(false),
        TAG_TRUE => Value::Boolean(true),
        TAG_INTEGER => Value::Integer(i64::from_le_bytes(read_array(bytes, cursor)?)),
        TAG_FLOAT => Value::Float(f64::from_le_bytes(read_array(bytes, cursor)?)),
        TAG_STRING => Value::string(read_string(bytes, cursor)?),
        tag => bail!("unknown constant tag {}", tag),
    })
}

fn write_u8(out: &mut Vec<u8>, value: u8) {
    out.push(value);
}

fn write_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn write_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn write_len(out: &mut Vec<u8>, len: usize) -> Result<()> {
    let len = u32::try_from(len).context("section too large to dump")?;
    write_u32(out, len);
    Ok(())
}

fn write_str(out: &mut Vec<u8>, value: &str) {
    write_u32(out, value.len() as u32);
    out.extend_from_slice(value.as_bytes());
}

fn read_array<const N: usize>(bytes: &[u8], cursor: &mut usize) -> Result<[u8; N]> {
    if *cursor + N > bytes.len() {
        bail!("unexpected end of input while reading {} bytes", N);
    }
    let mut buf = [0u8; N];
    buf.copy_from_slice(&bytes[*cursor..*cursor + N]);
    *cursor += N;
    Ok(buf)
}

fn read_u8(bytes: &[u8], cursor: &mut usize) -> Result<u8> {
    read_array::<1>(bytes, cursor).map(|b| b[0])
}

fn read_u16(bytes: &[u8], cursor: &mut usize) -> Result<u16> {
    read_array(bytes, cursor).map(u16::from_le_bytes)
}

fn read_u32(bytes: &[u8], cursor: &mut usize) -> Result<u32> {
    read_array(bytes, cursor).map(u32::from_le_bytes)
}

fn read_string(bytes: &[u8], cursor: &mut usize) -> Result<String> {
    let len = read_u32(bytes, cursor)? as usize;
    if *cursor + len > bytes.len() {
        bail!("unexpected end of input while reading string");
    }
    let slice = &bytes[*cursor..*cursor + len];
    *cursor += len;
    String::from_utf8(slice.to_vec()).context("invalid UTF-8 in string")
}
