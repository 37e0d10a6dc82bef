//! Binary bytecode container for spell programs.
//!
//! Binary format:
//! - Magic: "WVBC" (4 bytes)
//! - Version: u32 (little-endian)
//! - Instruction count: u32
//! - Instructions: opcode byte, then the operand for that opcode:
//!   i32 for immediates, syscall codes, counts and targets; f64 for
//!   `ImmediateDouble`; one element-type byte for `AllocA`; nothing otherwise

use std::io::{Cursor, Read};

use thiserror::Error;

use super::ops::{DecodeError, OperandKind};
use super::{Op, Program};

/// Magic bytes for weaver bytecode files
pub const MAGIC: &[u8; 4] = b"WVBC";

/// Current bytecode format version
pub const VERSION: u32 = 1;

/// Error type for bytecode operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BytecodeError {
    #[error("invalid magic number")]
    InvalidMagic,
    #[error("unsupported version: {0}")]
    UnsupportedVersion(u32),
    #[error("unexpected end of file")]
    UnexpectedEof,
    #[error("invalid opcode: {0}")]
    InvalidOpcode(u8),
    #[error("invalid element type: {0}")]
    InvalidElemType(u8),
    #[error("{op} operand must be non-negative, got {value}")]
    InvalidOperand { op: &'static str, value: i32 },
    #[error("{0} trailing byte(s) after the last instruction")]
    TrailingBytes(usize),
}

impl From<DecodeError> for BytecodeError {
    fn from(e: DecodeError) -> Self {
        match e {
            DecodeError::InvalidOpcode(op) => BytecodeError::InvalidOpcode(op),
            DecodeError::InvalidElemType(t) => BytecodeError::InvalidElemType(t),
            DecodeError::NegativeOperand { op, value } => {
                BytecodeError::InvalidOperand { op, value }
            }
        }
    }
}

/// Serialize a Program to bytes
pub fn serialize(program: &Program) -> Vec<u8> {
    let mut buf = Vec::with_capacity(12 + program.len() * 5);
    buf.extend_from_slice(MAGIC);
    write_u32(&mut buf, VERSION);
    write_u32(&mut buf, program.len() as u32);
    for op in program {
        write_op(&mut buf, op);
    }
    buf
}

/// Deserialize a Program from bytes
pub fn deserialize(data: &[u8]) -> Result<Program, BytecodeError> {
    let mut cursor = Cursor::new(data);
    let program = read_program(&mut cursor)?;

    let trailing = data.len() - cursor.position() as usize;
    if trailing != 0 {
        return Err(BytecodeError::TrailingBytes(trailing));
    }
    Ok(program)
}

/// Whether `data` starts with the bytecode magic.
pub fn is_bytecode(data: &[u8]) -> bool {
    data.starts_with(MAGIC)
}

fn read_program<R: Read>(r: &mut R) -> Result<Program, BytecodeError> {
    // Magic
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)
        .map_err(|_| BytecodeError::UnexpectedEof)?;
    if &magic != MAGIC {
        return Err(BytecodeError::InvalidMagic);
    }

    // Version
    let version = read_u32(r)?;
    if version != VERSION {
        return Err(BytecodeError::UnsupportedVersion(version));
    }

    let count = read_u32(r)? as usize;
    // The count is untrusted; cap the preallocation.
    let mut code = Vec::with_capacity(count.min(1 << 16));
    for _ in 0..count {
        code.push(read_op(r)?);
    }
    Ok(Program::new(code))
}

fn write_op(buf: &mut Vec<u8>, op: &Op) {
    let opcode = op.opcode();
    buf.push(opcode);
    match Op::operand_kind(opcode) {
        Some(OperandKind::Int) | Some(OperandKind::Index) => write_i32(buf, op.operand_a()),
        Some(OperandKind::Double) => write_f64(buf, op.operand_d()),
        Some(OperandKind::Elem) => {
            if let Some(t) = op.elem_type() {
                buf.push(t as u8);
            }
        }
        Some(OperandKind::None) | None => {}
    }
}

fn read_op<R: Read>(r: &mut R) -> Result<Op, BytecodeError> {
    let opcode = read_u8(r)?;
    let kind = Op::operand_kind(opcode).ok_or(BytecodeError::InvalidOpcode(opcode))?;

    let (mut a, mut d, mut elem) = (0, 0.0, 0);
    match kind {
        OperandKind::Int | OperandKind::Index => a = read_i32(r)?,
        OperandKind::Double => d = read_f64(r)?,
        OperandKind::Elem => elem = read_u8(r)?,
        OperandKind::None => {}
    }
    Ok(Op::from_parts(opcode, a, d, elem)?)
}

fn read_u8<R: Read>(r: &mut R) -> Result<u8, BytecodeError> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)
        .map_err(|_| BytecodeError::UnexpectedEof)?;
    Ok(buf[0])
}

fn write_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn read_u32<R: Read>(r: &mut R) -> Result<u32, BytecodeError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)
        .map_err(|_| BytecodeError::UnexpectedEof)?;
    Ok(u32::from_le_bytes(buf))
}

fn write_i32(buf: &mut Vec<u8>, v: i32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn read_i32<R: Read>(r: &mut R) -> Result<i32, BytecodeError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)
        .map_err(|_| BytecodeError::UnexpectedEof)?;
    Ok(i32::from_le_bytes(buf))
}

fn write_f64(buf: &mut Vec<u8>, v: f64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn read_f64<R: Read>(r: &mut R) -> Result<f64, BytecodeError> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)
        .map_err(|_| BytecodeError::UnexpectedEof)?;
    Ok(f64::from_le_bytes(buf))
}
