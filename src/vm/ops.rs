use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Element type of a heap array, fixed at allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ElemType {
    Int = 0,
    Double = 1,
}

impl ElemType {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(ElemType::Int),
            1 => Some(ElemType::Double),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ElemType::Int => "int",
            ElemType::Double => "double",
        }
    }
}

/// Errors raised when rebuilding an [`Op`] from its record form.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("invalid opcode: {0}")]
    InvalidOpcode(u8),
    #[error("invalid element type: {0}")]
    InvalidElemType(u8),
    #[error("{op} operand must be non-negative, got {value}")]
    NegativeOperand { op: &'static str, value: i32 },
}

/// Shape of the operand that follows an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    None,
    /// Signed immediate or syscall code (A field).
    Int,
    /// Unsigned count, slot distance or program index (A field).
    Index,
    /// Double immediate (D field).
    Double,
    /// Element type tag.
    Elem,
}

/// Spell VM instructions.
///
/// Integer ops work on 32-bit two's complement values with wrapping
/// arithmetic; `I` suffix = int, `D` suffix = double. Binary ops pop the
/// right-hand operand first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Op {
    // ========================================
    // Immediates
    // ========================================
    ImmediateInt(i32),
    ImmediateDouble(f64),

    // ========================================
    // Stack Shaping
    // ========================================
    /// Remove the top n values.
    Pop(u32),
    /// Duplicate the value k slots below the top (0 = top).
    Copy(u32),
    /// Pop the top value and store it k slots below the new top.
    Set(u32),

    // ========================================
    // Integer Arithmetic
    // ========================================
    AddI,
    SubI,
    MulI,
    DivI,
    ModI,
    AndI,
    OrI,
    XorI,
    ShlI,
    ShrI,
    /// Logical (unsigned) shift right.
    ShrlI,
    LtI,
    GeI,
    /// Bitwise complement.
    NotI,

    // ========================================
    // Double Arithmetic
    // ========================================
    AddD,
    SubD,
    MulD,
    DivD,

    // ========================================
    // Conversion
    // ========================================
    /// int → double
    ConvID,
    /// double → int (truncating)
    ConvDI,

    // ========================================
    // Control Flow
    // ========================================
    /// [int] → [] (branch if == 0)
    Brz(u32),
    /// [int] → [] (branch if != 0)
    Brnz(u32),
    Jmp(u32),
    Call(u32),
    /// Return with the given number of result values.
    Return(u32),

    // ========================================
    // Host
    // ========================================
    Syscall(i32),

    // ========================================
    // Arrays
    // ========================================
    /// [int size] → [array]
    AllocA(ElemType),
    /// [array, int index] → [value]
    GetA,
    /// [array, int index, value] → []
    SetA,
    /// [array] → [int]
    LenA,
}

impl Op {
    /// Number of distinct opcodes.
    pub const COUNT: u8 = 35;

    /// Stable numeric opcode, used by the bytecode container and the C ABI.
    pub fn opcode(&self) -> u8 {
        match self {
            Op::ImmediateInt(_) => 0,
            Op::ImmediateDouble(_) => 1,
            Op::Pop(_) => 2,
            Op::Copy(_) => 3,
            Op::Set(_) => 4,
            Op::AddI => 5,
            Op::SubI => 6,
            Op::MulI => 7,
            Op::DivI => 8,
            Op::ModI => 9,
            Op::AndI => 10,
            Op::OrI => 11,
            Op::XorI => 12,
            Op::ShlI => 13,
            Op::ShrI => 14,
            Op::ShrlI => 15,
            Op::LtI => 16,
            Op::GeI => 17,
            Op::NotI => 18,
            Op::AddD => 19,
            Op::SubD => 20,
            Op::MulD => 21,
            Op::DivD => 22,
            Op::ConvID => 23,
            Op::ConvDI => 24,
            Op::Brz(_) => 25,
            Op::Brnz(_) => 26,
            Op::Jmp(_) => 27,
            Op::Call(_) => 28,
            Op::Return(_) => 29,
            Op::Syscall(_) => 30,
            Op::AllocA(_) => 31,
            Op::GetA => 32,
            Op::SetA => 33,
            Op::LenA => 34,
        }
    }

    /// Operand shape for a raw opcode, or None if the opcode is unknown.
    pub fn operand_kind(opcode: u8) -> Option<OperandKind> {
        let kind = match opcode {
            0 | 30 => OperandKind::Int,
            1 => OperandKind::Double,
            2..=4 | 25..=29 => OperandKind::Index,
            31 => OperandKind::Elem,
            5..=24 | 32..=34 => OperandKind::None,
            _ => return None,
        };
        Some(kind)
    }

    /// Rebuild an instruction from its `{opcode, A, D, element type}` record.
    ///
    /// Fields the opcode does not use are ignored.
    pub fn from_parts(opcode: u8, a: i32, d: f64, elem: u8) -> Result<Op, DecodeError> {
        let index = |op: &'static str| -> Result<u32, DecodeError> {
            u32::try_from(a).map_err(|_| DecodeError::NegativeOperand { op, value: a })
        };

        let op = match opcode {
            0 => Op::ImmediateInt(a),
            1 => Op::ImmediateDouble(d),
            2 => Op::Pop(index("Pop")?),
            3 => Op::Copy(index("Copy")?),
            4 => Op::Set(index("Set")?),
            5 => Op::AddI,
            6 => Op::SubI,
            7 => Op::MulI,
            8 => Op::DivI,
            9 => Op::ModI,
            10 => Op::AndI,
            11 => Op::OrI,
            12 => Op::XorI,
            13 => Op::ShlI,
            14 => Op::ShrI,
            15 => Op::ShrlI,
            16 => Op::LtI,
            17 => Op::GeI,
            18 => Op::NotI,
            19 => Op::AddD,
            20 => Op::SubD,
            21 => Op::MulD,
            22 => Op::DivD,
            23 => Op::ConvID,
            24 => Op::ConvDI,
            25 => Op::Brz(index("Brz")?),
            26 => Op::Brnz(index("Brnz")?),
            27 => Op::Jmp(index("Jmp")?),
            28 => Op::Call(index("Call")?),
            29 => Op::Return(index("Return")?),
            30 => Op::Syscall(a),
            31 => Op::AllocA(ElemType::from_raw(elem).ok_or(DecodeError::InvalidElemType(elem))?),
            32 => Op::GetA,
            33 => Op::SetA,
            34 => Op::LenA,
            other => return Err(DecodeError::InvalidOpcode(other)),
        };
        Ok(op)
    }

    /// The integer operand (A field), or 0 for ops without one.
    pub fn operand_a(&self) -> i32 {
        match *self {
            Op::ImmediateInt(v) | Op::Syscall(v) => v,
            Op::Pop(n)
            | Op::Copy(n)
            | Op::Set(n)
            | Op::Brz(n)
            | Op::Brnz(n)
            | Op::Jmp(n)
            | Op::Call(n)
            | Op::Return(n) => n as i32,
            _ => 0,
        }
    }

    /// The double operand (D field), or 0.0 for ops without one.
    pub fn operand_d(&self) -> f64 {
        match *self {
            Op::ImmediateDouble(d) => d,
            _ => 0.0,
        }
    }

    pub fn elem_type(&self) -> Option<ElemType> {
        match *self {
            Op::AllocA(t) => Some(t),
            _ => None,
        }
    }

    /// Program index this instruction may transfer control to.
    pub fn branch_target(&self) -> Option<u32> {
        match *self {
            Op::Brz(t) | Op::Brnz(t) | Op::Jmp(t) | Op::Call(t) => Some(t),
            _ => None,
        }
    }

    /// Returns the mnemonic of the opcode.
    pub fn name(&self) -> &'static str {
        match self {
            Op::ImmediateInt(_) => "ImmediateInt",
            Op::ImmediateDouble(_) => "ImmediateDouble",
            Op::Pop(_) => "Pop",
            Op::Copy(_) => "Copy",
            Op::Set(_) => "Set",
            Op::AddI => "AddI",
            Op::SubI => "SubI",
            Op::MulI => "MulI",
            Op::DivI => "DivI",
            Op::ModI => "ModI",
            Op::AndI => "AndI",
            Op::OrI => "OrI",
            Op::XorI => "XorI",
            Op::ShlI => "ShlI",
            Op::ShrI => "ShrI",
            Op::ShrlI => "ShrlI",
            Op::LtI => "LtI",
            Op::GeI => "GeI",
            Op::NotI => "NotI",
            Op::AddD => "AddD",
            Op::SubD => "SubD",
            Op::MulD => "MulD",
            Op::DivD => "DivD",
            Op::ConvID => "ConvID",
            Op::ConvDI => "ConvDI",
            Op::Brz(_) => "Brz",
            Op::Brnz(_) => "Brnz",
            Op::Jmp(_) => "Jmp",
            Op::Call(_) => "Call",
            Op::Return(_) => "Return",
            Op::Syscall(_) => "Syscall",
            Op::AllocA(_) => "AllocA",
            Op::GetA => "GetA",
            Op::SetA => "SetA",
            Op::LenA => "LenA",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match Op::operand_kind(self.opcode()) {
            Some(OperandKind::Int) | Some(OperandKind::Index) => {
                write!(f, "{} {}", self.name(), self.operand_a())
            }
            Some(OperandKind::Double) => write!(f, "{} {:?}", self.name(), self.operand_d()),
            Some(OperandKind::Elem) => match self.elem_type() {
                Some(t) => write!(f, "{} {}", self.name(), t.name()),
                None => write!(f, "{}", self.name()),
            },
            _ => write!(f, "{}", self.name()),
        }
    }
}
