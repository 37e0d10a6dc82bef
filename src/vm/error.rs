//! Runtime error kinds and the terminal fault record.

use thiserror::Error;

use super::heap::ArrayRef;

/// A precondition violated by an instruction.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VmError {
    #[error("stack underflow: needed {needed} value(s), stack holds {depth}")]
    StackUnderflow { needed: usize, depth: usize },
    #[error("stack overflow: depth limit of {limit} reached")]
    StackOverflow { limit: usize },
    /// Array element access or control transfer outside its valid range.
    #[error("index {index} out of range (length {len})")]
    IndexOutOfRange { index: i64, len: usize },
    #[error("division by zero")]
    DivideByZero,
    #[error("unknown syscall code {0}")]
    UnknownSyscall(i32),
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
    #[error("invalid array size {0}")]
    InvalidArraySize(i32),
    #[error("heap limit exceeded: {requested} element(s) requested, limit is {limit}")]
    HeapLimitExceeded { requested: usize, limit: usize },
    #[error("out of memory: cannot allocate {requested} element(s)")]
    OutOfMemory { requested: usize },
    #[error("dangling array reference {0}")]
    DanglingReference(ArrayRef),
    #[error("execution cancelled by host")]
    Cancelled,
}

/// Terminal state of a program: which instruction failed and why.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("fault at instruction {pc}: {error}")]
pub struct Fault {
    /// Index of the faulting instruction.
    pub pc: usize,
    pub error: VmError,
}

impl Fault {
    pub fn new(pc: usize, error: VmError) -> Self {
        Self { pc, error }
    }
}
