mod error;
mod heap;
mod ops;
mod program;
mod stack;
mod value;
#[allow(clippy::module_inception)]
mod vm;

pub mod bytecode;
pub mod syscall;

pub use error::{Fault, VmError};
pub use heap::{ArrayObject, ArrayRef, Heap};
pub use ops::{DecodeError, ElemType, Op, OperandKind};
pub use program::{Diagnostic, Program, Severity};
pub use stack::OperandStack;
pub use syscall::{NullHost, SpellHost, Syscall};
pub use value::Value;
pub use vm::{ExecState, Exit, GcStats, Progress, RunSummary, Vm};
