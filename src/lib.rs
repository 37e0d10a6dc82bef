//! Weaver - a bytecode virtual machine for player-authored spells
//!
//! This library provides the spell VM, its syscall bridge and a reference
//! world host. For C/C++ embedding, use the FFI module functions.

pub mod config;
#[cfg(feature = "debugger")]
pub mod debugger;
pub mod ffi;
pub mod host;
pub mod vm;

// Re-export commonly used types
pub use config::{ConfigFile, RuntimeConfig, SyscallMode};
pub use host::{Effect, HostEvent, World, WorldHost};
pub use vm::{Fault, Op, Program, SpellHost, Value, Vm, VmError};

// Re-export FFI types for C bindings
pub use ffi::*;
