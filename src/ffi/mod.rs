//! C FFI for embedding the spell VM
//!
//! This module provides a C-compatible API for embedding weaver in host
//! applications, such as a game engine. All public functions use
//! `extern "C"` ABI.
//!
//! # Safety
//!
//! All FFI functions that take raw pointers require:
//! - Non-null pointers (unless documented otherwise)
//! - Valid VM instances created by `weaver_vm_new()`
//! - No reentrant calls on a VM from inside its own host callbacks

mod error;
mod load;
mod run;
mod stack;
mod types;
mod vm_ffi;

pub use error::*;
pub use load::*;
pub use run::*;
pub use stack::*;
pub use types::{
    WeaverErrorFn, WeaverHostCallbacks, WeaverInstruction, WeaverProgress, WeaverResult,
    WeaverStatus, WeaverVm,
};
pub use vm_ffi::*;

/// Version information
pub const WEAVER_VERSION_MAJOR: u32 = 0;
pub const WEAVER_VERSION_MINOR: u32 = 1;
pub const WEAVER_VERSION_PATCH: u32 = 0;

/// Get the version string
#[unsafe(no_mangle)]
pub extern "C" fn weaver_version() -> *const std::ffi::c_char {
    static VERSION: &[u8] = b"0.1.0\0";
    VERSION.as_ptr() as *const std::ffi::c_char
}

/// Get the major version number
#[unsafe(no_mangle)]
pub extern "C" fn weaver_version_major() -> u32 {
    WEAVER_VERSION_MAJOR
}

/// Get the minor version number
#[unsafe(no_mangle)]
pub extern "C" fn weaver_version_minor() -> u32 {
    WEAVER_VERSION_MINOR
}

/// Get the patch version number
#[unsafe(no_mangle)]
pub extern "C" fn weaver_version_patch() -> u32 {
    WEAVER_VERSION_PATCH
}
