//! FFI type definitions for the C API.

use std::ffi::{c_char, c_void, CString};

use crate::vm::{SpellHost, Vm};

/// Result codes for FFI operations.
///
/// These map to the `WeaverResult` enum in the generated header.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeaverResult {
    /// Operation succeeded
    Ok = 0,
    /// The program faulted
    ErrorFault = 1,
    /// Value on the stack has the wrong type
    ErrorType = 2,
    /// Bytecode or instruction records are malformed
    ErrorVerify = 3,
    /// Invalid argument passed to function
    ErrorInvalidArg = 4,
    /// Operand stack is empty or full
    ErrorStack = 5,
}

impl WeaverResult {
    pub fn is_ok(self) -> bool {
        self == WeaverResult::Ok
    }

    pub fn is_err(self) -> bool {
        self != WeaverResult::Ok
    }
}

/// Why `weaver_run` returned.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeaverStatus {
    Halted = 0,
    BudgetExhausted = 1,
    /// Stopped right after a syscall; `syscall` holds its code
    Paused = 2,
    /// Terminal failure; see `weaver_get_error`
    Faulted = 3,
}

/// Outcome of one `weaver_run` slice.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeaverProgress {
    pub status: WeaverStatus,
    /// Syscall code the VM paused at, or -1
    pub syscall: i32,
    /// Instructions executed during the slice
    pub executed: u64,
}

/// One instruction in `{opcode, A, D, element type}` record form.
///
/// Fields the opcode does not use are ignored.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeaverInstruction {
    pub opcode: u8,
    pub a: i32,
    pub d: f64,
    pub elem: u8,
}

/// Error callback function type.
///
/// Called when an error occurs, with the error message and user data.
pub type WeaverErrorFn = Option<unsafe extern "C" fn(message: *const c_char, userdata: *mut c_void)>;

/// Host capabilities for syscalls.
///
/// Every callback is optional. A missing query answers 0 and a missing
/// action does nothing. `userdata` is passed through untouched.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct WeaverHostCallbacks {
    pub userdata: *mut c_void,
    pub request_move: Option<unsafe extern "C" fn(userdata: *mut c_void)>,
    pub resource_pool: Option<unsafe extern "C" fn(userdata: *mut c_void) -> i32>,
    pub environment: Option<unsafe extern "C" fn(userdata: *mut c_void) -> i32>,
    pub spawn_effect: Option<unsafe extern "C" fn(userdata: *mut c_void, kind: i32)>,
    pub own_position:
        Option<unsafe extern "C" fn(userdata: *mut c_void, row: *mut i32, col: *mut i32)>,
    pub opposing_position:
        Option<unsafe extern "C" fn(userdata: *mut c_void, row: *mut i32, col: *mut i32)>,
    pub yield_turn: Option<unsafe extern "C" fn(userdata: *mut c_void)>,
    pub emit_char: Option<unsafe extern "C" fn(userdata: *mut c_void, code: i32)>,
}

impl Default for WeaverHostCallbacks {
    fn default() -> Self {
        Self {
            userdata: std::ptr::null_mut(),
            request_move: None,
            resource_pool: None,
            environment: None,
            spawn_effect: None,
            own_position: None,
            opposing_position: None,
            yield_turn: None,
            emit_char: None,
        }
    }
}

/// A [`SpellHost`] that forwards to C callbacks.
pub(crate) struct CallbackHost {
    callbacks: WeaverHostCallbacks,
}

impl CallbackHost {
    pub fn new(callbacks: WeaverHostCallbacks) -> Self {
        Self { callbacks }
    }

    fn position(
        &self,
        f: Option<unsafe extern "C" fn(*mut c_void, *mut i32, *mut i32)>,
    ) -> (i32, i32) {
        let (mut row, mut col) = (0, 0);
        if let Some(f) = f {
            unsafe { f(self.callbacks.userdata, &mut row, &mut col) };
        }
        (row, col)
    }
}

// The caller of `weaver_vm_new` guarantees the callbacks stay valid for the
// VM's lifetime.
impl SpellHost for CallbackHost {
    fn request_move(&mut self) {
        if let Some(f) = self.callbacks.request_move {
            unsafe { f(self.callbacks.userdata) }
        }
    }

    fn resource_pool(&mut self) -> i32 {
        match self.callbacks.resource_pool {
            Some(f) => unsafe { f(self.callbacks.userdata) },
            None => 0,
        }
    }

    fn environment(&mut self) -> i32 {
        match self.callbacks.environment {
            Some(f) => unsafe { f(self.callbacks.userdata) },
            None => 0,
        }
    }

    fn spawn_effect(&mut self, kind: i32) {
        if let Some(f) = self.callbacks.spawn_effect {
            unsafe { f(self.callbacks.userdata, kind) }
        }
    }

    fn own_position(&mut self) -> (i32, i32) {
        self.position(self.callbacks.own_position)
    }

    fn opposing_position(&mut self) -> (i32, i32) {
        self.position(self.callbacks.opposing_position)
    }

    fn yield_turn(&mut self) {
        if let Some(f) = self.callbacks.yield_turn {
            unsafe { f(self.callbacks.userdata) }
        }
    }

    fn emit_char(&mut self, code: i32) {
        if let Some(f) = self.callbacks.emit_char {
            unsafe { f(self.callbacks.userdata, code) }
        }
    }
}

/// Opaque VM instance type.
///
/// This is the main entry point for the FFI. All operations require
/// a valid `WeaverVm` pointer created by `weaver_vm_new()`.
#[repr(C)]
pub struct WeaverVm {
    _private: [u8; 0],
}

/// Internal VM wrapper that holds the actual Rust VM and FFI state.
pub(crate) struct VmWrapper {
    pub vm: Vm<CallbackHost>,
    /// Last error message (as CString for FFI compatibility)
    pub last_error: Option<CString>,
    pub error_callback: WeaverErrorFn,
    pub error_userdata: *mut c_void,
}

impl VmWrapper {
    pub fn new(callbacks: WeaverHostCallbacks) -> Self {
        Self {
            vm: Vm::new(CallbackHost::new(callbacks)),
            last_error: None,
            error_callback: None,
            error_userdata: std::ptr::null_mut(),
        }
    }

    /// Set an error message and optionally call the error callback.
    pub fn set_error(&mut self, message: impl Into<String>) {
        let c_msg = CString::new(message.into()).unwrap_or_default();

        if let Some(callback) = self.error_callback {
            unsafe {
                callback(c_msg.as_ptr(), self.error_userdata);
            }
        }

        self.last_error = Some(c_msg);
    }

    /// Clear the last error.
    pub fn clear_error(&mut self) {
        self.last_error = None;
    }
}
