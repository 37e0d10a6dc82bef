//! Stack manipulation FFI functions.
//!
//! A host uses these between `weaver_run` slices to feed arguments to a
//! spell or read its results.

#![allow(unsafe_op_in_unsafe_fn)]

use super::types::{WeaverResult, WeaverVm};
use super::vm_ffi::{get_wrapper, get_wrapper_mut};
use crate::vm::{Value, VmError};

unsafe fn push(vm: *mut WeaverVm, value: Value) -> WeaverResult {
    let Some(wrapper) = get_wrapper_mut(vm) else {
        return WeaverResult::ErrorInvalidArg;
    };
    match wrapper.vm.stack_mut().push(value) {
        Ok(()) => WeaverResult::Ok,
        Err(e) => {
            wrapper.set_error(e.to_string());
            WeaverResult::ErrorStack
        }
    }
}

fn stack_error(e: &VmError) -> WeaverResult {
    match e {
        VmError::TypeMismatch { .. } => WeaverResult::ErrorType,
        _ => WeaverResult::ErrorStack,
    }
}

// =============================================================================
// Push Functions
// =============================================================================

/// Push an int onto the operand stack.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn weaver_push_int(vm: *mut WeaverVm, value: i32) -> WeaverResult {
    push(vm, Value::Int(value))
}

/// Push a double onto the operand stack.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn weaver_push_double(vm: *mut WeaverVm, value: f64) -> WeaverResult {
    push(vm, Value::Double(value))
}

// =============================================================================
// Pop Functions
// =============================================================================

/// Pop an int from the operand stack into `out`.
///
/// Returns false (leaving the stack untouched) if the stack is empty or
/// the top value is not an int.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn weaver_pop_int(vm: *mut WeaverVm, out: *mut i32) -> bool {
    let Some(wrapper) = get_wrapper_mut(vm) else {
        return false;
    };
    match wrapper.vm.stack_mut().pop_int() {
        Ok(v) => {
            if !out.is_null() {
                *out = v;
            }
            true
        }
        Err(e) => {
            wrapper.set_error(e.to_string());
            false
        }
    }
}

/// Pop a double from the operand stack into `out`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn weaver_pop_double(vm: *mut WeaverVm, out: *mut f64) -> bool {
    let Some(wrapper) = get_wrapper_mut(vm) else {
        return false;
    };
    match wrapper.vm.stack_mut().pop_double() {
        Ok(v) => {
            if !out.is_null() {
                *out = v;
            }
            true
        }
        Err(e) => {
            wrapper.set_error(e.to_string());
            false
        }
    }
}

/// Read the int `k` slots below the top without popping.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn weaver_peek_int(vm: *const WeaverVm, k: u32, out: *mut i32) -> WeaverResult {
    let Some(wrapper) = get_wrapper(vm) else {
        return WeaverResult::ErrorInvalidArg;
    };
    let value = match wrapper.vm.stack().peek(k) {
        Ok(v) => v,
        Err(e) => return stack_error(&e),
    };
    match value.as_int() {
        Some(v) => {
            if !out.is_null() {
                *out = v;
            }
            WeaverResult::Ok
        }
        None => WeaverResult::ErrorType,
    }
}

/// Get the number of values on the operand stack.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn weaver_stack_len(vm: *const WeaverVm) -> usize {
    get_wrapper(vm).map_or(0, |w| w.vm.stack().len())
}
