//! Program loading FFI functions.

#![allow(unsafe_op_in_unsafe_fn)]
#![allow(clippy::missing_safety_doc)]

use super::types::{WeaverInstruction, WeaverResult, WeaverVm};
use super::vm_ffi::get_wrapper_mut;
use crate::vm::{bytecode, Op, Program};

/// Load a program from serialized bytecode.
///
/// Any previous program, stack and heap are discarded.
///
/// # Returns
/// - `WeaverResult_Ok` on success
/// - `WeaverResult_ErrorInvalidArg` if data is NULL
/// - `WeaverResult_ErrorVerify` if the bytecode is malformed
#[unsafe(no_mangle)]
pub unsafe extern "C" fn weaver_load_bytecode(
    vm: *mut WeaverVm,
    data: *const u8,
    len: usize,
) -> WeaverResult {
    let Some(wrapper) = get_wrapper_mut(vm) else {
        return WeaverResult::ErrorInvalidArg;
    };

    if data.is_null() {
        wrapper.set_error("data pointer is NULL");
        return WeaverResult::ErrorInvalidArg;
    }

    let slice = std::slice::from_raw_parts(data, len);
    let program = match bytecode::deserialize(slice) {
        Ok(p) => p,
        Err(e) => {
            wrapper.set_error(format!("bytecode error: {}", e));
            return WeaverResult::ErrorVerify;
        }
    };

    wrapper.vm.load(program);
    wrapper.clear_error();
    WeaverResult::Ok
}

/// Load a program from `len` instruction records.
///
/// `instructions` may be NULL when `len` is 0.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn weaver_load_instructions(
    vm: *mut WeaverVm,
    instructions: *const WeaverInstruction,
    len: usize,
) -> WeaverResult {
    let Some(wrapper) = get_wrapper_mut(vm) else {
        return WeaverResult::ErrorInvalidArg;
    };

    let records = if len == 0 {
        &[][..]
    } else if instructions.is_null() {
        wrapper.set_error("instructions pointer is NULL");
        return WeaverResult::ErrorInvalidArg;
    } else {
        std::slice::from_raw_parts(instructions, len)
    };

    let program: Result<Program, _> = records
        .iter()
        .enumerate()
        .map(|(i, r)| {
            Op::from_parts(r.opcode, r.a, r.d, r.elem)
                .map_err(|e| format!("instruction {}: {}", i, e))
        })
        .collect();

    match program {
        Ok(program) => {
            wrapper.vm.load(program);
            wrapper.clear_error();
            WeaverResult::Ok
        }
        Err(message) => {
            wrapper.set_error(message);
            WeaverResult::ErrorVerify
        }
    }
}
