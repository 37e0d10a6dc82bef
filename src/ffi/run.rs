//! Execution FFI functions.

#![allow(unsafe_op_in_unsafe_fn)]

use super::types::{WeaverProgress, WeaverStatus, WeaverVm};
use super::vm_ffi::{get_wrapper, get_wrapper_mut};
use crate::vm::Exit;

/// Run the loaded program for at most `max_instructions` instructions.
///
/// Returns the code of the syscall the VM paused at, or -1. When `out` is
/// not NULL it receives the full outcome. On a fault the message is
/// available from `weaver_get_error`.
///
/// # Example (C)
/// ```c
/// WeaverProgress p;
/// int call = weaver_run(vm, 1000, &p);
/// if (p.status == WeaverStatus_Faulted) {
///     printf("Error: %s\n", weaver_get_error(vm));
/// }
/// ```
#[unsafe(no_mangle)]
pub unsafe extern "C" fn weaver_run(
    vm: *mut WeaverVm,
    max_instructions: u64,
    out: *mut WeaverProgress,
) -> i32 {
    let Some(wrapper) = get_wrapper_mut(vm) else {
        return -1;
    };

    let progress = wrapper.vm.resume(max_instructions);
    let (status, syscall) = match &progress.exit {
        Exit::Halted => (WeaverStatus::Halted, -1),
        Exit::BudgetExhausted => (WeaverStatus::BudgetExhausted, -1),
        Exit::Paused(call) => (WeaverStatus::Paused, call.code()),
        Exit::Faulted(fault) => {
            wrapper.set_error(fault.to_string());
            (WeaverStatus::Faulted, -1)
        }
    };

    if !out.is_null() {
        *out = WeaverProgress {
            status,
            syscall,
            executed: progress.executed,
        };
    }
    syscall
}

/// Index of the next instruction to execute.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn weaver_ip(vm: *const WeaverVm) -> usize {
    get_wrapper(vm).map_or(0, |w| w.vm.ip())
}

/// Instructions executed since the program was loaded.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn weaver_steps(vm: *const WeaverVm) -> u64 {
    get_wrapper(vm).map_or(0, |w| w.vm.steps())
}

/// Collect unreachable arrays now. Returns the number freed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn weaver_collect_garbage(vm: *mut WeaverVm) -> usize {
    get_wrapper_mut(vm).map_or(0, |w| w.vm.collect_garbage())
}
