//! VM lifecycle and configuration FFI functions.

#![allow(unsafe_op_in_unsafe_fn)]

use std::ffi::c_void;

use super::types::{VmWrapper, WeaverErrorFn, WeaverHostCallbacks, WeaverVm};
use crate::config::SyscallMode;

/// Create a new VM instance.
///
/// `callbacks` may be NULL, in which case every syscall answers 0 and does
/// nothing. The callbacks are copied; their `userdata` must outlive the VM.
/// The returned VM must be freed with `weaver_vm_free()`.
///
/// # Example (C)
/// ```c
/// WeaverHostCallbacks host = { .userdata = game, .emit_char = on_char };
/// WeaverVm *vm = weaver_vm_new(&host);
/// // ... use vm ...
/// weaver_vm_free(vm);
/// ```
#[unsafe(no_mangle)]
pub unsafe extern "C" fn weaver_vm_new(callbacks: *const WeaverHostCallbacks) -> *mut WeaverVm {
    let callbacks = if callbacks.is_null() {
        WeaverHostCallbacks::default()
    } else {
        *callbacks
    };
    let wrapper = Box::new(VmWrapper::new(callbacks));
    Box::into_raw(wrapper) as *mut WeaverVm
}

/// Free a VM instance.
///
/// # Safety
///
/// - `vm` must be a valid pointer returned by `weaver_vm_new()`
/// - `vm` must not have been freed already
#[unsafe(no_mangle)]
pub unsafe extern "C" fn weaver_vm_free(vm: *mut WeaverVm) {
    if vm.is_null() {
        return;
    }
    let _ = Box::from_raw(vm as *mut VmWrapper);
}

/// Set the error callback function (or NULL to disable).
#[unsafe(no_mangle)]
pub unsafe extern "C" fn weaver_set_error_callback(
    vm: *mut WeaverVm,
    callback: WeaverErrorFn,
    userdata: *mut c_void,
) {
    if let Some(wrapper) = get_wrapper_mut(vm) {
        wrapper.error_callback = callback;
        wrapper.error_userdata = userdata;
    }
}

/// Set the number of instructions between collections (0 disables).
#[unsafe(no_mangle)]
pub unsafe extern "C" fn weaver_set_gc_interval(vm: *mut WeaverVm, interval: u64) {
    if let Some(wrapper) = get_wrapper_mut(vm) {
        wrapper.vm.config_mut().gc_interval = interval;
    }
}

/// Fault on unknown syscall codes instead of ignoring them.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn weaver_set_strict_syscalls(vm: *mut WeaverVm, strict: bool) {
    if let Some(wrapper) = get_wrapper_mut(vm) {
        wrapper.vm.config_mut().syscall_mode = if strict {
            SyscallMode::Strict
        } else {
            SyscallMode::Lenient
        };
    }
}

/// Make `weaver_run` return after every syscall.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn weaver_set_pause_on_syscall(vm: *mut WeaverVm, pause: bool) {
    if let Some(wrapper) = get_wrapper_mut(vm) {
        wrapper.vm.config_mut().pause_on_syscall = pause;
    }
}

/// Check if a program is loaded and can still run.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn weaver_is_running(vm: *const WeaverVm) -> bool {
    match get_wrapper(vm) {
        Some(wrapper) => wrapper.vm.state() == &crate::vm::ExecState::Ready,
        None => false,
    }
}

/// Stop the loaded program. Returns false if nothing was running.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn weaver_cancel(vm: *mut WeaverVm) -> bool {
    match get_wrapper_mut(vm) {
        Some(wrapper) => wrapper.vm.cancel(),
        None => false,
    }
}

/// Helper to get a mutable reference to the wrapper from a raw pointer.
///
/// Returns None if the pointer is null.
pub(crate) unsafe fn get_wrapper_mut(vm: *mut WeaverVm) -> Option<&'static mut VmWrapper> {
    if vm.is_null() {
        None
    } else {
        Some(&mut *(vm as *mut VmWrapper))
    }
}

/// Helper to get an immutable reference to the wrapper from a raw pointer.
///
/// Returns None if the pointer is null.
pub(crate) unsafe fn get_wrapper(vm: *const WeaverVm) -> Option<&'static VmWrapper> {
    if vm.is_null() {
        None
    } else {
        Some(&*(vm as *const VmWrapper))
    }
}
