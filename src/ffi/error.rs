//! Error handling FFI functions.

#![allow(unsafe_op_in_unsafe_fn)]

use std::ffi::c_char;

use super::types::WeaverVm;
use super::vm_ffi::{get_wrapper, get_wrapper_mut};

/// Get the last error message.
///
/// Returns a pointer to the error message string, or NULL if no error.
/// The returned pointer is valid until the next API call that may set an error.
///
/// # Example (C)
/// ```c
/// if (weaver_load_bytecode(vm, data, len) != WeaverResult_Ok) {
///     printf("Error: %s\n", weaver_get_error(vm));
/// }
/// ```
#[unsafe(no_mangle)]
pub unsafe extern "C" fn weaver_get_error(vm: *const WeaverVm) -> *const c_char {
    match get_wrapper(vm).and_then(|w| w.last_error.as_ref()) {
        Some(error) => error.as_ptr(),
        None => std::ptr::null(),
    }
}

/// Clear the last error.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn weaver_clear_error(vm: *mut WeaverVm) {
    if let Some(wrapper) = get_wrapper_mut(vm) {
        wrapper.clear_error();
    }
}

/// Check if there is a pending error.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn weaver_has_error(vm: *const WeaverVm) -> bool {
    get_wrapper(vm).is_some_and(|w| w.last_error.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::vm_ffi::{weaver_vm_free, weaver_vm_new};
    use std::ffi::CStr;

    #[test]
    fn test_get_error() {
        unsafe {
            let vm = weaver_vm_new(std::ptr::null());

            assert!(weaver_get_error(vm).is_null());
            assert!(!weaver_has_error(vm));

            get_wrapper_mut(vm).unwrap().set_error("test error message");

            assert!(weaver_has_error(vm));
            let error = CStr::from_ptr(weaver_get_error(vm)).to_str().unwrap();
            assert_eq!(error, "test error message");

            weaver_clear_error(vm);
            assert!(!weaver_has_error(vm));
            assert!(weaver_get_error(vm).is_null());

            weaver_vm_free(vm);
        }
    }

    #[test]
    fn test_error_null_vm() {
        unsafe {
            assert!(weaver_get_error(std::ptr::null()).is_null());
            assert!(!weaver_has_error(std::ptr::null()));
            weaver_clear_error(std::ptr::null_mut());
        }
    }
}
