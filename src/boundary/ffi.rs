//! C ABI
//!
//! Every export takes NUL-terminated UTF-8 strings and returns a newly
//! allocated one that the caller must release with [`free_string`]. Failures,
//! panics included, come back as `{"error": "<message>"}` instead of
//! unwinding into the caller.
//!
//! `deploy` and `call` use the process-wide persistent store;
//! `call_with_state` runs against a store built from the supplied initial
//! states and thrown away afterwards.

use crate::boundary::adapter::{
    call_json, call_with_state_json, deploy_hex, error_json, BoundaryError,
};
use crate::dispatch::Dispatcher;
use std::ffi::{c_char, CStr, CString};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;

/// Borrow a C string argument
///
/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated string that outlives `'a`.
unsafe fn read_arg<'a>(ptr: *const c_char, name: &'static str) -> Result<&'a str, BoundaryError> {
    if ptr.is_null() {
        return Err(BoundaryError::NullPointer(name));
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map_err(|_| BoundaryError::InvalidUtf8(name))
}

/// Run `f`, render its result and hand ownership of the string to the caller
fn respond(operation: &str, f: impl FnOnce() -> Result<String, BoundaryError>) -> *mut c_char {
    let result = panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Err(BoundaryError::Panic(message))
    });

    let text = match result {
        Ok(text) => text,
        Err(e) => {
            log::warn!("{} failed: {}", operation, e);
            error_json(&e)
        }
    };
    // Hex and JSON output never contain NUL
    CString::new(text)
        .map(CString::into_raw)
        .unwrap_or(ptr::null_mut())
}

/// Deploy hex `bytecode` on behalf of `owner`; returns the address as hex
///
/// # Safety
///
/// Both arguments must be null or valid NUL-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn deploy(bytecode: *const c_char, owner: *const c_char) -> *mut c_char {
    respond("deploy", || {
        let bytecode = read_arg(bytecode, "bytecode")?;
        let owner = read_arg(owner, "owner")?;
        deploy_hex(&Dispatcher::persistent(), bytecode, owner)
    })
}

/// Call `target` with hex `calldata`; returns `[success, [bytes...]]`
///
/// # Safety
///
/// Every argument must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn call(
    target: *const c_char,
    caller: *const c_char,
    calldata: *const c_char,
) -> *mut c_char {
    respond("call", || {
        let target = read_arg(target, "target")?;
        let caller = read_arg(caller, "caller")?;
        let calldata = read_arg(calldata, "calldata")?;
        call_json(&Dispatcher::persistent(), target, caller, calldata)
    })
}

/// Like [`call`], against a throwaway store built from `initial_states` JSON
///
/// # Safety
///
/// Every argument must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn call_with_state(
    initial_states: *const c_char,
    target: *const c_char,
    caller: *const c_char,
    calldata: *const c_char,
) -> *mut c_char {
    respond("call_with_state", || {
        let initial_states = read_arg(initial_states, "initial_states")?;
        let target = read_arg(target, "target")?;
        let caller = read_arg(caller, "caller")?;
        let calldata = read_arg(calldata, "calldata")?;
        call_with_state_json(initial_states, target, caller, calldata)
    })
}

/// Release a string returned by this library
///
/// # Safety
///
/// `ptr` must be null or a pointer returned by this library that has not been
/// freed yet.
#[no_mangle]
pub unsafe extern "C" fn free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}
