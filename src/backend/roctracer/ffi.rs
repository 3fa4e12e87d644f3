//! roctracer FFI bindings
//!
//! FFI declarations below are bound to the ROCm tracing runtime. All
//! functions are called through the callback shims and the lifecycle
//! controller. The dead_code allowance is needed because FFI symbols appear
//! unused to the compiler (they're only called through unsafe blocks).

use std::ffi::{c_char, c_void};

/// API callback: `(domain, call_id, callback_data, user_arg)`
pub type ApiCallback =
    unsafe extern "C" fn(domain: u32, cid: u32, data: *const c_void, arg: *mut c_void);

/// Asynchronous activity callback: `[begin, end)` delimits a record buffer
pub type ActivityAsyncCallback =
    unsafe extern "C" fn(begin: *const c_char, end: *const c_char, arg: *mut c_void);

#[link(name = "roctracer64")]
#[allow(dead_code)]
extern "C" {
    pub fn roctracer_get_timestamp(timestamp: *mut u64) -> i32;
    pub fn roctracer_op_string(domain: u32, op: u32, kind: u32) -> *const c_char;
    pub fn roctracer_op_code(
        domain: u32,
        name: *const c_char,
        op: *mut u32,
        kind: *mut u32,
    ) -> i32;
    pub fn roctracer_set_properties(domain: u32, properties: *mut c_void) -> i32;
    pub fn roctracer_enable_domain_callback(
        domain: u32,
        callback: ApiCallback,
        arg: *mut c_void,
    ) -> i32;
    pub fn roctracer_enable_op_callback(
        domain: u32,
        op: u32,
        callback: ApiCallback,
        arg: *mut c_void,
    ) -> i32;
    pub fn roctracer_disable_domain_callback(domain: u32) -> i32;
    pub fn roctracer_enable_op_activity(domain: u32, op: u32) -> i32;
    pub fn roctracer_disable_op_activity(domain: u32, op: u32) -> i32;
    pub fn roctracer_flush_activity() -> i32;
    pub fn roctracer_error_string() -> *const c_char;
}

#[link(name = "amdhip64")]
#[allow(dead_code)]
extern "C" {
    pub fn hipKernelNameRef(function: *mut c_void) -> *const c_char;
    pub fn hipKernelNameRefByPtr(host_function: *const c_void, stream: *mut c_void)
        -> *const c_char;
}

/// roctracer success status
pub const ROCTRACER_STATUS_SUCCESS: i32 = 0;

/// Sentinel op code returned for unknown operation names
pub const API_ID_NUMBER: u32 = u32::MAX;

/// Check a roctracer status code, mapping failures to [`RoctracerError`]
pub fn check(call: &'static str, status: i32) -> super::RoctracerResult<()> {
    if status == ROCTRACER_STATUS_SUCCESS {
        Ok(())
    } else {
        Err(super::RoctracerError::Status { call, status })
    }
}

/// Query the runtime timestamp clock, in nanoseconds
pub fn device_timestamp_ns() -> super::RoctracerResult<u64> {
    let mut value = 0u64;
    let status = unsafe { roctracer_get_timestamp(&mut value) };
    check("roctracer_get_timestamp", status)?;
    Ok(value)
}

/// Resolve an operation name to its (op, kind) code pair
pub fn op_code(domain: u32, name: &str) -> super::RoctracerResult<u32> {
    let c_name = std::ffi::CString::new(name)
        .map_err(|_| super::RoctracerError::UnknownOp(name.to_string()))?;
    let mut op = API_ID_NUMBER;
    let mut kind = 0u32;
    let status = unsafe { roctracer_op_code(domain, c_name.as_ptr(), &mut op, &mut kind) };
    check("roctracer_op_code", status)?;
    if op == API_ID_NUMBER {
        return Err(super::RoctracerError::UnknownOp(name.to_string()));
    }
    Ok(op)
}
