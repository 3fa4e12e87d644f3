//! HSA tool entry points and callback shims
//!
//! The runtime `dlopen`s this library and calls the exported
//! `OnLoad`/`OnUnload`. Everything here is translation: raw callback data in,
//! engine types out. No tracing decisions are made at this layer.

use std::ffi::{c_char, c_void, CStr};

use crate::backend::roctracer::{
    ffi, ActivityDomain, ApiArgs, ApiPhase, DeviceOp, HostApiId, RecordIter, RoctracerResult,
};
use crate::config::delimit;

use super::host_api::{HostApiRecord, KernelNameResolver};
use super::Tracer;

/// Opaque HSA API table handed to `OnLoad`
#[repr(C)]
pub struct HsaApiTable {
    _private: [u8; 0],
}

/// Properties block installed on the ops domain
#[repr(C)]
struct HsaOpsProperties {
    table: *mut HsaApiTable,
    activity_callback: ffi::ActivityAsyncCallback,
    arg: *mut c_void,
    output_prefix: *const c_char,
}

/// Leading fields of the runtime's API callback data
///
/// The API-specific argument union follows this header in memory; the typed
/// views below read only the leading members they name.
#[repr(C)]
struct ApiCallbackHeader {
    correlation_id: u64,
    phase: u32,
}

#[repr(C)]
struct Dim3 {
    x: u32,
    y: u32,
    z: u32,
}

#[repr(C)]
struct LaunchKernelArgs {
    function_address: *const c_void,
    num_blocks: Dim3,
    dim_blocks: Dim3,
    args: *mut *mut c_void,
    shared_mem_bytes: usize,
    stream: *mut c_void,
}

#[repr(C)]
struct ModuleLaunchKernelArgs {
    f: *mut c_void,
    grid_dim_x: u32,
    grid_dim_y: u32,
    grid_dim_z: u32,
    block_dim_x: u32,
    block_dim_y: u32,
    block_dim_z: u32,
    shared_mem_bytes: u32,
    stream: *mut c_void,
}

#[repr(C)]
struct MemcpyAsyncArgs {
    dst: *mut c_void,
    src: *const c_void,
    size_bytes: usize,
    kind: u32,
    stream: *mut c_void,
}

#[repr(C)]
struct MemsetAsyncArgs {
    dst: *mut c_void,
    value: i32,
    size_bytes: usize,
    stream: *mut c_void,
}

/// APIs whose argument union leads with the stream
#[repr(C)]
struct StreamArgs {
    stream: *mut c_void,
}

#[repr(C)]
struct MemPrefetchAsyncArgs {
    dev_ptr: *const c_void,
    count: usize,
    device: i32,
    stream: *mut c_void,
}

#[repr(C)]
struct EventRecordArgs {
    event: *mut c_void,
    stream: *mut c_void,
}

unsafe fn args_ptr<T>(data: *const ApiCallbackHeader) -> *const T {
    (data as *const u8).add(std::mem::size_of::<ApiCallbackHeader>()) as *const T
}

/// Decode the API-specific union into the engine's argument shape
unsafe fn decode_args(id: Option<HostApiId>, data: *const ApiCallbackHeader) -> ApiArgs {
    use HostApiId::*;
    let Some(id) = id else {
        return ApiArgs::None;
    };
    match id {
        LaunchKernel | LaunchCooperativeKernel | ExtLaunchKernel => {
            let args = &*args_ptr::<LaunchKernelArgs>(data);
            ApiArgs::Launch {
                function: args.function_address as usize,
                stream: args.stream as usize,
            }
        }
        ModuleLaunchKernel | ExtModuleLaunchKernel => {
            let args = &*args_ptr::<ModuleLaunchKernelArgs>(data);
            ApiArgs::Launch {
                function: args.f as usize,
                stream: args.stream as usize,
            }
        }
        MemcpyAsync | MemcpyHtoDAsync | MemcpyDtoHAsync | MemcpyDtoDAsync => {
            let args = &*args_ptr::<MemcpyAsyncArgs>(data);
            ApiArgs::Stream {
                stream: args.stream as usize,
            }
        }
        MemsetAsync => {
            let args = &*args_ptr::<MemsetAsyncArgs>(data);
            ApiArgs::Stream {
                stream: args.stream as usize,
            }
        }
        StreamSynchronize | StreamWaitEvent | StreamDestroy | StreamQuery => {
            let args = &*args_ptr::<StreamArgs>(data);
            ApiArgs::Stream {
                stream: args.stream as usize,
            }
        }
        MemPrefetchAsync => {
            let args = &*args_ptr::<MemPrefetchAsyncArgs>(data);
            ApiArgs::Stream {
                stream: args.stream as usize,
            }
        }
        EventRecord => {
            let args = &*args_ptr::<EventRecordArgs>(data);
            ApiArgs::Stream {
                stream: args.stream as usize,
            }
        }
        _ => ApiArgs::None,
    }
}

/// The runtime's pointer-to-name helper
pub struct RuntimeResolver;

impl KernelNameResolver for RuntimeResolver {
    fn resolve(&self, id: HostApiId, args: &ApiArgs) -> Option<String> {
        let ApiArgs::Launch { function, stream } = *args else {
            return None;
        };
        let name = unsafe {
            match id {
                HostApiId::ModuleLaunchKernel | HostApiId::ExtModuleLaunchKernel => {
                    ffi::hipKernelNameRef(function as *mut c_void)
                }
                _ => ffi::hipKernelNameRefByPtr(
                    function as *const c_void,
                    stream as *mut c_void,
                ),
            }
        };
        if name.is_null() {
            return None;
        }
        Some(unsafe { CStr::from_ptr(name) }.to_string_lossy().into_owned())
    }
}

/// Host-API (HIP domain) callback shim
unsafe extern "C" fn hip_api_callback(
    _domain: u32,
    cid: u32,
    data: *const c_void,
    _arg: *mut c_void,
) {
    if data.is_null() {
        return;
    }
    let header = &*(data as *const ApiCallbackHeader);
    let Some(phase) = ApiPhase::from_u32(header.phase) else {
        return;
    };
    let record = HostApiRecord {
        call_id: cid,
        phase,
        correlation_id: header.correlation_id,
        args: decode_args(
            HostApiId::from_u32(cid),
            data as *const ApiCallbackHeader,
        ),
    };
    Tracer::global().host_api_callback(&record);
}

/// HSA-API channel callback shim
unsafe extern "C" fn hsa_api_callback(
    domain: u32,
    cid: u32,
    data: *const c_void,
    _arg: *mut c_void,
) {
    if data.is_null() {
        return;
    }
    let header = &*(data as *const ApiCallbackHeader);
    let Some(phase) = ApiPhase::from_u32(header.phase) else {
        return;
    };
    let name_ptr = ffi::roctracer_op_string(domain, cid, 0);
    let name = if name_ptr.is_null() {
        return;
    } else {
        CStr::from_ptr(name_ptr).to_string_lossy()
    };
    Tracer::global().hsa_api_callback(cid, &name, phase, header.correlation_id);
}

/// Asynchronous activity callback shim
unsafe extern "C" fn activity_callback(
    begin: *const c_char,
    end: *const c_char,
    _arg: *mut c_void,
) {
    if begin.is_null() || end.is_null() {
        return;
    }
    Tracer::global().activity_callback(RecordIter::from_raw(begin, end));
}

/// Device timestamp source for the clock reconciler
fn device_now() -> RoctracerResult<u64> {
    ffi::device_timestamp_ns()
}

/// Enable the host-API channel: whole domain, or each named op individually
fn enable_hsa_api_channel() -> RoctracerResult<()> {
    let types = &Tracer::global().settings().trace_hsa_api_types;
    let api_names: Vec<String> = types
        .iter()
        .flat_map(|entry| delimit(entry))
        .collect();
    if api_names.is_empty() {
        ffi::check("roctracer_enable_domain_callback", unsafe {
            ffi::roctracer_enable_domain_callback(
                ActivityDomain::HsaApi as u32,
                hsa_api_callback,
                std::ptr::null_mut(),
            )
        })?;
    } else {
        for name in &api_names {
            let op = ffi::op_code(ActivityDomain::HsaApi as u32, name)?;
            ffi::check("roctracer_enable_op_callback", unsafe {
                ffi::roctracer_enable_op_callback(
                    ActivityDomain::HsaApi as u32,
                    op,
                    hsa_api_callback,
                    std::ptr::null_mut(),
                )
            })?;
        }
    }
    Ok(())
}

/// Enable the asynchronous activity channel
fn enable_activity_channel(table: *mut HsaApiTable) -> RoctracerResult<()> {
    let mut properties = HsaOpsProperties {
        table,
        activity_callback,
        arg: std::ptr::null_mut(),
        output_prefix: std::ptr::null(),
    };
    ffi::check("roctracer_set_properties", unsafe {
        ffi::roctracer_set_properties(
            ActivityDomain::HsaOps as u32,
            &mut properties as *mut HsaOpsProperties as *mut c_void,
        )
    })?;
    ffi::check("roctracer_enable_op_activity", unsafe {
        ffi::roctracer_enable_op_activity(ActivityDomain::HsaOps as u32, DeviceOp::Copy as u32)
    })
}

fn channel_setup(table: *mut HsaApiTable) {
    let settings = Tracer::global().settings();
    if settings.trace_hsa_api {
        // the API table must be installed before any callback is enabled
        let install = ffi::check("roctracer_set_properties", unsafe {
            ffi::roctracer_set_properties(ActivityDomain::HsaApi as u32, table as *mut c_void)
        });
        match install.and_then(|_| enable_hsa_api_channel()) {
            Ok(()) => {}
            Err(err) => tracing::error!("HSA API channel setup failed: {err}"),
        }
    }
    if settings.trace_hsa_activity {
        if let Err(err) = enable_activity_channel(table) {
            tracing::error!("HSA activity channel setup failed: {err}");
        }
    }
}

fn channel_shutdown() {
    let status = unsafe { ffi::roctracer_disable_domain_callback(ActivityDomain::HsaApi as u32) };
    if let Err(err) = ffi::check("roctracer_disable_domain_callback", status) {
        tracing::debug!("disabling HSA API callbacks: {err}");
    }
    let status = unsafe {
        ffi::roctracer_disable_op_activity(ActivityDomain::HsaOps as u32, DeviceOp::Copy as u32)
    };
    if let Err(err) = ffi::check("roctracer_disable_op_activity", status) {
        tracing::debug!("disabling HSA op activity: {err}");
    }
}

/// HSA-runtime tool on-load entry point
///
/// # Safety
///
/// Called by the runtime loader with a valid API table.
#[no_mangle]
pub unsafe extern "C" fn OnLoad(
    table: *mut HsaApiTable,
    _runtime_version: u64,
    _failed_tool_count: u64,
    _failed_tool_names: *const *const c_char,
) -> bool {
    let tracer = Tracer::global();
    tracer.set_kernel_name_resolver(std::sync::Arc::new(RuntimeResolver));
    let table_addr = table as usize;
    tracer.on_load(
        device_now,
        move || channel_setup(table_addr as *mut HsaApiTable),
        channel_shutdown,
    )
}

/// HSA-runtime tool on-unload entry point
///
/// # Safety
///
/// Called by the runtime loader after the application exits.
#[no_mangle]
pub unsafe extern "C" fn OnUnload() {
    Tracer::global().on_unload();
}
