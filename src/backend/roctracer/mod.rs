//! roctracer backend
//!
//! Wire contract with the HSA/ROCm tracing runtime: activity record layout,
//! domain/op/phase enumerations, the host-API argument shapes, and (with the
//! `rocm` feature) the raw FFI surface.

pub mod api_args;
mod error;
#[cfg(feature = "rocm")]
pub mod ffi;
pub mod record;

pub use api_args::{ApiArgs, HostApiId};
pub use error::{RoctracerError, RoctracerResult};
pub use record::{ActivityDomain, ActivityRecord, ApiPhase, DeviceOp, RecordIter};
