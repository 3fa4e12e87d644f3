//! Runtime backends
//!
//! The tracer has exactly one backend: the roctracer interface of the
//! HSA/ROCm runtime. The wire-level types (activity records, domains, API
//! argument shapes) are always compiled so the engine can be exercised
//! without a GPU stack; the FFI declarations and callback shims require the
//! `rocm` feature.

pub mod roctracer;
