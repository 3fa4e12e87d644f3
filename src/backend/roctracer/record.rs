//! Activity record layout and buffer iteration
//!
//! The runtime delivers completed device operations as a packed buffer of
//! fixed-layout records delimited by a `[begin, end)` pointer pair. The
//! iterator here owns the cursor: `next()` advances before the caller sees
//! the record, so every skip path in the consumer has already advanced.

use std::ffi::c_char;

/// Callback domains of the tracing runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ActivityDomain {
    HsaApi = 0,
    HsaOps = 1,
    HipOps = 2,
    HipApi = 3,
}

impl ActivityDomain {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(ActivityDomain::HsaApi),
            1 => Some(ActivityDomain::HsaOps),
            2 => Some(ActivityDomain::HipOps),
            3 => Some(ActivityDomain::HipApi),
            _ => None,
        }
    }
}

/// Device-side operation classes within the ops domains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum DeviceOp {
    Dispatch = 0,
    Copy = 1,
    Barrier = 2,
}

impl DeviceOp {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(DeviceOp::Dispatch),
            1 => Some(DeviceOp::Copy),
            2 => Some(DeviceOp::Barrier),
            _ => None,
        }
    }

    /// Generic operation name used when the correlation registry has no entry
    pub fn fallback_name(self) -> &'static str {
        match self {
            DeviceOp::Dispatch => "DISPATCH",
            DeviceOp::Copy => "COPY",
            DeviceOp::Barrier => "BARRIER",
        }
    }

    /// Runtime-style op string ("hsa_dispatch" etc.) for host-side labels
    pub fn op_string(self) -> &'static str {
        match self {
            DeviceOp::Dispatch => "hsa_dispatch",
            DeviceOp::Copy => "hsa_async_copy",
            DeviceOp::Barrier => "hsa_barrier",
        }
    }
}

/// Phase of a host-API callback invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ApiPhase {
    Enter = 0,
    Exit = 1,
}

impl ApiPhase {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(ApiPhase::Enter),
            1 => Some(ApiPhase::Exit),
            _ => None,
        }
    }
}

/// One completed device operation as delivered by the runtime
///
/// Layout is part of the wire contract; the runtime writes these back to
/// back into the buffer handed to the activity callback.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityRecord {
    pub domain: u32,
    pub op: u32,
    pub kind: u32,
    pub correlation_id: u64,
    pub begin_ns: u64,
    pub end_ns: u64,
    pub device_id: i32,
    pub process_id: u32,
    pub queue_id: u64,
}

impl ActivityRecord {
    /// The domain, if it is one the tracer understands
    pub fn activity_domain(&self) -> Option<ActivityDomain> {
        ActivityDomain::from_u32(self.domain)
    }

    /// The device op, if `op` is within the declared range
    pub fn device_op(&self) -> Option<DeviceOp> {
        DeviceOp::from_u32(self.op)
    }
}

/// Iterator over a packed `[begin, end)` record buffer
///
/// The cursor advances by one record stride on every `next()` call, before
/// the record is handed out; truncated trailing bytes are never yielded.
pub struct RecordIter {
    cur: *const ActivityRecord,
    end: *const ActivityRecord,
}

impl RecordIter {
    /// Build an iterator from the runtime's raw pointer pair.
    ///
    /// # Safety
    ///
    /// `begin..end` must describe a readable buffer of whole
    /// [`ActivityRecord`]s for the lifetime of the iterator. An empty buffer
    /// (`begin == end`) is valid and yields nothing.
    pub unsafe fn from_raw(begin: *const c_char, end: *const c_char) -> Self {
        let len = (end as usize).saturating_sub(begin as usize);
        let count = len / std::mem::size_of::<ActivityRecord>();
        let cur = begin as *const ActivityRecord;
        RecordIter {
            cur,
            end: cur.wrapping_add(count),
        }
    }

    /// Iterator over an in-memory record slice (test entry point)
    pub fn from_slice(records: &[ActivityRecord]) -> Self {
        let range = records.as_ptr_range();
        RecordIter {
            cur: range.start,
            end: range.end,
        }
    }
}

impl Iterator for RecordIter {
    type Item = ActivityRecord;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cur >= self.end {
            return None;
        }
        // Copy out, then advance unconditionally.
        let record = unsafe { *self.cur };
        self.cur = self.cur.wrapping_add(1);
        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(op: u32, corr_id: u64) -> ActivityRecord {
        ActivityRecord {
            domain: ActivityDomain::HsaOps as u32,
            op,
            kind: 0,
            correlation_id: corr_id,
            begin_ns: 1000,
            end_ns: 2000,
            device_id: 0,
            process_id: 42,
            queue_id: 1,
        }
    }

    #[test]
    fn test_empty_buffer_yields_nothing() {
        let records: Vec<ActivityRecord> = Vec::new();
        assert_eq!(RecordIter::from_slice(&records).count(), 0);
    }

    #[test]
    fn test_iteration_preserves_order() {
        let records = vec![record(0, 1), record(1, 2), record(2, 3)];
        let ids: Vec<u64> = RecordIter::from_slice(&records)
            .map(|r| r.correlation_id)
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_from_raw_empty_and_truncated() {
        let records = vec![record(0, 1), record(1, 2)];
        let base = records.as_ptr() as *const c_char;
        // begin == end
        let iter = unsafe { RecordIter::from_raw(base, base) };
        assert_eq!(iter.count(), 0);
        // a trailing partial record is not yielded
        let stride = std::mem::size_of::<ActivityRecord>();
        let end = unsafe { base.add(stride + stride / 2) };
        let iter = unsafe { RecordIter::from_raw(base, end) };
        assert_eq!(iter.count(), 1);
    }

    #[test]
    fn test_device_op_range() {
        assert_eq!(DeviceOp::from_u32(0), Some(DeviceOp::Dispatch));
        assert_eq!(DeviceOp::from_u32(2), Some(DeviceOp::Barrier));
        assert_eq!(DeviceOp::from_u32(3), None);
    }

    #[test]
    fn test_fallback_names() {
        assert_eq!(DeviceOp::Copy.fallback_name(), "COPY");
        assert_eq!(DeviceOp::Dispatch.op_string(), "hsa_dispatch");
    }

    #[test]
    fn test_phase_from_u32() {
        assert_eq!(ApiPhase::from_u32(0), Some(ApiPhase::Enter));
        assert_eq!(ApiPhase::from_u32(1), Some(ApiPhase::Exit));
        assert_eq!(ApiPhase::from_u32(9), None);
    }
}
