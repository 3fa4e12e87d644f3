//! Region- and span-emission interface consumed by the tracing engine
//!
//! Sinks are external collaborators (timeline writers, statistical
//! summaries). The engine only ever talks to them through [`EventSink`];
//! everything behind the trait is out of scope here. Sink implementations
//! are not required to be reentrant across threads: the engine guarantees
//! that region push/pop and host spans arrive on the thread that owns them,
//! and that device spans arrive on the origin thread via the deferred queues.

mod memory;

pub use memory::{MemorySink, SinkEvent};

use std::sync::{Arc, RwLock};

/// Flow annotations for a host-side call span
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostFlow {
    pub correlation_id: u64,
    pub cid: u64,
    pub parent_cid: u64,
    pub depth: u16,
    pub thread_id: i64,
    /// Stream handle of the call, 0 when the API carries none
    pub queue: usize,
}

/// Annotations for a completed device operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceSpanInfo {
    pub correlation_id: u64,
    /// Causal-chain id of the originating host call, 0 when unknown
    pub cid: u64,
    pub device_id: i32,
    pub queue_id: u64,
    /// Operation class: "DISPATCH", "COPY" or "BARRIER"
    pub op: &'static str,
    /// Origin thread the span is attributed to
    pub thread_id: i64,
}

/// Event consumer interface
///
/// `push_region`/`pop_region` labels are stable for the lifetime of the trace
/// session; sinks may key on the pointer. All methods default to no-ops so a
/// sink only implements the channels it persists.
pub trait EventSink: Send + Sync {
    /// Begin a region on the calling thread; paired with `pop_region`
    fn push_region(&self, _label: &'static str) {}

    /// End the innermost region with this label on the calling thread
    fn pop_region(&self, _label: &'static str) {}

    /// Begin a host-side call span at `begin_ns`
    fn begin_host_span(&self, _label: &str, _begin_ns: u64, _flow: &HostFlow) {}

    /// End the host-side call span opened on this thread
    fn end_host_span(&self, _end_ns: u64) {}

    /// A completed device operation, already skew-corrected
    fn emit_span(&self, _label: &str, _begin_ns: u64, _end_ns: u64, _info: &DeviceSpanInfo) {}

    /// Wall-clock duration sample for the statistical summary
    fn record_duration(&self, _label: &str, _duration_ns: u64) {}
}

/// Set of installed sinks
///
/// Installation happens during session setup; the callback paths only take
/// snapshots. The snapshot is what deferred closures capture, so a sink
/// uninstalled mid-flight still receives the events already queued for it.
#[derive(Default)]
pub struct SinkRegistry {
    sinks: RwLock<Vec<Arc<dyn EventSink>>>,
}

impl SinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a sink; events flow to it from the next snapshot on
    pub fn install(&self, sink: Arc<dyn EventSink>) {
        if let Ok(mut sinks) = self.sinks.write() {
            sinks.push(sink);
        }
    }

    /// Remove every installed sink
    pub fn clear(&self) {
        if let Ok(mut sinks) = self.sinks.write() {
            sinks.clear();
        }
    }

    /// Cheap clone of the current sink set
    pub fn snapshot(&self) -> Vec<Arc<dyn EventSink>> {
        self.sinks.read().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.read().map(|s| s.is_empty()).unwrap_or(true)
    }
}
