//! In-memory event sink
//!
//! Records every event it receives, in arrival order, for inspection. Used
//! by the test suites and as a debugging aid when diagnosing sink ordering
//! issues.

use std::sync::Mutex;

use super::{DeviceSpanInfo, EventSink, HostFlow};

/// One recorded sink event
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    PushRegion {
        label: String,
    },
    PopRegion {
        label: String,
    },
    BeginHostSpan {
        label: String,
        begin_ns: u64,
        flow: HostFlow,
    },
    EndHostSpan {
        end_ns: u64,
    },
    Span {
        label: String,
        begin_ns: u64,
        end_ns: u64,
        info: DeviceSpanInfo,
    },
    Duration {
        label: String,
        duration_ns: u64,
    },
}

/// Sink that appends every event to an internal vector
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<SinkEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far, in arrival order
    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Drop all recorded events
    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }

    fn record(&self, event: SinkEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl EventSink for MemorySink {
    fn push_region(&self, label: &'static str) {
        self.record(SinkEvent::PushRegion {
            label: label.to_string(),
        });
    }

    fn pop_region(&self, label: &'static str) {
        self.record(SinkEvent::PopRegion {
            label: label.to_string(),
        });
    }

    fn begin_host_span(&self, label: &str, begin_ns: u64, flow: &HostFlow) {
        self.record(SinkEvent::BeginHostSpan {
            label: label.to_string(),
            begin_ns,
            flow: *flow,
        });
    }

    fn end_host_span(&self, end_ns: u64) {
        self.record(SinkEvent::EndHostSpan { end_ns });
    }

    fn emit_span(&self, label: &str, begin_ns: u64, end_ns: u64, info: &DeviceSpanInfo) {
        self.record(SinkEvent::Span {
            label: label.to_string(),
            begin_ns,
            end_ns,
            info: *info,
        });
    }

    fn record_duration(&self, label: &str, duration_ns: u64) {
        self.record(SinkEvent::Duration {
            label: label.to_string(),
            duration_ns,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_in_order() {
        let sink = MemorySink::new();
        sink.push_region("f");
        sink.push_region("g");
        sink.pop_region("g");
        sink.pop_region("f");

        let events = sink.events();
        assert_eq!(events.len(), 4);
        assert_eq!(
            events[0],
            SinkEvent::PushRegion {
                label: "f".to_string()
            }
        );
        assert_eq!(
            events[3],
            SinkEvent::PopRegion {
                label: "f".to_string()
            }
        );
    }

    #[test]
    fn test_clear() {
        let sink = MemorySink::new();
        sink.record_duration("x", 10);
        assert_eq!(sink.events().len(), 1);
        sink.clear();
        assert!(sink.events().is_empty());
    }
}
