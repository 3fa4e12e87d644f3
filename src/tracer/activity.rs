//! Activity callback pipeline
//!
//! Entered on a runtime-owned worker thread with a buffer of completed
//! device operations. Each record is joined against the correlation
//! registry, skew-corrected onto the host timeline, and packaged as a
//! deferred closure on the origin thread's queue; the sink writers are not
//! reentrant across threads, so emission happens where the originating host
//! call lives.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::backend::roctracer::{ActivityDomain, ActivityRecord};
use crate::sink::DeviceSpanInfo;

use super::clock::apply_skew;
use super::threading;
use super::Tracer;

thread_local! {
    /// Demangled-name cache of the worker thread, keyed by the interned
    /// symbol pointer
    static DEMANGLE_CACHE: RefCell<HashMap<usize, String>> = RefCell::new(HashMap::new());
}

/// Demangle a kernel symbol, caching per worker thread
///
/// Names that do not demangle (already-plain names, the generic fallbacks)
/// pass through unchanged.
fn demangled(name: &'static str) -> String {
    DEMANGLE_CACHE.with(|cache| {
        let mut cache = cache.borrow_mut();
        cache
            .entry(name.as_ptr() as usize)
            .or_insert_with(|| {
                cpp_demangle::Symbol::new(name.as_bytes())
                    .map(|symbol| symbol.to_string())
                    .unwrap_or_else(|_| name.to_string())
            })
            .clone()
    })
}

impl Tracer {
    /// The asynchronous activity callback body
    ///
    /// `records` walks the `[begin, end)` buffer the runtime handed us; the
    /// iterator advances on every step, including the skip paths.
    pub fn activity_callback<I>(&self, records: I)
    where
        I: Iterator<Item = ActivityRecord>,
    {
        if self.state() != crate::config::State::Active {
            return;
        }

        // keep the external sampler from interrupting this worker, and give
        // the thread a name the user can find in the timeline
        threading::block_profiling_signals();
        threading::set_worker_thread_name("omni.roctracer");

        let skew = self.clock_skew();
        let settings = self.settings();

        for record in records {
            let domain_ok = matches!(
                record.activity_domain(),
                Some(ActivityDomain::HsaOps) | Some(ActivityDomain::HipOps)
            );
            if !domain_ok {
                continue;
            }
            let Some(op) = record.device_op() else {
                // op beyond BARRIER: malformed, skip silently
                continue;
            };

            let begin_ns = apply_skew(record.begin_ns, skew);
            let end_ns = apply_skew(record.end_ns, skew);
            let corr_id = record.correlation_id;

            let (origin_tid, stored_name) = self.correlation().lookup_origin(corr_id);
            let tid = origin_tid.unwrap_or_else(threading::thread_id);
            let raw_name = stored_name.unwrap_or_else(|| op.fallback_name());
            let cid = self
                .correlation()
                .causal_chain(corr_id)
                .map(|chain| chain.cid)
                .unwrap_or(0);

            if settings.debug && settings.verbose > 1 {
                tracing::debug!(
                    name = raw_name,
                    correlation_id = corr_id,
                    begin_ns,
                    end_ns,
                    device_id = record.device_id,
                    queue_id = record.queue_id,
                    process_id = record.process_id,
                    thread_id = tid,
                    "device activity record"
                );
            }

            let label = demangled(raw_name);
            let info = DeviceSpanInfo {
                correlation_id: corr_id,
                cid,
                device_id: record.device_id,
                queue_id: record.queue_id,
                op: op.fallback_name(),
                thread_id: tid,
            };
            let duration_ns = end_ns.saturating_sub(begin_ns);
            let sinks = self.sinks().snapshot();

            self.queues().defer(
                tid,
                Box::new(move || {
                    for sink in &sinks {
                        sink.emit_span(&label, begin_ns, end_ns, &info);
                        sink.record_duration(&label, duration_ns);
                    }
                }),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::roctracer::{DeviceOp, RecordIter};
    use crate::config::State;
    use crate::sink::{MemorySink, SinkEvent};
    use crate::tracer::correlation::intern;
    use std::sync::Arc;

    fn active_tracer() -> (Tracer, Arc<MemorySink>) {
        let tracer = Tracer::default();
        tracer.state_cell().set(State::Active);
        let sink = Arc::new(MemorySink::new());
        tracer.sinks().install(sink.clone());
        (tracer, sink)
    }

    fn record(op: DeviceOp, corr_id: u64, begin_ns: u64, end_ns: u64) -> ActivityRecord {
        ActivityRecord {
            domain: ActivityDomain::HsaOps as u32,
            op: op as u32,
            kind: 0,
            correlation_id: corr_id,
            begin_ns,
            end_ns,
            device_id: 0,
            process_id: 1,
            queue_id: 3,
        }
    }

    #[test]
    fn test_known_correlation_attributes_to_origin_thread() {
        let (tracer, sink) = active_tracer();
        let tid = threading::thread_id();
        tracer.correlation().insert_kernel_name(42, intern("foo"));
        tracer.correlation().insert_origin_thread(42, tid);

        tracer.activity_callback(RecordIter::from_slice(&[record(
            DeviceOp::Dispatch,
            42,
            1000,
            2000,
        )]));

        // nothing emitted until the origin thread drains
        assert!(sink.events().is_empty());
        assert_eq!(tracer.queues().pending(tid), 1);
        tracer.queues().drain(tid);

        let events = sink.events();
        match &events[0] {
            SinkEvent::Span {
                label,
                begin_ns,
                end_ns,
                info,
            } => {
                assert_eq!(label, "foo");
                assert_eq!(*begin_ns, 1000);
                assert_eq!(*end_ns, 2000);
                assert_eq!(info.correlation_id, 42);
                assert_eq!(info.queue_id, 3);
                assert_eq!(info.op, "DISPATCH");
                assert_eq!(info.thread_id, tid);
            }
            other => panic!("expected Span, got {other:?}"),
        }
        assert!(matches!(
            &events[1],
            SinkEvent::Duration { label, duration_ns } if label == "foo" && *duration_ns == 1000
        ));
    }

    #[test]
    fn test_skew_correction_applied() {
        let settings = crate::config::Settings::default();
        let tracer = Tracer::new(settings);
        tracer.state_cell().set(State::Active);
        let sink = Arc::new(MemorySink::new());
        tracer.sinks().install(sink.clone());

        // pin the skew near -1ms with synthetic clocks: device = host + 1ms
        tracer.reconcile_clocks(|| Ok(crate::tracer::clock::host_clock_ns() + 1_000_000));
        let skew = tracer.clock_skew();
        // host - device = -1ms, well outside measurement noise
        assert!(skew < -500_000, "skew {skew}");

        // timestamps far enough from zero that the negative skew cannot
        // clamp them
        let raw_begin = 10_000_000_000;
        let raw_end = raw_begin + 1000;
        let tid = threading::thread_id();
        tracer.correlation().insert_kernel_name(1, intern("k"));
        tracer.correlation().insert_origin_thread(1, tid);
        tracer.activity_callback(RecordIter::from_slice(&[record(
            DeviceOp::Dispatch,
            1,
            raw_begin,
            raw_end,
        )]));
        tracer.queues().drain(tid);

        let events = sink.events();
        match &events[0] {
            SinkEvent::Span {
                begin_ns, end_ns, ..
            } => {
                assert_eq!(*begin_ns, apply_skew(raw_begin, skew));
                assert_eq!(*end_ns, apply_skew(raw_end, skew));
                assert!(*begin_ns < raw_begin);
                assert_eq!(end_ns - begin_ns, 1000);
            }
            other => panic!("expected Span, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_correlation_falls_back() {
        let (tracer, sink) = active_tracer();
        tracer.activity_callback(RecordIter::from_slice(&[record(
            DeviceOp::Copy,
            999,
            10,
            20,
        )]));
        // attributed to the current (worker) thread
        let tid = threading::thread_id();
        tracer.queues().drain(tid);

        let events = sink.events();
        assert!(matches!(
            &events[0],
            SinkEvent::Span { label, info, .. }
                if label == "COPY" && info.thread_id == tid && info.cid == 0
        ));
    }

    #[test]
    fn test_malformed_records_skipped_but_iteration_continues() {
        let (tracer, sink) = active_tracer();
        let tid = threading::thread_id();
        let mut bad_domain = record(DeviceOp::Dispatch, 1, 0, 1);
        bad_domain.domain = ActivityDomain::HipApi as u32;
        let mut bad_op = record(DeviceOp::Dispatch, 2, 0, 1);
        bad_op.op = 7; // beyond BARRIER
        let good = record(DeviceOp::Barrier, 3, 5, 9);

        tracer.activity_callback(RecordIter::from_slice(&[bad_domain, bad_op, good]));
        tracer.queues().drain(tid);

        let events = sink.events();
        let spans: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, SinkEvent::Span { .. }))
            .collect();
        assert_eq!(spans.len(), 1);
        assert!(matches!(
            spans[0],
            SinkEvent::Span { label, .. } if label == "BARRIER"
        ));
    }

    #[test]
    fn test_empty_buffer_is_a_noop() {
        let (tracer, sink) = active_tracer();
        tracer.activity_callback(RecordIter::from_slice(&[]));
        assert!(sink.events().is_empty());
        assert_eq!(tracer.queues().drain_all(), 0);
    }

    #[test]
    fn test_inactive_tracer_ignores_records() {
        let tracer = Tracer::default();
        let sink = Arc::new(MemorySink::new());
        tracer.sinks().install(sink.clone());
        tracer.activity_callback(RecordIter::from_slice(&[record(
            DeviceOp::Dispatch,
            1,
            0,
            1,
        )]));
        assert_eq!(tracer.queues().drain_all(), 0);
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_demangles_cpp_symbols() {
        let mangled = intern("_Z3foov");
        assert_eq!(demangled(mangled), "foo()");
        // non-mangled names pass through
        assert_eq!(demangled(intern("COPY")), "COPY");
    }

    #[test]
    fn test_completion_spanning_call_boundary() {
        // a device op can outlive its originating call; the record arriving
        // after EXIT is still attributed to the origin thread on next drain
        let (tracer, sink) = active_tracer();
        let tid = threading::thread_id();
        tracer.correlation().insert_kernel_name(5, intern("late"));
        tracer.correlation().insert_origin_thread(5, tid);

        tracer.activity_callback(RecordIter::from_slice(&[record(
            DeviceOp::Dispatch,
            5,
            100,
            200,
        )]));
        assert_eq!(tracer.queues().pending(tid), 1);
        tracer.queues().drain(tid);
        assert!(sink
            .events()
            .iter()
            .any(|e| matches!(e, SinkEvent::Span { label, .. } if label == "late")));
    }
}
