//! Host-API callback pipeline
//!
//! Entered synchronously on the traced application's thread, twice per call
//! (ENTER and EXIT). ENTER registers the correlation entry, allocates the
//! causal-chain triple, emits the BEGIN event and drains the thread's
//! deferred queue; EXIT drains again, looks the triple back up and emits the
//! END event. A thread-local guard makes the callback non-reentrant on a
//! given thread.
//!
//! A second, simpler channel handles the HSA introspection API: it ignores a
//! fixed set of query calls, remembers the ENTER timestamp per thread, and
//! emits the whole span at EXIT (dropping it on timestamp inversion).

use std::cell::Cell;

use crate::backend::roctracer::{ApiArgs, ApiPhase, HostApiId};
use crate::sink::HostFlow;

use super::clock::host_clock_ns;
use super::correlation::intern;
use super::threading::{self, try_enter};
use super::Tracer;

thread_local! {
    static IN_HOST_CALLBACK: Cell<bool> = const { Cell::new(false) };
}

/// Resolves launch arguments to a kernel symbol via the runtime
///
/// The production implementation wraps the runtime's pointer-to-name helper;
/// a null lookup is recovered with a fallback op-string downstream.
pub trait KernelNameResolver: Send + Sync {
    fn resolve(&self, id: HostApiId, args: &ApiArgs) -> Option<String>;
}

/// Resolver used before the runtime installs one: never resolves
pub struct NullResolver;

impl KernelNameResolver for NullResolver {
    fn resolve(&self, _id: HostApiId, _args: &ApiArgs) -> Option<String> {
        None
    }
}

/// One host-API callback invocation, decoded from the runtime's data struct
#[derive(Debug, Clone, Copy)]
pub struct HostApiRecord {
    pub call_id: u32,
    pub phase: ApiPhase,
    pub correlation_id: u64,
    pub args: ApiArgs,
}

/// Operation label for a call id, stable for the session
fn op_label(call_id: u32) -> &'static str {
    match HostApiId::from_u32(call_id) {
        Some(id) => id.name(),
        None => intern(&format!("hip_api_id_{call_id}")),
    }
}

/// HSA API call ids the tracer understands by name
///
/// Values are the callback ids of the HSA-API domain.
pub mod hsa_api_ids {
    pub const INIT: u32 = 0;
    pub const SHUT_DOWN: u32 = 1;
    pub const AGENT_GET_INFO: u32 = 2;
    pub const SYSTEM_GET_INFO: u32 = 3;
    pub const REGION_GET_INFO: u32 = 4;
    pub const ISA_GET_INFO: u32 = 5;
    pub const CODE_OBJECT_GET_INFO: u32 = 6;
    pub const EXECUTABLE_GET_INFO: u32 = 7;
    pub const WAVEFRONT_GET_INFO: u32 = 8;
    pub const QUEUE_CREATE: u32 = 16;
    pub const QUEUE_DESTROY: u32 = 17;
    pub const SIGNAL_CREATE: u32 = 18;
    pub const SIGNAL_WAIT: u32 = 19;
    pub const MEMORY_ALLOCATE: u32 = 20;
    pub const MEMORY_COPY: u32 = 21;
}

/// Introspection calls excluded from the timeline: recording these
/// per-query book-keeping calls distorts it
const HSA_EXCLUDED_IDS: &[u32] = &[
    hsa_api_ids::INIT,
    hsa_api_ids::AGENT_GET_INFO,
    hsa_api_ids::SYSTEM_GET_INFO,
    hsa_api_ids::REGION_GET_INFO,
    hsa_api_ids::ISA_GET_INFO,
    hsa_api_ids::CODE_OBJECT_GET_INFO,
    hsa_api_ids::EXECUTABLE_GET_INFO,
    hsa_api_ids::WAVEFRONT_GET_INFO,
];

/// Whether an HSA-API call id is filtered out before any work
pub fn is_hsa_excluded(call_id: u32) -> bool {
    HSA_EXCLUDED_IDS.contains(&call_id)
}

impl Tracer {
    /// The host-API (HIP domain) callback body
    pub fn host_api_callback(&self, record: &HostApiRecord) {
        if self.state() != crate::config::State::Active {
            return;
        }
        let Some(_guard) = try_enter(&IN_HOST_CALLBACK) else {
            return;
        };

        if let Some(id) = HostApiId::from_u32(record.call_id) {
            if id.is_excluded() {
                return;
            }
        }

        let label = op_label(record.call_id);
        let ts = host_clock_ns();
        let tid = threading::thread_id();
        let corr_id = record.correlation_id;
        let queue = record.args.queue_handle();

        if self.settings().debug && self.settings().verbose > 1 {
            tracing::debug!(
                op = label,
                call_id = record.call_id,
                correlation_id = corr_id,
                phase = ?record.phase,
                "host-api callback"
            );
        }

        match record.phase {
            ApiPhase::Enter => {
                if let Some(id) = HostApiId::from_u32(record.call_id) {
                    if id.is_launch() {
                        if let Some(name) =
                            self.kernel_name_resolver().resolve(id, &record.args)
                        {
                            let name = intern(&name);
                            self.correlation().insert_kernel_name(corr_id, name);
                            self.correlation().insert_origin_thread(corr_id, tid);
                        }
                    }
                }

                let chain = self.cids().begin_entry(tid, ts);
                self.correlation().insert_causal_chain(corr_id, chain);

                let flow = HostFlow {
                    correlation_id: corr_id,
                    cid: chain.cid,
                    parent_cid: chain.parent_cid,
                    depth: chain.depth,
                    thread_id: tid,
                    queue,
                };
                for sink in self.sinks().snapshot() {
                    sink.begin_host_span(label, ts, &flow);
                }

                self.queues().drain(tid);
            }
            ApiPhase::Exit => {
                // attribute completions that arrived during the call's body
                // before the enclosing END
                self.queues().drain(tid);

                let _chain = self.correlation().causal_chain(corr_id);
                let begin_ns = self.cids().end_entry(tid);

                for sink in self.sinks().snapshot() {
                    sink.end_host_span(ts);
                }
                if let Some(begin_ns) = begin_ns {
                    if begin_ns <= ts {
                        for sink in self.sinks().snapshot() {
                            sink.record_duration(label, ts - begin_ns);
                        }
                    }
                }
            }
        }
    }

    /// The HSA-API channel callback body
    ///
    /// `op_name` is the runtime's operation string for the call id.
    pub fn hsa_api_callback(
        &self,
        call_id: u32,
        op_name: &str,
        phase: ApiPhase,
        correlation_id: u64,
    ) {
        if self.state() != crate::config::State::Active {
            return;
        }
        let Some(_guard) = try_enter(&IN_HOST_CALLBACK) else {
            return;
        };
        if is_hsa_excluded(call_id) {
            return;
        }

        let tid = threading::thread_id();
        let now = host_clock_ns();

        match phase {
            ApiPhase::Enter => {
                if let Ok(mut begins) = self.hsa_begin_ts().lock() {
                    begins.insert(tid, now);
                }
            }
            ApiPhase::Exit => {
                let begin_ns = self
                    .hsa_begin_ts()
                    .lock()
                    .ok()
                    .and_then(|mut begins| begins.remove(&tid));
                let Some(begin_ns) = begin_ns else {
                    return;
                };
                // shut_down tears the timestamp source down underneath us;
                // reuse the ENTER timestamp instead of reading a dead clock
                let end_ns = if call_id == hsa_api_ids::SHUT_DOWN {
                    begin_ns
                } else {
                    now
                };
                if begin_ns > end_ns {
                    return;
                }

                let label = intern(op_name);
                let flow = HostFlow {
                    correlation_id,
                    thread_id: tid,
                    ..HostFlow::default()
                };
                let sinks = self.sinks().snapshot();
                for sink in &sinks {
                    sink.begin_host_span(label, begin_ns, &flow);
                    sink.end_host_span(end_ns);
                }
                // the statistical store is deferred off the caller's stack
                let duration = end_ns - begin_ns;
                self.queues().defer(
                    tid,
                    Box::new(move || {
                        for sink in &sinks {
                            sink.record_duration(label, duration);
                        }
                    }),
                );
            }
        }
    }
}
