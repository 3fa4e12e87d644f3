//! The tracing engine
//!
//! [`Tracer`] aggregates the shared state of the three callback pipelines:
//! the correlation registry, the causal-chain allocator, the per-thread
//! deferred-work queues, the cached clock skew, the sink set, and the
//! lifecycle routine lists. The engine runs on whichever thread calls into
//! it: application threads for the host-API pipeline, runtime workers for
//! the activity pipeline. It owns no threads of its own and never blocks the
//! traced application beyond short map insertions.
//!
//! All state is instance-scoped so the engine can be exercised in isolation;
//! production callbacks go through the process-wide instance from
//! [`Tracer::global`].

pub mod activity;
pub mod activity_queue;
pub mod cid;
pub mod clock;
pub mod correlation;
pub mod host_api;
pub mod lifecycle;
pub mod threading;

#[cfg(feature = "rocm")]
pub mod tool;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use once_cell::sync::{Lazy, OnceCell};

use crate::backend::roctracer::RoctracerResult;
use crate::config::{Settings, State, StateCell};
use crate::sink::SinkRegistry;

use activity_queue::ActivityQueues;
use cid::CausalChainAllocator;
use correlation::CorrelationRegistry;
use host_api::{KernelNameResolver, NullResolver};
use lifecycle::RoutineList;

/// Shared state of the tracing engine
pub struct Tracer {
    state: StateCell,
    /// Per-device telemetry adapter state, driven by load/unload
    telemetry_state: StateCell,
    settings: Settings,
    correlation: CorrelationRegistry,
    cids: CausalChainAllocator,
    queues: ActivityQueues,
    sinks: SinkRegistry,
    skew: OnceCell<i64>,
    resolver: RwLock<Arc<dyn KernelNameResolver>>,
    setup_routines: RoutineList,
    shutdown_routines: RoutineList,
    /// ENTER timestamps of open HSA-API calls, keyed by thread id
    hsa_begin_ts: Mutex<HashMap<i64, u64>>,
}

impl Tracer {
    pub fn new(settings: Settings) -> Self {
        Tracer {
            state: StateCell::new(State::Inactive),
            telemetry_state: StateCell::new(State::Inactive),
            settings,
            correlation: CorrelationRegistry::new(),
            cids: CausalChainAllocator::new(),
            queues: ActivityQueues::new(),
            sinks: SinkRegistry::new(),
            skew: OnceCell::new(),
            resolver: RwLock::new(Arc::new(NullResolver)),
            setup_routines: RoutineList::new(),
            shutdown_routines: RoutineList::new(),
            hsa_begin_ts: Mutex::new(HashMap::new()),
        }
    }

    /// The process-wide tracer driven by the runtime callbacks
    pub fn global() -> &'static Tracer {
        static TRACER: Lazy<Tracer> = Lazy::new(|| Tracer::new(Settings::from_env()));
        &TRACER
    }

    pub fn state(&self) -> State {
        self.state.get()
    }

    pub(crate) fn state_cell(&self) -> &StateCell {
        &self.state
    }

    pub fn telemetry_state(&self) -> State {
        self.telemetry_state.get()
    }

    pub(crate) fn telemetry_cell(&self) -> &StateCell {
        &self.telemetry_state
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn correlation(&self) -> &CorrelationRegistry {
        &self.correlation
    }

    pub fn cids(&self) -> &CausalChainAllocator {
        &self.cids
    }

    pub fn queues(&self) -> &ActivityQueues {
        &self.queues
    }

    pub fn sinks(&self) -> &SinkRegistry {
        &self.sinks
    }

    pub(crate) fn setup_routines(&self) -> &RoutineList {
        &self.setup_routines
    }

    pub(crate) fn shutdown_routines(&self) -> &RoutineList {
        &self.shutdown_routines
    }

    pub(crate) fn hsa_begin_ts(&self) -> &Mutex<HashMap<i64, u64>> {
        &self.hsa_begin_ts
    }

    /// Install the runtime's pointer-to-name helper
    pub fn set_kernel_name_resolver(&self, resolver: Arc<dyn KernelNameResolver>) {
        if let Ok(mut slot) = self.resolver.write() {
            *slot = resolver;
        }
    }

    pub(crate) fn kernel_name_resolver(&self) -> Arc<dyn KernelNameResolver> {
        self.resolver
            .read()
            .map(|r| r.clone())
            .unwrap_or_else(|_| Arc::new(NullResolver))
    }

    /// Measure and cache the CPU/GPU clock offset
    ///
    /// Computed at most once per session. Disabled by configuration or any
    /// device timestamp failure, both of which pin the skew at 0 while
    /// tracing continues.
    pub fn reconcile_clocks<D>(&self, device_now: D) -> i64
    where
        D: FnMut() -> RoctracerResult<u64>,
    {
        *self.skew.get_or_init(|| {
            if !self.settings.use_clock_skew {
                tracing::debug!("clock-skew correction disabled by configuration");
                return 0;
            }
            clock::measure_skew_ns(clock::host_clock_ns, device_now).unwrap_or(0)
        })
    }

    /// The cached skew; 0 until [`Tracer::reconcile_clocks`] has run
    pub fn clock_skew(&self) -> i64 {
        self.skew.get().copied().unwrap_or(0)
    }
}

impl Default for Tracer {
    fn default() -> Self {
        Tracer::new(Settings::default())
    }
}
