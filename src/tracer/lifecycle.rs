//! Lifecycle controller
//!
//! The runtime loads the tracer as a tool library and drives it through
//! `OnLoad`/`OnUnload`. Subsystems attach named setup and shutdown closures;
//! load computes the clock skew, registers the "hsa" routines and runs every
//! setup, unload moves the engine to Finalized, performs the final global
//! drain and runs the shutdown routines. Registration is idempotent by name
//! so a runtime that retries `OnLoad` cannot double-register anything.

use std::sync::{Arc, Mutex};

use crate::backend::roctracer::RoctracerResult;
use crate::config::State;

use super::threading;
use super::Tracer;

type Routine = Arc<dyn Fn() + Send + Sync>;

/// Ordered list of named closures, registered once per name
#[derive(Default)]
pub struct RoutineList {
    entries: Mutex<Vec<(String, Routine)>>,
}

impl RoutineList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `routine` under `name`; a name already present is a no-op
    pub fn add(&self, name: &str, routine: Routine) {
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if entries.iter().any(|(n, _)| n == name) {
            tracing::debug!(name, "routine already registered, skipping");
            return;
        }
        entries.push((name.to_string(), routine));
    }

    /// Run every routine in registration order, outside the lock
    pub fn run_all(&self) {
        let routines: Vec<Routine> = self
            .entries
            .lock()
            .map(|entries| entries.iter().map(|(_, r)| r.clone()).collect())
            .unwrap_or_default();
        for routine in routines {
            routine();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Restores child-thread sampling propagation when setup leaves scope
struct SamplingSuppression;

impl SamplingSuppression {
    fn engage() -> Self {
        threading::push_child_sampling_suppressed();
        SamplingSuppression
    }
}

impl Drop for SamplingSuppression {
    fn drop(&mut self) {
        threading::pop_child_sampling_suppressed();
    }
}

impl Tracer {
    /// Attach a named setup closure, invoked by [`Tracer::on_load`]
    pub fn add_setup(&self, name: &str, routine: impl Fn() + Send + Sync + 'static) {
        self.setup_routines().add(name, Arc::new(routine));
    }

    /// Attach a named shutdown closure, invoked by [`Tracer::on_unload`]
    pub fn add_shutdown(&self, name: &str, routine: impl Fn() + Send + Sync + 'static) {
        self.shutdown_routines().add(name, Arc::new(routine));
    }

    /// Tool-load entry: register and start the tracing channels
    ///
    /// `device_now` queries the runtime timestamp clock for the clock
    /// reconciler. `setup` and `shutdown` are the channel (de)registration
    /// bodies, attached under the name "hsa"; setup failures are the
    /// closure's to report, loading never fails because of them.
    ///
    /// Returns `true` in the successful path, including the stand-down path
    /// where tooling initialization is disabled by configuration.
    pub fn on_load<D>(
        &self,
        device_now: D,
        setup: impl Fn() + Send + Sync + 'static,
        shutdown: impl Fn() + Send + Sync + 'static,
    ) -> bool
    where
        D: FnMut() -> RoctracerResult<u64>,
    {
        if !self.settings().init_tooling {
            tracing::debug!("tooling initialization disabled, standing down");
            return true;
        }

        let _suppress = SamplingSuppression::engage();

        // external global configuration (logging included) must exist before
        // any callback can fire
        crate::logging::init_from_env();

        self.reconcile_clocks(device_now);

        self.add_setup("hsa", setup);
        self.add_shutdown("hsa", shutdown);

        self.telemetry_cell().set(State::Active);
        self.state_cell().transition(State::Inactive, State::Active);

        self.setup_routines().run_all();
        true
    }

    /// Tool-unload entry: one-shot teardown
    ///
    /// Completions received after application exit but before unload are
    /// still pending in the per-thread queues; the final global drain flushes
    /// them before the shutdown routines disable the channels. A second
    /// unload is a no-op.
    pub fn on_unload(&self) {
        if !self.state_cell().transition(State::Active, State::Finalized) {
            return;
        }
        self.telemetry_cell().set(State::Finalized);
        self.queues().drain_all();
        self.shutdown_routines().run_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::sink::{EventSink, MemorySink, SinkEvent};
    use crate::tracer::clock::host_clock_ns;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counted() -> (Arc<AtomicUsize>, impl Fn() + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        (count, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_routine_list_is_idempotent_by_name() {
        let list = RoutineList::new();
        let (count, routine) = counted();
        list.add("hsa", Arc::new(routine));
        let (other_count, other) = counted();
        list.add("hsa", Arc::new(other));
        assert_eq!(list.len(), 1);

        list.run_all();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(other_count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_routines_run_in_registration_order() {
        let list = RoutineList::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for name in ["a", "b", "c"] {
            let order = order.clone();
            list.add(
                name,
                Arc::new(move || {
                    order.lock().unwrap().push(name);
                }),
            );
        }
        list.run_all();
        assert_eq!(*order.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_on_load_activates_and_runs_setup() {
        let tracer = Tracer::default();
        let (setup_count, setup) = counted();
        let (shutdown_count, shutdown) = counted();

        let loaded = tracer.on_load(|| Ok(host_clock_ns()), setup, shutdown);
        assert!(loaded);
        assert_eq!(tracer.state(), State::Active);
        assert_eq!(tracer.telemetry_state(), State::Active);
        assert_eq!(setup_count.load(Ordering::SeqCst), 1);
        assert_eq!(shutdown_count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_on_load_standdown_registers_nothing() {
        let settings = Settings {
            init_tooling: false,
            ..Settings::default()
        };
        let tracer = Tracer::new(settings);
        let (setup_count, setup) = counted();
        let (_, shutdown) = counted();

        assert!(tracer.on_load(|| Ok(0), setup, shutdown));
        assert_eq!(tracer.state(), State::Inactive);
        assert!(tracer.setup_routines().is_empty());
        assert_eq!(setup_count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unload_drains_and_shuts_down() {
        let tracer = Tracer::default();
        let sink = Arc::new(MemorySink::new());
        tracer.sinks().install(sink.clone());
        let (_, setup) = counted();
        let (shutdown_count, shutdown) = counted();
        tracer.on_load(|| Ok(host_clock_ns()), setup, shutdown);

        // a completion is still queued for a thread that exited
        let sink_for_task = sink.clone();
        tracer.queues().defer(
            1234,
            Box::new(move || {
                sink_for_task.record_duration("late_kernel", 7);
            }),
        );

        tracer.on_unload();
        assert_eq!(tracer.state(), State::Finalized);
        assert_eq!(tracer.telemetry_state(), State::Finalized);
        assert_eq!(shutdown_count.load(Ordering::SeqCst), 1);
        assert!(sink.events().iter().any(|e| matches!(
            e,
            SinkEvent::Duration { label, .. } if label == "late_kernel"
        )));
    }

    #[test]
    fn test_second_unload_is_a_noop() {
        let tracer = Tracer::default();
        let (_, setup) = counted();
        let (shutdown_count, shutdown) = counted();
        tracer.on_load(|| Ok(host_clock_ns()), setup, shutdown);

        tracer.on_unload();
        tracer.on_unload();
        assert_eq!(shutdown_count.load(Ordering::SeqCst), 1);
        assert_eq!(tracer.state(), State::Finalized);
    }

    #[test]
    fn test_repeated_on_load_does_not_double_register() {
        let tracer = Tracer::default();
        let (setup_count, setup) = counted();
        let (_, shutdown) = counted();
        tracer.on_load(|| Ok(host_clock_ns()), setup, shutdown);

        let (second_count, second_setup) = counted();
        let (_, second_shutdown) = counted();
        tracer.on_load(|| Ok(host_clock_ns()), second_setup, second_shutdown);

        // first registration wins; setups re-ran but only the original one
        assert_eq!(tracer.setup_routines().len(), 1);
        assert_eq!(setup_count.load(Ordering::SeqCst), 2);
        assert_eq!(second_count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_child_sampling_restored_after_load() {
        let tracer = Tracer::default();
        let (_, setup) = counted();
        let (_, shutdown) = counted();
        tracer.on_load(|| Ok(host_clock_ns()), setup, shutdown);
        assert!(threading::child_sampling_enabled());
    }
}
