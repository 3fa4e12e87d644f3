//! Interpreter profiler configuration
//!
//! The first thread to touch the store owns the process-wide master record;
//! every other thread snapshots the master on first access and works on its
//! own copy from then on. A thread's configuration is never visible to
//! another thread.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use once_cell::sync::{Lazy, OnceCell};

use crate::tracer::threading;

/// Function-name regexes excluded out of the box
pub fn default_exclude_functions() -> BTreeSet<String> {
    BTreeSet::from(["^<.*>$".to_string()])
}

/// Filename regexes excluded out of the box
pub fn default_exclude_filenames() -> BTreeSet<String> {
    BTreeSet::from([
        "(encoder|decoder|threading).py$".to_string(),
        "^<.*>$".to_string(),
    ])
}

/// Per-thread profiler configuration record
#[derive(Debug, Clone)]
pub struct ProfilerConfig {
    pub is_running: bool,
    pub trace_c: bool,
    pub include_internal: bool,
    pub include_args: bool,
    pub include_line: bool,
    pub include_filename: bool,
    pub full_filepath: bool,
    /// CALL/RETURN balance while a filtered subtree is being skipped
    pub ignore_stack_depth: i32,
    pub base_stack_depth: i32,
    pub verbose: i32,
    pub depth_tracker: i64,
    /// Installation prefix of the tracer's own interpreter module
    pub base_module_path: String,
    pub restrict_functions: BTreeSet<String>,
    pub restrict_filenames: BTreeSet<String>,
    pub include_functions: BTreeSet<String>,
    pub include_filenames: BTreeSet<String>,
    pub exclude_functions: BTreeSet<String>,
    pub exclude_filenames: BTreeSet<String>,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        ProfilerConfig {
            is_running: false,
            trace_c: false,
            include_internal: false,
            include_args: false,
            include_line: false,
            include_filename: false,
            full_filepath: false,
            ignore_stack_depth: 0,
            base_stack_depth: -1,
            verbose: 0,
            depth_tracker: 0,
            base_module_path: String::new(),
            restrict_functions: BTreeSet::new(),
            restrict_filenames: BTreeSet::new(),
            include_functions: BTreeSet::new(),
            include_filenames: BTreeSet::new(),
            exclude_functions: default_exclude_functions(),
            exclude_filenames: default_exclude_filenames(),
        }
    }
}

impl ProfilerConfig {
    /// The copy handed to a non-master thread on its first access
    fn thread_snapshot(&self) -> ProfilerConfig {
        let mut snapshot = self.clone();
        // transient per-thread state starts fresh
        snapshot.ignore_stack_depth = 0;
        snapshot.base_stack_depth = -1;
        snapshot.depth_tracker = 0;
        // a full filepath implies the filename is shown at all
        if snapshot.full_filepath && !snapshot.include_filename {
            snapshot.include_filename = true;
        }
        snapshot
    }
}

/// Master-plus-snapshots configuration store
pub struct ConfigStore {
    master: Mutex<ProfilerConfig>,
    master_thread: OnceCell<i64>,
    snapshots: Mutex<HashMap<i64, ProfilerConfig>>,
}

impl Default for ConfigStore {
    fn default() -> Self {
        ConfigStore {
            master: Mutex::new(ProfilerConfig::default()),
            master_thread: OnceCell::new(),
            snapshots: Mutex::new(HashMap::new()),
        }
    }
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The store behind the interpreter-facing settings object
    pub fn global() -> &'static ConfigStore {
        static STORE: Lazy<ConfigStore> = Lazy::new(ConfigStore::new);
        &STORE
    }

    /// Run `f` against the calling thread's configuration
    ///
    /// The first calling thread owns the master record; later threads get a
    /// one-time snapshot of whatever the master looked like at that point.
    pub fn with<R>(&self, f: impl FnOnce(&mut ProfilerConfig) -> R) -> R {
        let tid = threading::thread_id();
        let master_tid = *self.master_thread.get_or_init(|| tid);
        if tid == master_tid {
            let mut master = match self.master.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            f(&mut master)
        } else {
            let mut snapshots = match self.snapshots.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let config = match snapshots.entry(tid) {
                std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
                std::collections::hash_map::Entry::Vacant(entry) => {
                    let master = match self.master.lock() {
                        Ok(guard) => guard,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                    entry.insert(master.thread_snapshot())
                }
            };
            f(config)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_defaults_match_shipped_filters() {
        let config = ProfilerConfig::default();
        assert!(config.exclude_functions.contains("^<.*>$"));
        assert!(config
            .exclude_filenames
            .contains("(encoder|decoder|threading).py$"));
        assert!(!config.trace_c);
        assert!(!config.is_running);
        assert_eq!(config.base_stack_depth, -1);
    }

    #[test]
    fn test_first_thread_owns_master() {
        let store = ConfigStore::new();
        store.with(|config| config.verbose = 3);
        // same thread reads its own mutation back
        assert_eq!(store.with(|config| config.verbose), 3);
    }

    #[test]
    fn test_other_threads_snapshot_master() {
        let store = Arc::new(ConfigStore::new());
        store.with(|config| {
            config.trace_c = true;
            config.include_functions.insert("^hot_".to_string());
        });

        let snapshot = {
            let store = store.clone();
            std::thread::spawn(move || {
                let seen = store.with(|config| {
                    let seen = (config.trace_c, config.include_functions.clone());
                    // mutate the snapshot; must not leak back to the master
                    config.trace_c = false;
                    config.verbose = 99;
                    seen
                });
                seen
            })
            .join()
            .unwrap()
        };
        assert!(snapshot.0);
        assert!(snapshot.1.contains("^hot_"));

        // master thread is unaffected by the other thread's mutation
        assert!(store.with(|config| config.trace_c));
        assert_ne!(store.with(|config| config.verbose), 99);
    }

    #[test]
    fn test_snapshot_taken_once() {
        let store = Arc::new(ConfigStore::new());
        store.with(|config| config.verbose = 1);

        let store2 = store.clone();
        std::thread::spawn(move || {
            // first touch snapshots verbose = 1
            assert_eq!(store2.with(|config| config.verbose), 1);
            // a later master change is not re-snapshotted here; the master
            // thread isn't even running anymore
            assert_eq!(store2.with(|config| config.verbose), 1);
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_snapshot_resets_transient_state() {
        let store = Arc::new(ConfigStore::new());
        store.with(|config| {
            config.ignore_stack_depth = 5;
            config.full_filepath = true;
        });
        let store2 = store.clone();
        std::thread::spawn(move || {
            store2.with(|config| {
                assert_eq!(config.ignore_stack_depth, 0);
                // full filepath implies include_filename in the snapshot
                assert!(config.include_filename);
            });
        })
        .join()
        .unwrap();
    }
}
