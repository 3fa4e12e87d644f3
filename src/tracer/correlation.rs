//! Correlation registry
//!
//! Process-wide mappings keyed by the runtime-issued correlation id. The
//! three maps are guarded by three independent mutexes: host-API threads
//! insert on enter, the runtime worker reads on the activity path, and the
//! split keeps those from contending on one lock. Entries are retained until
//! shutdown; activity records can arrive long after the originating call
//! returned, so eviction would reintroduce the use-after-free this design
//! replaces.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use once_cell::sync::Lazy;

use super::cid::CausalChain;

/// Intern a string, returning a pointer-stable `&'static str`
///
/// Kernel names and region labels are shared by pointer across the session;
/// interning gives them the required lifetime. The leak is bounded by the
/// set of distinct labels in a trace.
pub fn intern(s: &str) -> &'static str {
    static STRINGS: Lazy<Mutex<HashSet<&'static str>>> =
        Lazy::new(|| Mutex::new(HashSet::new()));
    let mut strings = match STRINGS.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if let Some(existing) = strings.get(s) {
        return existing;
    }
    let leaked: &'static str = Box::leak(s.to_string().into_boxed_str());
    strings.insert(leaked);
    leaked
}

/// The three correlation maps
#[derive(Debug, Default)]
pub struct CorrelationRegistry {
    key_names: Mutex<HashMap<u64, &'static str>>,
    origin_threads: Mutex<HashMap<u64, i64>>,
    causal_chains: Mutex<HashMap<u64, CausalChain>>,
}

impl CorrelationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the kernel/operation name for an in-flight correlation id
    pub fn insert_kernel_name(&self, corr_id: u64, name: &'static str) {
        if let Ok(mut names) = self.key_names.lock() {
            names.entry(corr_id).or_insert(name);
        }
    }

    /// Record the host thread that issued the call
    pub fn insert_origin_thread(&self, corr_id: u64, tid: i64) {
        if let Ok(mut tids) = self.origin_threads.lock() {
            tids.entry(corr_id).or_insert(tid);
        }
    }

    /// Record the causal-chain triple of the call
    pub fn insert_causal_chain(&self, corr_id: u64, chain: CausalChain) {
        if let Ok(mut chains) = self.causal_chains.lock() {
            chains.entry(corr_id).or_insert(chain);
        }
    }

    pub fn kernel_name(&self, corr_id: u64) -> Option<&'static str> {
        self.key_names.lock().ok()?.get(&corr_id).copied()
    }

    pub fn origin_thread(&self, corr_id: u64) -> Option<i64> {
        self.origin_threads.lock().ok()?.get(&corr_id).copied()
    }

    pub fn causal_chain(&self, corr_id: u64) -> Option<CausalChain> {
        self.causal_chains.lock().ok()?.get(&corr_id).copied()
    }

    /// Activity-path lookup: origin thread plus stored name, one lock each
    pub fn lookup_origin(&self, corr_id: u64) -> (Option<i64>, Option<&'static str>) {
        (self.origin_thread(corr_id), self.kernel_name(corr_id))
    }

    /// Number of correlation ids with a recorded origin thread
    pub fn len(&self) -> usize {
        self.origin_threads.lock().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop everything; only meaningful at session shutdown
    pub fn clear(&self) {
        if let Ok(mut names) = self.key_names.lock() {
            names.clear();
        }
        if let Ok(mut tids) = self.origin_threads.lock() {
            tids.clear();
        }
        if let Ok(mut chains) = self.causal_chains.lock() {
            chains.clear();
        }
    }
}
