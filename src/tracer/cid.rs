//! Causal-chain id allocation
//!
//! Every traced host call gets a node in its thread's call tree, identified
//! by a `(cid, parent_cid, depth)` triple. Cids are allocated from a single
//! process-wide counter; the parent relationship comes from a per-thread
//! stack of the calls currently open on that thread.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Position of a host call in its thread's call tree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CausalChain {
    pub cid: u64,
    /// 0 for a top-level call
    pub parent_cid: u64,
    pub depth: u16,
}

/// One call currently open on a thread
#[derive(Debug, Clone, Copy)]
struct OpenEntry {
    cid: u64,
    begin_ns: u64,
}

/// Allocator for causal-chain triples
///
/// The per-thread stacks live behind one mutex; only the owning thread ever
/// pushes or pops its own stack, the lock just guards the map structure.
#[derive(Debug)]
pub struct CausalChainAllocator {
    next_cid: AtomicU64,
    open: Mutex<HashMap<i64, Vec<OpenEntry>>>,
}

impl Default for CausalChainAllocator {
    fn default() -> Self {
        CausalChainAllocator {
            // cid 0 is reserved to mean "no parent"
            next_cid: AtomicU64::new(1),
            open: Mutex::new(HashMap::new()),
        }
    }
}

impl CausalChainAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new call on `tid` at `begin_ns`, returning its triple
    pub fn begin_entry(&self, tid: i64, begin_ns: u64) -> CausalChain {
        let cid = self.next_cid.fetch_add(1, Ordering::Relaxed);
        let mut open = match self.open.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let stack = open.entry(tid).or_default();
        let chain = CausalChain {
            cid,
            parent_cid: stack.last().map(|e| e.cid).unwrap_or(0),
            depth: stack.len() as u16,
        };
        stack.push(OpenEntry { cid, begin_ns });
        chain
    }

    /// Close the innermost open call on `tid`, returning its begin timestamp
    pub fn end_entry(&self, tid: i64) -> Option<u64> {
        let mut open = match self.open.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        open.get_mut(&tid)
            .and_then(|stack| stack.pop())
            .map(|e| e.begin_ns)
    }

    /// Number of calls currently open on `tid`
    pub fn open_depth(&self, tid: i64) -> usize {
        self.open
            .lock()
            .map(|open| open.get(&tid).map(|s| s.len()).unwrap_or(0))
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nesting_produces_parent_links() {
        let alloc = CausalChainAllocator::new();
        let outer = alloc.begin_entry(7, 100);
        let inner = alloc.begin_entry(7, 200);

        assert_eq!(outer.parent_cid, 0);
        assert_eq!(outer.depth, 0);
        assert_eq!(inner.parent_cid, outer.cid);
        assert_eq!(inner.depth, 1);
        assert!(inner.cid > outer.cid);

        assert_eq!(alloc.end_entry(7), Some(200));
        assert_eq!(alloc.end_entry(7), Some(100));
        assert_eq!(alloc.end_entry(7), None);
    }

    #[test]
    fn test_threads_have_independent_stacks() {
        let alloc = CausalChainAllocator::new();
        let a = alloc.begin_entry(1, 10);
        let b = alloc.begin_entry(2, 20);

        // the other thread's open call is not a parent here
        assert_eq!(a.parent_cid, 0);
        assert_eq!(b.parent_cid, 0);
        assert_eq!(alloc.open_depth(1), 1);
        assert_eq!(alloc.open_depth(2), 1);
        assert_ne!(a.cid, b.cid);
    }

    #[test]
    fn test_cids_are_unique_across_threads() {
        use std::sync::Arc;

        let alloc = Arc::new(CausalChainAllocator::new());
        let mut handles = Vec::new();
        for t in 0..4 {
            let alloc = alloc.clone();
            handles.push(std::thread::spawn(move || {
                (0..100)
                    .map(|_| alloc.begin_entry(t, 0).cid)
                    .collect::<Vec<u64>>()
            }));
        }
        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 400);
    }
}
