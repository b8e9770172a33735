//! The file-handle registry (spec §4.3): a bidirectional mapping between opaque 64-bit handles
//! and the nodes they name, with ascending-order reuse of released handles.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::RwLock;

/// A cached node identity: a canonical path plus the file id it resolved to, so a stale
/// same-path-different-inode situation can be detected by callers that care to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub path: String,
    pub fileid: u64,
}

struct Inner {
    nodes: HashMap<u64, Node>,
    free: BinaryHeap<Reverse<u64>>,
    next_handle: u64,
}

/// Handles start at 1; `0` is reserved as a sentinel and is never issued.
pub struct HandleRegistry {
    inner: RwLock<Inner>,
}

impl Default for HandleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HandleRegistry {
    pub fn new() -> Self {
        HandleRegistry {
            inner: RwLock::new(Inner { nodes: HashMap::new(), free: BinaryHeap::new(), next_handle: 1 }),
        }
    }

    /// Issues a handle for `node`. Reuses the smallest released handle if one is free, otherwise
    /// mints the next ascending integer.
    pub fn allocate(&self, node: Node) -> u64 {
        let mut inner = self.inner.write().expect("handle registry lock poisoned");
        let handle = match inner.free.pop() {
            Some(Reverse(h)) => h,
            None => {
                let h = inner.next_handle;
                inner.next_handle += 1;
                h
            }
        };
        inner.nodes.insert(handle, node);
        handle
    }

    pub fn get(&self, handle: u64) -> Option<Node> {
        let inner = self.inner.read().expect("handle registry lock poisoned");
        inner.nodes.get(&handle).cloned()
    }

    /// Removes `handle`'s mapping and returns it to the free set. A handle that is not (or no
    /// longer) live is a no-op, not an error.
    pub fn release(&self, handle: u64) {
        if handle == 0 {
            return;
        }
        let mut inner = self.inner.write().expect("handle registry lock poisoned");
        if inner.nodes.remove(&handle).is_some() {
            inner.free.push(Reverse(handle));
        }
    }

    pub fn release_all(&self) {
        let mut inner = self.inner.write().expect("handle registry lock poisoned");
        inner.nodes.clear();
        inner.free.clear();
        inner.next_handle = 1;
    }

    pub fn count(&self) -> usize {
        let inner = self.inner.read().expect("handle registry lock poisoned");
        inner.nodes.len()
    }
}
