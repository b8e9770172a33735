//! Bounded LRU attribute cache with TTL (spec §4.4), O(1) per operation via a `HashMap` plus an
//! intrusive doubly-linked list of slab indices — the same slab/free-list shape the teacher uses
//! for its buffer allocator, applied here to recency order instead of buffer reuse.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::filesystem::{DeviceId, FileInfo, FileKind};

/// A point-in-time attribute snapshot (spec §3 "Attribute snapshot").
#[derive(Debug, Clone, PartialEq)]
pub struct AttrSnapshot {
    pub kind: FileKind,
    pub mode: u32,
    pub size: u64,
    pub mtime: (u32, u32),
    pub atime: (u32, u32),
    pub uid: u32,
    pub gid: u32,
    pub fileid: u64,
}

impl From<&FileInfo> for AttrSnapshot {
    fn from(info: &FileInfo) -> Self {
        AttrSnapshot {
            kind: info.kind,
            mode: info.mode,
            size: info.size,
            mtime: info.mtime,
            atime: info.atime,
            uid: info.uid,
            gid: info.gid,
            fileid: info.fileid,
        }
    }
}

impl AttrSnapshot {
    /// Expands a cached snapshot back into a [`FileInfo`], filling fields the snapshot doesn't
    /// carry with the spec's documented defaults (`nlink=1`, `fsid`/device unset, `ctime=mtime`).
    pub fn to_file_info(&self) -> FileInfo {
        FileInfo {
            kind: self.kind,
            mode: self.mode,
            nlink: None,
            uid: self.uid,
            gid: self.gid,
            size: self.size,
            used: self.size,
            device: DeviceId::default(),
            fsid: None,
            fileid: self.fileid,
            atime: self.atime,
            mtime: self.mtime,
            ctime: None,
        }
    }
}

const NIL: usize = usize::MAX;

struct Slot {
    path: String,
    snapshot: AttrSnapshot,
    valid_until: Instant,
    prev: usize,
    next: usize,
}

/// Intrusive doubly-linked list over `slots`, ordered LRU (head) to MRU (tail).
struct Inner {
    slots: Vec<Slot>,
    index: HashMap<String, usize>,
    free: Vec<usize>,
    head: usize,
    tail: usize,
    capacity: usize,
    ttl: Duration,
}

impl Inner {
    fn detach(&mut self, idx: usize) {
        let (prev, next) = (self.slots[idx].prev, self.slots[idx].next);
        if prev != NIL {
            self.slots[prev].next = next;
        } else {
            self.head = next;
        }
        if next != NIL {
            self.slots[next].prev = prev;
        } else {
            self.tail = prev;
        }
    }

    fn push_tail(&mut self, idx: usize) {
        self.slots[idx].prev = self.tail;
        self.slots[idx].next = NIL;
        if self.tail != NIL {
            self.slots[self.tail].next = idx;
        } else {
            self.head = idx;
        }
        self.tail = idx;
    }

    fn touch(&mut self, idx: usize) {
        if self.tail == idx {
            return;
        }
        self.detach(idx);
        self.push_tail(idx);
    }

    fn evict_one(&mut self) {
        let idx = self.head;
        if idx == NIL {
            return;
        }
        self.detach(idx);
        self.index.remove(&self.slots[idx].path);
        self.free.push(idx);
    }

    fn evict_until_at_most(&mut self, cap: usize) {
        while self.index.len() > cap {
            self.evict_one();
        }
    }
}

/// Thread-safe LRU+TTL cache mapping path to attribute snapshot.
pub struct AttrCache {
    inner: Mutex<Inner>,
}

impl AttrCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        AttrCache {
            inner: Mutex::new(Inner {
                slots: Vec::new(),
                index: HashMap::new(),
                free: Vec::new(),
                head: NIL,
                tail: NIL,
                capacity,
                ttl,
            }),
        }
    }

    /// Returns a clone of `path`'s snapshot if present and not expired; moves the entry to MRU
    /// on hit. An expired entry is treated as a miss and removed.
    pub fn get(&self, path: &str) -> Option<AttrSnapshot> {
        let mut inner = self.inner.lock().expect("attr cache lock poisoned");
        let idx = *inner.index.get(path)?;
        if inner.slots[idx].valid_until <= Instant::now() {
            inner.detach(idx);
            inner.index.remove(path);
            inner.free.push(idx);
            return None;
        }
        inner.touch(idx);
        Some(inner.slots[idx].snapshot.clone())
    }

    /// Inserts or updates `path`'s snapshot, moves it to MRU, and evicts the LRU entry if this
    /// insert pushed the cache over capacity.
    pub fn put(&self, path: String, snapshot: AttrSnapshot) {
        let mut inner = self.inner.lock().expect("attr cache lock poisoned");
        let valid_until = Instant::now() + inner.ttl;
        if let Some(&idx) = inner.index.get(&path) {
            inner.slots[idx].snapshot = snapshot;
            inner.slots[idx].valid_until = valid_until;
            inner.touch(idx);
            return;
        }
        let idx = match inner.free.pop() {
            Some(idx) => {
                inner.slots[idx] = Slot { path: path.clone(), snapshot, valid_until, prev: NIL, next: NIL };
                idx
            }
            None => {
                inner.slots.push(Slot { path: path.clone(), snapshot, valid_until, prev: NIL, next: NIL });
                inner.slots.len() - 1
            }
        };
        inner.index.insert(path, idx);
        inner.push_tail(idx);
        let cap = inner.capacity;
        inner.evict_until_at_most(cap);
    }

    pub fn invalidate(&self, path: &str) {
        let mut inner = self.inner.lock().expect("attr cache lock poisoned");
        if let Some(idx) = inner.index.remove(path) {
            inner.detach(idx);
            inner.free.push(idx);
        }
    }

    /// Updates capacity, evicting LRU entries until size is at most the new capacity.
    pub fn resize(&self, new_capacity: usize) {
        let mut inner = self.inner.lock().expect("attr cache lock poisoned");
        inner.capacity = new_capacity;
        inner.evict_until_at_most(new_capacity);
    }

    /// Changes the TTL applied to entries inserted from now on; existing entries keep their
    /// original `valid_until`.
    pub fn update_ttl(&self, ttl: Duration) {
        let mut inner = self.inner.lock().expect("attr cache lock poisoned");
        inner.ttl = ttl;
    }

    pub fn stats(&self) -> (usize, usize) {
        let inner = self.inner.lock().expect("attr cache lock poisoned");
        (inner.index.len(), inner.capacity)
    }
}
