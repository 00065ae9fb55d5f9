//! An intrusive hash table with incremental (amortized) rehashing.
//!
//! Growing a hash table by rebuilding it all at once turns one insert into
//! an O(n) stall. Instead, once the load factor crosses [`LOAD_FACTOR`],
//! this table allocates a second, larger table and starts migrating nodes
//! into it a few at a time on every subsequent operation, so no single call
//! pays for more than [`MIGRATION_QUANTUM`] node moves. Lookups check both
//! tables until the migration finishes.
//!
//! Buckets hold singly-linked chains of [`NodeId`] handles; the node's own
//! "next in bucket" slot and cached hash code are supplied by a
//! [`HashNodeStore`] implementation on the arena that owns the nodes, so
//! this module never allocates per-node storage of its own.

use crate::arena::NodeId;

/// Per-node bookkeeping a hash index requires from its backing store.
pub trait HashNodeStore {
    fn hash_next(&self, id: NodeId) -> Option<NodeId>;
    fn set_hash_next(&mut self, id: NodeId, v: Option<NodeId>);
    fn hash_code(&self, id: NodeId) -> u64;
}

/// Once `len * LOAD_FACTOR > capacity`, a resize is triggered.
pub const LOAD_FACTOR: usize = 8;
/// Bucket slots a single [`HashIndex::migrate_step`] call will drain.
pub const MIGRATION_QUANTUM: usize = 128;
/// Smallest table size; always a power of two.
pub const INITIAL_CAPACITY: usize = 4;

struct Table {
    buckets: Vec<Option<NodeId>>,
    len: usize,
}

impl Table {
    fn with_capacity(capacity: usize) -> Self {
        debug_assert!(capacity.is_power_of_two());
        Table {
            buckets: vec![None; capacity],
            len: 0,
        }
    }

    fn mask(&self) -> u64 {
        (self.buckets.len() - 1) as u64
    }

    fn bucket_index(&self, hash: u64) -> usize {
        (hash & self.mask()) as usize
    }
}

/// An incrementally-resizing intrusive hash table.
pub struct HashIndex {
    primary: Table,
    /// The table being migrated out of, and the next bucket to drain.
    migrating: Option<(Table, usize)>,
}

impl HashIndex {
    pub fn new() -> Self {
        HashIndex {
            primary: Table::with_capacity(INITIAL_CAPACITY),
            migrating: None,
        }
    }

    pub fn len(&self) -> usize {
        self.primary.len + self.migrating.as_ref().map(|(t, _)| t.len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts `id` (whose hash is `store.hash_code(id)`) and kicks off a
    /// resize if the load factor demands it. Always inserts into the
    /// primary (newer) table.
    pub fn insert<S: HashNodeStore>(&mut self, store: &mut S, id: NodeId) {
        self.migrate_step(store);
        let hash = store.hash_code(id);
        let idx = self.primary.bucket_index(hash);
        store.set_hash_next(id, self.primary.buckets[idx]);
        self.primary.buckets[idx] = Some(id);
        self.primary.len += 1;
        self.maybe_start_rehash();
    }

    /// Finds the first node in either table whose hash is `hash` and for
    /// which `pred` returns true.
    pub fn lookup<S: HashNodeStore>(&self, store: &S, hash: u64, pred: impl Fn(&S, NodeId) -> bool) -> Option<NodeId> {
        if let Some(id) = Self::lookup_in(&self.primary, store, hash, &pred) {
            return Some(id);
        }
        if let Some((table, _)) = &self.migrating {
            return Self::lookup_in(table, store, hash, &pred);
        }
        None
    }

    fn lookup_in<S: HashNodeStore>(
        table: &Table,
        store: &S,
        hash: u64,
        pred: &impl Fn(&S, NodeId) -> bool,
    ) -> Option<NodeId> {
        let idx = table.bucket_index(hash);
        let mut cur = table.buckets[idx];
        while let Some(id) = cur {
            if store.hash_code(id) == hash && pred(store, id) {
                return Some(id);
            }
            cur = store.hash_next(id);
        }
        None
    }

    /// Removes and returns the first node in either table whose hash is
    /// `hash` and for which `pred` returns true.
    pub fn pop<S: HashNodeStore>(
        &mut self,
        store: &mut S,
        hash: u64,
        pred: impl Fn(&S, NodeId) -> bool,
    ) -> Option<NodeId> {
        if let Some(id) = Self::pop_from(&mut self.primary, store, hash, &pred) {
            return Some(id);
        }
        if let Some((table, _)) = &mut self.migrating {
            return Self::pop_from(table, store, hash, &pred);
        }
        None
    }

    fn pop_from<S: HashNodeStore>(
        table: &mut Table,
        store: &mut S,
        hash: u64,
        pred: &impl Fn(&S, NodeId) -> bool,
    ) -> Option<NodeId> {
        let idx = table.bucket_index(hash);
        let mut cur = table.buckets[idx];
        let mut prev: Option<NodeId> = None;
        while let Some(id) = cur {
            let next = store.hash_next(id);
            if store.hash_code(id) == hash && pred(store, id) {
                match prev {
                    Some(p) => store.set_hash_next(p, next),
                    None => table.buckets[idx] = next,
                }
                table.len -= 1;
                return Some(id);
            }
            prev = Some(id);
            cur = next;
        }
        None
    }

    fn maybe_start_rehash(&mut self) {
        if self.migrating.is_some() {
            return;
        }
        if self.primary.len > self.primary.buckets.len() * LOAD_FACTOR {
            let new_capacity = self.primary.buckets.len() * 2;
            let old = std::mem::replace(&mut self.primary, Table::with_capacity(new_capacity));
            self.migrating = Some((old, 0));
        }
    }

    /// Moves up to [`MIGRATION_QUANTUM`] nodes from the migrating table into
    /// the primary one. Called on every insert/lookup/pop so migration
    /// completes without any single call paying for the whole rehash.
    pub fn migrate_step<S: HashNodeStore>(&mut self, store: &mut S) {
        let Some((old, pos)) = &mut self.migrating else {
            return;
        };
        let mut moved = 0;
        while *pos < old.buckets.len() && moved < MIGRATION_QUANTUM {
            match old.buckets[*pos] {
                None => *pos += 1,
                Some(id) => {
                    old.buckets[*pos] = store.hash_next(id);
                    old.len -= 1;
                    let hash = store.hash_code(id);
                    let new_idx = self.primary.bucket_index(hash);
                    store.set_hash_next(id, self.primary.buckets[new_idx]);
                    self.primary.buckets[new_idx] = Some(id);
                    self.primary.len += 1;
                    moved += 1;
                }
            }
        }
        if *pos >= old.buckets.len() {
            self.migrating = None;
        }
    }

    /// Walks every node currently stored, across both tables.
    pub fn iter<'a, S: HashNodeStore>(&'a self, store: &'a S) -> impl Iterator<Item = NodeId> + 'a {
        let primary = self.primary.buckets.iter().copied();
        let migrating = self
            .migrating
            .iter()
            .flat_map(|(t, _)| t.buckets.iter().copied());
        primary
            .chain(migrating)
            .flat_map(move |head| ChainIter { store, cur: head })
    }
}

struct ChainIter<'a, S> {
    store: &'a S,
    cur: Option<NodeId>,
}

impl<'a, S: HashNodeStore> Iterator for ChainIter<'a, S> {
    type Item = NodeId;
    fn next(&mut self) -> Option<NodeId> {
        let id = self.cur?;
        self.cur = self.store.hash_next(id);
        Some(id)
    }
}

impl Default for HashIndex {
    fn default() -> Self {
        Self::new()
    }
}
