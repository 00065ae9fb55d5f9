//! The top-level key/value map served by the connection event loop.
//!
//! One [`Keyspace`] is owned by the event loop and threaded through every
//! connection's dispatch call; there is no global/static instance.

use crate::arena::{Arena, NodeId};
use crate::entry::{Value, WrongType};
use crate::hash_index::{HashIndex, HashNodeStore};
use crate::hashing::fnv_like;
use crate::sorted_set::SortedSet;

struct Entry {
    key: Vec<u8>,
    value: Value,
    hash: u64,
    hash_next: Option<NodeId>,
}

impl HashNodeStore for Arena<Entry> {
    fn hash_next(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).hash_next
    }
    fn set_hash_next(&mut self, id: NodeId, v: Option<NodeId>) {
        self.get_mut(id).hash_next = v;
    }
    fn hash_code(&self, id: NodeId) -> u64 {
        self.get(id).hash
    }
}

/// The whole of a single store: one flat namespace of keys, each holding a
/// [`Value`].
pub struct Keyspace {
    arena: Arena<Entry>,
    index: HashIndex,
}

impl Keyspace {
    pub fn new() -> Self {
        Keyspace {
            arena: Arena::new(),
            index: HashIndex::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    fn find(&self, key: &[u8]) -> Option<NodeId> {
        let hash = fnv_like(key);
        self.index.lookup(&self.arena, hash, |arena, id| arena.get(id).key == key)
    }

    /// Looks up a key's value, regardless of type.
    pub fn get(&self, key: &[u8]) -> Option<&Value> {
        self.find(key).map(|id| &self.arena.get(id).value)
    }

    /// Sets `key` to hold the plain string `value`, replacing whatever was
    /// there before (including a sorted set). Returns `true` if this
    /// created a new key.
    pub fn set_str(&mut self, key: Vec<u8>, value: Vec<u8>) -> bool {
        if let Some(id) = self.find(&key) {
            self.arena.get_mut(id).value = Value::Str(value);
            return false;
        }
        let hash = fnv_like(&key);
        let id = self.arena.insert(Entry {
            key,
            value: Value::Str(value),
            hash,
            hash_next: None,
        });
        self.index.insert(&mut self.arena, id);
        true
    }

    /// Deletes `key`, returning `true` if it was present.
    pub fn del(&mut self, key: &[u8]) -> bool {
        let hash = fnv_like(key);
        match self.index.pop(&mut self.arena, hash, |arena, id| arena.get(id).key == key) {
            Some(id) => {
                self.arena.remove(id);
                true
            }
            None => false,
        }
    }

    /// Lists every key currently stored, in unspecified order.
    pub fn keys(&self) -> Vec<Vec<u8>> {
        self.index.iter(&self.arena).map(|id| self.arena.get(id).key.clone()).collect()
    }

    /// Read-only access to the sorted set stored at `key`. `Ok(None)` if
    /// the key is absent; `Err(WrongType)` if it holds something else.
    pub fn zset(&self, key: &[u8]) -> Result<Option<&SortedSet>, WrongType> {
        match self.find(key).map(|id| &self.arena.get(id).value) {
            None => Ok(None),
            Some(Value::SortedSet(set)) => Ok(Some(set)),
            Some(_) => Err(WrongType),
        }
    }

    /// Mutable access to the sorted set stored at `key`, creating an empty
    /// one if the key is absent. `Err(WrongType)` if it holds something
    /// else.
    pub fn zset_mut_or_insert(&mut self, key: &[u8]) -> Result<&mut SortedSet, WrongType> {
        if let Some(id) = self.find(key) {
            return match &mut self.arena.get_mut(id).value {
                Value::SortedSet(set) => Ok(set),
                Value::Str(_) => Err(WrongType),
            };
        }
        let hash = fnv_like(key);
        let id = self.arena.insert(Entry {
            key: key.to_vec(),
            value: Value::SortedSet(SortedSet::new()),
            hash,
            hash_next: None,
        });
        self.index.insert(&mut self.arena, id);
        match &mut self.arena.get_mut(id).value {
            Value::SortedSet(set) => Ok(set),
            Value::Str(_) => unreachable!("just inserted as a sorted set"),
        }
    }
}

impl Default for Keyspace {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_del_roundtrip() {
        let mut ks = Keyspace::new();
        assert!(ks.set_str(b"k".to_vec(), b"v".to_vec()));
        match ks.get(b"k") {
            Some(Value::Str(v)) => assert_eq!(v, b"v"),
            _ => panic!("expected string value"),
        }
        assert!(!ks.set_str(b"k".to_vec(), b"v2".to_vec()));
        assert!(ks.del(b"k"));
        assert!(ks.get(b"k").is_none());
        assert!(!ks.del(b"k"));
    }

    #[test]
    fn zset_mut_or_insert_creates_on_demand() {
        let mut ks = Keyspace::new();
        ks.zset_mut_or_insert(b"z").unwrap().insert(b"a".to_vec(), 1.0);
        assert_eq!(ks.zset(b"z").unwrap().unwrap().score(b"a"), Some(1.0));
    }

    #[test]
    fn zset_ops_reject_wrong_type() {
        let mut ks = Keyspace::new();
        ks.set_str(b"k".to_vec(), b"v".to_vec());
        assert!(ks.zset_mut_or_insert(b"k").is_err());
        assert!(ks.zset(b"k").is_err());
    }

    #[test]
    fn keys_lists_everything() {
        let mut ks = Keyspace::new();
        ks.set_str(b"a".to_vec(), b"1".to_vec());
        ks.set_str(b"b".to_vec(), b"2".to_vec());
        let mut keys = ks.keys();
        keys.sort();
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec()]);
    }
}
