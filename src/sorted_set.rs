//! A sorted set: members are unique byte strings, each carrying a `f64`
//! score, ordered by `(score, name)` and also addressable by name in O(1)
//! amortized time.
//!
//! Each member is stored once, in an arena, and wears two hooks at once: a
//! tree hook (ordering by score then name) and a hash hook (lookup by
//! name). This is the "composite index" design from [`crate::tree`] and
//! [`crate::hash_index`] applied to a concrete payload.

use crate::arena::{Arena, NodeId};
use crate::hash_index::{HashIndex, HashNodeStore};
use crate::hashing::fnv_like;
use crate::tree::{self, TreeNodeStore};

struct Element {
    name: Vec<u8>,
    score: f64,
    hash: u64,

    hash_next: Option<NodeId>,

    left: Option<NodeId>,
    right: Option<NodeId>,
    parent: Option<NodeId>,
    depth: u32,
    size: u32,
}

impl HashNodeStore for Arena<Element> {
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

impl TreeNodeStore for Arena<Element> {
    fn left(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).left
    }
    fn set_left(&mut self, id: NodeId, v: Option<NodeId>) {
        self.get_mut(id).left = v;
    }
    fn right(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).right
    }
    fn set_right(&mut self, id: NodeId, v: Option<NodeId>) {
        self.get_mut(id).right = v;
    }
    fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).parent
    }
    fn set_parent(&mut self, id: NodeId, v: Option<NodeId>) {
        self.get_mut(id).parent = v;
    }
    fn depth(&self, id: NodeId) -> u32 {
        self.get(id).depth
    }
    fn set_depth(&mut self, id: NodeId, v: u32) {
        self.get_mut(id).depth = v;
    }
    fn size(&self, id: NodeId) -> u32 {
        self.get(id).size
    }
    fn set_size(&mut self, id: NodeId, v: u32) {
        self.get_mut(id).size = v;
    }
}

/// A single `(name, score)` pair retrieved out of a [`SortedSet`].
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub name: Vec<u8>,
    pub score: f64,
}

fn order_key(score: f64, name: &[u8]) -> (u64, &[u8]) {
    // Scores are rejected at the dispatcher if they're NaN; internally we
    // can rely on total ordering via the bit pattern of non-NaN f64s once
    // the sign bit is folded, which keeps comparisons branch-free.
    let bits = score.to_bits();
    let key = if score.is_sign_negative() {
        !bits
    } else {
        bits | (1 << 63)
    };
    (key, name)
}

/// A sorted set of `(name, score)` members, unique by name.
pub struct SortedSet {
    arena: Arena<Element>,
    hash: HashIndex,
    root: Option<NodeId>,
}

impl SortedSet {
    pub fn new() -> Self {
        SortedSet {
            arena: Arena::new(),
            hash: HashIndex::new(),
            root: None,
        }
    }

    pub fn len(&self) -> usize {
        self.hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hash.is_empty()
    }

    fn find(&self, name: &[u8]) -> Option<NodeId> {
        let hash = fnv_like(name);
        self.hash.lookup(&self.arena, hash, |arena, id| arena.get(id).name == name)
    }

    /// Returns the existing score for `name` if present.
    pub fn score(&self, name: &[u8]) -> Option<f64> {
        self.find(name).map(|id| self.arena.get(id).score)
    }

    /// Inserts `name` with `score`, or updates its score if already
    /// present. `score` must not be NaN. Returns `true` if this created a
    /// new member.
    pub fn insert(&mut self, name: Vec<u8>, score: f64) -> bool {
        debug_assert!(!score.is_nan(), "NaN scores must be rejected before reaching SortedSet");
        if let Some(id) = self.find(&name) {
            if self.arena.get(id).score != score {
                self.detach_from_tree(id);
                self.arena.get_mut(id).score = score;
                self.attach_to_tree(id);
            }
            return false;
        }

        let hash = fnv_like(&name);
        let id = self.arena.insert(Element {
            name,
            score,
            hash,
            hash_next: None,
            left: None,
            right: None,
            parent: None,
            depth: 0,
            size: 0,
        });
        self.hash.insert(&mut self.arena, id);
        self.attach_to_tree(id);
        true
    }

    /// Removes `name`, returning its score if it was present.
    pub fn remove(&mut self, name: &[u8]) -> Option<f64> {
        let hash = fnv_like(name);
        let id = self.hash.pop(&mut self.arena, hash, |arena, id| arena.get(id).name == name)?;
        self.detach_from_tree(id);
        let element = self.arena.remove(id);
        Some(element.score)
    }

    fn attach_to_tree(&mut self, id: NodeId) {
        tree::init_node(&mut self.arena, id);
        match self.root {
            None => {
                self.arena.get_mut(id).parent = None;
                self.root = Some(id);
            }
            Some(mut cur) => loop {
                let (target_score, target_name) = {
                    let e = self.arena.get(id);
                    (e.score, e.name.clone())
                };
                let (cur_score, cur_name) = {
                    let e = self.arena.get(cur);
                    (e.score, e.name.clone())
                };
                let go_left = order_key(target_score, &target_name) < order_key(cur_score, &cur_name);
                let child = if go_left { self.arena.get(cur).left } else { self.arena.get(cur).right };
                match child {
                    Some(next) => cur = next,
                    None => {
                        if go_left {
                            self.arena.get_mut(cur).left = Some(id);
                        } else {
                            self.arena.get_mut(cur).right = Some(id);
                        }
                        self.arena.get_mut(id).parent = Some(cur);
                        break;
                    }
                }
            },
        }
        self.root = Some(tree::rebalance(&mut self.arena, id));
    }

    fn detach_from_tree(&mut self, id: NodeId) {
        self.root = tree::delete(&mut self.arena, id);
    }

    /// Returns the in-order rank (0-based) of `name`, if present.
    pub fn rank(&self, name: &[u8]) -> Option<u64> {
        let id = self.find(name)?;
        let mut pos = tree::subtree_size(&self.arena, self.arena.get(id).left) as u64;
        let mut cur = id;
        while let Some(parent) = self.arena.get(cur).parent {
            if self.arena.get(parent).right == Some(cur) {
                pos += tree::subtree_size(&self.arena, self.arena.get(parent).left) as u64 + 1;
            }
            cur = parent;
        }
        Some(pos)
    }

    /// Returns up to `limit` members starting at `(score, name)`
    /// inclusive, walking in ascending order.
    pub fn query(&self, score: f64, name: &[u8], offset: i64, limit: usize) -> Vec<Member> {
        self.query_iter(score, name, offset).take(limit).collect()
    }

    /// Lazily walks ascending `(score, name)` order starting at the first
    /// member `>=` the given key, then shifted by `offset` positions.
    /// Unlike `query`, this doesn't require a limit upfront — pair with
    /// [`Iterator::take`] to bound it. This is what lets `ZQUERY` stream
    /// its reply without pre-counting members, mirroring the original
    /// server's `znode_offset` walk.
    pub fn query_iter(&self, score: f64, name: &[u8], offset: i64) -> impl Iterator<Item = Member> + '_ {
        let start = self.seek(score, name).and_then(|id| tree::offset(&self.arena, id, offset));
        QueryIter {
            arena: &self.arena,
            cur: start,
        }
    }

    /// Finds the first member whose `(score, name)` is `>=` the given key.
    fn seek(&self, score: f64, name: &[u8]) -> Option<NodeId> {
        let target = order_key(score, name);
        let mut cur = self.root;
        let mut candidate = None;
        while let Some(id) = cur {
            let e = self.arena.get(id);
            let key = order_key(e.score, &e.name);
            if key >= target {
                candidate = Some(id);
                cur = e.left;
            } else {
                cur = e.right;
            }
        }
        candidate
    }

    /// Walks the whole set in ascending `(score, name)` order.
    pub fn iter(&self) -> impl Iterator<Item = Member> + '_ {
        let mut stack = Vec::new();
        let mut cur = self.root;
        SortedSetIter {
            arena: &self.arena,
            stack: {
                while let Some(id) = cur {
                    stack.push(id);
                    cur = self.arena.get(id).left;
                }
                stack
            },
        }
    }
}

struct QueryIter<'a> {
    arena: &'a Arena<Element>,
    cur: Option<NodeId>,
}

impl<'a> Iterator for QueryIter<'a> {
    type Item = Member;
    fn next(&mut self) -> Option<Member> {
        let id = self.cur?;
        let element = self.arena.get(id);
        let member = Member {
            name: element.name.clone(),
            score: element.score,
        };
        self.cur = tree::offset(self.arena, id, 1);
        Some(member)
    }
}

struct SortedSetIter<'a> {
    arena: &'a Arena<Element>,
    stack: Vec<NodeId>,
}

impl<'a> Iterator for SortedSetIter<'a> {
    type Item = Member;
    fn next(&mut self) -> Option<Member> {
        let id = self.stack.pop()?;
        let element = self.arena.get(id);
        let mut cur = element.right;
        while let Some(id) = cur {
            self.stack.push(id);
            cur = self.arena.get(id).left;
        }
        Some(Member {
            name: element.name.clone(),
            score: element.score,
        })
    }
}

impl Default for SortedSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    #[test]
    fn insert_update_remove() {
        let mut set = SortedSet::new();
        assert!(set.insert(b"a".to_vec(), 1.0));
        assert!(!set.insert(b"a".to_vec(), 2.0));
        assert_eq!(set.score(b"a"), Some(2.0));
        assert_eq!(set.remove(b"a"), Some(2.0));
        assert_eq!(set.remove(b"a"), None);
    }

    #[test]
    fn iter_is_ordered_by_score_then_name() {
        let mut set = SortedSet::new();
        set.insert(b"bob".to_vec(), 1.0);
        set.insert(b"alice".to_vec(), 1.0);
        set.insert(b"carol".to_vec(), 0.5);
        let names: Vec<Vec<u8>> = set.iter().map(|m| m.name).collect();
        assert_eq!(names, vec![b"carol".to_vec(), b"alice".to_vec(), b"bob".to_vec()]);
    }

    #[test]
    fn rank_matches_iteration_order() {
        let mut set = SortedSet::new();
        for (name, score) in [("a", 3.0), ("b", 1.0), ("c", 2.0), ("d", 2.0)] {
            set.insert(name.as_bytes().to_vec(), score);
        }
        for (i, member) in set.iter().enumerate() {
            assert_eq!(set.rank(&member.name), Some(i as u64));
        }
    }

    #[test]
    fn query_respects_offset_and_limit() {
        let mut set = SortedSet::new();
        for i in 0..10 {
            set.insert(format!("m{i:02}").into_bytes(), i as f64);
        }
        let page = set.query(3.0, b"m03", 0, 3);
        let names: Vec<Vec<u8>> = page.into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec![b"m03".to_vec(), b"m04".to_vec(), b"m05".to_vec()]);

        let shifted = set.query(3.0, b"m03", 2, 2);
        let names: Vec<Vec<u8>> = shifted.into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec![b"m05".to_vec(), b"m06".to_vec()]);
    }

    proptest! {
        #[test]
        fn matches_btreemap_ordering(ops in prop::collection::vec((prop::bool::ANY, 0u8..20, -5.0f64..5.0), 0..200)) {
            let mut set = SortedSet::new();
            let mut reference: BTreeMap<Vec<u8>, f64> = BTreeMap::new();
            for (is_insert, name_byte, score) in ops {
                let name = vec![b'm', name_byte];
                if is_insert {
                    set.insert(name.clone(), score);
                    reference.insert(name, score);
                } else {
                    set.remove(&name);
                    reference.remove(&name);
                }
            }
            let mut expected: Vec<(Vec<u8>, f64)> = reference.into_iter().collect();
            expected.sort_by(|a, b| {
                order_key(a.1, &a.0).cmp(&order_key(b.1, &b.0))
            });
            let got: Vec<(Vec<u8>, f64)> = set.iter().map(|m| (m.name, m.score)).collect();
            prop_assert_eq!(got, expected);
        }
    }
}
