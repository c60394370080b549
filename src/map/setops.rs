//! Filepath: src/map/setops.rs
//!
//! Set operations: structure-sharing diff, equality, merge.
//!
//! `setdiff` exploits sharing: a subtree whose node is reachable — by
//! identity — at the same path in the other map contributes nothing and
//! is pruned whole. For a map obtained by branching and then applying
//! δ edits, the diff therefore touches only the δ rewritten paths.

use std::hash::{BuildHasher, Hash};
use std::sync::Arc;

use crate::internode::{Children, Internode};
use crate::leaf::LeafNode;
use crate::path::{level_shift, Path, LEVEL_STRIDE};

use super::{BranchMap, MapError, RootNode};

// ============================================================================
//  Setdiff
// ============================================================================

impl<K, V, S> BranchMap<K, V, S>
where
    K: Hash + Eq + Clone,
    V: PartialEq + Clone,
    S: BuildHasher,
{
    /// The entries of `self` that are not present as equal pairs in
    /// `other`.
    ///
    /// Cost is proportional to the unshared part of `self`'s tree: for
    /// `other = branch(self)` plus δ edits (or vice versa), the walk
    /// prunes every untouched subtree by node identity and visits only
    /// the δ rewritten paths.
    #[must_use]
    pub fn setdiff(&self, other: &Self) -> Vec<(K, V)> {
        let mut out = Vec::new();

        match &self.root {
            RootNode::Leaf(leaf) => diff_leaf(leaf, Path::EMPTY, other, &mut out),

            RootNode::Inner(node) => diff_inode(
                node,
                level_shift(self.config.depth(), 0),
                Path::EMPTY,
                other,
                &mut out,
            ),
        }

        out
    }
}

fn diff_inode<K, V, S>(
    node: &Arc<Internode<K, V>>,
    shift: u32,
    path: Path,
    other: &BranchMap<K, V, S>,
    out: &mut Vec<(K, V)>,
) where
    K: Hash + Eq + Clone,
    V: PartialEq + Clone,
    S: BuildHasher,
{
    if shares_inode(other, node, path) {
        return;
    }

    let mask = (node.fanout() - 1) as u64;
    match &node.children {
        Children::Nodes(v) => {
            for (i, child) in v.iter().enumerate() {
                diff_inode(
                    child,
                    shift - LEVEL_STRIDE,
                    path.child(shift, mask, i as u64),
                    other,
                    out,
                );
            }
        }

        Children::Leaves(v) => {
            for (i, leaf) in v.iter().enumerate() {
                diff_leaf(leaf, path.child(shift, mask, i as u64), other, out);
            }
        }
    }
}

fn diff_leaf<K, V, S>(
    leaf: &Arc<LeafNode<K, V>>,
    path: Path,
    other: &BranchMap<K, V, S>,
    out: &mut Vec<(K, V)>,
) where
    K: Hash + Eq + Clone,
    V: PartialEq + Clone,
    S: BuildHasher,
{
    if shares_leaf(other, leaf, path) {
        return;
    }

    for e in leaf.entries() {
        if path.matches(e.hash) && !other.contains_pair(&e.key, &e.value) {
            out.push((e.key.clone(), e.value.clone()));
        }
    }
}

/// Is `target` the very node `other` holds at `path`?
///
/// Walks from `other`'s root along the selector bits recorded in
/// `path`, by `other`'s own array widths, comparing identity at each
/// step and stopping on the first match.
fn shares_inode<K, V, S>(
    other: &BranchMap<K, V, S>,
    target: &Arc<Internode<K, V>>,
    path: Path,
) -> bool {
    let RootNode::Inner(root) = &other.root else {
        return false;
    };

    let depth = other.config.depth();
    let mut node = root;
    let mut level = 0;
    loop {
        if Arc::ptr_eq(node, target) {
            return true;
        }
        let shift = level_shift(depth, level);
        let mask = (node.fanout() - 1) as u64;
        // A wider array here reads selector bits the recorded path
        // never sliced; pruning would be unsound.
        if !path.covers(shift, mask) {
            return false;
        }
        let idx = path.slot_at(shift, mask) as usize;
        match &node.children {
            Children::Nodes(v) => {
                node = &v[idx];
                level += 1;
            }

            Children::Leaves(_) => return false,
        }
    }
}

/// Is `target` the very leaf `other` holds at `path`?
fn shares_leaf<K, V, S>(
    other: &BranchMap<K, V, S>,
    target: &Arc<LeafNode<K, V>>,
    path: Path,
) -> bool {
    match &other.root {
        RootNode::Leaf(leaf) => Arc::ptr_eq(leaf, target),

        RootNode::Inner(root) => {
            let depth = other.config.depth();
            let mut node = root;
            let mut level = 0;
            loop {
                let shift = level_shift(depth, level);
                let mask = (node.fanout() - 1) as u64;
                if !path.covers(shift, mask) {
                    return false;
                }
                let idx = path.slot_at(shift, mask) as usize;
                match &node.children {
                    Children::Nodes(v) => {
                        node = &v[idx];
                        level += 1;
                    }

                    Children::Leaves(v) => return Arc::ptr_eq(&v[idx], target),
                }
            }
        }
    }
}

// ============================================================================
//  Equality
// ============================================================================

impl<K, V, S> PartialEq for BranchMap<K, V, S>
where
    K: Hash + Eq + Clone,
    V: PartialEq + Clone,
    S: BuildHasher,
{
    /// Two maps are equal when they hold the same pairs.
    ///
    /// Identical roots short-circuit to `true`; small maps point-check
    /// entry by entry; large maps test that the structural diff is
    /// empty, which prunes shared subtrees.
    fn eq(&self, other: &Self) -> bool {
        if self.len != other.len {
            return false;
        }

        let roots_shared = match (&self.root, &other.root) {
            (RootNode::Leaf(a), RootNode::Leaf(b)) => Arc::ptr_eq(a, b),

            (RootNode::Inner(a), RootNode::Inner(b)) => Arc::ptr_eq(a, b),

            _ => false,
        };
        if roots_shared {
            return true;
        }

        if self.len < 20 {
            self.iter().all(|(k, v)| other.contains_pair(k, v))
        } else {
            // Equal lengths and an empty one-directional diff imply
            // the maps coincide.
            self.setdiff(other).is_empty()
        }
    }
}

impl<K, V, S> Eq for BranchMap<K, V, S>
where
    K: Hash + Eq + Clone,
    V: Eq + Clone,
    S: BuildHasher,
{
}

// ============================================================================
//  Merge
// ============================================================================

impl<K, V, S> BranchMap<K, V, S>
where
    K: Hash + Eq + Clone,
    V: Clone,
    S: BuildHasher,
{
    /// Set every entry of each of `others` into this map, left to
    /// right; later maps win collisions.
    ///
    /// # Errors
    /// [`MapError::ImmutableMutation`] when this map is frozen.
    pub fn merge_from<'a, I>(&mut self, others: I) -> Result<(), MapError>
    where
        I: IntoIterator<Item = &'a Self>,
        K: 'a,
        V: 'a,
        S: 'a,
    {
        for other in others {
            for (k, v) in other {
                self.insert(k.clone(), v.clone())?;
            }
        }
        Ok(())
    }

    /// Like [`merge_from`](Self::merge_from), resolving each collision
    /// with `combine(current, incoming)`.
    ///
    /// # Errors
    /// [`MapError::ImmutableMutation`] when this map is frozen.
    pub fn merge_from_with<'a, I, F>(&mut self, others: I, mut combine: F) -> Result<(), MapError>
    where
        I: IntoIterator<Item = &'a Self>,
        F: FnMut(&V, &V) -> V,
        K: 'a,
        V: 'a,
        S: 'a,
    {
        for other in others {
            for (k, v) in other {
                let merged = match self.get(k) {
                    Some(current) => combine(current, v),

                    None => v.clone(),
                };
                self.insert(k.clone(), merged)?;
            }
        }
        Ok(())
    }

    /// Merged copy: branch this map, fold `others` in, freeze the
    /// result. This map itself ends up frozen (branching freezes it).
    #[must_use]
    pub fn merge<'a, I>(&self, others: I) -> Self
    where
        I: IntoIterator<Item = &'a Self>,
        S: Clone,
        K: 'a,
        V: 'a,
        S: 'a,
    {
        let mut out = self.branch();

        #[expect(
            clippy::expect_used,
            reason = "a freshly branched map is mutable"
        )]
        out.merge_from(others).expect("merge into fresh branch");

        out.freeze();
        out
    }
}
