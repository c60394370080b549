//! Filepath: src/internode.rs
//!
//! Interior node: a fixed-fanout router over hash-bit slices.
//!
//! Internodes hold no entries, only a homogeneous child array — either
//! all internodes one level below, or all leaves. The array length is
//! always a power of two and may lag the configured fanout: growth is
//! lazy and happens by *aliasing*.
//!
//! # Aliased growth
//!
//! Doubling copies the child array onto itself: `[c0, c1]` becomes
//! `[c0, c1, c0, c1]`. Every child is reachable through two slots
//! afterwards, so all children are frozen first; the next write that
//! descends through either half clones its target with the new high
//! selector bit pinned to that half, and the aliases specialize over
//! time. Lookups never grow a node — an un-grown array simply ignores
//! selector bits it has not consumed yet.
//!
//! # Invariants
//!
//! - The child array length is a power of two, at most the configured
//!   fanout for the node's depth.
//! - A mutable internode is referenced by exactly one slot of exactly
//!   one tree.
//! - An immutable internode roots a fully immutable subtree.

use std::fmt as StdFmt;
use std::sync::Arc;

use crate::check::invariant;
use crate::leaf::LeafNode;
use crate::mutbit::MutBit;
use crate::tracing_helpers::debug_log;

/// Homogeneous child array: internodes route either to more internodes
/// or, at the bottom interior level, to leaves. Keeping the two cases
/// as separate vectors spares every descent step a per-child tag check.
pub(crate) enum Children<K, V> {
    /// Children are internodes one level below.
    Nodes(Vec<Arc<Internode<K, V>>>),

    /// This is the bottom interior level; children are leaves.
    Leaves(Vec<Arc<LeafNode<K, V>>>),
}

impl<K, V> Clone for Children<K, V> {
    fn clone(&self) -> Self {
        match self {
            Self::Nodes(v) => Self::Nodes(v.clone()),

            Self::Leaves(v) => Self::Leaves(v.clone()),
        }
    }
}

impl<K, V> Children<K, V> {
    /// Current array length.
    #[inline]
    #[must_use]
    fn len(&self) -> usize {
        match self {
            Self::Nodes(v) => v.len(),

            Self::Leaves(v) => v.len(),
        }
    }
}

/// Interior routing node.
pub(crate) struct Internode<K, V> {
    mutable: MutBit,
    pub(crate) children: Children<K, V>,
}

impl<K, V> StdFmt::Debug for Internode<K, V> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        let kind = match &self.children {
            Children::Nodes(_) => "nodes",
            Children::Leaves(_) => "leaves",
        };
        f.debug_struct("Internode")
            .field("fanout", &self.fanout())
            .field("children", &kind)
            .field("mutable", &self.is_mutable())
            .finish_non_exhaustive()
    }
}

impl<K, V> Internode<K, V> {
    /// New mutable node whose `fanout` slots all alias `leaf`.
    ///
    /// Used when the container grows from a root leaf to depth one, and
    /// the caller has already frozen the leaf.
    #[must_use]
    pub(crate) fn over_leaf(leaf: &Arc<LeafNode<K, V>>, fanout: usize) -> Self {
        invariant!(fanout.is_power_of_two(), "fanout must be a power of two");

        Self {
            mutable: MutBit::new_mutable(),
            children: Children::Leaves(vec![Arc::clone(leaf); fanout]),
        }
    }

    /// New mutable node whose `fanout` slots all alias `node`.
    ///
    /// Used when the container adds a level on top of an existing
    /// (already frozen) root.
    #[must_use]
    pub(crate) fn over_node(node: &Arc<Self>, fanout: usize) -> Self {
        invariant!(fanout.is_power_of_two(), "fanout must be a power of two");

        Self {
            mutable: MutBit::new_mutable(),
            children: Children::Nodes(vec![Arc::clone(node); fanout]),
        }
    }

    /// Current child-array length.
    #[inline]
    #[must_use]
    pub(crate) fn fanout(&self) -> usize {
        self.children.len()
    }

    /// Check whether this node may still be written in place.
    #[inline]
    #[must_use]
    pub(crate) fn is_mutable(&self) -> bool {
        self.mutable.is_mutable()
    }

    /// Freeze this node and everything below it.
    ///
    /// An already-immutable node terminates the recursion: its subtree
    /// is immutable by invariant. Cost is proportional to the number of
    /// still-mutable nodes.
    pub(crate) fn freeze(&self) {
        if !self.mutable.freeze() {
            return;
        }

        match &self.children {
            Children::Nodes(v) => v.iter().for_each(|c| c.freeze()),

            Children::Leaves(v) => v.iter().for_each(|c| c.freeze()),
        }
    }

    /// Shallow mutable clone: the child array is copied (sharing every
    /// child), the clone's flag starts mutable.
    ///
    /// Only ever applied to frozen nodes, whose children are frozen
    /// subtrees safe to share.
    #[must_use]
    pub(crate) fn clone_for_write(&self) -> Self {
        Self {
            mutable: MutBit::new_mutable(),
            children: self.children.clone(),
        }
    }

    /// Lazily grow the child array to `target` slots by aliasing.
    ///
    /// Children are frozen first — each becomes reachable through two
    /// slots per doubling — then the array is repeated onto itself
    /// until it reaches `target`.
    pub(crate) fn grow_to(&mut self, target: usize) {
        if self.fanout() >= target {
            return;
        }

        invariant!(target.is_power_of_two(), "fanout must be a power of two");
        debug_log!(from = self.fanout(), to = target, "internode aliased growth");

        match &self.children {
            Children::Nodes(v) => v.iter().for_each(|c| c.freeze()),

            Children::Leaves(v) => v.iter().for_each(|c| c.freeze()),
        }

        while self.fanout() < target {
            match &mut self.children {
                Children::Nodes(v) => v.extend_from_within(..),

                Children::Leaves(v) => v.extend_from_within(..),
            }
        }
    }

    /// Make the node behind `slot` writable in place, cloning a frozen
    /// node first (copy-on-write).
    pub(crate) fn make_mut(slot: &mut Arc<Self>) -> &mut Self {
        if !slot.is_mutable() {
            let clone = slot.clone_for_write();
            *slot = Arc::new(clone);
        }

        #[expect(
            clippy::expect_used,
            reason = "mutable internodes are uniquely referenced"
        )]
        Arc::get_mut(slot).expect("mutable internode shared")
    }
}
