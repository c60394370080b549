//! Filepath: src/map/iter.rs
//!
//! Snapshot iteration.
//!
//! Order is unspecified but stable for a fixed snapshot: the walk is
//! deterministic over the tree structure. Aliased subtrees are visited
//! once per route, and the accumulated [`Path`] filters each leaf down
//! to the entries that actually belong to the route taken, so every
//! entry is yielded exactly once.

use crate::internode::{Children, Internode};
use crate::leaf::LeafNode;
use crate::path::{level_shift, Path, LEVEL_STRIDE};

use super::{BranchMap, RootNode};

/// One in-progress interior level of the walk.
struct IterFrame<'a, K, V> {
    node: &'a Internode<K, V>,
    next_child: usize,
    shift: u32,
    path: Path,
}

/// Iterator over the entries of a [`BranchMap`].
///
/// For a map whose root is still a leaf, iteration performs no
/// allocation at all; deeper maps allocate one frame stack bounded by
/// the tree depth.
pub struct Iter<'a, K, V> {
    stack: Vec<IterFrame<'a, K, V>>,
    leaf: Option<LeafCursor<'a, K, V>>,
}

/// Scan state within one leaf.
struct LeafCursor<'a, K, V> {
    leaf: &'a LeafNode<K, V>,
    slot: usize,
    path: Path,
}

impl<'a, K, V> Iter<'a, K, V> {
    pub(crate) fn new<S>(map: &'a BranchMap<K, V, S>) -> Self {
        match &map.root {
            RootNode::Leaf(leaf) => Self {
                stack: Vec::new(),
                leaf: Some(LeafCursor {
                    leaf: leaf.as_ref(),
                    slot: 0,
                    path: Path::EMPTY,
                }),
            },

            RootNode::Inner(node) => {
                let mut stack = Vec::with_capacity(map.config.depth());
                stack.push(IterFrame {
                    node: node.as_ref(),
                    next_child: 0,
                    shift: level_shift(map.config.depth(), 0),
                    path: Path::EMPTY,
                });
                Self { stack, leaf: None }
            }
        }
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            // Drain the current leaf, skipping empty slots and entries
            // that belong to a sibling alias of this route.
            if let Some(cursor) = &mut self.leaf {
                let leaf: &'a LeafNode<K, V> = cursor.leaf;
                while cursor.slot < leaf.capacity() {
                    let slot = cursor.slot;
                    cursor.slot += 1;
                    if let Some(e) = leaf.entry_at(slot) {
                        if cursor.path.matches(e.hash) {
                            return Some((&e.key, &e.value));
                        }
                    }
                }
                self.leaf = None;
            }

            // Advance to the next leaf, depth-first.
            let frame = self.stack.last_mut()?;
            if frame.next_child >= frame.node.fanout() {
                self.stack.pop();
                continue;
            }

            let node: &'a Internode<K, V> = frame.node;
            let shift = frame.shift;
            let idx = frame.next_child;
            frame.next_child += 1;

            let mask = (node.fanout() - 1) as u64;
            let path = frame.path.child(shift, mask, idx as u64);

            match &node.children {
                Children::Nodes(v) => self.stack.push(IterFrame {
                    node: v[idx].as_ref(),
                    next_child: 0,
                    shift: shift - LEVEL_STRIDE,
                    path,
                }),

                Children::Leaves(v) => {
                    self.leaf = Some(LeafCursor {
                        leaf: v[idx].as_ref(),
                        slot: 0,
                        path,
                    });
                }
            }
        }
    }
}

impl<K, V, S> BranchMap<K, V, S> {
    /// Iterate over all entries, in an unspecified but
    /// snapshot-stable order.
    #[must_use]
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter::new(self)
    }
}

impl<'a, K, V, S> IntoIterator for &'a BranchMap<K, V, S> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
