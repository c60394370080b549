//! Filepath: src/leaf.rs
//!
//! Leaf node: a small open-addressed hash table.
//!
//! Leaves hold the actual key-value pairs. Probing is xor-based: the
//! `i`-th probe for hash `h` in a table of `N` slots is
//! `(h ^ i) % N`, so the first few probes share a cache line while
//! clusters still disperse faster than under linear probing.
//!
//! # Probe invariant
//!
//! Occupied slots form probe chains that never skip an empty slot:
//! lookups stop at the first empty position. Deletion therefore never
//! clears a slot in place — it rebuilds the leaf without the victim —
//! and growth rebuilds at the next capacity of the growth ladder.
//!
//! # Aliasing and path filters
//!
//! A frozen leaf can be reachable from several interior slots (see
//! `internode.rs`). Entries that arrived via a different route are
//! invisible to this route's lookups (their hashes differ in the
//! sliced bits) and are dropped when a copy-on-write rebuild filters
//! by [`Path`].

use std::borrow::Borrow;
use std::fmt as StdFmt;
use std::sync::Arc;

use crate::check::invariant;
use crate::mutbit::MutBit;
use crate::path::Path;
use crate::tracing_helpers::trace_log;

/// Longest probe sequence examined before a leaf grows.
pub(crate) const MAX_PROBE: usize = 16;

/// Leaf capacity ladder; roughly 5/4 steps, continued by
/// `grow_step` past the end.
const CAPACITIES: [usize; 25] = [
    1, 2, 3, 4, 5, 6, 8, 11, 13, 15, 19, 23, 27, 33, 41, 47, 59, 73, 89, 113, 127, 147, 163, 191,
    233,
];

/// Next ladder step past the listed capacities: `ceil(5/4 * cap)`.
#[inline]
const fn grow_step(cap: usize) -> usize {
    cap + (cap + 3) / 4
}

/// Capacity the ladder prescribes for holding `count` entries.
///
/// Sized for a load factor of 10/11, clamped to at least one slot.
#[must_use]
pub(crate) fn leaf_table_size(count: usize) -> usize {
    let rough = ((count * 11).div_ceil(10)).max(1);
    for &cap in &CAPACITIES {
        if cap >= rough {
            return cap;
        }
    }

    let mut cap = CAPACITIES[CAPACITIES.len() - 1];
    while cap < rough {
        cap = grow_step(cap);
    }
    cap
}

/// Smallest ladder capacity strictly above `cap`.
#[must_use]
fn next_capacity_after(cap: usize) -> usize {
    for &c in &CAPACITIES {
        if c > cap {
            return c;
        }
    }
    grow_step(cap)
}

/// One occupied slot: the key, its value, and the key's full 64-bit
/// hash. The hash is computed exactly once, at insertion; rebuilds,
/// alias filtering, and iteration all reuse it.
#[derive(Clone, Debug)]
pub(crate) struct Entry<K, V> {
    pub(crate) hash: u64,
    pub(crate) key: K,
    pub(crate) value: V,
}

/// Result of probing for one key.
enum Probe {
    /// Slot holding this key.
    Hit(usize),

    /// First empty slot on the probe path; the key is absent.
    Empty(usize),

    /// Probe budget exhausted by other keys; the leaf is full for
    /// this key.
    Exhausted,
}

/// Bottom-level node: open-addressed table plus a mutability flag.
pub(crate) struct LeafNode<K, V> {
    mutable: MutBit,
    slots: Box<[Option<Entry<K, V>>]>,
}

impl<K, V> StdFmt::Debug for LeafNode<K, V> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("LeafNode")
            .field("capacity", &self.capacity())
            .field("len", &self.entries().count())
            .field("mutable", &self.is_mutable())
            .finish_non_exhaustive()
    }
}

impl<K, V> LeafNode<K, V> {
    /// Create an empty mutable leaf with `capacity` slots.
    #[must_use]
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            mutable: MutBit::new_mutable(),
            slots: (0..capacity.max(1)).map(|_| None).collect(),
        }
    }

    /// Number of slots.
    #[inline]
    #[must_use]
    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Probes examined before the leaf is considered full for a key.
    #[inline]
    #[must_use]
    fn probe_limit(&self) -> usize {
        MAX_PROBE.min(self.capacity())
    }

    /// The `i`-th probe index for `hash` in a table of `cap` slots.
    #[inline]
    #[must_use]
    fn probe_index(hash: u64, i: usize, cap: usize) -> usize {
        ((hash ^ i as u64) % cap as u64) as usize
    }

    /// Check whether this leaf may still be written in place.
    #[inline]
    #[must_use]
    pub(crate) fn is_mutable(&self) -> bool {
        self.mutable.is_mutable()
    }

    /// Freeze this leaf (monotone; idempotent).
    #[inline]
    pub(crate) fn freeze(&self) {
        self.mutable.freeze();
    }

    /// Entry at physical slot `slot`, if occupied.
    #[inline]
    #[must_use]
    pub(crate) fn entry_at(&self, slot: usize) -> Option<&Entry<K, V>> {
        self.slots[slot].as_ref()
    }

    /// All occupied slots, in physical order.
    pub(crate) fn entries(&self) -> impl Iterator<Item = &Entry<K, V>> {
        self.slots.iter().flatten()
    }

    /// Probe for `key`, comparing the cached hash before the key.
    fn probe<Q>(&self, hash: u64, key: &Q) -> Probe
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        let cap = self.capacity();
        for i in 0..self.probe_limit() {
            let slot = Self::probe_index(hash, i, cap);
            match &self.slots[slot] {
                None => return Probe::Empty(slot),

                Some(e) if e.hash == hash && e.key.borrow() == key => return Probe::Hit(slot),

                Some(_) => {}
            }
        }

        Probe::Exhausted
    }

    /// Look up `key`, returning a reference to its value.
    #[must_use]
    pub(crate) fn get<Q>(&self, hash: u64, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        match self.probe(hash, key) {
            Probe::Hit(slot) => self.slots[slot].as_ref().map(|e| &e.value),

            Probe::Empty(_) | Probe::Exhausted => None,
        }
    }
}

impl<K: Clone + Eq, V: Clone> LeafNode<K, V> {
    /// Build a leaf of at least `min_capacity` slots holding `entries`,
    /// escalating the capacity until every entry places within the
    /// probe budget.
    fn build(min_capacity: usize, entries: &[Entry<K, V>]) -> Self {
        let mut cap = min_capacity.max(1);
        loop {
            match Self::try_build(cap, entries) {
                Some(leaf) => return leaf,

                None => cap = next_capacity_after(cap),
            }
        }
    }

    /// One placement attempt at a fixed capacity.
    fn try_build(cap: usize, entries: &[Entry<K, V>]) -> Option<Self> {
        let mut slots: Box<[Option<Entry<K, V>>]> = (0..cap).map(|_| None).collect();

        'next_entry: for entry in entries {
            for i in 0..MAX_PROBE.min(cap) {
                let slot = Self::probe_index(entry.hash, i, cap);
                if slots[slot].is_none() {
                    slots[slot] = Some(entry.clone());
                    continue 'next_entry;
                }
            }
            return None;
        }

        Some(Self {
            mutable: MutBit::new_mutable(),
            slots,
        })
    }

    /// Mutable rebuild of this leaf restricted to `path`.
    ///
    /// Copies only the entries whose hash lies on `path`; entries that
    /// belong to sibling aliases stay behind in the shared original.
    /// The copy is sized for the filtered count.
    #[must_use]
    pub(crate) fn rebuild_under(&self, path: Path) -> Self {
        let kept: Vec<Entry<K, V>> = self
            .entries()
            .filter(|e| path.matches(e.hash))
            .cloned()
            .collect();

        trace_log!(
            kept = kept.len(),
            total = self.entries().count(),
            "leaf copy-on-write"
        );

        Self::build(leaf_table_size(kept.len()), &kept)
    }

    /// Insert through an `Arc` slot, cloning on write and growing on a
    /// full probe path. Returns the replaced value, if any.
    ///
    /// The caller must have verified that the enclosing container is
    /// mutable; this routine handles node-level sharing.
    pub(crate) fn insert_at(slot: &mut Arc<Self>, path: Path, entry: Entry<K, V>) -> Option<V> {
        if !slot.is_mutable() {
            let rebuilt = slot.rebuild_under(path);
            *slot = Arc::new(rebuilt);
        }

        invariant!(path.matches(entry.hash), "insert descended off its path");

        #[expect(
            clippy::expect_used,
            reason = "mutable leaves are uniquely referenced"
        )]
        let leaf = Arc::get_mut(slot).expect("mutable leaf shared");

        match leaf.probe(entry.hash, &entry.key) {
            Probe::Hit(i) => leaf.slots[i].replace(entry).map(|old| old.value),

            Probe::Empty(i) => {
                leaf.slots[i] = Some(entry);
                None
            }

            Probe::Exhausted => {
                let grown = leaf.grown_with(entry);
                *slot = Arc::new(grown);
                None
            }
        }
    }

    /// Rebuild at the next ladder capacity with `extra` appended.
    fn grown_with(&self, extra: Entry<K, V>) -> Self {
        let mut entries: Vec<Entry<K, V>> = self.entries().cloned().collect();
        entries.push(extra);

        trace_log!(
            from = self.capacity(),
            len = entries.len(),
            "leaf grows"
        );

        Self::build(next_capacity_after(self.capacity()), &entries)
    }

    /// Remove `key` through an `Arc` slot.
    ///
    /// When the key is present the slot is replaced by a fresh leaf of
    /// the same capacity holding every other on-path entry (clearing a
    /// slot in place would break the no-skip probe invariant). When it
    /// is absent the slot is left untouched.
    pub(crate) fn remove_at<Q>(
        slot: &mut Arc<Self>,
        path: Path,
        hash: u64,
        key: &Q,
    ) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        let victim = match slot.probe(hash, key) {
            Probe::Hit(i) => i,

            Probe::Empty(_) | Probe::Exhausted => return None,
        };

        let capacity = slot.capacity();
        let removed = slot.slots[victim].as_ref().map(|e| e.value.clone());
        let kept: Vec<Entry<K, V>> = slot
            .slots
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != victim)
            .filter_map(|(_, s)| s.as_ref())
            .filter(|e| path.matches(e.hash))
            .cloned()
            .collect();

        *slot = Arc::new(Self::build(capacity, &kept));

        removed
    }
}
