//! Filepath: src/mutbit.rs
//!
//! Monotone mutability flag for tree nodes.
//!
//! Every node carries one [`MutBit`]. A node starts mutable and may be
//! frozen exactly once; the transition is one-way. Writers consult the
//! flag before touching a node: a mutable node is uniquely referenced
//! and may be edited in place, an immutable node must be cloned first
//! (copy-on-write).
//!
//! # Concurrency Model
//!
//! The flag is the only atomic state in the tree. Freezing stores with
//! Release so that a thread which later observes "immutable" through an
//! Acquire load also observes every write made before the freeze. This
//! is what makes the publish-by-pointer-swap pattern sound: freeze the
//! tree, hand the root to another thread, and readers need nothing more
//! than an acquiring load of the root pointer.

use std::sync::atomic::AtomicBool;

use crate::ordering::{FREEZE_ORD, READ_ORD};

/// One-way mutable -> immutable flag.
///
/// # Example
///
/// ```rust,ignore
/// let bit = MutBit::new_mutable();
/// assert!(bit.is_mutable());
/// assert!(bit.freeze());   // performed the transition
/// assert!(!bit.freeze());  // already frozen
/// ```
#[derive(Debug)]
pub(crate) struct MutBit {
    mutable: AtomicBool,
}

impl MutBit {
    /// Create a flag in the mutable state.
    #[inline]
    #[must_use]
    pub(crate) fn new_mutable() -> Self {
        Self {
            mutable: AtomicBool::new(true),
        }
    }

    /// Check whether the owning node may still be written in place.
    #[inline]
    #[must_use]
    pub(crate) fn is_mutable(&self) -> bool {
        self.mutable.load(READ_ORD)
    }

    /// Perform the mutable -> immutable transition.
    ///
    /// Returns `true` if this call performed the transition, `false` if
    /// the flag was already frozen. Callers use the return value to
    /// terminate recursive freezes: an immutable node's subtree is
    /// already immutable, so there is nothing left to visit.
    #[inline]
    pub(crate) fn freeze(&self) -> bool {
        self.mutable.swap(false, FREEZE_ORD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_mutable() {
        let bit = MutBit::new_mutable();
        assert!(bit.is_mutable());
    }

    #[test]
    fn freeze_is_one_way_and_reports_transition() {
        let bit = MutBit::new_mutable();
        assert!(bit.freeze());
        assert!(!bit.is_mutable());
        assert!(!bit.freeze());
        assert!(!bit.is_mutable());
    }
}
