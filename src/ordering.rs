//! Standard memory orderings for node mutability flags.
//!
//! These constants ensure consistent ordering usage across the codebase
//! and make the intent clear at each access point.

use std::sync::atomic::Ordering;

/// Ordering for reading a node's mutability flag.
/// Pairs with the freezer's Release store, so a reader that observes
/// "immutable" also observes every write that preceded the freeze.
pub const READ_ORD: Ordering = Ordering::Acquire;

/// Ordering for the mutable -> immutable transition.
/// AcqRel: the Release half publishes the frozen subtree, the Acquire
/// half lets the freezing thread see whether it won the transition.
pub const FREEZE_ORD: Ordering = Ordering::AcqRel;
