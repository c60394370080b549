//! Filepath: src/tracing_helpers.rs
//!
//! Feature-gated log macros for structural events.
//!
//! The tree logs at exactly two levels: `debug_log!` for shape events
//! (depth increases and root widening in `map.rs`, aliased child-array
//! growth in `internode.rs`, branching) and `trace_log!` for the much
//! chattier per-leaf events (`leaf.rs` copy-on-write rebuilds and
//! capacity steps). Without the `tracing` feature both macros expand
//! to nothing, so arguments are not even evaluated.
//!
//! To watch a map change shape under load:
//!
//! ```bash
//! RUST_LOG=branchmap=debug cargo test --features tracing scenario_small_growth
//! ```

/// Shape-change events: rare, one per threshold crossing or branch.
#[cfg(feature = "tracing")]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        tracing::debug!($($arg)*)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! debug_log {
    ($($arg:tt)*) => {};
}

/// Per-leaf events: copy-on-write rebuilds and capacity growth. Fires
/// on nearly every write to a shared tree, so it sits a level below
/// `debug_log!`.
#[cfg(feature = "tracing")]
macro_rules! trace_log {
    ($($arg:tt)*) => {
        tracing::trace!($($arg)*)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_log {
    ($($arg:tt)*) => {};
}

pub(crate) use debug_log;
pub(crate) use trace_log;
