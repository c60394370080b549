//! Filepath: src/check.rs
//!
//! Process-wide assertion level and invariant-check macro.
//!
//! The level is read once from the `BRANCHMAP_ASSERT_LEVEL` environment
//! variable and treated as a read-only global afterwards:
//!
//! - `0` - all invariant checks disabled
//! - `1` - default; cheap checks, compiled only into debug builds
//! - `2+` - aggressive: the whole-tree verifier runs after every mutation
//!
//! Invariant failures indicate a bug in this crate, never a caller
//! mistake, and are fatal.

use std::sync::OnceLock;

static ASSERT_LEVEL: OnceLock<u8> = OnceLock::new();

/// The process-wide assertion level (see module docs).
///
/// First call reads `BRANCHMAP_ASSERT_LEVEL`; malformed or missing
/// values fall back to the default of 1.
#[must_use]
pub fn assert_level() -> u8 {
    *ASSERT_LEVEL.get_or_init(|| {
        std::env::var("BRANCHMAP_ASSERT_LEVEL")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1)
    })
}

/// Cheap invariant check, active in debug builds at assertion level >= 1.
macro_rules! invariant {
    ($cond:expr, $($msg:tt)+) => {
        if cfg!(debug_assertions) && $crate::check::assert_level() >= 1 {
            assert!($cond, $($msg)+);
        }
    };
}

pub(crate) use invariant;
