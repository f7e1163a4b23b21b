// crates/grade-gate-core/src/core/time.rs
// ============================================================================
// Module: Grade Gate Time Model
// Description: Canonical timestamp and time context for policy checks.
// Purpose: Provide deterministic, replayable time values for submissions.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Submissions carry the instant they were recorded and policy checks run
//! against that instant, so re-evaluating an old submission reproduces the
//! original verdict. The core never reads wall-clock time directly; hosts
//! supply "now" explicitly for eligibility previews.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Milliseconds in one minute.
pub const MILLIS_PER_MINUTE: i64 = 60_000;
/// Milliseconds in one hour.
pub const MILLIS_PER_HOUR: i64 = 60 * MILLIS_PER_MINUTE;
/// Largest accepted UTC offset magnitude in minutes (18 hours).
pub const MAX_UTC_OFFSET_MINUTES: i32 = 18 * 60;

// ============================================================================
// SECTION: Time Values
// ============================================================================

/// Canonical timestamp in unix epoch milliseconds.
///
/// # Invariants
/// - Values are explicitly provided by callers; the core never reads wall-clock time.
/// - Ordering is total and matches chronological order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from unix epoch milliseconds.
    #[must_use]
    pub const fn from_unix_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as unix epoch milliseconds.
    #[must_use]
    pub const fn as_unix_millis(self) -> i64 {
        self.0
    }

    /// Returns a timestamp shifted by `millis`, saturating at the i64 bounds.
    #[must_use]
    pub const fn saturating_add_millis(self, millis: i64) -> Self {
        Self(self.0.saturating_add(millis))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Time context used when resolving page-level policy declarations.
///
/// # Invariants
/// - `utc_offset_minutes` is within [`MAX_UTC_OFFSET_MINUTES`] of zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeContext {
    /// Offset applied to declarations that carry no explicit offset.
    pub utc_offset_minutes: i32,
}

impl TimeContext {
    /// Time context interpreting offset-less declarations as UTC.
    #[must_use]
    pub const fn utc() -> Self {
        Self {
            utc_offset_minutes: 0,
        }
    }
}
