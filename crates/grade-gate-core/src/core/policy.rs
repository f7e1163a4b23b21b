// crates/grade-gate-core/src/core/policy.rs
// ============================================================================
// Module: Grade Gate Policy Model
// Description: Submission attempts and the constraints checked against them.
// Purpose: Define resolved policies independent of how pages declare them.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A [`Policy`] is an ordered list of [`Constraint`] values resolved from a
//! page. It is checked against an [`Access`], the `(user, path, time)` tuple
//! of one attempt. Accesses are never persisted: evaluations build them from
//! the submission's recorded fields, eligibility previews from a supplied
//! "now".

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::ExercisePath;
use crate::core::identifiers::UserLogin;
use crate::core::submission::Submission;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Violation Messages
// ============================================================================

/// Message reported for a [`Constraint::Before`] violation.
pub const LATE_SUBMISSION: &str = "Late submission";
/// Message reported for a [`Constraint::After`] violation.
pub const EARLY_SUBMISSION: &str = "Early submission";
/// Message reported for a [`Constraint::MaxAttempts`] violation.
pub const TOO_MANY_SUBMISSIONS: &str = "Too many submissions";

// ============================================================================
// SECTION: Access
// ============================================================================

/// One submission attempt checked against a policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Access {
    /// Login of the submitter.
    pub user: UserLogin,
    /// Exercise path being submitted to.
    pub path: ExercisePath,
    /// Instant of the attempt.
    pub time: Timestamp,
}

impl Access {
    /// Builds an access from explicit parts.
    #[must_use]
    pub const fn new(user: UserLogin, path: ExercisePath, time: Timestamp) -> Self {
        Self {
            user,
            path,
            time,
        }
    }

    /// Builds an access from a submission's recorded user, path, and time.
    #[must_use]
    pub fn for_submission(submission: &Submission) -> Self {
        Self {
            user: submission.user.clone(),
            path: submission.path.clone(),
            time: submission.submitted_at,
        }
    }
}

// ============================================================================
// SECTION: Constraints
// ============================================================================

/// Resolved admissibility constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Constraint {
    /// Attempt time must be at or before the deadline.
    Before(Timestamp),
    /// Attempt time must be at or after the start.
    After(Timestamp),
    /// Earlier attempts by the same user on the same path must number fewer than the limit.
    MaxAttempts(u64),
}

impl Constraint {
    /// Returns the message reported when this constraint is violated.
    #[must_use]
    pub const fn violation_message(&self) -> &'static str {
        match self {
            Self::Before(_) => LATE_SUBMISSION,
            Self::After(_) => EARLY_SUBMISSION,
            Self::MaxAttempts(_) => TOO_MANY_SUBMISSIONS,
        }
    }
}

/// Ordered sequence of constraints governing one exercise.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Policy {
    /// Constraints in declaration order.
    pub constraints: Vec<Constraint>,
}

impl Policy {
    /// Creates a policy from constraints in declaration order.
    #[must_use]
    pub const fn new(constraints: Vec<Constraint>) -> Self {
        Self {
            constraints,
        }
    }

    /// Policy with no constraints; every attempt is valid.
    #[must_use]
    pub const fn unrestricted() -> Self {
        Self {
            constraints: Vec::new(),
        }
    }
}
