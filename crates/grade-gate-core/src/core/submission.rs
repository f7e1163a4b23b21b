// crates/grade-gate-core/src/core/submission.rs
// ============================================================================
// Module: Grade Gate Submission Model
// Description: Submission records, evaluation status, validity, and results.
// Purpose: Define the persisted shape of one user's attempt at an exercise.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A [`Submission`] is owned by the submission store. The evaluation runner
//! holds a read-only snapshot for the duration of one evaluation and is the
//! only writer of `status`, `validity`, and `result`, always through a
//! [`StatusUpdate`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::ExercisePath;
use crate::core::identifiers::SubmissionId;
use crate::core::identifiers::UserLogin;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Status
// ============================================================================

/// Evaluation status of a submission.
///
/// # Invariants
/// - Within one evaluation the status only moves forward:
///   `PendingEvaluation -> Evaluating -> Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    /// Recorded but not yet picked up by an evaluation.
    PendingEvaluation,
    /// An evaluation task has started working on it.
    Evaluating,
    /// The evaluation committed a result.
    Done,
}

impl SubmissionStatus {
    /// Returns a stable label for the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PendingEvaluation => "pending_evaluation",
            Self::Evaluating => "evaluating",
            Self::Done => "done",
        }
    }

    /// Parses a stable status label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "pending_evaluation" => Some(Self::PendingEvaluation),
            "evaluating" => Some(Self::Evaluating),
            "done" => Some(Self::Done),
            _ => None,
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Validity
// ============================================================================

/// Separator between violation messages in an [`Validity::Invalid`] reason.
pub const VIOLATION_SEPARATOR: &str = ";";

/// Admissibility verdict for a submission, independent of correctness.
///
/// # Invariants
/// - `Pending` marks an evaluation in flight; it is never produced by the policy engine.
/// - `Invalid.reason` lists every violation joined by [`VIOLATION_SEPARATOR`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Validity {
    /// No verdict has been computed yet.
    Unknown,
    /// An evaluation is running and will replace this placeholder.
    Pending,
    /// Every policy constraint is satisfied.
    Valid,
    /// At least one constraint was violated or the policy could not be resolved.
    Invalid {
        /// Human-readable violation messages.
        reason: String,
    },
}

impl Validity {
    /// Builds an invalid verdict from a reason.
    #[must_use]
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid {
            reason: reason.into(),
        }
    }

    /// Returns true when the verdict is [`Validity::Valid`].
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

// ============================================================================
// SECTION: Test Results
// ============================================================================

/// Correctness outcome reported for a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestOutcome {
    /// The code passed the exercise checks.
    Passed,
    /// The code ran but did not pass.
    Failed,
    /// The tester could not produce a decision.
    MiscError,
}

/// Tester-produced result for one submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    /// Correctness outcome.
    pub outcome: TestOutcome,
    /// Optional feedback shown to the submitter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TestResult {
    /// Builds a passing result.
    #[must_use]
    pub const fn passed() -> Self {
        Self {
            outcome: TestOutcome::Passed,
            message: None,
        }
    }

    /// Builds a failing result with feedback.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            outcome: TestOutcome::Failed,
            message: Some(message.into()),
        }
    }

    /// Builds the generic miscellaneous-error result.
    #[must_use]
    pub fn misc_error(message: impl Into<String>) -> Self {
        Self {
            outcome: TestOutcome::MiscError,
            message: Some(message.into()),
        }
    }
}

// ============================================================================
// SECTION: Submission Records
// ============================================================================

/// Persisted submission record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    /// Store-assigned identifier.
    pub id: SubmissionId,
    /// Login of the submitter.
    pub user: UserLogin,
    /// Exercise page targeted by the submission.
    pub path: ExercisePath,
    /// Instant the submission was recorded.
    pub submitted_at: Timestamp,
    /// Submitted code.
    pub content: String,
    /// Evaluation status.
    pub status: SubmissionStatus,
    /// Admissibility verdict.
    pub validity: Validity,
    /// Tester result, present once an evaluation completed.
    pub result: Option<TestResult>,
}

/// Request to record a new submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSubmission {
    /// Login of the submitter.
    pub user: UserLogin,
    /// Exercise page targeted by the submission.
    pub path: ExercisePath,
    /// Instant the submission was recorded.
    pub submitted_at: Timestamp,
    /// Submitted code.
    pub content: String,
}

/// One status write issued by the evaluation runner.
///
/// # Invariants
/// - Writes replace `status`, `validity`, and `result` together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    /// New status.
    pub status: SubmissionStatus,
    /// New validity verdict.
    pub validity: Validity,
    /// New tester result (cleared when `None`).
    pub result: Option<TestResult>,
}

impl StatusUpdate {
    /// Status write issued before any slow evaluation work begins.
    #[must_use]
    pub const fn evaluating() -> Self {
        Self {
            status: SubmissionStatus::Evaluating,
            validity: Validity::Pending,
            result: None,
        }
    }

    /// Terminal status write carrying the combined verdict.
    #[must_use]
    pub const fn done(validity: Validity, result: TestResult) -> Self {
        Self {
            status: SubmissionStatus::Done,
            validity,
            result: Some(result),
        }
    }
}
