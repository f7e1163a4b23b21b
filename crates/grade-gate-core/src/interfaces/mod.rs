// crates/grade-gate-core/src/interfaces/mod.rs
// ============================================================================
// Module: Grade Gate Interfaces
// Description: Collaborator contracts consumed by the evaluation runtime.
// Purpose: Define persistence, page, policy, tester, and ceiling surfaces.
// Dependencies: crate::core, serde, thiserror
// ============================================================================

//! ## Overview
//! Interfaces define how the evaluation core integrates with persistence,
//! page loading, policy resolution, and the tester without embedding any
//! backend detail. Every collaborator is shared across evaluation tasks, so
//! implementations must be `Send + Sync` and safe under concurrent reads.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::ExercisePage;
use crate::core::ExercisePath;
use crate::core::NewSubmission;
use crate::core::Policy;
use crate::core::StatusUpdate;
use crate::core::Submission;
use crate::core::SubmissionId;
use crate::core::TestResult;
use crate::core::TimeContext;
use crate::core::Timestamp;
use crate::core::UserLogin;

// ============================================================================
// SECTION: Submission Store
// ============================================================================

/// Submission store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Store I/O error.
    #[error("submission store io error: {0}")]
    Io(String),
    /// Stored data failed integrity checks.
    #[error("submission store corruption: {0}")]
    Corrupt(String),
    /// Store data version is incompatible.
    #[error("submission store version mismatch: {0}")]
    VersionMismatch(String),
    /// Input or stored data is invalid.
    #[error("submission store invalid data: {0}")]
    Invalid(String),
    /// Referenced submission does not exist.
    #[error("submission not found: {0}")]
    NotFound(SubmissionId),
    /// Store reported an error.
    #[error("submission store error: {0}")]
    Store(String),
}

/// Source of prior-attempt counts for quota constraints.
pub trait AttemptCounter {
    /// Counts submissions by `user` to `path` recorded strictly before `before`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the count cannot be read.
    fn count_earlier_submissions(
        &self,
        user: &UserLogin,
        path: &ExercisePath,
        before: Timestamp,
    ) -> Result<u64, StoreError>;
}

/// Durable record of submissions and their evaluation state.
pub trait SubmissionStore: AttemptCounter + Send + Sync {
    /// Records a new submission in [`crate::core::SubmissionStatus::PendingEvaluation`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the record cannot be written.
    fn create_submission(&self, submission: &NewSubmission) -> Result<Submission, StoreError>;

    /// Loads a submission by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn load_submission(&self, id: SubmissionId) -> Result<Option<Submission>, StoreError>;

    /// Lists submissions in identifier order, optionally restricted to one path.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when listing fails.
    fn list_submissions(&self, path: Option<&ExercisePath>)
    -> Result<Vec<Submission>, StoreError>;

    /// Replaces status, validity, and result of a submission in one write.
    ///
    /// Writing the same update twice leaves the record unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for unknown identifiers and other
    /// [`StoreError`] variants when the write fails.
    fn update_status(&self, id: SubmissionId, update: &StatusUpdate) -> Result<(), StoreError>;
}

// ============================================================================
// SECTION: Page Loader
// ============================================================================

/// Page loading errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PageError {
    /// No page exists for the path.
    #[error("exercise page not found: {0}")]
    NotFound(ExercisePath),
    /// The page exists but could not be parsed.
    #[error("exercise page parse error: {0}")]
    Parse(String),
}

/// Loads parsed exercise pages by path.
pub trait PageLoader: Send + Sync {
    /// Loads the page for an exercise path.
    ///
    /// # Errors
    ///
    /// Returns [`PageError`] when the page is missing or malformed.
    fn load_page(&self, path: &ExercisePath) -> Result<ExercisePage, PageError>;
}

// ============================================================================
// SECTION: Policy Resolver
// ============================================================================

/// Policy resolution errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyError {
    /// A declaration on the page is malformed.
    #[error("invalid policy: {0}")]
    Invalid(String),
}

/// Resolves the policy governing a page.
pub trait PolicyResolver: Send + Sync {
    /// Resolves the page policy under a time context.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError`] when the declared policy is malformed.
    fn resolve(&self, page: &ExercisePage, context: &TimeContext) -> Result<Policy, PolicyError>;
}

// ============================================================================
// SECTION: Tester
// ============================================================================

/// Opaque tester settings supplied by configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TesterSettings {
    /// Free-form tester options.
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

/// Tester errors. Any of them turns into a miscellaneous-error result.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TesterError {
    /// Tester I/O failure.
    #[error("tester io error: {0}")]
    Io(String),
    /// Tester internal failure.
    #[error("tester failure: {0}")]
    Failed(String),
}

/// Pluggable correctness checker for submitted code.
///
/// Implementations may block; the runtime calls them on the blocking pool.
pub trait Tester: Send + Sync {
    /// Runs the exercise checks for a submission.
    ///
    /// `Ok(None)` means the tester reached no decision.
    ///
    /// # Errors
    ///
    /// Returns [`TesterError`] when the tester itself fails.
    fn run(
        &self,
        settings: &TesterSettings,
        page: &ExercisePage,
        submission: &Submission,
    ) -> Result<Option<TestResult>, TesterError>;
}

// ============================================================================
// SECTION: Concurrency Ceiling
// ============================================================================

/// Source of the configured concurrency ceiling, read once per batch.
pub trait ConcurrencyCeiling: Send + Sync {
    /// Returns the maximum number of concurrent tester invocations.
    fn max_concurrent(&self) -> usize;
}
