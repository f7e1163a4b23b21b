// crates/grade-gate-core/src/runtime/grader.rs
// ============================================================================
// Module: Grade Gate Grader
// Description: Host-facing entry points for submission and re-evaluation.
// Purpose: Tie persistence, eligibility previews, and scheduling together.
// Dependencies: crate::{core, interfaces, runtime}, thiserror
// ============================================================================

//! ## Overview
//! [`Grader`] is what a host calls: it records new submissions and schedules
//! their evaluation, previews whether an attempt made "now" would be
//! admissible, and re-evaluates every stored submission (optionally for one
//! exercise) as a single replaceable batch.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use thiserror::Error;

use crate::core::Access;
use crate::core::ExercisePath;
use crate::core::NewSubmission;
use crate::core::Submission;
use crate::core::Timestamp;
use crate::core::UserLogin;
use crate::core::Validity;
use crate::interfaces::ConcurrencyCeiling;
use crate::interfaces::PageError;
use crate::interfaces::StoreError;
use crate::runtime::policy::check_policy;
use crate::runtime::runner::EvaluationContext;
use crate::runtime::runner::TaskHandle;
use crate::runtime::runner::blocking_io;
use crate::runtime::scheduler::BatchSummary;
use crate::runtime::scheduler::EvaluationScheduler;
use crate::runtime::scheduler::SchedulerError;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Grader errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraderError {
    /// Persistence failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The exercise page could not be loaded.
    #[error(transparent)]
    Page(#[from] PageError),
    /// The scheduler rejected the request.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

// ============================================================================
// SECTION: Types
// ============================================================================

/// A recorded submission and the task evaluating it.
#[derive(Debug)]
pub struct SubmittedEvaluation {
    /// Submission as recorded, before evaluation started.
    pub submission: Submission,
    /// Handle to the evaluation task.
    pub handle: TaskHandle,
}

// ============================================================================
// SECTION: Grader
// ============================================================================

/// Submission grading service.
pub struct Grader {
    /// Scheduler owning the pending batch.
    scheduler: EvaluationScheduler,
}

impl Grader {
    /// Creates a grader over the given collaborators.
    ///
    /// # Errors
    ///
    /// Returns [`GraderError::Scheduler`] when the ceiling is invalid.
    pub fn new(
        context: Arc<EvaluationContext>,
        ceiling: Arc<dyn ConcurrencyCeiling>,
    ) -> Result<Self, GraderError> {
        Ok(Self {
            scheduler: EvaluationScheduler::new(context, ceiling)?,
        })
    }

    /// Returns the underlying scheduler.
    #[must_use]
    pub const fn scheduler(&self) -> &EvaluationScheduler {
        &self.scheduler
    }

    /// Records a new submission and schedules its evaluation.
    ///
    /// # Errors
    ///
    /// Returns [`GraderError::Store`] when the submission cannot be recorded.
    pub async fn submit(&self, request: NewSubmission) -> Result<SubmittedEvaluation, GraderError> {
        let store = &self.scheduler.context().store;
        let submission = blocking_io(|| store.create_submission(&request))?;
        let handle = self.scheduler.schedule_one(submission.clone()).await;
        Ok(SubmittedEvaluation {
            submission,
            handle,
        })
    }

    /// Checks whether an attempt by `user` on `path` at `now` would be admissible.
    ///
    /// Nothing is recorded. A policy that cannot be resolved yields an
    /// invalid verdict carrying the resolution error.
    ///
    /// # Errors
    ///
    /// Returns [`GraderError`] when the page cannot be loaded or attempts cannot be counted.
    pub fn preview_eligibility(
        &self,
        user: &UserLogin,
        path: &ExercisePath,
        now: Timestamp,
    ) -> Result<Validity, GraderError> {
        let context = self.scheduler.context();
        let page = context.pages.load_page(path)?;
        let access = Access::new(user.clone(), path.clone(), now);
        match context.resolver.resolve(&page, &context.time_context) {
            Ok(policy) => Ok(check_policy(&access, &policy, context.store.as_ref())?),
            Err(err) => Ok(Validity::invalid(err.to_string())),
        }
    }

    /// Re-evaluates stored submissions, replacing any pending batch.
    ///
    /// # Errors
    ///
    /// Returns [`GraderError`] when listing fails or the ceiling is invalid.
    pub async fn reevaluate(&self, path: Option<&ExercisePath>) -> Result<BatchSummary, GraderError> {
        let store = &self.scheduler.context().store;
        let submissions = blocking_io(|| store.list_submissions(path))?;
        Ok(self.scheduler.schedule_batch(submissions).await?)
    }

    /// Cancels the pending batch; returns how many tasks were still running.
    pub async fn cancel_pending(&self) -> usize {
        self.scheduler.cancel_pending().await
    }
}
