// crates/grade-gate-core/src/runtime/runner.rs
// ============================================================================
// Module: Grade Gate Evaluation Runner
// Description: Executes one submission evaluation as a spawned task.
// Purpose: Combine policy validity and tester verdict into one committed write.
// Dependencies: crate::{core, interfaces, runtime}, tokio
// ============================================================================

//! ## Overview
//! [`run_evaluation`] spawns one task per submission and returns a
//! [`TaskHandle`] immediately. The task:
//! 1. writes `evaluating` / `pending` so observers see the evaluation start,
//! 2. loads the page and builds an [`Access`] from the submission's recorded
//!    user, path, and time,
//! 3. resolves the page policy (a resolution failure becomes an invalid
//!    verdict and the tester still runs) and checks it,
//! 4. takes one [`ConcurrencyGate`] unit and hands it to the tester call on
//!    the blocking pool, where it stays until the tester returns,
//! 5. commits `done` with the validity and result in one write.
//!
//! Only the tester call is fault-isolated: errors, missing decisions, and
//! panics all become a [`TesterOutcome::Fault`] and then a miscellaneous-error
//! result. Store, page, and gate failures end the task with an
//! [`EvaluationError`] and are reported to the audit sink.
//!
//! Cancellation aborts the task outright. A [`CommitFence`] makes it
//! race-free for the terminal write: once [`CommitFence::cancel`] returns,
//! no task sharing the fence writes its result. A cancelled task may leave
//! its submission in `evaluating`. The blocking tester thread keeps running
//! until the tester returns and keeps its gate unit until then; its result
//! is discarded.
//!
//! Store and page calls are synchronous. On a multi-threaded runtime they
//! run through `block_in_place` so other tasks move off the worker.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::any::Any;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::runtime::RuntimeFlavor;
use tokio::sync::RwLock;
use tokio::task::AbortHandle;
use tokio::task::JoinError;
use tokio::task::JoinHandle;

use crate::core::Access;
use crate::core::ExercisePage;
use crate::core::StatusUpdate;
use crate::core::Submission;
use crate::core::TestResult;
use crate::core::TimeContext;
use crate::core::Validity;
use crate::interfaces::PageError;
use crate::interfaces::PageLoader;
use crate::interfaces::PolicyResolver;
use crate::interfaces::StoreError;
use crate::interfaces::SubmissionStore;
use crate::interfaces::Tester;
use crate::interfaces::TesterSettings;
use crate::runtime::audit::EvaluationAuditEvent;
use crate::runtime::audit::EvaluationAuditSink;
use crate::runtime::audit::EvaluationEventKind;
use crate::runtime::gate::ConcurrencyGate;
use crate::runtime::gate::GateError;
use crate::runtime::gate::GatePermit;
use crate::runtime::policy::check_policy;

// ============================================================================
// SECTION: Context
// ============================================================================

/// Collaborators shared by every evaluation task.
pub struct EvaluationContext {
    /// Submission persistence.
    pub store: Arc<dyn SubmissionStore>,
    /// Exercise page loader.
    pub pages: Arc<dyn PageLoader>,
    /// Page policy resolver.
    pub resolver: Arc<dyn PolicyResolver>,
    /// Correctness checker.
    pub tester: Arc<dyn Tester>,
    /// Settings handed to every tester call.
    pub tester_settings: Arc<TesterSettings>,
    /// Time context used for policy resolution.
    pub time_context: TimeContext,
    /// Audit sink for evaluation events.
    pub audit: Arc<dyn EvaluationAuditSink>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Task-fatal evaluation errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EvaluationError {
    /// Persistence failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The exercise page could not be loaded.
    #[error(transparent)]
    Page(#[from] PageError),
    /// The concurrency gate rejected the task.
    #[error(transparent)]
    Gate(#[from] GateError),
}

/// Errors observed when waiting on a task handle.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// The evaluation ended with a task-fatal error.
    #[error("evaluation failed: {0}")]
    Evaluation(#[from] EvaluationError),
    /// The task was cancelled before finishing.
    #[error("evaluation task cancelled")]
    Cancelled,
    /// The task panicked outside the tester boundary.
    #[error("evaluation task panicked: {0}")]
    Panicked(String),
}

// ============================================================================
// SECTION: Outcomes
// ============================================================================

/// Result of a tester invocation after fault isolation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TesterOutcome {
    /// The tester reached a decision.
    Completed(TestResult),
    /// The tester failed, panicked, or reached no decision.
    Fault(String),
}

impl TesterOutcome {
    /// Converts the outcome into the result to persist.
    #[must_use]
    pub fn into_result(self) -> TestResult {
        match self {
            Self::Completed(result) => result,
            Self::Fault(description) => TestResult::misc_error(description),
        }
    }
}

/// How an evaluation task ended without a task-fatal error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvaluationOutcome {
    /// The terminal write was committed.
    Committed {
        /// Committed validity verdict.
        validity: Validity,
        /// Committed tester result.
        result: TestResult,
    },
    /// The fence was cancelled before the terminal write.
    Cancelled,
}

// ============================================================================
// SECTION: Commit Fence
// ============================================================================

/// Fence ordering terminal writes against cancellation.
///
/// # Invariants
/// - Once [`CommitFence::cancel`] returns, no later commit through this fence runs.
/// - Commits in progress when `cancel` is called complete before it returns.
#[derive(Debug, Clone, Default)]
pub struct CommitFence {
    /// Cancellation flag; commits hold a read guard while writing.
    cancelled: Arc<RwLock<bool>>,
}

impl CommitFence {
    /// Creates an open fence.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Closes the fence, waiting for in-flight commits to finish.
    pub async fn cancel(&self) {
        *self.cancelled.write().await = true;
    }

    /// Returns true once the fence has been cancelled.
    pub async fn is_cancelled(&self) -> bool {
        *self.cancelled.read().await
    }

    /// Runs `write` unless the fence is cancelled; returns `None` when skipped.
    async fn commit<F>(&self, write: F) -> Option<Result<(), StoreError>>
    where
        F: FnOnce() -> Result<(), StoreError>,
    {
        let guard = self.cancelled.read().await;
        if *guard {
            return None;
        }
        let outcome = write();
        drop(guard);
        Some(outcome)
    }
}

// ============================================================================
// SECTION: Task Handles
// ============================================================================

/// Cancellable handle to one spawned evaluation task.
#[derive(Debug)]
pub struct TaskHandle {
    /// Spawned task.
    handle: JoinHandle<Result<EvaluationOutcome, EvaluationError>>,
    /// Fence guarding the task's terminal write.
    fence: CommitFence,
}

impl TaskHandle {
    /// Returns true once the task has finished or been aborted.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancels the task; its terminal write will not happen after this returns.
    pub async fn cancel(self) {
        self.fence.cancel().await;
        self.handle.abort();
    }

    /// Waits for the task to finish.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError`] when the evaluation failed, was cancelled, or panicked.
    pub async fn wait(self) -> Result<EvaluationOutcome, TaskError> {
        match self.handle.await {
            Ok(outcome) => outcome.map_err(TaskError::from),
            Err(err) => Err(join_error_to_task_error(err)),
        }
    }

    /// Returns a handle that aborts the task without touching its fence.
    pub(crate) fn abort_handle(&self) -> AbortHandle {
        self.handle.abort_handle()
    }
}

/// Maps a join failure into a task error.
fn join_error_to_task_error(err: JoinError) -> TaskError {
    if err.is_panic() {
        TaskError::Panicked(panic_message(err.into_panic()))
    } else {
        TaskError::Cancelled
    }
}

// ============================================================================
// SECTION: Runner
// ============================================================================

/// Spawns one evaluation task for `submission` and returns its handle.
///
/// The caller is never blocked; gate waits happen inside the task.
///
/// # Panics
///
/// Panics when called outside a tokio runtime.
#[must_use]
pub fn run_evaluation(
    context: Arc<EvaluationContext>,
    gate: Arc<ConcurrencyGate>,
    fence: CommitFence,
    submission: Submission,
) -> TaskHandle {
    let task_fence = fence.clone();
    let handle = tokio::spawn(async move {
        let outcome = evaluate(&context, &gate, &task_fence, &submission).await;
        if let Err(err) = &outcome {
            context.audit.record(
                &EvaluationAuditEvent::new(EvaluationEventKind::Failed, &submission)
                    .with_message(err.to_string()),
            );
        }
        outcome
    });
    TaskHandle {
        handle,
        fence,
    }
}

/// Runs every evaluation step for one submission.
///
/// # Errors
///
/// Returns [`EvaluationError`] when persistence, page loading, or the gate fails.
pub async fn evaluate(
    context: &EvaluationContext,
    gate: &ConcurrencyGate,
    fence: &CommitFence,
    submission: &Submission,
) -> Result<EvaluationOutcome, EvaluationError> {
    blocking_io(|| context.store.update_status(submission.id, &StatusUpdate::evaluating()))?;
    context.audit.record(&EvaluationAuditEvent::new(EvaluationEventKind::Started, submission));

    let page = blocking_io(|| context.pages.load_page(&submission.path))?;
    let access = Access::for_submission(submission);
    let validity = match context.resolver.resolve(&page, &context.time_context) {
        Ok(policy) => blocking_io(|| check_policy(&access, &policy, context.store.as_ref()))?,
        Err(err) => Validity::invalid(err.to_string()),
    };

    let permit = gate.acquire().await?;
    let outcome = invoke_tester(context, permit, page, submission.clone()).await;

    if let TesterOutcome::Fault(description) = &outcome {
        context.audit.record(
            &EvaluationAuditEvent::new(EvaluationEventKind::TesterFault, submission)
                .with_message(description.clone()),
        );
    }
    let result = outcome.into_result();
    let update = StatusUpdate::done(validity.clone(), result.clone());
    let write = || blocking_io(|| context.store.update_status(submission.id, &update));
    match fence.commit(write).await {
        None => {
            context
                .audit
                .record(&EvaluationAuditEvent::new(EvaluationEventKind::CommitSkipped, submission));
            Ok(EvaluationOutcome::Cancelled)
        }
        Some(write) => {
            write?;
            context.audit.record(
                &EvaluationAuditEvent::new(EvaluationEventKind::Completed, submission)
                    .with_verdict(validity.clone(), result.outcome),
            );
            Ok(EvaluationOutcome::Committed {
                validity,
                result,
            })
        }
    }
}

/// Runs the tester on the blocking pool and isolates every failure mode.
///
/// `permit` moves into the blocking call and is released when the tester
/// returns, even if the awaiting task has been aborted.
pub async fn invoke_tester(
    context: &EvaluationContext,
    permit: GatePermit,
    page: ExercisePage,
    submission: Submission,
) -> TesterOutcome {
    let tester = Arc::clone(&context.tester);
    let settings = Arc::clone(&context.tester_settings);
    let joined = tokio::task::spawn_blocking(move || {
        let verdict = tester.run(&settings, &page, &submission);
        drop(permit);
        verdict
    })
    .await;
    match joined {
        Ok(Ok(Some(result))) => TesterOutcome::Completed(result),
        Ok(Ok(None)) => TesterOutcome::Fault("tester reached no decision".to_string()),
        Ok(Err(err)) => TesterOutcome::Fault(err.to_string()),
        Err(err) if err.is_panic() => {
            TesterOutcome::Fault(format!("tester panicked: {}", panic_message(err.into_panic())))
        }
        Err(_) => TesterOutcome::Fault("tester task cancelled".to_string()),
    }
}

/// Runs a synchronous store or page call without stalling the worker's other tasks.
///
/// Falls back to a direct call outside a multi-threaded runtime.
pub(crate) fn blocking_io<T>(call: impl FnOnce() -> T) -> T {
    match Handle::try_current().map(|handle| handle.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(call),
        _ => call(),
    }
}

/// Extracts a printable message from a panic payload.
fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "unknown panic payload".to_string()
}
