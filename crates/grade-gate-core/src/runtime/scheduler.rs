// crates/grade-gate-core/src/runtime/scheduler.rs
// ============================================================================
// Module: Grade Gate Evaluation Scheduler
// Description: Pending registry for single and batch evaluations.
// Purpose: Bound tester concurrency and swap whole batches atomically.
// Dependencies: crate::{interfaces, runtime}, serde, thiserror, tokio
// ============================================================================

//! ## Overview
//! [`EvaluationScheduler`] owns the only mutable shared state of the
//! evaluation core: the current gate, the pending batch (its commit fence
//! and task handles), and any batches being drained. Every mutation of that
//! state happens under one `tokio` mutex, so a bulk re-evaluation installs a
//! new gate, cancels the old batch, and installs the new one in a single
//! critical section and no observer sees a partially replaced set.
//!
//! Single submissions run under whichever gate is current when they are
//! scheduled, so they share the ceiling with the pending batch. Each new
//! gate is a successor of the previous one; testers still running from a
//! replaced batch keep counting against the ceiling until they return.
//!
//! Batch entries are never removed one by one: the set is only ever
//! replaced, cancelled, or drained as a whole.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::AbortHandle;

use crate::core::Submission;
use crate::interfaces::ConcurrencyCeiling;
use crate::runtime::audit::SchedulerAuditEvent;
use crate::runtime::audit::SchedulerEventKind;
use crate::runtime::gate::ConcurrencyGate;
use crate::runtime::gate::GateError;
use crate::runtime::runner::CommitFence;
use crate::runtime::runner::EvaluationContext;
use crate::runtime::runner::EvaluationOutcome;
use crate::runtime::runner::TaskError;
use crate::runtime::runner::TaskHandle;
use crate::runtime::runner::run_evaluation;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Scheduler errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// The configured ceiling cannot back a gate.
    #[error("scheduler gate error: {0}")]
    Gate(#[from] GateError),
}

// ============================================================================
// SECTION: Types
// ============================================================================

/// Summary of one installed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    /// Number of evaluations spawned.
    pub scheduled: usize,
    /// Number of unfinished tasks cancelled from the previous batch.
    pub cancelled: usize,
    /// Gate capacity of the new batch.
    pub ceiling: usize,
}

/// Currently tracked batch of evaluation tasks.
#[derive(Default)]
struct PendingBatch {
    /// Gate capacity of the batch; `None` for the empty set.
    ceiling: Option<usize>,
    /// Fence shared by every task of the batch.
    fence: CommitFence,
    /// Spawned task handles.
    tasks: Vec<TaskHandle>,
}

impl PendingBatch {
    /// Cancels every tracked task and returns how many were still running.
    async fn cancel(self) -> usize {
        let aborts: Vec<AbortHandle> = self.tasks.iter().map(TaskHandle::abort_handle).collect();
        cancel_tasks(&self.fence, &aborts).await
    }
}

/// Batch detached by [`EvaluationScheduler::wait_for_pending`] and still being awaited.
struct DrainingBatch {
    /// Drain identifier used to unregister the batch.
    id: u64,
    /// Fence shared by every task of the batch.
    fence: CommitFence,
    /// Abort handles of the batch's tasks.
    aborts: Vec<AbortHandle>,
}

/// Closes `fence`, aborts every task, and returns how many were still running.
async fn cancel_tasks(fence: &CommitFence, aborts: &[AbortHandle]) -> usize {
    fence.cancel().await;
    let mut unfinished = 0;
    for abort in aborts {
        if !abort.is_finished() {
            unfinished += 1;
        }
        abort.abort();
    }
    unfinished
}

/// Mutable scheduler state guarded by one lock.
struct SchedulerState {
    /// Gate used by new single submissions and installed with each batch.
    gate: Arc<ConcurrencyGate>,
    /// Currently tracked batch.
    pending: PendingBatch,
    /// Batches detached for draining; still reachable by cancellation.
    draining: Vec<DrainingBatch>,
    /// Identifier for the next drained batch.
    next_drain: u64,
}

// ============================================================================
// SECTION: Scheduler
// ============================================================================

/// Spawns evaluation tasks and tracks the pending batch.
///
/// # Invariants
/// - Testers run under the current gate never exceed its capacity once
///   testers started under a larger predecessor have returned.
/// - The gate and the pending batch are replaced only inside the state lock.
pub struct EvaluationScheduler {
    /// Collaborators handed to every task.
    context: Arc<EvaluationContext>,
    /// Ceiling source read once per batch.
    ceiling: Arc<dyn ConcurrencyCeiling>,
    /// Gate, pending batch, and draining batches.
    state: Mutex<SchedulerState>,
}

impl EvaluationScheduler {
    /// Creates a scheduler whose initial gate uses the current ceiling.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Gate`] when the ceiling is zero or too large.
    pub fn new(
        context: Arc<EvaluationContext>,
        ceiling: Arc<dyn ConcurrencyCeiling>,
    ) -> Result<Self, SchedulerError> {
        let gate = Arc::new(ConcurrencyGate::new(ceiling.max_concurrent())?);
        Ok(Self {
            context,
            ceiling,
            state: Mutex::new(SchedulerState {
                gate,
                pending: PendingBatch::default(),
                draining: Vec::new(),
                next_drain: 0,
            }),
        })
    }

    /// Returns the collaborators shared by evaluation tasks.
    #[must_use]
    pub fn context(&self) -> &Arc<EvaluationContext> {
        &self.context
    }

    /// Spawns one evaluation under the currently installed gate.
    ///
    /// The task is not part of the pending batch; cancel it through its handle.
    pub async fn schedule_one(&self, submission: Submission) -> TaskHandle {
        let gate = Arc::clone(&self.state.lock().await.gate);
        run_evaluation(Arc::clone(&self.context), gate, CommitFence::new(), submission)
    }

    /// Replaces the pending batch with one evaluation per submission.
    ///
    /// Reads the ceiling, installs a successor gate, cancels every task of
    /// the old batch, and installs the new tasks, all inside the state lock.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Gate`] when the ceiling is invalid; the
    /// current gate and the old batch are left untouched in that case.
    pub async fn schedule_batch(
        &self,
        submissions: Vec<Submission>,
    ) -> Result<BatchSummary, SchedulerError> {
        let ceiling = self.ceiling.max_concurrent();
        let mut state = self.state.lock().await;
        let gate = Arc::new(state.gate.successor(ceiling)?);
        state.gate = Arc::clone(&gate);
        let cancelled = std::mem::take(&mut state.pending).cancel().await;
        let fence = CommitFence::new();
        let tasks: Vec<TaskHandle> = submissions
            .into_iter()
            .map(|submission| {
                run_evaluation(
                    Arc::clone(&self.context),
                    Arc::clone(&gate),
                    fence.clone(),
                    submission,
                )
            })
            .collect();
        let summary = BatchSummary {
            scheduled: tasks.len(),
            cancelled,
            ceiling,
        };
        state.pending = PendingBatch {
            ceiling: Some(ceiling),
            fence,
            tasks,
        };
        drop(state);
        self.context.audit.record_scheduler(&SchedulerAuditEvent::new(
            SchedulerEventKind::BatchScheduled,
            summary.scheduled,
            Some(ceiling),
            cancelled,
        ));
        Ok(summary)
    }

    /// Cancels every task of the pending batch and of any batch being
    /// drained, leaving the pending set empty.
    ///
    /// Once this returns, none of the cancelled tasks commits a result.
    /// Returns the number of tasks that were still running.
    pub async fn cancel_pending(&self) -> usize {
        let mut state = self.state.lock().await;
        let mut cancelled = std::mem::take(&mut state.pending).cancel().await;
        for batch in std::mem::take(&mut state.draining) {
            cancelled += cancel_tasks(&batch.fence, &batch.aborts).await;
        }
        drop(state);
        self.context.audit.record_scheduler(&SchedulerAuditEvent::new(
            SchedulerEventKind::BatchCancelled,
            0,
            None,
            cancelled,
        ));
        cancelled
    }

    /// Detaches the pending batch without cancelling it and waits for every task.
    ///
    /// A new batch may be scheduled while the drain runs. The drained tasks
    /// stay reachable by [`EvaluationScheduler::cancel_pending`] until they
    /// have all been awaited.
    pub async fn wait_for_pending(&self) -> Vec<Result<EvaluationOutcome, TaskError>> {
        let (id, tasks) = {
            let mut state = self.state.lock().await;
            let PendingBatch {
                fence,
                tasks,
                ..
            } = std::mem::take(&mut state.pending);
            let id = state.next_drain;
            state.next_drain = state.next_drain.wrapping_add(1);
            if !tasks.is_empty() {
                state.draining.push(DrainingBatch {
                    id,
                    fence,
                    aborts: tasks.iter().map(TaskHandle::abort_handle).collect(),
                });
            }
            (id, tasks)
        };
        let mut outcomes = Vec::with_capacity(tasks.len());
        for task in tasks {
            outcomes.push(task.wait().await);
        }
        self.state.lock().await.draining.retain(|batch| batch.id != id);
        outcomes
    }

    /// Returns the number of tasks tracked in the pending batch.
    pub async fn pending_count(&self) -> usize {
        self.state.lock().await.pending.tasks.len()
    }

    /// Returns the gate capacity of the pending batch, if one is installed.
    pub async fn pending_ceiling(&self) -> Option<usize> {
        self.state.lock().await.pending.ceiling
    }
}
