// crates/grade-gate-core/src/runtime/audit.rs
// ============================================================================
// Module: Grade Gate Audit Logging
// Description: Structured audit events for evaluations and scheduling.
// Purpose: Emit JSON-line logs without binding to a logging backend.
// Dependencies: crate::core, serde, serde_json
// ============================================================================

//! ## Overview
//! Evaluation tasks and the scheduler report what they did through an
//! [`EvaluationAuditSink`]. Events are serde-serialized and written as JSON
//! lines by the provided sinks, so deployments can route them into any log
//! pipeline. Events never carry submitted code.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;

use crate::core::Submission;
use crate::core::TestOutcome;
use crate::core::Validity;

// ============================================================================
// SECTION: Types
// ============================================================================

/// What happened to one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationEventKind {
    /// The `evaluating` status write completed.
    Started,
    /// The terminal status write completed.
    Completed,
    /// The tester failed and a miscellaneous-error result was substituted.
    TesterFault,
    /// The evaluation was cancelled before its terminal write.
    CommitSkipped,
    /// A persistence, page, or gate failure ended the task.
    Failed,
}

/// What happened to the pending batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerEventKind {
    /// A new batch was installed.
    BatchScheduled,
    /// The pending batch was cancelled.
    BatchCancelled,
}

/// Evaluation audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Submission identifier.
    pub submission_id: u64,
    /// Submitter login.
    pub user: String,
    /// Exercise path.
    pub path: String,
    /// Event classification.
    pub kind: EvaluationEventKind,
    /// Validity verdict when known.
    pub validity: Option<Validity>,
    /// Tester outcome when known.
    pub outcome: Option<TestOutcome>,
    /// Error or fault description.
    pub message: Option<String>,
}

impl EvaluationAuditEvent {
    /// Creates an event for a submission with a consistent timestamp.
    #[must_use]
    pub fn new(kind: EvaluationEventKind, submission: &Submission) -> Self {
        Self {
            event: "evaluation_audit",
            timestamp_ms: now_millis(),
            submission_id: submission.id.get(),
            user: submission.user.to_string(),
            path: submission.path.to_string(),
            kind,
            validity: None,
            outcome: None,
            message: None,
        }
    }

    /// Attaches the committed verdict.
    #[must_use]
    pub fn with_verdict(mut self, validity: Validity, outcome: TestOutcome) -> Self {
        self.validity = Some(validity);
        self.outcome = Some(outcome);
        self
    }

    /// Attaches an error or fault description.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Scheduler audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Event classification.
    pub kind: SchedulerEventKind,
    /// Number of tasks in the newly installed batch.
    pub batch_size: usize,
    /// Gate capacity of the newly installed batch.
    pub ceiling: Option<usize>,
    /// Number of tasks cancelled from the previous batch.
    pub cancelled: usize,
}

impl SchedulerAuditEvent {
    /// Creates a scheduler event with a consistent timestamp.
    #[must_use]
    pub fn new(
        kind: SchedulerEventKind,
        batch_size: usize,
        ceiling: Option<usize>,
        cancelled: usize,
    ) -> Self {
        Self {
            event: "scheduler_audit",
            timestamp_ms: now_millis(),
            kind,
            batch_size,
            ceiling,
            cancelled,
        }
    }
}

/// Returns the current unix epoch in milliseconds.
fn now_millis() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis()
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Audit sink for evaluation and scheduler events.
pub trait EvaluationAuditSink: Send + Sync {
    /// Records an evaluation event.
    fn record(&self, event: &EvaluationAuditEvent);

    /// Records a scheduler event.
    fn record_scheduler(&self, _event: &SchedulerAuditEvent) {}
}

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl EvaluationAuditSink for StderrAuditSink {
    fn record(&self, event: &EvaluationAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }

    fn record_scheduler(&self, event: &SchedulerAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

/// Audit sink that logs JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Appends one serialized payload.
    fn append(&self, payload: &str) {
        if let Ok(mut file) = self.file.lock() {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

impl EvaluationAuditSink for FileAuditSink {
    fn record(&self, event: &EvaluationAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            self.append(&payload);
        }
    }

    fn record_scheduler(&self, event: &SchedulerAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            self.append(&payload);
        }
    }
}

/// No-op audit sink.
pub struct NoopAuditSink;

impl EvaluationAuditSink for NoopAuditSink {
    fn record(&self, _event: &EvaluationAuditEvent) {}
}
