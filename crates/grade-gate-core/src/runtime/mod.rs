// crates/grade-gate-core/src/runtime/mod.rs
// ============================================================================
// Module: Grade Gate Runtime
// Description: Policy engine, evaluation runner, gate, and scheduler.
// Purpose: Execute submission evaluations under a concurrency ceiling.
// Dependencies: crate::{core, interfaces}, tokio
// ============================================================================

//! ## Overview
//! The runtime is layered leaves first: the policy engine and resolver, the
//! concurrency gate, the evaluation runner, and the scheduler that owns the
//! pending batch. [`Grader`] is the host-facing entry point.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod gate;
pub mod grader;
pub mod pages;
pub mod policy;
pub mod resolver;
pub mod runner;
pub mod scheduler;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::EvaluationAuditEvent;
pub use audit::EvaluationAuditSink;
pub use audit::EvaluationEventKind;
pub use audit::FileAuditSink;
pub use audit::NoopAuditSink;
pub use audit::SchedulerAuditEvent;
pub use audit::SchedulerEventKind;
pub use audit::StderrAuditSink;
pub use gate::ConcurrencyGate;
pub use gate::FixedCeiling;
pub use gate::GateError;
pub use gate::GatePermit;
pub use gate::SharedCeiling;
pub use grader::Grader;
pub use grader::GraderError;
pub use grader::SubmittedEvaluation;
pub use pages::StaticPageLoader;
pub use policy::check_policy;
pub use resolver::PagePolicyResolver;
pub use resolver::resolve_spec;
pub use runner::CommitFence;
pub use runner::EvaluationContext;
pub use runner::EvaluationError;
pub use runner::EvaluationOutcome;
pub use runner::TaskError;
pub use runner::TaskHandle;
pub use runner::TesterOutcome;
pub use runner::evaluate;
pub use runner::invoke_tester;
pub use runner::run_evaluation;
pub use scheduler::BatchSummary;
pub use scheduler::EvaluationScheduler;
pub use scheduler::SchedulerError;
pub use store::InMemorySubmissionStore;
