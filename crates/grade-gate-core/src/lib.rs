// crates/grade-gate-core/src/lib.rs
// ============================================================================
// Module: Grade Gate Core Library
// Description: Public API surface for the Grade Gate core.
// Purpose: Expose core types, interfaces, and runtime helpers.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Grade Gate core evaluates submitted code against exercises under a
//! bounded concurrency budget. It decides whether each attempt is admissible
//! (on time, within its attempt quota), runs a pluggable tester, and commits
//! the combined verdict through a persistence interface. Bulk re-evaluation
//! batches can be cancelled and replaced atomically.
//!
//! The crate is backend-agnostic: persistence, page loading, policy
//! resolution, and testing are supplied through the traits in
//! [`interfaces`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use interfaces::AttemptCounter;
pub use interfaces::ConcurrencyCeiling;
pub use interfaces::PageError;
pub use interfaces::PageLoader;
pub use interfaces::PolicyError;
pub use interfaces::PolicyResolver;
pub use interfaces::StoreError;
pub use interfaces::SubmissionStore;
pub use interfaces::Tester;
pub use interfaces::TesterError;
pub use interfaces::TesterSettings;
pub use runtime::BatchSummary;
pub use runtime::ConcurrencyGate;
pub use runtime::EvaluationAuditSink;
pub use runtime::EvaluationContext;
pub use runtime::EvaluationOutcome;
pub use runtime::EvaluationScheduler;
pub use runtime::FixedCeiling;
pub use runtime::Grader;
pub use runtime::GraderError;
pub use runtime::InMemorySubmissionStore;
pub use runtime::PagePolicyResolver;
pub use runtime::SharedCeiling;
pub use runtime::StaticPageLoader;
pub use runtime::TaskError;
pub use runtime::TaskHandle;
pub use runtime::check_policy;
