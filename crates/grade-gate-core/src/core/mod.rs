// crates/grade-gate-core/src/core/mod.rs
// ============================================================================
// Module: Grade Gate Core Types
// Description: Data model shared by the policy engine and evaluation runtime.
// Purpose: Group identifiers, time, submission, page, and policy types.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Core types are plain data with serde derives. They carry no I/O and no
//! shared mutable state.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod identifiers;
pub mod page;
pub mod policy;
pub mod submission;
pub mod time;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use identifiers::ExercisePath;
pub use identifiers::SubmissionId;
pub use identifiers::UserLogin;
pub use page::ConstraintSpec;
pub use page::ExercisePage;
pub use page::PolicySpec;
pub use policy::Access;
pub use policy::Constraint;
pub use policy::EARLY_SUBMISSION;
pub use policy::LATE_SUBMISSION;
pub use policy::Policy;
pub use policy::TOO_MANY_SUBMISSIONS;
pub use submission::NewSubmission;
pub use submission::StatusUpdate;
pub use submission::Submission;
pub use submission::SubmissionStatus;
pub use submission::TestOutcome;
pub use submission::TestResult;
pub use submission::VIOLATION_SEPARATOR;
pub use submission::Validity;
pub use time::MAX_UTC_OFFSET_MINUTES;
pub use time::MILLIS_PER_HOUR;
pub use time::MILLIS_PER_MINUTE;
pub use time::TimeContext;
pub use time::Timestamp;
