// crates/grade-gate-store-sqlite/src/lib.rs
// ============================================================================
// Module: SQLite Submission Store
// Description: Durable SubmissionStore backend using SQLite WAL.
// Purpose: Provide production-grade persistence for Grade Gate submissions.
// Dependencies: grade-gate-core, rusqlite
// ============================================================================

//! ## Overview
//! This crate provides a SQLite-backed [`grade_gate_core::SubmissionStore`]
//! that records submissions, serves attempt counts for quota policies, and
//! persists evaluation verdicts with single-statement status writes.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::MAX_CONTENT_BYTES;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSubmissionStore;
pub use store::SqliteSyncMode;
