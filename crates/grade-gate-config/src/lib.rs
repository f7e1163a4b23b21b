// crates/grade-gate-config/src/lib.rs
// ============================================================================
// Module: Grade Gate Config
// Description: Canonical configuration model for Grade Gate hosts.
// Purpose: Load, validate, and wire scheduler, store, and audit settings.
// Dependencies: grade-gate-core, grade-gate-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! `grade-gate-config` owns the `grade-gate.toml` model. Loading is
//! fail-closed: oversized, non-UTF-8, or inconsistent files are rejected
//! before any store or scheduler is built.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::AuditConfig;
pub use config::AuditSinkKind;
pub use config::CONFIG_ENV_VAR;
pub use config::ConfigError;
pub use config::GradeGateConfig;
pub use config::MAX_CONCURRENT_LIMIT;
pub use config::MAX_CONFIG_FILE_SIZE;
pub use config::PolicyConfig;
pub use config::StoreConfig;
pub use config::StoreType;
pub use config::SystemConfig;
