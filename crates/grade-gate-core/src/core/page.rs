// crates/grade-gate-core/src/core/page.rs
// ============================================================================
// Module: Grade Gate Exercise Pages
// Description: Loaded exercise page metadata and raw policy declarations.
// Purpose: Carry what the runner needs from a page without owning its format.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Page parsing is owned by the page loader. The core only sees the parsed
//! [`ExercisePage`]: where the exercise lives on disk and the policy it
//! declares. Declarations stay raw strings until a policy resolver turns
//! them into a [`crate::core::policy::Policy`], so a malformed declaration
//! surfaces as a resolution error rather than a load error.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::ExercisePath;

// ============================================================================
// SECTION: Policy Declarations
// ============================================================================

/// One raw constraint declaration as written on a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConstraintSpec {
    /// Submissions must arrive at or before `deadline`.
    Before {
        /// RFC3339 timestamp or `YYYY-MM-DD HH:MM[:SS]` in the context offset.
        deadline: String,
    },
    /// Submissions must arrive at or after `start`.
    After {
        /// RFC3339 timestamp or `YYYY-MM-DD HH:MM[:SS]` in the context offset.
        start: String,
    },
    /// At most `limit` submissions per user.
    MaxAttempts {
        /// Attempt quota; must be positive.
        limit: i64,
    },
}

/// Ordered list of raw constraint declarations.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicySpec(pub Vec<ConstraintSpec>);

// ============================================================================
// SECTION: Pages
// ============================================================================

/// Parsed exercise page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExercisePage {
    /// Exercise path the page was loaded for.
    pub path: ExercisePath,
    /// Page title.
    pub title: String,
    /// On-disk location of the page, handed to the tester.
    pub source_path: PathBuf,
    /// Policy declared by the page, if any.
    #[serde(default)]
    pub policy: Option<PolicySpec>,
}
