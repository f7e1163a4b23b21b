// crates/grade-gate-core/src/runtime/store.rs
// ============================================================================
// Module: Grade Gate In-Memory Store
// Description: Simple in-memory submission store for tests and demos.
// Purpose: Provide a deterministic store implementation without external deps.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! This module provides an in-memory implementation of [`SubmissionStore`]
//! for tests and local demos. Identifiers are assigned sequentially from 1.
//! It is not intended for production use.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use crate::core::ExercisePath;
use crate::core::NewSubmission;
use crate::core::StatusUpdate;
use crate::core::Submission;
use crate::core::SubmissionId;
use crate::core::SubmissionStatus;
use crate::core::Timestamp;
use crate::core::UserLogin;
use crate::core::Validity;
use crate::interfaces::AttemptCounter;
use crate::interfaces::StoreError;
use crate::interfaces::SubmissionStore;

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// Records held by the in-memory store.
#[derive(Debug, Default)]
struct StoreState {
    /// Submissions keyed by raw identifier.
    submissions: BTreeMap<u64, Submission>,
    /// Last identifier handed out.
    last_id: u64,
}

/// In-memory submission store for tests and examples.
#[derive(Debug, Default, Clone)]
pub struct InMemorySubmissionStore {
    /// Store state protected by a mutex.
    state: Arc<Mutex<StoreState>>,
}

impl InMemorySubmissionStore {
    /// Creates a new, empty in-memory submission store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the store state.
    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Store("submission store mutex poisoned".to_string()))
    }
}

impl AttemptCounter for InMemorySubmissionStore {
    fn count_earlier_submissions(
        &self,
        user: &UserLogin,
        path: &ExercisePath,
        before: Timestamp,
    ) -> Result<u64, StoreError> {
        let guard = self.lock()?;
        let count = guard
            .submissions
            .values()
            .filter(|record| {
                record.user == *user && record.path == *path && record.submitted_at < before
            })
            .count();
        drop(guard);
        u64::try_from(count).map_err(|_| StoreError::Invalid("attempt count overflow".to_string()))
    }
}

impl SubmissionStore for InMemorySubmissionStore {
    fn create_submission(&self, submission: &NewSubmission) -> Result<Submission, StoreError> {
        let mut guard = self.lock()?;
        let raw = guard.last_id.saturating_add(1);
        let id = SubmissionId::from_raw(raw)
            .ok_or_else(|| StoreError::Invalid("submission id overflow".to_string()))?;
        let record = Submission {
            id,
            user: submission.user.clone(),
            path: submission.path.clone(),
            submitted_at: submission.submitted_at,
            content: submission.content.clone(),
            status: SubmissionStatus::PendingEvaluation,
            validity: Validity::Unknown,
            result: None,
        };
        guard.last_id = raw;
        guard.submissions.insert(raw, record.clone());
        drop(guard);
        Ok(record)
    }

    fn load_submission(&self, id: SubmissionId) -> Result<Option<Submission>, StoreError> {
        Ok(self.lock()?.submissions.get(&id.get()).cloned())
    }

    fn list_submissions(
        &self,
        path: Option<&ExercisePath>,
    ) -> Result<Vec<Submission>, StoreError> {
        let guard = self.lock()?;
        Ok(guard
            .submissions
            .values()
            .filter(|record| path.is_none_or(|path| record.path == *path))
            .cloned()
            .collect())
    }

    fn update_status(&self, id: SubmissionId, update: &StatusUpdate) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let record = guard.submissions.get_mut(&id.get()).ok_or(StoreError::NotFound(id))?;
        record.status = update.status;
        record.validity = update.validity.clone();
        record.result = update.result.clone();
        drop(guard);
        Ok(())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
