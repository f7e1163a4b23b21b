// crates/grade-gate-core/src/runtime/pages.rs
// ============================================================================
// Module: Grade Gate Static Page Loader
// Description: Map-backed exercise page loader.
// Purpose: Serve pre-parsed pages to the evaluation runtime.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! [`StaticPageLoader`] serves pages that the host has already parsed. Page
//! formats are owned by the host; this loader only looks them up by path.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use crate::core::ExercisePage;
use crate::core::ExercisePath;
use crate::interfaces::PageError;
use crate::interfaces::PageLoader;

// ============================================================================
// SECTION: Loader
// ============================================================================

/// Page loader backed by an in-memory map.
#[derive(Debug, Clone, Default)]
pub struct StaticPageLoader {
    /// Pages keyed by exercise path.
    pages: BTreeMap<ExercisePath, ExercisePage>,
}

impl StaticPageLoader {
    /// Creates an empty loader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the loader with `page` registered under its own path.
    #[must_use]
    pub fn with_page(mut self, page: ExercisePage) -> Self {
        self.insert(page);
        self
    }

    /// Registers `page` under its own path, replacing any earlier page.
    pub fn insert(&mut self, page: ExercisePage) {
        self.pages.insert(page.path.clone(), page);
    }
}

impl PageLoader for StaticPageLoader {
    fn load_page(&self, path: &ExercisePath) -> Result<ExercisePage, PageError> {
        self.pages.get(path).cloned().ok_or_else(|| PageError::NotFound(path.clone()))
    }
}
