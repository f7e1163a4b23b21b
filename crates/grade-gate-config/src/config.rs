// crates/grade-gate-config/src/config.rs
// ============================================================================
// Module: Grade Gate Configuration
// Description: Configuration loading and validation for Grade Gate.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: grade-gate-core, grade-gate-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits
//! and validated before anything is built from it. A missing
//! `system.max_concurrent` is a startup error: the evaluation scheduler has no
//! safe default ceiling.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use grade_gate_core::EvaluationAuditSink;
use grade_gate_core::EvaluationContext;
use grade_gate_core::InMemorySubmissionStore;
use grade_gate_core::MAX_UTC_OFFSET_MINUTES;
use grade_gate_core::PageLoader;
use grade_gate_core::PagePolicyResolver;
use grade_gate_core::PolicySpec;
use grade_gate_core::SharedCeiling;
use grade_gate_core::SubmissionStore;
use grade_gate_core::Tester;
use grade_gate_core::TesterSettings;
use grade_gate_core::TimeContext;
use grade_gate_core::runtime::FileAuditSink;
use grade_gate_core::runtime::NoopAuditSink;
use grade_gate_core::runtime::StderrAuditSink;
use grade_gate_core::runtime::resolve_spec;
use grade_gate_store_sqlite::SqliteStoreConfig;
use grade_gate_store_sqlite::SqliteStoreMode;
use grade_gate_store_sqlite::SqliteSubmissionStore;
use grade_gate_store_sqlite::SqliteSyncMode;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "grade-gate.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "GRADE_GATE_CONFIG";
/// Maximum configuration file size in bytes.
pub const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Largest accepted concurrency ceiling.
pub const MAX_CONCURRENT_LIMIT: usize = 1024;
/// Maximum number of tester options.
const MAX_TESTER_OPTIONS: usize = 128;
/// Default busy timeout for the sqlite store (ms).
const DEFAULT_STORE_BUSY_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// SECTION: Root Config
// ============================================================================

/// Grade Gate configuration root.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GradeGateConfig {
    /// Scheduler and time settings.
    #[serde(default)]
    pub system: SystemConfig,
    /// Submission store configuration.
    #[serde(default)]
    pub store: StoreConfig,
    /// Settings handed to every tester call.
    #[serde(default)]
    pub tester: TesterSettings,
    /// Audit sink configuration.
    #[serde(default)]
    pub audit: AuditConfig,
    /// Policy defaults.
    #[serde(default)]
    pub policy: PolicyConfig,
}

impl GradeGateConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml_str(content)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.system.validate()?;
        self.store.validate()?;
        validate_tester(&self.tester)?;
        self.audit.validate()?;
        self.policy.validate(&self.time_context())
    }

    /// Returns the configured concurrency ceiling.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when `system.max_concurrent` is absent.
    pub fn max_concurrent(&self) -> Result<usize, ConfigError> {
        self.system.max_concurrent.ok_or_else(|| {
            ConfigError::Invalid("system.max_concurrent is required".to_string())
        })
    }

    /// Returns an adjustable ceiling seeded from `system.max_concurrent`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when `system.max_concurrent` is absent.
    pub fn ceiling(&self) -> Result<SharedCeiling, ConfigError> {
        Ok(SharedCeiling::new(self.max_concurrent()?))
    }

    /// Returns the time context used for policy resolution.
    #[must_use]
    pub const fn time_context(&self) -> TimeContext {
        TimeContext {
            utc_offset_minutes: self.system.utc_offset_minutes,
        }
    }

    /// Returns the page policy resolver with the configured fallback.
    #[must_use]
    pub fn policy_resolver(&self) -> PagePolicyResolver {
        match &self.policy.fallback {
            Some(fallback) => PagePolicyResolver::with_fallback(fallback.clone()),
            None => PagePolicyResolver::new(),
        }
    }

    /// Builds the evaluation context from configuration and host collaborators.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the store or audit sink cannot be opened.
    pub fn evaluation_context(
        &self,
        pages: Arc<dyn PageLoader>,
        tester: Arc<dyn Tester>,
    ) -> Result<EvaluationContext, ConfigError> {
        Ok(EvaluationContext {
            store: self.store.build()?,
            pages,
            resolver: Arc::new(self.policy_resolver()),
            tester,
            tester_settings: Arc::new(self.tester.clone()),
            time_context: self.time_context(),
            audit: self.audit.build()?,
        })
    }
}

// ============================================================================
// SECTION: System Config
// ============================================================================

/// Scheduler and time settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SystemConfig {
    /// Maximum concurrent tester invocations per gate; required.
    #[serde(default)]
    pub max_concurrent: Option<usize>,
    /// Offset applied to policy timestamps that carry none.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl SystemConfig {
    /// Validates scheduler and time settings.
    fn validate(&self) -> Result<(), ConfigError> {
        let Some(max_concurrent) = self.max_concurrent else {
            return Err(ConfigError::Invalid("system.max_concurrent is required".to_string()));
        };
        if max_concurrent == 0 || max_concurrent > MAX_CONCURRENT_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "system.max_concurrent must be between 1 and {MAX_CONCURRENT_LIMIT}"
            )));
        }
        if self.utc_offset_minutes.abs() > MAX_UTC_OFFSET_MINUTES {
            return Err(ConfigError::Invalid(format!(
                "system.utc_offset_minutes must be within {MAX_UTC_OFFSET_MINUTES} minutes of UTC"
            )));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Store Config
// ============================================================================

/// Submission store backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    /// In-memory store; contents are lost on restart.
    #[default]
    Memory,
    /// `SQLite`-backed store.
    Sqlite,
}

/// Submission store configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Store backend type.
    #[serde(rename = "type", default)]
    pub store_type: StoreType,
    /// `SQLite` database path when using the sqlite backend.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_store_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` synchronous mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_type: StoreType::default(),
            path: None,
            busy_timeout_ms: default_store_busy_timeout_ms(),
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

/// Returns the default busy timeout for the sqlite store.
const fn default_store_busy_timeout_ms() -> u64 {
    DEFAULT_STORE_BUSY_TIMEOUT_MS
}

impl StoreConfig {
    /// Validates store configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        match self.store_type {
            StoreType::Memory => {
                if self.path.is_some() {
                    return Err(ConfigError::Invalid("memory store must not set path".to_string()));
                }
                Ok(())
            }
            StoreType::Sqlite => {
                let path = self.path.as_ref().ok_or_else(|| {
                    ConfigError::Invalid("sqlite store requires path".to_string())
                })?;
                validate_path_string("store.path", &path.to_string_lossy())
            }
        }
    }

    /// Returns the sqlite store config when the sqlite backend is selected.
    #[must_use]
    pub fn sqlite_config(&self) -> Option<SqliteStoreConfig> {
        match (self.store_type, &self.path) {
            (StoreType::Sqlite, Some(path)) => Some(SqliteStoreConfig {
                path: path.clone(),
                busy_timeout_ms: self.busy_timeout_ms,
                journal_mode: self.journal_mode,
                sync_mode: self.sync_mode,
            }),
            _ => None,
        }
    }

    /// Opens the configured submission store.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the sqlite store cannot be opened.
    pub fn build(&self) -> Result<Arc<dyn SubmissionStore>, ConfigError> {
        match self.sqlite_config() {
            Some(config) => {
                let store = SqliteSubmissionStore::new(config)
                    .map_err(|err| ConfigError::Invalid(err.to_string()))?;
                Ok(Arc::new(store))
            }
            None => Ok(Arc::new(InMemorySubmissionStore::new())),
        }
    }
}

// ============================================================================
// SECTION: Audit Config
// ============================================================================

/// Audit sink selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSinkKind {
    /// JSON lines on stderr.
    #[default]
    Stderr,
    /// JSON lines appended to a file.
    File,
    /// Discard audit events.
    None,
}

/// Audit sink configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    /// Selected sink.
    #[serde(default)]
    pub sink: AuditSinkKind,
    /// Log file path for the file sink.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl AuditConfig {
    /// Validates audit configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        match (self.sink, &self.path) {
            (AuditSinkKind::File, Some(path)) => {
                validate_path_string("audit.path", &path.to_string_lossy())
            }
            (AuditSinkKind::File, None) => {
                Err(ConfigError::Invalid("file audit sink requires path".to_string()))
            }
            (_, Some(_)) => {
                Err(ConfigError::Invalid("audit.path is only valid for the file sink".to_string()))
            }
            (_, None) => Ok(()),
        }
    }

    /// Builds the configured audit sink.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the audit log cannot be opened.
    pub fn build(&self) -> Result<Arc<dyn EvaluationAuditSink>, ConfigError> {
        match (self.sink, &self.path) {
            (AuditSinkKind::File, Some(path)) => {
                let sink =
                    FileAuditSink::new(path).map_err(|err| ConfigError::Io(err.to_string()))?;
                Ok(Arc::new(sink))
            }
            (AuditSinkKind::File, None) => {
                Err(ConfigError::Invalid("file audit sink requires path".to_string()))
            }
            (AuditSinkKind::Stderr, _) => Ok(Arc::new(StderrAuditSink)),
            (AuditSinkKind::None, _) => Ok(Arc::new(NoopAuditSink)),
        }
    }
}

// ============================================================================
// SECTION: Policy Config
// ============================================================================

/// Policy defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyConfig {
    /// Policy applied to pages that declare none.
    #[serde(default)]
    pub fallback: Option<PolicySpec>,
}

impl PolicyConfig {
    /// Validates that the fallback policy resolves.
    fn validate(&self, context: &TimeContext) -> Result<(), ConfigError> {
        if let Some(fallback) = &self.fallback {
            resolve_spec(fallback, context)
                .map_err(|err| ConfigError::Invalid(format!("policy.fallback: {err}")))?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Validates tester options.
fn validate_tester(settings: &TesterSettings) -> Result<(), ConfigError> {
    if settings.options.len() > MAX_TESTER_OPTIONS {
        return Err(ConfigError::Invalid(format!(
            "tester.options exceeds {MAX_TESTER_OPTIONS} entries"
        )));
    }
    if settings.options.keys().any(|key| key.trim().is_empty()) {
        return Err(ConfigError::Invalid("tester.options keys must be non-empty".to_string()));
    }
    Ok(())
}

/// Resolves the config path from the caller or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    if path.to_string_lossy().len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        if component.as_os_str().to_string_lossy().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        if component.as_os_str().to_string_lossy().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}
