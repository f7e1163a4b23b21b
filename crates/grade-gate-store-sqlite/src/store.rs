// crates/grade-gate-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Submission Store
// Description: Durable SubmissionStore backed by SQLite WAL.
// Purpose: Persist submissions and their evaluation verdicts.
// Dependencies: grade-gate-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! This module implements a durable [`SubmissionStore`] using `SQLite`. Each
//! submission is one row; validity and tester results are stored as JSON
//! columns and replaced together by a single `UPDATE`, so a status write is
//! atomic and repeating it is a no-op overwrite. Attempt counts are served
//! from an index on `(user_login, exercise_path, submitted_at)`.
//! Database contents are untrusted: loads fail closed on unknown status
//! labels or malformed JSON.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::MutexGuard;

use grade_gate_core::AttemptCounter;
use grade_gate_core::ExercisePath;
use grade_gate_core::NewSubmission;
use grade_gate_core::StatusUpdate;
use grade_gate_core::StoreError;
use grade_gate_core::Submission;
use grade_gate_core::SubmissionId;
use grade_gate_core::SubmissionStatus;
use grade_gate_core::SubmissionStore;
use grade_gate_core::TestResult;
use grade_gate_core::Timestamp;
use grade_gate_core::UserLogin;
use grade_gate_core::Validity;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::params;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum submitted code size accepted by the store.
pub const MAX_CONTENT_BYTES: usize = 1024 * 1024;
/// Column list shared by every submission query.
const SUBMISSION_COLUMNS: &str =
    "id, user_login, exercise_path, submitted_at, content, status, validity_json, result_json";

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` submission store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreConfig {
    /// Creates a config for `path` with default pragmas.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
///
/// # Invariants
/// - Error messages avoid embedding submitted code.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Stored data failed integrity checks.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store input.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
    /// Submitted code exceeded [`MAX_CONTENT_BYTES`].
    #[error("sqlite store payload too large: {actual_bytes} bytes (max {max_bytes})")]
    TooLarge {
        /// Maximum allowed bytes.
        max_bytes: usize,
        /// Actual payload size in bytes.
        actual_bytes: usize,
    },
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Store(message),
            SqliteStoreError::Corrupt(message) => Self::Corrupt(message),
            SqliteStoreError::VersionMismatch(message) => Self::VersionMismatch(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
            SqliteStoreError::TooLarge {
                max_bytes,
                actual_bytes,
            } => Self::Invalid(format!(
                "content exceeds size limit: {actual_bytes} bytes (max {max_bytes})"
            )),
        }
    }
}

/// Maps a `rusqlite` error into a store error.
#[allow(clippy::needless_pass_by_value, reason = "Used directly as a map_err adapter.")]
fn db_error(err: rusqlite::Error) -> SqliteStoreError {
    SqliteStoreError::Db(err.to_string())
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed submission store with WAL support.
///
/// # Invariants
/// - `SQLite` connection access is serialized through a mutex.
/// - Status writes replace status, validity, and result in one statement.
#[derive(Debug)]
pub struct SqliteSubmissionStore {
    /// Store configuration.
    config: SqliteStoreConfig,
    /// Connection guarded by a mutex.
    connection: Mutex<Connection>,
}

impl SqliteSubmissionStore {
    /// Opens an `SQLite`-backed submission store.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn new(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(&config)?;
        initialize_schema(&mut connection)?;
        Ok(Self {
            config,
            connection: Mutex::new(connection),
        })
    }

    /// Returns the store configuration.
    #[must_use]
    pub const fn config(&self) -> &SqliteStoreConfig {
        &self.config
    }

    /// Verifies the store can execute a simple SQL statement.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] if the mutex is poisoned or the query fails.
    pub fn readiness(&self) -> Result<(), SqliteStoreError> {
        let guard = self.lock()?;
        guard.query_row("SELECT 1", [], |_| Ok(())).map_err(db_error)
    }

    /// Locks the connection.
    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection
            .lock()
            .map_err(|_| SqliteStoreError::Io("sqlite mutex poisoned".to_string()))
    }

    /// Inserts a submission row and returns the stored record.
    fn insert(&self, submission: &NewSubmission) -> Result<Submission, SqliteStoreError> {
        if submission.content.len() > MAX_CONTENT_BYTES {
            return Err(SqliteStoreError::TooLarge {
                max_bytes: MAX_CONTENT_BYTES,
                actual_bytes: submission.content.len(),
            });
        }
        let validity = Validity::Unknown;
        let validity_json = encode_json(&validity)?;
        let guard = self.lock()?;
        guard
            .execute(
                "INSERT INTO submissions (user_login, exercise_path, submitted_at, content, \
                 status, validity_json, result_json) VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL)",
                params![
                    submission.user.as_str(),
                    submission.path.as_str(),
                    submission.submitted_at.as_unix_millis(),
                    submission.content,
                    SubmissionStatus::PendingEvaluation.as_str(),
                    validity_json,
                ],
            )
            .map_err(db_error)?;
        let raw = guard.last_insert_rowid();
        drop(guard);
        Ok(Submission {
            id: decode_id(raw)?,
            user: submission.user.clone(),
            path: submission.path.clone(),
            submitted_at: submission.submitted_at,
            content: submission.content.clone(),
            status: SubmissionStatus::PendingEvaluation,
            validity,
            result: None,
        })
    }

    /// Loads one submission row.
    fn select_one(&self, id: SubmissionId) -> Result<Option<Submission>, SqliteStoreError> {
        let raw = encode_id(id)?;
        let guard = self.lock()?;
        let row = guard
            .query_row(
                &format!("SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE id = ?1"),
                params![raw],
                read_row,
            )
            .optional()
            .map_err(db_error)?;
        drop(guard);
        row.map(StoredRow::into_submission).transpose()
    }

    /// Loads submission rows in identifier order.
    fn select_many(&self, path: Option<&ExercisePath>) -> Result<Vec<Submission>, SqliteStoreError> {
        let guard = self.lock()?;
        let rows = match path {
            Some(path) => {
                let mut statement = guard
                    .prepare(&format!(
                        "SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE exercise_path = ?1 \
                         ORDER BY id"
                    ))
                    .map_err(db_error)?;
                statement
                    .query_map(params![path.as_str()], read_row)
                    .map_err(db_error)?
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(db_error)?
            }
            None => {
                let mut statement = guard
                    .prepare(&format!("SELECT {SUBMISSION_COLUMNS} FROM submissions ORDER BY id"))
                    .map_err(db_error)?;
                statement
                    .query_map([], read_row)
                    .map_err(db_error)?
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(db_error)?
            }
        };
        drop(guard);
        rows.into_iter().map(StoredRow::into_submission).collect()
    }

    /// Replaces status, validity, and result; returns the affected row count.
    fn write_status(&self, id: SubmissionId, update: &StatusUpdate) -> Result<usize, SqliteStoreError> {
        let raw = encode_id(id)?;
        let validity_json = encode_json(&update.validity)?;
        let result_json = update.result.as_ref().map(encode_json).transpose()?;
        let guard = self.lock()?;
        guard
            .execute(
                "UPDATE submissions SET status = ?1, validity_json = ?2, result_json = ?3 \
                 WHERE id = ?4",
                params![update.status.as_str(), validity_json, result_json, raw],
            )
            .map_err(db_error)
    }

    /// Counts earlier submissions for one user and path.
    fn count_before(
        &self,
        user: &UserLogin,
        path: &ExercisePath,
        before: Timestamp,
    ) -> Result<u64, SqliteStoreError> {
        let guard = self.lock()?;
        let count: i64 = guard
            .query_row(
                "SELECT COUNT(1) FROM submissions WHERE user_login = ?1 AND exercise_path = ?2 \
                 AND submitted_at < ?3",
                params![user.as_str(), path.as_str(), before.as_unix_millis()],
                |row| row.get(0),
            )
            .map_err(db_error)?;
        drop(guard);
        u64::try_from(count)
            .map_err(|_| SqliteStoreError::Corrupt(format!("negative attempt count: {count}")))
    }
}

impl AttemptCounter for SqliteSubmissionStore {
    fn count_earlier_submissions(
        &self,
        user: &UserLogin,
        path: &ExercisePath,
        before: Timestamp,
    ) -> Result<u64, StoreError> {
        Ok(self.count_before(user, path, before)?)
    }
}

impl SubmissionStore for SqliteSubmissionStore {
    fn create_submission(&self, submission: &NewSubmission) -> Result<Submission, StoreError> {
        Ok(self.insert(submission)?)
    }

    fn load_submission(&self, id: SubmissionId) -> Result<Option<Submission>, StoreError> {
        Ok(self.select_one(id)?)
    }

    fn list_submissions(
        &self,
        path: Option<&ExercisePath>,
    ) -> Result<Vec<Submission>, StoreError> {
        Ok(self.select_many(path)?)
    }

    fn update_status(&self, id: SubmissionId, update: &StatusUpdate) -> Result<(), StoreError> {
        match self.write_status(id, update)? {
            0 => Err(StoreError::NotFound(id)),
            _ => Ok(()),
        }
    }
}

// ============================================================================
// SECTION: Rows
// ============================================================================

/// Raw column values of one submission row.
struct StoredRow {
    /// Row identifier.
    id: i64,
    /// Submitter login.
    user_login: String,
    /// Exercise path.
    exercise_path: String,
    /// Submission time in unix millis.
    submitted_at: i64,
    /// Submitted code.
    content: String,
    /// Status label.
    status: String,
    /// JSON-encoded validity.
    validity_json: String,
    /// JSON-encoded tester result.
    result_json: Option<String>,
}

impl StoredRow {
    /// Decodes the row, failing closed on unknown labels or malformed JSON.
    fn into_submission(self) -> Result<Submission, SqliteStoreError> {
        let status = SubmissionStatus::parse(&self.status).ok_or_else(|| {
            SqliteStoreError::Corrupt(format!("unknown status label: {}", self.status))
        })?;
        let validity: Validity = decode_json("validity_json", &self.validity_json)?;
        let result: Option<TestResult> = self
            .result_json
            .as_deref()
            .map(|json| decode_json("result_json", json))
            .transpose()?;
        Ok(Submission {
            id: decode_id(self.id)?,
            user: UserLogin::new(self.user_login),
            path: ExercisePath::new(self.exercise_path),
            submitted_at: Timestamp::from_unix_millis(self.submitted_at),
            content: self.content,
            status,
            validity,
            result,
        })
    }
}

/// Reads the raw columns of one row.
fn read_row(row: &Row<'_>) -> rusqlite::Result<StoredRow> {
    Ok(StoredRow {
        id: row.get(0)?,
        user_login: row.get(1)?,
        exercise_path: row.get(2)?,
        submitted_at: row.get(3)?,
        content: row.get(4)?,
        status: row.get(5)?,
        validity_json: row.get(6)?,
        result_json: row.get(7)?,
    })
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Converts a row identifier into a submission identifier.
fn decode_id(raw: i64) -> Result<SubmissionId, SqliteStoreError> {
    u64::try_from(raw)
        .ok()
        .and_then(SubmissionId::from_raw)
        .ok_or_else(|| SqliteStoreError::Corrupt(format!("invalid submission id: {raw}")))
}

/// Converts a submission identifier into a row identifier.
fn encode_id(id: SubmissionId) -> Result<i64, SqliteStoreError> {
    i64::try_from(id.get())
        .map_err(|_| SqliteStoreError::Invalid(format!("submission id out of range: {id}")))
}

/// Serializes a column value as JSON.
fn encode_json<T: serde::Serialize>(value: &T) -> Result<String, SqliteStoreError> {
    serde_json::to_string(value).map_err(|err| SqliteStoreError::Invalid(err.to_string()))
}

/// Deserializes a JSON column value.
fn decode_json<T: serde::de::DeserializeOwned>(
    column: &str,
    json: &str,
) -> Result<T, SqliteStoreError> {
    serde_json::from_str(json)
        .map_err(|err| SqliteStoreError::Corrupt(format!("malformed {column}: {err}")))
}

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    if path.as_os_str().is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_string()));
    }
    if path.display().to_string().len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    if path
        .components()
        .any(|component| component.as_os_str().to_string_lossy().len() > MAX_PATH_COMPONENT_LENGTH)
    {
        return Err(SqliteStoreError::Invalid(
            "store path contains an overlong component".to_string(),
        ));
    }
    if path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with durable defaults.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags).map_err(db_error)?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(db_error)?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(db_error)?;
    connection
        .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
        .map_err(db_error)?;
    Ok(connection)
}

/// Initializes the `SQLite` schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(db_error)?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(db_error)?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(db_error)?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(db_error)?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS submissions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_login TEXT NOT NULL,
                    exercise_path TEXT NOT NULL,
                    submitted_at INTEGER NOT NULL,
                    content TEXT NOT NULL,
                    status TEXT NOT NULL,
                    validity_json TEXT NOT NULL,
                    result_json TEXT
                );
                CREATE INDEX IF NOT EXISTS idx_submissions_attempts
                    ON submissions (user_login, exercise_path, submitted_at);
                CREATE INDEX IF NOT EXISTS idx_submissions_path
                    ON submissions (exercise_path, id);",
            )
            .map_err(db_error)?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit().map_err(db_error)
}
