// crates/grade-gate-core/tests/common/mod.rs
// ============================================================================
// Module: Common Test Utilities
// Description: Shared fixtures and instrumented testers for runtime tests.
// Purpose: Provide reusable builders for scheduler and grader integration tests.
// Dependencies: grade-gate-core, tokio
// ============================================================================

//! ## Overview
//! Provides an evaluation context over the in-memory store, a recording
//! audit sink, and testers that count concurrency, block on a latch, or
//! fail in each supported way.

#![allow(
    dead_code,
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only helpers are shared across test binaries and may panic."
)]

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Condvar;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

use grade_gate_core::EvaluationAuditSink;
use grade_gate_core::EvaluationContext;
use grade_gate_core::ExercisePage;
use grade_gate_core::ExercisePath;
use grade_gate_core::InMemorySubmissionStore;
use grade_gate_core::NewSubmission;
use grade_gate_core::PagePolicyResolver;
use grade_gate_core::PolicySpec;
use grade_gate_core::StaticPageLoader;
use grade_gate_core::Submission;
use grade_gate_core::SubmissionStore;
use grade_gate_core::TestResult;
use grade_gate_core::Tester;
use grade_gate_core::TesterError;
use grade_gate_core::TesterSettings;
use grade_gate_core::TimeContext;
use grade_gate_core::Timestamp;
use grade_gate_core::UserLogin;
use grade_gate_core::runtime::EvaluationAuditEvent;
use grade_gate_core::runtime::EvaluationEventKind;
use grade_gate_core::runtime::SchedulerAuditEvent;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Exercise path used by default fixtures.
pub const EXERCISE: &str = "week1/loops";

/// Store, audit sink, and context wired together.
pub struct Fixture {
    pub store: Arc<InMemorySubmissionStore>,
    pub audit: Arc<RecordingAudit>,
    pub context: Arc<EvaluationContext>,
}

/// Builds a context over a fresh in-memory store.
pub fn fixture(tester: Arc<dyn Tester>, pages: StaticPageLoader) -> Fixture {
    let store = Arc::new(InMemorySubmissionStore::new());
    let audit = Arc::new(RecordingAudit::default());
    let store_dyn: Arc<dyn SubmissionStore> = store.clone();
    let audit_dyn: Arc<dyn EvaluationAuditSink> = audit.clone();
    let context = Arc::new(EvaluationContext {
        store: store_dyn,
        pages: Arc::new(pages),
        resolver: Arc::new(PagePolicyResolver::new()),
        tester,
        tester_settings: Arc::new(TesterSettings::default()),
        time_context: TimeContext::utc(),
        audit: audit_dyn,
    });
    Fixture {
        store,
        audit,
        context,
    }
}

/// Builds a page for `path` with an optional policy declaration.
pub fn page(path: &str, policy: Option<PolicySpec>) -> ExercisePage {
    ExercisePage {
        path: ExercisePath::new(path),
        title: format!("Exercise {path}"),
        source_path: PathBuf::from(format!("pages/{path}.md")),
        policy,
    }
}

/// Loader serving one unrestricted page at [`EXERCISE`].
pub fn default_pages() -> StaticPageLoader {
    StaticPageLoader::new().with_page(page(EXERCISE, None))
}

/// Builds a submission request for `user` on `path`.
pub fn request(user: &str, path: &str, millis: i64) -> NewSubmission {
    NewSubmission {
        user: UserLogin::new(user),
        path: ExercisePath::new(path),
        submitted_at: Timestamp::from_unix_millis(millis),
        content: format!("# attempt by {user}"),
    }
}

/// Records `count` submissions on `path` from distinct users.
pub fn seed(store: &InMemorySubmissionStore, path: &str, count: usize) -> Vec<Submission> {
    (0 .. count)
        .map(|index| {
            let millis = i64::try_from(index).unwrap() + 1;
            store.create_submission(&request(&format!("user-{index}"), path, millis)).unwrap()
        })
        .collect()
}

/// Polls `condition` until it holds or `timeout` elapses.
pub async fn wait_for(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

// ============================================================================
// SECTION: Audit
// ============================================================================

/// Audit sink that keeps every event in memory.
#[derive(Default)]
pub struct RecordingAudit {
    pub evaluations: Mutex<Vec<EvaluationAuditEvent>>,
    pub scheduler: Mutex<Vec<SchedulerAuditEvent>>,
}

impl RecordingAudit {
    /// Counts evaluation events of one kind.
    pub fn count(&self, kind: EvaluationEventKind) -> usize {
        self.evaluations.lock().unwrap().iter().filter(|event| event.kind == kind).count()
    }
}

impl EvaluationAuditSink for RecordingAudit {
    fn record(&self, event: &EvaluationAuditEvent) {
        self.evaluations.lock().unwrap().push(event.clone());
    }

    fn record_scheduler(&self, event: &SchedulerAuditEvent) {
        self.scheduler.lock().unwrap().push(event.clone());
    }
}

// ============================================================================
// SECTION: Testers
// ============================================================================

/// Tester that passes after a delay and tracks peak concurrency.
#[derive(Default)]
pub struct InstrumentedTester {
    pub delay: Duration,
    pub active: AtomicUsize,
    pub peak: AtomicUsize,
    pub calls: AtomicUsize,
}

impl InstrumentedTester {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }
}

impl Tester for InstrumentedTester {
    fn run(
        &self,
        _settings: &TesterSettings,
        _page: &ExercisePage,
        _submission: &Submission,
    ) -> Result<Option<TestResult>, TesterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(Some(TestResult::passed()))
    }
}

/// Latch state for [`BlockingTester`].
#[derive(Default)]
struct Latch {
    entered: usize,
    open: bool,
}

/// Tester that blocks every call until released.
#[derive(Default)]
pub struct BlockingTester {
    latch: Mutex<Latch>,
    changed: Condvar,
}

impl BlockingTester {
    /// Number of calls that reached the tester.
    pub fn entered(&self) -> usize {
        self.latch.lock().unwrap().entered
    }

    /// Releases every blocked and future call.
    pub fn release(&self) {
        self.latch.lock().unwrap().open = true;
        self.changed.notify_all();
    }
}

impl Tester for BlockingTester {
    fn run(
        &self,
        _settings: &TesterSettings,
        _page: &ExercisePage,
        _submission: &Submission,
    ) -> Result<Option<TestResult>, TesterError> {
        let mut latch = self.latch.lock().unwrap();
        latch.entered += 1;
        while !latch.open {
            latch = self.changed.wait(latch).unwrap();
        }
        drop(latch);
        Ok(Some(TestResult::passed()))
    }
}

/// How a [`FaultyTester`] fails.
#[derive(Debug, Clone, Copy)]
pub enum FaultMode {
    Error,
    NoDecision,
    Panic,
}

/// Tester that fails on every call.
pub struct FaultyTester(pub FaultMode);

impl Tester for FaultyTester {
    fn run(
        &self,
        _settings: &TesterSettings,
        _page: &ExercisePage,
        _submission: &Submission,
    ) -> Result<Option<TestResult>, TesterError> {
        match self.0 {
            FaultMode::Error => Err(TesterError::Failed("sandbox crashed".to_string())),
            FaultMode::NoDecision => Ok(None),
            FaultMode::Panic => panic!("tester blew up"),
        }
    }
}
