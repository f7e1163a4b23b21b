// crates/grade-gate-core/tests/scheduler.rs
// ============================================================================
// Module: Evaluation Scheduler Tests
// Description: Concurrency, cancellation, and fault isolation of evaluations.
// Purpose: Validate the gate ceiling, race-free cancellation, and batch swaps.
// Dependencies: grade-gate-core, tokio
// ============================================================================
//! ## Overview
//! Runs real evaluation tasks on a multi-threaded runtime with instrumented
//! testers. Cancellation checks use a latch so every task is provably inside
//! the tester when the batch is cancelled.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

mod common;

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

use grade_gate_core::AttemptCounter;
use grade_gate_core::ConstraintSpec;
use grade_gate_core::EvaluationContext;
use grade_gate_core::EvaluationOutcome;
use grade_gate_core::EvaluationScheduler;
use grade_gate_core::ExercisePath;
use grade_gate_core::FixedCeiling;
use grade_gate_core::InMemorySubmissionStore;
use grade_gate_core::NewSubmission;
use grade_gate_core::PageError;
use grade_gate_core::PagePolicyResolver;
use grade_gate_core::PolicySpec;
use grade_gate_core::SharedCeiling;
use grade_gate_core::StaticPageLoader;
use grade_gate_core::StatusUpdate;
use grade_gate_core::StoreError;
use grade_gate_core::Submission;
use grade_gate_core::SubmissionId;
use grade_gate_core::SubmissionStatus;
use grade_gate_core::SubmissionStore;
use grade_gate_core::TaskError;
use grade_gate_core::TestOutcome;
use grade_gate_core::TesterSettings;
use grade_gate_core::TimeContext;
use grade_gate_core::Timestamp;
use grade_gate_core::UserLogin;
use grade_gate_core::Validity;
use grade_gate_core::runtime::EvaluationError;
use grade_gate_core::runtime::EvaluationEventKind;
use grade_gate_core::runtime::GateError;
use grade_gate_core::runtime::SchedulerError;

use crate::common::BlockingTester;
use crate::common::EXERCISE;
use crate::common::FaultMode;
use crate::common::FaultyTester;
use crate::common::InstrumentedTester;
use crate::common::RecordingAudit;
use crate::common::default_pages;
use crate::common::fixture;
use crate::common::page;
use crate::common::request;
use crate::common::seed;
use crate::common::wait_for;

const SETTLE: Duration = Duration::from_secs(5);

// ============================================================================
// SECTION: Gate Ceiling
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn batch_never_exceeds_ceiling() {
    let tester = Arc::new(InstrumentedTester::with_delay(Duration::from_millis(20)));
    let fx = fixture(tester.clone(), default_pages());
    let submissions = seed(&fx.store, EXERCISE, 12);
    let scheduler = EvaluationScheduler::new(fx.context.clone(), Arc::new(FixedCeiling(3))).unwrap();

    let summary = scheduler.schedule_batch(submissions.clone()).await.unwrap();
    assert_eq!(summary.scheduled, 12);
    assert_eq!(summary.ceiling, 3);
    assert_eq!(scheduler.pending_ceiling().await, Some(3));

    let outcomes = scheduler.wait_for_pending().await;
    assert_eq!(outcomes.len(), 12);
    assert!(outcomes.iter().all(|outcome| matches!(outcome, Ok(EvaluationOutcome::Committed { .. }))));
    let peak = tester.peak.load(Ordering::SeqCst);
    assert!(peak <= 3, "peak concurrency {peak} exceeded ceiling");
    assert!(peak >= 1);
    assert_eq!(tester.calls.load(Ordering::SeqCst), 12);
    assert_eq!(scheduler.pending_count().await, 0);

    for submission in submissions {
        let stored = fx.store.load_submission(submission.id).unwrap().unwrap();
        assert_eq!(stored.status, SubmissionStatus::Done);
        assert_eq!(stored.validity, Validity::Valid);
        assert_eq!(stored.result.unwrap().outcome, TestOutcome::Passed);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn invalid_ceiling_keeps_the_pending_batch() {
    let tester = Arc::new(BlockingTester::default());
    let fx = fixture(tester.clone(), default_pages());
    let submissions = seed(&fx.store, EXERCISE, 2);
    let ceiling = SharedCeiling::new(2);
    let scheduler = EvaluationScheduler::new(fx.context.clone(), Arc::new(ceiling.clone())).unwrap();

    scheduler.schedule_batch(submissions.clone()).await.unwrap();
    ceiling.set(0);
    let rejected = scheduler.schedule_batch(submissions).await;
    assert_eq!(rejected, Err(SchedulerError::Gate(GateError::InvalidCapacity(0))));
    assert_eq!(scheduler.pending_count().await, 2);

    tester.release();
    let outcomes = scheduler.wait_for_pending().await;
    assert!(outcomes.iter().all(Result::is_ok));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shared_ceiling_applies_to_the_next_batch() {
    let tester = Arc::new(InstrumentedTester::with_delay(Duration::from_millis(10)));
    let fx = fixture(tester.clone(), default_pages());
    let submissions = seed(&fx.store, EXERCISE, 6);
    let ceiling = SharedCeiling::new(4);
    let scheduler = EvaluationScheduler::new(fx.context.clone(), Arc::new(ceiling.clone())).unwrap();

    ceiling.set(1);
    let summary = scheduler.schedule_batch(submissions).await.unwrap();
    assert_eq!(summary.ceiling, 1);
    scheduler.wait_for_pending().await;
    assert_eq!(tester.peak.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn single_submissions_share_the_batch_gate() {
    let tester = Arc::new(InstrumentedTester::with_delay(Duration::from_millis(150)));
    let fx = fixture(tester.clone(), default_pages());
    let mut submissions = seed(&fx.store, EXERCISE, 3);
    let single = submissions.pop().unwrap();
    let ceiling = SharedCeiling::new(3);
    let scheduler = EvaluationScheduler::new(fx.context.clone(), Arc::new(ceiling.clone())).unwrap();

    ceiling.set(1);
    scheduler.schedule_batch(submissions).await.unwrap();
    let handle = scheduler.schedule_one(single).await;

    assert!(matches!(handle.wait().await, Ok(EvaluationOutcome::Committed { .. })));
    scheduler.wait_for_pending().await;
    assert_eq!(tester.calls.load(Ordering::SeqCst), 3);
    assert_eq!(tester.peak.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancelled_tester_holds_its_gate_unit_until_it_returns() {
    let tester = Arc::new(InstrumentedTester::with_delay(Duration::from_millis(300)));
    let fx = fixture(tester.clone(), default_pages());
    let submissions = seed(&fx.store, EXERCISE, 2);
    let scheduler = EvaluationScheduler::new(fx.context.clone(), Arc::new(FixedCeiling(1))).unwrap();

    let first = scheduler.schedule_one(submissions[0].clone()).await;
    let observed = tester.clone();
    assert!(wait_for(SETTLE, move || observed.active.load(Ordering::SeqCst) == 1).await);
    first.cancel().await;

    let second = scheduler.schedule_one(submissions[1].clone()).await;
    assert!(matches!(second.wait().await, Ok(EvaluationOutcome::Committed { .. })));
    assert_eq!(tester.calls.load(Ordering::SeqCst), 2);
    assert_eq!(tester.peak.load(Ordering::SeqCst), 1);
    let stored = fx.store.load_submission(submissions[0].id).unwrap().unwrap();
    assert_eq!(stored.status, SubmissionStatus::Evaluating);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn replaced_batch_testers_count_against_the_new_gate() {
    let tester = Arc::new(InstrumentedTester::with_delay(Duration::from_millis(200)));
    let fx = fixture(tester.clone(), default_pages());
    let submissions = seed(&fx.store, EXERCISE, 4);
    let scheduler = EvaluationScheduler::new(fx.context.clone(), Arc::new(FixedCeiling(2))).unwrap();

    scheduler.schedule_batch(submissions[.. 2].to_vec()).await.unwrap();
    let observed = tester.clone();
    assert!(wait_for(SETTLE, move || observed.active.load(Ordering::SeqCst) == 2).await);

    let summary = scheduler.schedule_batch(submissions[2 ..].to_vec()).await.unwrap();
    assert_eq!(summary.cancelled, 2);
    let outcomes = scheduler.wait_for_pending().await;
    assert!(outcomes.iter().all(|outcome| matches!(outcome, Ok(EvaluationOutcome::Committed { .. }))));

    let observed = tester.clone();
    assert!(wait_for(SETTLE, move || observed.active.load(Ordering::SeqCst) == 0).await);
    assert_eq!(tester.calls.load(Ordering::SeqCst), 4);
    assert_eq!(tester.peak.load(Ordering::SeqCst), 2);
}

// ============================================================================
// SECTION: Cancellation
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancel_pending_prevents_every_commit() {
    let tester = Arc::new(BlockingTester::default());
    let fx = fixture(tester.clone(), default_pages());
    let submissions = seed(&fx.store, EXERCISE, 4);
    let scheduler = EvaluationScheduler::new(fx.context.clone(), Arc::new(FixedCeiling(2))).unwrap();

    scheduler.schedule_batch(submissions.clone()).await.unwrap();
    let observed = tester.clone();
    assert!(wait_for(SETTLE, move || observed.entered() == 2).await);

    let cancelled = scheduler.cancel_pending().await;
    assert_eq!(cancelled, 4);
    assert_eq!(scheduler.pending_count().await, 0);

    tester.release();
    tokio::time::sleep(Duration::from_millis(100)).await;
    for submission in &submissions {
        let stored = fx.store.load_submission(submission.id).unwrap().unwrap();
        assert_ne!(stored.status, SubmissionStatus::Done);
        assert!(stored.result.is_none());
    }
    assert_eq!(fx.audit.count(EvaluationEventKind::Completed), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn new_batch_replaces_the_pending_batch() {
    let tester = Arc::new(BlockingTester::default());
    let fx = fixture(tester.clone(), default_pages());
    let submissions = seed(&fx.store, EXERCISE, 2);
    let scheduler = EvaluationScheduler::new(fx.context.clone(), Arc::new(FixedCeiling(4))).unwrap();

    scheduler.schedule_batch(submissions.clone()).await.unwrap();
    let observed = tester.clone();
    assert!(wait_for(SETTLE, move || observed.entered() == 2).await);

    let summary = scheduler.schedule_batch(submissions.clone()).await.unwrap();
    assert_eq!(summary.cancelled, 2);
    assert_eq!(summary.scheduled, 2);
    assert_eq!(scheduler.pending_count().await, 2);

    tester.release();
    let outcomes = scheduler.wait_for_pending().await;
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|outcome| matches!(outcome, Ok(EvaluationOutcome::Committed { .. }))));
    assert_eq!(fx.audit.count(EvaluationEventKind::Completed), 2);
    for submission in &submissions {
        let stored = fx.store.load_submission(submission.id).unwrap().unwrap();
        assert_eq!(stored.status, SubmissionStatus::Done);
    }
    let scheduled = fx.audit.scheduler.lock().unwrap().len();
    assert_eq!(scheduled, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancelled_single_task_does_not_commit() {
    let tester = Arc::new(BlockingTester::default());
    let fx = fixture(tester.clone(), default_pages());
    let submission = seed(&fx.store, EXERCISE, 1).remove(0);
    let scheduler = EvaluationScheduler::new(fx.context.clone(), Arc::new(FixedCeiling(1))).unwrap();

    let handle = scheduler.schedule_one(submission.clone()).await;
    let observed = tester.clone();
    assert!(wait_for(SETTLE, move || observed.entered() == 1).await);
    assert!(!handle.is_finished());
    handle.cancel().await;

    tester.release();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let stored = fx.store.load_submission(submission.id).unwrap().unwrap();
    assert_eq!(stored.status, SubmissionStatus::Evaluating);
    assert_eq!(stored.validity, Validity::Pending);
}

// ============================================================================
// SECTION: Fault Isolation
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn tester_faults_become_misc_errors() {
    for mode in [FaultMode::Error, FaultMode::NoDecision, FaultMode::Panic] {
        let fx = fixture(Arc::new(FaultyTester(mode)), default_pages());
        let submissions = seed(&fx.store, EXERCISE, 3);
        let scheduler =
            EvaluationScheduler::new(fx.context.clone(), Arc::new(FixedCeiling(2))).unwrap();

        scheduler.schedule_batch(submissions.clone()).await.unwrap();
        let outcomes = scheduler.wait_for_pending().await;
        assert!(outcomes.iter().all(Result::is_ok), "{mode:?}: {outcomes:?}");
        for submission in &submissions {
            let stored = fx.store.load_submission(submission.id).unwrap().unwrap();
            assert_eq!(stored.status, SubmissionStatus::Done, "{mode:?}");
            assert_eq!(stored.validity, Validity::Valid, "{mode:?}");
            assert_eq!(stored.result.unwrap().outcome, TestOutcome::MiscError, "{mode:?}");
        }
        assert_eq!(fx.audit.count(EvaluationEventKind::TesterFault), 3, "{mode:?}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unresolvable_policy_is_invalid_but_still_tested() {
    let tester = Arc::new(InstrumentedTester::default());
    let broken = PolicySpec(vec![ConstraintSpec::Before {
        deadline: "someday".to_string(),
    }]);
    let pages = StaticPageLoader::new().with_page(page(EXERCISE, Some(broken)));
    let fx = fixture(tester.clone(), pages);
    let submission = seed(&fx.store, EXERCISE, 1).remove(0);
    let scheduler = EvaluationScheduler::new(fx.context.clone(), Arc::new(FixedCeiling(1))).unwrap();

    let outcome = scheduler.schedule_one(submission.clone()).await.wait().await.unwrap();
    let EvaluationOutcome::Committed {
        validity,
        result,
    } = outcome
    else {
        panic!("expected a committed outcome");
    };
    assert!(matches!(&validity, Validity::Invalid { reason } if reason.starts_with("invalid policy")));
    assert_eq!(result.outcome, TestOutcome::Passed);
    assert_eq!(tester.calls.load(Ordering::SeqCst), 1);
    let stored = fx.store.load_submission(submission.id).unwrap().unwrap();
    assert_eq!(stored.validity, validity);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn missing_page_is_task_fatal_and_leaves_status_evaluating() {
    let tester = Arc::new(InstrumentedTester::default());
    let fx = fixture(tester.clone(), default_pages());
    let submission = seed(&fx.store, "week9/missing", 1).remove(0);
    let scheduler = EvaluationScheduler::new(fx.context.clone(), Arc::new(FixedCeiling(1))).unwrap();

    let outcome = scheduler.schedule_one(submission.clone()).await.wait().await;
    assert_eq!(
        outcome,
        Err(TaskError::Evaluation(EvaluationError::Page(PageError::NotFound(ExercisePath::new(
            "week9/missing"
        )))))
    );
    assert_eq!(tester.calls.load(Ordering::SeqCst), 0);
    let stored = fx.store.load_submission(submission.id).unwrap().unwrap();
    assert_eq!(stored.status, SubmissionStatus::Evaluating);
    assert_eq!(fx.audit.count(EvaluationEventKind::Failed), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancel_pending_reaches_a_draining_batch() {
    let tester = Arc::new(BlockingTester::default());
    let fx = fixture(tester.clone(), default_pages());
    let submissions = seed(&fx.store, EXERCISE, 2);
    let scheduler =
        Arc::new(EvaluationScheduler::new(fx.context.clone(), Arc::new(FixedCeiling(2))).unwrap());

    scheduler.schedule_batch(submissions.clone()).await.unwrap();
    let observed = tester.clone();
    assert!(wait_for(SETTLE, move || observed.entered() == 2).await);

    let draining = Arc::clone(&scheduler);
    let drain = tokio::spawn(async move { draining.wait_for_pending().await });
    tokio::time::timeout(SETTLE, async {
        while scheduler.pending_count().await > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(scheduler.cancel_pending().await, 2);
    tester.release();
    let outcomes = drain.await.unwrap();
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|outcome| {
        matches!(outcome, Err(TaskError::Cancelled) | Ok(EvaluationOutcome::Cancelled))
    }));
    tokio::time::sleep(Duration::from_millis(100)).await;
    for submission in &submissions {
        let stored = fx.store.load_submission(submission.id).unwrap().unwrap();
        assert_ne!(stored.status, SubmissionStatus::Done);
    }
    assert_eq!(fx.audit.count(EvaluationEventKind::Completed), 0);
}

// ============================================================================
// SECTION: Blocking Store Calls
// ============================================================================

/// Store whose status writes block their thread until another task signals.
#[derive(Default)]
struct SignalledStore {
    inner: InMemorySubmissionStore,
    writing: AtomicBool,
    released: AtomicBool,
    stalled: AtomicBool,
}

impl AttemptCounter for SignalledStore {
    fn count_earlier_submissions(
        &self,
        user: &UserLogin,
        path: &ExercisePath,
        before: Timestamp,
    ) -> Result<u64, StoreError> {
        self.inner.count_earlier_submissions(user, path, before)
    }
}

impl SubmissionStore for SignalledStore {
    fn create_submission(&self, submission: &NewSubmission) -> Result<Submission, StoreError> {
        self.inner.create_submission(submission)
    }

    fn load_submission(&self, id: SubmissionId) -> Result<Option<Submission>, StoreError> {
        self.inner.load_submission(id)
    }

    fn list_submissions(
        &self,
        path: Option<&ExercisePath>,
    ) -> Result<Vec<Submission>, StoreError> {
        self.inner.list_submissions(path)
    }

    fn update_status(&self, id: SubmissionId, update: &StatusUpdate) -> Result<(), StoreError> {
        self.writing.store(true, Ordering::SeqCst);
        let deadline = Instant::now() + Duration::from_secs(2);
        while !self.released.load(Ordering::SeqCst) {
            if Instant::now() >= deadline {
                self.stalled.store(true, Ordering::SeqCst);
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        self.inner.update_status(id, update)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn store_writes_leave_the_worker_to_other_tasks() {
    let store = Arc::new(SignalledStore::default());
    let submission = store.create_submission(&request("alice", EXERCISE, 1)).unwrap();
    let context = Arc::new(EvaluationContext {
        store: store.clone(),
        pages: Arc::new(default_pages()),
        resolver: Arc::new(PagePolicyResolver::new()),
        tester: Arc::new(InstrumentedTester::default()),
        tester_settings: Arc::new(TesterSettings::default()),
        time_context: TimeContext::utc(),
        audit: Arc::new(RecordingAudit::default()),
    });
    let scheduler = EvaluationScheduler::new(context, Arc::new(FixedCeiling(1))).unwrap();

    let signaller = Arc::clone(&store);
    let release = tokio::spawn(async move {
        while !signaller.writing.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
        signaller.released.store(true, Ordering::SeqCst);
    });
    let outcome = scheduler.schedule_one(submission.clone()).await.wait().await;
    release.await.unwrap();

    assert!(matches!(outcome, Ok(EvaluationOutcome::Committed { .. })));
    assert!(!store.stalled.load(Ordering::SeqCst), "store write stalled the only worker");
    let stored = store.load_submission(submission.id).unwrap().unwrap();
    assert_eq!(stored.status, SubmissionStatus::Done);
}
