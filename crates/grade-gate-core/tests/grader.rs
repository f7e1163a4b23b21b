// crates/grade-gate-core/tests/grader.rs
// ============================================================================
// Module: Grader Tests
// Description: End-to-end submission, preview, and re-evaluation flows.
// Purpose: Validate the host-facing grading service over the in-memory store.
// Dependencies: grade-gate-core, tokio
// ============================================================================
//! ## Overview
//! Drives the [`grade_gate_core::Grader`] the way a host would: submitting
//! attempts, previewing eligibility at an explicit "now", and re-evaluating
//! stored submissions after a policy change.

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

use grade_gate_core::ConstraintSpec;
use grade_gate_core::EvaluationOutcome;
use grade_gate_core::ExercisePath;
use grade_gate_core::FixedCeiling;
use grade_gate_core::Grader;
use grade_gate_core::GraderError;
use grade_gate_core::PageError;
use grade_gate_core::PolicySpec;
use grade_gate_core::StaticPageLoader;
use grade_gate_core::SubmissionStatus;
use grade_gate_core::SubmissionStore;
use grade_gate_core::TOO_MANY_SUBMISSIONS;
use grade_gate_core::TestOutcome;
use grade_gate_core::TestResult;
use grade_gate_core::Timestamp;
use grade_gate_core::UserLogin;
use grade_gate_core::Validity;

use crate::common::EXERCISE;
use crate::common::InstrumentedTester;
use crate::common::default_pages;
use crate::common::fixture;
use crate::common::page;
use crate::common::request;

fn quota_pages(limit: i64) -> StaticPageLoader {
    let policy = PolicySpec(vec![ConstraintSpec::MaxAttempts {
        limit,
    }]);
    StaticPageLoader::new()
        .with_page(page(EXERCISE, Some(policy)))
        .with_page(page("week2/recursion", None))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn submit_records_and_commits_a_verdict() {
    let fx = fixture(Arc::new(InstrumentedTester::default()), default_pages());
    let grader = Grader::new(fx.context.clone(), Arc::new(FixedCeiling(2))).unwrap();

    let submitted = grader.submit(request("alice", EXERCISE, 10)).await.unwrap();
    assert_eq!(submitted.submission.status, SubmissionStatus::PendingEvaluation);
    assert_eq!(submitted.submission.validity, Validity::Unknown);

    let outcome = submitted.handle.wait().await.unwrap();
    assert_eq!(
        outcome,
        EvaluationOutcome::Committed {
            validity: Validity::Valid,
            result: TestResult::passed(),
        }
    );
    let stored = fx.store.load_submission(submitted.submission.id).unwrap().unwrap();
    assert_eq!(stored.status, SubmissionStatus::Done);
    assert_eq!(stored.result, Some(TestResult::passed()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn third_attempt_over_quota_is_invalid_but_graded() {
    let fx = fixture(Arc::new(InstrumentedTester::default()), quota_pages(2));
    let grader = Grader::new(fx.context.clone(), Arc::new(FixedCeiling(2))).unwrap();

    for millis in [10, 20] {
        grader.submit(request("alice", EXERCISE, millis)).await.unwrap().handle.wait().await.unwrap();
    }
    let third = grader.submit(request("alice", EXERCISE, 30)).await.unwrap();
    let outcome = third.handle.wait().await.unwrap();
    assert_eq!(
        outcome,
        EvaluationOutcome::Committed {
            validity: Validity::invalid(TOO_MANY_SUBMISSIONS),
            result: TestResult::passed(),
        }
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn preview_uses_the_supplied_time() {
    let fx = fixture(Arc::new(InstrumentedTester::default()), quota_pages(1));
    let grader = Grader::new(fx.context.clone(), Arc::new(FixedCeiling(1))).unwrap();
    let user = UserLogin::new("bob");
    let path = ExercisePath::new(EXERCISE);

    assert_eq!(
        grader.preview_eligibility(&user, &path, Timestamp::from_unix_millis(5)),
        Ok(Validity::Valid)
    );
    grader.submit(request("bob", EXERCISE, 10)).await.unwrap().handle.wait().await.unwrap();
    assert_eq!(
        grader.preview_eligibility(&user, &path, Timestamp::from_unix_millis(5)),
        Ok(Validity::Valid)
    );
    assert_eq!(
        grader.preview_eligibility(&user, &path, Timestamp::from_unix_millis(11)),
        Ok(Validity::invalid(TOO_MANY_SUBMISSIONS))
    );
    assert_eq!(fx.store.list_submissions(None).unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn preview_of_unknown_page_fails() {
    let fx = fixture(Arc::new(InstrumentedTester::default()), default_pages());
    let grader = Grader::new(fx.context.clone(), Arc::new(FixedCeiling(1))).unwrap();
    let path = ExercisePath::new("nowhere");
    assert_eq!(
        grader.preview_eligibility(&UserLogin::new("bob"), &path, Timestamp::from_unix_millis(1)),
        Err(GraderError::Page(PageError::NotFound(path.clone())))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reevaluate_filters_by_path() {
    let tester = Arc::new(InstrumentedTester::default());
    let fx = fixture(tester.clone(), quota_pages(5));
    for (user, path) in [("a", EXERCISE), ("b", EXERCISE), ("c", "week2/recursion")] {
        fx.store.create_submission(&request(user, path, 1)).unwrap();
    }
    let grader = Grader::new(fx.context.clone(), Arc::new(FixedCeiling(2))).unwrap();

    let summary = grader.reevaluate(Some(&ExercisePath::new(EXERCISE))).await.unwrap();
    assert_eq!(summary.scheduled, 2);
    let outcomes = grader.scheduler().wait_for_pending().await;
    assert_eq!(outcomes.len(), 2);

    let stored = fx.store.list_submissions(None).unwrap();
    let done: Vec<_> = stored.iter().map(|submission| submission.status).collect();
    assert_eq!(
        done,
        vec![SubmissionStatus::Done, SubmissionStatus::Done, SubmissionStatus::PendingEvaluation]
    );

    let summary = grader.reevaluate(None).await.unwrap();
    assert_eq!(summary.scheduled, 3);
    grader.scheduler().wait_for_pending().await;
    assert!(fx.store.list_submissions(None).unwrap().iter().all(|submission| {
        submission.result.as_ref().map(|result| result.outcome) == Some(TestOutcome::Passed)
    }));
    assert_eq!(grader.cancel_pending().await, 0);
}
