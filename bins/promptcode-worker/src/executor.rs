/// Submission Executor - High-Level Orchestration
///
/// **Responsibility:**
/// Coordinate the generation service and the evaluator to produce a result.
///
/// **Architecture:**
/// 1. One generation call for the whole submission (generation.rs)
/// 2. Split the response into per-test-case outputs (evaluator.rs)
/// 3. Score test cases concurrently, one blocking task per case
/// 4. Aggregate once every slot is filled
/// 5. Publish each state change and the final result (store.rs)
///
/// This module is the glue layer - it knows nothing about:
/// - How the model is reached (generation's job)
/// - How scoring works (evaluator's job)

use crate::evaluator::{self, CaseEvaluation, ModelOutput, PreparedResponse};
use crate::generation::GenerationService;
use crate::store::SubmissionStore;
use promptcode_common::config::EvaluationConfig;
use promptcode_common::error::ValidationError;
use promptcode_common::types::{SubmissionJob, SubmissionResult, SubmissionState, TestCase};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Checks a dequeued job before any work is spent on it
pub fn validate_job(job: &SubmissionJob) -> Result<(), ValidationError> {
    if job.submission.prompt.trim().is_empty() {
        return Err(ValidationError::EmptyPrompt);
    }
    if job.submission.user_id.trim().is_empty() {
        return Err(ValidationError::MissingUser);
    }
    if job.submission.question_id != job.question.id {
        return Err(ValidationError::UnknownQuestion(job.submission.question_id.clone()));
    }
    if job.question.test_cases.is_empty() {
        return Err(ValidationError::NoTestCases(job.question.id.clone()));
    }
    Ok(())
}

/// Tracks the lifecycle of one submission and publishes every change
struct Lifecycle<'a> {
    submission_id: Uuid,
    store: &'a dyn SubmissionStore,
    state: SubmissionState,
}

impl<'a> Lifecycle<'a> {
    fn new(submission_id: Uuid, store: &'a dyn SubmissionStore) -> Self {
        Self {
            submission_id,
            store,
            state: SubmissionState::Received,
        }
    }

    async fn advance(&mut self, next: SubmissionState) {
        match self.state.transition(next) {
            Ok(state) => {
                info!(submission_id = %self.submission_id, state = %state, "Submission state changed");
                self.state = state;
                if let Err(e) = self.store.set_status(&self.submission_id, state).await {
                    warn!(submission_id = %self.submission_id, error = %e, "Failed to publish status");
                }
            }
            Err(e) => error!(submission_id = %self.submission_id, error = %e, "Refused state change"),
        }
    }
}

/// Score every test case on its own blocking task.
///
/// Each task owns its inputs and writes to its own slot; results are only
/// combined after every task has finished.
pub async fn score_cases(
    test_cases: &[TestCase],
    prepared: &PreparedResponse,
    config: &EvaluationConfig,
) -> Vec<CaseEvaluation> {
    let total = test_cases.len();
    let mode = config.numeric_equality;
    let shared = Arc::new(prepared.clone());
    let mut tasks = JoinSet::new();

    for (idx, test_case) in test_cases.iter().enumerate() {
        let test_case = test_case.clone();
        let prepared = Arc::clone(&shared);
        tasks.spawn_blocking(move || {
            (idx, evaluator::evaluate_prepared_case(idx, &test_case, &prepared, mode))
        });
    }

    let mut slots: Vec<Option<CaseEvaluation>> = (0..total).map(|_| None).collect();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((idx, evaluation)) => slots[idx] = Some(evaluation),
            Err(e) => error!(error = %e, "Scoring task failed"),
        }
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(idx, slot)| {
            slot.unwrap_or_else(|| {
                let mut failed = evaluator::unavailable_case((idx + 1) as u32, &test_cases[idx]);
                failed.format_issue = Some(format!("Test case {}: scoring did not complete", idx + 1));
                failed
            })
        })
        .collect()
}

/// Run one submission from `Normalizing` through `Aggregated`.
///
/// Generation failures are reported inside the result, never as an error.
pub async fn execute_submission(
    job: &SubmissionJob,
    generator: &dyn GenerationService,
    store: &dyn SubmissionStore,
    config: &EvaluationConfig,
) -> SubmissionResult {
    let mut lifecycle = Lifecycle::new(job.submission.id, store);
    let test_cases = &job.question.test_cases;

    info!(
        submission_id = %job.submission.id,
        question_id = %job.question.id,
        test_cases = test_cases.len(),
        prompt_bytes = job.submission.prompt.len(),
        "Starting submission evaluation"
    );

    lifecycle.advance(SubmissionState::Normalizing).await;

    let input = Value::Array(test_cases.iter().map(|tc| tc.input.clone()).collect());
    let output: ModelOutput = match generator.generate(&job.submission.prompt, &input).await {
        Ok(output) => output,
        Err(e) => {
            error!(submission_id = %job.submission.id, error = %e, "Generation failed");
            lifecycle.advance(SubmissionState::Aggregated).await;
            return evaluator::generation_failed(job, &e.to_string());
        }
    };

    let prepared = evaluator::prepare_response(&output, test_cases.len());
    if let Some(issue) = &prepared.issue {
        warn!(submission_id = %job.submission.id, issue = %issue, "Model response unusable");
    }

    lifecycle.advance(SubmissionState::Scoring).await;
    let cases = score_cases(test_cases, &prepared, config).await;

    let result = evaluator::aggregate_results(job, &output, prepared, cases, config);
    lifecycle.advance(SubmissionState::Aggregated).await;

    result
}

/// Resolves once the submission has been flagged as cancelled
async fn wait_for_cancellation(store: &dyn SubmissionStore, submission_id: Uuid, poll_interval: Duration) {
    loop {
        match store.is_cancelled(&submission_id).await {
            Ok(true) => return,
            Ok(false) => {}
            Err(e) => {
                // Keep going on error to avoid false cancellations
                debug!(submission_id = %submission_id, error = %e, "Cancellation check failed");
            }
        }
        tokio::time::sleep(poll_interval).await;
    }
}

async fn reject(store: &dyn SubmissionStore, submission_id: &Uuid) {
    if let Err(e) = store.set_status(submission_id, SubmissionState::Rejected).await {
        error!(submission_id = %submission_id, error = %e, "Failed to publish rejection");
    }
}

/// Take one dequeued job through validation, evaluation and delivery.
///
/// Invalid and cancelled submissions end as `Rejected` with no stored
/// result. Cancellation is checked before work starts and then every
/// `cancel_poll` while the submission is in flight.
pub async fn process_submission(
    job: SubmissionJob,
    generator: &dyn GenerationService,
    store: &dyn SubmissionStore,
    config: &EvaluationConfig,
    cancel_poll: Duration,
) {
    let submission_id = job.submission.id;
    info!(
        submission_id = %submission_id,
        question_id = %job.question.id,
        user_id = %job.submission.user_id,
        test_cases = job.question.test_cases.len(),
        "Received submission"
    );

    if let Err(e) = store.set_status(&submission_id, SubmissionState::Received).await {
        warn!(submission_id = %submission_id, error = %e, "Failed to publish status");
    }

    if let Err(e) = validate_job(&job) {
        warn!(submission_id = %submission_id, reason = e.reason(), error = %e, "Submission rejected");
        reject(store, &submission_id).await;
        return;
    }

    if let Ok(true) = store.is_cancelled(&submission_id).await {
        info!(submission_id = %submission_id, "Submission cancelled before evaluation");
        reject(store, &submission_id).await;
        return;
    }

    let start = Instant::now();
    let outcome = tokio::select! {
        result = execute_submission(&job, generator, store, config) => Some(result),
        _ = wait_for_cancellation(store, submission_id, cancel_poll) => None,
    };

    let Some(result) = outcome else {
        info!(submission_id = %submission_id, "Submission cancelled, partial work discarded");
        reject(store, &submission_id).await;
        return;
    };

    info!(
        submission_id = %submission_id,
        success = result.success,
        score = result.score,
        passed_cases = result.passed_cases,
        total_cases = result.total_cases,
        format_issues = result.format_issues.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Submission evaluated"
    );

    for test_result in &result.test_case_results {
        debug!(
            submission_id = %submission_id,
            test_case_id = test_result.test_case_id,
            passed = test_result.passed,
            score = test_result.score,
            missing = test_result.missing_entries.len(),
            extra = test_result.extra_entries.len(),
            "Test case result"
        );
    }

    match store.store_result(&result).await {
        Ok(_) => info!(submission_id = %submission_id, "Result delivered"),
        Err(e) => {
            // Non-fatal - worker continues
            error!(submission_id = %submission_id, error = %e, "Failed to persist result");
        }
    }
}
