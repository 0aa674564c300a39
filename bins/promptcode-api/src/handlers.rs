// HTTP route handlers for the PromptCode API

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use promptcode_common::catalog::{validate_submission, QuestionCatalog};
use promptcode_common::error::ValidationError;
use promptcode_common::redis;
use promptcode_common::types::{QuestionSummary, Submission, SubmissionJob, SubmissionResult, SubmissionState};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::metrics;
use crate::AppState;

/// Poll interval while waiting for a worker to deliver a result
const RESULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub question_id: String,
    pub prompt: String,
    /// Supplied by the authenticating front proxy
    #[serde(default)]
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub submission_id: String,
}

fn error_body(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

fn validation_error_response(e: &ValidationError) -> Response {
    metrics::SUBMISSIONS_REJECTED.with_label_values(&[e.reason()]).inc();
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({
            "error": e.to_string(),
            "reason": e.reason(),
        })),
    )
        .into_response()
}

pub fn question_summaries(catalog: &dyn QuestionCatalog) -> Vec<QuestionSummary> {
    catalog.questions().iter().map(|q| q.summary()).collect()
}

fn parse_submission_id(raw: &str) -> Result<Uuid, Response> {
    Uuid::parse_str(raw).map_err(|_| error_body(StatusCode::BAD_REQUEST, "Invalid submission ID format"))
}

fn record_served(result: &SubmissionResult) {
    metrics::RESULTS_SERVED.inc();
    metrics::RESULT_SCORE.observe(result.score);
}

/// 202 with the latest known state, "pending" before the worker has seen it
fn status_response(submission_id: &Uuid, status: Option<SubmissionState>) -> Response {
    let status = status
        .map(|s| s.to_string())
        .unwrap_or_else(|| "pending".to_string());
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "submission_id": submission_id.to_string(),
            "status": status,
        })),
    )
        .into_response()
}

fn rejected_response(submission_id: &Uuid) -> Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(serde_json::json!({
            "submission_id": submission_id.to_string(),
            "status": SubmissionState::Rejected.to_string(),
        })),
    )
        .into_response()
}

/// Where a waiting request stands after one look at Redis
#[derive(Debug, PartialEq)]
enum WaitOutcome {
    Delivered(SubmissionResult),
    Rejected,
    Pending(Option<SubmissionState>),
}

fn wait_outcome(result: Option<SubmissionResult>, status: Option<SubmissionState>) -> WaitOutcome {
    match (result, status) {
        (Some(result), _) => WaitOutcome::Delivered(result),
        (None, Some(SubmissionState::Rejected)) => WaitOutcome::Rejected,
        (None, status) => WaitOutcome::Pending(status),
    }
}

/// Validate and queue a submission, returning its id
async fn enqueue(state: &AppState, payload: SubmitRequest) -> Result<Uuid, Response> {
    let question = validate_submission(
        state.catalog.as_ref(),
        &payload.question_id,
        &payload.prompt,
        &payload.user_id,
    )
    .map_err(|e| {
        warn!(question_id = %payload.question_id, reason = e.reason(), "Submission rejected");
        validation_error_response(&e)
    })?;

    let submission = Submission::new(payload.question_id, payload.prompt, payload.user_id);
    let submission_id = submission.id;
    let job = SubmissionJob { submission, question };

    let mut conn = state.redis.clone();
    match redis::push_submission(&mut conn, &job).await {
        Ok(_) => {
            metrics::SUBMISSIONS_ACCEPTED.inc();
            info!(
                submission_id = %submission_id,
                question_id = %job.question.id,
                user_id = %job.submission.user_id,
                test_cases = job.question.test_cases.len(),
                "Submission queued"
            );
            Ok(submission_id)
        }
        Err(e) => {
            error!(submission_id = %submission_id, error = %e, "Failed to queue submission");
            Err(error_body(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to queue submission: {}", e),
            ))
        }
    }
}

/// GET /status - Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /metrics - Prometheus exposition
pub async fn metrics_handler() -> Response {
    match metrics::gather_text() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => error_body(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// GET /questions - Public view of every question
pub async fn list_questions(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(question_summaries(state.catalog.as_ref()))
}

/// GET /questions/{question_id}
pub async fn get_question(
    State(state): State<Arc<AppState>>,
    Path(question_id): Path<String>,
) -> Response {
    match state.catalog.get(&question_id) {
        Some(question) => (StatusCode::OK, Json(question.summary())).into_response(),
        None => error_body(StatusCode::NOT_FOUND, format!("Unknown question id '{}'", question_id)),
    }
}

/// POST /submissions - Queue a submission for evaluation
pub async fn create_submission(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SubmitRequest>,
) -> Response {
    match enqueue(&state, payload).await {
        Ok(submission_id) => (
            StatusCode::CREATED,
            Json(SubmitResponse {
                submission_id: submission_id.to_string(),
            }),
        )
            .into_response(),
        Err(response) => response,
    }
}

/// GET /submissions/{submission_id} - Query evaluation result
pub async fn get_submission(
    State(state): State<Arc<AppState>>,
    Path(submission_id): Path<String>,
) -> Response {
    let id = match parse_submission_id(&submission_id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    let mut conn = state.redis.clone();
    match redis::get_result(&mut conn, &id).await {
        Ok(Some(result)) => {
            info!(submission_id = %id, success = result.success, "Result retrieved");
            record_served(&result);
            (StatusCode::OK, Json(result)).into_response()
        }
        Ok(None) => {
            // No result yet - report the latest known state
            let status = redis::get_status(&mut conn, &id).await.ok().flatten();
            status_response(&id, status)
        }
        Err(e) => {
            error!(submission_id = %id, error = %e, "Failed to fetch result");
            error_body(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to query submission status: {}", e),
            )
        }
    }
}

/// DELETE /submissions/{submission_id} - Abandon an in-flight submission
pub async fn cancel_submission(
    State(state): State<Arc<AppState>>,
    Path(submission_id): Path<String>,
) -> Response {
    let id = match parse_submission_id(&submission_id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    let mut conn = state.redis.clone();
    match redis::cancel_submission(&mut conn, &id).await {
        Ok(_) => {
            info!(submission_id = %id, "Cancellation requested");
            (
                StatusCode::ACCEPTED,
                Json(serde_json::json!({ "submission_id": submission_id, "status": "cancelling" })),
            )
                .into_response()
        }
        Err(e) => {
            error!(submission_id = %id, error = %e, "Failed to cancel submission");
            error_body(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// Flags the submission as cancelled if the waiting request is dropped,
/// which is what happens when the client disconnects.
struct CancelOnDrop {
    conn: Option<::redis::aio::ConnectionManager>,
    submission_id: Uuid,
}

impl CancelOnDrop {
    fn disarm(&mut self) {
        self.conn = None;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        // Cannot be async in Drop
        if let Some(mut conn) = self.conn.take() {
            let submission_id = self.submission_id;
            tokio::spawn(async move {
                if let Err(e) = redis::cancel_submission(&mut conn, &submission_id).await {
                    warn!(submission_id = %submission_id, error = %e, "Failed to cancel abandoned submission");
                }
            });
        }
    }
}

/// POST /submit-prompt - Queue a submission and wait for its result
pub async fn submit_prompt(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SubmitRequest>,
) -> Response {
    let submission_id = match enqueue(&state, payload).await {
        Ok(id) => id,
        Err(response) => return response,
    };

    let mut conn = state.redis.clone();
    let mut guard = CancelOnDrop {
        conn: Some(state.redis.clone()),
        submission_id,
    };
    let deadline = Instant::now() + state.submit_wait;

    loop {
        let result = match redis::get_result(&mut conn, &submission_id).await {
            Ok(result) => result,
            Err(e) => {
                guard.disarm();
                error!(submission_id = %submission_id, error = %e, "Failed to fetch result");
                return error_body(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
            }
        };
        let status = match result {
            Some(_) => None,
            None => redis::get_status(&mut conn, &submission_id).await.ok().flatten(),
        };

        let status = match wait_outcome(result, status) {
            WaitOutcome::Delivered(result) => {
                guard.disarm();
                record_served(&result);
                return (StatusCode::OK, Json(result)).into_response();
            }
            WaitOutcome::Rejected => {
                guard.disarm();
                info!(submission_id = %submission_id, "Submission rejected by worker");
                return rejected_response(&submission_id);
            }
            WaitOutcome::Pending(status) => status,
        };

        if Instant::now() >= deadline {
            guard.disarm();
            info!(submission_id = %submission_id, "Result not ready before deadline");
            return status_response(&submission_id, status);
        }

        tokio::time::sleep(RESULT_POLL_INTERVAL).await;
    }
}
