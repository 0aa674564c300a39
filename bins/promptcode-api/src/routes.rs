use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::handlers;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/status", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_handler))
        .route("/questions", get(handlers::list_questions))
        .route("/questions/:question_id", get(handlers::get_question))
        .route("/submissions", post(handlers::create_submission))
        .route(
            "/submissions/:submission_id",
            get(handlers::get_submission).delete(handlers::cancel_submission),
        )
        .route("/submit-prompt", post(handlers::submit_prompt))
}
