use crate::types::{SubmissionJob, SubmissionResult, SubmissionState};
use redis::{AsyncCommands, RedisResult};
use uuid::Uuid;

/// Redis key layout shared by the API and the worker.
/// Keeping it in one place means the two sides never drift.

pub const QUEUE_NAME: &str = "promptcode:queue:submissions";
pub const RESULT_PREFIX: &str = "promptcode:result";
pub const STATUS_PREFIX: &str = "promptcode:status";
pub const CANCEL_PREFIX: &str = "promptcode:cancel";

/// Results and status live for 24 hours
pub const RESULT_TTL_SECONDS: u64 = 86400;
pub const CANCEL_TTL_SECONDS: u64 = 3600;

pub fn result_key(submission_id: &Uuid) -> String {
    format!("{}:{}", RESULT_PREFIX, submission_id)
}

pub fn status_key(submission_id: &Uuid) -> String {
    format!("{}:{}", STATUS_PREFIX, submission_id)
}

pub fn cancel_key(submission_id: &Uuid) -> String {
    format!("{}:{}", CANCEL_PREFIX, submission_id)
}

fn encode<T: serde::Serialize>(value: &T) -> RedisResult<String> {
    serde_json::to_string(value)
        .map_err(|e| redis::RedisError::from((redis::ErrorKind::TypeError, "serialization error", e.to_string())))
}

fn decode<T: serde::de::DeserializeOwned>(payload: &str) -> RedisResult<T> {
    serde_json::from_str(payload)
        .map_err(|e| redis::RedisError::from((redis::ErrorKind::TypeError, "deserialization error", e.to_string())))
}

/// Push a submission onto the queue (RPUSH, FIFO with BLPOP)
pub async fn push_submission(
    conn: &mut redis::aio::ConnectionManager,
    job: &SubmissionJob,
) -> RedisResult<()> {
    let payload = encode(job)?;
    conn.rpush(QUEUE_NAME, payload).await
}

/// Pop the next submission, waiting at most `timeout_seconds`
pub async fn pop_submission(
    conn: &mut redis::aio::ConnectionManager,
    timeout_seconds: f64,
) -> RedisResult<Option<SubmissionJob>> {
    let result: Option<(String, String)> = conn.blpop(QUEUE_NAME, timeout_seconds).await?;

    match result {
        Some((_key, payload)) => Ok(Some(decode(&payload)?)),
        None => Ok(None),
    }
}

pub async fn set_status(
    conn: &mut redis::aio::ConnectionManager,
    submission_id: &Uuid,
    state: SubmissionState,
) -> RedisResult<()> {
    let payload = encode(&state)?;
    conn.set_ex(status_key(submission_id), payload, RESULT_TTL_SECONDS).await
}

pub async fn get_status(
    conn: &mut redis::aio::ConnectionManager,
    submission_id: &Uuid,
) -> RedisResult<Option<SubmissionState>> {
    let payload: Option<String> = conn.get(status_key(submission_id)).await?;
    payload.as_deref().map(decode).transpose()
}

/// Store a delivered result and mark the submission Delivered
pub async fn store_result(
    conn: &mut redis::aio::ConnectionManager,
    result: &SubmissionResult,
) -> RedisResult<()> {
    let payload = encode(result)?;
    let _: () = conn
        .set_ex(result_key(&result.submission_id), payload, RESULT_TTL_SECONDS)
        .await?;

    set_status(conn, &result.submission_id, SubmissionState::Delivered).await
}

pub async fn get_result(
    conn: &mut redis::aio::ConnectionManager,
    submission_id: &Uuid,
) -> RedisResult<Option<SubmissionResult>> {
    let payload: Option<String> = conn.get(result_key(submission_id)).await?;
    payload.as_deref().map(decode).transpose()
}

/// Flag a submission as abandoned. The worker discards its partial work.
pub async fn cancel_submission(
    conn: &mut redis::aio::ConnectionManager,
    submission_id: &Uuid,
) -> RedisResult<()> {
    conn.set_ex(cancel_key(submission_id), "1", CANCEL_TTL_SECONDS).await
}

pub async fn is_cancelled(
    conn: &mut redis::aio::ConnectionManager,
    submission_id: &Uuid,
) -> RedisResult<bool> {
    conn.exists(cancel_key(submission_id)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_key_deterministic() {
        let id = Uuid::new_v4();
        let key1 = result_key(&id);
        let key2 = result_key(&id);
        assert_eq!(key1, key2);
        assert!(key1.starts_with("promptcode:result:"));
    }

    #[test]
    fn test_status_and_cancel_keys() {
        let id = Uuid::new_v4();
        assert!(status_key(&id).starts_with("promptcode:status:"));
        assert!(cancel_key(&id).ends_with(&id.to_string()));
        assert_ne!(status_key(&id), cancel_key(&id));
    }

    #[test]
    fn test_state_codec() {
        let encoded = encode(&SubmissionState::Scoring).unwrap();
        assert_eq!(encoded, "\"scoring\"");
        let decoded: SubmissionState = decode(&encoded).unwrap();
        assert_eq!(decoded, SubmissionState::Scoring);
        assert!(decode::<SubmissionState>("not json").is_err());
    }

    async fn connect() -> redis::aio::ConnectionManager {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        let client = redis::Client::open(url).unwrap();
        redis::aio::ConnectionManager::new(client).await.unwrap()
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_cancelled_submission_has_no_result() {
        let mut conn = connect().await;
        let id = Uuid::new_v4();

        set_status(&mut conn, &id, SubmissionState::Scoring).await.unwrap();
        assert!(!is_cancelled(&mut conn, &id).await.unwrap());

        cancel_submission(&mut conn, &id).await.unwrap();
        assert!(is_cancelled(&mut conn, &id).await.unwrap());
        set_status(&mut conn, &id, SubmissionState::Rejected).await.unwrap();

        assert_eq!(get_status(&mut conn, &id).await.unwrap(), Some(SubmissionState::Rejected));
        assert_eq!(get_result(&mut conn, &id).await.unwrap(), None);
    }
}
