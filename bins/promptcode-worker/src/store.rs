/// Submission Store - where the worker reports progress
///
/// The worker publishes every state change, checks the cancellation flag
/// and delivers the final result through this trait. Production uses Redis;
/// tests use an in-memory store that keeps the full status history.

use async_trait::async_trait;
use promptcode_common::redis;
use promptcode_common::types::{SubmissionResult, SubmissionState};
use ::redis::aio::ConnectionManager;
use uuid::Uuid;

#[async_trait]
pub trait SubmissionStore: Send + Sync {
    async fn set_status(&self, submission_id: &Uuid, state: SubmissionState) -> anyhow::Result<()>;

    async fn is_cancelled(&self, submission_id: &Uuid) -> anyhow::Result<bool>;

    /// Persist the result and mark the submission delivered
    async fn store_result(&self, result: &SubmissionResult) -> anyhow::Result<()>;
}

pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl SubmissionStore for RedisStore {
    async fn set_status(&self, submission_id: &Uuid, state: SubmissionState) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        redis::set_status(&mut conn, submission_id, state).await?;
        Ok(())
    }

    async fn is_cancelled(&self, submission_id: &Uuid) -> anyhow::Result<bool> {
        let mut conn = self.conn.clone();
        Ok(redis::is_cancelled(&mut conn, submission_id).await?)
    }

    async fn store_result(&self, result: &SubmissionResult) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        redis::store_result(&mut conn, result).await?;
        Ok(())
    }
}

#[cfg(test)]
#[derive(Default)]
pub struct MemoryStore {
    inner: std::sync::Mutex<MemoryInner>,
}

#[cfg(test)]
#[derive(Default)]
struct MemoryInner {
    history: std::collections::HashMap<Uuid, Vec<SubmissionState>>,
    cancelled: std::collections::HashSet<Uuid>,
    results: std::collections::HashMap<Uuid, SubmissionResult>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn cancel(&self, submission_id: &Uuid) {
        self.inner.lock().unwrap().cancelled.insert(*submission_id);
    }

    /// Every status published for the submission, oldest first
    pub fn history(&self, submission_id: &Uuid) -> Vec<SubmissionState> {
        self.inner
            .lock()
            .unwrap()
            .history
            .get(submission_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn status(&self, submission_id: &Uuid) -> Option<SubmissionState> {
        self.history(submission_id).last().copied()
    }

    pub fn result(&self, submission_id: &Uuid) -> Option<SubmissionResult> {
        self.inner.lock().unwrap().results.get(submission_id).cloned()
    }
}

#[cfg(test)]
#[async_trait]
impl SubmissionStore for MemoryStore {
    async fn set_status(&self, submission_id: &Uuid, state: SubmissionState) -> anyhow::Result<()> {
        self.inner
            .lock()
            .unwrap()
            .history
            .entry(*submission_id)
            .or_default()
            .push(state);
        Ok(())
    }

    async fn is_cancelled(&self, submission_id: &Uuid) -> anyhow::Result<bool> {
        Ok(self.inner.lock().unwrap().cancelled.contains(submission_id))
    }

    async fn store_result(&self, result: &SubmissionResult) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.results.insert(result.submission_id, result.clone());
        inner
            .history
            .entry(result.submission_id)
            .or_default()
            .push(SubmissionState::Delivered);
        Ok(())
    }
}
