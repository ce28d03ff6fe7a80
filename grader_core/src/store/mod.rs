mod fs;
mod memory;

pub use self::fs::FsStore;
pub use self::memory::MemoryStore;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::{config::GraderConfig, error::Result, host, submission::Submission, Status};

/// Persisted submissions.
///
/// `claim` is the only way a submission leaves `InQueue`: it must select the
/// oldest queued submission, mark it `Processing` and return it as one atomic
/// step, so two callers never receive the same submission.
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    /// `Ok(None)` when the queue is empty.
    async fn claim(&self) -> Result<Option<Submission>>;

    /// Persists the current state of a claimed submission.
    async fn save(&self, submission: &Submission) -> Result<()>;

    /// Stores a new submission under a fresh id and returns it.
    async fn enqueue(&self, submission: Submission) -> Result<Submission>;

    async fn find(&self, id: u64) -> Result<Option<Submission>>;

    async fn find_by_token(&self, token: &Uuid) -> Result<Option<Submission>>;
}

/// Fills unset limits, stamps the queue host and time, and enqueues.
pub async fn create(
    store: &dyn SubmissionStore,
    mut submission: Submission,
    config: &GraderConfig,
) -> Result<Submission> {
    submission.set_defaults(&config.defaults);
    submission.reset_results();
    submission.status = Status::InQueue;
    submission.queued_at = Utc::now();
    submission.started_at = None;
    submission.finished_at = None;
    submission.queue_host = Some(host::hostname());
    submission.execution_host = None;
    store.enqueue(submission).await
}
