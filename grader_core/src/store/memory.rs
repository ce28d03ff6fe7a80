use async_trait::async_trait;
use chrono::Utc;
use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard},
};
use uuid::Uuid;

use super::SubmissionStore;
use crate::{
    error::{Error, Result},
    submission::Submission,
    Status,
};

/// Store kept in process memory. Claiming happens under a single lock.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    last_id: u64,
    rows: BTreeMap<u64, Submission>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| Error::Store("memory store lock poisoned".into()))
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.rows.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

#[async_trait]
impl SubmissionStore for MemoryStore {
    async fn claim(&self) -> Result<Option<Submission>> {
        let mut inner = self.lock()?;
        let oldest = inner
            .rows
            .values()
            .filter(|s| s.status == Status::InQueue)
            .min_by_key(|s| (s.queued_at, s.id))
            .map(|s| s.id);

        Ok(oldest.and_then(|id| {
            inner.rows.get_mut(&id).map(|s| {
                s.status = Status::Processing;
                s.started_at = Some(Utc::now());
                s.clone()
            })
        }))
    }

    async fn save(&self, submission: &Submission) -> Result<()> {
        let mut inner = self.lock()?;
        match inner.rows.get_mut(&submission.id) {
            Some(row) => {
                *row = submission.clone();
                Ok(())
            }
            None => Err(Error::NotFound(format!("submission {}", submission.id))),
        }
    }

    async fn enqueue(&self, mut submission: Submission) -> Result<Submission> {
        let mut inner = self.lock()?;
        inner.last_id += 1;
        submission.id = inner.last_id;
        inner.rows.insert(submission.id, submission.clone());
        Ok(submission)
    }

    async fn find(&self, id: u64) -> Result<Option<Submission>> {
        Ok(self.lock()?.rows.get(&id).cloned())
    }

    async fn find_by_token(&self, token: &Uuid) -> Result<Option<Submission>> {
        Ok(self
            .lock()?
            .rows
            .values()
            .find(|s| &s.token == token)
            .cloned())
    }
}
