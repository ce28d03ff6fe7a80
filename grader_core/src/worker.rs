use chrono::Utc;
use log::{error, info, warn};
use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use crate::{
    callback::Notifier,
    config::GraderConfig,
    error::Result,
    host,
    pipeline::Pipeline,
    sandbox::SandboxExecutor,
    store::SubmissionStore,
    submission::Submission,
};

/// File whose presence asks worker `pid` to stop after its current job.
pub fn stop_file(stop_dir: &Path, pid: u32) -> PathBuf {
    stop_dir.join(format!("stop.{}", pid))
}

/// Claims one submission at a time and drives it to a terminal status.
pub struct Worker {
    store: Arc<dyn SubmissionStore>,
    pipeline: Pipeline,
    config: Arc<GraderConfig>,
    notifier: Option<Notifier>,
    host: String,
    stop: Arc<AtomicBool>,
}

impl Worker {
    pub fn new(
        store: Arc<dyn SubmissionStore>,
        executor: Arc<dyn SandboxExecutor>,
        config: Arc<GraderConfig>,
    ) -> Self {
        let notifier = match Notifier::new() {
            Ok(n) => Some(n),
            Err(e) => {
                warn!("callbacks disabled: {}", e);
                None
            }
        };
        Self {
            store,
            pipeline: Pipeline::new(executor, config.clone()),
            config,
            notifier,
            host: host::hostname(),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Setting the flag stops [`Worker::run`] once the current job is saved.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub async fn run(&self) -> Result<()> {
        let pid = std::process::id();
        info!("grader started with pid {} on {}", pid, self.host);

        while !self.stop_requested(pid).await {
            match self.process_next().await {
                Ok(Some(_)) => {}
                Ok(None) => tokio::time::sleep(self.config.poll_interval()).await,
                Err(e) => {
                    error!("worker error: {}", e);
                    tokio::time::sleep(self.config.poll_interval()).await;
                }
            }
        }

        info!("grader {} stopped", pid);
        Ok(())
    }

    /// Grades the oldest queued submission. `Ok(None)` when the queue is empty.
    pub async fn process_next(&self) -> Result<Option<Submission>> {
        let mut submission = match self.store.claim().await? {
            Some(s) => s,
            None => return Ok(None),
        };
        info!(
            "grading submission {} ({}) in box {}",
            submission.id,
            submission.token,
            submission.box_id()
        );

        self.pipeline.grade(&mut submission).await;

        submission.finished_at = Some(Utc::now());
        submission.execution_host = Some(self.host.clone());
        self.store.save(&submission).await?;
        info!("submission {} finished: {}", submission.id, submission.status);

        if let Some(notifier) = &self.notifier {
            if let Err(e) = notifier.notify(&submission).await {
                warn!("callback for submission {} failed: {}", submission.id, e);
            }
        }
        Ok(Some(submission))
    }

    async fn stop_requested(&self, pid: u32) -> bool {
        if self.stop.load(Ordering::SeqCst) {
            return true;
        }
        let file = stop_file(&self.config.stop_dir, pid);
        if tokio::fs::metadata(&file).await.is_ok() {
            if let Err(e) = tokio::fs::remove_file(&file).await {
                warn!("failed to delete {}: {}", file.display(), e);
            }
            return true;
        }
        false
    }
}
