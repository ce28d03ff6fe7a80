use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tokio::fs;
use uuid::Uuid;

use super::SubmissionStore;
use crate::{
    error::{Error, Result},
    submission::Submission,
    Status,
};

const QUEUE_DIR: &str = "queue";
const PROCESSING_DIR: &str = "processing";
const DONE_DIR: &str = "done";
const IDS_DIR: &str = "ids";
const TMP_DIR: &str = "tmp";

/// Directory backed store shared by worker processes on one host.
///
/// Each submission is a YAML file whose name sorts by queue time. A claim is a
/// `rename` from `queue/` to `processing/`; the filesystem lets exactly one
/// renamer win, the others see `NotFound` and try the next file.
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn open(root: &Path) -> Result<Self> {
        for dir in [QUEUE_DIR, PROCESSING_DIR, DONE_DIR, IDS_DIR, TMP_DIR] {
            std::fs::create_dir_all(root.join(dir))?;
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_name(submission: &Submission) -> String {
        let millis = submission.queued_at.timestamp_millis().max(0);
        format!("{:016}-{:020}.yaml", millis, submission.id)
    }

    async fn sorted_names(&self, dir: &str) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = fs::read_dir(self.root.join(dir)).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.ends_with(".yaml") {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Writes through a temporary file so readers never see partial content.
    async fn write_atomic(&self, dest: &Path, submission: &Submission) -> Result<()> {
        let tmp = self
            .root
            .join(TMP_DIR)
            .join(format!("{}.tmp", Uuid::new_v4()));
        fs::write(&tmp, serde_yaml::to_string(submission)?).await?;
        fs::rename(&tmp, dest).await?;
        Ok(())
    }

    async fn read(path: &Path) -> Result<Submission> {
        let content = fs::read_to_string(path).await?;
        Ok(serde_yaml::from_str(&content)?)
    }

    async fn allocate_id(&self) -> Result<u64> {
        let ids = self.root.join(IDS_DIR);
        let mut entries = fs::read_dir(&ids).await?;
        let mut last = 0u64;
        while let Some(entry) = entries.next_entry().await? {
            if let Ok(id) = entry.file_name().to_string_lossy().parse::<u64>() {
                last = last.max(id);
            }
        }

        let mut id = last + 1;
        loop {
            let reserved = fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(ids.join(id.to_string()))
                .await;
            match reserved {
                Ok(_) => return Ok(id),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => id += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn locate(&self, id: u64) -> Result<Option<PathBuf>> {
        let suffix = format!("-{:020}.yaml", id);
        for dir in [DONE_DIR, PROCESSING_DIR, QUEUE_DIR] {
            for name in self.sorted_names(dir).await? {
                if name.ends_with(&suffix) {
                    return Ok(Some(self.root.join(dir).join(name)));
                }
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl SubmissionStore for FsStore {
    async fn claim(&self) -> Result<Option<Submission>> {
        for name in self.sorted_names(QUEUE_DIR).await? {
            let from = self.root.join(QUEUE_DIR).join(&name);
            let to = self.root.join(PROCESSING_DIR).join(&name);
            match fs::rename(&from, &to).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!("{} claimed by another worker", name);
                    continue;
                }
                Err(e) => return Err(e.into()),
            }

            let mut submission = Self::read(&to).await?;
            submission.status = Status::Processing;
            submission.started_at = Some(Utc::now());
            self.write_atomic(&to, &submission).await?;
            return Ok(Some(submission));
        }
        Ok(None)
    }

    async fn save(&self, submission: &Submission) -> Result<()> {
        let name = Self::file_name(submission);
        let processing = self.root.join(PROCESSING_DIR).join(&name);
        let done = self.root.join(DONE_DIR).join(&name);

        if !submission.status.is_terminal() {
            return self.write_atomic(&processing, submission).await;
        }
        self.write_atomic(&done, submission).await?;
        match fs::remove_file(&processing).await {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    async fn enqueue(&self, mut submission: Submission) -> Result<Submission> {
        submission.id = self.allocate_id().await?;
        let dest = self
            .root
            .join(QUEUE_DIR)
            .join(Self::file_name(&submission));
        self.write_atomic(&dest, &submission).await?;
        Ok(submission)
    }

    async fn find(&self, id: u64) -> Result<Option<Submission>> {
        match self.locate(id).await? {
            Some(path) => match Self::read(&path).await {
                Ok(s) => Ok(Some(s)),
                // moved between listing and reading
                Err(Error::IO(e)) if e.kind() == ErrorKind::NotFound => {
                    match self.locate(id).await? {
                        Some(path) => Ok(Some(Self::read(&path).await?)),
                        None => Ok(None),
                    }
                }
                Err(e) => Err(e),
            },
            None => Ok(None),
        }
    }

    async fn find_by_token(&self, token: &Uuid) -> Result<Option<Submission>> {
        for dir in [DONE_DIR, PROCESSING_DIR, QUEUE_DIR] {
            for name in self.sorted_names(dir).await? {
                let submission = match Self::read(&self.root.join(dir).join(&name)).await {
                    Ok(s) => s,
                    Err(Error::IO(e)) if e.kind() == ErrorKind::NotFound => continue,
                    Err(e) => return Err(e),
                };
                if &submission.token == token {
                    return Ok(Some(submission));
                }
            }
        }
        Ok(None)
    }
}
