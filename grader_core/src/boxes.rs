//! Ownership of one sandbox box for the duration of one job.

use base64::{engine::general_purpose, Engine as _};
use log::{debug, error, warn};
use std::{
    io::{Cursor, Read},
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::fs;

use crate::{
    error::{Error, Result},
    sandbox::SandboxExecutor,
    submission::Submission,
};

/// An initialised box. Released exactly once: explicitly through
/// [`BoxLease::release`], or from `Drop` when the owning future is abandoned.
pub struct BoxLease {
    executor: Arc<dyn SandboxExecutor>,
    box_id: u64,
    cgroups: bool,
    workdir: PathBuf,
    released: bool,
}

impl BoxLease {
    /// Allocates `box_id`. Nothing needs releasing when this fails.
    pub async fn acquire(
        executor: Arc<dyn SandboxExecutor>,
        box_id: u64,
        cgroups: bool,
    ) -> Result<Self> {
        let workdir = executor
            .init(box_id, cgroups)
            .await
            .map_err(|e| match e {
                e @ Error::SandboxInit { .. } => e,
                e => Error::SandboxInit {
                    box_id,
                    msg: e.to_string(),
                },
            })?;
        debug!("box {} ready at {}", box_id, workdir.display());

        Ok(Self {
            executor,
            box_id,
            cgroups,
            workdir,
            released: false,
        })
    }

    pub fn box_id(&self) -> u64 {
        self.box_id
    }

    pub fn cgroups(&self) -> bool {
        self.cgroups
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Directory the sandboxed program sees as its working directory.
    pub fn boxdir(&self) -> PathBuf {
        self.workdir.join("box")
    }

    /// Writes the source file and stages the additional files archive.
    pub async fn populate(&self, submission: &Submission) -> Result<()> {
        let boxdir = self.boxdir();
        fs::create_dir_all(&boxdir).await?;
        fs::write(
            boxdir.join(&submission.language.source_file),
            submission.source_code.as_bytes(),
        )
        .await?;

        if let Some(encoded) = &submission.additional_files {
            let archive = general_purpose::STANDARD.decode(encoded.trim())?;
            let boxdir = boxdir.clone();
            tokio::task::spawn_blocking(move || extract_archive(&archive, &boxdir))
                .await
                .map_err(|e| Error::Sandbox(format!("archive extraction aborted: {}", e)))??;
        }
        Ok(())
    }

    pub async fn write_file(&self, name: &str, content: &str) -> Result<()> {
        fs::write(self.boxdir().join(name), content.as_bytes()).await?;
        Ok(())
    }

    pub async fn remove_file(&self, name: &str) -> Result<()> {
        match fs::remove_file(self.boxdir().join(name)).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    pub async fn release(mut self) -> Result<()> {
        self.released = true;
        self.executor.cleanup(self.box_id, self.cgroups).await
    }
}

impl Drop for BoxLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        warn!("box {} dropped without release, cleaning up", self.box_id);

        let executor = self.executor.clone();
        let (box_id, cgroups) = (self.box_id, self.cgroups);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = executor.cleanup(box_id, cgroups).await {
                        error!("cleanup of box {} failed: {}", box_id, e);
                    }
                });
            }
            Err(_) => error!("box {} leaked: no runtime to clean it up", box_id),
        }
    }
}

fn extract_archive(bytes: &[u8], dest: &Path) -> Result<()> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        let relative = match file.enclosed_name() {
            Some(p) => p.to_owned(),
            None => {
                return Err(Error::Argument(format!(
                    "archive entry `{}` escapes the box",
                    file.name()
                )))
            }
        };
        let outpath = dest.join(relative);

        if file.is_dir() {
            std::fs::create_dir_all(&outpath)?;
            continue;
        }
        if let Some(parent) = outpath.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut content = Vec::new();
        file.read_to_end(&mut content)?;
        std::fs::write(&outpath, content)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn zip_of(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut w = zip::ZipWriter::new(&mut buf);
            let options = zip::write::SimpleFileOptions::default();
            for (name, content) in entries {
                w.start_file(*name, options).unwrap();
                w.write_all(content.as_bytes()).unwrap();
            }
            w.finish().unwrap();
        }
        buf.into_inner()
    }

    #[test]
    fn extracts_nested_entries() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        extract_archive(&zip_of(&[("data/in.txt", "12\n"), ("lib.h", "")]), dir.path())?;
        assert_eq!(std::fs::read_to_string(dir.path().join("data/in.txt"))?, "12\n");
        assert!(dir.path().join("lib.h").exists());
        Ok(())
    }

    #[test]
    fn rejects_entries_escaping_the_box() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let result = extract_archive(&zip_of(&[("../evil.sh", "x")]), dir.path());
        assert!(matches!(result, Err(Error::Argument(_))));
        Ok(())
    }
}
