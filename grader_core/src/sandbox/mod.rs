mod isolate;
mod report;

pub use isolate::IsolateExecutor;
pub use report::{RunReport, RunStatusFlag};

use async_trait::async_trait;
use std::path::PathBuf;

use crate::{error::Result, policy::RunLimits};

/// One invocation of a script inside an initialised box.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub box_id: u64,
    /// Directory returned by [`SandboxExecutor::init`].
    pub workdir: PathBuf,
    pub limits: RunLimits,
    /// Script path relative to the box directory.
    pub script: String,
    /// `None` connects the program to an empty input.
    pub stdin: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RunOutput {
    /// Exit code of the sandbox executor itself.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Raw run report text.
    pub report: String,
}

/// Contract to the external per-job isolation primitive.
///
/// `cleanup` must be called exactly once for every successful `init`.
#[async_trait]
pub trait SandboxExecutor: Send + Sync {
    /// Allocates box `box_id` and returns its writable root.
    async fn init(&self, box_id: u64, cgroups: bool) -> Result<PathBuf>;

    async fn run(&self, request: &RunRequest) -> Result<RunOutput>;

    async fn cleanup(&self, box_id: u64, cgroups: bool) -> Result<()>;
}
