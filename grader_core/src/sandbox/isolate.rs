use async_trait::async_trait;
use log::debug;
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    process::Stdio,
};
use tokio::{fs, io::AsyncWriteExt, process::Command};

use super::{RunOutput, RunRequest, SandboxExecutor};
use crate::{
    error::{Error, Result},
    policy::{Accounting, ENV_ALLOW_LIST},
};

const METADATA_FILE_NAME: &str = "metadata.txt";

/// Adapter over the `isolate` command line tool.
///
/// Every invocation passes an argument vector, no host shell is involved.
pub struct IsolateExecutor {
    path: PathBuf,
}

impl IsolateExecutor {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Uses `path` when given, otherwise looks `isolate` up in `PATH`.
    pub fn locate(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) if p.exists() => Ok(Self::new(p.to_path_buf())),
            Some(p) => Err(Error::NotFound(p.to_string_lossy().to_string())),
            None => which::which("isolate")
                .map(Self::new)
                .map_err(|_| Error::Environment("missing isolate".into())),
        }
    }

    fn box_args(box_id: u64, cgroups: bool) -> Vec<String> {
        let mut args = Vec::new();
        if cgroups {
            args.push("--cg".to_string());
        }
        args.push(format!("--box-id={}", box_id));
        args
    }
}

pub(crate) fn run_args(request: &RunRequest, meta: &Path) -> Vec<String> {
    let l = &request.limits;
    let mut args = IsolateExecutor::box_args(request.box_id, l.uses_group_accounting());

    args.push("--silent".into());
    args.push(format!("--meta={}", meta.display()));
    if l.stderr_to_stdout {
        args.push("--stderr-to-stdout".into());
    }
    args.push(format!("--time={}", l.cpu_time));
    args.push(format!("--extra-time={}", l.extra_time));
    args.push(format!("--wall-time={}", l.wall_time));
    args.push(format!("--stack={}", l.stack));
    args.push(format!("--processes={}", l.processes));
    if l.uses_group_accounting() {
        match l.time_accounting {
            Accounting::Group => args.push("--cg-timing".into()),
            Accounting::PerProcess => args.push("--no-cg-timing".into()),
        }
    }
    match l.memory_accounting {
        Accounting::PerProcess => args.push(format!("--mem={}", l.memory)),
        Accounting::Group => args.push(format!("--cg-mem={}", l.memory)),
    }
    args.push(format!("--fsize={}", l.file_size));
    for (key, value) in ENV_ALLOW_LIST.iter() {
        match value {
            Some(v) => args.push(format!("--env={}={}", key, v)),
            None => args.push(format!("--env={}", key)),
        }
    }
    args.push("--dir=/etc:noexec".into());
    if l.share_network {
        args.push("--share-net".into());
    }
    args.push("--run".into());
    args.push("--".into());
    args.push("/bin/bash".into());
    args.push(request.script.clone());
    args
}

#[async_trait]
impl SandboxExecutor for IsolateExecutor {
    async fn init(&self, box_id: u64, cgroups: bool) -> Result<PathBuf> {
        let output = Command::new(&self.path)
            .args(Self::box_args(box_id, cgroups))
            .arg("--init")
            .stdin(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            return Err(Error::SandboxInit {
                box_id,
                msg: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let workdir = String::from_utf8(output.stdout)?;
        Ok(PathBuf::from(workdir.trim()))
    }

    async fn run(&self, request: &RunRequest) -> Result<RunOutput> {
        let meta = request.workdir.join(METADATA_FILE_NAME);
        let args = run_args(request, &meta);
        debug!("isolate {}", args.join(" "));

        let mut child = Command::new(&self.path)
            .args(&args)
            .stdin(if request.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let cin = child.stdin.take();
        let input = request.stdin.clone();
        let feed = async move {
            if let (Some(mut cin), Some(input)) = (cin, input) {
                cin.write_all(input.as_bytes()).await?;
                cin.flush().await?;
            }
            Ok::<(), std::io::Error>(())
        };
        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        if let Err(e) = fed {
            // the program may exit without reading all of its input
            debug!("box {}: stdin closed early: {}", request.box_id, e);
        }
        let output = output?;

        let report = match fs::read_to_string(&meta).await {
            Ok(s) => s,
            Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };
        match fs::remove_file(&meta).await {
            Err(e) if e.kind() != ErrorKind::NotFound => return Err(e.into()),
            _ => {}
        }

        Ok(RunOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            report,
        })
    }

    async fn cleanup(&self, box_id: u64, cgroups: bool) -> Result<()> {
        let output = Command::new(&self.path)
            .args(Self::box_args(box_id, cgroups))
            .arg("--cleanup")
            .stdin(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            return Err(Error::Sandbox(format!(
                "cleanup of box {} failed: {}",
                box_id,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::RunLimits;

    fn request(time: Accounting, memory: Accounting) -> RunRequest {
        RunRequest {
            box_id: 7,
            workdir: PathBuf::from("/var/local/lib/isolate/7"),
            limits: RunLimits {
                cpu_time: 2.0,
                extra_time: 0.5,
                wall_time: 5.0,
                stack: 64_000,
                processes: 60,
                memory: 128_000,
                file_size: 1024,
                time_accounting: time,
                memory_accounting: memory,
                share_network: false,
                stderr_to_stdout: false,
            },
            script: "run.sh".into(),
            stdin: None,
        }
    }

    #[test]
    fn per_process_accounting_skips_cgroups() {
        let req = request(Accounting::PerProcess, Accounting::PerProcess);
        let args = run_args(&req, Path::new("/w/metadata.txt"));

        assert!(!args.contains(&"--cg".to_string()));
        assert!(!args.iter().any(|a| a.contains("cg-timing")));
        assert!(args.contains(&"--mem=128000".to_string()));
        assert!(args.contains(&"--time=2".to_string()));
        assert!(args.contains(&"--extra-time=0.5".to_string()));
        assert!(args.contains(&"--box-id=7".to_string()));
        assert!(args.contains(&"--meta=/w/metadata.txt".to_string()));
        assert_eq!(&args[args.len() - 3..], ["--", "/bin/bash", "run.sh"]);
    }

    #[test]
    fn group_accounting_enables_cgroup_flags() {
        let req = request(Accounting::PerProcess, Accounting::Group);
        let args = run_args(&req, Path::new("/w/metadata.txt"));

        assert_eq!(args[0], "--cg");
        assert!(args.contains(&"--no-cg-timing".to_string()));
        assert!(args.contains(&"--cg-mem=128000".to_string()));

        let req = request(Accounting::Group, Accounting::Group);
        let args = run_args(&req, Path::new("/w/metadata.txt"));
        assert!(args.contains(&"--cg-timing".to_string()));
    }

    #[test]
    fn environment_is_allow_listed() {
        let req = request(Accounting::PerProcess, Accounting::PerProcess);
        let env: Vec<String> = run_args(&req, Path::new("/m"))
            .into_iter()
            .filter(|a| a.starts_with("--env="))
            .collect();
        assert_eq!(
            env,
            vec![
                "--env=HOME=/tmp".to_string(),
                format!("--env=PATH={}", crate::policy::SAFE_PATH),
                "--env=LANG".to_string(),
                "--env=LANGUAGE".to_string(),
                "--env=LC_ALL".to_string(),
            ]
        );
    }

    #[test]
    fn optional_flags_follow_limits() {
        let mut req = request(Accounting::PerProcess, Accounting::PerProcess);
        req.limits.share_network = true;
        req.limits.stderr_to_stdout = true;
        let args = run_args(&req, Path::new("/m"));
        assert!(args.contains(&"--share-net".to_string()));
        assert!(args.contains(&"--stderr-to-stdout".to_string()));
    }

    #[test]
    fn locate_reports_missing_binary() {
        let missing = Path::new("/definitely/not/here/isolate");
        assert!(matches!(
            IsolateExecutor::locate(Some(missing)),
            Err(Error::NotFound(_))
        ));
    }
}
