//! Compile-then-execute flow for one submission inside one box.

use futures_util::FutureExt;
use log::{debug, error, info, warn};
use std::{any::Any, panic::AssertUnwindSafe, sync::Arc};

use crate::{
    boxes::BoxLease,
    config::GraderConfig,
    error::Result,
    policy::{self, COMPILE_SCRIPT, RUN_SCRIPT},
    sandbox::{RunOutput, RunReport, RunRequest, RunStatusFlag, SandboxExecutor},
    submission::Submission,
    verdict, Status,
};

const COMPILE_TIMEOUT_MESSAGE: &str = "Compilation time limit exceeded.";

#[derive(Debug, PartialEq)]
pub enum CompileOutcome {
    /// The language has no compile step.
    Skipped,
    /// Carries compiler output, if any.
    Compiled(Option<String>),
    /// Carries the diagnostic, if any.
    Failed(Option<String>),
}

#[derive(Debug)]
pub enum ExecOutcome {
    Finished(RunOutput),
    /// The host watchdog fired before the sandbox returned.
    TimedOut,
}

pub struct Pipeline {
    executor: Arc<dyn SandboxExecutor>,
    config: Arc<GraderConfig>,
}

impl Pipeline {
    pub fn new(executor: Arc<dyn SandboxExecutor>, config: Arc<GraderConfig>) -> Self {
        Self { executor, config }
    }

    /// Grades `submission` in place and sets its terminal status.
    ///
    /// Never fails: errors and panics become `InternalError`. The box is
    /// released exactly once if, and only if, it was initialised.
    pub async fn grade(&self, submission: &mut Submission) {
        submission.reset_results();
        let cgroups = policy::run_limits(submission, &self.config).uses_group_accounting();

        let lease =
            match BoxLease::acquire(self.executor.clone(), submission.box_id(), cgroups).await {
                Ok(lease) => lease,
                Err(e) => {
                    error!("submission {}: {}", submission.id, e);
                    self.internal_error(submission, e.to_string());
                    return;
                }
            };

        let result = AssertUnwindSafe(self.grade_in_box(&lease, submission))
            .catch_unwind()
            .await;

        let box_id = lease.box_id();
        if let Err(e) = lease.release().await {
            error!("cleanup of box {} failed: {}", box_id, e);
        }

        match result {
            Ok(Ok(status)) => submission.status = status,
            Ok(Err(e)) => {
                error!("submission {} failed: {}", submission.id, e);
                self.internal_error(submission, e.to_string());
            }
            Err(panic) => {
                let detail = panic_message(panic.as_ref());
                error!("submission {} panicked: {}", submission.id, detail);
                self.internal_error(submission, detail);
            }
        }
    }

    async fn grade_in_box(&self, lease: &BoxLease, submission: &mut Submission) -> Result<Status> {
        lease.populate(submission).await?;

        match self.compile(lease, submission).await? {
            CompileOutcome::Skipped => {}
            CompileOutcome::Compiled(output) => submission.compile_output = output,
            CompileOutcome::Failed(diagnostic) => {
                submission.compile_output = diagnostic;
                return Ok(Status::CompilationError);
            }
        }

        let runs = policy::number_of_runs(submission, &self.config);
        let memory_accounting = policy::run_limits(submission, &self.config).memory_accounting;
        let mut times = Vec::new();
        let mut wall_times = Vec::new();
        let mut peak_memory: Option<u64> = None;
        let mut status = Status::Accepted;

        for run in 0..runs {
            debug!("submission {}: run {}/{}", submission.id, run + 1, runs);
            status = match self.execute(lease, submission).await? {
                ExecOutcome::TimedOut => Status::TimeLimitExceeded,
                ExecOutcome::Finished(output) => {
                    let report = RunReport::parse(&output.report);
                    times.extend(report.time);
                    wall_times.extend(report.wall_time);
                    if let Some(m) = report.memory(memory_accounting) {
                        peak_memory = Some(peak_memory.map_or(m, |p| p.max(m)));
                    }
                    self.record_run(submission, output, &report)
                }
            };
            if status != Status::Accepted {
                break;
            }
        }

        submission.time = average(&times);
        submission.wall_time = average(&wall_times);
        submission.memory = peak_memory;
        Ok(status)
    }

    /// Runs the language's compile command at the hard ceilings.
    pub async fn compile(&self, lease: &BoxLease, submission: &Submission) -> Result<CompileOutcome> {
        if !submission.language.needs_compile() {
            debug!("submission {}: no compile step", submission.id);
            return Ok(CompileOutcome::Skipped);
        }

        let script =
            policy::compile_script(&submission.language, submission.compiler_options.as_deref());
        lease.write_file(COMPILE_SCRIPT, &script).await?;
        info!("compiling submission {}", submission.id);
        debug!("compile script: {}", script);

        let request = RunRequest {
            box_id: lease.box_id(),
            workdir: lease.workdir().to_path_buf(),
            limits: policy::compile_limits(submission, &self.config),
            script: COMPILE_SCRIPT.into(),
            stdin: None,
        };
        let output = self.executor.run(&request).await;
        lease.remove_file(COMPILE_SCRIPT).await?;
        let output = output?;

        let report = RunReport::parse(&output.report);
        let diagnostic = combined_output(&output);

        if output.exit_code == 0 {
            return Ok(CompileOutcome::Compiled(diagnostic));
        }
        if report.status == Some(RunStatusFlag::TimedOut) {
            return Ok(CompileOutcome::Failed(Some(COMPILE_TIMEOUT_MESSAGE.into())));
        }
        Ok(CompileOutcome::Failed(diagnostic))
    }

    /// Runs the program once under the submission's capped limits, behind the
    /// host watchdog.
    pub async fn execute(&self, lease: &BoxLease, submission: &Submission) -> Result<ExecOutcome> {
        let limits = policy::run_limits(submission, &self.config);
        let script = policy::run_script(
            &submission.language,
            submission.command_line_arguments.as_deref(),
        );
        lease.write_file(RUN_SCRIPT, &script).await?;
        info!("running submission {}", submission.id);
        debug!("run script: {}", script);

        let watchdog = limits.watchdog();
        let request = RunRequest {
            box_id: lease.box_id(),
            workdir: lease.workdir().to_path_buf(),
            limits,
            script: RUN_SCRIPT.into(),
            stdin: submission.stdin.clone(),
        };

        match tokio::time::timeout(watchdog, self.executor.run(&request)).await {
            Ok(output) => Ok(ExecOutcome::Finished(output?)),
            Err(_) => {
                warn!(
                    "submission {}: watchdog fired after {:?}",
                    submission.id, watchdog
                );
                Ok(ExecOutcome::TimedOut)
            }
        }
    }

    /// Stores one run's results and judges that run on its own output.
    fn record_run(&self, submission: &mut Submission, output: RunOutput, report: &RunReport) -> Status {
        let exit_signal = report.exit_signal.unwrap_or(0);
        let status = verdict::classify(
            report.status,
            exit_signal,
            report.message.as_deref(),
            submission.expected_output.as_deref(),
            Some(output.stdout.as_str()),
        );

        if !output.stdout.is_empty() {
            submission.stdout = Some(output.stdout);
        }
        if !output.stderr.is_empty() {
            submission.stderr = Some(output.stderr);
        }
        submission.exit_code = Some(report.exit_code.unwrap_or(0));
        submission.exit_signal = Some(exit_signal);
        submission.message = report.message.clone();
        status
    }

    fn internal_error(&self, submission: &mut Submission, detail: String) {
        submission.status = Status::InternalError;
        if self.config.debug {
            submission.message = Some(detail);
        }
    }
}

fn combined_output(output: &RunOutput) -> Option<String> {
    let text = format!("{}{}", output.stdout, output.stderr);
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

fn average(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_of_runs() {
        assert_eq!(average(&[]), None);
        assert_eq!(average(&[0.5, 1.5]), Some(1.0));
    }

    #[test]
    fn blank_compiler_output_is_absent() {
        let mut output = RunOutput::default();
        assert_eq!(combined_output(&output), None);
        output.stdout = "main.c:1: error\n".into();
        assert_eq!(combined_output(&output).as_deref(), Some("main.c:1: error\n"));
    }
}
