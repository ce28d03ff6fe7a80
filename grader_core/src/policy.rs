//! Turns submission limits into sandbox invocation parameters and builds the
//! scripts placed inside the box.

use std::time::Duration;

use crate::{
    config::{GraderConfig, HardCeilings},
    submission::{Language, Submission},
};

/// Characters stripped from user supplied option strings before they are
/// interpolated into a script.
pub const FORBIDDEN_CHARS: [char; 7] = ['$', '&', ';', '<', '>', '|', '`'];

pub const SAFE_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// Environment visible inside the box. `None` passes the host value through.
pub const ENV_ALLOW_LIST: [(&str, Option<&str>); 5] = [
    ("HOME", Some("/tmp")),
    ("PATH", Some(SAFE_PATH)),
    ("LANG", None),
    ("LANGUAGE", None),
    ("LC_ALL", None),
];

pub const COMPILE_SCRIPT: &str = "compile.sh";
pub const RUN_SCRIPT: &str = "run.sh";

/// Which counters the sandbox uses for one resource dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accounting {
    PerProcess,
    Group,
}

impl Accounting {
    fn from_per_process(per_process: bool) -> Self {
        if per_process {
            Accounting::PerProcess
        } else {
            Accounting::Group
        }
    }
}

/// Parameters of a single sandbox run. Times are seconds, sizes kilobytes.
#[derive(Debug, Clone, PartialEq)]
pub struct RunLimits {
    pub cpu_time: f64,
    pub extra_time: f64,
    pub wall_time: f64,
    pub stack: u64,
    pub processes: u32,
    pub memory: u64,
    pub file_size: u64,
    pub time_accounting: Accounting,
    pub memory_accounting: Accounting,
    pub share_network: bool,
    pub stderr_to_stdout: bool,
}

impl RunLimits {
    pub fn uses_group_accounting(&self) -> bool {
        self.time_accounting == Accounting::Group || self.memory_accounting == Accounting::Group
    }

    /// Host side backstop for a run that the sandbox fails to stop.
    pub fn watchdog(&self) -> Duration {
        Duration::try_from_secs_f64((self.cpu_time + self.extra_time).max(0.0))
            .unwrap_or(Duration::MAX)
    }
}

pub fn sanitize(input: &str) -> String {
    input.chars().filter(|c| !FORBIDDEN_CHARS.contains(c)).collect()
}

fn accounting_of(submission: &Submission, config: &GraderConfig) -> (Accounting, Accounting) {
    let d = &config.defaults;
    let l = &submission.limits;
    (
        Accounting::from_per_process(
            l.enable_per_process_and_thread_time_limit
                .unwrap_or(d.enable_per_process_and_thread_time_limit),
        ),
        Accounting::from_per_process(
            l.enable_per_process_and_thread_memory_limit
                .unwrap_or(d.enable_per_process_and_thread_memory_limit),
        ),
    )
}

/// Limits for the compile phase. Always the hard ceilings, never user values.
pub fn compile_limits(submission: &Submission, config: &GraderConfig) -> RunLimits {
    let c: &HardCeilings = &config.ceilings;
    let (time_accounting, memory_accounting) = accounting_of(submission, config);
    RunLimits {
        cpu_time: c.cpu_time_limit,
        extra_time: 0.0,
        wall_time: c.wall_time_limit,
        stack: c.stack_limit,
        processes: c.max_processes_and_or_threads,
        memory: c.memory_limit,
        file_size: c.max_file_size,
        time_accounting,
        memory_accounting,
        share_network: false,
        stderr_to_stdout: true,
    }
}

/// Limits for the execute phase: the requested (or default) value of every
/// dimension, capped by the matching hard ceiling.
pub fn run_limits(submission: &Submission, config: &GraderConfig) -> RunLimits {
    let c = &config.ceilings;
    let d = &config.defaults;
    let l = &submission.limits;
    let (time_accounting, memory_accounting) = accounting_of(submission, config);

    RunLimits {
        cpu_time: secs(l.cpu_time_limit, d.cpu_time_limit, c.cpu_time_limit, false),
        extra_time: secs(l.cpu_extra_time, d.cpu_extra_time, c.cpu_extra_time, true),
        wall_time: secs(l.wall_time_limit, d.wall_time_limit, c.wall_time_limit, false),
        stack: capped(l.stack_limit, d.stack_limit, c.stack_limit),
        processes: capped(
            l.max_processes_and_or_threads,
            d.max_processes_and_or_threads,
            c.max_processes_and_or_threads,
        ),
        memory: capped(l.memory_limit, d.memory_limit, c.memory_limit),
        file_size: capped(l.max_file_size, d.max_file_size, c.max_file_size),
        time_accounting,
        memory_accounting,
        share_network: l.enable_network.unwrap_or(d.enable_network),
        stderr_to_stdout: l
            .redirect_stderr_to_stdout
            .unwrap_or(d.redirect_stderr_to_stdout),
    }
}

/// First usable of `requested` and `default`, capped at `ceiling`. Zero is
/// only usable when `allow_zero`; with nothing usable the ceiling applies.
fn secs(requested: Option<f64>, default: f64, ceiling: f64, allow_zero: bool) -> f64 {
    [requested, Some(default)]
        .into_iter()
        .flatten()
        .find(|v| *v > 0.0 || (allow_zero && *v == 0.0))
        .map_or(ceiling, |v| v.min(ceiling))
}

/// Like [`secs`] for counts and sizes, where zero means unlimited to the sandbox.
fn capped<T: Ord + Default + Copy>(requested: Option<T>, default: T, ceiling: T) -> T {
    [requested, Some(default)]
        .into_iter()
        .flatten()
        .find(|v| *v > T::default())
        .map_or(ceiling, |v| v.min(ceiling))
}

pub fn number_of_runs(submission: &Submission, config: &GraderConfig) -> u32 {
    submission
        .limits
        .number_of_runs
        .unwrap_or(config.defaults.number_of_runs)
        .min(config.ceilings.number_of_runs)
        .max(1)
}

pub fn compile_script(language: &Language, compiler_options: Option<&str>) -> String {
    let options = sanitize(compiler_options.unwrap_or_default());
    language.compile_cmd.replace("%s", &options)
}

pub fn run_script(language: &Language, command_line_arguments: Option<&str>) -> String {
    let args = sanitize(command_line_arguments.unwrap_or_default());
    format!("{} {}", language.run_cmd, args).trim_end().to_string()
}
