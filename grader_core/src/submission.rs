use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{config::DefaultLimits, Status};

/// Number of distinct box slots; box ids are derived from submission ids modulo this.
pub const BOX_ID_SPACE: u64 = 2_147_483_647;

/// Grading environment for one language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Language {
    pub id: u32,
    pub name: String,
    /// Compile command. `%s` is replaced by the sanitized compiler options.
    /// Empty for interpreted languages.
    #[serde(rename = "compileCmd", default)]
    pub compile_cmd: String,
    #[serde(rename = "runCmd")]
    pub run_cmd: String,
    #[serde(rename = "sourceFile")]
    pub source_file: String,
    #[serde(rename = "isArchived", default)]
    pub is_archived: bool,
}

impl Language {
    pub fn needs_compile(&self) -> bool {
        !self.compile_cmd.trim().is_empty()
    }
}

/// Resource limits requested by a submission. Unset values are filled from
/// [`DefaultLimits`] when the submission is created.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub cpu_time_limit: Option<f64>,
    pub cpu_extra_time: Option<f64>,
    pub wall_time_limit: Option<f64>,
    pub memory_limit: Option<u64>,
    pub stack_limit: Option<u64>,
    pub max_processes_and_or_threads: Option<u32>,
    pub enable_per_process_and_thread_time_limit: Option<bool>,
    pub enable_per_process_and_thread_memory_limit: Option<bool>,
    pub max_file_size: Option<u64>,
    pub redirect_stderr_to_stdout: Option<bool>,
    pub enable_network: Option<bool>,
    pub number_of_runs: Option<u32>,
}

/// Fills `slot` unless it holds a strictly positive value. The sandbox reads a
/// zero limit as "unlimited", so zero never survives as a request.
fn fill_positive<T: PartialOrd + Default + Copy>(slot: &mut Option<T>, default: T) {
    if !matches!(slot, Some(v) if *v > T::default()) {
        *slot = Some(default);
    }
}

impl Limits {
    pub fn set_defaults(&mut self, d: &DefaultLimits) {
        fill_positive(&mut self.cpu_time_limit, d.cpu_time_limit);
        if !matches!(self.cpu_extra_time, Some(v) if v >= 0.0) {
            self.cpu_extra_time = Some(d.cpu_extra_time);
        }
        fill_positive(&mut self.wall_time_limit, d.wall_time_limit);
        fill_positive(&mut self.memory_limit, d.memory_limit);
        fill_positive(&mut self.stack_limit, d.stack_limit);
        fill_positive(
            &mut self.max_processes_and_or_threads,
            d.max_processes_and_or_threads,
        );
        self.enable_per_process_and_thread_time_limit
            .get_or_insert(d.enable_per_process_and_thread_time_limit);
        self.enable_per_process_and_thread_memory_limit
            .get_or_insert(d.enable_per_process_and_thread_memory_limit);
        fill_positive(&mut self.max_file_size, d.max_file_size);
        self.redirect_stderr_to_stdout
            .get_or_insert(d.redirect_stderr_to_stdout);
        self.enable_network.get_or_insert(d.enable_network);
        fill_positive(&mut self.number_of_runs, d.number_of_runs);
    }
}

/// One grading job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub id: u64,
    pub token: Uuid,

    pub source_code: String,
    pub language: Language,
    pub compiler_options: Option<String>,
    pub command_line_arguments: Option<String>,
    pub stdin: Option<String>,
    pub expected_output: Option<String>,
    /// Base64 encoded zip archive extracted into the box before compiling.
    pub additional_files: Option<String>,
    pub callback_url: Option<String>,
    #[serde(default)]
    pub limits: Limits,

    #[serde(default)]
    pub status: Status,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub compile_output: Option<String>,
    pub message: Option<String>,
    pub exit_code: Option<i32>,
    pub exit_signal: Option<i32>,
    /// Seconds.
    pub time: Option<f64>,
    /// Seconds.
    pub wall_time: Option<f64>,
    /// Kilobytes.
    pub memory: Option<u64>,

    pub queued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub queue_host: Option<String>,
    pub execution_host: Option<String>,
}

impl Submission {
    /// A fresh queued submission with a random token and no limits set.
    pub fn new(id: u64, language: Language, source_code: String) -> Self {
        Self {
            id,
            token: Uuid::new_v4(),
            source_code,
            language,
            compiler_options: None,
            command_line_arguments: None,
            stdin: None,
            expected_output: None,
            additional_files: None,
            callback_url: None,
            limits: Limits::default(),
            status: Status::InQueue,
            stdout: None,
            stderr: None,
            compile_output: None,
            message: None,
            exit_code: None,
            exit_signal: None,
            time: None,
            wall_time: None,
            memory: None,
            queued_at: Utc::now(),
            started_at: None,
            finished_at: None,
            queue_host: None,
            execution_host: None,
        }
    }

    pub fn set_defaults(&mut self, defaults: &DefaultLimits) {
        self.limits.set_defaults(defaults);
    }

    /// Sandbox slot for this job.
    ///
    /// Two submissions whose ids are equal modulo [`BOX_ID_SPACE`] share a slot,
    /// so they must never be graded at the same time.
    pub fn box_id(&self) -> u64 {
        self.id % BOX_ID_SPACE
    }

    /// Clears every result field so a run can be recorded from scratch.
    pub fn reset_results(&mut self) {
        self.stdout = None;
        self.stderr = None;
        self.compile_output = None;
        self.message = None;
        self.exit_code = None;
        self.exit_signal = None;
        self.time = None;
        self.wall_time = None;
        self.memory = None;
    }
}
