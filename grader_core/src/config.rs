use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, time::Duration};

use crate::error::{Error, Result};

/// Upper bound for any configured duration, in seconds.
pub const MAX_SECONDS: f64 = 86_400.0;

/// Process-wide settings, read once at startup.
///
/// Every field has a default, so an empty file is a valid config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraderConfig {
    #[serde(rename = "defaults")]
    pub defaults: DefaultLimits,
    #[serde(rename = "ceilings")]
    pub ceilings: HardCeilings,
    /// Seconds to wait before polling an empty queue again.
    #[serde(rename = "pollInterval")]
    pub poll_interval: f64,
    /// Path of the `isolate` binary. Looked up in `PATH` when unset.
    #[serde(rename = "isolate")]
    pub isolate: Option<PathBuf>,
    #[serde(rename = "storeDir")]
    pub store_dir: PathBuf,
    #[serde(rename = "stopDir")]
    pub stop_dir: PathBuf,
    /// Copy internal error text into the submission's `message`.
    pub debug: bool,
}

/// Values used for limits a submission leaves unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultLimits {
    #[serde(rename = "cpuTimeLimit")]
    pub cpu_time_limit: f64,
    #[serde(rename = "cpuExtraTime")]
    pub cpu_extra_time: f64,
    #[serde(rename = "wallTimeLimit")]
    pub wall_time_limit: f64,
    #[serde(rename = "memoryLimit")]
    pub memory_limit: u64,
    #[serde(rename = "stackLimit")]
    pub stack_limit: u64,
    #[serde(rename = "maxProcessesAndOrThreads")]
    pub max_processes_and_or_threads: u32,
    #[serde(rename = "enablePerProcessAndThreadTimeLimit")]
    pub enable_per_process_and_thread_time_limit: bool,
    #[serde(rename = "enablePerProcessAndThreadMemoryLimit")]
    pub enable_per_process_and_thread_memory_limit: bool,
    #[serde(rename = "maxFileSize")]
    pub max_file_size: u64,
    #[serde(rename = "redirectStderrToStdout")]
    pub redirect_stderr_to_stdout: bool,
    #[serde(rename = "enableNetwork")]
    pub enable_network: bool,
    #[serde(rename = "numberOfRuns")]
    pub number_of_runs: u32,
}

/// Upper bounds no submission can raise. Compilation always runs at these values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HardCeilings {
    #[serde(rename = "cpuTimeLimit")]
    pub cpu_time_limit: f64,
    #[serde(rename = "cpuExtraTime")]
    pub cpu_extra_time: f64,
    #[serde(rename = "wallTimeLimit")]
    pub wall_time_limit: f64,
    #[serde(rename = "memoryLimit")]
    pub memory_limit: u64,
    #[serde(rename = "stackLimit")]
    pub stack_limit: u64,
    #[serde(rename = "maxProcessesAndOrThreads")]
    pub max_processes_and_or_threads: u32,
    #[serde(rename = "maxFileSize")]
    pub max_file_size: u64,
    #[serde(rename = "numberOfRuns")]
    pub number_of_runs: u32,
}

impl Default for DefaultLimits {
    fn default() -> Self {
        Self {
            cpu_time_limit: 5.0,
            cpu_extra_time: 1.0,
            wall_time_limit: 10.0,
            memory_limit: 128_000,
            stack_limit: 64_000,
            max_processes_and_or_threads: 60,
            enable_per_process_and_thread_time_limit: false,
            enable_per_process_and_thread_memory_limit: false,
            max_file_size: 1024,
            redirect_stderr_to_stdout: false,
            enable_network: false,
            number_of_runs: 1,
        }
    }
}

impl Default for HardCeilings {
    fn default() -> Self {
        Self {
            cpu_time_limit: 15.0,
            cpu_extra_time: 5.0,
            wall_time_limit: 20.0,
            memory_limit: 512_000,
            stack_limit: 128_000,
            max_processes_and_or_threads: 120,
            max_file_size: 4096,
            number_of_runs: 20,
        }
    }
}

impl Default for GraderConfig {
    fn default() -> Self {
        Self {
            defaults: DefaultLimits::default(),
            ceilings: HardCeilings::default(),
            poll_interval: 1.0,
            isolate: None,
            store_dir: PathBuf::from("/var/local/lib/iron_grader/store"),
            stop_dir: PathBuf::from("/var/local/lib/iron_grader"),
            debug: false,
        }
    }
}

impl GraderConfig {
    pub fn from_string(content: &str) -> Result<Self> {
        let v: Self = serde_yaml::from_str(content)?;
        v.check_valid()?;
        Ok(v)
    }

    pub fn from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_string(&content)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.poll_interval)
    }

    fn check_valid(&self) -> Result<()> {
        if !(self.poll_interval > 0.0 && self.poll_interval <= MAX_SECONDS) {
            return Err(Error::Argument(format!(
                "pollInterval must be in (0, {}]",
                MAX_SECONDS
            )));
        }
        let c = &self.ceilings;
        for (name, v, min) in [
            ("cpuTimeLimit", c.cpu_time_limit, f64::MIN_POSITIVE),
            ("cpuExtraTime", c.cpu_extra_time, 0.0),
            ("wallTimeLimit", c.wall_time_limit, f64::MIN_POSITIVE),
        ] {
            if !(v >= min && v <= MAX_SECONDS) {
                return Err(Error::Argument(format!(
                    "ceiling {} must be in [{}, {}]",
                    name, min, MAX_SECONDS
                )));
            }
        }
        // zero means unlimited to the sandbox
        for (name, v) in [
            ("memoryLimit", c.memory_limit),
            ("stackLimit", c.stack_limit),
            ("maxProcessesAndOrThreads", u64::from(c.max_processes_and_or_threads)),
            ("maxFileSize", c.max_file_size),
            ("numberOfRuns", u64::from(c.number_of_runs)),
        ] {
            if v == 0 {
                return Err(Error::Argument(format!("ceiling {} must be positive", name)));
            }
        }
        Ok(())
    }
}
