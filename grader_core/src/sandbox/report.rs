use log::warn;

use crate::policy::Accounting;

/// How a sandboxed run ended, as reported by the `status` key.
/// Absent means the program exited normally with code 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatusFlag {
    TimedOut,
    Signaled,
    NonZeroExit,
    InternalFailure,
}

impl RunStatusFlag {
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "TO" => Some(RunStatusFlag::TimedOut),
            "SG" => Some(RunStatusFlag::Signaled),
            "RE" => Some(RunStatusFlag::NonZeroExit),
            "XX" => Some(RunStatusFlag::InternalFailure),
            _ => None,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            RunStatusFlag::TimedOut => "TO",
            RunStatusFlag::Signaled => "SG",
            RunStatusFlag::NonZeroExit => "RE",
            RunStatusFlag::InternalFailure => "XX",
        }
    }
}

/// Parsed `key:value` run report.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub time: Option<f64>,
    pub wall_time: Option<f64>,
    pub max_rss: Option<u64>,
    pub cg_mem: Option<u64>,
    pub exit_code: Option<i32>,
    pub exit_signal: Option<i32>,
    pub status: Option<RunStatusFlag>,
    pub message: Option<String>,
}

impl RunReport {
    pub fn parse(text: &str) -> Self {
        let mut report = RunReport::default();

        for line in text.lines() {
            let (key, value) = match line.split_once(':') {
                Some((k, v)) => (k.trim(), v.trim()),
                None => continue,
            };
            match key {
                "time" => report.time = value.parse().ok(),
                "time-wall" => report.wall_time = value.parse().ok(),
                "max-rss" => report.max_rss = value.parse().ok(),
                "cg-mem" => report.cg_mem = value.parse().ok(),
                "exitcode" => report.exit_code = value.parse().ok(),
                "exitsig" => report.exit_signal = value.parse().ok(),
                "status" => {
                    report.status = match RunStatusFlag::from_code(value) {
                        Some(flag) => Some(flag),
                        None => {
                            // unknown codes are treated as a sandbox failure
                            warn!("unknown run report status `{}`", value);
                            Some(RunStatusFlag::InternalFailure)
                        }
                    }
                }
                "message" if !value.is_empty() => report.message = Some(value.to_string()),
                _ => {}
            }
        }

        report
    }

    /// Peak memory in kilobytes from the counters matching `accounting`.
    pub fn memory(&self, accounting: Accounting) -> Option<u64> {
        match accounting {
            Accounting::PerProcess => self.max_rss,
            Accounting::Group => self.cg_mem,
        }
    }
}
