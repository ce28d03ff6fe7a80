pub mod boxes;
pub mod callback;
pub mod compare;
pub mod config;
pub mod error;
pub mod host;
pub mod pipeline;
pub mod policy;
pub mod sandbox;
pub mod store;
pub mod submission;
pub mod verdict;
pub mod worker;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a submission. Moves `InQueue -> Processing -> <terminal>` and never back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    #[default]
    InQueue,
    Processing,
    Accepted,
    WrongAnswer,
    TimeLimitExceeded,
    CompilationError,
    RuntimeErrorSigsegv,
    RuntimeErrorSigxfsz,
    RuntimeErrorSigfpe,
    RuntimeErrorSigabrt,
    RuntimeErrorNzec,
    RuntimeErrorOther,
    InternalError,
    ExecFormatError,
}

impl Status {
    pub const ALL: [Status; 14] = [
        Status::InQueue,
        Status::Processing,
        Status::Accepted,
        Status::WrongAnswer,
        Status::TimeLimitExceeded,
        Status::CompilationError,
        Status::RuntimeErrorSigsegv,
        Status::RuntimeErrorSigxfsz,
        Status::RuntimeErrorSigfpe,
        Status::RuntimeErrorSigabrt,
        Status::RuntimeErrorNzec,
        Status::RuntimeErrorOther,
        Status::InternalError,
        Status::ExecFormatError,
    ];

    /// Stable numeric id, starting at 1 for `InQueue`.
    pub fn id(self) -> u32 {
        Self::ALL
            .iter()
            .position(|s| *s == self)
            .map(|i| i as u32 + 1)
            .unwrap_or_default()
    }

    pub fn description(self) -> &'static str {
        match self {
            Status::InQueue => "In Queue",
            Status::Processing => "Processing",
            Status::Accepted => "Accepted",
            Status::WrongAnswer => "Wrong Answer",
            Status::TimeLimitExceeded => "Time Limit Exceeded",
            Status::CompilationError => "Compilation Error",
            Status::RuntimeErrorSigsegv => "Runtime Error (SIGSEGV)",
            Status::RuntimeErrorSigxfsz => "Runtime Error (SIGXFSZ)",
            Status::RuntimeErrorSigfpe => "Runtime Error (SIGFPE)",
            Status::RuntimeErrorSigabrt => "Runtime Error (SIGABRT)",
            Status::RuntimeErrorNzec => "Runtime Error (NZEC)",
            Status::RuntimeErrorOther => "Runtime Error (Other)",
            Status::InternalError => "Internal Error",
            Status::ExecFormatError => "Exec Format Error",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Status::InQueue | Status::Processing)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}
