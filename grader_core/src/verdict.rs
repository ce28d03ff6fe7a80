//! Maps how a sandboxed run ended onto a final [`Status`].

use regex::Regex;
use std::sync::OnceLock;

use crate::{
    compare::{CompareMode, TrailingWhitespaceCompare},
    sandbox::RunStatusFlag,
    Status,
};

const EXEC_FAILURE_PATTERN: &str = r"(?i)^(?:execve\(.*\)|exec failed): (?:exec format error|format error|no such file or directory|file not found|permission denied)$";

/// Runtime error verdict for a terminating signal.
pub fn runtime_error_for_signal(signal: i32) -> Status {
    match signal {
        libc::SIGSEGV => Status::RuntimeErrorSigsegv,
        libc::SIGXFSZ => Status::RuntimeErrorSigxfsz,
        libc::SIGFPE => Status::RuntimeErrorSigfpe,
        libc::SIGABRT => Status::RuntimeErrorSigabrt,
        _ => Status::RuntimeErrorOther,
    }
}

/// Whether `message` is what a failed exec of a malformed, missing or
/// non-executable program reports.
pub fn is_exec_failure(message: &str) -> bool {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    match PATTERN.get_or_init(|| Regex::new(EXEC_FAILURE_PATTERN).ok()) {
        Some(re) => re.is_match(message.trim()),
        None => false,
    }
}

/// First matching rule wins: timeout, signal, nonzero exit, sandbox failure,
/// then output comparison.
pub fn classify(
    flag: Option<RunStatusFlag>,
    exit_signal: i32,
    message: Option<&str>,
    expected_output: Option<&str>,
    actual_stdout: Option<&str>,
) -> Status {
    match flag {
        Some(RunStatusFlag::TimedOut) => Status::TimeLimitExceeded,
        Some(RunStatusFlag::Signaled) => runtime_error_for_signal(exit_signal),
        Some(RunStatusFlag::NonZeroExit) => Status::RuntimeErrorNzec,
        Some(RunStatusFlag::InternalFailure) => match message {
            Some(m) if is_exec_failure(m) => Status::ExecFormatError,
            _ => Status::InternalError,
        },
        None => match expected_output {
            Some(expected) => TrailingWhitespaceCompare
                .compare(expected, actual_stdout.unwrap_or_default())
                .into(),
            None => Status::Accepted,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signals_select_runtime_error_variant() {
        let sg = Some(RunStatusFlag::Signaled);
        assert_eq!(classify(sg, 11, None, None, None), Status::RuntimeErrorSigsegv);
        assert_eq!(classify(sg, 25, None, None, None), Status::RuntimeErrorSigxfsz);
        assert_eq!(classify(sg, 8, None, None, None), Status::RuntimeErrorSigfpe);
        assert_eq!(classify(sg, 6, None, None, None), Status::RuntimeErrorSigabrt);
        assert_eq!(classify(sg, 999, None, None, None), Status::RuntimeErrorOther);
        assert_eq!(classify(sg, 0, None, None, None), Status::RuntimeErrorOther);
    }

    #[test]
    fn signal_wins_over_output_mismatch() {
        let status = classify(
            Some(RunStatusFlag::Signaled),
            11,
            None,
            Some("42"),
            Some("garbage"),
        );
        assert_eq!(status, Status::RuntimeErrorSigsegv);
    }

    #[test]
    fn timeout_and_nonzero_exit() {
        assert_eq!(
            classify(Some(RunStatusFlag::TimedOut), 9, None, Some("x"), Some("x")),
            Status::TimeLimitExceeded
        );
        assert_eq!(
            classify(Some(RunStatusFlag::NonZeroExit), 0, None, None, None),
            Status::RuntimeErrorNzec
        );
    }

    #[test]
    fn internal_failure_refines_exec_errors() {
        let xx = Some(RunStatusFlag::InternalFailure);
        assert_eq!(classify(xx, 0, None, None, None), Status::InternalError);
        assert_eq!(
            classify(xx, 0, Some("cannot set up cgroup"), None, None),
            Status::InternalError
        );
        for m in [
            "execve(\"./a.out\"): Exec format error",
            "execve(\"/usr/bin/foo\"): No such file or directory",
            "execve(\"./main\"): Permission denied",
            "exec failed: format error",
            "exec failed: file not found",
            "exec failed: permission denied",
        ] {
            assert_eq!(classify(xx, 0, Some(m), None, None), Status::ExecFormatError, "{}", m);
        }
    }

    #[test]
    fn output_comparison() {
        assert_eq!(
            classify(None, 0, None, Some("Hello\n"), Some("Hello")),
            Status::Accepted
        );
        assert_eq!(
            classify(None, 0, None, Some("Hello\n"), Some("Goodbye")),
            Status::WrongAnswer
        );
        assert_eq!(classify(None, 0, None, None, Some("anything")), Status::Accepted);
        assert_eq!(classify(None, 0, None, Some("Hello"), None), Status::WrongAnswer);
        assert_eq!(classify(None, 0, None, Some("\n"), None), Status::Accepted);
    }
}
