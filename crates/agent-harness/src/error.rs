//! Harness error types.
//!
//! One domain error enum covers every failure kind named in the error
//! handling design: agent-driver failures, hook-input failures, and
//! configuration failures. Validators never let these escape past their
//! boundary — see `hooks::dispatcher` for the fail-closed conversion.

use std::path::PathBuf;
use thiserror::Error;

pub type HarnessResult<T> = Result<T, HarnessError>;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("agent CLI command not found: {cmd}")]
    CommandNotFound { cmd: String },

    #[error("agent CLI exited with code {exit_code:?} running `{cmd}`: {stderr}")]
    ExecutionError {
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
        cmd: String,
    },

    #[error("agent CLI timed out after {actual_duration:?}s (configured timeout {configured_timeout:?}s)")]
    TimeoutError {
        configured_timeout: Option<f64>,
        actual_duration: f64,
    },

    #[error("failed to kill child process: {message}")]
    ProcessKillError { message: String },

    #[error("hook input error: {message}")]
    HookInputError { message: String },

    #[error("validator raised an exception: {message}")]
    ValidatorException { message: String },

    #[error("configuration error: {message}")]
    ConfigError { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl HarnessError {
    pub fn command_not_found(cmd: impl Into<String>) -> Self {
        HarnessError::CommandNotFound { cmd: cmd.into() }
    }

    pub fn config(message: impl Into<String>) -> Self {
        HarnessError::ConfigError {
            message: message.into(),
        }
    }

    pub fn validator(message: impl Into<String>) -> Self {
        HarnessError::ValidatorException {
            message: message.into(),
        }
    }

    /// Whether this error is the kind the retry loop / moderator controller
    /// should consider recoverable via a bounded retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            HarnessError::TimeoutError { .. } | HarnessError::ExecutionError { .. }
        )
    }
}

/// Error produced while resolving a path argument before spawning a child,
/// used by the agent driver's basic injection guard (spec §4.1).
#[derive(Debug, Error)]
#[error("rejected unsafe command argument: {arg} ({reason})")]
pub struct UnsafeArgumentError {
    pub arg: String,
    pub reason: &'static str,
}

/// Context helper mirroring the teacher's path-bearing error variants.
pub fn io_context(path: &PathBuf, err: std::io::Error) -> HarnessError {
    HarnessError::ConfigError {
        message: format!("{}: {}", path.display(), err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_error_is_retryable() {
        let err = HarnessError::ExecutionError {
            exit_code: Some(1),
            stdout: String::new(),
            stderr: "boom".into(),
            cmd: "claude".into(),
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn config_error_is_not_retryable() {
        let err = HarnessError::config("bad yaml");
        assert!(!err.is_retryable());
    }

    #[test]
    fn display_includes_cmd() {
        let err = HarnessError::CommandNotFound {
            cmd: "qwen".into(),
        };
        assert!(err.to_string().contains("qwen"));
    }
}
