//! Runner results and errors

use thiserror::Error;

/// Captured output of a successfully completed command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Trimmed stdout, the value callers usually want
    pub fn text(&self) -> &str {
        self.stdout.trim()
    }
}

/// Errors from running or supervising commands
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The command could not be started at all
    #[error("failed to spawn '{command}': {message}")]
    Spawn { command: String, message: String },

    /// The command ran but exited unsuccessfully
    #[error("command failed ({status}): {stderr}")]
    NonZeroExit { status: String, stderr: String },

    /// The command exceeded its time bound
    #[error("command timed out after {0} seconds")]
    Timeout(u64),

    /// The service exited before the readiness pattern ever matched
    #[error("service exited before signalling readiness ({status})")]
    ExitedBeforeReady { status: String },

    /// No readiness signal arrived within the configured bound
    #[error("no ready signal within {0} seconds")]
    ReadyTimeout(u64),

    /// Command output was not valid UTF-8
    #[error("invalid UTF-8 in command output: {0}")]
    Utf8(String),

    /// Anything else
    #[error("{0}")]
    Internal(String),
}

/// Last few lines of command output, for error messages and step records
pub fn tail_excerpt(text: &str) -> String {
    let lines: Vec<&str> = text.trim().lines().collect();
    if lines.len() > 12 {
        lines[lines.len() - 12..].join("\n")
    } else {
        lines.join("\n")
    }
}
