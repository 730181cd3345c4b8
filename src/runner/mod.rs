//! Subprocess execution
//!
//! Everything that actually runs commands lives behind the [`CommandRunner`]
//! trait: one-shot commands with captured output, and long-running services
//! with line-wise supervised output. The engine is generic over the trait so
//! tests can substitute scripted runners.

pub mod browser;
pub mod output;
pub mod service;
pub mod shell;

pub use output::{CommandOutput, RunnerError};
pub use service::{ReadyInfo, ServiceEvent, ServiceExit, ServiceHandle};
pub use shell::ShellRunner;

use async_trait::async_trait;
use std::path::PathBuf;

/// A command to run, with its working directory and environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Shell command line
    pub command: String,

    /// Working directory; inherits the controller's when unset
    pub cwd: Option<PathBuf>,

    /// Extra environment variables, applied in order
    pub env: Vec<(String, String)>,

    /// Virtual-environment directory; when set the runner injects
    /// `VIRTUAL_ENV` and prepends the environment's script directory to PATH
    pub venv: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            cwd: None,
            env: Vec::new(),
            venv: None,
        }
    }

    /// Run in the given directory
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Add an environment variable
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Run inside the given virtual environment
    pub fn with_venv(mut self, dir: impl Into<PathBuf>) -> Self {
        self.venv = Some(dir.into());
        self
    }
}

/// Where commands actually run
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion, capturing its output.
    /// Non-zero exit is an error carrying the status and a stderr excerpt.
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, RunnerError>;

    /// Spawn a long-running service with piped output
    async fn spawn_service(&self, spec: &CommandSpec) -> Result<ServiceHandle, RunnerError>;
}
