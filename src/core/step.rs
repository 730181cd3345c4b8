//! Step domain model

use crate::core::{condition::Guard, state::StepState};
use regex::Regex;
use std::path::PathBuf;

/// A single step in a pipeline
#[derive(Debug, Clone)]
pub struct Step {
    /// Unique step identifier
    pub id: String,

    /// Human-readable name for display
    pub name: String,

    /// The work this step performs
    pub action: Action,

    /// Optional guard; when it evaluates false the step is skipped entirely
    pub guard: Option<Guard>,

    /// Failure handling for this step
    pub on_failure: FailureMode,

    /// Optional wall-clock bound for command steps
    pub timeout_secs: Option<u64>,

    /// Runtime state (not part of the recipe)
    pub state: StepState,
}

/// What a step does when it runs
#[derive(Debug, Clone)]
pub enum Action {
    /// Remove the working directory tree
    ResetDir { path: PathBuf },

    /// Branch-pinned clone, with an already-cloned precheck on `dest`
    CloneRepo {
        repo: String,
        branch: String,
        dest: PathBuf,
    },

    /// Provision the virtual environment inside the working directory
    CreateEnv { python: String, dir: String },

    /// Run a command in the working directory, optionally inside the environment
    Shell { command: String, in_env: bool },

    /// Spawn the application and wait for the readiness signal
    Serve { command: String },

    /// Store the captured URL in the run context under `key`
    RecordUrl { key: String },

    /// Open the captured URL in a browser
    OpenBrowser,
}

/// How a step failure affects the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    /// Failure halts the pipeline at this step
    Fatal,
    /// Failure is logged and the pipeline continues
    Continue,
}

/// Pattern watched for in service output to detect readiness
///
/// When the pattern carries a capture group, group 1 is the recorded value;
/// otherwise the whole match is recorded. Compilation happens at recipe
/// validation, so a launch never watches with a broken pattern.
#[derive(Debug, Clone)]
pub struct ReadyPattern {
    regex: Regex,
}

impl ReadyPattern {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
        })
    }

    /// Match one output line, returning the value to record on a hit
    pub fn matches(&self, line: &str) -> Option<String> {
        let caps = self.regex.captures(line)?;
        let m = caps.get(1).or_else(|| caps.get(0))?;
        Some(m.as_str().to_string())
    }

    /// The source pattern text
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

impl Step {
    pub fn new(id: impl Into<String>, name: impl Into<String>, action: Action) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            action,
            guard: None,
            on_failure: FailureMode::Fatal,
            timeout_secs: None,
            state: StepState::Pending,
        }
    }

    /// Gate this step on a guard condition
    pub fn with_guard(mut self, guard: Guard) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Mark this step best-effort: failure logs and the pipeline continues
    pub fn best_effort(mut self) -> Self {
        self.on_failure = FailureMode::Continue;
        self
    }

    /// Bound this step's execution time
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Check if this step is in a terminal state
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}
