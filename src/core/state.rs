//! Run state models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Overall run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// Run has not started
    Pending,
    /// Run is in progress (for launch runs this covers the supervised daemon)
    Running,
    /// Run completed successfully
    Completed,
    /// Run halted on a fatal step failure
    Failed,
    /// Run was stopped by the operator
    Cancelled,
}

/// Phase of the launch readiness machine
///
/// `Starting` covers the spawn, `Watching` the line-by-line output scan,
/// `Ready` fires exactly once on the first pattern match, and `Running` is
/// the supervised steady state afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LaunchPhase {
    Starting,
    Watching,
    Ready,
    Running,
}

/// State of a single step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StepState {
    /// Step has not been reached yet
    Pending,
    /// Step is currently running
    Running {
        started_at: DateTime<Utc>,
    },
    /// Step completed successfully
    Completed {
        output: String,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    },
    /// Step failed fatally; the pipeline halted here
    Failed {
        error: String,
        started_at: DateTime<Utc>,
        failed_at: DateTime<Utc>,
    },
    /// Step was never executed (guard false, or adopted from a prior run)
    Skipped {
        reason: String,
    },
}

impl StepState {
    /// Check if step is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepState::Completed { .. } | StepState::Failed { .. } | StepState::Skipped { .. }
        )
    }

    /// Check if step finished successfully
    pub fn is_completed(&self) -> bool {
        matches!(self, StepState::Completed { .. })
    }

    /// Short lowercase label for display and persistence
    pub fn label(&self) -> &'static str {
        match self {
            StepState::Pending => "pending",
            StepState::Running { .. } => "running",
            StepState::Completed { .. } => "completed",
            StepState::Failed { .. } => "failed",
            StepState::Skipped { .. } => "skipped",
        }
    }
}

/// Overall run state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    /// Unique run ID
    pub run_id: Uuid,

    /// Current run status
    pub status: RunStatus,

    /// Readiness phase, present only on launch runs
    pub phase: Option<LaunchPhase>,

    /// When the run started
    pub started_at: Option<DateTime<Utc>>,

    /// When the run completed/failed
    pub completed_at: Option<DateTime<Utc>>,

    /// Total number of steps
    pub total_steps: usize,

    /// Number of completed steps
    pub completed_steps: usize,

    /// Number of failed steps
    pub failed_steps: usize,

    /// Number of skipped steps
    pub skipped_steps: usize,
}

impl RunState {
    /// Create a new run state
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            status: RunStatus::Pending,
            phase: None,
            started_at: None,
            completed_at: None,
            total_steps: 0,
            completed_steps: 0,
            failed_steps: 0,
            skipped_steps: 0,
        }
    }

    /// Mark the run as started
    pub fn start(&mut self, total_steps: usize) {
        self.status = RunStatus::Running;
        self.started_at = Some(Utc::now());
        self.total_steps = total_steps;
    }

    /// Mark the run as completed
    pub fn complete(&mut self) {
        self.status = RunStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    /// Mark the run as failed
    pub fn fail(&mut self) {
        self.status = RunStatus::Failed;
        self.completed_at = Some(Utc::now());
    }

    /// Mark the run as cancelled
    pub fn cancel(&mut self) {
        self.status = RunStatus::Cancelled;
        self.completed_at = Some(Utc::now());
    }

    /// Record a readiness phase transition
    pub fn set_phase(&mut self, phase: LaunchPhase) {
        self.phase = Some(phase);
    }

    /// Calculate progress (0.0 to 1.0) over steps in a terminal state
    pub fn progress(&self) -> f64 {
        if self.total_steps == 0 {
            return 0.0;
        }
        (self.completed_steps + self.failed_steps + self.skipped_steps) as f64
            / self.total_steps as f64
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}
