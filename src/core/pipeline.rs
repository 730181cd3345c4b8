//! Pipeline domain model

use crate::core::{
    condition::Guard,
    config::{Accelerator, RecipeConfig},
    host::{torch_install_command, HostContext},
    state::{RunState, RunStatus, StepState},
    step::{Action, Step},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Which of the two pipelines a run executes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineKind {
    /// Provision the application: reset, clone, environment, dependencies
    Setup,
    /// Start the application and supervise it
    Launch,
}

impl PipelineKind {
    /// Lowercase label for display and persistence
    pub fn label(&self) -> &'static str {
        match self {
            PipelineKind::Setup => "setup",
            PipelineKind::Launch => "launch",
        }
    }

    /// Parse the exact lowercase label
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "setup" => Some(PipelineKind::Setup),
            "launch" => Some(PipelineKind::Launch),
            _ => None,
        }
    }
}

/// A pipeline: a strictly ordered list of steps
///
/// Steps run in order; a later step runs only after every earlier step has
/// reached a terminal state. There is no dependency graph and no scheduling
/// beyond that ordering.
#[derive(Debug, Clone)]
pub struct Pipeline {
    /// Recipe name this pipeline was built from
    pub name: String,

    /// Setup or launch
    pub kind: PipelineKind,

    /// Whether the final state of a successful run is a supervised daemon
    pub daemon: bool,

    /// Ordered steps
    pub steps: Vec<Step>,

    /// Run state
    pub state: RunState,
}

impl Pipeline {
    /// Build the setup pipeline for a recipe on the given host
    pub fn setup(recipe: &RecipeConfig, host: &HostContext) -> Self {
        let mut steps = Vec::new();

        steps.push(
            Step::new(
                "reset-workdir",
                "Reset working directory",
                Action::ResetDir {
                    path: recipe.workdir_path(),
                },
            )
            .best_effort(),
        );

        steps.push(Step::new(
            "clone-source",
            "Clone application source",
            Action::CloneRepo {
                repo: recipe.repo.clone(),
                branch: recipe.branch.clone(),
                dest: recipe.workdir_path(),
            },
        ));

        steps.push(Step::new(
            "create-env",
            "Create virtual environment",
            Action::CreateEnv {
                python: recipe.python.clone(),
                dir: recipe.env.clone(),
            },
        ));

        if recipe.accelerator == Accelerator::Torch {
            steps.push(Step::new(
                "install-torch",
                "Install acceleration packages",
                Action::Shell {
                    command: torch_install_command(host.gpu_vendor),
                    in_env: true,
                },
            ));
        }

        steps.push(Step::new(
            "install-deps",
            "Install requirements",
            Action::Shell {
                command: format!("pip install -r {}", recipe.requirements),
                in_env: true,
            },
        ));

        for (vendor, packages) in &recipe.gpu_extras {
            steps.push(
                Step::new(
                    format!("extras-{}", vendor),
                    format!("Install {} extras", vendor),
                    Action::Shell {
                        command: format!("pip install {}", packages.join(" ")),
                        in_env: true,
                    },
                )
                .with_guard(Guard::GpuVendorIs(vendor.clone())),
            );
        }

        if let Some(secs) = recipe.step_timeout_secs {
            for step in &mut steps {
                if matches!(
                    step.action,
                    Action::CloneRepo { .. } | Action::CreateEnv { .. } | Action::Shell { .. }
                ) {
                    step.timeout_secs = Some(secs);
                }
            }
        }

        Pipeline {
            name: recipe.name.clone(),
            kind: PipelineKind::Setup,
            daemon: false,
            steps,
            state: RunState::new(),
        }
    }

    /// Build the launch pipeline for a recipe
    pub fn launch(recipe: &RecipeConfig) -> Self {
        let mut steps = vec![
            Step::new(
                "start-app",
                "Start application",
                Action::Serve {
                    command: recipe.entry.clone(),
                },
            ),
            Step::new(
                "record-url",
                "Record local URL",
                Action::RecordUrl {
                    key: "url".to_string(),
                },
            ),
        ];

        if recipe.open_browser {
            steps.push(Step::new("open-browser", "Open browser", Action::OpenBrowser).best_effort());
        }

        Pipeline {
            name: recipe.name.clone(),
            kind: PipelineKind::Launch,
            daemon: true,
            steps,
            state: RunState::new(),
        }
    }

    /// Get a step by ID
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Get a mutable step by ID
    pub fn step_mut(&mut self, id: &str) -> Option<&mut Step> {
        self.steps.iter_mut().find(|s| s.id == id)
    }

    /// The first step that has not reached a terminal state
    pub fn next_step(&self) -> Option<&Step> {
        self.steps.iter().find(|s| !s.is_terminal())
    }

    /// Check if every step has reached a terminal state
    pub fn is_complete(&self) -> bool {
        self.steps.iter().all(|s| s.is_terminal())
    }

    /// Check if the run has failed
    pub fn has_failed(&self) -> bool {
        self.state.status == RunStatus::Failed
    }

    /// Adopt results from a previous run: the listed steps are marked
    /// completed without executing, so a resumed run starts at the first
    /// unfinished step
    pub fn adopt_completed(&mut self, step_ids: &[String]) -> usize {
        let mut adopted = 0;
        let now = Utc::now();
        for step in &mut self.steps {
            if step_ids.contains(&step.id) && matches!(step.state, StepState::Pending) {
                step.state = StepState::Completed {
                    output: "carried forward from a previous run".to_string(),
                    started_at: now,
                    completed_at: now,
                };
                adopted += 1;
            }
        }
        adopted
    }

    /// Refresh the run-state counters from the step states
    pub fn sync_counts(&mut self) {
        self.state.total_steps = self.steps.len();
        self.state.completed_steps = self
            .steps
            .iter()
            .filter(|s| matches!(s.state, StepState::Completed { .. }))
            .count();
        self.state.failed_steps = self
            .steps
            .iter()
            .filter(|s| matches!(s.state, StepState::Failed { .. }))
            .count();
        self.state.skipped_steps = self
            .steps
            .iter()
            .filter(|s| matches!(s.state, StepState::Skipped { .. }))
            .count();
    }
}
