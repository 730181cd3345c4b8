//! Step executor - runs individual steps against the host

use crate::{
    core::{
        context::RunContext,
        step::{Action, Step},
    },
    runner::{
        browser, output::tail_excerpt, CommandOutput, CommandRunner, CommandSpec, RunnerError,
        ServiceHandle,
    },
};
use std::path::Path;
use tokio::fs;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info};

/// Result of executing a step
#[derive(Debug, Clone)]
pub enum StepOutcome {
    /// Step did its work
    Success { output: String },
    /// Step found its goal already met and did nothing
    Recovered { note: String },
    /// Step failed
    Failed { error: String },
}

/// Executes a single step
pub struct StepExecutor<R> {
    runner: R,
}

impl<R: CommandRunner> StepExecutor<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    /// Execute a step and return the outcome
    ///
    /// Service steps are not run here; the engine drives those directly so
    /// readiness phases stay observable.
    pub async fn execute(&self, step: &Step, ctx: &mut RunContext) -> StepOutcome {
        info!("Executing step: {}", step.id);

        match &step.action {
            Action::ResetDir { path } => self.reset_dir(path).await,
            Action::CloneRepo { repo, branch, dest } => {
                self.clone_repo(step, repo, branch, dest).await
            }
            Action::CreateEnv { python, dir } => self.create_env(step, ctx, python, dir).await,
            Action::Shell { command, in_env } => self.shell(step, ctx, command, *in_env).await,
            Action::Serve { .. } => StepOutcome::Failed {
                error: "service steps are driven by the execution engine".to_string(),
            },
            Action::RecordUrl { key } => record_url(ctx, key),
            Action::OpenBrowser => open_browser(ctx).await,
        }
    }

    /// Spawn the application process for a service step
    ///
    /// The process runs in the working directory, inside the virtual
    /// environment, with the caller-built environment variables applied.
    pub async fn spawn_service(
        &self,
        command: &str,
        ctx: &RunContext,
    ) -> Result<ServiceHandle, RunnerError> {
        let mut spec = CommandSpec::new(command)
            .in_dir(&ctx.workdir)
            .with_venv(&ctx.env_dir);
        for (key, value) in &ctx.env_vars {
            spec = spec.with_env(key.clone(), value.clone());
        }
        self.runner.spawn_service(&spec).await
    }

    async fn reset_dir(&self, path: &Path) -> StepOutcome {
        match fs::remove_dir_all(path).await {
            Ok(()) => StepOutcome::Success {
                output: format!("removed {}", path.display()),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Nothing to reset at {}", path.display());
                StepOutcome::Recovered {
                    note: "nothing to remove".to_string(),
                }
            }
            Err(e) => StepOutcome::Failed {
                error: format!("could not remove {}: {}", path.display(), e),
            },
        }
    }

    async fn clone_repo(
        &self,
        step: &Step,
        repo: &str,
        branch: &str,
        dest: &Path,
    ) -> StepOutcome {
        let marker = dest.join(".git");
        if fs::metadata(&marker).await.map(|m| m.is_dir()).unwrap_or(false) {
            info!("Repository already present at {}", dest.display());
            return StepOutcome::Recovered {
                note: "repository already present".to_string(),
            };
        }

        // Quote the operands; the destination may contain spaces.
        let command = format!(
            r#"git clone -b "{}" "{}" "{}""#,
            branch,
            repo,
            dest.display()
        );
        let spec = CommandSpec::new(command);
        match self.run_bounded(step, &spec).await {
            Ok(_) => StepOutcome::Success {
                output: format!("cloned {} ({})", repo, branch),
            },
            Err(e) => StepOutcome::Failed {
                error: e.to_string(),
            },
        }
    }

    async fn create_env(
        &self,
        step: &Step,
        ctx: &RunContext,
        python: &str,
        dir: &str,
    ) -> StepOutcome {
        let spec = CommandSpec::new(format!("{} -m venv {}", python, dir)).in_dir(&ctx.workdir);
        match self.run_bounded(step, &spec).await {
            Ok(_) => StepOutcome::Success {
                output: format!("created {}", ctx.env_dir.display()),
            },
            Err(e) => StepOutcome::Failed {
                error: e.to_string(),
            },
        }
    }

    async fn shell(
        &self,
        step: &Step,
        ctx: &RunContext,
        command: &str,
        in_env: bool,
    ) -> StepOutcome {
        let mut spec = CommandSpec::new(command).in_dir(&ctx.workdir);
        if in_env {
            spec = spec.with_venv(&ctx.env_dir);
        }
        match self.run_bounded(step, &spec).await {
            Ok(output) => StepOutcome::Success {
                output: tail_excerpt(output.text()),
            },
            Err(e) => StepOutcome::Failed {
                error: e.to_string(),
            },
        }
    }

    /// Run a command, bounded by the step's timeout when one is set
    async fn run_bounded(
        &self,
        step: &Step,
        spec: &CommandSpec,
    ) -> Result<CommandOutput, RunnerError> {
        match step.timeout_secs {
            Some(secs) => match timeout(Duration::from_secs(secs), self.runner.run(spec)).await {
                Ok(result) => result,
                Err(_) => {
                    error!("Timeout for step {} after {}s", step.id, secs);
                    Err(RunnerError::Timeout(secs))
                }
            },
            None => self.runner.run(spec).await,
        }
    }
}

fn record_url(ctx: &mut RunContext, key: &str) -> StepOutcome {
    match ctx.captured.clone() {
        Some(url) => {
            ctx.set_value(key, url.clone());
            StepOutcome::Success { output: url }
        }
        None => StepOutcome::Failed {
            error: "no URL was captured from service output".to_string(),
        },
    }
}

async fn open_browser(ctx: &RunContext) -> StepOutcome {
    let Some(url) = ctx.captured.clone() else {
        return StepOutcome::Failed {
            error: "no URL to open".to_string(),
        };
    };
    match browser::open_url(&url).await {
        Ok(opener) => StepOutcome::Success {
            output: format!("opened {} with {}", url, opener),
        },
        Err(e) => StepOutcome::Failed {
            error: e.to_string(),
        },
    }
}
