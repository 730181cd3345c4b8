//! Shell command execution

use crate::runner::output::{tail_excerpt, CommandOutput, RunnerError};
use crate::runner::service::ServiceHandle;
use crate::runner::{CommandRunner, CommandSpec};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Runs commands through the platform shell
#[derive(Debug, Clone, Default)]
pub struct ShellRunner;

impl ShellRunner {
    pub fn new() -> Self {
        Self
    }

    fn build_command(&self, spec: &CommandSpec) -> Command {
        let mut cmd = if cfg!(windows) {
            let mut cmd = Command::new("cmd");
            cmd.arg("/C").arg(&spec.command);
            cmd
        } else {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(&spec.command);
            cmd
        };

        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }
        if let Some(venv) = &spec.venv {
            apply_venv(&mut cmd, venv);
        }
        cmd
    }
}

/// Point the command at a virtual environment: set `VIRTUAL_ENV` and prepend
/// the environment's script directory to PATH, so `python` and `pip` resolve
/// to the environment's binaries
fn apply_venv(cmd: &mut Command, venv: &Path) {
    let venv = absolutize(venv);
    let scripts = if cfg!(windows) {
        venv.join("Scripts")
    } else {
        venv.join("bin")
    };
    let separator = if cfg!(windows) { ';' } else { ':' };
    let path_var = std::env::var("PATH").unwrap_or_default();

    cmd.env("VIRTUAL_ENV", &venv);
    cmd.env(
        "PATH",
        format!("{}{}{}", scripts.display(), separator, path_var),
    );
}

/// PATH entries must be absolute; relative venv paths are resolved against
/// the controller's working directory, the same base `cwd` resolves against
fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|dir| dir.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, RunnerError> {
        debug!(command = %spec.command, cwd = ?spec.cwd, "running command");

        let mut cmd = self.build_command(spec);
        cmd.stdin(Stdio::null());
        cmd.kill_on_drop(true);

        let output = cmd.output().await.map_err(|e| RunnerError::Spawn {
            command: spec.command.clone(),
            message: e.to_string(),
        })?;

        let stdout =
            String::from_utf8(output.stdout).map_err(|e| RunnerError::Utf8(e.to_string()))?;
        let stderr =
            String::from_utf8(output.stderr).map_err(|e| RunnerError::Utf8(e.to_string()))?;

        if !output.status.success() {
            warn!(status = %output.status, command = %spec.command, "command failed");
            return Err(RunnerError::NonZeroExit {
                status: output.status.to_string(),
                stderr: tail_excerpt(&stderr),
            });
        }

        Ok(CommandOutput { stdout, stderr })
    }

    async fn spawn_service(&self, spec: &CommandSpec) -> Result<ServiceHandle, RunnerError> {
        info!(command = %spec.command, cwd = ?spec.cwd, "spawning service");

        let mut cmd = self.build_command(spec);
        cmd.stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null());
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| RunnerError::Spawn {
            command: spec.command.clone(),
            message: format!("{} (is it installed and on PATH?)", e),
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RunnerError::Internal("service stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| RunnerError::Internal("service stderr not captured".to_string()))?;

        Ok(ServiceHandle::attach(child, stdout, stderr))
    }
}
