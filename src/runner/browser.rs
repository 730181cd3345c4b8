//! Browser opening
//!
//! Opens the recorded URL with the first platform opener found on PATH. The
//! opener is spawned detached; callers treat failures as non-fatal since a
//! ready service should not die because the host is headless.

use crate::runner::output::RunnerError;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Candidate opener commands, probed in order
#[cfg(target_os = "macos")]
const CANDIDATE_OPENERS: &[(&str, &[&str])] = &[("open", &[])];

#[cfg(target_os = "windows")]
const CANDIDATE_OPENERS: &[(&str, &[&str])] = &[("explorer", &[])];

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const CANDIDATE_OPENERS: &[(&str, &[&str])] = &[
    ("xdg-open", &[]),
    ("gio", &["open"]),
    ("gnome-open", &[]),
    ("kde-open", &[]),
];

/// Find the first available opener on PATH
pub fn detect_opener() -> Option<(&'static str, &'static [&'static str])> {
    CANDIDATE_OPENERS
        .iter()
        .find(|(program, _)| find_on_path(program))
        .copied()
}

fn find_on_path(binary: &str) -> bool {
    let Ok(path_var) = std::env::var("PATH") else {
        return false;
    };
    let separator = if cfg!(windows) { ';' } else { ':' };
    for dir in path_var.split(separator) {
        if dir.is_empty() {
            continue;
        }
        let candidate = Path::new(dir).join(binary);
        if candidate.is_file() {
            return true;
        }
        if cfg!(windows) && Path::new(dir).join(format!("{}.exe", binary)).is_file() {
            return true;
        }
    }
    false
}

/// Open a URL in the default browser, returning the opener used
pub async fn open_url(url: &str) -> Result<String, RunnerError> {
    let Some((program, args)) = detect_opener() else {
        return Err(RunnerError::Internal(
            "no browser opener found on PATH".to_string(),
        ));
    };

    debug!(%program, %url, "opening browser");
    let mut cmd = Command::new(program);
    cmd.args(args)
        .arg(url)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    let mut child = cmd.spawn().map_err(|e| RunnerError::Spawn {
        command: program.to_string(),
        message: e.to_string(),
    })?;

    // Reap in the background; openers return quickly on their own.
    tokio::spawn(async move {
        let _ = child.wait().await;
    });

    Ok(program.to_string())
}
