//! Service supervision and readiness watching
//!
//! A spawned service is owned by a reader task that pumps merged
//! stdout/stderr lines into an event channel and reports the exit status at
//! the end. The [`ServiceHandle`] consumes that channel: `wait_ready` scans
//! for the one-shot readiness signal, `wait_exit` and `terminate` cover
//! daemon supervision afterwards.

use crate::core::step::ReadyPattern;
use crate::runner::output::RunnerError;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout};
use tokio::sync::{mpsc, watch};
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

/// Exit status of a supervised process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceExit {
    /// Process exit code, when the platform reports one
    pub code: Option<i32>,
}

impl ServiceExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn describe(&self) -> String {
        match self.code {
            Some(code) => format!("exit code {}", code),
            None => "terminated by signal".to_string(),
        }
    }
}

/// One event from the service reader task
#[derive(Debug, Clone)]
pub enum ServiceEvent {
    /// A line of service output (stdout or stderr)
    Line(String),
    /// The service process exited
    Exited(ServiceExit),
}

/// Result of the one-shot ready signal
#[derive(Debug, Clone)]
pub struct ReadyInfo {
    /// The recorded URL: capture group 1, or the whole match
    pub url: String,
    /// The full output line that matched
    pub line: String,
}

/// Handle to a spawned service
pub struct ServiceHandle {
    events: mpsc::UnboundedReceiver<ServiceEvent>,
    kill: Option<watch::Sender<bool>>,
    exited: Option<ServiceExit>,
}

impl ServiceHandle {
    /// Take ownership of a child and its piped output, starting the reader task
    pub(crate) fn attach(mut child: Child, stdout: ChildStdout, stderr: ChildStderr) -> Self {
        let (event_tx, events) = mpsc::unbounded_channel();
        let (kill_tx, mut kill_rx) = watch::channel(false);

        tokio::spawn(async move {
            let mut stdout_lines = BufReader::new(stdout).lines();
            let mut stderr_lines = BufReader::new(stderr).lines();
            let mut stdout_closed = false;
            let mut stderr_closed = false;
            let mut killed = false;

            loop {
                if stdout_closed && stderr_closed {
                    break;
                }

                tokio::select! {
                    line = stdout_lines.next_line(), if !stdout_closed => match line {
                        Ok(Some(line)) => {
                            let _ = event_tx.send(ServiceEvent::Line(line));
                        }
                        Ok(None) => stdout_closed = true,
                        Err(e) => {
                            debug!("service stdout read error: {}", e);
                            stdout_closed = true;
                        }
                    },
                    line = stderr_lines.next_line(), if !stderr_closed => match line {
                        Ok(Some(line)) => {
                            let _ = event_tx.send(ServiceEvent::Line(line));
                        }
                        Ok(None) => stderr_closed = true,
                        Err(e) => {
                            debug!("service stderr read error: {}", e);
                            stderr_closed = true;
                        }
                    },
                    changed = kill_rx.changed(), if !killed => {
                        if changed.is_err() {
                            killed = true;
                        } else if *kill_rx.borrow() {
                            killed = true;
                            if let Err(e) = child.kill().await {
                                warn!("failed to kill service process: {}", e);
                            }
                        }
                    }
                }
            }

            // The child can outlive its streams (a daemonizing entry closes
            // its stdio), so the kill signal stays live while reaping.
            let status = loop {
                tokio::select! {
                    status = child.wait() => break status,
                    changed = kill_rx.changed(), if !killed => {
                        if changed.is_err() {
                            killed = true;
                        } else if *kill_rx.borrow() {
                            killed = true;
                            if let Err(e) = child.kill().await {
                                warn!("failed to kill service process: {}", e);
                            }
                        }
                    }
                }
            };
            let exit = match status {
                Ok(status) => ServiceExit {
                    code: status.code(),
                },
                Err(e) => {
                    warn!("failed to await service exit: {}", e);
                    ServiceExit { code: None }
                }
            };
            let _ = event_tx.send(ServiceEvent::Exited(exit));
        });

        Self {
            events,
            kill: Some(kill_tx),
            exited: None,
        }
    }

    /// Build a handle from a scripted event stream, without a child process.
    /// The channel ends after the scripted events.
    pub fn scripted(script: Vec<ServiceEvent>) -> Self {
        let (event_tx, events) = mpsc::unbounded_channel();
        for event in script {
            let _ = event_tx.send(event);
        }
        Self {
            events,
            kill: None,
            exited: None,
        }
    }

    /// Like [`scripted`](Self::scripted), but keeps the channel open and
    /// returns the sender so more events can be fed in later
    pub fn scripted_open(
        script: Vec<ServiceEvent>,
    ) -> (Self, mpsc::UnboundedSender<ServiceEvent>) {
        let (event_tx, events) = mpsc::unbounded_channel();
        for event in script {
            let _ = event_tx.send(event);
        }
        let handle = Self {
            events,
            kill: None,
            exited: None,
        };
        (handle, event_tx)
    }

    /// Wait for the one-shot ready signal
    ///
    /// Scans output lines in order; the first match wins and later matches
    /// are never considered. Process exit before a match is an explicit
    /// error. When a deadline is given and expires, the process is killed
    /// and the wait fails with a timeout error.
    pub async fn wait_ready(
        &mut self,
        pattern: &ReadyPattern,
        deadline_secs: Option<u64>,
        mut on_line: impl FnMut(&str),
    ) -> Result<ReadyInfo, RunnerError> {
        match deadline_secs {
            Some(secs) => {
                let watched = timeout(
                    Duration::from_secs(secs),
                    Self::watch_for(&mut self.events, &mut self.exited, pattern, &mut on_line),
                )
                .await;
                match watched {
                    Ok(result) => result,
                    Err(_) => {
                        self.request_kill();
                        Err(RunnerError::ReadyTimeout(secs))
                    }
                }
            }
            None => {
                Self::watch_for(&mut self.events, &mut self.exited, pattern, &mut on_line).await
            }
        }
    }

    async fn watch_for(
        events: &mut mpsc::UnboundedReceiver<ServiceEvent>,
        exited: &mut Option<ServiceExit>,
        pattern: &ReadyPattern,
        on_line: &mut impl FnMut(&str),
    ) -> Result<ReadyInfo, RunnerError> {
        while let Some(event) = events.recv().await {
            match event {
                ServiceEvent::Line(line) => {
                    on_line(&line);
                    if let Some(url) = pattern.matches(&line) {
                        return Ok(ReadyInfo { url, line });
                    }
                }
                ServiceEvent::Exited(exit) => {
                    *exited = Some(exit.clone());
                    return Err(RunnerError::ExitedBeforeReady {
                        status: exit.describe(),
                    });
                }
            }
        }
        Err(RunnerError::Internal(
            "service output channel closed".to_string(),
        ))
    }

    /// Wait for the service to exit, forwarding output lines as they arrive
    pub async fn wait_exit(&mut self, mut on_line: impl FnMut(&str)) -> ServiceExit {
        if let Some(exit) = &self.exited {
            return exit.clone();
        }
        while let Some(event) = self.events.recv().await {
            match event {
                ServiceEvent::Line(line) => on_line(&line),
                ServiceEvent::Exited(exit) => {
                    self.exited = Some(exit.clone());
                    return exit;
                }
            }
        }
        // Scripted handles may end without an exit event.
        ServiceExit { code: None }
    }

    /// Kill the service and wait for it to exit
    pub async fn terminate(&mut self) -> ServiceExit {
        self.request_kill();
        self.wait_exit(|_| {}).await
    }

    fn request_kill(&self) {
        if let Some(kill) = &self.kill {
            let _ = kill.send(true);
        }
    }
}
