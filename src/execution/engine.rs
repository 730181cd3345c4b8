//! Main execution engine - orchestrates the entire pipeline run

use crate::{
    core::{
        context::RunContext,
        host::HostContext,
        pipeline::{Pipeline, PipelineKind},
        state::{LaunchPhase, RunStatus, StepState},
        step::{Action, FailureMode, ReadyPattern},
    },
    execution::{StepExecutor, StepOutcome},
    runner::{CommandRunner, ServiceHandle},
};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Events that can occur during pipeline execution
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    PipelineStarted {
        run_id: Uuid,
        pipeline_name: String,
        kind: PipelineKind,
    },
    StepStarted {
        step_id: String,
    },
    StepOutput {
        step_id: String,
        output: String,
    },
    StepCompleted {
        step_id: String,
    },
    StepSkipped {
        step_id: String,
        reason: String,
    },
    StepFailed {
        step_id: String,
        error: String,
    },
    /// One line of live service output
    ServiceLine {
        line: String,
    },
    /// The readiness machine moved to a new phase
    PhaseChanged {
        phase: LaunchPhase,
    },
    /// The one-shot readiness signal fired
    ServiceReady {
        url: String,
    },
    PipelineCompleted {
        run_id: Uuid,
        status: RunStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Main pipeline execution engine
///
/// Runs steps strictly in order. Service steps are driven here rather than in
/// the step executor so the readiness phases and live output stay observable
/// through events.
pub struct ExecutionEngine<R> {
    executor: StepExecutor<R>,
    host: HostContext,
    ready_pattern: ReadyPattern,
    ready_timeout_secs: Option<u64>,
    event_handlers: Vec<EventHandler>,
}

impl<R: CommandRunner> ExecutionEngine<R> {
    pub fn new(
        runner: R,
        host: HostContext,
        ready_pattern: ReadyPattern,
        ready_timeout_secs: Option<u64>,
    ) -> Self {
        Self {
            executor: StepExecutor::new(runner),
            host,
            ready_pattern,
            ready_timeout_secs,
            event_handlers: Vec::new(),
        }
    }

    /// Add an event handler; handlers are registered before execution starts
    pub fn add_event_handler<F>(&mut self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.event_handlers.push(Arc::new(handler));
    }

    /// Emit an event to all handlers
    fn emit_event(&self, event: ExecutionEvent) {
        for handler in &self.event_handlers {
            handler(event.clone());
        }
    }

    /// Execute the entire pipeline
    ///
    /// Returns the service handle when the run ends in a supervised daemon;
    /// the pipeline state carries success or failure either way.
    pub async fn execute(
        &self,
        pipeline: &mut Pipeline,
        ctx: &mut RunContext,
    ) -> Option<ServiceHandle> {
        let run_id = pipeline.state.run_id;
        let pipeline_name = pipeline.name.clone();

        info!(
            "Starting {} run: {} ({})",
            pipeline.kind.label(),
            pipeline_name,
            run_id
        );
        self.emit_event(ExecutionEvent::PipelineStarted {
            run_id,
            pipeline_name: pipeline_name.clone(),
            kind: pipeline.kind,
        });

        pipeline.state.start(pipeline.steps.len());
        pipeline.sync_counts();

        let mut service: Option<ServiceHandle> = None;

        loop {
            let Some(step) = pipeline.next_step().cloned() else {
                break;
            };
            let step_id = step.id.clone();

            if let Some(guard) = &step.guard {
                if !guard.evaluate(&self.host) {
                    let reason = format!("guard not met: {}", guard.describe());
                    info!("Skipping step {}: {}", step_id, reason);
                    if let Some(s) = pipeline.step_mut(&step_id) {
                        s.state = StepState::Skipped {
                            reason: reason.clone(),
                        };
                    }
                    self.emit_event(ExecutionEvent::StepSkipped { step_id, reason });
                    pipeline.sync_counts();
                    continue;
                }
            }

            if let Some(s) = pipeline.step_mut(&step_id) {
                s.state = StepState::Running {
                    started_at: chrono::Utc::now(),
                };
            }
            ctx.current_step_id = Some(step_id.clone());
            self.emit_event(ExecutionEvent::StepStarted {
                step_id: step_id.clone(),
            });

            let outcome = match &step.action {
                Action::Serve { command } => {
                    match self.start_service(command, pipeline, ctx).await {
                        Ok((handle, url)) => {
                            service = Some(handle);
                            StepOutcome::Success {
                                output: format!("service ready at {}", url),
                            }
                        }
                        Err(error) => StepOutcome::Failed { error },
                    }
                }
                _ => self.executor.execute(&step, ctx).await,
            };

            match outcome {
                StepOutcome::Success { output } => {
                    self.mark_step_success(pipeline, ctx, &step_id, output);
                }
                StepOutcome::Recovered { note } => {
                    info!("Step {} already satisfied: {}", step_id, note);
                    self.mark_step_success(pipeline, ctx, &step_id, note);
                }
                StepOutcome::Failed { error } => match step.on_failure {
                    FailureMode::Continue => {
                        warn!("Step {} failed ({}), continuing", step_id, error);
                        self.mark_step_failed(pipeline, &step_id, error);
                    }
                    FailureMode::Fatal => {
                        self.mark_step_failed(pipeline, &step_id, error);
                        pipeline.state.fail();
                        break;
                    }
                },
            }
        }

        ctx.current_step_id = None;
        pipeline.sync_counts();

        if pipeline.has_failed() {
            if let Some(mut handle) = service.take() {
                warn!("Run failed after service start, stopping service");
                handle.terminate().await;
            }
            info!("{} run failed: {}", pipeline.kind.label(), pipeline_name);
            self.emit_event(ExecutionEvent::PipelineCompleted {
                run_id,
                status: RunStatus::Failed,
            });
            return None;
        }

        let status = if pipeline.daemon && service.is_some() {
            // The run stays live until the supervised service exits
            self.set_phase(pipeline, LaunchPhase::Running);
            RunStatus::Running
        } else {
            pipeline.state.complete();
            RunStatus::Completed
        };

        info!(
            "{} run finished: {} - {:?}",
            pipeline.kind.label(),
            pipeline_name,
            status
        );
        self.emit_event(ExecutionEvent::PipelineCompleted { run_id, status });

        service
    }

    /// Spawn the service and watch its output for the readiness signal
    ///
    /// The first matching line wins and later matches are never considered.
    /// Exit before a match and a missed deadline both surface as step errors.
    async fn start_service(
        &self,
        command: &str,
        pipeline: &mut Pipeline,
        ctx: &mut RunContext,
    ) -> Result<(ServiceHandle, String), String> {
        self.set_phase(pipeline, LaunchPhase::Starting);
        let mut handle = self
            .executor
            .spawn_service(command, ctx)
            .await
            .map_err(|e| e.to_string())?;

        self.set_phase(pipeline, LaunchPhase::Watching);
        let ready = handle
            .wait_ready(&self.ready_pattern, self.ready_timeout_secs, |line| {
                self.emit_event(ExecutionEvent::ServiceLine {
                    line: line.to_string(),
                });
            })
            .await
            .map_err(|e| e.to_string())?;

        self.set_phase(pipeline, LaunchPhase::Ready);
        ctx.record_capture(ready.url.clone());
        info!("Service ready at {}", ready.url);
        self.emit_event(ExecutionEvent::ServiceReady {
            url: ready.url.clone(),
        });

        Ok((handle, ready.url))
    }

    fn set_phase(&self, pipeline: &mut Pipeline, phase: LaunchPhase) {
        pipeline.state.set_phase(phase);
        self.emit_event(ExecutionEvent::PhaseChanged { phase });
    }

    /// Mark a step as completed successfully
    fn mark_step_success(
        &self,
        pipeline: &mut Pipeline,
        ctx: &mut RunContext,
        step_id: &str,
        output: String,
    ) {
        if let Some(step) = pipeline.step_mut(step_id) {
            let started_at = match &step.state {
                StepState::Running { started_at } => *started_at,
                _ => chrono::Utc::now(),
            };
            step.state = StepState::Completed {
                output: output.clone(),
                started_at,
                completed_at: chrono::Utc::now(),
            };
        }
        ctx.set_step_output(step_id, output.clone());

        self.emit_event(ExecutionEvent::StepOutput {
            step_id: step_id.to_string(),
            output,
        });
        self.emit_event(ExecutionEvent::StepCompleted {
            step_id: step_id.to_string(),
        });
        pipeline.sync_counts();
    }

    /// Mark a step as failed
    fn mark_step_failed(&self, pipeline: &mut Pipeline, step_id: &str, error: String) {
        if let Some(step) = pipeline.step_mut(step_id) {
            let started_at = match &step.state {
                StepState::Running { started_at } => *started_at,
                _ => chrono::Utc::now(),
            };
            step.state = StepState::Failed {
                error: error.clone(),
                started_at,
                failed_at: chrono::Utc::now(),
            };
        }

        self.emit_event(ExecutionEvent::StepFailed {
            step_id: step_id.to_string(),
            error,
        });
        pipeline.sync_counts();
    }
}
