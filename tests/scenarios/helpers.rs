//! Test utility functions for greenroom scenarios

use greenroom::core::config::RecipeConfig;
use greenroom::core::{HostContext, Pipeline, RunContext, RunStatus, StepState};
use greenroom::execution::{ExecutionEngine, ExecutionEvent};
use greenroom::runner::{
    CommandOutput, CommandRunner, CommandSpec, RunnerError, ServiceEvent, ServiceHandle,
};

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedSender;

/// Mock command runner with scripted results
///
/// Commands succeed with empty output unless a scripted result is queued.
/// Every spec the engine sends is recorded for later inspection.
#[derive(Clone, Default)]
pub struct MockRunner {
    results: Arc<Mutex<VecDeque<Result<CommandOutput, RunnerError>>>>,
    service_events: Arc<Mutex<Vec<ServiceEvent>>>,
    seen: Arc<Mutex<Vec<CommandSpec>>>,
    silent: Arc<Mutex<bool>>,
    held_sender: Arc<Mutex<Option<UnboundedSender<ServiceEvent>>>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a scripted result for the next command
    pub fn push_result(&self, result: Result<CommandOutput, RunnerError>) {
        self.results.lock().unwrap().push_back(result);
    }

    /// Script the line/exit events a spawned service will produce
    pub fn with_service(self, events: Vec<ServiceEvent>) -> Self {
        *self.service_events.lock().unwrap() = events;
        self
    }

    /// Spawned services stay alive but never produce any output
    pub fn with_silent_service(self) -> Self {
        *self.silent.lock().unwrap() = true;
        self
    }

    /// Command strings the engine ran, in order
    pub fn seen_commands(&self) -> Vec<String> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .map(|spec| spec.command.clone())
            .collect()
    }

    /// Full specs the engine ran, in order
    pub fn seen_specs(&self) -> Vec<CommandSpec> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, RunnerError> {
        self.seen.lock().unwrap().push(spec.clone());
        match self.results.lock().unwrap().pop_front() {
            Some(result) => result,
            None => Ok(CommandOutput::default()),
        }
    }

    async fn spawn_service(&self, spec: &CommandSpec) -> Result<ServiceHandle, RunnerError> {
        self.seen.lock().unwrap().push(spec.clone());

        if *self.silent.lock().unwrap() {
            let (handle, sender) = ServiceHandle::scripted_open(Vec::new());
            *self.held_sender.lock().unwrap() = Some(sender);
            return Ok(handle);
        }

        let events = std::mem::take(&mut *self.service_events.lock().unwrap());
        Ok(ServiceHandle::scripted(events))
    }
}

/// Run a prepared pipeline with a mock runner, collecting events
pub async fn run_pipeline(
    pipeline: &mut Pipeline,
    recipe: &RecipeConfig,
    host: HostContext,
    runner: MockRunner,
) -> RunResult {
    let mut engine = ExecutionEngine::new(
        runner,
        host,
        recipe.compile_ready_pattern().unwrap(),
        recipe.ready_timeout_secs,
    );

    let events: Arc<Mutex<Vec<ExecutionEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    engine.add_event_handler(move |event| sink.lock().unwrap().push(event));

    let mut ctx = RunContext::new(recipe);
    let service = engine.execute(pipeline, &mut ctx).await;
    let events = events.lock().unwrap().clone();

    RunResult {
        pipeline: pipeline.clone(),
        ctx,
        events,
        service,
    }
}

/// Outcome of a pipeline run under test
pub struct RunResult {
    pub pipeline: Pipeline,
    pub ctx: RunContext,
    pub events: Vec<ExecutionEvent>,
    pub service: Option<ServiceHandle>,
}

impl RunResult {
    /// Check if the run completed successfully
    pub fn is_success(&self) -> bool {
        matches!(self.pipeline.state.status, RunStatus::Completed)
    }

    /// Check if the run is still live (launch daemon supervision)
    pub fn is_running(&self) -> bool {
        matches!(self.pipeline.state.status, RunStatus::Running)
    }

    /// Check if the run failed
    pub fn is_failed(&self) -> bool {
        matches!(self.pipeline.state.status, RunStatus::Failed)
    }

    /// Get the state of a specific step
    pub fn step_state(&self, step_id: &str) -> Option<&StepState> {
        self.pipeline.step(step_id).map(|s| &s.state)
    }

    /// The URL recorded from service output, if any
    pub fn captured_url(&self) -> Option<&String> {
        self.ctx.get_value("url")
    }

    /// Get completed steps in declaration order
    pub fn completed_steps(&self) -> Vec<String> {
        self.pipeline
            .steps
            .iter()
            .filter(|s| matches!(s.state, StepState::Completed { .. }))
            .map(|s| s.id.clone())
            .collect()
    }

    /// Get failed steps
    pub fn failed_steps(&self) -> Vec<String> {
        self.pipeline
            .steps
            .iter()
            .filter(|s| matches!(s.state, StepState::Failed { .. }))
            .map(|s| s.id.clone())
            .collect()
    }

    /// Get skipped steps
    pub fn skipped_steps(&self) -> Vec<String> {
        self.pipeline
            .steps
            .iter()
            .filter(|s| matches!(s.state, StepState::Skipped { .. }))
            .map(|s| s.id.clone())
            .collect()
    }

    /// Get a summary of the result
    pub fn summary(&self) -> String {
        format!(
            "{:?} - {} completed, {} failed, {} skipped",
            self.pipeline.state.status,
            self.completed_steps().len(),
            self.failed_steps().len(),
            self.skipped_steps().len()
        )
    }
}

/// Assert a step completed and check its recorded output
pub fn assert_step_completed(result: &RunResult, step_id: &str, expected_output: &str) {
    let step = result
        .pipeline
        .step(step_id)
        .unwrap_or_else(|| panic!("Step '{}' not found in result", step_id));

    let output = match &step.state {
        StepState::Completed { output, .. } => output.clone(),
        other => panic!(
            "Step '{}' should be completed, but was in state: {:?}",
            step_id, other
        ),
    };

    assert!(
        output.contains(expected_output),
        "Step '{}' output:\n{}\n\ndoes not contain:\n{}",
        step_id,
        output,
        expected_output
    );
}

/// Assert a step failed with a specific message
pub fn assert_step_failed(result: &RunResult, step_id: &str, expected_error: &str) {
    let step = result
        .pipeline
        .step(step_id)
        .unwrap_or_else(|| panic!("Step '{}' not found in result", step_id));

    let error = match &step.state {
        StepState::Failed { error, .. } => error.clone(),
        other => panic!(
            "Step '{}' should have failed, but was in state: {:?}",
            step_id, other
        ),
    };

    assert!(
        error.contains(expected_error),
        "Step '{}' error:\n{}\n\ndoes not contain:\n{}",
        step_id,
        error,
        expected_error
    );
}

/// Assert a step was skipped with a specific reason
pub fn assert_step_skipped(result: &RunResult, step_id: &str, expected_reason: &str) {
    let step = result
        .pipeline
        .step(step_id)
        .unwrap_or_else(|| panic!("Step '{}' not found in result", step_id));

    let reason = match &step.state {
        StepState::Skipped { reason } => reason.clone(),
        other => panic!(
            "Step '{}' should have been skipped, but was in state: {:?}",
            step_id, other
        ),
    };

    assert!(
        reason.contains(expected_reason),
        "Step '{}' skip reason:\n{}\n\ndoes not contain:\n{}",
        step_id,
        reason,
        expected_reason
    );
}

/// Assert a step was never reached
pub fn assert_step_pending(result: &RunResult, step_id: &str) {
    let step = result
        .pipeline
        .step(step_id)
        .unwrap_or_else(|| panic!("Step '{}' not found in result", step_id));

    assert!(
        matches!(step.state, StepState::Pending),
        "Step '{}' should be pending, but was in state: {:?}",
        step_id,
        step.state
    );
}

/// Assert the run completed successfully
pub fn assert_run_completed(result: &RunResult) {
    assert!(
        result.is_success(),
        "Run should be completed, but was: {}",
        result.summary()
    );
}

/// Assert the run failed
pub fn assert_run_failed(result: &RunResult) {
    assert!(
        result.is_failed(),
        "Run should have failed, but was: {}",
        result.summary()
    );
}

/// Parse a recipe from YAML, panicking on invalid input
pub fn recipe_from_yaml(yaml: &str) -> RecipeConfig {
    RecipeConfig::from_yaml(yaml)
        .unwrap_or_else(|e| panic!("Failed to parse recipe YAML: {}", e))
}

/// A full-featured recipe rooted at the given working directory
pub fn recipe_yaml(name: &str, workdir: &str) -> String {
    format!(
        r#"
name: "{}"
repo: "https://github.com/example/demo-app.git"
branch: "main"
entry: "python app.py"
workdir: "{}"
open_browser: false
gpu_extras:
  nvidia:
    - bitsandbytes
"#,
        name, workdir
    )
}

/// A unique scratch directory path for one test
pub fn temp_workdir(tag: &str) -> String {
    format!("/tmp/greenroom-scenario-{}-{}", tag, std::process::id())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_runner_defaults_to_success() {
        let runner = MockRunner::new();
        let spec = CommandSpec::new("echo hello");

        let output = runner.run(&spec).await.unwrap();

        assert_eq!(output.stdout, "");
        assert_eq!(runner.seen_commands(), vec!["echo hello"]);
    }

    #[tokio::test]
    async fn test_mock_runner_plays_scripted_results() {
        let runner = MockRunner::new();
        runner.push_result(Err(RunnerError::NonZeroExit {
            status: "exit status: 1".to_string(),
            stderr: "boom".to_string(),
        }));

        let spec = CommandSpec::new("false");
        let err = runner.run(&spec).await.unwrap_err();
        assert!(err.to_string().contains("boom"));

        // Queue exhausted, back to succeeding
        assert!(runner.run(&spec).await.is_ok());
    }

    #[tokio::test]
    async fn test_run_pipeline_collects_events_in_order() {
        let workdir = temp_workdir("helpers-events");
        let recipe = recipe_from_yaml(&recipe_yaml("events", &workdir));
        let host = HostContext::with_override("nvidia");
        let mut pipeline = Pipeline::setup(&recipe, &host);

        let result = run_pipeline(&mut pipeline, &recipe, host, MockRunner::new()).await;

        assert_run_completed(&result);
        assert!(matches!(
            result.events.first(),
            Some(ExecutionEvent::PipelineStarted { .. })
        ));
        assert!(matches!(
            result.events.last(),
            Some(ExecutionEvent::PipelineCompleted {
                status: RunStatus::Completed,
                ..
            })
        ));
    }
}
