//! Persistence layer for run history

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteRunStore;

use crate::core::context::RunContext;
use crate::core::pipeline::{Pipeline, PipelineKind};
use crate::core::state::RunStatus;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Recorded state of one step within a saved run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    /// Step identifier
    pub id: String,

    /// Terminal-state label: pending, running, completed, failed, skipped
    pub status: String,

    /// Output, error, or skip reason, depending on the status
    pub detail: String,
}

/// Summary of a pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Unique run ID
    pub run_id: Uuid,

    /// Recipe name
    pub recipe: String,

    /// Setup or launch
    pub kind: PipelineKind,

    /// Run status
    pub status: RunStatus,

    /// When the run started
    pub started_at: DateTime<Utc>,

    /// When the run completed (if it has)
    pub completed_at: Option<DateTime<Utc>>,

    /// Recorded service URL, for launch runs that reached readiness
    pub service_url: Option<String>,

    /// Per-step records, in pipeline order
    pub steps: Vec<StepRecord>,

    /// Number of completed steps
    pub completed_steps: usize,

    /// Total number of steps
    pub total_steps: usize,
}

impl RunSummary {
    /// IDs of the steps this run completed, in pipeline order
    ///
    /// A resumed setup run adopts these so finished work is not repeated.
    pub fn completed_step_ids(&self) -> Vec<String> {
        self.steps
            .iter()
            .filter(|s| s.status == "completed")
            .map(|s| s.id.clone())
            .collect()
    }
}

/// Trait for persistence backends
#[async_trait::async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Save a run, replacing any earlier save of the same run
    async fn save_run(&self, run: &RunSummary) -> Result<()>;

    /// Load a run by ID
    async fn load_run(&self, run_id: Uuid) -> Result<Option<RunSummary>>;

    /// List runs, newest first, optionally filtered to one recipe
    async fn list_runs(&self, recipe: Option<&str>, limit: usize) -> Result<Vec<RunSummary>>;

    /// The most recent run of the given kind for a recipe
    async fn latest_run(&self, recipe: &str, kind: PipelineKind) -> Result<Option<RunSummary>>;

    /// List all recipe names with recorded runs
    async fn list_recipes(&self) -> Result<Vec<String>>;
}

/// In-memory persistence (for testing or ephemeral use)
pub struct InMemoryPersistence {
    runs: tokio::sync::RwLock<std::collections::HashMap<Uuid, RunSummary>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self {
            runs: tokio::sync::RwLock::new(std::collections::HashMap::new()),
        }
    }
}

impl Default for InMemoryPersistence {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for InMemoryPersistence {
    async fn save_run(&self, run: &RunSummary) -> Result<()> {
        let mut runs = self.runs.write().await;
        runs.insert(run.run_id, run.clone());
        Ok(())
    }

    async fn load_run(&self, run_id: Uuid) -> Result<Option<RunSummary>> {
        let runs = self.runs.read().await;
        Ok(runs.get(&run_id).cloned())
    }

    async fn list_runs(&self, recipe: Option<&str>, limit: usize) -> Result<Vec<RunSummary>> {
        let runs = self.runs.read().await;
        let mut result: Vec<RunSummary> = runs
            .values()
            .filter(|r| recipe.map_or(true, |name| r.recipe == name))
            .cloned()
            .collect();
        result.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        result.truncate(limit);
        Ok(result)
    }

    async fn latest_run(&self, recipe: &str, kind: PipelineKind) -> Result<Option<RunSummary>> {
        let runs = self.runs.read().await;
        Ok(runs
            .values()
            .filter(|r| r.recipe == recipe && r.kind == kind)
            .max_by_key(|r| r.started_at)
            .cloned())
    }

    async fn list_recipes(&self) -> Result<Vec<String>> {
        let runs = self.runs.read().await;
        let mut names: Vec<String> = runs.values().map(|r| r.recipe.clone()).collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}

/// Create a summary from a pipeline and its run context
pub fn create_summary(pipeline: &Pipeline, ctx: &RunContext) -> RunSummary {
    let steps = pipeline
        .steps
        .iter()
        .map(|step| {
            let detail = match &step.state {
                crate::core::state::StepState::Completed { output, .. } => output.clone(),
                crate::core::state::StepState::Failed { error, .. } => error.clone(),
                crate::core::state::StepState::Skipped { reason } => reason.clone(),
                _ => String::new(),
            };
            StepRecord {
                id: step.id.clone(),
                status: step.state.label().to_string(),
                detail,
            }
        })
        .collect();

    RunSummary {
        run_id: pipeline.state.run_id,
        recipe: pipeline.name.clone(),
        kind: pipeline.kind,
        status: pipeline.state.status,
        started_at: pipeline.state.started_at.unwrap_or_else(Utc::now),
        completed_at: pipeline.state.completed_at,
        service_url: ctx.get_value("url").cloned(),
        steps,
        completed_steps: pipeline.state.completed_steps,
        total_steps: pipeline.state.total_steps,
    }
}
