//! Run context - shared state for one pipeline run

use crate::core::config::RecipeConfig;
use std::collections::HashMap;
use std::path::PathBuf;

/// Runtime context shared by the steps of one run
///
/// Holds the resolved paths, the environment-variable map the caller built
/// for the launched process, and values recorded during the run. Credential
/// values only ever enter through `inject_env`; they are never read from the
/// recipe and never serialized.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Name of the recipe this run belongs to
    pub recipe_name: String,

    /// Working directory the application lives in
    pub workdir: PathBuf,

    /// Virtual-environment directory, inside the working directory
    pub env_dir: PathBuf,

    /// Extra environment variables for the launched process, built by the caller
    pub env_vars: HashMap<String, String>,

    /// Values recorded during the run (e.g. "url")
    pub values: HashMap<String, String>,

    /// First readiness-pattern capture, set exactly once when the service is ready
    pub captured: Option<String>,

    /// Outputs from completed steps (step_id -> output)
    pub step_outputs: HashMap<String, String>,

    /// The step currently being executed (if any)
    pub current_step_id: Option<String>,
}

impl RunContext {
    /// Create a context for a recipe, resolving its paths
    pub fn new(recipe: &RecipeConfig) -> Self {
        Self {
            recipe_name: recipe.name.clone(),
            workdir: recipe.workdir_path(),
            env_dir: recipe.env_dir(),
            env_vars: HashMap::new(),
            values: HashMap::new(),
            captured: None,
            step_outputs: HashMap::new(),
            current_step_id: None,
        }
    }

    /// Add an environment variable to the injection map
    pub fn inject_env(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.env_vars.insert(key.into(), value.into());
    }

    /// Record a value under a key
    pub fn set_value(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Get a recorded value
    pub fn get_value(&self, key: &str) -> Option<&String> {
        self.values.get(key)
    }

    /// Record the readiness capture; only the first one sticks
    pub fn record_capture(&mut self, value: String) {
        if self.captured.is_none() {
            self.captured = Some(value);
        }
    }

    /// Set the output of a step
    pub fn set_step_output(&mut self, step_id: &str, output: String) {
        self.step_outputs.insert(step_id.to_string(), output);
    }

    /// Get the output of a step
    pub fn get_step_output(&self, step_id: &str) -> Option<&String> {
        self.step_outputs.get(step_id)
    }
}
