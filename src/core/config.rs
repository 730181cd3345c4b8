//! Recipe configuration from YAML

use crate::core::step::ReadyPattern;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Top-level recipe configuration loaded from YAML
///
/// A recipe describes one application: where its source lives, how to
/// provision it, how to start it, and how to tell it is ready.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeConfig {
    /// Recipe name
    pub name: String,

    /// Git URL or local path of the application source
    pub repo: String,

    /// Branch to clone; clones are always branch-pinned
    pub branch: String,

    /// Working directory the source is cloned into
    #[serde(default = "default_workdir")]
    pub workdir: String,

    /// Virtual-environment directory name, created inside the working directory
    #[serde(default = "default_env")]
    pub env: String,

    /// Interpreter used to provision the environment
    #[serde(default = "default_python")]
    pub python: String,

    /// Requirements manifest, relative to the working directory
    #[serde(default = "default_requirements")]
    pub requirements: String,

    /// Acceleration install routine run before the requirements
    #[serde(default)]
    pub accelerator: Accelerator,

    /// Extra packages keyed by GPU vendor label; each entry becomes a guarded
    /// step that only runs when the host label matches the key exactly
    #[serde(default)]
    pub gpu_extras: BTreeMap<String, Vec<String>>,

    /// Launch command, executed inside the environment in the working directory
    pub entry: String,

    /// Readiness pattern watched for in service output; capture group 1 (or
    /// the whole match) is the recorded URL
    #[serde(default = "default_ready_pattern")]
    pub ready_pattern: String,

    /// Name of the environment variable injected into the launched process.
    /// The value always comes from the caller at launch time; recipes never
    /// carry credential values.
    #[serde(default = "default_credential_env")]
    pub credential_env: Option<String>,

    /// Whether launch opens the recorded URL in a browser
    #[serde(default = "default_open_browser")]
    pub open_browser: bool,

    /// Optional per-command timeout for setup steps (seconds)
    #[serde(default)]
    pub step_timeout_secs: Option<u64>,

    /// Optional bound on the wait for the readiness signal (seconds)
    #[serde(default)]
    pub ready_timeout_secs: Option<u64>,
}

/// Acceleration install routine selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Accelerator {
    /// Install torch wheels matched to the host GPU vendor
    Torch,
    /// Skip the acceleration step
    None,
}

impl Default for Accelerator {
    fn default() -> Self {
        Accelerator::Torch
    }
}

fn default_workdir() -> String {
    "app".to_string()
}

fn default_env() -> String {
    "env".to_string()
}

fn default_python() -> String {
    "python".to_string()
}

fn default_requirements() -> String {
    "requirements.txt".to_string()
}

fn default_ready_pattern() -> String {
    r"Running on local URL:\s*(http://[^\s]+)".to_string()
}

fn default_credential_env() -> Option<String> {
    Some("HF_TOKEN".to_string())
}

fn default_open_browser() -> bool {
    true
}

impl RecipeConfig {
    /// Load a recipe from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read recipe file {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse a recipe from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: RecipeConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the recipe configuration
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            anyhow::bail!("Recipe name cannot be empty");
        }
        if self.repo.trim().is_empty() {
            anyhow::bail!("Recipe 'repo' cannot be empty");
        }
        if self.branch.trim().is_empty() {
            anyhow::bail!("Recipe 'branch' cannot be empty");
        }
        if self.entry.trim().is_empty() {
            anyhow::bail!("Recipe 'entry' cannot be empty");
        }
        if self.workdir.trim().is_empty() {
            anyhow::bail!("Recipe 'workdir' cannot be empty");
        }
        if self.env.trim().is_empty() {
            anyhow::bail!("Recipe 'env' cannot be empty");
        }
        if self.python.trim().is_empty() {
            anyhow::bail!("Recipe 'python' cannot be empty");
        }
        if self.requirements.trim().is_empty() {
            anyhow::bail!("Recipe 'requirements' cannot be empty");
        }

        // Readiness must never run with a broken pattern, so compilation
        // failures are hard errors here rather than a silent fallback.
        if let Err(e) = ReadyPattern::new(&self.ready_pattern) {
            anyhow::bail!("Invalid ready_pattern '{}': {}", self.ready_pattern, e);
        }

        if let Some(credential) = &self.credential_env {
            if credential.trim().is_empty() {
                anyhow::bail!("Recipe 'credential_env' cannot be an empty string (use null to disable)");
            }
        }

        for (vendor, packages) in &self.gpu_extras {
            if vendor.trim().is_empty() {
                anyhow::bail!("gpu_extras has an entry with an empty vendor label");
            }
            if packages.is_empty() {
                anyhow::bail!("gpu_extras entry '{}' lists no packages", vendor);
            }
            for package in packages {
                if package.trim().is_empty() {
                    anyhow::bail!("gpu_extras entry '{}' contains an empty package name", vendor);
                }
            }
        }

        Ok(())
    }

    /// Compile the readiness pattern (validated, so failures are unexpected)
    pub fn compile_ready_pattern(&self) -> Result<ReadyPattern> {
        ReadyPattern::new(&self.ready_pattern)
            .map_err(|e| anyhow::anyhow!("Invalid ready_pattern '{}': {}", self.ready_pattern, e))
    }

    /// The working directory as a path
    pub fn workdir_path(&self) -> PathBuf {
        PathBuf::from(&self.workdir)
    }

    /// The virtual-environment directory, inside the working directory
    pub fn env_dir(&self) -> PathBuf {
        self.workdir_path().join(&self.env)
    }
}
