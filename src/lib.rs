//! greenroom - one-command installer and launcher for self-hosted AI web apps

pub mod cli;
pub mod core;
pub mod execution;
pub mod persistence;
pub mod runner;

// Re-export commonly used types
pub use crate::core::config::RecipeConfig;
pub use crate::core::{HostContext, Pipeline, PipelineKind, RunContext, RunStatus, Step, StepState};
pub use execution::{ExecutionEngine, ExecutionEvent};
pub use runner::{CommandRunner, CommandSpec, ServiceEvent, ServiceExit, ServiceHandle, ShellRunner};
