//! Core domain models
//!
//! This module defines the fundamental data structures that represent
//! recipes, pipelines, steps, and their runtime state.

pub mod condition;
pub mod config;
pub mod context;
pub mod host;
pub mod pipeline;
pub mod state;
pub mod step;

pub use context::*;
pub use host::*;
pub use pipeline::*;
pub use state::*;
pub use step::*;
