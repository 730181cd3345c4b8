//! Scenario-based tests for greenroom

mod helpers;

mod launch_readiness;
mod resume;
mod setup_flow;
