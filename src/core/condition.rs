//! Step guard conditions

use crate::core::host::HostContext;
use serde::{Deserialize, Serialize};

/// Condition gating a step on host facts
///
/// Guards are evaluated once per invocation, before the step would run. A
/// step whose guard evaluates false is skipped entirely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Guard {
    /// True when the host GPU vendor label equals the literal, byte for byte
    GpuVendorIs(String),
}

impl Guard {
    /// Evaluate this guard against the host context
    pub fn evaluate(&self, host: &HostContext) -> bool {
        match self {
            Guard::GpuVendorIs(label) => host.gpu == *label,
        }
    }

    /// Human-readable form for skip reasons and logs
    pub fn describe(&self) -> String {
        match self {
            Guard::GpuVendorIs(label) => format!("gpu == \"{}\"", label),
        }
    }
}
