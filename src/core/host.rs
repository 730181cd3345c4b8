//! Host environment probing
//!
//! Guards in a recipe compare against the host GPU vendor label. The label
//! comes either from detection (sysfs PCI vendor IDs, then loaded kernel
//! modules, then an `nvidia-smi` probe) or from an operator override, which
//! is kept verbatim so guard comparisons stay case-sensitive.

use serde::{Deserialize, Serialize};
use std::fs;
use std::process::Command;
use tracing::debug;

/// GPU vendor of the host machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Unknown,
}

impl GpuVendor {
    /// Lowercase label used in recipes and guards
    pub fn label(&self) -> &'static str {
        match self {
            GpuVendor::Nvidia => "nvidia",
            GpuVendor::Amd => "amd",
            GpuVendor::Intel => "intel",
            GpuVendor::Unknown => "unknown",
        }
    }

    /// Parse an exact lowercase label; anything else is `Unknown`
    pub fn from_label(label: &str) -> Self {
        match label {
            "nvidia" => GpuVendor::Nvidia,
            "amd" => GpuVendor::Amd,
            "intel" => GpuVendor::Intel,
            _ => GpuVendor::Unknown,
        }
    }
}

/// Detect the host GPU vendor
///
/// Tries PCI vendor IDs under `/sys/class/drm`, then `/proc/modules`, then
/// falls back to probing for `nvidia-smi` on PATH. Returns `Unknown` when
/// nothing matches (including on platforms without sysfs).
pub fn detect_gpu_vendor() -> GpuVendor {
    if let Ok(entries) = fs::read_dir("/sys/class/drm") {
        for entry in entries.flatten() {
            let vendor_path = entry.path().join("device/vendor");
            if let Ok(vendor_id) = fs::read_to_string(&vendor_path) {
                match vendor_id.trim() {
                    "0x10de" => {
                        debug!("GPU vendor from sysfs: nvidia");
                        return GpuVendor::Nvidia;
                    }
                    "0x1002" => {
                        debug!("GPU vendor from sysfs: amd");
                        return GpuVendor::Amd;
                    }
                    "0x8086" => {
                        debug!("GPU vendor from sysfs: intel");
                        return GpuVendor::Intel;
                    }
                    _ => {}
                }
            }
        }
    }

    if let Ok(modules) = fs::read_to_string("/proc/modules") {
        if modules.contains("nvidia ") || modules.contains("nouveau ") {
            debug!("GPU vendor from kernel modules: nvidia");
            return GpuVendor::Nvidia;
        }
        if modules.contains("amdgpu ") || modules.contains("radeon ") {
            debug!("GPU vendor from kernel modules: amd");
            return GpuVendor::Amd;
        }
        if modules.contains("xe ") || modules.contains("i915 ") {
            debug!("GPU vendor from kernel modules: intel");
            return GpuVendor::Intel;
        }
    }

    if command_exists("nvidia-smi") {
        debug!("GPU vendor from nvidia-smi probe: nvidia");
        return GpuVendor::Nvidia;
    }

    debug!("GPU vendor could not be determined");
    GpuVendor::Unknown
}

/// Check whether a command is available on PATH
pub fn command_exists(cmd: &str) -> bool {
    Command::new("which")
        .arg(cmd)
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// Host facts evaluated once per invocation
///
/// `gpu` is the raw label guards compare against; `gpu_vendor` is the parsed
/// vendor used to pick the acceleration install command. An override like
/// `--gpu NVIDIA` keeps its casing in `gpu`, so it does not satisfy a
/// lowercase `nvidia` guard.
#[derive(Debug, Clone)]
pub struct HostContext {
    pub gpu_vendor: GpuVendor,
    pub gpu: String,
}

impl HostContext {
    /// Build from detection
    pub fn detect() -> Self {
        let vendor = detect_gpu_vendor();
        Self {
            gpu_vendor: vendor,
            gpu: vendor.label().to_string(),
        }
    }

    /// Build from an operator-supplied label, kept verbatim
    pub fn with_override(label: &str) -> Self {
        Self {
            gpu_vendor: GpuVendor::from_label(label),
            gpu: label.to_string(),
        }
    }
}

/// Acceleration install command for the given vendor
///
/// Selects the torch wheel index matching the host: CUDA wheels for Nvidia,
/// ROCm wheels for AMD, and the default (CPU) index otherwise. Runs inside
/// the recipe's environment.
pub fn torch_install_command(vendor: GpuVendor) -> String {
    match vendor {
        GpuVendor::Nvidia => {
            "pip install torch torchvision torchaudio --index-url https://download.pytorch.org/whl/cu121"
                .to_string()
        }
        GpuVendor::Amd => {
            "pip install torch torchvision torchaudio --index-url https://download.pytorch.org/whl/rocm6.1"
                .to_string()
        }
        GpuVendor::Intel | GpuVendor::Unknown => {
            "pip install torch torchvision torchaudio".to_string()
        }
    }
}
