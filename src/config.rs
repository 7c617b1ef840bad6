// Orchestrator configuration
//
// Layered: built-in defaults <- optional config file <- WIPECTL_* environment
// variables. Tool paths may be pinned per capability; otherwise they are
// resolved inside `tool_dir` under their conventional names.

use crate::{Capability, Platform, WipeError, WipeResult};
use directories::ProjectDirs;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Conventional executable names, relative to `tool_dir`
fn default_tool_name(capability: Capability) -> &'static str {
    match capability {
        // The scan and wipe capabilities live in the same external binary
        Capability::Scan | Capability::Wipe => "wipe-tool",
        Capability::Certify => "cert_gen",
        Capability::Verify => "cert_verify",
    }
}

/// Simulated-wipe cadence. Progress advances `step_percent` per tick with a
/// per-tick interval drawn uniformly from [min_tick_ms, max_tick_ms].
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulatedWipeProfile {
    pub step_percent: u8,
    pub min_tick_ms: u64,
    pub max_tick_ms: u64,
}

impl Default for SimulatedWipeProfile {
    fn default() -> Self {
        Self {
            step_percent: 5,
            min_tick_ms: 400,
            max_tick_ms: 800,
        }
    }
}

impl SimulatedWipeProfile {
    pub fn tick_bounds(&self) -> (Duration, Duration) {
        let lo = Duration::from_millis(self.min_tick_ms.min(self.max_tick_ms));
        let hi = Duration::from_millis(self.min_tick_ms.max(self.max_tick_ms));
        (lo, hi)
    }

    /// Fast cadence for tests and demos
    pub fn fast() -> Self {
        Self {
            step_percent: 25,
            min_tick_ms: 1,
            max_tick_ms: 2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Directory searched for external tools under their conventional names
    pub tool_dir: Option<PathBuf>,
    /// Explicit tool paths; each overrides the `tool_dir` lookup
    pub scan_tool: Option<PathBuf>,
    pub wipe_tool: Option<PathBuf>,
    pub certify_tool: Option<PathBuf>,
    pub verify_tool: Option<PathBuf>,
    /// Where generated wipe logs land when the request does not name a path
    pub log_dir: PathBuf,
    /// Where certificate artifacts land
    pub cert_dir: PathBuf,
    /// Operator recorded in wipe logs; defaults to $USER at write time
    pub operator: Option<String>,
    /// Fail with ToolUnavailable instead of falling back to simulated mode
    pub require_real: bool,
    pub platform: Platform,
    pub simulated: SimulatedWipeProfile,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        let (log_dir, cert_dir) = default_data_dirs();
        Self {
            tool_dir: None,
            scan_tool: None,
            wipe_tool: None,
            certify_tool: None,
            verify_tool: None,
            log_dir,
            cert_dir,
            operator: None,
            require_real: false,
            platform: Platform::current(),
            simulated: SimulatedWipeProfile::default(),
        }
    }
}

fn default_data_dirs() -> (PathBuf, PathBuf) {
    match ProjectDirs::from("org", "wipectl", "wipectl") {
        Some(dirs) => (
            dirs.data_dir().join("logs"),
            dirs.data_dir().join("certificates"),
        ),
        None => {
            let tmp = std::env::temp_dir().join("wipectl");
            (tmp.join("logs"), tmp.join("certificates"))
        }
    }
}

impl OrchestratorConfig {
    /// Load configuration: defaults, then an optional file, then WIPECTL_*
    /// environment variables (e.g. WIPECTL_WIPE_TOOL=/opt/bin/wipe-tool).
    pub fn load(file: Option<&Path>) -> WipeResult<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path.to_path_buf()));
        }
        builder = builder.add_source(config::Environment::with_prefix("WIPECTL"));

        let raw = builder
            .build()
            .map_err(|e| WipeError::Config(e.to_string()))?;
        raw.try_deserialize()
            .map_err(|e| WipeError::Config(e.to_string()))
    }

    /// Resolve the configured executable path for a capability, if any
    pub fn tool_path(&self, capability: Capability) -> Option<PathBuf> {
        let explicit = match capability {
            Capability::Scan => self.scan_tool.as_ref(),
            Capability::Wipe => self.wipe_tool.as_ref(),
            Capability::Certify => self.certify_tool.as_ref(),
            Capability::Verify => self.verify_tool.as_ref(),
        };
        if let Some(path) = explicit {
            return Some(path.clone());
        }
        self.tool_dir
            .as_ref()
            .map(|dir| dir.join(default_tool_name(capability)))
    }

    /// Point every capability at one directory (the original install layout
    /// shipped all tools side by side).
    pub fn with_tool_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tool_dir = Some(dir.into());
        self
    }
}
