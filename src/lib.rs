pub mod certificate;
pub mod config;
pub mod history;
pub mod host;
pub mod process;
pub mod safety;
pub mod scan;
pub mod session;
pub mod tools;
pub mod ui;
pub mod wipe_log;
pub mod wipe_orchestrator;

// Re-export the orchestrator and the types every caller touches
pub use scan::Device;
pub use session::{SessionOutcome, WipeEvent, WipeSessionHandle};
pub use wipe_orchestrator::WipeOrchestrator;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

// Global flag for handling Ctrl+C interrupts. Once a wipe subprocess is
// running it cannot be safely cancelled; the flag only blocks sessions that
// have not started yet.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Set the interrupt flag (called by signal handler)
pub fn set_interrupted() {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Check if an interrupt has been received
pub fn is_interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Reset the interrupt flag (primarily for testing)
pub fn reset_interrupted() {
    INTERRUPTED.store(false, Ordering::SeqCst);
}

/// NIST 800-88 sanitization tiers understood by the external wipe tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WipeMethod {
    /// Single overwrite pass
    Clear,
    /// Three overwrite passes
    Purge,
    /// Seven overwrite passes (physical destruction is out of tool scope)
    Destroy,
}

impl WipeMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            WipeMethod::Clear => "clear",
            WipeMethod::Purge => "purge",
            WipeMethod::Destroy => "destroy",
        }
    }

    /// Overwrite passes the external tool performs for this method
    pub fn pass_count(&self) -> u32 {
        match self {
            WipeMethod::Clear => 1,
            WipeMethod::Purge => 3,
            WipeMethod::Destroy => 7,
        }
    }

    /// NIST 800-88 assurance level recorded in the wipe log
    pub fn nist_level(&self) -> &'static str {
        self.as_str()
    }

    /// Underlying tools the wipe tool drives for this method
    pub fn tools_used(&self) -> &'static [&'static str] {
        match self {
            WipeMethod::Clear => &["dd"],
            WipeMethod::Purge => &["shred"],
            WipeMethod::Destroy => &["shred", "dd"],
        }
    }
}

impl FromStr for WipeMethod {
    type Err = WipeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "clear" => Ok(WipeMethod::Clear),
            "purge" => Ok(WipeMethod::Purge),
            "destroy" => Ok(WipeMethod::Destroy),
            other => Err(WipeError::InvalidMethod(other.to_string())),
        }
    }
}

impl std::fmt::Display for WipeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Device-naming convention the safety validator applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Unix,
    Windows,
}

impl Platform {
    /// Platform of the running process
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Unix
        }
    }
}

/// External-tool capabilities the orchestrator can delegate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Scan,
    Wipe,
    Certify,
    Verify,
}

impl Capability {
    pub const ALL: [Capability; 4] = [
        Capability::Scan,
        Capability::Wipe,
        Capability::Certify,
        Capability::Verify,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Scan => "scan",
            Capability::Wipe => "wipe",
            Capability::Certify => "certify",
            Capability::Verify => "verify",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-supplied description of one wipe to perform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WipeRequest {
    /// Target device path (e.g. /dev/sdb)
    pub device_path: String,
    pub method: WipeMethod,
    /// Where the wipe log should be written; generated when absent
    pub output_log: Option<PathBuf>,
    /// Device metadata from a prior scan, used to enrich simulated wipe logs
    pub device: Option<scan::Device>,
}

impl WipeRequest {
    pub fn new(device_path: impl Into<String>, method: WipeMethod) -> Self {
        Self {
            device_path: device_path.into(),
            method,
            output_log: None,
            device: None,
        }
    }

    pub fn with_output_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_log = Some(path.into());
        self
    }

    pub fn with_device(mut self, device: scan::Device) -> Self {
        self.device = Some(device);
        self
    }
}

// Error taxonomy for the orchestrator. Validation errors are raised before
// any subprocess is spawned; subprocess failures are reported exactly once as
// the terminal event of the operation that ran them.
#[derive(Error, Debug)]
pub enum WipeError {
    #[error("invalid wipe method {0:?}: expected clear, purge or destroy")]
    InvalidMethod(String),

    #[error("refusing to wipe unsafe target {0:?}")]
    UnsafeTarget(String),

    #[error("a wipe session is already active for {0}")]
    SessionAlreadyActive(String),

    #[error("no {0} tool installed and real mode was required")]
    ToolUnavailable(Capability),

    #[error("permission denied running {tool}: re-run with elevated privileges (sudo)")]
    PermissionDenied { tool: String },

    #[error("failed to start {tool}: {detail}")]
    SpawnFailed { tool: String, detail: String },

    #[error("{tool} exited with code {code}: {diagnostic}")]
    NonZeroExit {
        tool: String,
        code: i32,
        diagnostic: String,
    },

    #[error("scan tool produced unparseable output: {0}")]
    ScanResultMalformed(String),

    #[error("wipe log at {} could not be read: {detail}", .path.display())]
    WipeLogUnreadable { path: PathBuf, detail: String },

    #[error("operation interrupted before the wipe started")]
    Interrupted,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid wipe log: {0}")]
    InvalidLog(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WipeError {
    /// Short enumerated kind carried alongside the free-text diagnostic
    pub fn kind(&self) -> &'static str {
        match self {
            WipeError::InvalidMethod(_) => "InvalidMethod",
            WipeError::UnsafeTarget(_) => "UnsafeTarget",
            WipeError::SessionAlreadyActive(_) => "SessionAlreadyActive",
            WipeError::ToolUnavailable(_) => "ToolUnavailable",
            WipeError::PermissionDenied { .. } => "PermissionDenied",
            WipeError::SpawnFailed { .. } => "SpawnFailed",
            WipeError::NonZeroExit { .. } => "NonZeroExit",
            WipeError::ScanResultMalformed(_) => "ScanResultMalformed",
            WipeError::WipeLogUnreadable { .. } => "WipeLogUnreadable",
            WipeError::Interrupted => "Interrupted",
            WipeError::Config(_) => "Config",
            WipeError::InvalidLog(_) => "InvalidLog",
            WipeError::Io(_) => "Io",
        }
    }
}

pub type WipeResult<T> = Result<T, WipeError>;
