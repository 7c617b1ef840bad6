// Wipe log persistence
//
// The WipeLog is the durable record a finished wipe leaves behind and the
// only hand-off between the wipe stage and the certificate pipeline. The
// writer produces schema version 1.0; the reader is deliberately tolerant
// because real logs come from external tools of different generations
// (textual sizes, naive timestamps, missing blocks).

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::host::{HostFacts, SIMULATED_TOOL_VERSION};
use crate::scan::Device;
use crate::{WipeError, WipeMethod, WipeRequest, WipeResult};

pub const SCHEMA_VERSION: &str = "1.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WipeLog {
    #[serde(default = "default_version")]
    pub version: String,
    pub device: DeviceRecord,
    pub wipe: WipeRecord,
    #[serde(default)]
    pub system: SystemRecord,
    #[serde(default)]
    pub compliance: Option<ComplianceRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub path: String,
    #[serde(default = "unknown")]
    pub name: String,
    #[serde(default = "unknown")]
    pub model: String,
    #[serde(default = "unknown")]
    pub serial: String,
    /// Bytes. Accepts the original tools' textual sizes on read.
    #[serde(default, deserialize_with = "flexible_size")]
    pub size: u64,
    #[serde(default)]
    pub vendor: String,
    #[serde(default = "unknown")]
    pub device_type: String,
}

impl DeviceRecord {
    pub fn from_device(device: &Device) -> Self {
        Self {
            path: device.path.clone(),
            name: device.name.clone(),
            model: device.model.clone(),
            serial: device.serial.clone(),
            size: device.size_bytes,
            vendor: device.vendor.clone(),
            device_type: device.device_type.clone(),
        }
    }

    /// Used when the caller supplied only a device path.
    pub fn placeholder(path: &str) -> Self {
        Self {
            path: path.to_string(),
            name: unknown(),
            model: unknown(),
            serial: unknown(),
            size: 0,
            vendor: String::new(),
            device_type: unknown(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WipeStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WipeRecord {
    pub method: WipeMethod,
    #[serde(default)]
    pub nist_level: String,
    pub status: WipeStatus,
    /// RFC 3339 when written by this crate; kept verbatim on read because
    /// older tools emit naive local timestamps.
    #[serde(default)]
    pub started_at: String,
    #[serde(default)]
    pub finished_at: String,
    #[serde(default)]
    pub passes_completed: u32,
    #[serde(default)]
    pub verified_clean: bool,
    #[serde(default)]
    pub tools_used: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemRecord {
    #[serde(default = "unknown")]
    pub tool_version: String,
    #[serde(default = "unknown")]
    pub platform: String,
    #[serde(default = "unknown_operator")]
    pub operator: String,
    #[serde(default = "unknown")]
    pub hostname: String,
    #[serde(default = "unknown")]
    pub os_version: String,
}

impl Default for SystemRecord {
    fn default() -> Self {
        Self {
            tool_version: unknown(),
            platform: unknown(),
            operator: unknown_operator(),
            hostname: unknown(),
            os_version: unknown(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceRecord {
    #[serde(default)]
    pub nist_800_88: bool,
    #[serde(default)]
    pub dod_5220_22_m: bool,
    #[serde(default)]
    pub certificate_id: String,
}

fn default_version() -> String {
    SCHEMA_VERSION.to_string()
}

fn unknown() -> String {
    "Unknown".to_string()
}

fn unknown_operator() -> String {
    "unknown".to_string()
}

fn flexible_size<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => {
            if let Some(bytes) = n.as_u64() {
                bytes
            } else {
                n.as_f64().map(|f| f.max(0.0) as u64).unwrap_or(0)
            }
        }
        Some(serde_json::Value::String(text)) => {
            crate::scan::parse_size_text(&text).unwrap_or(0)
        }
        _ => 0,
    })
}

impl WipeLog {
    /// Log for a completed simulated wipe. Mirrors what the real tool would
    /// have written, from the request, caller-supplied device metadata and
    /// host facts.
    pub fn synthetic(
        request: &WipeRequest,
        host: &HostFacts,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        let device = match &request.device {
            Some(device) => DeviceRecord::from_device(device),
            None => DeviceRecord::placeholder(&request.device_path),
        };
        WipeLog {
            version: SCHEMA_VERSION.to_string(),
            device,
            wipe: WipeRecord {
                method: request.method,
                nist_level: request.method.nist_level().to_string(),
                status: WipeStatus::Success,
                started_at: started_at.to_rfc3339(),
                finished_at: finished_at.to_rfc3339(),
                passes_completed: request.method.pass_count(),
                verified_clean: true,
                tools_used: request
                    .method
                    .tools_used()
                    .iter()
                    .map(|tool| tool.to_string())
                    .collect(),
            },
            system: SystemRecord {
                tool_version: SIMULATED_TOOL_VERSION.to_string(),
                platform: host.platform.clone(),
                operator: host.operator.clone(),
                hostname: host.hostname.clone(),
                os_version: host.os_version.clone(),
            },
            compliance: Some(ComplianceRecord {
                nist_800_88: true,
                dod_5220_22_m: matches!(request.method, WipeMethod::Purge | WipeMethod::Destroy),
                certificate_id: Uuid::new_v4().to_string(),
            }),
        }
    }

    /// Read the log at `path`. Absence is `Ok(None)`; a file that exists but
    /// cannot be decoded is `WipeLogUnreadable`.
    pub fn try_read(path: &Path) -> WipeResult<Option<WipeLog>> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(WipeError::WipeLogUnreadable {
                    path: path.to_path_buf(),
                    detail: err.to_string(),
                })
            }
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|err| WipeError::WipeLogUnreadable {
                path: path.to_path_buf(),
                detail: err.to_string(),
            })
    }

    /// Write to `preferred`, creating parent directories. If that fails the
    /// log is written under the system temp directory instead so a finished
    /// wipe is never left without a record. Returns the path written.
    pub fn write_with_fallback(&self, preferred: &Path) -> WipeResult<PathBuf> {
        match self.write_to(preferred) {
            Ok(()) => Ok(preferred.to_path_buf()),
            Err(err) => {
                tracing::warn!(
                    path = %preferred.display(),
                    error = %err,
                    "wipe log write failed, retrying in temp dir"
                );
                let name = preferred
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| "wipe_log.json".to_string());
                let fallback = std::env::temp_dir()
                    .join(format!("{}_{}", Utc::now().timestamp_millis(), name));
                self.write_to(&fallback)?;
                Ok(fallback)
            }
        }
    }

    fn write_to(&self, path: &Path) -> WipeResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Log path for a session that did not request one.
pub fn generated_log_path(dir: &Path, device_path: &str) -> PathBuf {
    let safe: String = device_path
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let safe = safe.trim_matches('_');
    dir.join(format!("wipe_{}_{}.json", safe, Utc::now().timestamp_millis()))
}
