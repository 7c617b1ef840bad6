// Device discovery
//
// Runs the scan tool (`--list --json`) and normalizes its report into
// `Device` records. The two tool generations disagree on the size field
// (lsblk-style text vs a gigabyte float), so deserialization accepts both
// and normalizes to bytes. Without a scan tool the scanner returns the
// deterministic mock device so the rest of the pipeline stays exercisable.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

use crate::process::{CommandSpec, ProcessRunner};
use crate::tools::ToolMode;
use crate::{Platform, WipeError, WipeResult};

/// One discovered storage device. Produced fresh per scan; identity is the
/// path only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Device {
    pub path: String,
    pub name: String,
    pub size_bytes: u64,
    pub serial: String,
    pub model: String,
    pub vendor: String,
    pub removable: bool,
    pub device_type: String,
}

// Accepts every field shape the known scan tools emit. `size_bytes` wins,
// then `size_gb`, then textual `size`.
#[derive(Deserialize)]
struct RawDevice {
    path: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    size_bytes: Option<u64>,
    #[serde(default)]
    size_gb: Option<f64>,
    #[serde(default)]
    size: Option<serde_json::Value>,
    #[serde(default)]
    serial: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    vendor: Option<String>,
    #[serde(default)]
    removable: Option<bool>,
    #[serde(default)]
    device_type: Option<String>,
}

impl RawDevice {
    fn normalize(self) -> Device {
        let size_bytes = if let Some(bytes) = self.size_bytes {
            bytes
        } else if let Some(gb) = self.size_gb {
            (gb * 1_000_000_000.0) as u64
        } else {
            match self.size {
                Some(serde_json::Value::Number(n)) => n.as_u64().unwrap_or(0),
                Some(serde_json::Value::String(text)) => match parse_size_text(&text) {
                    Some(bytes) => bytes,
                    None => {
                        tracing::warn!(path = %self.path, size = %text, "unparseable device size");
                        0
                    }
                },
                _ => 0,
            }
        };

        let model = self.model.unwrap_or_else(|| "Unknown".to_string());
        let name = self
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| model.clone());
        Device {
            path: self.path,
            name,
            size_bytes,
            serial: self.serial.unwrap_or_else(|| "Unknown".to_string()),
            model,
            vendor: self.vendor.unwrap_or_default(),
            removable: self.removable.unwrap_or(false),
            device_type: self.device_type.unwrap_or_else(|| "Unknown".to_string()),
        }
    }
}

impl<'de> Deserialize<'de> for Device {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(RawDevice::deserialize(deserializer)?.normalize())
    }
}

/// lsblk-style size text, e.g. "14.9G", "1,8T", "500M". lsblk prints binary
/// units, so K/M/G/T are powers of 1024.
pub(crate) fn parse_size_text(text: &str) -> Option<u64> {
    lazy_static! {
        static ref SIZE_RE: Regex =
            Regex::new(r"(?i)^([0-9]+(?:[.,][0-9]+)?)\s*([KMGTP])?(?:I?B)?$").unwrap();
    }
    let caps = SIZE_RE.captures(text.trim())?;
    let value: f64 = caps[1].replace(',', ".").parse().ok()?;
    let multiplier = match caps.get(2) {
        None => 1.0,
        Some(unit) => match unit.as_str().to_ascii_uppercase().as_str() {
            "K" => 1024f64,
            "M" => 1024f64.powi(2),
            "G" => 1024f64.powi(3),
            "T" => 1024f64.powi(4),
            "P" => 1024f64.powi(5),
            _ => return None,
        },
    };
    Some((value * multiplier) as u64)
}

// Scan tool report. `count` and any timestamp/platform fields are advisory.
#[derive(Deserialize)]
struct ScanReport {
    devices: Vec<Device>,
}

/// Result of one scan, with the mode it ran under.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub devices: Vec<Device>,
    pub mock: bool,
}

/// The device every simulated scan reports.
pub fn mock_device(platform: Platform) -> Device {
    let path = match platform {
        Platform::Unix => "/dev/sdz",
        Platform::Windows => r"\\.\PhysicalDrive9",
    };
    Device {
        path: path.to_string(),
        name: "Mock USB Drive".to_string(),
        size_bytes: 16_000_000_000,
        serial: "MOCK123".to_string(),
        model: "USB Drive".to_string(),
        vendor: "Mock".to_string(),
        removable: true,
        device_type: "Removable".to_string(),
    }
}

pub struct DeviceScanner {
    mode: ToolMode,
    platform: Platform,
}

impl DeviceScanner {
    pub fn new(mode: ToolMode, platform: Platform) -> Self {
        Self { mode, platform }
    }

    /// Discover devices. Real mode shells out to the scan tool; simulated
    /// mode reports the single mock device. Exit 0 with unparseable stdout is
    /// an error, never an empty or fabricated device list.
    pub async fn scan(&self) -> WipeResult<ScanOutcome> {
        let spec = match &self.mode {
            ToolMode::Simulated => {
                tracing::info!("no scan tool installed, reporting mock device");
                return Ok(ScanOutcome {
                    devices: vec![mock_device(self.platform)],
                    mock: true,
                });
            }
            ToolMode::Real(spec) => spec,
        };

        let command = CommandSpec::new(&spec.path).args(["--list", "--json"]);
        let output = ProcessRunner::spawn(&command)?.collect().await;

        if !output.exit.success() {
            return Err(WipeError::NonZeroExit {
                tool: spec.path.display().to_string(),
                code: output.exit.code_or_signal(),
                diagnostic: output.diagnostic(),
            });
        }

        let devices = parse_scan_output(&output.stdout)?;
        tracing::info!(count = devices.len(), "scan complete");
        Ok(ScanOutcome {
            devices,
            mock: false,
        })
    }
}

pub(crate) fn parse_scan_output(stdout: &str) -> WipeResult<Vec<Device>> {
    serde_json::from_str::<ScanReport>(stdout.trim())
        .map(|report| report.devices)
        .map_err(|err| {
            let snippet: String = stdout.trim().chars().take(120).collect();
            WipeError::ScanResultMalformed(format!("{err}; output began: {snippet:?}"))
        })
}
