// Host facts and privilege checks
//
// Supplies the system block of synthetic wipe logs and the platform-info /
// doctor CLI output. All lookups degrade to "Unknown" rather than failing:
// a wipe must not abort because a hostname lookup did.

use serde::Serialize;
use sysinfo::System;

use crate::Platform;

/// Version string recorded in synthetic wipe logs.
pub const SIMULATED_TOOL_VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "-sim");

/// True when running with root privileges.
#[cfg(unix)]
pub fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
pub fn is_root() -> bool {
    // elevation is re-checked by the tools themselves on Windows
    true
}

pub fn required_privilege(platform: Platform) -> &'static str {
    match platform {
        Platform::Unix => "Root",
        Platform::Windows => "Administrator",
    }
}

/// Facts about the machine the orchestrator runs on.
#[derive(Debug, Clone, Serialize)]
pub struct HostFacts {
    pub platform: String,
    pub os_version: String,
    pub kernel_version: String,
    pub hostname: String,
    pub operator: String,
}

impl HostFacts {
    /// Collect host facts. `operator` overrides the login-name lookup, for
    /// configs that pin the responsible operator.
    pub fn collect(operator: Option<&str>) -> Self {
        Self {
            platform: System::name().unwrap_or_else(|| std::env::consts::OS.to_string()),
            os_version: System::long_os_version().unwrap_or_else(unknown),
            kernel_version: System::kernel_version().unwrap_or_else(unknown),
            hostname: System::host_name().unwrap_or_else(unknown),
            operator: operator
                .map(str::to_string)
                .or_else(|| std::env::var("USER").ok())
                .or_else(|| std::env::var("USERNAME").ok())
                .unwrap_or_else(|| "unknown".to_string()),
        }
    }
}

fn unknown() -> String {
    "Unknown".to_string()
}

/// Full report for the `platform-info` and `doctor` commands.
#[derive(Debug, Clone, Serialize)]
pub struct HostReport {
    #[serde(flatten)]
    pub facts: HostFacts,
    pub timestamp: String,
    pub is_admin: bool,
    pub required_privilege: &'static str,
}

pub fn host_report(operator: Option<&str>) -> HostReport {
    HostReport {
        facts: HostFacts::collect(operator),
        timestamp: chrono::Utc::now().to_rfc3339(),
        is_admin: is_root(),
        required_privilege: required_privilege(Platform::current()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_override_wins() {
        let facts = HostFacts::collect(Some("auditor-7"));
        assert_eq!(facts.operator, "auditor-7");
    }

    #[test]
    fn facts_have_no_empty_fields() {
        let facts = HostFacts::collect(None);
        assert!(!facts.platform.is_empty());
        assert!(!facts.os_version.is_empty());
        assert!(!facts.hostname.is_empty());
        assert!(!facts.operator.is_empty());
    }

    #[test]
    fn report_names_the_right_privilege() {
        let report = host_report(None);
        if cfg!(windows) {
            assert_eq!(report.required_privilege, "Administrator");
        } else {
            assert_eq!(report.required_privilege, "Root");
        }
    }

    #[test]
    fn report_serializes_flat() {
        let report = host_report(Some("op"));
        let value = serde_json::to_value(&report).unwrap();
        assert!(value.get("operator").is_some());
        assert!(value.get("is_admin").is_some());
        assert!(value.get("timestamp").is_some());
    }
}
