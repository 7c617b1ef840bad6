/// Stub external tools
///
/// Each builder returns a small shell script. Installed into a [`ToolDir`]
/// with the executable bit set, the scripts resolve in real mode and speak
/// the line-oriented JSON contracts of the production tools, so the whole
/// subprocess path is testable without any hardware or tool install.
use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use wipectl::config::{OrchestratorConfig, SimulatedWipeProfile};

/// Conventional executable names the registry looks for inside `tool_dir`.
/// Scan and wipe share one binary.
#[allow(dead_code)]
pub const SCAN_WIPE_TOOL: &str = "wipe-tool";
#[allow(dead_code)]
pub const CERTIFY_TOOL: &str = "cert_gen";
#[allow(dead_code)]
pub const VERIFY_TOOL: &str = "cert_verify";

/// Certificate id the stub wipe log and stub certifier agree on.
#[allow(dead_code)]
pub const STUB_CERTIFICATE_ID: &str = "CERT-STUB-0001";

/// Temporary directory standing in for an external-tool install.
pub struct ToolDir {
    dir: TempDir,
}

impl ToolDir {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create tool dir"),
        }
    }

    #[allow(dead_code)]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `script` under `name` and mark it executable.
    #[allow(dead_code)]
    pub fn install(&self, name: &str, script: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, script).expect("write stub tool");
        mark_executable(&path);
        path
    }

    /// Config resolving every capability inside this directory, with log and
    /// certificate output redirected under `data_dir`.
    pub fn config(&self, data_dir: &Path) -> OrchestratorConfig {
        let mut config = OrchestratorConfig::default().with_tool_dir(self.dir.path());
        config.log_dir = data_dir.join("logs");
        config.cert_dir = data_dir.join("certs");
        config.simulated = SimulatedWipeProfile::fast();
        config
    }
}

/// Config with no tools configured at all: every capability simulated.
#[allow(dead_code)]
pub fn simulated_config(data_dir: &Path) -> OrchestratorConfig {
    let mut config = OrchestratorConfig::default();
    config.log_dir = data_dir.join("logs");
    config.cert_dir = data_dir.join("certs");
    config.simulated = SimulatedWipeProfile::fast();
    config
}

#[cfg(unix)]
fn mark_executable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path).expect("stat stub tool").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).expect("chmod stub tool");
}

#[cfg(not(unix))]
fn mark_executable(_path: &Path) {}

/// Scan tool printing `report_json` on stdout, exit 0.
#[allow(dead_code)]
pub fn scan_script(report_json: &str) -> String {
    format!("#!/bin/sh\ncat <<'REPORT'\n{report_json}\nREPORT\n")
}

/// Scan tool that dies without producing a report.
#[allow(dead_code)]
pub fn scan_script_failing(code: i32, stderr_line: &str) -> String {
    format!("#!/bin/sh\necho '{stderr_line}' >&2\nexit {code}\n")
}

/// Scan tool that exits 0 but prints something that is not JSON.
#[allow(dead_code)]
pub fn scan_script_garbage() -> &'static str {
    "#!/bin/sh\necho 'device listing unavailable'\n"
}

/// Wipe tool honoring the full contract: progress lines on stdout and a
/// parseable wipe log written to the `--output` path.
#[allow(dead_code)]
pub fn wipe_script_ok() -> &'static str {
    r#"#!/bin/sh
while [ $# -gt 0 ]; do
  case "$1" in
    --device) DEVICE="$2"; shift ;;
    --method) METHOD="$2"; shift ;;
    --output) OUT="$2"; shift ;;
  esac
  shift
done
echo '{"progress": 20, "message": "Pass 1/1"}'
echo '{"progress": 60}'
echo '{"message": "flushing device caches"}'
echo '{"progress": 100, "message": "complete"}'
cat > "$OUT" <<LOG
{"version": "1.0",
 "device": {"path": "$DEVICE", "name": "Stub Drive", "serial": "STUB-0001"},
 "wipe": {"method": "$METHOD", "nist_level": "$METHOD", "status": "success",
          "started_at": "2025-01-01T00:00:00Z", "finished_at": "2025-01-01T00:00:05Z",
          "passes_completed": 1},
 "system": {"tool_version": "stub-tool 1.0"},
 "compliance": {"nist_800_88": true, "certificate_id": "CERT-STUB-0001"}}
LOG
exit 0
"#
}

/// Wipe tool that reports an error line, leaves diagnostics on stderr and
/// dies mid-run. Never writes a log.
#[allow(dead_code)]
pub fn wipe_script_failing() -> &'static str {
    r#"#!/bin/sh
echo '{"progress": 10, "message": "Pass 1/3"}'
echo '{"error": "write failure at sector 2048"}'
echo 'ioctl: Input/output error' >&2
echo 'aborting wipe' >&2
exit 3
"#
}

/// Wipe tool that exits 0 without ever writing the log it was asked for.
#[allow(dead_code)]
pub fn wipe_script_no_log() -> &'static str {
    r#"#!/bin/sh
echo '{"progress": 50, "message": "halfway"}'
echo '{"progress": 100, "message": "complete"}'
exit 0
"#
}

/// Wipe tool whose progress stream repeats and regresses, with a stray
/// unstructured line in the middle.
#[allow(dead_code)]
pub fn wipe_script_unordered_progress() -> &'static str {
    r#"#!/bin/sh
echo '{"progress": 30}'
echo '{"progress": 20}'
echo '{"progress": 30}'
echo '{"progress": 60}'
echo 'scrubbing partition table'
echo '{"progress": 100}'
exit 0
"#
}

/// Executable whose interpreter does not exist; exec fails with ENOENT.
#[allow(dead_code)]
pub fn script_with_missing_interpreter() -> &'static str {
    "#!/no/such/interpreter\nexit 0\n"
}

/// The scan and wipe capabilities resolve to one binary name; this script
/// serves both sides: `--list` prints `report_json`, anything else runs the
/// wipe contract.
#[allow(dead_code)]
pub fn combined_tool_script(report_json: &str) -> String {
    let wipe_body = wipe_script_ok()
        .strip_prefix("#!/bin/sh\n")
        .expect("wipe stub starts with a shebang");
    format!(
        "#!/bin/sh\nif [ \"$1\" = \"--list\" ]; then\n  cat <<'REPORT'\n{report_json}\nREPORT\n  exit 0\nfi\n{wipe_body}"
    )
}

/// Certifier writing a JSON artifact carrying its own certificate id, plus
/// a PDF next to it.
#[allow(dead_code)]
pub fn certify_script() -> &'static str {
    r#"#!/bin/sh
LOG="$1"
shift
while [ $# -gt 0 ]; do
  case "$1" in
    --out) OUT="$2"; shift ;;
    --pdf) PDF="$2"; shift ;;
  esac
  shift
done
cat > "$OUT" <<CERT
{"certificate_id": "CERT-STUB-0001", "source_log": "$LOG"}
CERT
printf 'stub pdf' > "$PDF"
exit 0
"#
}

/// Certifier that writes the JSON artifact but no PDF.
#[allow(dead_code)]
pub fn certify_script_no_pdf() -> &'static str {
    r#"#!/bin/sh
LOG="$1"
shift
while [ $# -gt 0 ]; do
  case "$1" in
    --out) OUT="$2"; shift ;;
  esac
  shift
done
cat > "$OUT" <<CERT
{"certificate_id": "CERT-STUB-0001", "source_log": "$LOG"}
CERT
exit 0
"#
}

/// Certifier that refuses the log.
#[allow(dead_code)]
pub fn certify_script_failing() -> &'static str {
    r#"#!/bin/sh
echo 'unsupported log schema' >&2
exit 2
"#
}

/// Verifier accepting everything it is shown.
#[allow(dead_code)]
pub fn verify_script_ok() -> &'static str {
    r#"#!/bin/sh
echo "signature valid for $1"
exit 0
"#
}

/// Verifier rejecting everything it is shown.
#[allow(dead_code)]
pub fn verify_script_invalid() -> &'static str {
    r#"#!/bin/sh
echo 'signature mismatch' >&2
exit 1
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use wipectl::tools::ToolRegistry;
    use wipectl::Capability;

    #[test]
    fn installed_tools_resolve_in_real_mode() {
        let tools = ToolDir::new();
        tools.install(SCAN_WIPE_TOOL, scan_script_garbage());
        let data = tempfile::tempdir().unwrap();

        let registry = ToolRegistry::from_config(&tools.config(data.path()));
        assert!(registry.resolve(Capability::Wipe).unwrap().is_real());
        assert!(registry.resolve(Capability::Scan).unwrap().is_real());
        assert!(registry.resolve(Capability::Certify).unwrap().is_simulated());
    }

    #[test]
    fn simulated_config_resolves_nothing() {
        let data = tempfile::tempdir().unwrap();
        let config = simulated_config(data.path());
        for capability in Capability::ALL {
            assert!(config.tool_path(capability).is_none());
        }
    }
}
