// Execution mode selection
//
// Every capability (scan, wipe, certify, verify) runs either against a real
// external tool or against the built-in simulation. The decision is made
// here, once, from the configured tool paths: a capability is Real when its
// executable is present on disk, Simulated otherwise. Downstream code only
// ever sees a `ToolMode` and never re-probes the filesystem mid-session.

use std::path::{Path, PathBuf};

use crate::config::OrchestratorConfig;
use crate::{Capability, WipeError, WipeResult};

/// A resolved external tool invocation target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSpec {
    pub capability: Capability,
    pub path: PathBuf,
}

/// How a capability will execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolMode {
    Real(ToolSpec),
    Simulated,
}

impl ToolMode {
    pub fn is_real(&self) -> bool {
        matches!(self, ToolMode::Real(_))
    }

    pub fn is_simulated(&self) -> bool {
        matches!(self, ToolMode::Simulated)
    }
}

/// Probe result for one capability, for diagnostics output.
#[derive(Debug, Clone)]
pub struct ToolStatus {
    pub capability: Capability,
    /// Path that was checked, if any tool location is configured at all.
    pub candidate: Option<PathBuf>,
    pub mode: ToolMode,
}

/// Per-capability tool resolution, captured from config at startup.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    candidates: [(Capability, Option<PathBuf>); 4],
    require_real: bool,
}

impl ToolRegistry {
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        let candidates = [
            (Capability::Scan, config.tool_path(Capability::Scan)),
            (Capability::Wipe, config.tool_path(Capability::Wipe)),
            (Capability::Certify, config.tool_path(Capability::Certify)),
            (Capability::Verify, config.tool_path(Capability::Verify)),
        ];
        Self {
            candidates,
            require_real: config.require_real,
        }
    }

    fn candidate(&self, capability: Capability) -> Option<&PathBuf> {
        self.candidates
            .iter()
            .find(|(cap, _)| *cap == capability)
            .and_then(|(_, path)| path.as_ref())
    }

    /// Resolve the execution mode for `capability`. Falls back to the
    /// simulation when no usable executable is found, unless `require_real`
    /// is set, in which case the fallback becomes an error.
    pub fn resolve(&self, capability: Capability) -> WipeResult<ToolMode> {
        match self.candidate(capability) {
            Some(path) if is_executable(path) => Ok(ToolMode::Real(ToolSpec {
                capability,
                path: path.clone(),
            })),
            candidate => {
                if self.require_real {
                    return Err(WipeError::ToolUnavailable(capability));
                }
                tracing::debug!(
                    capability = %capability,
                    candidate = ?candidate,
                    "no usable tool, falling back to simulation"
                );
                Ok(ToolMode::Simulated)
            }
        }
    }

    /// Probe all four capabilities concurrently. Never fails: a missing tool
    /// simply reports as Simulated, even under `require_real`.
    pub async fn probe_all(&self) -> Vec<ToolStatus> {
        let probes = Capability::ALL.iter().map(|cap| self.probe(*cap));
        futures::future::join_all(probes).await
    }

    async fn probe(&self, capability: Capability) -> ToolStatus {
        let candidate = self.candidate(capability).cloned();
        let mode = match &candidate {
            Some(path) => match tokio::fs::metadata(path).await {
                Ok(meta) if metadata_is_executable(&meta) => ToolMode::Real(ToolSpec {
                    capability,
                    path: path.clone(),
                }),
                _ => ToolMode::Simulated,
            },
            None => ToolMode::Simulated,
        };
        ToolStatus {
            capability,
            candidate,
            mode,
        }
    }
}

fn is_executable(path: &Path) -> bool {
    match std::fs::metadata(path) {
        Ok(meta) => metadata_is_executable(&meta),
        Err(_) => false,
    }
}

#[cfg(unix)]
fn metadata_is_executable(meta: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.is_file() && meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn metadata_is_executable(meta: &std::fs::Metadata) -> bool {
    meta.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with_wipe_tool(path: Option<PathBuf>, require_real: bool) -> ToolRegistry {
        ToolRegistry {
            candidates: [
                (Capability::Scan, None),
                (Capability::Wipe, path),
                (Capability::Certify, None),
                (Capability::Verify, None),
            ],
            require_real,
        }
    }

    #[cfg(unix)]
    fn mark_executable(path: &Path) {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(path, perms).unwrap();
    }

    #[test]
    fn missing_tool_resolves_to_simulated() {
        let registry = registry_with_wipe_tool(Some(PathBuf::from("/nonexistent/wipe-tool")), false);
        assert_eq!(
            registry.resolve(Capability::Wipe).unwrap(),
            ToolMode::Simulated
        );
    }

    #[test]
    fn unconfigured_tool_resolves_to_simulated() {
        let registry = registry_with_wipe_tool(None, false);
        assert_eq!(
            registry.resolve(Capability::Wipe).unwrap(),
            ToolMode::Simulated
        );
    }

    #[test]
    fn require_real_turns_fallback_into_error() {
        let registry = registry_with_wipe_tool(Some(PathBuf::from("/nonexistent/wipe-tool")), true);
        match registry.resolve(Capability::Wipe) {
            Err(WipeError::ToolUnavailable(Capability::Wipe)) => {}
            other => panic!("expected ToolUnavailable, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn executable_tool_resolves_to_real() {
        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("wipe-tool");
        std::fs::write(&tool, "#!/bin/sh\nexit 0\n").unwrap();
        mark_executable(&tool);

        let registry = registry_with_wipe_tool(Some(tool.clone()), false);
        match registry.resolve(Capability::Wipe).unwrap() {
            ToolMode::Real(spec) => {
                assert_eq!(spec.capability, Capability::Wipe);
                assert_eq!(spec.path, tool);
            }
            ToolMode::Simulated => panic!("expected real mode"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn non_executable_file_is_not_real() {
        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("wipe-tool");
        std::fs::write(&tool, "not a program").unwrap();

        let registry = registry_with_wipe_tool(Some(tool), false);
        assert_eq!(
            registry.resolve(Capability::Wipe).unwrap(),
            ToolMode::Simulated
        );
    }

    #[tokio::test]
    async fn probe_all_covers_every_capability() {
        let registry = registry_with_wipe_tool(None, true);
        let statuses = registry.probe_all().await;
        assert_eq!(statuses.len(), Capability::ALL.len());
        for status in &statuses {
            assert!(status.mode.is_simulated());
        }
        let caps: Vec<Capability> = statuses.iter().map(|s| s.capability).collect();
        assert_eq!(caps, Capability::ALL.to_vec());
    }
}
