// Wipe Orchestrator - Front door for scan, wipe, certify and verify
//
// This module is the library's main entry point. It owns the configuration,
// the safety policy, the tool registry and the session registry, and routes
// every operation through the validation gates before anything is spawned.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::certificate::{Certificate, CertificatePipeline, Verification};
use crate::config::OrchestratorConfig;
use crate::history::{self, HistoryEntry};
use crate::host::{self, HostFacts, HostReport};
use crate::safety::SafetyPolicy;
use crate::scan::{DeviceScanner, ScanOutcome};
use crate::session::{self, SessionContext, SessionOutcome, SessionRegistry, WipeSessionHandle};
use crate::tools::{ToolRegistry, ToolStatus};
use crate::wipe_log;
use crate::{is_interrupted, Capability, Platform, WipeError, WipeMethod, WipeRequest, WipeResult};

/// Combined environment report for the `doctor` command.
#[derive(Debug)]
pub struct DoctorReport {
    pub tools: Vec<ToolStatus>,
    pub host: HostReport,
}

/// Main orchestrator: validates requests, resolves tools and supervises
/// sessions. Cheap to construct; all heavy work happens in the operations.
pub struct WipeOrchestrator {
    config: OrchestratorConfig,
    safety: SafetyPolicy,
    tools: ToolRegistry,
    sessions: SessionRegistry,
    host: HostFacts,
}

impl WipeOrchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        // Root-disk enrichment only applies when the policy targets the
        // platform we are actually running on.
        let safety = if config.platform == Platform::current() {
            SafetyPolicy::for_host()
        } else {
            SafetyPolicy::new(config.platform)
        };
        let tools = ToolRegistry::from_config(&config);
        let host = HostFacts::collect(config.operator.as_deref());
        Self {
            config,
            safety,
            tools,
            sessions: SessionRegistry::new(),
            host,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Discover wipe targets. Falls back to a single mock device when no
    /// scan tool is installed (unless the config requires real mode).
    pub async fn scan_devices(&self) -> WipeResult<ScanOutcome> {
        let mode = self.tools.resolve(Capability::Scan)?;
        DeviceScanner::new(mode, self.config.platform).scan().await
    }

    /// Validate `request` and start its wipe session. Every validation
    /// failure returns here, before any subprocess is spawned or log file
    /// touched; once a handle is returned, the outcome arrives exactly once
    /// as the session's terminal event.
    pub fn start_wipe(&self, request: WipeRequest) -> WipeResult<WipeSessionHandle> {
        let claim = self.sessions.claim(&request.device_path)?;
        if !self.safety.is_safe_target(&request.device_path) {
            return Err(WipeError::UnsafeTarget(request.device_path.clone()));
        }
        let mode = self.tools.resolve(Capability::Wipe)?;
        if is_interrupted() {
            return Err(WipeError::Interrupted);
        }

        let log_path = match &request.output_log {
            Some(path) => path.clone(),
            None => wipe_log::generated_log_path(&self.config.log_dir, &request.device_path),
        };
        // The external tool writes the log itself and cannot create the
        // directory for it.
        if let Some(parent) = log_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        tracing::info!(
            device = %request.device_path,
            method = %request.method,
            real = mode.is_real(),
            log = %log_path.display(),
            "starting wipe session"
        );

        Ok(session::spawn_session(SessionContext {
            request,
            mode,
            profile: self.config.simulated.clone(),
            host: self.host.clone(),
            log_path,
            claim,
        }))
    }

    /// String-typed variant of [`start_wipe`](Self::start_wipe) for callers
    /// holding unparsed user input. Rejects unknown method names before any
    /// other gate runs.
    pub fn start_wipe_args(
        &self,
        device_path: &str,
        method: &str,
        output_log: Option<PathBuf>,
    ) -> WipeResult<WipeSessionHandle> {
        let method = WipeMethod::from_str(method)?;
        let mut request = WipeRequest::new(device_path, method);
        request.output_log = output_log;
        self.start_wipe(request)
    }

    /// True while a wipe session holds the claim on `device_path`.
    pub fn is_wiping(&self, device_path: &str) -> bool {
        self.sessions.is_active(device_path)
    }

    /// Generate a certificate from the wipe log at `log_path`.
    pub async fn generate_certificate(
        &self,
        log_path: &Path,
        out_json: Option<&Path>,
        out_pdf: Option<&Path>,
    ) -> WipeResult<Certificate> {
        self.certificates()?
            .generate(log_path, out_json, out_pdf)
            .await
    }

    /// Verify a previously generated certificate artifact.
    pub async fn verify_certificate(
        &self,
        cert_path: &Path,
        pubkey: Option<&Path>,
    ) -> WipeResult<Verification> {
        self.certificates()?.verify(cert_path, pubkey).await
    }

    fn certificates(&self) -> WipeResult<CertificatePipeline> {
        Ok(CertificatePipeline::new(
            self.tools.resolve(Capability::Certify)?,
            self.tools.resolve(Capability::Verify)?,
            self.config.cert_dir.clone(),
        ))
    }

    /// Previously written wipe logs with their certificates, newest first.
    pub fn history(&self) -> Vec<HistoryEntry> {
        history::collect(&self.config.log_dir, &self.config.cert_dir)
    }

    /// Environment check: per-capability tool availability plus host facts
    /// and privilege state.
    pub async fn doctor(&self) -> DoctorReport {
        DoctorReport {
            tools: self.tools.probe_all().await,
            host: host::host_report(self.config.operator.as_deref()),
        }
    }
}

/// Convenience function: run one wipe to completion and return its outcome.
pub async fn wipe_device(
    request: WipeRequest,
    config: OrchestratorConfig,
) -> WipeResult<SessionOutcome> {
    let orchestrator = WipeOrchestrator::new(config);
    let handle = orchestrator.start_wipe(request)?;
    Ok(handle.wait().await)
}
