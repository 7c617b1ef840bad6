// Certificate pipeline
//
// Turns a WipeLog into a compliance certificate and answers verification
// requests against a certificate artifact. Real mode drives the external
// certifier/verifier; simulated mode synthesizes a structurally complete
// artifact that is explicitly marked mock and carries a placeholder
// signature. Everything the pipeline needs comes from the WipeLog alone.
// Verification only judges the artifact and never touches it or the log.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::process::{CommandSpec, ProcessRunner};
use crate::tools::ToolMode;
use crate::wipe_log::WipeLog;
use crate::{WipeError, WipeResult};

const MOCK_SIGNATURE_ALGORITHM: &str = "Ed25519";
const MOCK_SIGNATURE: &str = "MOCKSIG";
const VERIFY_URL_BASE: &str = "https://verify.nullbytes.org/?cert_id=";

/// A produced certificate artifact. Immutable once generated.
#[derive(Debug, Clone, Serialize)]
pub struct Certificate {
    pub certificate_id: String,
    pub json_path: PathBuf,
    pub pdf_path: Option<PathBuf>,
    pub mock: bool,
}

/// Verdict for one certificate artifact.
#[derive(Debug, Clone, Serialize)]
pub struct Verification {
    pub valid: bool,
    pub detail: String,
    pub mock: bool,
}

// Simulated artifact layout: log summary plus a placeholder signature block
// and the payload digest a real signer would cover.
#[derive(Serialize)]
struct SimulatedArtifact<'a> {
    certificate_id: &'a str,
    generated_at: String,
    device: &'a crate::wipe_log::DeviceRecord,
    wipe: &'a crate::wipe_log::WipeRecord,
    system: &'a crate::wipe_log::SystemRecord,
    payload_sha256: String,
    signature: SignatureBlock,
    verify_url: String,
    mock: bool,
}

#[derive(Serialize)]
struct SignatureBlock {
    algorithm: &'static str,
    sig: &'static str,
}

pub struct CertificatePipeline {
    certify: ToolMode,
    verify: ToolMode,
    cert_dir: PathBuf,
}

impl CertificatePipeline {
    pub fn new(certify: ToolMode, verify: ToolMode, cert_dir: impl Into<PathBuf>) -> Self {
        Self {
            certify,
            verify,
            cert_dir: cert_dir.into(),
        }
    }

    /// Generate a certificate from the WipeLog at `log_path`. The log must
    /// exist and parse: unlike the wipe stage, this pipeline has nothing to
    /// degrade to without it.
    pub async fn generate(
        &self,
        log_path: &Path,
        out_json: Option<&Path>,
        out_pdf: Option<&Path>,
    ) -> WipeResult<Certificate> {
        let (log, log_bytes) = load_log(log_path)?;

        std::fs::create_dir_all(&self.cert_dir)?;
        let (json_path, pdf_path) = match (out_json, out_pdf) {
            (Some(json), Some(pdf)) => (json.to_path_buf(), pdf.to_path_buf()),
            (Some(json), None) => (json.to_path_buf(), json.with_extension("pdf")),
            (None, pdf) => {
                let (json, generated_pdf) = self.unique_artifact_paths();
                (json, pdf.map(Path::to_path_buf).unwrap_or(generated_pdf))
            }
        };
        if let Some(parent) = json_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        match &self.certify {
            ToolMode::Simulated => {
                self.generate_simulated(&log, &log_bytes, &json_path)
            }
            ToolMode::Real(spec) => {
                self.generate_real(spec.path.as_path(), &log, log_path, &json_path, &pdf_path)
                    .await
            }
        }
    }

    fn generate_simulated(
        &self,
        log: &WipeLog,
        log_bytes: &[u8],
        json_path: &Path,
    ) -> WipeResult<Certificate> {
        let certificate_id = log
            .compliance
            .as_ref()
            .map(|c| c.certificate_id.clone())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let artifact = SimulatedArtifact {
            certificate_id: &certificate_id,
            generated_at: Utc::now().to_rfc3339(),
            device: &log.device,
            wipe: &log.wipe,
            system: &log.system,
            payload_sha256: sha256_hex(log_bytes),
            signature: SignatureBlock {
                algorithm: MOCK_SIGNATURE_ALGORITHM,
                sig: MOCK_SIGNATURE,
            },
            verify_url: format!("{VERIFY_URL_BASE}{certificate_id}"),
            mock: true,
        };

        std::fs::write(json_path, serde_json::to_string_pretty(&artifact)?)?;
        tracing::info!(path = %json_path.display(), "mock certificate written");

        Ok(Certificate {
            certificate_id,
            json_path: json_path.to_path_buf(),
            pdf_path: None,
            mock: true,
        })
    }

    async fn generate_real(
        &self,
        tool: &Path,
        log: &WipeLog,
        log_path: &Path,
        json_path: &Path,
        pdf_path: &Path,
    ) -> WipeResult<Certificate> {
        let command = CommandSpec::new(tool)
            .arg(log_path.display().to_string())
            .arg("--out")
            .arg(json_path.display().to_string())
            .arg("--pdf")
            .arg(pdf_path.display().to_string())
            .arg("--device")
            .arg(&log.device.path)
            .arg("--method")
            .arg(log.wipe.method.as_str());

        let output = ProcessRunner::spawn(&command)?.collect().await;
        if !output.exit.success() {
            return Err(WipeError::NonZeroExit {
                tool: tool.display().to_string(),
                code: output.exit.code_or_signal(),
                diagnostic: output.diagnostic(),
            });
        }

        Ok(Certificate {
            certificate_id: artifact_certificate_id(json_path, log),
            json_path: json_path.to_path_buf(),
            pdf_path: pdf_path.exists().then(|| pdf_path.to_path_buf()),
            mock: false,
        })
    }

    /// Verify the certificate at `cert_path`. A failed verification is a
    /// negative verdict, not an error; errors mean the check never ran.
    pub async fn verify(
        &self,
        cert_path: &Path,
        pubkey: Option<&Path>,
    ) -> WipeResult<Verification> {
        let spec = match &self.verify {
            ToolMode::Simulated => {
                tracing::info!(path = %cert_path.display(), "no verifier installed, mock verification");
                return Ok(Verification {
                    valid: true,
                    detail: "Mock verified".to_string(),
                    mock: true,
                });
            }
            ToolMode::Real(spec) => spec,
        };

        let mut command = CommandSpec::new(&spec.path).arg(cert_path.display().to_string());
        if let Some(key) = pubkey {
            command = command.arg(key.display().to_string());
        }

        let output = ProcessRunner::spawn(&command)?.collect().await;
        let mut detail = String::new();
        for part in [output.stdout.trim(), output.stderr.trim()] {
            if !part.is_empty() {
                if !detail.is_empty() {
                    detail.push('\n');
                }
                detail.push_str(part);
            }
        }
        if detail.is_empty() {
            detail = "no output".to_string();
        }

        Ok(Verification {
            valid: output.exit.success(),
            detail,
            mock: false,
        })
    }

    // cert_<epoch_ms>.{json,pdf}; bumped until free so repeated calls in the
    // same millisecond never collide
    fn unique_artifact_paths(&self) -> (PathBuf, PathBuf) {
        let mut stamp = Utc::now().timestamp_millis();
        loop {
            let json = self.cert_dir.join(format!("cert_{stamp}.json"));
            let pdf = self.cert_dir.join(format!("cert_{stamp}.pdf"));
            if !json.exists() && !pdf.exists() {
                return (json, pdf);
            }
            stamp += 1;
        }
    }
}

fn load_log(path: &Path) -> WipeResult<(WipeLog, Vec<u8>)> {
    let bytes = std::fs::read(path).map_err(|err| WipeError::WipeLogUnreadable {
        path: path.to_path_buf(),
        detail: err.to_string(),
    })?;
    let log = serde_json::from_slice(&bytes).map_err(|err| WipeError::WipeLogUnreadable {
        path: path.to_path_buf(),
        detail: err.to_string(),
    })?;
    Ok((log, bytes))
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

// Real certifiers disagree on the id key ("certificate_id" vs "uuid"); fall
// back to the log's pre-allocated id, then a fresh one.
fn artifact_certificate_id(json_path: &Path, log: &WipeLog) -> String {
    if let Ok(bytes) = std::fs::read(json_path) {
        if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&bytes) {
            for key in ["certificate_id", "uuid"] {
                if let Some(id) = value.get(key).and_then(|v| v.as_str()) {
                    return id.to_string();
                }
            }
        }
    }
    log.compliance
        .as_ref()
        .map(|c| c.certificate_id.clone())
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}
