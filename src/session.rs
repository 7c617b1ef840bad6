// Wipe session state machine
//
// One session drives one sanitization run: Idle -> Validating -> Running ->
// {Succeeded, Failed}. Validation failures (safety gate, duplicate session,
// pre-start interrupt) are rejected before the session task exists, so the
// event stream only ever carries the Running phase: progress events in
// strictly increasing percent order, log events in production order, and
// exactly one terminal Done event, always last.
//
// Once a real wipe subprocess is started there is no safe cancellation;
// losing the event receiver does not stop the run.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::config::SimulatedWipeProfile;
use crate::host::HostFacts;
use crate::process::{CommandSpec, OutputLine, ProcessEvent, ProcessRunner};
use crate::tools::{ToolMode, ToolSpec};
use crate::wipe_log::WipeLog;
use crate::{WipeError, WipeRequest, WipeResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Info => f.write_str("info"),
            LogLevel::Warn => f.write_str("warn"),
            LogLevel::Error => f.write_str("error"),
        }
    }
}

/// Event stream contract of a running session.
#[derive(Debug)]
pub enum WipeEvent {
    /// Strictly increasing percent in [0, 100]
    Progress { percent: u8, message: Option<String> },
    /// Tool output and session diagnostics, in production order
    Log {
        level: LogLevel,
        text: String,
        timestamp: DateTime<Utc>,
    },
    /// Terminal event, exactly once, always last
    Done(SessionOutcome),
}

#[derive(Debug)]
pub enum SessionOutcome {
    Succeeded {
        /// Where the wipe log landed
        log_path: PathBuf,
        /// None when the tool exited 0 but its log could not be recovered
        /// (degraded success)
        wipe_log: Option<WipeLog>,
        mock: bool,
    },
    Failed(WipeError),
}

impl SessionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SessionOutcome::Succeeded { .. })
    }
}

/// Caller's view of one session: its event receiver plus the identifiers
/// fixed at start time.
#[derive(Debug)]
pub struct WipeSessionHandle {
    device_path: String,
    log_path: PathBuf,
    events: mpsc::UnboundedReceiver<WipeEvent>,
}

impl WipeSessionHandle {
    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    /// Log path the session was started with. The terminal event carries the
    /// path actually written, which differs if the fallback kicked in.
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub async fn next_event(&mut self) -> Option<WipeEvent> {
        self.events.recv().await
    }

    /// Discard intermediate events and return the terminal outcome.
    pub async fn wait(mut self) -> SessionOutcome {
        while let Some(event) = self.next_event().await {
            if let WipeEvent::Done(outcome) = event {
                return outcome;
            }
        }
        SessionOutcome::Failed(WipeError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "session ended without a terminal event",
        )))
    }
}

/// Active-session registry: at most one session per device path.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    active: Arc<Mutex<HashSet<String>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claim `device_path` for a new session. Fails with
    /// `SessionAlreadyActive` while a previous claim is still held.
    pub fn claim(&self, device_path: &str) -> WipeResult<SessionClaim> {
        let mut active = self.lock();
        if !active.insert(device_path.to_string()) {
            return Err(WipeError::SessionAlreadyActive(device_path.to_string()));
        }
        Ok(SessionClaim {
            active: Arc::clone(&self.active),
            device_path: device_path.to_string(),
        })
    }

    pub fn is_active(&self, device_path: &str) -> bool {
        self.lock().contains(device_path)
    }
}

/// Holds the device-path claim for the lifetime of a session; released on
/// drop, just before the terminal event goes out.
#[derive(Debug)]
pub struct SessionClaim {
    active: Arc<Mutex<HashSet<String>>>,
    device_path: String,
}

impl Drop for SessionClaim {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.device_path);
    }
}

/// Everything a session task needs, assembled by the orchestrator after the
/// validation gates have passed.
pub(crate) struct SessionContext {
    pub request: WipeRequest,
    pub mode: ToolMode,
    pub profile: SimulatedWipeProfile,
    pub host: HostFacts,
    /// Effective log target (requested or generated)
    pub log_path: PathBuf,
    pub claim: SessionClaim,
}

/// Start the Running phase on a background task and hand back the event
/// stream.
pub(crate) fn spawn_session(ctx: SessionContext) -> WipeSessionHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = WipeSessionHandle {
        device_path: ctx.request.device_path.clone(),
        log_path: ctx.log_path.clone(),
        events: rx,
    };

    tokio::spawn(async move {
        let sink = EventSink { tx };
        let outcome = match ctx.mode.clone() {
            ToolMode::Simulated => run_simulated(&ctx, &sink).await,
            ToolMode::Real(spec) => run_real(&ctx, &spec, &sink).await,
        };
        if let SessionOutcome::Failed(err) = &outcome {
            tracing::error!(device = %ctx.request.device_path, error = %err, "wipe session failed");
        } else {
            tracing::info!(device = %ctx.request.device_path, "wipe session succeeded");
        }
        // release the claim before the terminal event: once a caller sees
        // Done, the device must be claimable again
        let SessionContext { claim, .. } = ctx;
        drop(claim);
        sink.done(outcome);
    });

    handle
}

struct EventSink {
    tx: mpsc::UnboundedSender<WipeEvent>,
}

impl EventSink {
    fn progress(&self, percent: u8, message: Option<String>) {
        let _ = self.tx.send(WipeEvent::Progress { percent, message });
    }

    fn log(&self, level: LogLevel, text: impl Into<String>) {
        let _ = self.tx.send(WipeEvent::Log {
            level,
            text: text.into(),
            timestamp: Utc::now(),
        });
    }

    fn done(&self, outcome: SessionOutcome) {
        let _ = self.tx.send(WipeEvent::Done(outcome));
    }
}

/// Clamps raw tool percents to [0, 100] and admits only strictly increasing
/// values; ties and regressions are dropped silently.
#[derive(Debug, Default)]
pub(crate) struct ProgressGate {
    last: Option<u8>,
}

impl ProgressGate {
    pub(crate) fn admit(&mut self, raw: f64) -> Option<u8> {
        let clamped = raw.clamp(0.0, 100.0) as u8;
        match self.last {
            Some(last) if clamped <= last => None,
            _ => {
                self.last = Some(clamped);
                Some(clamped)
            }
        }
    }
}

async fn run_simulated(ctx: &SessionContext, sink: &EventSink) -> SessionOutcome {
    let started_at = Utc::now();
    sink.log(
        LogLevel::Info,
        format!(
            "Starting simulated {} wipe of {}",
            ctx.request.method, ctx.request.device_path
        ),
    );

    let step = ctx.profile.step_percent.max(1);
    let (lo, hi) = ctx.profile.tick_bounds();
    let total_passes = ctx.request.method.pass_count();

    let mut percent: u8 = 0;
    while percent < 100 {
        percent = percent.saturating_add(step).min(100);
        let delay = rand::thread_rng().gen_range(lo..=hi);
        tokio::time::sleep(delay).await;
        let pass = ((percent as u32 * total_passes + 99) / 100).max(1);
        sink.progress(percent, Some(format!("Pass {}/{}", pass, total_passes)));
    }

    let finished_at = Utc::now();
    let log = WipeLog::synthetic(&ctx.request, &ctx.host, started_at, finished_at);
    match log.write_with_fallback(&ctx.log_path) {
        Ok(written) => {
            sink.log(
                LogLevel::Info,
                format!("Wipe log written to {}", written.display()),
            );
            SessionOutcome::Succeeded {
                log_path: written,
                wipe_log: Some(log),
                mock: true,
            }
        }
        Err(err) => SessionOutcome::Failed(err),
    }
}

async fn run_real(ctx: &SessionContext, spec: &ToolSpec, sink: &EventSink) -> SessionOutcome {
    let tool = spec.path.display().to_string();
    let command = CommandSpec::new(&spec.path)
        .arg("--device")
        .arg(&ctx.request.device_path)
        .arg("--method")
        .arg(ctx.request.method.as_str())
        .arg("--output")
        .arg(ctx.log_path.display().to_string());

    let mut stream = match ProcessRunner::spawn(&command) {
        Ok(stream) => stream,
        Err(err) => {
            sink.log(LogLevel::Error, err.to_string());
            return SessionOutcome::Failed(err);
        }
    };

    let mut gate = ProgressGate::default();
    // last stderr lines become the diagnostic on nonzero exit
    let mut stderr_tail: VecDeque<String> = VecDeque::new();

    while let Some(event) = stream.next_event().await {
        match event {
            ProcessEvent::Stdout(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                match OutputLine::classify(&line) {
                    OutputLine::Progress { percent, message } => {
                        if let Some(admitted) = gate.admit(percent) {
                            sink.progress(admitted, message);
                        }
                    }
                    OutputLine::Message(text) => sink.log(LogLevel::Info, text),
                    OutputLine::ErrorLine(text) => sink.log(LogLevel::Error, text),
                    OutputLine::Unstructured(text) => sink.log(LogLevel::Info, text),
                }
            }
            ProcessEvent::Stderr(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                if stderr_tail.len() == 8 {
                    stderr_tail.pop_front();
                }
                stderr_tail.push_back(line.clone());
                sink.log(LogLevel::Error, line);
            }
            ProcessEvent::Exited(exit) => {
                if exit.success() {
                    return read_back_log(ctx, sink);
                }
                let diagnostic = if stderr_tail.is_empty() {
                    "no output".to_string()
                } else {
                    stderr_tail.iter().cloned().collect::<Vec<_>>().join("\n")
                };
                return SessionOutcome::Failed(WipeError::NonZeroExit {
                    tool,
                    code: exit.code_or_signal(),
                    diagnostic,
                });
            }
        }
    }

    SessionOutcome::Failed(WipeError::Io(std::io::Error::new(
        std::io::ErrorKind::UnexpectedEof,
        "tool event stream ended without an exit status",
    )))
}

// Exit 0 means the device was sanitized; a missing or corrupt log degrades
// the success but never turns it into a failure.
fn read_back_log(ctx: &SessionContext, sink: &EventSink) -> SessionOutcome {
    let (wipe_log, warn) = match WipeLog::try_read(&ctx.log_path) {
        Ok(Some(log)) => (Some(log), None),
        Ok(None) => (
            None,
            Some(WipeError::WipeLogUnreadable {
                path: ctx.log_path.clone(),
                detail: "file was never written".to_string(),
            }),
        ),
        Err(err) => (None, Some(err)),
    };
    if let Some(err) = warn {
        sink.log(LogLevel::Warn, err.to_string());
    }
    SessionOutcome::Succeeded {
        log_path: ctx.log_path.clone(),
        wipe_log,
        mock: false,
    }
}
