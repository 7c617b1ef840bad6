// Supervised subprocess execution
//
// Every external tool invocation goes through here. The runner spawns the
// child with piped stdio, frames both pipes into complete lines and forwards
// them over a single channel, so callers consume one ordered stream of
// events. The stream always ends with exactly one Exited event, after all
// output events, even when the child dies to a signal.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::{WipeError, WipeResult};

/// Program plus arguments, resolved before spawn.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Single-line rendering for log output
    pub fn rendered(&self) -> String {
        let mut out = self.program.display().to_string();
        for arg in &self.args {
            out.push(' ');
            out.push_str(arg);
        }
        out
    }
}

/// Terminal state of a child. `code` is None when the child was killed by a
/// signal rather than exiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    pub code: Option<i32>,
}

impl ProcessExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Exit code, with signal death collapsed to -1 for reporting
    pub fn code_or_signal(&self) -> i32 {
        self.code.unwrap_or(-1)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProcessEvent {
    Stdout(String),
    Stderr(String),
    Exited(ProcessExit),
}

/// Ordered event stream for one child process.
pub struct ProcessStream {
    events: mpsc::UnboundedReceiver<ProcessEvent>,
}

impl ProcessStream {
    /// Next event, or None once Exited has been consumed.
    pub async fn next_event(&mut self) -> Option<ProcessEvent> {
        self.events.recv().await
    }

    /// Drain the stream to completion, buffering both pipes wholesale. For
    /// one-shot tools where only the final output matters.
    pub async fn collect(mut self) -> CollectedOutput {
        let mut stdout = String::new();
        let mut stderr = String::new();
        let mut exit = ProcessExit { code: None };
        while let Some(event) = self.next_event().await {
            match event {
                ProcessEvent::Stdout(line) => {
                    stdout.push_str(&line);
                    stdout.push('\n');
                }
                ProcessEvent::Stderr(line) => {
                    stderr.push_str(&line);
                    stderr.push('\n');
                }
                ProcessEvent::Exited(status) => exit = status,
            }
        }
        CollectedOutput {
            stdout,
            stderr,
            exit,
        }
    }
}

/// Fully-buffered output of a finished child.
#[derive(Debug, Clone)]
pub struct CollectedOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit: ProcessExit,
}

impl CollectedOutput {
    /// Best diagnostic text available: stderr, else stdout, else a stub.
    pub fn diagnostic(&self) -> String {
        let err = self.stderr.trim();
        if !err.is_empty() {
            return err.to_string();
        }
        let out = self.stdout.trim();
        if !out.is_empty() {
            return out.to_string();
        }
        "no output".to_string()
    }
}

pub struct ProcessRunner;

impl ProcessRunner {
    /// Spawn `spec` and return its event stream. Failure to spawn is mapped
    /// by error kind so the caller can surface actionable guidance.
    pub fn spawn(spec: &CommandSpec) -> WipeResult<ProcessStream> {
        tracing::debug!(command = %spec.rendered(), "spawning tool");

        let mut child = Command::new(&spec.program)
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| map_spawn_error(&spec.program, err))?;

        let (tx, rx) = mpsc::unbounded_channel();

        let stdout_task = child
            .stdout
            .take()
            .map(|pipe| tokio::spawn(forward_lines(pipe, tx.clone(), Pipe::Stdout)));
        let stderr_task = child
            .stderr
            .take()
            .map(|pipe| tokio::spawn(forward_lines(pipe, tx.clone(), Pipe::Stderr)));

        tokio::spawn(async move {
            if let Some(task) = stdout_task {
                let _ = task.await;
            }
            if let Some(task) = stderr_task {
                let _ = task.await;
            }
            let exit = match child.wait().await {
                Ok(status) => ProcessExit {
                    code: status.code(),
                },
                Err(err) => {
                    tracing::error!(error = %err, "failed to reap child process");
                    ProcessExit { code: None }
                }
            };
            let _ = tx.send(ProcessEvent::Exited(exit));
        });

        Ok(ProcessStream { events: rx })
    }
}

#[derive(Clone, Copy)]
enum Pipe {
    Stdout,
    Stderr,
}

async fn forward_lines<R>(pipe: R, tx: mpsc::UnboundedSender<ProcessEvent>, kind: Pipe)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(pipe).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let event = match kind {
                    Pipe::Stdout => ProcessEvent::Stdout(line),
                    Pipe::Stderr => ProcessEvent::Stderr(line),
                };
                if tx.send(event).is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(err) => {
                tracing::warn!(error = %err, "tool output pipe closed abnormally");
                break;
            }
        }
    }
}

fn map_spawn_error(program: &Path, err: std::io::Error) -> WipeError {
    let tool = program.display().to_string();
    match err.kind() {
        std::io::ErrorKind::NotFound => WipeError::SpawnFailed {
            tool,
            detail: "executable not found".to_string(),
        },
        std::io::ErrorKind::PermissionDenied => WipeError::PermissionDenied { tool },
        _ => WipeError::SpawnFailed {
            tool,
            detail: err.to_string(),
        },
    }
}
