//! Agent transports.
//!
//! [`AgentTransport`] is the seam between the session runtime and whatever
//! actually produces transcript events: the default spawns the agent CLI as
//! a subprocess; a streaming-API transport or a scripted test stream slot in
//! without touching the runtime.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout};
use tokio::sync::Mutex;

use super::events::{parse_transcript_line, TranscriptEvent};

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("failed to launch agent: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("agent unavailable: {0}")]
    Unavailable(String),
}

/// Everything a transport needs to start one session.
#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub prompt: String,
    pub model: String,
    pub cwd: PathBuf,
    pub max_turns: u32,
}

/// How a stream ended, observed after `next_event` returns `None`.
#[derive(Debug, Clone, Default)]
pub struct StreamExit {
    pub exit_code: Option<i32>,
    pub stderr: String,
}

/// A live transcript stream for one session.
#[async_trait]
pub trait AgentStream: Send {
    /// Next transcript event, or `None` on end of stream.
    async fn next_event(&mut self) -> Option<TranscriptEvent>;

    /// Exit details. Meaningful once `next_event` has returned `None`.
    async fn finish(&mut self) -> StreamExit;

    /// Force-terminate the underlying session.
    async fn terminate(&mut self);
}

/// Factory for transcript streams.
#[async_trait]
pub trait AgentTransport: Send + Sync {
    async fn launch(
        &self,
        request: SessionRequest,
    ) -> Result<Box<dyn AgentStream>, TransportError>;

    /// Cheap reachability probe for preflight.
    fn available(&self) -> bool {
        true
    }

    /// Name shown in preflight output and logs.
    fn describe(&self) -> String;
}

/// Launches the agent CLI and reads stream-json transcript lines.
#[derive(Debug, Clone)]
pub struct SubprocessTransport {
    command: String,
    extra_args: Vec<String>,
}

impl SubprocessTransport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            extra_args: Vec::new(),
        }
    }

    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    fn on_path(&self) -> bool {
        let Some(paths) = std::env::var_os("PATH") else {
            return false;
        };
        std::env::split_paths(&paths).any(|dir| {
            let candidate = dir.join(&self.command);
            candidate.is_file()
                || candidate.with_extension("cmd").is_file()
                || candidate.with_extension("exe").is_file()
        })
    }
}

#[async_trait]
impl AgentTransport for SubprocessTransport {
    async fn launch(
        &self,
        request: SessionRequest,
    ) -> Result<Box<dyn AgentStream>, TransportError> {
        if !self.available() {
            return Err(TransportError::Unavailable(format!(
                "{} not found on PATH",
                self.command
            )));
        }

        let mut cmd = tokio::process::Command::new(&self.command);
        cmd.arg("-p")
            .arg(&request.prompt)
            .arg("--model")
            .arg(&request.model)
            .arg("--output-format")
            .arg("stream-json")
            .arg("--verbose")
            .arg("--max-turns")
            .arg(request.max_turns.to_string())
            .args(&self.extra_args)
            .current_dir(&request.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::Unavailable("agent stdout not captured".to_string()))?;

        // Drain stderr concurrently so the child never blocks on a full pipe.
        let stderr_buf = Arc::new(Mutex::new(String::new()));
        if let Some(stderr) = child.stderr.take() {
            let buf = Arc::clone(&stderr_buf);
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let mut guard = buf.lock().await;
                    guard.push_str(&line);
                    guard.push('\n');
                }
            });
        }

        Ok(Box::new(SubprocessStream {
            child: Some(child),
            lines: BufReader::new(stdout).lines(),
            pending: VecDeque::new(),
            stderr: stderr_buf,
            exit_code: None,
        }))
    }

    fn available(&self) -> bool {
        self.on_path()
    }

    fn describe(&self) -> String {
        format!("subprocess:{}", self.command)
    }
}

struct SubprocessStream {
    child: Option<Child>,
    lines: tokio::io::Lines<BufReader<ChildStdout>>,
    pending: VecDeque<TranscriptEvent>,
    stderr: Arc<Mutex<String>>,
    exit_code: Option<i32>,
}

#[async_trait]
impl AgentStream for SubprocessStream {
    async fn next_event(&mut self) -> Option<TranscriptEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            match self.lines.next_line().await {
                Ok(Some(line)) => {
                    self.pending.extend(parse_transcript_line(&line));
                }
                Ok(None) => {
                    self.reap().await;
                    return None;
                }
                Err(_) => {
                    self.reap().await;
                    return None;
                }
            }
        }
    }

    async fn finish(&mut self) -> StreamExit {
        self.reap().await;
        StreamExit {
            exit_code: self.exit_code,
            stderr: self.stderr.lock().await.clone(),
        }
    }

    async fn terminate(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill().await;
            if let Ok(status) = child.wait().await {
                self.exit_code = status.code();
            }
        }
    }
}

impl SubprocessStream {
    async fn reap(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Ok(status) = child.wait().await {
                self.exit_code = status.code();
            }
        }
    }
}
