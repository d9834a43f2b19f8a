//! Shared fixtures for integration tests: a scripted agent transport and
//! project scaffolding inside a temp git repository.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::process::Command;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use ada_harness::backlog::{Backlog, BacklogStore, Feature};
use ada_harness::config::{HarnessConfig, RetryConfig};
use ada_harness::session::{
    AgentStream, AgentTransport, SessionRequest, StreamExit, TranscriptEvent, TransportError,
};
use ada_harness::verify::VerificationConfig;

/// One scripted session: events (with optional delays), files the "agent"
/// writes into the project on launch, and the subprocess exit code.
#[derive(Clone)]
pub struct SessionScript {
    pub events: Vec<(Duration, TranscriptEvent)>,
    pub writes: Vec<(String, String)>,
    pub exit_code: i32,
}

impl SessionScript {
    pub fn new(events: Vec<(Duration, TranscriptEvent)>) -> Self {
        Self {
            events,
            writes: Vec::new(),
            exit_code: 0,
        }
    }

    pub fn writing(mut self, path: &str, content: &str) -> Self {
        self.writes.push((path.to_string(), content.to_string()));
        self
    }

    pub fn exiting(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    /// A session that streams one message and completes successfully.
    pub fn completing(summary: &str) -> Self {
        Self::new(vec![
            (Duration::ZERO, TranscriptEvent::Message { text: "working".into() }),
            (Duration::ZERO, TranscriptEvent::usage(100, 50)),
            (
                Duration::ZERO,
                TranscriptEvent::Completion {
                    is_error: false,
                    summary: Some(summary.to_string()),
                },
            ),
        ])
    }
}

/// Replays scripted sessions in order; records every launch.
pub struct ScriptedTransport {
    scripts: Mutex<VecDeque<SessionScript>>,
    pub launches: Mutex<Vec<SessionRequest>>,
}

impl ScriptedTransport {
    pub fn new(scripts: Vec<SessionScript>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            launches: Mutex::new(Vec::new()),
        })
    }

    pub fn launch_count(&self) -> usize {
        self.launches.lock().unwrap().len()
    }
}

#[async_trait]
impl AgentTransport for ScriptedTransport {
    async fn launch(
        &self,
        request: SessionRequest,
    ) -> Result<Box<dyn AgentStream>, TransportError> {
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| TransportError::Unavailable("no scripts left".to_string()))?;

        for (rel, content) in &script.writes {
            let path = request.cwd.join(rel);
            if let Some(parent) = path.parent() {
                let _ = fs::create_dir_all(parent);
            }
            fs::write(path, content).expect("scripted write");
        }
        self.launches.lock().unwrap().push(request);

        Ok(Box::new(ScriptedStream {
            events: script.events.into(),
            exit_code: script.exit_code,
        }))
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

struct ScriptedStream {
    events: VecDeque<(Duration, TranscriptEvent)>,
    exit_code: i32,
}

#[async_trait]
impl AgentStream for ScriptedStream {
    async fn next_event(&mut self) -> Option<TranscriptEvent> {
        let (delay, event) = self.events.pop_front()?;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Some(event)
    }

    async fn finish(&mut self) -> StreamExit {
        StreamExit {
            exit_code: Some(self.exit_code),
            stderr: String::new(),
        }
    }

    async fn terminate(&mut self) {
        self.events.clear();
    }
}

/// A temp project: git repo with one base commit, backlog, progress file.
pub struct TestProject {
    pub dir: TempDir,
}

impl TestProject {
    pub fn new(features: Vec<Feature>) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let root = dir.path();

        run_git(root, &["init"]);
        run_git(root, &["config", "user.email", "harness@test.local"]);
        run_git(root, &["config", "user.name", "Harness Test"]);

        let mut backlog = Backlog::new("test-project", root.display().to_string());
        backlog.features = features;
        BacklogStore::new(root.join("feature-list.json"))
            .save(&backlog)
            .expect("write backlog");

        // The harness workspace stays out of version control.
        fs::write(root.join(".gitignore"), ".ada/\n").expect("gitignore");

        // An existing progress file skips the initializer session.
        fs::write(root.join("claude-progress.txt"), "# Progress log\n").expect("progress");

        run_git(root, &["add", "-A"]);
        run_git(root, &["commit", "-m", "initial state"]);

        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn backlog(&self) -> Backlog {
        BacklogStore::new(self.root().join("feature-list.json"))
            .load()
            .expect("load backlog")
    }

    pub fn commit_subjects(&self) -> Vec<String> {
        let output = Command::new("git")
            .args(["log", "--format=%s"])
            .current_dir(self.root())
            .output()
            .expect("git log");
        String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Fast test configuration: tiny context window, no verification,
    /// short delays.
    pub fn config(&self) -> HarnessConfig {
        let mut config = HarnessConfig::default();
        config.context_window_tokens = 1_000;
        config.session_timeout = Duration::from_secs(10);
        config.stall_silence = Duration::from_secs(5);
        config.shutdown_grace = Duration::from_millis(300);
        config.verification = VerificationConfig::disabled();
        config.retry = RetryConfig::default()
            .with_base_delay(Duration::from_millis(50))
            .with_rate_limit_base_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(500));
        config
    }
}

fn run_git(root: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args(args)
        .current_dir(root)
        .output()
        .expect("git");
    assert!(status.status.success(), "git {args:?} failed");
}
