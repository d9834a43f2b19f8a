//! Harness configuration.
//!
//! All knobs for the scheduler, session runtime, retry policy, and
//! verification pipeline live here so a single document can drive a run.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::verify::VerificationConfig;

/// Default context window assumed when estimating usage percentage.
pub const DEFAULT_CONTEXT_WINDOW_TOKENS: u64 = 200_000;

/// Configuration for retry logic with exponential backoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum retry attempts per feature after the first attempt.
    pub max_retries: u32,
    /// Initial delay between retries.
    #[serde(with = "duration_secs")]
    pub base_delay: Duration,
    /// Initial delay for rate-limit errors, which need more headroom.
    #[serde(with = "duration_secs")]
    pub rate_limit_base_delay: Duration,
    /// Ceiling on any single delay.
    #[serde(with = "duration_secs")]
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub exponential_base: f64,
    /// Random jitter factor (0.1 = +/- 10%).
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(5),
            rate_limit_base_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(300),
            exponential_base: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_rate_limit_base_delay(mut self, delay: Duration) -> Self {
        self.rate_limit_base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_jitter_factor(mut self, jitter: f64) -> Self {
        self.jitter_factor = jitter;
        self
    }
}

/// Configuration for the harness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Trigger handoff when estimated context usage reaches this percentage.
    pub context_threshold_percent: f64,

    /// Assumed model context window for the usage estimate.
    pub context_window_tokens: u64,

    /// Default model for coding sessions. Features may override.
    pub model: String,

    /// Command used to launch the agent. Must accept a prompt on argv and
    /// emit stream-json transcript lines on stdout.
    pub agent_command: String,

    /// Backlog document filename, relative to the project root.
    pub backlog_file: String,

    /// Progress log filename, relative to the project root.
    pub progress_file: String,

    /// Commit automatically on handoff and completion.
    pub auto_commit: bool,

    /// Maximum sessions before stopping (None = unlimited).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_sessions: Option<u32>,

    /// Absolute wall-clock cap per session.
    #[serde(with = "duration_secs")]
    pub session_timeout: Duration,

    /// Silence window after which a session is considered stalled.
    #[serde(with = "duration_secs")]
    pub stall_silence: Duration,

    /// Bounded grace period for cooperative shutdown.
    #[serde(with = "duration_secs")]
    pub shutdown_grace: Duration,

    /// Maximum agentic turns per session.
    pub max_turns: u32,

    /// Cap on any single git command, so a hung git process cannot stall
    /// the scheduler.
    #[serde(with = "duration_secs")]
    pub git_timeout: Duration,

    /// Retry configuration for classified errors.
    pub retry: RetryConfig,

    /// Verification gates run before a feature is marked complete.
    pub verification: VerificationConfig,

    /// Session log directory size cap before archive rotation, in bytes.
    pub session_log_cap_bytes: u64,

    /// Port for the telemetry API. The server walks forward from here when
    /// the port is taken.
    pub api_port: u16,

    /// Resume from a checkpoint without prompting.
    pub headless: bool,

    /// Accept a dirty working tree during preflight.
    pub allow_dirty: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            context_threshold_percent: 70.0,
            context_window_tokens: DEFAULT_CONTEXT_WINDOW_TOKENS,
            model: "claude-sonnet-4-20250514".to_string(),
            agent_command: "claude".to_string(),
            backlog_file: "feature-list.json".to_string(),
            progress_file: "claude-progress.txt".to_string(),
            auto_commit: true,
            max_sessions: None,
            session_timeout: Duration::from_secs(1800),
            stall_silence: Duration::from_secs(300),
            shutdown_grace: Duration::from_secs(120),
            max_turns: 100,
            git_timeout: Duration::from_secs(60),
            retry: RetryConfig::default(),
            verification: VerificationConfig::default(),
            session_log_cap_bytes: 100 * 1024 * 1024,
            api_port: 8765,
            headless: false,
            allow_dirty: false,
        }
    }
}

impl HarnessConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_context_threshold(mut self, percent: f64) -> Self {
        self.context_threshold_percent = percent;
        self
    }

    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    pub fn with_stall_silence(mut self, silence: Duration) -> Self {
        self.stall_silence = silence;
        self
    }

    pub fn with_git_timeout(mut self, timeout: Duration) -> Self {
        self.git_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_verification(mut self, verification: VerificationConfig) -> Self {
        self.verification = verification;
        self
    }

    pub fn with_max_sessions(mut self, max: u32) -> Self {
        self.max_sessions = Some(max);
        self
    }
}

/// Serialize `Duration` fields as whole seconds.
pub(crate) mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}
