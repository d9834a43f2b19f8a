//! The session state machine.
//!
//! Drives one transcript stream to a terminal condition: completion,
//! context-threshold handoff, stall, hard timeout, crash, classified error,
//! or cooperative interruption. Usage accumulates from `usage_update` frames
//! as they stream; nothing is re-parsed from disk afterwards.

use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::config::HarnessConfig;
use crate::cost::UsageTotals;
use crate::error::classification::{ClassifiedError, ErrorCategory};

use super::events::TranscriptEvent;
use super::transport::{AgentStream, AgentTransport, SessionRequest, TransportError};
use super::SessionOutcome;

/// Runtime limits for one session.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub context_window_tokens: u64,
    pub context_threshold_percent: f64,
    /// Absolute wall-clock cap from session start.
    pub hard_timeout: Duration,
    /// Silence window after which the session counts as stalled.
    pub stall_silence: Duration,
    /// How long a cooperative shutdown may wait for the agent's current step.
    pub shutdown_grace: Duration,
}

impl From<&HarnessConfig> for RuntimeConfig {
    fn from(config: &HarnessConfig) -> Self {
        Self {
            context_window_tokens: config.context_window_tokens,
            context_threshold_percent: config.context_threshold_percent,
            hard_timeout: config.session_timeout,
            stall_silence: config.stall_silence,
            shutdown_grace: config.shutdown_grace,
        }
    }
}

/// Result of one driven session.
#[derive(Debug, Clone)]
pub struct SessionResult {
    pub outcome: SessionOutcome,
    pub turns: u32,
    pub usage: UsageTotals,
    pub model: String,
    pub context_percent: f64,
    /// Final assistant summary, used as handoff notes when present.
    pub summary: Option<String>,
    pub error: Option<ClassifiedError>,
    /// True when a timeout outcome came from the stall detector rather than
    /// the wall-clock cap.
    pub stalled: bool,
    pub duration: Duration,
}

/// Drives transcript streams to a terminal outcome.
#[derive(Debug, Clone)]
pub struct SessionRuntime {
    config: RuntimeConfig,
}

impl SessionRuntime {
    pub fn new(config: RuntimeConfig) -> Self {
        Self { config }
    }

    /// Run one session to a terminal condition.
    ///
    /// `shutdown` is the cooperative cancellation signal: when it flips to
    /// true the runtime drains up to the grace period waiting for the
    /// agent's current step, then force-terminates and reports
    /// `Interrupted`. Every transcript event is forwarded to `on_event`
    /// before the runtime interprets it.
    pub async fn run(
        &self,
        transport: &dyn AgentTransport,
        request: SessionRequest,
        mut shutdown: watch::Receiver<bool>,
        on_event: &mut (dyn FnMut(&TranscriptEvent) + Send),
    ) -> SessionResult {
        let started = Instant::now();
        let model = request.model.clone();
        let deadline = started + self.config.hard_timeout;

        let mut result = SessionResult {
            outcome: SessionOutcome::Failure,
            turns: 0,
            usage: UsageTotals::default(),
            model,
            context_percent: 0.0,
            summary: None,
            error: None,
            stalled: false,
            duration: Duration::ZERO,
        };

        let mut stream = match transport.launch(request).await {
            Ok(stream) => stream,
            Err(err) => {
                result.error = Some(classify_transport_error(&err));
                result.duration = started.elapsed();
                return result;
            }
        };

        let mut completed = false;
        let mut last_message: Option<String> = None;

        loop {
            if *shutdown.borrow() {
                self.drain_for_shutdown(&mut *stream, &mut result, on_event, &mut last_message)
                    .await;
                result.duration = started.elapsed();
                return result;
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(elapsed = ?started.elapsed(), "session hit hard timeout");
                stream.terminate().await;
                result.outcome = SessionOutcome::Timeout;
                result.error = Some(ClassifiedError::new(
                    ErrorCategory::Timeout,
                    "session exceeded wall-clock limit",
                ));
                break;
            }
            let wait = deadline.saturating_duration_since(now).min(self.config.stall_silence);

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_ok() && *shutdown.borrow() {
                        self.drain_for_shutdown(&mut *stream, &mut result, on_event, &mut last_message).await;
                        result.duration = started.elapsed();
                        return result;
                    }
                }
                event = stream.next_event() => {
                    match event {
                        Some(event) => {
                            on_event(&event);
                            if self.apply_event(&event, &mut result, &mut completed, &mut last_message) {
                                stream.terminate().await;
                                break;
                            }
                        }
                        None => {
                            // End of stream without a completion frame.
                            let exit = stream.finish().await;
                            match exit.exit_code {
                                Some(0) => {
                                    result.outcome = SessionOutcome::Failure;
                                    result.error = Some(ClassifiedError::new(
                                        ErrorCategory::Unknown,
                                        "transcript ended without a completion signal",
                                    ));
                                }
                                code => {
                                    result.outcome = SessionOutcome::Crashed;
                                    result.error =
                                        Some(ClassifiedError::from_exit(code, &exit.stderr));
                                }
                            }
                            break;
                        }
                    }
                }
                _ = tokio::time::sleep(wait) => {
                    let stalled = Instant::now() < deadline;
                    if stalled {
                        warn!(silence = ?self.config.stall_silence, "no transcript events; session stalled");
                    }
                    stream.terminate().await;
                    result.outcome = SessionOutcome::Timeout;
                    result.stalled = stalled;
                    result.error = Some(ClassifiedError::new(
                        ErrorCategory::Timeout,
                        if stalled { "session stalled" } else { "session exceeded wall-clock limit" },
                    ));
                    break;
                }
            }

            if completed {
                break;
            }
        }

        if result.summary.is_none() {
            result.summary = last_message;
        }
        result.duration = started.elapsed();
        result
    }

    /// Interpret one event. Returns true when the session must stop now
    /// (handoff threshold crossed).
    fn apply_event(
        &self,
        event: &TranscriptEvent,
        result: &mut SessionResult,
        completed: &mut bool,
        last_message: &mut Option<String>,
    ) -> bool {
        match event {
            TranscriptEvent::Message { text } => {
                result.turns += 1;
                *last_message = Some(text.clone());
            }
            TranscriptEvent::UsageUpdate { model, .. } => {
                if let Some(usage) = event.usage_totals() {
                    result.usage += usage;
                }
                if let Some(model) = model {
                    result.model = model.clone();
                }
                result.context_percent = (result.usage.context_tokens() as f64
                    / self.config.context_window_tokens as f64)
                    * 100.0;
                if result.context_percent >= self.config.context_threshold_percent {
                    debug!(
                        context = result.context_percent,
                        threshold = self.config.context_threshold_percent,
                        "context threshold reached, handing off"
                    );
                    result.outcome = SessionOutcome::Handoff;
                    return true;
                }
            }
            TranscriptEvent::Completion { is_error, summary } => {
                *completed = true;
                result.summary = summary.clone();
                if *is_error {
                    result.outcome = SessionOutcome::Failure;
                    let message = summary.as_deref().unwrap_or("agent reported an error");
                    result.error = Some(ClassifiedError::from_message(message));
                } else {
                    result.outcome = SessionOutcome::Success;
                }
            }
            TranscriptEvent::Error { message } => {
                *completed = true;
                result.outcome = SessionOutcome::Failure;
                result.error = Some(ClassifiedError::from_message(message));
            }
            TranscriptEvent::ToolCall { .. } | TranscriptEvent::ToolResult { .. } => {}
        }
        false
    }

    /// Cooperative cancellation: give the agent up to the grace period to
    /// reach its completion frame, then force-terminate.
    async fn drain_for_shutdown(
        &self,
        stream: &mut dyn AgentStream,
        result: &mut SessionResult,
        on_event: &mut (dyn FnMut(&TranscriptEvent) + Send),
        last_message: &mut Option<String>,
    ) {
        let grace_deadline = Instant::now() + self.config.shutdown_grace;
        let mut completed = false;

        while Instant::now() < grace_deadline {
            let remaining = grace_deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, stream.next_event()).await {
                Ok(Some(event)) => {
                    on_event(&event);
                    let _ = self.apply_event(&event, result, &mut completed, last_message);
                    if completed {
                        break;
                    }
                }
                Ok(None) | Err(_) => break,
            }
        }

        stream.terminate().await;
        if !completed {
            result.outcome = SessionOutcome::Interrupted;
            result.error = None;
        }
    }
}

fn classify_transport_error(err: &TransportError) -> ClassifiedError {
    match err {
        TransportError::Unavailable(msg) => {
            ClassifiedError::new(ErrorCategory::Tooling, msg.clone())
        }
        TransportError::Spawn(e) => {
            ClassifiedError::new(ErrorCategory::Tooling, format!("failed to spawn agent: {e}"))
        }
    }
}
