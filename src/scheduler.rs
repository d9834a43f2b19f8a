//! The harness loop.
//!
//! Top-level orchestration: preflight checks, checkpoint resume, then one
//! session at a time — select a feature, drive the runtime, interpret the
//! outcome through the classifier and retry policy, gate completion on the
//! verification pipeline, and persist everything before moving on. Exactly
//! one session runtime is active at any moment.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::alerts::{attach_to_bus, AlertStore};
use crate::backlog::{self, Backlog, BacklogStore, FeatureStatus};
use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::config::HarnessConfig;
use crate::error::classification::{ClassifiedError, ErrorCategory};
use crate::error::{HarnessError, Result};
use crate::events::{EventBus, HarnessEvent, StatusSnapshot};
use crate::logging::{SessionHistory, SessionIndex, SessionIndexEntry, SessionLogger, SessionRecord};
use crate::progress::{ProgressAction, ProgressEntry, ProgressLog};
use crate::prompts;
use crate::retry::RetryPolicy;
use crate::session::{
    AgentKind, AgentTransport, RuntimeConfig, SessionOutcome, SessionRequest, SessionResult,
    SessionRuntime, TranscriptEvent,
};
use crate::vcs::GitManager;
use crate::verify::{Approver, FeatureVerifier, VerificationReport};
use crate::workspace::Workspace;

/// How the scheduler process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Clean,
    Fatal,
    PreflightFailed,
    Interrupted,
}

impl ExitStatus {
    pub fn code(self) -> i32 {
        match self {
            ExitStatus::Clean => 0,
            ExitStatus::Fatal => 1,
            ExitStatus::PreflightFailed => 2,
            ExitStatus::Interrupted => 130,
        }
    }
}

/// What one feature attempt means for the loop.
enum Disposition {
    Completed,
    HandoffDone,
    VerificationFailed,
    Errored(ClassifiedError),
    Interrupted,
}

/// Cooperative shutdown trigger shared with signal handlers and the API.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Idempotent.
    pub fn request(&self) {
        let _ = self.tx.send(true);
    }
}

/// The long-running supervisor.
pub struct Harness {
    root: PathBuf,
    config: HarnessConfig,
    workspace: Workspace,
    backlog_store: BacklogStore,
    progress: ProgressLog,
    git: GitManager,
    bus: EventBus,
    alerts: Arc<AlertStore>,
    history: SessionHistory,
    index: SessionIndex,
    checkpoints: CheckpointStore,
    transport: Arc<dyn AgentTransport>,
    runtime: SessionRuntime,
    retry: RetryPolicy,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
    status: Arc<RwLock<StatusSnapshot>>,
    approver: Option<Box<Approver>>,
    sessions_run: u32,
    pending_handoff_notes: Option<String>,
}

impl Harness {
    pub fn new(
        root: impl Into<PathBuf>,
        config: HarnessConfig,
        transport: Arc<dyn AgentTransport>,
    ) -> Self {
        let root = root.into();
        let workspace = Workspace::new(&root);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let runtime = SessionRuntime::new(RuntimeConfig::from(&config));
        let retry = RetryPolicy::new(config.retry.clone());
        let bus = EventBus::new();
        let alerts = Arc::new(AlertStore::open(workspace.alerts_path()));

        Self {
            backlog_store: BacklogStore::new(root.join(&config.backlog_file)),
            progress: ProgressLog::new(root.join(&config.progress_file)),
            git: GitManager::new(&root).with_timeout(config.git_timeout),
            history: SessionHistory::new(workspace.history_path()),
            index: SessionIndex::new(
                workspace.index_path(),
                workspace.sessions_dir(),
                workspace.archive_dir(),
                config.session_log_cap_bytes,
            ),
            checkpoints: CheckpointStore::new(workspace.checkpoint_path()),
            bus,
            alerts,
            workspace,
            transport,
            runtime,
            retry,
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
            status: Arc::new(RwLock::new(StatusSnapshot::default())),
            approver: None,
            sessions_run: 0,
            pending_handoff_notes: None,
            root,
            config,
        }
    }

    /// Inject an approval callback for the manual-approval gate.
    pub fn with_approver(mut self, approver: Box<Approver>) -> Self {
        self.approver = Some(approver);
        self
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.shutdown_tx),
        }
    }

    pub fn bus(&self) -> EventBus {
        self.bus.clone()
    }

    pub fn alerts(&self) -> Arc<AlertStore> {
        Arc::clone(&self.alerts)
    }

    pub fn status(&self) -> Arc<RwLock<StatusSnapshot>> {
        Arc::clone(&self.status)
    }

    /// State handle for the telemetry API.
    pub fn api_state(&self) -> crate::api::ApiState {
        crate::api::ApiState {
            backlog_store: self.backlog_store.clone(),
            history: self.history.clone(),
            progress: self.progress.clone(),
            alerts: Arc::clone(&self.alerts),
            status: Arc::clone(&self.status),
            bus: self.bus.clone(),
        }
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown_rx.borrow() || self.workspace.stop_requested()
    }

    /// Run until the backlog drains, a fatal error stops us, or shutdown is
    /// requested.
    pub async fn run(&mut self) -> ExitStatus {
        attach_to_bus(Arc::clone(&self.alerts), self.bus.clone());
        self.spawn_signal_listener();
        self.spawn_stop_file_watcher();

        if let Err(err) = self.preflight().await {
            error!(%err, "preflight failed");
            return ExitStatus::PreflightFailed;
        }

        let mut backlog = match self.backlog_store.load() {
            Ok(b) => b,
            Err(err) => {
                error!(%err, "backlog failed to load after preflight");
                return ExitStatus::Fatal;
            }
        };

        if let Err(err) = self.startup(&backlog) {
            error!(%err, "startup failed");
            return ExitStatus::Fatal;
        }

        self.maybe_resume();

        // A fresh project gets the one-shot initializer session first.
        if !self.progress.exists() {
            match self.run_initializer(&backlog).await {
                Ok(true) => {}
                Ok(false) => {
                    error!("initializer session failed; stopping");
                    return ExitStatus::Fatal;
                }
                Err(err) => {
                    error!(%err, "initializer session errored");
                    return ExitStatus::Fatal;
                }
            }
        }

        let exit = self.main_loop(&mut backlog).await;
        self.publish_status(&backlog, false, None, None);
        exit
    }

    async fn main_loop(&mut self, backlog: &mut Backlog) -> ExitStatus {
        loop {
            if self.shutdown_requested() {
                return self
                    .graceful_shutdown(backlog, None, "shutdown requested", ExitStatus::Interrupted)
                    .await;
            }
            if let Some(max) = self.config.max_sessions {
                if self.sessions_run >= max {
                    info!(max, "session budget exhausted");
                    return self
                        .graceful_shutdown(
                            backlog,
                            None,
                            "session budget exhausted",
                            ExitStatus::Clean,
                        )
                        .await;
                }
            }

            let Some(feature_id) = backlog::select_next(backlog).map(|f| f.id.clone()) else {
                if backlog::is_stuck(backlog) {
                    error!("no runnable feature but work remains: dependency graph is wedged");
                    self.publish_feature_alert_state(backlog);
                    return ExitStatus::Fatal;
                }
                let counts = backlog.status_counts();
                info!(
                    completed = counts.completed,
                    blocked = counts.blocked,
                    "backlog drained"
                );
                let _ = self.progress.append(&ProgressEntry::new(
                    "scheduler",
                    None,
                    ProgressAction::Shutdown,
                    format!(
                        "backlog drained: {} completed, {} blocked",
                        counts.completed, counts.blocked
                    ),
                ));
                return ExitStatus::Clean;
            };

            match self.drive_feature(backlog, &feature_id).await {
                Ok(ExitDirective::Continue) => {}
                Ok(ExitDirective::Stop(status)) => return status,
                Err(err) => {
                    error!(%err, feature = %feature_id, "unrecoverable scheduler error");
                    return ExitStatus::Fatal;
                }
            }
        }
    }

    /// Attempt loop for one feature.
    async fn drive_feature(
        &mut self,
        backlog: &mut Backlog,
        feature_id: &str,
    ) -> Result<ExitDirective> {
        let mut attempt = self.checkpoints.attempt_for(feature_id);

        loop {
            if self.shutdown_requested() {
                return Ok(ExitDirective::Stop(
                    self.graceful_shutdown(
                        backlog,
                        Some(feature_id),
                        "shutdown requested",
                        ExitStatus::Interrupted,
                    )
                    .await,
                ));
            }
            if let Some(max) = self.config.max_sessions {
                if self.sessions_run >= max {
                    return Ok(ExitDirective::Stop(
                        self.graceful_shutdown(
                            backlog,
                            None,
                            "session budget exhausted",
                            ExitStatus::Clean,
                        )
                        .await,
                    ));
                }
            }

            let last_good = self.git.head_commit().await?;
            self.checkpoints
                .save(
                    &Checkpoint::new(feature_id, attempt)
                        .with_last_good_commit(last_good.clone())
                        .with_handoff_notes(self.pending_handoff_notes.clone()),
                )
                .map_err(|e| HarnessError::Checkpoint(e.to_string()))?;

            let disposition = self
                .run_coding_session(backlog, feature_id, attempt, last_good)
                .await?;

            match disposition {
                Disposition::Completed => return Ok(ExitDirective::Continue),
                Disposition::HandoffDone => return Ok(ExitDirective::Continue),
                Disposition::VerificationFailed => {
                    // Soft failure: real incomplete work, no delay. The
                    // attempt budget still bounds how often we re-run the
                    // agent against failing gates.
                    if attempt > self.retry.max_retries() {
                        warn!(feature = feature_id, attempt, "verification kept failing; blocking feature");
                        self.backlog_store.mark_blocked(
                            backlog,
                            feature_id,
                            format!("verification failed on all {attempt} attempts"),
                        )?;
                        self.pending_handoff_notes = None;
                        self.publish_feature_update(backlog, feature_id);
                        return Ok(ExitDirective::Continue);
                    }
                    attempt += 1;
                    continue;
                }
                Disposition::Interrupted => {
                    return Ok(ExitDirective::Stop(
                        self.graceful_shutdown(
                            backlog,
                            Some(feature_id),
                            "interrupted by user",
                            ExitStatus::Interrupted,
                        )
                        .await,
                    ));
                }
                Disposition::Errored(err) => {
                    if err.category.is_fatal() {
                        error!(%err, "fatal error; stopping the harness");
                        return Ok(ExitDirective::Stop(ExitStatus::Fatal));
                    }
                    let retries_so_far = attempt.saturating_sub(1);
                    if !self.retry.allows_retry(err.category, retries_so_far) {
                        warn!(%err, feature = feature_id, "retry budget exhausted; blocking feature");
                        self.backlog_store.mark_blocked(
                            backlog,
                            feature_id,
                            format!("blocked after {attempt} attempts: {err}"),
                        )?;
                        self.pending_handoff_notes = None;
                        self.publish_feature_update(backlog, feature_id);
                        return Ok(ExitDirective::Continue);
                    }
                    let delay = self.retry.delay(retries_so_far, err.category);
                    info!(
                        feature = feature_id,
                        attempt,
                        category = err.category.label(),
                        ?delay,
                        "retrying after classified error"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Run one coding session end to end: prompt, runtime, logging,
    /// outcome handling, persistence, events.
    async fn run_coding_session(
        &mut self,
        backlog: &mut Backlog,
        feature_id: &str,
        attempt: u32,
        last_good: Option<String>,
    ) -> Result<Disposition> {
        self.backlog_store.mark_started(backlog, feature_id)?;
        self.publish_feature_update(backlog, feature_id);

        let feature = backlog
            .feature(feature_id)
            .cloned()
            .ok_or_else(|| HarnessError::Persistence(format!("feature {feature_id} vanished")))?;

        let model = crate::model_select::ModelSelector::new(&self.config.model).select(&feature);
        let seq = self
            .history
            .next_seq()
            .map_err(|e| HarnessError::Persistence(e.to_string()))?;
        let session_id = format!("s{seq:03}");

        let progress_tail = self
            .progress
            .tail_kilobytes(prompts::PROGRESS_TAIL_KB)
            .unwrap_or_default();
        let prompt = prompts::render_coding_prompt(
            &feature,
            &progress_tail,
            self.pending_handoff_notes.as_deref(),
        );

        let mut logger = SessionLogger::start(
            &self.workspace.sessions_dir(),
            seq,
            &session_id,
            AgentKind::Coding,
            Some(feature_id.to_string()),
            &model,
            self.config.context_window_tokens,
        )?;
        logger.log_prompt("coding", &prompt)?;
        logger.log_checkpoint(feature_id, attempt)?;

        let _ = self.progress.append(&ProgressEntry::new(
            &session_id,
            Some(feature_id.to_string()),
            ProgressAction::SessionStart,
            format!("attempt {attempt} on {}: {}", feature.id, feature.name),
        ));
        self.bus.publish(HarnessEvent::SessionStarted {
            session_id: session_id.clone(),
            feature_id: Some(feature_id.to_string()),
            agent_kind: AgentKind::Coding.label().to_string(),
            model: model.clone(),
        });
        self.publish_status(backlog, true, Some(feature_id), Some(&session_id));

        let request = SessionRequest {
            prompt,
            model: model.clone(),
            cwd: self.root.clone(),
            max_turns: self.config.max_turns,
        };
        let result = self
            .run_with_logging(&mut logger, request)
            .await;
        self.sessions_run += 1;

        let files_changed = self
            .git
            .changed_files(last_good.as_deref())
            .await
            .unwrap_or_default();

        let disposition = self
            .finish_session(backlog, feature, logger, result, files_changed)
            .await?;
        self.backlog_store.save(backlog)?;
        self.bus.publish(HarnessEvent::BacklogUpdated {
            counts: backlog.status_counts(),
        });
        self.publish_status(backlog, true, None, None);
        Ok(disposition)
    }

    async fn run_with_logging(
        &self,
        logger: &mut SessionLogger,
        request: SessionRequest,
    ) -> SessionResult {
        let mut on_event = |event: &TranscriptEvent| {
            let outcome = match event {
                TranscriptEvent::Message { text } => logger.log_assistant(text),
                TranscriptEvent::ToolCall { id, name, input } => {
                    logger.log_tool_call(id, name, input)
                }
                TranscriptEvent::ToolResult {
                    id,
                    name,
                    output,
                    is_error,
                } => logger.log_tool_result(id, name, output, *is_error),
                TranscriptEvent::UsageUpdate { .. } => {
                    match event.usage_totals() {
                        Some(usage) => logger.log_usage(usage),
                        None => Ok(()),
                    }
                }
                TranscriptEvent::Completion { .. } | TranscriptEvent::Error { .. } => Ok(()),
            };
            if let Err(err) = outcome {
                warn!(?err, "failed to write session log entry");
            }
        };

        self.runtime
            .run(
                self.transport.as_ref(),
                request,
                self.shutdown_rx.clone(),
                &mut on_event,
            )
            .await
    }

    /// Interpret the runtime result: verification, commits, records,
    /// progress entries, events.
    async fn finish_session(
        &mut self,
        backlog: &mut Backlog,
        feature: crate::backlog::Feature,
        mut logger: SessionLogger,
        result: SessionResult,
        files_changed: Vec<String>,
    ) -> Result<Disposition> {
        let session_id = logger.session_id().to_string();
        let feature_id = feature.id.clone();

        let (disposition, commit, verification, handoff_notes) = match result.outcome {
            SessionOutcome::Success => {
                let report = self.verify_feature(&feature).await;
                if report.passed {
                    let message = format!("complete {}: {}", feature.id, feature.name);
                    let commit = if self.config.auto_commit {
                        self.git.commit_all(&message).await?
                    } else {
                        None
                    };
                    self.backlog_store.mark_completed(
                        backlog,
                        &feature_id,
                        result.summary.clone(),
                    )?;
                    self.pending_handoff_notes = None;
                    self.publish_feature_update(backlog, &feature_id);
                    (Disposition::Completed, commit, Some(report), None)
                } else {
                    let failing = report
                        .failed_gate
                        .map(|g| g.label().to_string())
                        .unwrap_or_else(|| "unknown".to_string());
                    warn!(feature = %feature_id, gate = %failing, "verification failed");
                    (Disposition::VerificationFailed, None, Some(report), None)
                }
            }
            SessionOutcome::Handoff => {
                let notes = result
                    .summary
                    .clone()
                    .unwrap_or_else(|| "context threshold reached".to_string());
                let message = format!("handoff: {} at {:.0}% context", feature.id, result.context_percent);
                let commit = if self.config.auto_commit {
                    self.git.commit_all(&message).await?
                } else {
                    None
                };
                self.pending_handoff_notes = Some(notes.clone());
                let _ = self.progress.append(
                    &ProgressEntry::new(
                        &session_id,
                        Some(feature_id.clone()),
                        ProgressAction::Handoff,
                        &notes,
                    )
                    .with_files(files_changed.clone())
                    .with_commit(commit.clone()),
                );
                (Disposition::HandoffDone, commit, None, Some(notes))
            }
            SessionOutcome::Interrupted => {
                (Disposition::Interrupted, None, None, result.summary.clone())
            }
            SessionOutcome::Failure | SessionOutcome::Timeout | SessionOutcome::Crashed => {
                let err = result.error.clone().unwrap_or_else(|| {
                    ClassifiedError::new(ErrorCategory::Unknown, "session failed without detail")
                });
                if let Err(log_err) = logger.log_error(&err) {
                    warn!(?log_err, "failed to log session error");
                }
                (Disposition::Errored(err), None, None, None)
            }
        };

        let error = match &disposition {
            Disposition::Errored(err) => Some(err.clone()),
            _ => None,
        };
        let record = logger.finish(
            result.outcome,
            result.turns,
            result.usage,
            files_changed,
            commit.clone(),
            error,
            verification,
            handoff_notes,
        )?;

        self.persist_record(&record)?;

        let _ = self.progress.append(
            &ProgressEntry::new(
                &session_id,
                Some(feature_id.clone()),
                ProgressAction::SessionEnd,
                format!(
                    "outcome {} after {} turns ({:.1}% context)",
                    result.outcome.label(),
                    result.turns,
                    result.context_percent
                ),
            )
            .with_commit(commit),
        );
        self.bus.publish(HarnessEvent::ProgressUpdate {
            entry: format!("session {session_id}: {}", result.outcome.label()),
        });
        self.publish_session_end(&record);

        Ok(disposition)
    }

    fn persist_record(&self, record: &SessionRecord) -> Result<()> {
        self.history
            .append(record.clone())
            .map_err(|e| HarnessError::Persistence(format!("history: {e}")))?;
        let size = self
            .workspace
            .sessions_dir()
            .join(&record.file)
            .metadata()
            .map(|m| m.len())
            .unwrap_or(0);
        self.index
            .upsert(SessionIndexEntry::from_record(record, size))
            .map_err(|e| HarnessError::Persistence(format!("index: {e}")))?;
        Ok(())
    }

    fn publish_session_end(&self, record: &SessionRecord) {
        self.bus.publish(HarnessEvent::SessionEnded {
            session_id: record.session_id.clone(),
            feature_id: record.feature_id.clone(),
            outcome: record.outcome,
            turns: record.turns,
            cost_usd: record.cost_usd,
            error: record.error.clone(),
        });
        let total = self
            .history
            .cost_summary(None)
            .map(|s| s.total_cost_usd)
            .unwrap_or(0.0);
        self.bus.publish(HarnessEvent::CostUpdate {
            session_id: record.session_id.clone(),
            session_cost_usd: record.cost_usd,
            total_cost_usd: total,
        });
    }

    async fn verify_feature(&self, feature: &crate::backlog::Feature) -> VerificationReport {
        if self.config.verification.is_noop() {
            return VerificationReport::passing();
        }
        let verifier = FeatureVerifier::new(
            &self.root,
            self.workspace.hooks_dir(),
            self.config.verification.clone(),
        );
        verifier.verify(feature, self.approver.as_deref()).await
    }

    /// One-shot initializer session on a fresh project. Returns whether it
    /// succeeded.
    async fn run_initializer(&mut self, backlog: &Backlog) -> Result<bool> {
        info!("no progress log found; running initializer session");
        let seq = self
            .history
            .next_seq()
            .map_err(|e| HarnessError::Persistence(e.to_string()))?;
        let session_id = format!("s{seq:03}");
        let prompt = prompts::render_initializer_prompt(backlog);

        let mut logger = SessionLogger::start(
            &self.workspace.sessions_dir(),
            seq,
            &session_id,
            AgentKind::Initializer,
            None,
            &self.config.model,
            self.config.context_window_tokens,
        )?;
        logger.log_prompt("initializer", &prompt)?;

        self.bus.publish(HarnessEvent::SessionStarted {
            session_id: session_id.clone(),
            feature_id: None,
            agent_kind: AgentKind::Initializer.label().to_string(),
            model: self.config.model.clone(),
        });

        let request = SessionRequest {
            prompt,
            model: self.config.model.clone(),
            cwd: self.root.clone(),
            max_turns: self.config.max_turns,
        };
        let result = self.run_with_logging(&mut logger, request).await;
        self.sessions_run += 1;

        let succeeded = result.outcome == SessionOutcome::Success;
        if succeeded {
            self.progress.initialize(&backlog.project_name)?;
            let _ = self.progress.append(&ProgressEntry::new(
                &session_id,
                None,
                ProgressAction::SessionEnd,
                result
                    .summary
                    .clone()
                    .unwrap_or_else(|| "environment initialized".to_string()),
            ));
        }

        let record = logger.finish(
            result.outcome,
            result.turns,
            result.usage,
            Vec::new(),
            None,
            result.error.clone(),
            None,
            None,
        )?;
        self.persist_record(&record)?;
        self.publish_session_end(&record);
        Ok(succeeded)
    }

    /// Pre-flight health checks. Any error aborts with exit code 2.
    async fn preflight(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if !self.git.is_repo().await {
            errors.push("not a git repository".to_string());
        } else if !self.config.allow_dirty {
            match self.git.status().await {
                Ok(status) if status.has_changes() => errors.push(format!(
                    "working tree is dirty ({} modified, {} untracked); commit, stash, or pass --allow-dirty",
                    status.modified.len(),
                    status.untracked.len()
                )),
                Ok(_) => {}
                Err(err) => errors.push(format!("git status failed: {err}")),
            }
        }

        if !self.transport.available() {
            errors.push(format!(
                "agent transport unreachable: {}",
                self.transport.describe()
            ));
        }

        match self.backlog_store.load() {
            Ok(backlog) => info!(features = backlog.features.len(), "backlog validated"),
            Err(err) => errors.push(format!("backlog: {err}")),
        }

        match self.workspace.free_disk_mb() {
            Ok(mb) if mb < 100 => errors.push(format!("low disk space: {mb} MB free")),
            Ok(_) => {}
            Err(err) => warn!(%err, "could not check disk space"),
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(HarnessError::Preflight(errors.join("; ")))
        }
    }

    fn startup(&self, backlog: &Backlog) -> Result<()> {
        self.workspace.ensure_structure()?;
        if self.workspace.read_project()?.is_none() {
            self.workspace.write_project(&crate::workspace::ProjectInfo {
                project_name: backlog.project_name.clone(),
                description: String::new(),
                created_at: chrono::Utc::now(),
            })?;
        }
        Ok(())
    }

    /// Pick up where a previous process left off.
    fn maybe_resume(&mut self) {
        let Ok(Some(checkpoint)) = self.checkpoints.load() else {
            return;
        };
        info!(
            feature = checkpoint.feature_id,
            attempt = checkpoint.attempt,
            "resuming from checkpoint"
        );
        self.pending_handoff_notes = checkpoint.handoff_notes;
    }

    /// Commit whatever is staged, record the shutdown, and clean up.
    async fn graceful_shutdown(
        &mut self,
        backlog: &mut Backlog,
        feature_id: Option<&str>,
        reason: &str,
        exit: ExitStatus,
    ) -> ExitStatus {
        info!(reason, "graceful shutdown");

        let commit = match self.git.status().await {
            Ok(status) if status.has_changes() => {
                match self.git.commit_all("wip: interrupted by shutdown").await {
                    Ok(hash) => hash,
                    Err(err) => {
                        warn!(%err, "failed to commit during shutdown");
                        None
                    }
                }
            }
            _ => None,
        };

        let summary = match &commit {
            Some(hash) => format!("{reason}; committed work in progress ({hash})"),
            None => format!("{reason}; no changes to commit"),
        };
        let _ = self.progress.append(
            &ProgressEntry::new(
                "scheduler",
                feature_id.map(str::to_string),
                ProgressAction::Shutdown,
                summary,
            )
            .with_commit(commit),
        );

        if let Err(err) = self.backlog_store.save(backlog) {
            warn!(%err, "failed to save backlog during shutdown");
        }
        let _ = self.workspace.clear_stop_request();
        self.publish_status(backlog, false, None, None);
        exit
    }

    fn spawn_signal_listener(&self) {
        let handle = self.shutdown_handle();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received; finishing current step");
                handle.request();
            }
        });
    }

    fn spawn_stop_file_watcher(&self) {
        let workspace = Workspace::new(self.root.clone());
        let handle = self.shutdown_handle();
        tokio::spawn(async move {
            loop {
                if workspace.stop_requested() {
                    warn!("stop request file detected");
                    handle.request();
                    return;
                }
                tokio::time::sleep(std::time::Duration::from_secs(2)).await;
            }
        });
    }

    fn publish_feature_update(&self, backlog: &Backlog, feature_id: &str) {
        if let Some(feature) = backlog.feature(feature_id) {
            self.bus.publish(HarnessEvent::FeatureUpdated {
                feature_id: feature_id.to_string(),
                status: feature.status.label().to_string(),
            });
        }
    }

    fn publish_feature_alert_state(&self, backlog: &Backlog) {
        for feature in &backlog.features {
            if feature.status == FeatureStatus::Blocked {
                self.publish_feature_update(backlog, &feature.id);
            }
        }
    }

    fn publish_status(
        &self,
        backlog: &Backlog,
        running: bool,
        feature_id: Option<&str>,
        session_id: Option<&str>,
    ) {
        let snapshot = StatusSnapshot {
            running,
            current_feature_id: feature_id.map(str::to_string),
            current_session_id: session_id.map(str::to_string),
            context_percent: 0.0,
            counts: backlog.status_counts(),
            sessions_run: self.sessions_run,
        };
        if let Ok(mut status) = self.status.write() {
            *status = snapshot.clone();
        }
        self.bus.publish(HarnessEvent::StatusUpdated(snapshot));
    }
}

enum ExitDirective {
    Continue,
    Stop(ExitStatus),
}
