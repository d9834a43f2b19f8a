//! Durable, dedupable, acknowledgeable alerts.
//!
//! The store persists to `.ada/alerts.json`, keeps the newest hundred, and
//! dedupes by `(kind, feature, message fingerprint)` within a sliding
//! window. A bus subscription maps session/feature events to alert
//! templates so failures are loud without any component calling the store
//! directly.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::events::{EventBus, HarnessEvent};
use crate::session::SessionOutcome;

/// Maximum alerts kept in storage; oldest beyond this are trimmed.
const MAX_ALERTS: usize = 100;

/// Default dedup window.
pub const DEDUP_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Error,
    Success,
}

/// One alert, as stored and served.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub severity: AlertSeverity,
    /// Machine-readable type tag, e.g. `session_failed`.
    pub kind: String,
    pub title: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub dismissed: bool,
    /// Dedup key: kind + feature + message fingerprint.
    pub dedup_key: String,
}

/// What a producer supplies; the store fills in identity and flags.
#[derive(Debug, Clone)]
pub struct AlertDraft {
    pub severity: AlertSeverity,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub feature_id: Option<String>,
    pub session_id: Option<String>,
}

impl AlertDraft {
    pub fn new(
        severity: AlertSeverity,
        kind: impl Into<String>,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            kind: kind.into(),
            title: title.into(),
            message: message.into(),
            feature_id: None,
            session_id: None,
        }
    }

    pub fn with_feature(mut self, feature_id: Option<String>) -> Self {
        self.feature_id = feature_id;
        self
    }

    pub fn with_session(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id;
        self
    }

    fn dedup_key(&self) -> String {
        format!(
            "{}|{}|{}",
            self.kind,
            self.feature_id.as_deref().unwrap_or("-"),
            fingerprint(&self.message)
        )
    }
}

/// Cheap stable fingerprint of a message (FNV-1a over the bytes).
fn fingerprint(text: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in text.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// The persistent alert store. Writes serialize behind one mutex.
pub struct AlertStore {
    path: PathBuf,
    inner: Mutex<Vec<Alert>>,
    dedup_window: Duration,
}

impl AlertStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self::open_with_window(path, DEDUP_WINDOW)
    }

    pub fn open_with_window(path: impl Into<PathBuf>, dedup_window: Duration) -> Self {
        let path = path.into();
        let alerts = Self::load_from(&path);
        Self {
            path,
            inner: Mutex::new(alerts),
            dedup_window,
        }
    }

    fn load_from(path: &PathBuf) -> Vec<Alert> {
        match fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
            Err(_) => Vec::new(),
        }
    }

    fn save(&self, alerts: &[Alert]) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(alerts)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let temp = self.path.with_extension("json.tmp");
        let mut file = fs::File::create(&temp)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        fs::rename(&temp, &self.path)
    }

    /// Add an alert unless an equal one landed within the dedup window.
    /// Returns the stored alert, or `None` when deduped.
    pub fn add(&self, draft: AlertDraft) -> Option<Alert> {
        let dedup_key = draft.dedup_key();
        let now = Utc::now();

        let mut alerts = self.inner.lock().ok()?;
        let window = chrono::Duration::from_std(self.dedup_window).ok()?;
        let duplicate = alerts
            .iter()
            .any(|a| a.dedup_key == dedup_key && now - a.timestamp < window);
        if duplicate {
            return None;
        }

        let alert = Alert {
            id: Uuid::new_v4().to_string(),
            severity: draft.severity,
            kind: draft.kind,
            title: draft.title,
            message: draft.message,
            timestamp: now,
            feature_id: draft.feature_id,
            session_id: draft.session_id,
            read: false,
            dismissed: false,
            dedup_key,
        };
        alerts.push(alert.clone());

        if alerts.len() > MAX_ALERTS {
            alerts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
            alerts.truncate(MAX_ALERTS);
        }
        if let Err(err) = self.save(&alerts) {
            warn!(?err, "failed to persist alerts");
        }
        Some(alert)
    }

    /// Newest first. Dismissed alerts are hidden unless asked for.
    pub fn list(&self, include_dismissed: bool) -> Vec<Alert> {
        let Ok(alerts) = self.inner.lock() else {
            return Vec::new();
        };
        let mut out: Vec<Alert> = alerts
            .iter()
            .filter(|a| include_dismissed || !a.dismissed)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        out
    }

    pub fn unread_count(&self) -> usize {
        self.inner
            .lock()
            .map(|alerts| alerts.iter().filter(|a| !a.read && !a.dismissed).count())
            .unwrap_or(0)
    }

    pub fn mark_read(&self, id: &str) -> bool {
        self.mutate(|alerts| {
            let Some(alert) = alerts.iter_mut().find(|a| a.id == id) else {
                return false;
            };
            alert.read = true;
            true
        })
    }

    pub fn mark_all_read(&self) -> usize {
        let mut count = 0;
        self.mutate(|alerts| {
            for alert in alerts.iter_mut().filter(|a| !a.read) {
                alert.read = true;
                count += 1;
            }
            count > 0
        });
        count
    }

    pub fn dismiss(&self, id: &str) -> bool {
        self.mutate(|alerts| {
            let Some(alert) = alerts.iter_mut().find(|a| a.id == id) else {
                return false;
            };
            alert.dismissed = true;
            alert.read = true;
            true
        })
    }

    fn mutate(&self, f: impl FnOnce(&mut Vec<Alert>) -> bool) -> bool {
        let Ok(mut alerts) = self.inner.lock() else {
            return false;
        };
        let changed = f(&mut alerts);
        if changed {
            if let Err(err) = self.save(&alerts) {
                warn!(?err, "failed to persist alerts");
            }
        }
        changed
    }
}

/// Map a bus event to an alert template. `None` means no alert.
pub fn alert_for_event(event: &HarnessEvent) -> Option<AlertDraft> {
    match event {
        HarnessEvent::SessionEnded {
            session_id,
            feature_id,
            outcome,
            error,
            ..
        } => match outcome {
            SessionOutcome::Failure | SessionOutcome::Crashed | SessionOutcome::Timeout => {
                let detail = error
                    .as_ref()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| outcome.label().to_string());
                Some(
                    AlertDraft::new(
                        AlertSeverity::Error,
                        "session_failed",
                        format!("Session {session_id} {}", outcome.label()),
                        detail,
                    )
                    .with_feature(feature_id.clone())
                    .with_session(Some(session_id.clone())),
                )
            }
            SessionOutcome::Handoff => Some(
                AlertDraft::new(
                    AlertSeverity::Info,
                    "session_handoff",
                    format!("Session {session_id} handed off"),
                    "Context threshold reached; work committed for the next session",
                )
                .with_feature(feature_id.clone())
                .with_session(Some(session_id.clone())),
            ),
            _ => None,
        },
        HarnessEvent::FeatureUpdated { feature_id, status } => match status.as_str() {
            "completed" => Some(
                AlertDraft::new(
                    AlertSeverity::Success,
                    "feature_completed",
                    format!("Feature {feature_id} completed"),
                    "All verification gates passed",
                )
                .with_feature(Some(feature_id.clone())),
            ),
            "blocked" => Some(
                AlertDraft::new(
                    AlertSeverity::Error,
                    "feature_blocked",
                    format!("Feature {feature_id} blocked"),
                    "Retry budget exhausted; manual attention needed",
                )
                .with_feature(Some(feature_id.clone())),
            ),
            _ => None,
        },
        _ => None,
    }
}

/// Subscribe the store to the bus: matching events become alerts and each
/// stored alert is republished as `alert.created`.
pub fn attach_to_bus(store: std::sync::Arc<AlertStore>, bus: EventBus) {
    let mut rx = bus.subscribe(256);
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let Some(draft) = alert_for_event(&event) {
                if let Some(alert) = store.add(draft) {
                    bus.publish(HarnessEvent::AlertCreated(alert));
                }
            }
        }
    });
}
