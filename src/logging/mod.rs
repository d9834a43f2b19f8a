//! Session observability: JSONL logs, the session index, and the cumulative
//! history that cost reporting aggregates from.

mod history;
mod index;
mod session_log;

pub use history::SessionHistory;
pub use index::{SessionIndex, SessionIndexEntry};
pub use session_log::{read_session_log, LogEntry, SessionLogger};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cost::UsageTotals;
use crate::error::classification::ClassifiedError;
use crate::session::{AgentKind, SessionOutcome};
use crate::verify::VerificationReport;

/// One finalized session: the record persisted to history and summarized in
/// the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    /// Log filename relative to the sessions directory.
    pub file: String,
    pub agent_kind: AgentKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_id: Option<String>,
    pub model: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub outcome: SessionOutcome,
    pub turns: u32,
    pub usage: UsageTotals,
    pub cost_usd: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files_changed: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ClassifiedError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handoff_notes: Option<String>,
}
