//! Per-session JSONL logging.
//!
//! One file per session, one event per line, flushed per line so the
//! telemetry API can stream a live session. The logger owns turn and usage
//! tallies and produces the finalized [`SessionRecord`] at session end.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cost::{calculate_cost, UsageTotals};
use crate::error::classification::ClassifiedError;
use crate::session::{AgentKind, SessionOutcome};
use crate::verify::VerificationReport;

use super::SessionRecord;

/// One line in a session log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogEntry {
    SessionStart {
        timestamp: DateTime<Utc>,
        session_id: String,
        agent_kind: AgentKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        feature_id: Option<String>,
        model: String,
    },
    Prompt {
        timestamp: DateTime<Utc>,
        name: String,
        length: usize,
        text: String,
    },
    Assistant {
        timestamp: DateTime<Utc>,
        turn: u32,
        content: String,
    },
    ToolCall {
        timestamp: DateTime<Utc>,
        turn: u32,
        id: String,
        tool: String,
        input: Value,
    },
    ToolResult {
        timestamp: DateTime<Utc>,
        turn: u32,
        id: String,
        tool: String,
        output: String,
        is_error: bool,
    },
    UsageUpdate {
        timestamp: DateTime<Utc>,
        turn: u32,
        usage: UsageTotals,
        totals: UsageTotals,
        context_percent: f64,
    },
    Error {
        timestamp: DateTime<Utc>,
        turn: u32,
        category: String,
        message: String,
    },
    Checkpoint {
        timestamp: DateTime<Utc>,
        feature_id: String,
        attempt: u32,
    },
    SessionEnd {
        timestamp: DateTime<Utc>,
        session_id: String,
        outcome: SessionOutcome,
        turns: u32,
        usage: UsageTotals,
        cost_usd: f64,
        duration_seconds: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        commit: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        handoff_notes: Option<String>,
    },
}

/// Tool output carried in log lines is capped to keep files readable.
const TOOL_OUTPUT_CAP: usize = 50_000;

/// Writes one session's JSONL file.
pub struct SessionLogger {
    file: File,
    path: PathBuf,
    file_name: String,
    session_id: String,
    agent_kind: AgentKind,
    feature_id: Option<String>,
    model: String,
    context_window_tokens: u64,
    started_at: DateTime<Utc>,
    turn: u32,
    totals: UsageTotals,
}

impl SessionLogger {
    /// Open the log file and write the `session_start` entry.
    ///
    /// The filename is `<YYYYMMDD>_<NNN>_<agent>_<feature>.jsonl`.
    #[allow(clippy::too_many_arguments)]
    pub fn start(
        sessions_dir: &Path,
        seq: u32,
        session_id: impl Into<String>,
        agent_kind: AgentKind,
        feature_id: Option<String>,
        model: impl Into<String>,
        context_window_tokens: u64,
    ) -> io::Result<Self> {
        let session_id = session_id.into();
        let model = model.into();
        let started_at = Utc::now();

        let feature_slug = feature_id.as_deref().unwrap_or("none").replace('/', "-");
        let file_name = format!(
            "{}_{:03}_{}_{}.jsonl",
            started_at.format("%Y%m%d"),
            seq,
            agent_kind.label(),
            feature_slug
        );
        let path = sessions_dir.join(&file_name);
        std::fs::create_dir_all(sessions_dir)?;
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        let mut logger = Self {
            file,
            path,
            file_name,
            session_id: session_id.clone(),
            agent_kind,
            feature_id: feature_id.clone(),
            model: model.clone(),
            context_window_tokens,
            started_at,
            turn: 0,
            totals: UsageTotals::default(),
        };
        logger.write(&LogEntry::SessionStart {
            timestamp: started_at,
            session_id,
            agent_kind,
            feature_id,
            model,
        })?;
        Ok(logger)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn write(&mut self, entry: &LogEntry) -> io::Result<()> {
        let line = serde_json::to_string(entry)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        writeln!(self.file, "{line}")?;
        // Per-line flush keeps live tails accurate.
        self.file.sync_data()
    }

    pub fn log_prompt(&mut self, name: &str, text: &str) -> io::Result<()> {
        self.write(&LogEntry::Prompt {
            timestamp: Utc::now(),
            name: name.to_string(),
            length: text.len(),
            text: text.to_string(),
        })
    }

    pub fn log_assistant(&mut self, content: &str) -> io::Result<()> {
        self.turn += 1;
        self.write(&LogEntry::Assistant {
            timestamp: Utc::now(),
            turn: self.turn,
            content: content.to_string(),
        })
    }

    pub fn log_tool_call(&mut self, id: &str, tool: &str, input: &Value) -> io::Result<()> {
        self.write(&LogEntry::ToolCall {
            timestamp: Utc::now(),
            turn: self.turn,
            id: id.to_string(),
            tool: tool.to_string(),
            input: input.clone(),
        })
    }

    pub fn log_tool_result(
        &mut self,
        id: &str,
        tool: &str,
        output: &str,
        is_error: bool,
    ) -> io::Result<()> {
        let capped = if output.len() > TOOL_OUTPUT_CAP {
            let mut end = TOOL_OUTPUT_CAP;
            while !output.is_char_boundary(end) {
                end -= 1;
            }
            &output[..end]
        } else {
            output
        };
        self.write(&LogEntry::ToolResult {
            timestamp: Utc::now(),
            turn: self.turn,
            id: id.to_string(),
            tool: tool.to_string(),
            output: capped.to_string(),
            is_error,
        })
    }

    pub fn log_usage(&mut self, usage: UsageTotals) -> io::Result<()> {
        self.totals += usage;
        let context_percent = (self.totals.context_tokens() as f64
            / self.context_window_tokens as f64)
            * 100.0;
        self.write(&LogEntry::UsageUpdate {
            timestamp: Utc::now(),
            turn: self.turn,
            usage,
            totals: self.totals,
            context_percent,
        })
    }

    pub fn log_error(&mut self, error: &ClassifiedError) -> io::Result<()> {
        self.write(&LogEntry::Error {
            timestamp: Utc::now(),
            turn: self.turn,
            category: error.category.label().to_string(),
            message: error.message.clone(),
        })
    }

    pub fn log_checkpoint(&mut self, feature_id: &str, attempt: u32) -> io::Result<()> {
        self.write(&LogEntry::Checkpoint {
            timestamp: Utc::now(),
            feature_id: feature_id.to_string(),
            attempt,
        })
    }

    /// Write `session_end` and produce the finalized record.
    #[allow(clippy::too_many_arguments)]
    pub fn finish(
        mut self,
        outcome: SessionOutcome,
        turns: u32,
        usage: UsageTotals,
        files_changed: Vec<String>,
        commit: Option<String>,
        error: Option<ClassifiedError>,
        verification: Option<VerificationReport>,
        handoff_notes: Option<String>,
    ) -> io::Result<SessionRecord> {
        let ended_at = Utc::now();
        // Prefer runtime-accumulated totals when present; the logger's own
        // tally only covers frames that were logged.
        let usage = if usage.is_empty() { self.totals } else { usage };
        let cost_usd = calculate_cost(usage, &self.model);
        let duration = (ended_at - self.started_at).num_milliseconds() as f64 / 1000.0;

        self.write(&LogEntry::SessionEnd {
            timestamp: ended_at,
            session_id: self.session_id.clone(),
            outcome,
            turns,
            usage,
            cost_usd,
            duration_seconds: duration,
            commit: commit.clone(),
            handoff_notes: handoff_notes.clone(),
        })?;

        Ok(SessionRecord {
            session_id: self.session_id,
            file: self.file_name,
            agent_kind: self.agent_kind,
            feature_id: self.feature_id,
            model: self.model,
            started_at: self.started_at,
            ended_at,
            outcome,
            turns,
            usage,
            cost_usd,
            files_changed,
            commit,
            error,
            verification,
            handoff_notes,
        })
    }
}

/// Read every entry from a session log, skipping torn lines.
pub fn read_session_log(path: &Path) -> io::Result<Vec<LogEntry>> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err),
    };
    let mut entries = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        if let Ok(entry) = serde_json::from_str(&line) {
            entries.push(entry);
        }
    }
    Ok(entries)
}
