//! Cumulative session history.
//!
//! Every finalized session lands in `.ada/state/history.json`. Cost and
//! projection endpoints aggregate from here; the persisted totals are the
//! single source of truth for money spent.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::cost::CostSummary;

use super::SessionRecord;

#[derive(Debug, Default, Serialize, Deserialize)]
struct HistoryDocument {
    sessions: Vec<SessionRecord>,
}

/// Load/append store over the history document.
#[derive(Debug, Clone)]
pub struct SessionHistory {
    path: PathBuf,
}

impl SessionHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> io::Result<Vec<SessionRecord>> {
        match fs::read_to_string(&self.path) {
            Ok(content) => {
                let doc: HistoryDocument = serde_json::from_str(&content).unwrap_or_default();
                Ok(doc.sessions)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(err),
        }
    }

    pub fn append(&self, record: SessionRecord) -> io::Result<()> {
        let mut sessions = self.load()?;
        sessions.push(record);
        self.save(&sessions)
    }

    fn save(&self, sessions: &[SessionRecord]) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let doc = HistoryDocument {
            sessions: sessions.to_vec(),
        };
        let json = serde_json::to_string_pretty(&doc)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let temp = self.path.with_extension("json.tmp");
        let mut file = fs::File::create(&temp)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        fs::rename(&temp, &self.path)
    }

    /// Next session sequence number (1-based).
    pub fn next_seq(&self) -> io::Result<u32> {
        Ok(self.load()?.len() as u32 + 1)
    }

    /// Aggregate cost across sessions, optionally limited to the last
    /// `days` days.
    pub fn cost_summary(&self, days: Option<u32>) -> io::Result<CostSummary> {
        let cutoff = days.map(|d| Utc::now() - Duration::days(d as i64));
        let mut summary = CostSummary::default();
        for record in self.load()? {
            if let Some(cutoff) = cutoff {
                if record.ended_at < cutoff {
                    continue;
                }
            }
            summary.record(&record.model, record.usage, record.cost_usd);
        }
        Ok(summary)
    }

    /// Records for one feature, in insertion order.
    pub fn for_feature(&self, feature_id: &str) -> io::Result<Vec<SessionRecord>> {
        Ok(self
            .load()?
            .into_iter()
            .filter(|r| r.feature_id.as_deref() == Some(feature_id))
            .collect())
    }
}
