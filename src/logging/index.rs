//! Session index and archive rotation.
//!
//! `index.json` holds one summary entry per session. When the sessions
//! directory grows past the size cap, the oldest logs are bundled into a
//! monthly tar under the archive directory and their entries are marked
//! archived.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::SessionRecord;

/// Summary of one session in the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionIndexEntry {
    pub session_id: String,
    pub file: String,
    pub agent_kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub outcome: String,
    pub turns: u32,
    pub tokens_total: u64,
    pub cost_usd: f64,
    pub size_bytes: u64,
    #[serde(default)]
    pub archived: bool,
}

impl SessionIndexEntry {
    pub fn from_record(record: &SessionRecord, size_bytes: u64) -> Self {
        Self {
            session_id: record.session_id.clone(),
            file: record.file.clone(),
            agent_kind: record.agent_kind.label().to_string(),
            feature_id: record.feature_id.clone(),
            started_at: record.started_at,
            ended_at: record.ended_at,
            outcome: record.outcome.label().to_string(),
            turns: record.turns,
            tokens_total: record.usage.total(),
            cost_usd: record.cost_usd,
            size_bytes,
            archived: false,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexDocument {
    sessions: Vec<SessionIndexEntry>,
}

/// The `index.json` store plus rotation policy.
#[derive(Debug, Clone)]
pub struct SessionIndex {
    index_path: PathBuf,
    sessions_dir: PathBuf,
    archive_dir: PathBuf,
    cap_bytes: u64,
}

impl SessionIndex {
    pub fn new(
        index_path: impl Into<PathBuf>,
        sessions_dir: impl Into<PathBuf>,
        archive_dir: impl Into<PathBuf>,
        cap_bytes: u64,
    ) -> Self {
        Self {
            index_path: index_path.into(),
            sessions_dir: sessions_dir.into(),
            archive_dir: archive_dir.into(),
            cap_bytes,
        }
    }

    pub fn load(&self) -> io::Result<Vec<SessionIndexEntry>> {
        match fs::read_to_string(&self.index_path) {
            Ok(content) => {
                let doc: IndexDocument = serde_json::from_str(&content).unwrap_or_default();
                Ok(doc.sessions)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(err),
        }
    }

    fn save(&self, sessions: &[SessionIndexEntry]) -> io::Result<()> {
        if let Some(parent) = self.index_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let doc = IndexDocument {
            sessions: sessions.to_vec(),
        };
        let json = serde_json::to_string_pretty(&doc)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let temp = self.index_path.with_extension("json.tmp");
        let mut file = fs::File::create(&temp)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        fs::rename(&temp, &self.index_path)
    }

    /// Add or replace the entry for a session, then rotate if the directory
    /// exceeds the cap.
    pub fn upsert(&self, entry: SessionIndexEntry) -> io::Result<()> {
        let mut sessions = self.load()?;
        match sessions
            .iter_mut()
            .find(|e| e.session_id == entry.session_id)
        {
            Some(existing) => *existing = entry,
            None => sessions.push(entry),
        }
        self.save(&sessions)?;
        self.rotate_if_needed()
    }

    fn live_size_bytes(&self) -> io::Result<u64> {
        let mut total = 0;
        if !self.sessions_dir.exists() {
            return Ok(0);
        }
        for entry in fs::read_dir(&self.sessions_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                total += entry.metadata()?.len();
            }
        }
        Ok(total)
    }

    /// Move the oldest sessions into the monthly archive until the live
    /// directory is back under the cap.
    pub fn rotate_if_needed(&self) -> io::Result<()> {
        let mut live = self.live_size_bytes()?;
        if live <= self.cap_bytes {
            return Ok(());
        }

        let mut sessions = self.load()?;
        // Oldest first among still-live entries.
        let mut order: Vec<usize> = (0..sessions.len())
            .filter(|&i| !sessions[i].archived)
            .collect();
        order.sort_by_key(|&i| sessions[i].started_at);

        for i in order {
            if live <= self.cap_bytes {
                break;
            }
            let path = self.sessions_dir.join(&sessions[i].file);
            if !path.is_file() {
                sessions[i].archived = true;
                continue;
            }
            let size = path.metadata()?.len();
            self.append_to_archive(&path, &sessions[i].file)?;
            fs::remove_file(&path)?;
            sessions[i].archived = true;
            live = live.saturating_sub(size);
            info!(file = %sessions[i].file, "archived session log");
        }

        self.save(&sessions)
    }

    /// Archive bundle path for the current month.
    fn archive_path(&self) -> PathBuf {
        self.archive_dir
            .join(format!("{}.tar", Utc::now().format("%Y%m")))
    }

    /// Append a file to the monthly tar. tar does not support in-place
    /// append through the builder, so the existing bundle is rebuilt with
    /// the new entry and swapped in atomically.
    fn append_to_archive(&self, file_path: &Path, name_in_archive: &str) -> io::Result<()> {
        fs::create_dir_all(&self.archive_dir)?;
        let archive_path = self.archive_path();

        let mut builder = tar::Builder::new(Vec::new());

        if archive_path.is_file() {
            let existing = fs::File::open(&archive_path)?;
            let mut archive = tar::Archive::new(existing);
            for entry in archive.entries()? {
                let mut entry = entry?;
                let mut header = entry.header().clone();
                let path = entry.path()?.into_owned();
                let mut data = Vec::new();
                io::copy(&mut entry, &mut data)?;
                builder.append_data(&mut header, path, data.as_slice())?;
            }
        }

        let mut file = fs::File::open(file_path)?;
        builder.append_file(name_in_archive, &mut file)?;
        let bytes = builder.into_inner()?;

        let temp = archive_path.with_extension("tar.tmp");
        fs::write(&temp, bytes)?;
        fs::rename(&temp, &archive_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::UsageTotals;
    use crate::session::{AgentKind, SessionOutcome};
    use tempfile::TempDir;

    fn record(id: &str, file: &str) -> SessionRecord {
        SessionRecord {
            session_id: id.to_string(),
            file: file.to_string(),
            agent_kind: AgentKind::Coding,
            feature_id: Some("feat-1".to_string()),
            model: "sonnet".to_string(),
            started_at: Utc::now(),
            ended_at: Utc::now(),
            outcome: SessionOutcome::Success,
            turns: 3,
            usage: UsageTotals { input: 100, output: 50, ..Default::default() },
            cost_usd: 0.01,
            files_changed: vec![],
            commit: None,
            error: None,
            verification: None,
            handoff_notes: None,
        }
    }

    fn index_in(temp: &TempDir, cap: u64) -> SessionIndex {
        SessionIndex::new(
            temp.path().join("logs/index.json"),
            temp.path().join("logs/sessions"),
            temp.path().join("logs/archive"),
            cap,
        )
    }

    #[test]
    fn test_upsert_inserts_and_replaces() {
        let temp = TempDir::new().unwrap();
        let index = index_in(&temp, u64::MAX);

        index
            .upsert(SessionIndexEntry::from_record(&record("s1", "a.jsonl"), 10))
            .unwrap();
        let mut entry = SessionIndexEntry::from_record(&record("s1", "a.jsonl"), 10);
        entry.outcome = "handoff".to_string();
        index.upsert(entry).unwrap();

        let sessions = index.load().unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].outcome, "handoff");
    }

    #[test]
    fn test_load_missing_index_is_empty() {
        let temp = TempDir::new().unwrap();
        assert!(index_in(&temp, 100).load().unwrap().is_empty());
    }

    #[test]
    fn test_rotation_archives_oldest_first() {
        let temp = TempDir::new().unwrap();
        let index = index_in(&temp, 1500);
        let sessions_dir = temp.path().join("logs/sessions");
        fs::create_dir_all(&sessions_dir).unwrap();

        // Three 1 KB logs against a 1.5 KB cap: the two oldest must go.
        for (i, name) in ["old.jsonl", "mid.jsonl", "new.jsonl"].iter().enumerate() {
            fs::write(sessions_dir.join(name), "x".repeat(1024)).unwrap();
            let mut rec = record(&format!("s{i}"), name);
            rec.started_at = Utc::now() - chrono::Duration::hours(3 - i as i64);
            index
                .upsert(SessionIndexEntry::from_record(&rec, 1024))
                .unwrap();
        }

        let sessions = index.load().unwrap();
        let archived: Vec<&str> = sessions
            .iter()
            .filter(|e| e.archived)
            .map(|e| e.file.as_str())
            .collect();
        assert_eq!(archived, vec!["old.jsonl", "mid.jsonl"]);
        assert!(!sessions_dir.join("old.jsonl").exists());
        assert!(sessions_dir.join("new.jsonl").exists());

        // Bundle exists and contains both archived files.
        let archive_dir = temp.path().join("logs/archive");
        let bundles: Vec<_> = fs::read_dir(&archive_dir).unwrap().collect();
        assert_eq!(bundles.len(), 1);
        let bundle = fs::File::open(bundles[0].as_ref().unwrap().path()).unwrap();
        let mut archive = tar::Archive::new(bundle);
        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().display().to_string())
            .collect();
        assert!(names.contains(&"old.jsonl".to_string()));
        assert!(names.contains(&"mid.jsonl".to_string()));
    }

    #[test]
    fn test_no_rotation_under_cap() {
        let temp = TempDir::new().unwrap();
        let index = index_in(&temp, u64::MAX);
        let sessions_dir = temp.path().join("logs/sessions");
        fs::create_dir_all(&sessions_dir).unwrap();
        fs::write(sessions_dir.join("a.jsonl"), "data").unwrap();

        index
            .upsert(SessionIndexEntry::from_record(&record("s1", "a.jsonl"), 4))
            .unwrap();
        assert!(sessions_dir.join("a.jsonl").exists());
        assert!(!index.load().unwrap()[0].archived);
    }
}
