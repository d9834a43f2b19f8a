//! Append-only progress log.
//!
//! A human-readable narrative of what each session did, consumed by the next
//! session as priming context and by the dashboard. Entries are delimited,
//! timestamped, and never edited in place. Truncation is never automatic.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};

/// Shape of a progress entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressAction {
    SessionStart,
    SessionEnd,
    Handoff,
    Shutdown,
}

impl ProgressAction {
    fn label(self) -> &'static str {
        match self {
            ProgressAction::SessionStart => "start",
            ProgressAction::SessionEnd => "end",
            ProgressAction::Handoff => "handoff",
            ProgressAction::Shutdown => "shutdown",
        }
    }
}

/// One timestamped block appended to the log.
#[derive(Debug, Clone)]
pub struct ProgressEntry {
    pub session_id: String,
    pub feature_id: Option<String>,
    pub action: ProgressAction,
    pub summary: String,
    pub files_changed: Vec<String>,
    pub commit: Option<String>,
}

impl ProgressEntry {
    pub fn new(
        session_id: impl Into<String>,
        feature_id: Option<String>,
        action: ProgressAction,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            feature_id,
            action,
            summary: summary.into(),
            files_changed: Vec::new(),
            commit: None,
        }
    }

    pub fn with_files(mut self, files: Vec<String>) -> Self {
        self.files_changed = files;
        self
    }

    pub fn with_commit(mut self, commit: Option<String>) -> Self {
        self.commit = commit;
        self
    }
}

/// Append-only writer/reader over the progress file.
#[derive(Debug, Clone)]
pub struct ProgressLog {
    path: PathBuf,
}

impl ProgressLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Write the opening banner for a fresh project.
    pub fn initialize(&self, project_name: &str) -> io::Result<()> {
        let header = format!(
            "# Progress log for {project_name}\n# Started {}\n\n",
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        fs::write(&self.path, header)
    }

    /// Append one delimited entry.
    pub fn append(&self, entry: &ProgressEntry) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let ts = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let feature = entry.feature_id.as_deref().unwrap_or("-");
        writeln!(
            file,
            "=== {ts} | session {} | feature {feature} | {} ===",
            entry.session_id,
            entry.action.label()
        )?;
        writeln!(file, "{}", entry.summary.trim_end())?;
        if !entry.files_changed.is_empty() {
            writeln!(file, "files: {}", entry.files_changed.join(", "))?;
        }
        if let Some(commit) = &entry.commit {
            writeln!(file, "commit: {commit}")?;
        }
        writeln!(file)?;
        file.sync_data()?;
        Ok(())
    }

    /// The whole log.
    pub fn read_full(&self) -> io::Result<String> {
        match fs::read_to_string(&self.path) {
            Ok(s) => Ok(s),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(String::new()),
            Err(err) => Err(err),
        }
    }

    /// Last `lines` lines, skipping `offset` lines from the end first.
    pub fn tail_lines(&self, lines: usize, offset: usize) -> io::Result<String> {
        let content = self.read_full()?;
        let all: Vec<&str> = content.lines().collect();
        let end = all.len().saturating_sub(offset);
        let start = end.saturating_sub(lines);
        Ok(all[start..end].join("\n"))
    }

    /// Last `kb` kilobytes, aligned to the first whole line.
    pub fn tail_kilobytes(&self, kb: usize) -> io::Result<String> {
        let content = self.read_full()?;
        let limit = kb * 1024;
        if content.len() <= limit {
            return Ok(content);
        }
        let tail_start = content.len() - limit;
        // Align down to a line boundary so the caller never sees a torn line.
        let aligned = content[tail_start..]
            .find('\n')
            .map(|i| tail_start + i + 1)
            .unwrap_or(tail_start);
        Ok(content[aligned..].to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn log_in(dir: &TempDir) -> ProgressLog {
        ProgressLog::new(dir.path().join("claude-progress.txt"))
    }

    #[test]
    fn test_append_creates_delimited_entry() {
        let temp = TempDir::new().unwrap();
        let log = log_in(&temp);
        log.append(&ProgressEntry::new(
            "s001",
            Some("feat-x".to_string()),
            ProgressAction::SessionStart,
            "Starting work on feat-x",
        ))
        .unwrap();

        let content = log.read_full().unwrap();
        assert!(content.contains("session s001"));
        assert!(content.contains("feature feat-x"));
        assert!(content.contains("| start ==="));
        assert!(content.contains("Starting work on feat-x"));
    }

    #[test]
    fn test_append_is_append_only() {
        let temp = TempDir::new().unwrap();
        let log = log_in(&temp);
        log.append(&ProgressEntry::new(
            "s001",
            None,
            ProgressAction::SessionStart,
            "first",
        ))
        .unwrap();
        log.append(&ProgressEntry::new(
            "s001",
            None,
            ProgressAction::SessionEnd,
            "second",
        ))
        .unwrap();

        let content = log.read_full().unwrap();
        let first_pos = content.find("first").unwrap();
        let second_pos = content.find("second").unwrap();
        assert!(first_pos < second_pos);
    }

    #[test]
    fn test_entry_records_commit_and_files() {
        let temp = TempDir::new().unwrap();
        let log = log_in(&temp);
        log.append(
            &ProgressEntry::new("s002", None, ProgressAction::Handoff, "partial work")
                .with_files(vec!["src/a.rs".to_string()])
                .with_commit(Some("abc1234".to_string())),
        )
        .unwrap();

        let content = log.read_full().unwrap();
        assert!(content.contains("files: src/a.rs"));
        assert!(content.contains("commit: abc1234"));
    }

    #[test]
    fn test_tail_lines() {
        let temp = TempDir::new().unwrap();
        let log = log_in(&temp);
        for i in 0..20 {
            log.append(&ProgressEntry::new(
                format!("s{i:03}"),
                None,
                ProgressAction::SessionEnd,
                format!("entry {i}"),
            ))
            .unwrap();
        }

        let tail = log.tail_lines(4, 0).unwrap();
        assert!(tail.contains("entry 19"));
        assert!(!tail.contains("entry 0\n"));
    }

    #[test]
    fn test_tail_lines_with_offset() {
        let temp = TempDir::new().unwrap();
        let log = log_in(&temp);
        fs::write(log.path(), "a\nb\nc\nd\ne\n").unwrap();
        let tail = log.tail_lines(2, 1).unwrap();
        assert_eq!(tail, "c\nd");
    }

    #[test]
    fn test_tail_kilobytes_alignment() {
        let temp = TempDir::new().unwrap();
        let log = log_in(&temp);
        let mut content = String::new();
        for i in 0..200 {
            content.push_str(&format!("line number {i} with some padding text\n"));
        }
        fs::write(log.path(), &content).unwrap();

        let tail = log.tail_kilobytes(1).unwrap();
        assert!(tail.len() <= 1024);
        assert!(tail.starts_with("line number"));
    }

    #[test]
    fn test_read_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let log = log_in(&temp);
        assert_eq!(log.read_full().unwrap(), "");
        assert_eq!(log.tail_lines(10, 0).unwrap(), "");
    }
}
