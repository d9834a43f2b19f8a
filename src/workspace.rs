//! Project workspace layout.
//!
//! Owns the `.ada/` directory structure under the project root: project
//! identity, scheduler state, session logs, archives, hooks, and the
//! stop-request marker.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const ADA_DIR: &str = ".ada";

/// Project identity document stored at `.ada/project.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub project_name: String,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Paths and setup for the observability workspace.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ada_dir(&self) -> PathBuf {
        self.root.join(ADA_DIR)
    }

    pub fn project_file(&self) -> PathBuf {
        self.ada_dir().join("project.json")
    }

    pub fn state_dir(&self) -> PathBuf {
        self.ada_dir().join("state")
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.state_dir().join("session.json")
    }

    pub fn history_path(&self) -> PathBuf {
        self.state_dir().join("history.json")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.ada_dir().join("logs")
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.logs_dir().join("sessions")
    }

    pub fn index_path(&self) -> PathBuf {
        self.logs_dir().join("index.json")
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.logs_dir().join("archive")
    }

    pub fn alerts_path(&self) -> PathBuf {
        self.ada_dir().join("alerts.json")
    }

    pub fn hooks_dir(&self) -> PathBuf {
        self.ada_dir().join("hooks")
    }

    pub fn stop_request_path(&self) -> PathBuf {
        self.ada_dir().join("stop-requested")
    }

    /// Create the directory skeleton. Idempotent.
    pub fn ensure_structure(&self) -> io::Result<()> {
        fs::create_dir_all(self.state_dir())?;
        fs::create_dir_all(self.sessions_dir())?;
        fs::create_dir_all(self.archive_dir())?;
        fs::create_dir_all(self.hooks_dir())?;
        Ok(())
    }

    pub fn read_project(&self) -> io::Result<Option<ProjectInfo>> {
        match fs::read_to_string(self.project_file()) {
            Ok(content) => Ok(serde_json::from_str(&content).ok()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub fn write_project(&self, info: &ProjectInfo) -> io::Result<()> {
        self.ensure_structure()?;
        let json = serde_json::to_string_pretty(info)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let temp = self.project_file().with_extension("json.tmp");
        let mut file = fs::File::create(&temp)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        fs::rename(&temp, self.project_file())
    }

    /// Free disk space under the project root, in megabytes.
    pub fn free_disk_mb(&self) -> io::Result<u64> {
        let bytes = fs2::available_space(&self.root)?;
        Ok(bytes / (1024 * 1024))
    }

    /// Whether an out-of-band stop has been requested.
    pub fn stop_requested(&self) -> bool {
        self.stop_request_path().exists()
    }

    /// Write the stop-request marker with a reason.
    pub fn request_stop(&self, reason: &str) -> io::Result<()> {
        self.ensure_structure()?;
        fs::write(
            self.stop_request_path(),
            format!("{}\n{reason}\n", Utc::now().to_rfc3339()),
        )
    }

    /// Remove the stop-request marker if present.
    pub fn clear_stop_request(&self) -> io::Result<()> {
        match fs::remove_file(self.stop_request_path()) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_ensure_structure_creates_tree() {
        let temp = TempDir::new().unwrap();
        let ws = Workspace::new(temp.path());
        ws.ensure_structure().unwrap();

        assert!(ws.state_dir().is_dir());
        assert!(ws.sessions_dir().is_dir());
        assert!(ws.archive_dir().is_dir());
        assert!(ws.hooks_dir().is_dir());
    }

    #[test]
    fn test_ensure_structure_idempotent() {
        let temp = TempDir::new().unwrap();
        let ws = Workspace::new(temp.path());
        ws.ensure_structure().unwrap();
        ws.ensure_structure().unwrap();
    }

    #[test]
    fn test_project_round_trip() {
        let temp = TempDir::new().unwrap();
        let ws = Workspace::new(temp.path());
        let info = ProjectInfo {
            project_name: "demo".to_string(),
            description: "a demo project".to_string(),
            created_at: Utc::now(),
        };
        ws.write_project(&info).unwrap();
        assert_eq!(ws.read_project().unwrap().unwrap(), info);
    }

    #[test]
    fn test_stop_request_lifecycle() {
        let temp = TempDir::new().unwrap();
        let ws = Workspace::new(temp.path());
        assert!(!ws.stop_requested());

        ws.request_stop("user asked").unwrap();
        assert!(ws.stop_requested());

        ws.clear_stop_request().unwrap();
        assert!(!ws.stop_requested());
        // Clearing twice is fine.
        ws.clear_stop_request().unwrap();
    }

    #[test]
    fn test_free_disk_reports_something() {
        let temp = TempDir::new().unwrap();
        let ws = Workspace::new(temp.path());
        assert!(ws.free_disk_mb().unwrap() > 0);
    }
}
