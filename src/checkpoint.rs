//! Scheduler checkpoint: resumable position across process restarts.
//!
//! A singleton document overwritten atomically after each terminal session
//! event. On startup the scheduler reuses the attempt counter it finds here.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Resumable scheduler state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub feature_id: String,
    /// 1-based attempt number within the feature.
    pub attempt: u32,
    /// HEAD observed before the attempt started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_good_commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handoff_notes: Option<String>,
    pub saved_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(feature_id: impl Into<String>, attempt: u32) -> Self {
        Self {
            feature_id: feature_id.into(),
            attempt,
            last_good_commit: None,
            handoff_notes: None,
            saved_at: Utc::now(),
        }
    }

    pub fn with_last_good_commit(mut self, commit: Option<String>) -> Self {
        self.last_good_commit = commit;
        self
    }

    pub fn with_handoff_notes(mut self, notes: Option<String>) -> Self {
        self.handoff_notes = notes;
        self
    }
}

/// Atomic load/save/clear over the checkpoint file.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> io::Result<Option<Checkpoint>> {
        match fs::read_to_string(&self.path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(cp) => Ok(Some(cp)),
                // A corrupt checkpoint is treated as absent rather than
                // wedging startup.
                Err(_) => Ok(None),
            },
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub fn save(&self, checkpoint: &Checkpoint) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(checkpoint)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let temp_path = self.path.with_extension("json.tmp");
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        fs::rename(&temp_path, &self.path)
    }

    pub fn clear(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Attempt counter to use for a feature: the stored one when the
    /// checkpoint refers to the same feature, otherwise 1.
    pub fn attempt_for(&self, feature_id: &str) -> u32 {
        match self.load() {
            Ok(Some(cp)) if cp.feature_id == feature_id => cp.attempt,
            _ => 1,
        }
    }
}
