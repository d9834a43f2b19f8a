//! Backlog persistence, validation, and scheduling order.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use thiserror::Error;

use super::model::{Backlog, Feature, FeatureStatus};

/// Errors from backlog load, validation, or mutation.
#[derive(Error, Debug)]
pub enum BacklogError {
    #[error("backlog file not found: {0}")]
    NotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("backlog is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("backlog invalid: {0}")]
    Invalid(String),

    #[error("unknown feature: {0}")]
    UnknownFeature(String),

    #[error("feature {0} is completed and cannot change status")]
    CompletedImmutable(String),
}

/// Loads and saves the backlog document, validating on both paths.
#[derive(Debug, Clone)]
pub struct BacklogStore {
    path: PathBuf,
}

impl BacklogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load and validate the backlog.
    pub fn load(&self) -> Result<Backlog, BacklogError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(BacklogError::NotFound(self.path.clone()))
            }
            Err(err) => return Err(BacklogError::Io(err)),
        };
        let backlog: Backlog = serde_json::from_str(&content)?;
        validate(&backlog)?;
        Ok(backlog)
    }

    /// Validate and persist atomically via temp-file-rename.
    pub fn save(&self, backlog: &Backlog) -> Result<(), BacklogError> {
        validate(backlog)?;
        let json = serde_json::to_string_pretty(backlog)?;

        let temp_path = self.path.with_extension("json.tmp");
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }

    /// Apply a mutation to one feature, then persist.
    ///
    /// Refuses to regress a completed feature to any other status.
    pub fn update_feature<F>(
        &self,
        backlog: &mut Backlog,
        id: &str,
        mutate: F,
    ) -> Result<(), BacklogError>
    where
        F: FnOnce(&mut Feature),
    {
        let feature = backlog
            .feature_mut(id)
            .ok_or_else(|| BacklogError::UnknownFeature(id.to_string()))?;

        let before = feature.clone();
        mutate(feature);
        if before.status == FeatureStatus::Completed && feature.status != FeatureStatus::Completed
        {
            // Roll the in-memory state back so a rejected mutation leaves
            // no trace.
            *feature = before;
            return Err(BacklogError::CompletedImmutable(id.to_string()));
        }
        // sessions_spent is monotonic.
        if feature.sessions_spent < before.sessions_spent {
            feature.sessions_spent = before.sessions_spent;
        }

        backlog.last_updated = Utc::now();
        self.save(backlog)
    }

    /// Mark a feature in-progress for a new session. Bumps `sessions_spent`.
    pub fn mark_started(&self, backlog: &mut Backlog, id: &str) -> Result<(), BacklogError> {
        self.update_feature(backlog, id, |f| {
            f.status = FeatureStatus::InProgress;
            f.sessions_spent += 1;
            if f.started_at.is_none() {
                f.started_at = Some(Utc::now());
            }
        })
    }

    pub fn mark_completed(
        &self,
        backlog: &mut Backlog,
        id: &str,
        note: Option<String>,
    ) -> Result<(), BacklogError> {
        self.update_feature(backlog, id, |f| {
            f.status = FeatureStatus::Completed;
            f.completed_at = Some(Utc::now());
            if let Some(note) = note {
                f.implementation_notes.push(note);
            }
        })
    }

    pub fn mark_blocked(
        &self,
        backlog: &mut Backlog,
        id: &str,
        reason: String,
    ) -> Result<(), BacklogError> {
        self.update_feature(backlog, id, |f| {
            f.status = FeatureStatus::Blocked;
            f.implementation_notes.push(reason);
        })
    }
}

/// Structural invariants: unique ids, resolvable dependencies, no cycles,
/// finite priorities.
pub fn validate(backlog: &Backlog) -> Result<(), BacklogError> {
    let mut seen: HashSet<&str> = HashSet::new();
    for f in &backlog.features {
        if f.id.trim().is_empty() {
            return Err(BacklogError::Invalid("feature with empty id".to_string()));
        }
        if !seen.insert(f.id.as_str()) {
            return Err(BacklogError::Invalid(format!("duplicate feature id: {}", f.id)));
        }
    }

    for f in &backlog.features {
        for dep in &f.depends_on {
            if !seen.contains(dep.as_str()) {
                return Err(BacklogError::Invalid(format!(
                    "feature {} depends on unknown feature {dep}",
                    f.id
                )));
            }
        }
    }

    detect_cycle(backlog)?;
    Ok(())
}

fn detect_cycle(backlog: &Backlog) -> Result<(), BacklogError> {
    // Iterative DFS with coloring: 0 unvisited, 1 on stack, 2 done.
    let index: HashMap<&str, usize> = backlog
        .features
        .iter()
        .enumerate()
        .map(|(i, f)| (f.id.as_str(), i))
        .collect();
    let mut color = vec![0u8; backlog.features.len()];

    for start in 0..backlog.features.len() {
        if color[start] != 0 {
            continue;
        }
        let mut stack: Vec<(usize, usize)> = vec![(start, 0)];
        color[start] = 1;
        while let Some(&(node, edge)) = stack.last() {
            let deps = &backlog.features[node].depends_on;
            if edge >= deps.len() {
                color[node] = 2;
                stack.pop();
                continue;
            }
            if let Some(top) = stack.last_mut() {
                top.1 += 1;
            }
            // Dangling deps were rejected above, so the lookup is total.
            let next = index[deps[edge].as_str()];
            match color[next] {
                0 => {
                    color[next] = 1;
                    stack.push((next, 0));
                }
                1 => {
                    return Err(BacklogError::Invalid(format!(
                        "dependency cycle involving feature {}",
                        backlog.features[next].id
                    )))
                }
                _ => {}
            }
        }
    }
    Ok(())
}

/// Select the next runnable feature.
///
/// Candidates are features whose status is `in_progress` or `pending` and
/// whose dependencies are all `completed`. Order: in-progress before pending
/// (session continuity), then highest priority, then insertion order. Stable
/// across ties. Returns `None` when nothing is runnable.
pub fn select_next(backlog: &Backlog) -> Option<&Feature> {
    let completed: HashSet<&str> = backlog
        .features
        .iter()
        .filter(|f| f.status == FeatureStatus::Completed)
        .map(|f| f.id.as_str())
        .collect();

    backlog
        .features
        .iter()
        .filter(|f| {
            matches!(f.status, FeatureStatus::Pending | FeatureStatus::InProgress)
                && f.depends_on.iter().all(|d| completed.contains(d.as_str()))
        })
        // min_by_key with a rank tuple keeps insertion order on ties because
        // min_by_key returns the first minimum.
        .min_by_key(|f| (f.status != FeatureStatus::InProgress, -(f.priority as i64)))
}

/// True when the dependency graph is wedged: nothing is runnable, yet some
/// pending or in-progress feature is still waiting on dependencies that can
/// no longer complete. Features blocked by retry exhaustion do not count —
/// the scheduler is done with those, not stuck on them.
pub fn is_stuck(backlog: &Backlog) -> bool {
    select_next(backlog).is_none()
        && backlog
            .features
            .iter()
            .any(|f| matches!(f.status, FeatureStatus::Pending | FeatureStatus::InProgress))
}
