//! Backlog document types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a feature in the backlog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureStatus {
    Pending,
    InProgress,
    Completed,
    Blocked,
}

impl FeatureStatus {
    pub fn label(self) -> &'static str {
        match self {
            FeatureStatus::Pending => "pending",
            FeatureStatus::InProgress => "in_progress",
            FeatureStatus::Completed => "completed",
            FeatureStatus::Blocked => "blocked",
        }
    }
}

/// Category of feature work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureCategory {
    Functional,
    Infrastructure,
    Testing,
    Documentation,
    Bugfix,
    Refactor,
}

impl Default for FeatureCategory {
    fn default() -> Self {
        FeatureCategory::Functional
    }
}

impl FeatureCategory {
    pub fn label(self) -> &'static str {
        match self {
            FeatureCategory::Functional => "functional",
            FeatureCategory::Infrastructure => "infrastructure",
            FeatureCategory::Testing => "testing",
            FeatureCategory::Documentation => "documentation",
            FeatureCategory::Bugfix => "bugfix",
            FeatureCategory::Refactor => "refactor",
        }
    }
}

fn default_status() -> FeatureStatus {
    FeatureStatus::Pending
}

/// A single feature/task in the backlog.
///
/// JSON-structured so the agent is less likely to corrupt it by accident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    /// Unique identifier (slug).
    pub id: String,
    /// Short name for the feature.
    pub name: String,
    /// Detailed description of what to implement.
    pub description: String,
    #[serde(default)]
    pub category: FeatureCategory,
    #[serde(default = "default_status")]
    pub status: FeatureStatus,
    /// Higher number = higher priority.
    #[serde(default)]
    pub priority: i32,
    /// Explicit steps to verify completion.
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    /// Ids of features this depends on.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Number of agent sessions spent on this feature. Never decreases.
    #[serde(default)]
    pub sessions_spent: u32,
    /// Notes left by agents and the scheduler during implementation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub implementation_notes: Vec<String>,
    /// Per-feature model override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_override: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Feature {
    /// Minimal feature with defaults, for construction in code and tests.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            category: FeatureCategory::default(),
            status: FeatureStatus::Pending,
            priority: 0,
            acceptance_criteria: Vec::new(),
            depends_on: Vec::new(),
            sessions_spent: 0,
            implementation_notes: Vec::new(),
            model_override: None,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_depends_on(mut self, deps: Vec<String>) -> Self {
        self.depends_on = deps;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status == FeatureStatus::Completed
    }
}

/// Per-status counts, used by the status endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub blocked: usize,
    pub total: usize,
}

/// The full feature backlog for a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Backlog {
    pub project_name: String,
    /// Absolute path to the project root.
    pub project_path: String,
    #[serde(default)]
    pub features: Vec<Feature>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub last_updated: DateTime<Utc>,
}

impl Backlog {
    pub fn new(project_name: impl Into<String>, project_path: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            project_name: project_name.into(),
            project_path: project_path.into(),
            features: Vec::new(),
            created_at: now,
            last_updated: now,
        }
    }

    pub fn feature(&self, id: &str) -> Option<&Feature> {
        self.features.iter().find(|f| f.id == id)
    }

    pub fn feature_mut(&mut self, id: &str) -> Option<&mut Feature> {
        self.features.iter_mut().find(|f| f.id == id)
    }

    /// All features completed?
    pub fn is_complete(&self) -> bool {
        self.features
            .iter()
            .all(|f| f.status == FeatureStatus::Completed)
    }

    pub fn status_counts(&self) -> StatusCounts {
        let mut counts = StatusCounts {
            total: self.features.len(),
            ..Default::default()
        };
        for f in &self.features {
            match f.status {
                FeatureStatus::Pending => counts.pending += 1,
                FeatureStatus::InProgress => counts.in_progress += 1,
                FeatureStatus::Completed => counts.completed += 1,
                FeatureStatus::Blocked => counts.blocked += 1,
            }
        }
        counts
    }
}
