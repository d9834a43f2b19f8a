//! Adaptive model selection.
//!
//! A per-feature `model_override` always wins. Otherwise the choice falls
//! out of a cheap complexity heuristic: categories and keywords that tend
//! to need deeper reasoning get the complex model, documentation-grade work
//! gets the simple one, everything else uses the default.

use crate::backlog::{Feature, FeatureCategory};

/// Keywords in a feature's name/description that suggest hard work.
const COMPLEX_KEYWORDS: &[&str] = &[
    "architecture",
    "concurrency",
    "migration",
    "refactor",
    "security",
    "protocol",
    "data model",
    "distributed",
];

/// Keywords that suggest mechanical work.
const SIMPLE_KEYWORDS: &[&str] = &["typo", "rename", "comment", "readme", "changelog"];

/// Picks a model per feature.
#[derive(Debug, Clone)]
pub struct ModelSelector {
    pub default_model: String,
    pub complex_model: String,
    pub simple_model: String,
}

impl ModelSelector {
    pub fn new(default_model: impl Into<String>) -> Self {
        Self {
            default_model: default_model.into(),
            complex_model: "claude-opus-4-5-20251101".to_string(),
            simple_model: "claude-haiku-4-5-20251001".to_string(),
        }
    }

    pub fn select(&self, feature: &Feature) -> String {
        if let Some(model) = &feature.model_override {
            return model.clone();
        }

        let text = format!("{} {}", feature.name, feature.description).to_lowercase();
        if COMPLEX_KEYWORDS.iter().any(|k| text.contains(k))
            || matches!(feature.category, FeatureCategory::Refactor)
        {
            return self.complex_model.clone();
        }
        if matches!(feature.category, FeatureCategory::Documentation)
            || SIMPLE_KEYWORDS.iter().any(|k| text.contains(k))
        {
            return self.simple_model.clone();
        }
        self.default_model.clone()
    }
}
