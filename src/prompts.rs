//! Session prompt rendering.
//!
//! The initializer prompt runs once on a fresh project; the coding prompt
//! carries the feature, its acceptance criteria, the tail of the progress
//! log, and any handoff notes from the previous session.

use crate::backlog::{Backlog, Feature};

/// Kilobytes of progress log tail included in coding prompts.
pub const PROGRESS_TAIL_KB: usize = 8;

pub fn render_initializer_prompt(backlog: &Backlog) -> String {
    let mut prompt = format!(
        "You are setting up the development environment for the project \
         \"{}\".\n\nRead the feature backlog below, inspect the repository, \
         install anything the build needs, and record what you learned in \
         the progress log. Do not implement features yet.\n\n## Backlog\n",
        backlog.project_name
    );
    for feature in &backlog.features {
        prompt.push_str(&format!(
            "- {} ({}): {}\n",
            feature.id,
            feature.category.label(),
            feature.name
        ));
    }
    prompt.push_str(
        "\nWhen the environment builds and tests run, commit your setup \
         changes and finish.\n",
    );
    prompt
}

pub fn render_coding_prompt(
    feature: &Feature,
    progress_tail: &str,
    handoff_notes: Option<&str>,
) -> String {
    let mut prompt = format!(
        "Implement the following feature, committing as you go.\n\n\
         ## Feature {}: {}\n\n{}\n",
        feature.id, feature.name, feature.description
    );

    if !feature.acceptance_criteria.is_empty() {
        prompt.push_str("\n## Acceptance criteria\n");
        for (i, criterion) in feature.acceptance_criteria.iter().enumerate() {
            prompt.push_str(&format!("{}. {criterion}\n", i + 1));
        }
    }

    if !feature.implementation_notes.is_empty() {
        prompt.push_str("\n## Notes from earlier sessions\n");
        for note in &feature.implementation_notes {
            prompt.push_str(&format!("- {note}\n"));
        }
    }

    if let Some(notes) = handoff_notes {
        prompt.push_str(&format!("\n## Handoff from the previous session\n{notes}\n"));
    }

    if !progress_tail.trim().is_empty() {
        prompt.push_str(&format!("\n## Recent progress log\n{progress_tail}\n"));
    }

    prompt.push_str(
        "\nWork incrementally. When every acceptance criterion is met, \
         commit the final state and finish with a short summary of what \
         you changed. If you run low on context, commit what you have and \
         summarize where you stopped.\n",
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backlog::Feature;

    #[test]
    fn test_coding_prompt_includes_feature_and_criteria() {
        let mut feature = Feature::new("feat-1", "Parser").with_description("Parse the file");
        feature.acceptance_criteria = vec!["parses valid input".to_string()];

        let prompt = render_coding_prompt(&feature, "", None);
        assert!(prompt.contains("feat-1"));
        assert!(prompt.contains("Parse the file"));
        assert!(prompt.contains("1. parses valid input"));
        assert!(!prompt.contains("Handoff from the previous session"));
    }

    #[test]
    fn test_coding_prompt_includes_handoff_notes() {
        let feature = Feature::new("feat-1", "Parser");
        let prompt = render_coding_prompt(&feature, "recent entries", Some("lexer is done"));
        assert!(prompt.contains("lexer is done"));
        assert!(prompt.contains("recent entries"));
    }

    #[test]
    fn test_initializer_prompt_lists_backlog() {
        let mut backlog = Backlog::new("demo", "/tmp/demo");
        backlog.features.push(Feature::new("a", "First thing"));
        let prompt = render_initializer_prompt(&backlog);
        assert!(prompt.contains("demo"));
        assert!(prompt.contains("First thing"));
    }
}
