//! Verification pipeline: ordered quality gates run before a feature is
//! marked complete.
//!
//! Gate order is lint, type-check, unit tests, end-to-end tests, coverage,
//! pre-complete hook, manual approval. Every gate is optional by
//! configuration; the first failure aborts the pipeline and the feature
//! stays in progress.

mod coverage;
mod hook;
mod pipeline;

pub use coverage::{parse_coverage_report, CoverageError};
pub use hook::find_hook_script;
pub use pipeline::{Approver, FeatureVerifier};

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::duration_secs;

/// Kind of verification gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateKind {
    Lint,
    TypeCheck,
    UnitTests,
    E2eTests,
    Coverage,
    Hook,
    Approval,
}

impl GateKind {
    pub fn label(self) -> &'static str {
        match self {
            GateKind::Lint => "lint",
            GateKind::TypeCheck => "type_check",
            GateKind::UnitTests => "unit_tests",
            GateKind::E2eTests => "e2e_tests",
            GateKind::Coverage => "coverage",
            GateKind::Hook => "hook",
            GateKind::Approval => "approval",
        }
    }
}

/// The result of running a single gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateResult {
    pub gate: GateKind,
    pub passed: bool,
    pub message: String,
    /// Captured output (stdout + stderr), truncated to a bounded size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub duration_ms: u64,
}

impl GateResult {
    pub fn pass(gate: GateKind, message: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            gate,
            passed: true,
            message: message.into(),
            details: None,
            duration_ms,
        }
    }

    pub fn fail(
        gate: GateKind,
        message: impl Into<String>,
        details: Option<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            gate,
            passed: false,
            message: message.into(),
            details,
            duration_ms,
        }
    }
}

/// Report across all gates for one verification run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub passed: bool,
    pub results: Vec<GateResult>,
    /// First failing gate, when any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_gate: Option<GateKind>,
}

impl VerificationReport {
    pub fn passing() -> Self {
        Self {
            passed: true,
            results: Vec::new(),
            failed_gate: None,
        }
    }

    pub fn push(&mut self, result: GateResult) {
        if !result.passed {
            self.passed = false;
            if self.failed_gate.is_none() {
                self.failed_gate = Some(result.gate);
            }
        }
        self.results.push(result);
    }
}

/// Configuration for the pipeline. A `None` command disables that gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lint_command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_check_command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e2e_command: Option<String>,
    /// Appended to the e2e command as a filter when a feature provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e2e_filter_template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage_command: Option<String>,
    /// Report files probed after the coverage command, first hit wins.
    #[serde(default)]
    pub coverage_report_paths: Vec<String>,
    /// Minimum acceptable total coverage percent.
    pub coverage_threshold: f64,
    /// Run the project-local pre-complete hook when present.
    pub run_hook: bool,
    /// Require approval for every feature.
    pub approval_required: bool,
    /// Feature ids that always require approval.
    #[serde(default)]
    pub approval_features: Vec<String>,
    /// Timeout applied to each gate command.
    #[serde(with = "duration_secs")]
    pub gate_timeout: Duration,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            lint_command: None,
            type_check_command: None,
            test_command: None,
            e2e_command: None,
            e2e_filter_template: None,
            coverage_command: None,
            coverage_report_paths: vec![
                "coverage/coverage-summary.json".to_string(),
                "coverage.json".to_string(),
            ],
            coverage_threshold: 0.0,
            run_hook: true,
            approval_required: false,
            approval_features: Vec::new(),
            gate_timeout: Duration::from_secs(300),
        }
    }
}

impl VerificationConfig {
    /// A configuration with every gate disabled.
    pub fn disabled() -> Self {
        Self {
            run_hook: false,
            ..Default::default()
        }
    }

    pub fn with_test_command(mut self, command: impl Into<String>) -> Self {
        self.test_command = Some(command.into());
        self
    }

    pub fn with_lint_command(mut self, command: impl Into<String>) -> Self {
        self.lint_command = Some(command.into());
        self
    }

    pub fn is_noop(&self) -> bool {
        self.lint_command.is_none()
            && self.type_check_command.is_none()
            && self.test_command.is_none()
            && self.e2e_command.is_none()
            && self.coverage_command.is_none()
            && !self.run_hook
            && !self.approval_required
            && self.approval_features.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_tracks_first_failure() {
        let mut report = VerificationReport::passing();
        report.push(GateResult::pass(GateKind::Lint, "ok", 5));
        report.push(GateResult::fail(GateKind::UnitTests, "2 failed", None, 10));
        report.push(GateResult::fail(GateKind::Coverage, "low", None, 3));

        assert!(!report.passed);
        assert_eq!(report.failed_gate, Some(GateKind::UnitTests));
        assert_eq!(report.results.len(), 3);
    }

    #[test]
    fn test_disabled_config_is_noop() {
        assert!(VerificationConfig::disabled().is_noop());
        assert!(!VerificationConfig::disabled()
            .with_test_command("cargo test")
            .is_noop());
    }

    #[test]
    fn test_gate_kind_labels() {
        assert_eq!(GateKind::UnitTests.label(), "unit_tests");
        assert_eq!(GateKind::TypeCheck.label(), "type_check");
    }
}
