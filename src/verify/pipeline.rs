//! Gate execution.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::info;

use crate::backlog::Feature;

use super::coverage::parse_coverage_report;
use super::hook::{
    find_hook_script, hook_invocation, ENV_FEATURE_CATEGORY, ENV_FEATURE_ID, ENV_FEATURE_NAME,
    ENV_PROJECT_ROOT,
};
use super::{GateKind, GateResult, VerificationConfig, VerificationReport};

/// Injected approval decision, used instead of an interactive prompt.
pub type Approver = dyn Fn(&Feature) -> bool + Send + Sync;

/// Bound on captured gate output carried in reports.
const OUTPUT_CAP: usize = 16 * 1024;

struct CommandOutcome {
    success: bool,
    output: String,
    timed_out: bool,
    duration: Duration,
}

/// Runs the ordered verification gates for one feature.
pub struct FeatureVerifier {
    project_root: PathBuf,
    hooks_dir: PathBuf,
    config: VerificationConfig,
}

impl FeatureVerifier {
    pub fn new(
        project_root: impl Into<PathBuf>,
        hooks_dir: impl Into<PathBuf>,
        config: VerificationConfig,
    ) -> Self {
        Self {
            project_root: project_root.into(),
            hooks_dir: hooks_dir.into(),
            config,
        }
    }

    /// Run all configured gates in order, stopping at the first failure.
    pub async fn verify(&self, feature: &Feature, approver: Option<&Approver>) -> VerificationReport {
        let mut report = VerificationReport::passing();

        let command_gates: [(GateKind, Option<&String>); 4] = [
            (GateKind::Lint, self.config.lint_command.as_ref()),
            (GateKind::TypeCheck, self.config.type_check_command.as_ref()),
            (GateKind::UnitTests, self.config.test_command.as_ref()),
            (GateKind::E2eTests, self.config.e2e_command.as_ref()),
        ];

        for (gate, command) in command_gates {
            let Some(command) = command else { continue };
            let command = if gate == GateKind::E2eTests {
                self.e2e_command_for(feature, command)
            } else {
                command.clone()
            };
            let result = self.run_gate(gate, &command).await;
            let failed = !result.passed;
            report.push(result);
            if failed {
                return report;
            }
        }

        if self.config.coverage_command.is_some() {
            let result = self.check_coverage().await;
            let failed = !result.passed;
            report.push(result);
            if failed {
                return report;
            }
        }

        if self.config.run_hook {
            if let Some(result) = self.run_hook(feature).await {
                let failed = !result.passed;
                report.push(result);
                if failed {
                    return report;
                }
            }
        }

        if self.requires_approval(feature) {
            report.push(self.check_approval(feature, approver));
        }

        report
    }

    fn e2e_command_for(&self, feature: &Feature, base: &str) -> String {
        match &self.config.e2e_filter_template {
            Some(template) => format!("{base} {}", template.replace("{feature_id}", &feature.id)),
            None => base.to_string(),
        }
    }

    async fn run_gate(&self, gate: GateKind, command: &str) -> GateResult {
        info!(gate = gate.label(), command, "running verification gate");
        let outcome = self.run_command(command).await;

        if outcome.timed_out {
            return GateResult::fail(
                gate,
                format!("timed out after {:?}", self.config.gate_timeout),
                Some(outcome.output),
                outcome.duration.as_millis() as u64,
            );
        }
        if outcome.success {
            GateResult::pass(gate, "passed", outcome.duration.as_millis() as u64)
        } else {
            GateResult::fail(
                gate,
                "command exited nonzero",
                Some(outcome.output),
                outcome.duration.as_millis() as u64,
            )
        }
    }

    async fn check_coverage(&self) -> GateResult {
        let command = match &self.config.coverage_command {
            Some(c) => c.clone(),
            None => return GateResult::pass(GateKind::Coverage, "disabled", 0),
        };

        let outcome = self.run_command(&command).await;
        if outcome.timed_out || !outcome.success {
            return GateResult::fail(
                GateKind::Coverage,
                "coverage command failed",
                Some(outcome.output),
                outcome.duration.as_millis() as u64,
            );
        }

        let report_content = self
            .config
            .coverage_report_paths
            .iter()
            .map(|p| self.project_root.join(p))
            .find(|p| p.is_file())
            .and_then(|p| std::fs::read_to_string(p).ok());

        let Some(content) = report_content else {
            return GateResult::fail(
                GateKind::Coverage,
                "no coverage report found",
                Some(format!(
                    "looked for: {}",
                    self.config.coverage_report_paths.join(", ")
                )),
                outcome.duration.as_millis() as u64,
            );
        };

        match parse_coverage_report(&content) {
            Ok(pct) if pct >= self.config.coverage_threshold => GateResult::pass(
                GateKind::Coverage,
                format!(
                    "coverage {pct:.2}% meets threshold {:.0}%",
                    self.config.coverage_threshold
                ),
                outcome.duration.as_millis() as u64,
            ),
            Ok(pct) => GateResult::fail(
                GateKind::Coverage,
                format!(
                    "coverage {pct:.2}% below threshold {:.0}%",
                    self.config.coverage_threshold
                ),
                None,
                outcome.duration.as_millis() as u64,
            ),
            Err(err) => GateResult::fail(
                GateKind::Coverage,
                format!("CoverageUnparseable: {err}"),
                None,
                outcome.duration.as_millis() as u64,
            ),
        }
    }

    async fn run_hook(&self, feature: &Feature) -> Option<GateResult> {
        let script = find_hook_script(&self.hooks_dir)?;
        let (program, args) = hook_invocation(&script);
        let env = [
            (ENV_PROJECT_ROOT, self.project_root.display().to_string()),
            (ENV_FEATURE_ID, feature.id.clone()),
            (ENV_FEATURE_NAME, feature.name.clone()),
            (ENV_FEATURE_CATEGORY, feature.category.label().to_string()),
        ];

        let started = Instant::now();
        let mut cmd = Command::new(&program);
        cmd.args(&args)
            .current_dir(&self.project_root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &env {
            cmd.env(key, value);
        }

        let outcome = Self::wait_with_timeout(cmd, self.config.gate_timeout, started).await;
        Some(if outcome.timed_out {
            GateResult::fail(
                GateKind::Hook,
                format!("hook timed out after {:?}", self.config.gate_timeout),
                Some(outcome.output),
                outcome.duration.as_millis() as u64,
            )
        } else if outcome.success {
            GateResult::pass(GateKind::Hook, "hook passed", outcome.duration.as_millis() as u64)
        } else {
            GateResult::fail(
                GateKind::Hook,
                "hook exited nonzero",
                Some(outcome.output),
                outcome.duration.as_millis() as u64,
            )
        })
    }

    fn requires_approval(&self, feature: &Feature) -> bool {
        self.config.approval_required
            || self
                .config
                .approval_features
                .iter()
                .any(|id| id == &feature.id)
    }

    fn check_approval(&self, feature: &Feature, approver: Option<&Approver>) -> GateResult {
        match approver {
            Some(approve) if approve(feature) => {
                GateResult::pass(GateKind::Approval, "approved", 0)
            }
            Some(_) => GateResult::fail(GateKind::Approval, "approval denied", None, 0),
            None => GateResult::fail(
                GateKind::Approval,
                "approval required but no approver available",
                None,
                0,
            ),
        }
    }

    async fn run_command(&self, command: &str) -> CommandOutcome {
        let started = Instant::now();
        let (shell, flag) = if cfg!(windows) {
            ("cmd", "/C")
        } else {
            ("sh", "-c")
        };

        let mut cmd = Command::new(shell);
        cmd.arg(flag)
            .arg(command)
            .current_dir(&self.project_root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        Self::wait_with_timeout(cmd, self.config.gate_timeout, started).await
    }

    async fn wait_with_timeout(
        mut cmd: Command,
        timeout: Duration,
        started: Instant,
    ) -> CommandOutcome {
        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                return CommandOutcome {
                    success: false,
                    output: format!("failed to spawn: {err}"),
                    timed_out: false,
                    duration: started.elapsed(),
                }
            }
        };

        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let mut text = String::from_utf8_lossy(&output.stdout).to_string();
                let stderr = String::from_utf8_lossy(&output.stderr);
                if !stderr.trim().is_empty() {
                    text.push_str("\n--- stderr ---\n");
                    text.push_str(&stderr);
                }
                CommandOutcome {
                    success: output.status.success(),
                    output: truncate(&text, OUTPUT_CAP),
                    timed_out: false,
                    duration: started.elapsed(),
                }
            }
            Ok(Err(err)) => CommandOutcome {
                success: false,
                output: format!("wait failed: {err}"),
                timed_out: false,
                duration: started.elapsed(),
            },
            Err(_) => CommandOutcome {
                success: false,
                output: String::new(),
                timed_out: true,
                duration: started.elapsed(),
            },
        }
    }
}

fn truncate(text: &str, cap: usize) -> String {
    if text.len() <= cap {
        return text.to_string();
    }
    let mut end = cap;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\n... [truncated {} bytes]", &text[..end], text.len() - end)
}
