//! Error classification for retry decisions.
//!
//! Maps raw failures (exceptions, exit codes, stderr text) onto a fixed
//! taxonomy. The category determines whether the scheduler retries, how long
//! it waits, and whether the failure is fatal for the whole run.

use serde::{Deserialize, Serialize};

/// Classification of a session failure.
///
/// Categories determine whether to retry and how long to wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Network reset, DNS failure, generic 5xx. Retry with short delay.
    Transient,
    /// 429 or explicit rate-limit error. Retry with longer base delay.
    RateLimit,
    /// Agent subprocess exited nonzero without a completion signal.
    AgentCrash,
    /// Runtime-raised hard timeout or stall.
    Timeout,
    /// Out of credits / payment failure. Never retried; fatal for the run.
    Billing,
    /// Invalid or expired credentials. Never retried; fatal for the run.
    Auth,
    /// Required external tool missing on PATH. Retried once.
    Tooling,
    /// Anything else. Retried once, then stop.
    Unknown,
}

impl ErrorCategory {
    /// Whether the scheduler may retry this category at all.
    pub fn is_retryable(self) -> bool {
        !matches!(self, ErrorCategory::Billing | ErrorCategory::Auth)
    }

    /// Whether this category terminates the whole harness run.
    pub fn is_fatal(self) -> bool {
        matches!(self, ErrorCategory::Billing | ErrorCategory::Auth)
    }

    /// Category-specific retry cap, where tighter than the global budget.
    ///
    /// `Tooling` and `Unknown` get a single retry regardless of the
    /// configured maximum.
    pub fn retry_cap(self) -> Option<u32> {
        match self {
            ErrorCategory::Tooling | ErrorCategory::Unknown => Some(1),
            _ => None,
        }
    }

    /// Stable label used in logs, alerts, and persisted records.
    pub fn label(self) -> &'static str {
        match self {
            ErrorCategory::Transient => "transient",
            ErrorCategory::RateLimit => "rate_limit",
            ErrorCategory::AgentCrash => "agent_crash",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Billing => "billing",
            ErrorCategory::Auth => "auth",
            ErrorCategory::Tooling => "tooling",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

/// A failure mapped onto the taxonomy, with a message fit for humans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedError {
    pub category: ErrorCategory,
    /// Short human-readable summary.
    pub message: String,
    /// Raw failure payload (stderr tail, exception text) when available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

impl ClassifiedError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            raw: None,
        }
    }

    pub fn with_raw(mut self, raw: impl Into<String>) -> Self {
        self.raw = Some(raw.into());
        self
    }

    /// Classify an error message from the agent stream or an exception.
    pub fn from_message(message: &str) -> Self {
        let category = classify_text(message);
        Self::new(category, summarize(message)).with_raw(message)
    }

    /// Classify a subprocess exit without a completion signal.
    pub fn from_exit(code: Option<i32>, stderr: &str) -> Self {
        // Text signals take precedence over the bare exit code: a billing
        // error often surfaces as a nonzero exit with a clear stderr line.
        let text_category = classify_text(stderr);
        if text_category != ErrorCategory::Unknown {
            return Self::new(text_category, summarize(stderr)).with_raw(stderr);
        }

        let message = match code {
            Some(c) => format!("agent exited with code {c} before signalling completion"),
            None => "agent terminated by signal before completion".to_string(),
        };
        Self::new(ErrorCategory::AgentCrash, message).with_raw(stderr)
    }
}

impl std::fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.category.label(), self.message)
    }
}

/// Match raw failure text against known signal patterns.
pub fn classify_text(text: &str) -> ErrorCategory {
    let lower = text.to_lowercase();

    if lower.contains("rate limit")
        || lower.contains("rate_limit")
        || lower.contains("too many requests")
        || lower.contains("429")
    {
        return ErrorCategory::RateLimit;
    }
    if lower.contains("billing")
        || lower.contains("insufficient credit")
        || lower.contains("credit balance")
        || lower.contains("payment required")
        || lower.contains("402")
    {
        return ErrorCategory::Billing;
    }
    if lower.contains("invalid api key")
        || lower.contains("authentication")
        || lower.contains("unauthorized")
        || lower.contains("401")
        || lower.contains("credential")
    {
        return ErrorCategory::Auth;
    }
    if lower.contains("timed out") || lower.contains("timeout") || lower.contains("stalled") {
        return ErrorCategory::Timeout;
    }
    if lower.contains("connection")
        || lower.contains("network")
        || lower.contains("dns")
        || lower.contains("reset by peer")
        || lower.contains("overloaded")
        || lower.contains("500")
        || lower.contains("502")
        || lower.contains("503")
        || lower.contains("529")
    {
        return ErrorCategory::Transient;
    }
    if lower.contains("command not found")
        || lower.contains("not found in path")
        || lower.contains("no such file or directory")
        || lower.contains("not recognized as an internal or external command")
    {
        return ErrorCategory::Tooling;
    }

    ErrorCategory::Unknown
}

/// First line of the raw text, bounded, as the human-facing summary.
fn summarize(text: &str) -> String {
    let first = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let trimmed = first.trim();
    if trimmed.is_empty() {
        return "unknown error".to_string();
    }
    if trimmed.len() > 200 {
        let mut end = 200;
        while !trimmed.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &trimmed[..end])
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_classification() {
        let err = ClassifiedError::from_message("Error 429: Too Many Requests");
        assert_eq!(err.category, ErrorCategory::RateLimit);
        assert!(err.category.is_retryable());
    }

    #[test]
    fn test_billing_is_fatal() {
        let err = ClassifiedError::from_message("Your credit balance is too low");
        assert_eq!(err.category, ErrorCategory::Billing);
        assert!(!err.category.is_retryable());
        assert!(err.category.is_fatal());
    }

    #[test]
    fn test_auth_is_fatal() {
        let err = ClassifiedError::from_message("invalid api key provided");
        assert_eq!(err.category, ErrorCategory::Auth);
        assert!(err.category.is_fatal());
    }

    #[test]
    fn test_network_is_transient() {
        let err = ClassifiedError::from_message("connection reset by peer");
        assert_eq!(err.category, ErrorCategory::Transient);
    }

    #[test]
    fn test_timeout_text() {
        assert_eq!(classify_text("request timed out"), ErrorCategory::Timeout);
    }

    #[test]
    fn test_missing_tool() {
        let err = ClassifiedError::from_message("bash: playwright: command not found");
        assert_eq!(err.category, ErrorCategory::Tooling);
        assert_eq!(err.category.retry_cap(), Some(1));
    }

    #[test]
    fn test_unknown_gets_single_retry() {
        let err = ClassifiedError::from_message("something inexplicable happened");
        assert_eq!(err.category, ErrorCategory::Unknown);
        assert!(err.category.is_retryable());
        assert_eq!(err.category.retry_cap(), Some(1));
    }

    #[test]
    fn test_nonzero_exit_without_completion_is_crash() {
        let err = ClassifiedError::from_exit(Some(1), "");
        assert_eq!(err.category, ErrorCategory::AgentCrash);
    }

    #[test]
    fn test_exit_with_billing_stderr_prefers_text() {
        let err = ClassifiedError::from_exit(Some(1), "fatal: payment required");
        assert_eq!(err.category, ErrorCategory::Billing);
    }

    #[test]
    fn test_summary_is_first_nonempty_line() {
        let err = ClassifiedError::from_message("\n\nconnection refused\ndetails follow");
        assert_eq!(err.message, "connection refused");
    }

    #[test]
    fn test_label_round_trip() {
        for cat in [
            ErrorCategory::Transient,
            ErrorCategory::RateLimit,
            ErrorCategory::AgentCrash,
            ErrorCategory::Timeout,
            ErrorCategory::Billing,
            ErrorCategory::Auth,
            ErrorCategory::Tooling,
            ErrorCategory::Unknown,
        ] {
            let json = serde_json::to_string(&cat).unwrap();
            assert_eq!(json.trim_matches('"'), cat.label());
        }
    }
}
