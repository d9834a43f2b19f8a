//! Coverage report parsing.
//!
//! Recognizes the two common summary shapes:
//! - a total/percent object at the document root, e.g. `{"total": 81.2}` or
//!   `{"percent": 81.2}` or `{"totals": {"percent_covered": 81.2}}`;
//! - a keyed report with a `total.lines.pct` path (istanbul style) or the
//!   llvm-cov `data[0].totals.lines.percent` equivalent.
//!
//! Anything else is reported as unparseable rather than guessed at.

use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum CoverageError {
    #[error("coverage report is not valid JSON")]
    InvalidJson,

    #[error("coverage report shape not recognized")]
    Unparseable,
}

/// Extract the total coverage percentage from a report document.
pub fn parse_coverage_report(content: &str) -> Result<f64, CoverageError> {
    let value: Value =
        serde_json::from_str(content).map_err(|_| CoverageError::InvalidJson)?;

    // Shape 1: total/percent at the root.
    for key in ["total", "percent", "total_percent"] {
        if let Some(pct) = value.get(key).and_then(Value::as_f64) {
            return Ok(pct);
        }
    }
    if let Some(pct) = value
        .get("totals")
        .and_then(|t| t.get("percent_covered"))
        .and_then(Value::as_f64)
    {
        return Ok(pct);
    }

    // Shape 2: istanbul's total.lines.pct.
    if let Some(pct) = value
        .get("total")
        .and_then(|t| t.get("lines"))
        .and_then(|l| l.get("pct"))
        .and_then(Value::as_f64)
    {
        return Ok(pct);
    }

    // Shape 2 equivalent: llvm-cov data[0].totals.lines.percent.
    if let Some(pct) = value
        .get("data")
        .and_then(|d| d.get(0))
        .and_then(|d| d.get("totals"))
        .and_then(|t| t.get("lines"))
        .and_then(|l| l.get("percent"))
        .and_then(Value::as_f64)
    {
        return Ok(pct);
    }

    Err(CoverageError::Unparseable)
}
