//! Cost forecasting.
//!
//! Projections are derived from per-feature cost samples over completed
//! features: low/mid/high bands are the 25th/50th/75th percentiles scaled
//! by the remaining feature count, burn rate is the last seven days of
//! spend, and confidence grows with sample size.

use chrono::{Duration, Utc};
use serde::Serialize;

use crate::backlog::{Backlog, FeatureStatus};
use crate::logging::SessionRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectionResponse {
    pub avg_cost_per_feature: f64,
    pub features_completed: usize,
    pub features_remaining: usize,
    pub projected_remaining_cost_low: f64,
    pub projected_remaining_cost_mid: f64,
    pub projected_remaining_cost_high: f64,
    pub daily_burn_rate_7d: f64,
    pub estimated_completion_date_mid: Option<String>,
    pub total_spent: f64,
    pub confidence: Confidence,
}

/// Linear-interpolated percentile over unsorted samples.
fn percentile(samples: &[f64], pct: f64) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    if sorted.len() == 1 {
        return sorted[0];
    }
    let k = (sorted.len() - 1) as f64 * (pct / 100.0);
    let f = k.floor() as usize;
    let c = (f + 1).min(sorted.len() - 1);
    if f == c {
        return sorted[f];
    }
    sorted[f] * (c as f64 - k) + sorted[c] * (k - f as f64)
}

pub fn compute_projections(backlog: &Backlog, sessions: &[SessionRecord]) -> ProjectionResponse {
    let completed: Vec<_> = backlog
        .features
        .iter()
        .filter(|f| f.status == FeatureStatus::Completed)
        .collect();
    let features_remaining = backlog
        .features
        .iter()
        .filter(|f| f.status != FeatureStatus::Completed)
        .count();

    let total_spent: f64 = sessions.iter().map(|s| s.cost_usd).sum();

    // Cost per completed feature, summed over its sessions.
    let feature_costs: Vec<f64> = completed
        .iter()
        .filter_map(|feature| {
            let cost: f64 = sessions
                .iter()
                .filter(|s| s.feature_id.as_deref() == Some(feature.id.as_str()))
                .map(|s| s.cost_usd)
                .sum();
            (cost > 0.0).then_some(cost)
        })
        .collect();

    let (avg, low, mid, high) = if feature_costs.is_empty() {
        (0.0, 0.0, 0.0, 0.0)
    } else {
        let avg = feature_costs.iter().sum::<f64>() / feature_costs.len() as f64;
        let remaining = features_remaining as f64;
        (
            avg,
            percentile(&feature_costs, 25.0) * remaining,
            percentile(&feature_costs, 50.0) * remaining,
            percentile(&feature_costs, 75.0) * remaining,
        )
    };

    let week_ago = Utc::now() - Duration::days(7);
    let recent_cost: f64 = sessions
        .iter()
        .filter(|s| s.ended_at >= week_ago)
        .map(|s| s.cost_usd)
        .sum();
    let daily_burn_rate = recent_cost / 7.0;

    let estimated_completion_date_mid = (daily_burn_rate > 0.0 && mid > 0.0).then(|| {
        let days_remaining = mid / daily_burn_rate;
        (Utc::now() + Duration::days(days_remaining.ceil() as i64))
            .format("%Y-%m-%d")
            .to_string()
    });

    let confidence = if feature_costs.len() >= 10 {
        Confidence::High
    } else if feature_costs.len() >= 5 {
        Confidence::Medium
    } else {
        Confidence::Low
    };

    ProjectionResponse {
        avg_cost_per_feature: round4(avg),
        features_completed: completed.len(),
        features_remaining,
        projected_remaining_cost_low: round4(low),
        projected_remaining_cost_mid: round4(mid),
        projected_remaining_cost_high: round4(high),
        daily_burn_rate_7d: round4(daily_burn_rate),
        estimated_completion_date_mid,
        total_spent: round4(total_spent),
        confidence,
    }
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}
