//! Token usage accounting and cost calculation.
//!
//! Pricing is per one million tokens, keyed by model, with aliases for the
//! common short names. Unknown models fall back to Sonnet pricing.

use std::collections::BTreeMap;
use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

/// Per-model price card, USD per 1M tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input: f64,
    pub output: f64,
    pub cache_read: f64,
    pub cache_write: f64,
}

const PRICING: &[(&str, ModelPricing)] = &[
    (
        "claude-opus-4-5-20251101",
        ModelPricing {
            input: 15.00,
            output: 75.00,
            cache_read: 1.50,
            cache_write: 18.75,
        },
    ),
    (
        "claude-sonnet-4-20250514",
        ModelPricing {
            input: 3.00,
            output: 15.00,
            cache_read: 0.30,
            cache_write: 3.75,
        },
    ),
    (
        "claude-haiku-4-5-20251001",
        ModelPricing {
            input: 1.00,
            output: 5.00,
            cache_read: 0.10,
            cache_write: 1.25,
        },
    ),
    (
        "claude-3-5-sonnet-20241022",
        ModelPricing {
            input: 3.00,
            output: 15.00,
            cache_read: 0.30,
            cache_write: 3.75,
        },
    ),
];

const ALIASES: &[(&str, &str)] = &[
    ("opus", "claude-opus-4-5-20251101"),
    ("sonnet", "claude-sonnet-4-20250514"),
    ("haiku", "claude-haiku-4-5-20251001"),
];

/// Resolve a model alias to a full model name. Unknown names pass through.
pub fn resolve_model(model: &str) -> &str {
    let lower = model.to_lowercase();
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == lower)
        .map(|(_, full)| *full)
        .unwrap_or(model)
}

/// Sonnet pricing, used when the model is not in the table.
const FALLBACK_PRICING: ModelPricing = ModelPricing {
    input: 3.00,
    output: 15.00,
    cache_read: 0.30,
    cache_write: 3.75,
};

/// Pricing for a model (alias-aware), defaulting to Sonnet when unknown.
pub fn pricing_for(model: &str) -> ModelPricing {
    let resolved = resolve_model(model);
    PRICING
        .iter()
        .find(|(name, _)| *name == resolved)
        .map(|(_, p)| *p)
        .unwrap_or(FALLBACK_PRICING)
}

/// Token totals across a session or an aggregate of sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageTotals {
    #[serde(default)]
    pub input: u64,
    #[serde(default)]
    pub output: u64,
    #[serde(default)]
    pub cache_read: u64,
    #[serde(default)]
    pub cache_write: u64,
}

impl UsageTotals {
    pub fn total(&self) -> u64 {
        self.input + self.output + self.cache_read + self.cache_write
    }

    /// Tokens counted against the context window estimate.
    pub fn context_tokens(&self) -> u64 {
        self.input + self.output
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

impl Add for UsageTotals {
    type Output = UsageTotals;

    fn add(self, rhs: UsageTotals) -> UsageTotals {
        UsageTotals {
            input: self.input + rhs.input,
            output: self.output + rhs.output,
            cache_read: self.cache_read + rhs.cache_read,
            cache_write: self.cache_write + rhs.cache_write,
        }
    }
}

impl AddAssign for UsageTotals {
    fn add_assign(&mut self, rhs: UsageTotals) {
        *self = *self + rhs;
    }
}

/// Cost in USD for the given usage on the given model, rounded to 6 places.
pub fn calculate_cost(usage: UsageTotals, model: &str) -> f64 {
    let pricing = pricing_for(model);
    let cost = (usage.input as f64 / 1_000_000.0) * pricing.input
        + (usage.output as f64 / 1_000_000.0) * pricing.output
        + (usage.cache_read as f64 / 1_000_000.0) * pricing.cache_read
        + (usage.cache_write as f64 / 1_000_000.0) * pricing.cache_write;
    (cost * 1_000_000.0).round() / 1_000_000.0
}

/// Per-model slice of an aggregated cost summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelCost {
    pub usage: UsageTotals,
    pub cost_usd: f64,
    pub sessions: u32,
}

/// Aggregated usage and cost across sessions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostSummary {
    pub total_cost_usd: f64,
    pub totals: UsageTotals,
    pub session_count: u32,
    pub per_model: BTreeMap<String, ModelCost>,
}

impl CostSummary {
    /// Fold one session's usage into the summary.
    pub fn record(&mut self, model: &str, usage: UsageTotals, cost_usd: f64) {
        self.totals += usage;
        self.total_cost_usd = round6(self.total_cost_usd + cost_usd);
        self.session_count += 1;

        let entry = self.per_model.entry(model.to_string()).or_default();
        entry.usage += usage;
        entry.cost_usd = round6(entry.cost_usd + cost_usd);
        entry.sessions += 1;
    }
}

fn round6(v: f64) -> f64 {
    (v * 1_000_000.0).round() / 1_000_000.0
}

/// Format a cost for display, e.g. "$0.0042" or "$1.23".
pub fn format_cost(cost_usd: f64) -> String {
    if cost_usd < 0.01 {
        format!("${cost_usd:.4}")
    } else {
        format!("${cost_usd:.2}")
    }
}

/// Format a token count for display, e.g. "1.2K" or "1.50M".
pub fn format_tokens(count: u64) -> String {
    if count < 1_000 {
        count.to_string()
    } else if count < 1_000_000 {
        format!("{:.1}K", count as f64 / 1_000.0)
    } else {
        format!("{:.2}M", count as f64 / 1_000_000.0)
    }
}
