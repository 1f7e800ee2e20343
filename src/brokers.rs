//! Broker name normalization and the broker distribution table.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Name used for client rows with no broker.
pub const UNKNOWN_BROKER: &str = "未知";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasMatch {
    /// Lowercased name contains the pattern.
    Contains(&'static str),
    /// Lowercased name equals the pattern.
    Exact(&'static str),
}

impl AliasMatch {
    fn matches(&self, lowered: &str) -> bool {
        match self {
            AliasMatch::Contains(pattern) => lowered.contains(pattern),
            AliasMatch::Exact(pattern) => lowered == *pattern,
        }
    }
}

/// Alias rules in priority order; first match wins.
pub const BROKER_ALIASES: &[(AliasMatch, &str)] = &[
    (AliasMatch::Contains("ruofan"), "Yuki"),
    (AliasMatch::Contains("yuki"), "Yuki"),
    (AliasMatch::Exact("linudo"), "Linduo"),
    (AliasMatch::Exact("ziv"), "Ziv"),
];

/// Maps a free-text broker name to its canonical spelling.
pub fn canonical_broker(raw: Option<&str>) -> String {
    let name = raw.map(str::trim).unwrap_or_default();
    if name.is_empty() {
        return UNKNOWN_BROKER.to_string();
    }

    let lowered = name.to_lowercase();
    BROKER_ALIASES
        .iter()
        .find(|(rule, _)| rule.matches(&lowered))
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or_else(|| name.to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerShare {
    pub broker: String,
    pub count: usize,
    /// Share of all clients, one decimal place.
    pub percentage: String,
}

/// Client count per canonical broker, largest first. Ties sort by name.
pub fn broker_distribution<'a>(brokers: impl IntoIterator<Item = &'a str>) -> Vec<BrokerShare> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut total = 0usize;

    for broker in brokers {
        *counts.entry(canonical_broker(Some(broker))).or_insert(0) += 1;
        total += 1;
    }

    let mut shares: Vec<BrokerShare> = counts
        .into_iter()
        .map(|(broker, count)| BrokerShare {
            broker,
            count,
            percentage: if total > 0 {
                format!("{:.1}", count as f64 * 100.0 / total as f64)
            } else {
                "0.0".to_string()
            },
        })
        .collect();

    shares.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.broker.cmp(&b.broker)));
    shares
}
