//! Core memory type definitions.
//!
//! Defines [`MemoryEntry`] (one remembered exchange), [`SearchHit`] (an entry
//! plus its distance to a query), [`DistanceMetric`] and [`CollectionInfo`].

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Separator placed between prompt and response when encoding an exchange.
pub const EXCHANGE_SEPARATOR: &str = "\n\n";

/// One remembered prompt/response exchange, matching a collection row plus its vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// UUID v7 (time-sortable) primary key.
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub prompt: String,
    pub response: String,
    /// Unordered labels. A set, so equality ignores insertion order.
    pub tags: BTreeSet<String>,
    /// Whitespace-delimited tokens of `prompt` plus those of `response`.
    pub token_count: u64,
    /// Encoding of `prompt + "\n\n" + response`.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub embedding: Vec<f32>,
}

impl MemoryEntry {
    /// The text that gets embedded for this exchange.
    pub fn encoding_input(prompt: &str, response: &str) -> String {
        format!("{prompt}{EXCHANGE_SEPARATOR}{response}")
    }
}

/// Token count used for bookkeeping only.
pub fn token_count(prompt: &str, response: &str) -> u64 {
    (prompt.split_whitespace().count() + response.split_whitespace().count()) as u64
}

/// A search result: the stored entry and its distance to the query vector.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub entry: MemoryEntry,
    pub distance: f64,
}

/// Distance metric of a collection's vector index. Fixed per collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    L2,
}

impl DistanceMetric {
    /// sqlite-vec `distance_metric` option value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::L2 => "l2",
        }
    }
}

impl std::fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DistanceMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cosine" => Ok(Self::Cosine),
            "l2" => Ok(Self::L2),
            _ => Err(format!("unknown distance metric: {s}")),
        }
    }
}

/// Metadata about one collection, as recorded in the `collections` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionInfo {
    pub name: String,
    pub dimension: usize,
    pub metric: DistanceMetric,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    pub created_at: String,
    pub entry_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_count_sums_both_fields() {
        assert_eq!(token_count("fix the bug", "patched null check"), 6);
        assert_eq!(token_count("  spaced\tout\n", ""), 2);
        assert_eq!(token_count("", ""), 0);
    }

    #[test]
    fn encoding_input_joins_with_blank_line() {
        assert_eq!(MemoryEntry::encoding_input("a", "b"), "a\n\nb");
    }

    #[test]
    fn tag_order_is_irrelevant_for_equality() {
        let ts = Utc::now();
        let make = |tags: &[&str]| MemoryEntry {
            id: "x".into(),
            timestamp: ts,
            prompt: "p".into(),
            response: "r".into(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            token_count: 2,
            embedding: vec![1.0],
        };
        assert_eq!(make(&["rust", "bug"]), make(&["bug", "rust"]));
    }

    #[test]
    fn metric_round_trips_through_str() {
        for metric in [DistanceMetric::Cosine, DistanceMetric::L2] {
            assert_eq!(metric.as_str().parse::<DistanceMetric>().unwrap(), metric);
        }
        assert!("dot".parse::<DistanceMetric>().is_err());
    }
}
