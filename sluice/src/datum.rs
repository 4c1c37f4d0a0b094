//! The wire form of a reported value.
//!
//! A [`DataPoint`] is built fresh every cycle and thrown away once published.
//! Field names serialize in the `PascalCase` shape of a `PutMetricData`
//! request.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Unit tag attached to a [`DataPoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unit {
    /// A count of things.
    Count,
}

/// A name/value tag attached to every [`DataPoint`] of a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Dimension {
    /// Dimension name
    pub name: String,
    /// Dimension value
    pub value: String,
}

/// A single named value derived from a metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DataPoint {
    /// The derived name, for instance `latency.mean` or `latency-perc0.990`.
    #[serde(rename = "MetricName")]
    pub name: String,
    /// The value.
    pub value: f64,
    /// Milliseconds since the Unix epoch. Every point of a cycle shares one
    /// timestamp.
    pub timestamp: u64,
    /// Optional unit tag.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub unit: Option<Unit>,
    /// Static dimensions from configuration.
    pub dimensions: Vec<Dimension>,
}

/// Render static dimensions in name order, so every cycle carries them
/// identically.
#[must_use]
pub fn dimensions(statics: &FxHashMap<String, String>) -> Vec<Dimension> {
    let mut dims: Vec<Dimension> = statics
        .iter()
        .map(|(name, value)| Dimension {
            name: name.clone(),
            value: value.clone(),
        })
        .collect();
    dims.sort_by(|l, r| l.name.cmp(&r.name));
    dims
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimensions_are_sorted() {
        let mut statics = FxHashMap::default();
        statics.insert("region".to_string(), "us-east-1".to_string());
        statics.insert("env".to_string(), "prod".to_string());
        let dims = dimensions(&statics);
        let names: Vec<&str> = dims.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["env", "region"]);
    }

    #[test]
    fn serializes_in_put_metric_data_shape() {
        let point = DataPoint {
            name: "requests".to_string(),
            value: 3.0,
            timestamp: 1_700_000_000_000,
            unit: Some(Unit::Count),
            dimensions: vec![Dimension {
                name: "env".to_string(),
                value: "prod".to_string(),
            }],
        };
        let json = serde_json::to_value(&point).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "MetricName": "requests",
                "Value": 3.0,
                "Timestamp": 1_700_000_000_000u64,
                "Unit": "Count",
                "Dimensions": [{"Name": "env", "Value": "prod"}],
            })
        );

        let unitless = DataPoint { unit: None, ..point };
        let json = serde_json::to_value(&unitless).unwrap();
        assert!(json.get("Unit").is_none());
    }
}
