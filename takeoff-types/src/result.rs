use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric outcome of one metric row.
///
/// Serializes as a bare JSON number, or `null` for `Undefined`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Count(u64),
    Number(f64),
    Undefined,
}

impl MetricValue {
    pub fn as_f64(self) -> Option<f64> {
        match self {
            MetricValue::Count(n) => Some(n as f64),
            MetricValue::Number(n) if n.is_finite() => Some(n),
            MetricValue::Number(_) | MetricValue::Undefined => None,
        }
    }

    pub fn is_undefined(self) -> bool {
        self.as_f64().is_none()
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Count(n) => write!(f, "{n}"),
            MetricValue::Number(n) if n.is_finite() => write!(f, "{n:.2}"),
            MetricValue::Number(_) | MetricValue::Undefined => f.write_str("undefined"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowStatus {
    Success,
    Error,
    /// A derived value could not be computed (division by zero, undefined operand).
    /// Not an error: strict runs do not fail on it.
    Undefined,
}

/// One line of the results table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub metric_name: String,
    pub value: MetricValue,
    pub unit: String,
    pub category: String,

    #[serde(default)]
    pub description: String,

    pub status: RowStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Raw group value for grouped metrics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    /// Size of the working set (or group) the value was computed over.
    #[serde(default)]
    pub element_count: u64,

    /// Working-set elements whose quantity could not be extracted.
    #[serde(default)]
    pub missing_values: u64,

    /// Subtract-only elements whose quantity was deducted from the value.
    #[serde(default)]
    pub deducted_count: u64,
}

impl ResultRow {
    pub fn is_error(&self) -> bool {
        self.status == RowStatus::Error
    }
}

/// Results for one store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultTable {
    pub schema: String,
    pub store: String,
    pub rows: Vec<ResultRow>,
}

impl ResultTable {
    pub fn new(store: impl Into<String>, rows: Vec<ResultRow>) -> Self {
        Self {
            schema: crate::schema::TAKEOFF_RESULTS_V1.to_string(),
            store: store.into(),
            rows,
        }
    }

    pub fn row(&self, metric_name: &str) -> Option<&ResultRow> {
        self.rows.iter().find(|r| r.metric_name == metric_name)
    }

    pub fn error_count(&self) -> usize {
        self.rows.iter().filter(|r| r.is_error()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_serialize_bare() {
        assert_eq!(
            serde_json::to_value(MetricValue::Count(3)).expect("serialize"),
            serde_json::json!(3)
        );
        assert_eq!(
            serde_json::to_value(MetricValue::Number(85.0)).expect("serialize"),
            serde_json::json!(85.0)
        );
        assert_eq!(
            serde_json::to_value(MetricValue::Undefined).expect("serialize"),
            serde_json::Value::Null
        );
    }

    #[test]
    fn non_finite_numbers_are_undefined() {
        assert!(MetricValue::Number(f64::NAN).is_undefined());
        assert_eq!(MetricValue::Number(f64::INFINITY).to_string(), "undefined");
        assert_eq!(MetricValue::Number(85.0).to_string(), "85.00");
    }
}
