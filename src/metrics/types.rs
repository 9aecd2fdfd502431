use serde::Serialize;

use crate::query::period::{PeriodType, Window};

/// The dimension a metric can be narrowed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Segment,
    User,
    Channel,
}

impl Dimension {
    /// Query-string parameter carrying this dimension's value.
    pub fn param_name(&self) -> &'static str {
        match self {
            Dimension::Segment => "segmentId",
            Dimension::User => "userId",
            Dimension::Channel => "channel",
        }
    }
}

/// The dimension filter actually applied to a comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedFilter {
    pub kind: Dimension,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonMetadata {
    pub metric: String,
    pub current_period: Window,
    pub previous_period: Window,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<AppliedFilter>,
    pub comparison_label: String,
    /// Set when the data layer failed and the values are the zero fallback.
    pub degraded: bool,
}

/// Actual-vs-previous result for one metric over two adjacent windows.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodComparison {
    pub actual: f64,
    pub previous: f64,
    pub percent_change: f64,
    pub period_type: PeriodType,
    pub metadata: ComparisonMetadata,
}

/// One row of the metric catalogue.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricInfo {
    pub name: &'static str,
    pub description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimension: Option<Dimension>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_param: Option<&'static str>,
}
