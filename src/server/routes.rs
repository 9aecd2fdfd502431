use std::sync::Arc;

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    response::Json,
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::metrics::{Dimension, Metric, MetricInfo, MetricSource, PeriodComparison};
use crate::query::period::DateRange;
use crate::server::error::ApiError;
use crate::SitePulse;

/// Query parameters shared by every comparison endpoint.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonParams {
    pub site_id: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub segment_id: Option<String>,
    pub user_id: Option<String>,
    pub channel: Option<String>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl ComparisonParams {
    /// The tenant and window, or `MissingParameter` naming every absent one.
    pub fn required(&self) -> Result<(&str, DateRange)> {
        let site_id = present(&self.site_id);
        let start = present(&self.start_date);
        let end = present(&self.end_date);

        match (site_id, start, end) {
            (Some(site_id), Some(start), Some(end)) => Ok((site_id, DateRange::parse(start, end)?)),
            _ => {
                let missing: Vec<&str> = [
                    ("siteId", site_id.is_none()),
                    ("startDate", start.is_none()),
                    ("endDate", end.is_none()),
                ]
                .into_iter()
                .filter_map(|(name, absent)| absent.then_some(name))
                .collect();
                Err(Error::MissingParameter(missing.join(", ")))
            }
        }
    }

    /// The value of the parameter that carries `dimension`, if any.
    pub fn filter_for(&self, dimension: Option<Dimension>) -> Option<&str> {
        match dimension? {
            Dimension::Segment => self.segment_id.as_deref(),
            Dimension::User => self.user_id.as_deref(),
            Dimension::Channel => self.channel.as_deref(),
        }
    }
}

/// GET /api/metrics/{metric}
/// Actual vs previous period for one metric.
pub async fn get_comparison<S: MetricSource>(
    State(pulse): State<Arc<SitePulse<S>>>,
    Path(metric): Path<String>,
    params: std::result::Result<Query<ComparisonParams>, QueryRejection>,
) -> std::result::Result<Json<PeriodComparison>, ApiError> {
    let metric = Metric::parse(&metric)?;
    let Query(params) = params.map_err(|e| Error::InvalidParameter(e.body_text()))?;
    let (site_id, range) = params.required()?;
    let filter = params.filter_for(metric.dimension());

    let result = pulse.compare(metric, site_id, filter, &range).await?;
    Ok(Json(result))
}

/// GET /api/metrics
pub async fn list_metrics() -> Json<Vec<MetricInfo>> {
    Json(Metric::ALL.iter().map(Metric::info).collect())
}

/// GET /health
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub fn router<S>() -> Router<Arc<SitePulse<S>>>
where
    S: MetricSource + 'static,
{
    Router::new()
        .route("/health", get(health))
        .route("/api/metrics", get(list_metrics))
        .route("/api/metrics/{metric}", get(get_comparison::<S>))
}
