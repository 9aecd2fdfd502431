pub mod types;

pub use types::*;

use std::future::Future;

use crate::error::{Error, Result};
use crate::query::builder::{Aggregation, MetricQuery, Scope};
use crate::query::period::{DateRange, PeriodType};

/// Where aggregates come from. [`crate::Database`] is the production source.
pub trait MetricSource: Send + Sync {
    /// Aggregate `query` over one window for the given scope.
    fn aggregate(
        &self,
        query: MetricQuery,
        scope: Scope,
        window: DateRange,
    ) -> impl Future<Output = Result<f64>> + Send;

    /// Map a user identifier (id or email) to a user id. `None` when the
    /// identifier is unknown.
    fn resolve_user(
        &self,
        site_id: String,
        identifier: String,
    ) -> impl Future<Output = Result<Option<String>>> + Send {
        let _ = site_id;
        async move { Ok(Some(identifier)) }
    }
}

/// A dashboard metric backed by a period comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Leads,
    Tasks,
    Conversations,
    ContentApprovals,
    Requirements,
    ImagesGenerated,
    VideoMinutes,
    UniqueVisitors,
    PageVisits,
}

impl Metric {
    pub const ALL: [Metric; 9] = [
        Metric::Leads,
        Metric::Tasks,
        Metric::Conversations,
        Metric::ContentApprovals,
        Metric::Requirements,
        Metric::ImagesGenerated,
        Metric::VideoMinutes,
        Metric::UniqueVisitors,
        Metric::PageVisits,
    ];

    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        Metric::ALL
            .into_iter()
            .find(|m| m.name() == s || m.name().replace('-', "_") == s)
            .ok_or_else(|| Error::UnknownMetric(s.to_string()))
    }

    /// URL-safe name, e.g. `content-approvals`.
    pub fn name(&self) -> &'static str {
        match self {
            Metric::Leads => "leads",
            Metric::Tasks => "tasks",
            Metric::Conversations => "conversations",
            Metric::ContentApprovals => "content-approvals",
            Metric::Requirements => "requirements",
            Metric::ImagesGenerated => "images-generated",
            Metric::VideoMinutes => "video-minutes",
            Metric::UniqueVisitors => "unique-visitors",
            Metric::PageVisits => "page-visits",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Metric::Leads => "New leads created",
            Metric::Tasks => "Tasks created",
            Metric::Conversations => "Conversations started",
            Metric::ContentApprovals => "Content pieces approved",
            Metric::Requirements => "Requirements captured",
            Metric::ImagesGenerated => "Images generated",
            Metric::VideoMinutes => "Minutes of video produced",
            Metric::UniqueVisitors => "Distinct visitors",
            Metric::PageVisits => "Page visits",
        }
    }

    pub fn dimension(&self) -> Option<Dimension> {
        match self {
            Metric::Leads
            | Metric::Requirements
            | Metric::UniqueVisitors
            | Metric::PageVisits => Some(Dimension::Segment),
            Metric::Tasks
            | Metric::ContentApprovals
            | Metric::ImagesGenerated
            | Metric::VideoMinutes => Some(Dimension::User),
            Metric::Conversations => Some(Dimension::Channel),
        }
    }

    pub fn query(&self) -> MetricQuery {
        match self {
            Metric::Leads => MetricQuery::count("leads", "created_at").filter_on("segment_id"),
            Metric::Tasks => MetricQuery::count("tasks", "created_at").filter_on("assignee_id"),
            Metric::Conversations => {
                MetricQuery::count("conversations", "created_at").filter_on("channel")
            }
            Metric::ContentApprovals => MetricQuery::count("content", "updated_at")
                .filter_on("reviewer_id")
                .with_predicate("status = 'approved'"),
            Metric::Requirements => {
                MetricQuery::count("requirements", "created_at").filter_on("segment_id")
            }
            Metric::ImagesGenerated => {
                MetricQuery::count("generated_images", "created_at").filter_on("user_id")
            }
            Metric::VideoMinutes => MetricQuery::count("videos", "created_at")
                .filter_on("user_id")
                .aggregate(Aggregation::Sum("duration_minutes")),
            Metric::UniqueVisitors => MetricQuery::count("page_visits", "visited_at")
                .filter_on("segment_id")
                .aggregate(Aggregation::CountDistinct("visitor_id")),
            Metric::PageVisits => {
                MetricQuery::count("page_visits", "visited_at").filter_on("segment_id")
            }
        }
    }

    pub fn info(&self) -> MetricInfo {
        let dimension = self.dimension();
        MetricInfo {
            name: self.name(),
            description: self.description(),
            dimension,
            filter_param: dimension.map(|d| d.param_name()),
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Round half away from zero to one decimal place.
pub fn round_one_decimal(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

/// Percentage change from `previous` to `actual`, rounded to one decimal.
/// A zero previous period reads as 100% growth when anything happened,
/// otherwise 0%.
pub fn percent_change(actual: f64, previous: f64) -> f64 {
    if previous > 0.0 {
        round_one_decimal((actual - previous) / previous * 100.0)
    } else if actual > 0.0 {
        100.0
    } else {
        0.0
    }
}

/// Compare `metric` over `range` with the equal-length window before it.
/// Both aggregates are issued concurrently.
pub async fn compare<S: MetricSource>(
    source: &S,
    metric: Metric,
    scope: &Scope,
    range: &DateRange,
) -> Result<PeriodComparison> {
    let query = metric.query();
    let previous_range = range.previous();
    log::debug!(
        "comparing {metric} for site {} over {:?} vs {:?}",
        scope.site_id,
        range.to_window(),
        previous_range.to_window()
    );

    let (actual, previous) = tokio::try_join!(
        source.aggregate(query, scope.clone(), *range),
        source.aggregate(query, scope.clone(), previous_range),
    )?;

    Ok(build_comparison(metric, scope, range, actual, previous, false))
}

/// [`compare`], degrading a data-layer failure to a zero-valued result.
///
/// Read-only analytics never fail a dashboard: `DataUnavailable` is logged
/// and replaced by zeros with `metadata.degraded` set. Caller errors still
/// propagate.
pub async fn compare_or_zero<S: MetricSource>(
    source: &S,
    metric: Metric,
    scope: &Scope,
    range: &DateRange,
) -> Result<PeriodComparison> {
    match compare(source, metric, scope, range).await {
        Ok(result) => Ok(result),
        Err(e @ Error::DataUnavailable(_)) => Ok(zero_comparison(metric, scope, range, &e)),
        Err(e) => Err(e),
    }
}

/// Zero-valued fallback for a failed comparison. Logs the cause.
pub fn zero_comparison(
    metric: Metric,
    scope: &Scope,
    range: &DateRange,
    cause: &Error,
) -> PeriodComparison {
    log::error!(
        "{metric} unavailable for site {}, returning zeros: {cause}",
        scope.site_id
    );
    build_comparison(metric, scope, range, 0.0, 0.0, true)
}

fn build_comparison(
    metric: Metric,
    scope: &Scope,
    range: &DateRange,
    actual: f64,
    previous: f64,
    degraded: bool,
) -> PeriodComparison {
    let period_type = PeriodType::classify(range);
    let filter = match (metric.dimension(), scope.filter.as_ref()) {
        (Some(kind), Some(value)) => Some(AppliedFilter {
            kind,
            value: value.clone(),
        }),
        _ => None,
    };

    PeriodComparison {
        actual,
        previous,
        percent_change: percent_change(actual, previous),
        period_type,
        metadata: ComparisonMetadata {
            metric: metric.name().to_string(),
            current_period: range.to_window(),
            previous_period: range.previous().to_window(),
            filter,
            comparison_label: period_type.comparison_label().to_string(),
            degraded,
        },
    }
}
