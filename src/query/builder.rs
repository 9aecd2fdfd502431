use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};
use crate::query::period::DateRange;

static RE_SITE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._:\-]{1,256}$").unwrap());

/// Check that a site identifier is non-empty, at most 256 characters, and
/// limited to alphanumerics and `.`, `-`, `_`, `:`.
pub fn validate_site_id(site_id: &str) -> Result<()> {
    if site_id.is_empty() {
        return Err(Error::MissingParameter("siteId".into()));
    }
    if !RE_SITE_ID.is_match(site_id) {
        return Err(Error::InvalidParameter(format!(
            "siteId may only contain alphanumeric characters, '.', '-', '_', ':' (max 256), got '{site_id}'"
        )));
    }
    Ok(())
}

/// How rows in a window collapse to a single number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    Count,
    Sum(&'static str),
    CountDistinct(&'static str),
}

impl Aggregation {
    fn select_expr(&self) -> String {
        match self {
            Aggregation::Count => "COUNT(*)".to_string(),
            Aggregation::Sum(col) => format!("COALESCE(SUM({col}), 0)"),
            Aggregation::CountDistinct(col) => format!("COUNT(DISTINCT {col})"),
        }
    }
}

/// Static description of a metric's aggregate query.
///
/// All identifiers are compile-time constants, so they are interpolated into
/// SQL directly. Only values (site, filter, window bounds) are bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricQuery {
    pub table: &'static str,
    pub date_column: &'static str,
    pub site_column: &'static str,
    pub filter_column: Option<&'static str>,
    pub aggregation: Aggregation,
    /// Fixed predicate ANDed into every query, e.g. `status = 'approved'`.
    pub predicate: Option<&'static str>,
}

impl MetricQuery {
    pub const fn count(table: &'static str, date_column: &'static str) -> Self {
        Self {
            table,
            date_column,
            site_column: "site_id",
            filter_column: None,
            aggregation: Aggregation::Count,
            predicate: None,
        }
    }

    pub fn filter_on(mut self, column: &'static str) -> Self {
        self.filter_column = Some(column);
        self
    }

    pub fn aggregate(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = aggregation;
        self
    }

    pub fn with_predicate(mut self, predicate: &'static str) -> Self {
        self.predicate = Some(predicate);
        self
    }
}

/// Tenant plus optional dimension value narrowing an aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub site_id: String,
    pub filter: Option<String>,
}

impl Scope {
    /// A filter value of `"all"` (any case) or an empty string means no filter.
    pub fn new(site_id: &str, filter: Option<&str>) -> Self {
        let filter = filter
            .map(str::trim)
            .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("all"))
            .map(str::to_string);
        Self {
            site_id: site_id.to_string(),
            filter,
        }
    }

    pub fn site(site_id: &str) -> Self {
        Self::new(site_id, None)
    }
}

/// Build the aggregate statement for one window.
pub fn build_aggregate_sql(
    query: &MetricQuery,
    scope: &Scope,
    window: &DateRange,
) -> (String, Vec<Box<dyn rusqlite::types::ToSql>>) {
    let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
    let mut wheres = Vec::new();

    wheres.push(format!("{} = ?1", query.site_column));
    params.push(Box::new(scope.site_id.clone()));

    let bounds = window.to_window();
    wheres.push(format!("{} >= ?2", query.date_column));
    params.push(Box::new(bounds.start));
    wheres.push(format!("{} <= ?3", query.date_column));
    params.push(Box::new(bounds.end));

    match (query.filter_column, scope.filter.as_ref()) {
        (Some(col), Some(value)) => {
            wheres.push(format!("{col} = ?4"));
            params.push(Box::new(value.clone()));
        }
        (None, Some(value)) => {
            log::debug!(
                "{} has no filter column; ignoring dimension value '{value}'",
                query.table
            );
        }
        _ => {}
    }

    if let Some(predicate) = query.predicate {
        wheres.push(format!("({predicate})"));
    }

    let sql = format!(
        "SELECT {} FROM {} WHERE {}",
        query.aggregation.select_expr(),
        query.table,
        wheres.join(" AND ")
    );
    (sql, params)
}
