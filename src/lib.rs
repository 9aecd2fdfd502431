pub mod date_util;
pub mod directory;
pub mod error;
pub mod metrics;
pub mod query;
pub mod server;
pub mod storage;

pub use directory::UserDirectory;
pub use error::{Error, Result};
pub use metrics::{Dimension, Metric, MetricInfo, MetricSource, PeriodComparison};
pub use query::builder::{MetricQuery, Scope};
pub use query::period::{DateRange, PeriodType};
pub use storage::Database;

use std::time::Duration;

use query::builder::validate_site_id;

/// Config keys read from `app_config`.
pub const CONFIG_BIND_ADDR: &str = "bind_addr";
pub const CONFIG_USER_CACHE_TTL_SECS: &str = "user_cache_ttl_secs";

/// Main entry point: period comparisons over a metric source.
#[derive(Clone)]
pub struct SitePulse<S = Database> {
    source: S,
    users: UserDirectory,
}

impl<S: MetricSource> SitePulse<S> {
    pub fn new(source: S, users: UserDirectory) -> Self {
        Self { source, users }
    }

    /// Compare `metric` over `range` against the preceding window of equal
    /// length, for one site and an optional dimension value.
    ///
    /// Fails only on caller errors. Data-layer failures degrade to a
    /// zero-valued result.
    pub async fn compare(
        &self,
        metric: Metric,
        site_id: &str,
        filter: Option<&str>,
        range: &DateRange,
    ) -> Result<PeriodComparison> {
        validate_site_id(site_id)?;
        let mut scope = Scope::new(site_id, filter);

        if metric.dimension() == Some(Dimension::User) {
            if let Some(value) = scope.filter.clone() {
                match self.users.resolve(&self.source, site_id, &value).await {
                    Ok(user_id) => scope.filter = Some(user_id),
                    Err(e @ Error::DataUnavailable(_)) => {
                        return Ok(metrics::zero_comparison(metric, &scope, range, &e));
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        metrics::compare_or_zero(&self.source, metric, &scope, range).await
    }
}

impl SitePulse<Database> {
    /// Build from a database, reading the user cache TTL from `app_config`.
    pub async fn from_database(db: Database) -> Result<Self> {
        let ttl = match db.config_get(CONFIG_USER_CACHE_TTL_SECS).await? {
            Some(raw) => Duration::from_secs(raw.trim().parse().map_err(|_| {
                Error::Config(format!(
                    "{CONFIG_USER_CACHE_TTL_SECS} must be a whole number of seconds, got '{raw}'"
                ))
            })?),
            None => directory::DEFAULT_TTL,
        };
        log::debug!("User cache TTL: {}s", ttl.as_secs());
        Ok(Self::new(db, UserDirectory::new(ttl)))
    }

    pub fn db(&self) -> &Database {
        &self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::repository;

    async fn seeded() -> SitePulse {
        let db = Database::open_memory().await.unwrap();
        db.writer()
            .call(|conn| {
                repository::upsert_user(conn, "site-1", "u-42", Some("Ada"), Some("ada@example.com"))?;
                conn.execute_batch(
                    "INSERT INTO tasks (task_id, site_id, assignee_id, created_at) VALUES
                        ('t1', 'site-1', 'u-42', '2024-01-10T00:00:00.000Z'),
                        ('t2', 'site-1', 'u-42', '2024-01-11T00:00:00.000Z'),
                        ('t3', 'site-1', 'u-7',  '2024-01-12T00:00:00.000Z'),
                        ('t4', 'site-1', 'u-42', '2023-12-12T00:00:00.000Z');",
                )?;
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
        SitePulse::from_database(db).await.unwrap()
    }

    fn january() -> DateRange {
        DateRange::parse("2024-01-01", "2024-01-31").unwrap()
    }

    #[tokio::test]
    async fn test_compare_resolves_user_email() {
        let pulse = seeded().await;
        let result = pulse
            .compare(Metric::Tasks, "site-1", Some("ada@example.com"), &january())
            .await
            .unwrap();
        assert_eq!(result.actual, 2.0);
        assert_eq!(result.previous, 1.0);
        assert_eq!(result.percent_change, 100.0);
        assert_eq!(result.metadata.filter.unwrap().value, "u-42");
    }

    #[tokio::test]
    async fn test_compare_all_filter() {
        let pulse = seeded().await;
        let result = pulse
            .compare(Metric::Tasks, "site-1", Some("all"), &january())
            .await
            .unwrap();
        assert_eq!(result.actual, 3.0);
        assert!(result.metadata.filter.is_none());
    }

    #[tokio::test]
    async fn test_compare_rejects_bad_site() {
        let pulse = seeded().await;
        let err = pulse
            .compare(Metric::Tasks, "site 1", None, &january())
            .await
            .unwrap_err();
        assert!(err.is_client_error());
    }

    /// Counts aggregate calls; every user lookup fails.
    #[derive(Default)]
    struct BrokenDirectory {
        aggregates: std::sync::atomic::AtomicUsize,
    }

    impl MetricSource for BrokenDirectory {
        async fn aggregate(&self, _: MetricQuery, _: Scope, _: DateRange) -> Result<f64> {
            self.aggregates
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(5.0)
        }

        async fn resolve_user(&self, _: String, _: String) -> Result<Option<String>> {
            Err(Error::DataUnavailable("database is locked".into()))
        }
    }

    #[tokio::test]
    async fn test_user_lookup_failure_degrades_to_zero() {
        let pulse = SitePulse::new(BrokenDirectory::default(), UserDirectory::default());
        let result = pulse
            .compare(Metric::Tasks, "site-1", Some("ada@example.com"), &january())
            .await
            .unwrap();
        assert_eq!(result.actual, 0.0);
        assert_eq!(result.previous, 0.0);
        assert_eq!(result.percent_change, 0.0);
        assert!(result.metadata.degraded);
        assert_eq!(
            pulse.source.aggregates.load(std::sync::atomic::Ordering::SeqCst),
            0
        );
    }

    #[tokio::test]
    async fn test_user_lookup_skipped_for_other_dimensions() {
        let pulse = SitePulse::new(BrokenDirectory::default(), UserDirectory::default());
        let result = pulse
            .compare(Metric::Leads, "site-1", Some("ada@example.com"), &january())
            .await
            .unwrap();
        assert_eq!(result.actual, 5.0);
        assert!(!result.metadata.degraded);
    }

    #[tokio::test]
    async fn test_from_database_rejects_bad_ttl() {
        let db = Database::open_memory().await.unwrap();
        db.config_set(CONFIG_USER_CACHE_TTL_SECS, "soon").await.unwrap();
        assert!(matches!(
            SitePulse::from_database(db).await,
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_table_counts() {
        let pulse = seeded().await;
        let counts = pulse.db().table_counts().await.unwrap();
        let tasks = counts.iter().find(|c| c.table == "tasks").unwrap();
        assert_eq!(tasks.rows, 4);
        let users = counts.iter().find(|c| c.table == "users").unwrap();
        assert_eq!(users.rows, 1);
    }
}
