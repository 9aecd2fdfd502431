//! User identifier lookup with an explicit, injected TTL cache.

use std::time::Duration;

use moka::future::Cache;

use crate::error::Result;
use crate::metrics::MetricSource;

pub const DEFAULT_TTL: Duration = Duration::from_secs(300);
const MAX_ENTRIES: u64 = 10_000;

/// Resolves `userId` dimension values (an id or an email) to user ids,
/// caching hits per site for a fixed time-to-live.
///
/// Unknown identifiers pass through unchanged and are not cached, so a user
/// created after a miss is picked up on the next request.
#[derive(Debug, Clone)]
pub struct UserDirectory {
    cache: Cache<(String, String), String>,
}

impl UserDirectory {
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(MAX_ENTRIES)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub async fn resolve<S: MetricSource>(
        &self,
        source: &S,
        site_id: &str,
        identifier: &str,
    ) -> Result<String> {
        let key = (site_id.to_string(), identifier.to_string());
        if let Some(user_id) = self.cache.get(&key).await {
            return Ok(user_id);
        }

        match source
            .resolve_user(site_id.to_string(), identifier.to_string())
            .await?
        {
            Some(user_id) => {
                self.cache.insert(key, user_id.clone()).await;
                Ok(user_id)
            }
            None => {
                log::debug!("No user matches '{identifier}' on site {site_id}; filtering as-is");
                Ok(identifier.to_string())
            }
        }
    }

    /// Drop one cached identifier, e.g. after a user's email changes.
    pub async fn invalidate(&self, site_id: &str, identifier: &str) {
        self.cache
            .invalidate(&(site_id.to_string(), identifier.to_string()))
            .await;
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }
}

impl Default for UserDirectory {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::builder::{MetricQuery, Scope};
    use crate::query::period::DateRange;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingLookup {
        lookups: AtomicUsize,
    }

    impl MetricSource for CountingLookup {
        async fn aggregate(&self, _: MetricQuery, _: Scope, _: DateRange) -> Result<f64> {
            Ok(0.0)
        }

        async fn resolve_user(&self, _site_id: String, identifier: String) -> Result<Option<String>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Ok(match identifier.as_str() {
                "ada@example.com" => Some("u-42".to_string()),
                _ => None,
            })
        }
    }

    #[tokio::test]
    async fn test_hits_are_cached() {
        let source = CountingLookup::default();
        let directory = UserDirectory::default();

        for _ in 0..3 {
            let id = directory
                .resolve(&source, "site-1", "ada@example.com")
                .await
                .unwrap();
            assert_eq!(id, "u-42");
        }
        assert_eq!(source.lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cache_is_per_site() {
        let source = CountingLookup::default();
        let directory = UserDirectory::default();

        directory.resolve(&source, "site-1", "ada@example.com").await.unwrap();
        directory.resolve(&source, "site-2", "ada@example.com").await.unwrap();
        assert_eq!(source.lookups.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_misses_pass_through_uncached() {
        let source = CountingLookup::default();
        let directory = UserDirectory::default();

        for _ in 0..2 {
            let id = directory
                .resolve(&source, "site-1", "nobody@example.com")
                .await
                .unwrap();
            assert_eq!(id, "nobody@example.com");
        }
        assert_eq!(source.lookups.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate() {
        let source = CountingLookup::default();
        let directory = UserDirectory::default();

        directory.resolve(&source, "site-1", "ada@example.com").await.unwrap();
        directory.invalidate("site-1", "ada@example.com").await;
        directory.resolve(&source, "site-1", "ada@example.com").await.unwrap();
        assert_eq!(source.lookups.load(Ordering::SeqCst), 2);

        directory.invalidate_all();
        directory.resolve(&source, "site-1", "ada@example.com").await.unwrap();
        assert_eq!(source.lookups.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_expires_after_ttl() {
        let source = CountingLookup::default();
        let directory = UserDirectory::new(Duration::from_millis(50));

        directory.resolve(&source, "site-1", "ada@example.com").await.unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;
        directory.resolve(&source, "site-1", "ada@example.com").await.unwrap();
        assert_eq!(source.lookups.load(Ordering::SeqCst), 2);
    }
}
