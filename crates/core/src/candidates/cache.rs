use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::marketplace::{DealCandidate, Marketplace};

/// Snapshot of the open-deal list plus its refresh time.
#[derive(Debug, Clone)]
struct CacheEntry {
    deals: Arc<Vec<DealCandidate>>,
    last_refreshed: Option<DateTime<Utc>>,
}

/// TTL-bounded candidate cache shared by all workers and the watcher.
///
/// Readers never block on a refresh: the first caller past the TTL takes
/// the refresh guard and performs the marketplace call; concurrent callers
/// that find the guard held return the pre-refresh snapshot immediately.
/// A failed refresh keeps the stale list (availability over freshness).
pub struct CandidateCache {
    marketplace: Arc<dyn Marketplace>,
    refresh_interval: Duration,
    entry: RwLock<CacheEntry>,
    refresh_guard: Mutex<()>,
}

impl CandidateCache {
    pub fn new(marketplace: Arc<dyn Marketplace>, refresh_interval: Duration) -> Self {
        Self {
            marketplace,
            refresh_interval,
            entry: RwLock::new(CacheEntry {
                deals: Arc::new(Vec::new()),
                last_refreshed: None,
            }),
            refresh_guard: Mutex::new(()),
        }
    }

    /// Current candidate list, refreshed first if stale.
    pub async fn get_candidates(&self) -> Arc<Vec<DealCandidate>> {
        let (deals, stale) = {
            let entry = self.entry.read().await;
            (Arc::clone(&entry.deals), self.is_stale(&entry))
        };

        if !stale {
            return deals;
        }

        // Single-flight refresh; losers keep the pre-refresh snapshot.
        let Ok(_guard) = self.refresh_guard.try_lock() else {
            return deals;
        };

        // Another caller may have refreshed while we waited on the read
        // lock above.
        {
            let entry = self.entry.read().await;
            if !self.is_stale(&entry) {
                return Arc::clone(&entry.deals);
            }
        }

        match self.marketplace.list_open_deals().await {
            Ok(fresh) => {
                debug!("found {} open deals", fresh.len());
                crate::metrics::CACHE_REFRESHES.with_label_values(&["ok"]).inc();
                let fresh = Arc::new(fresh);
                let mut entry = self.entry.write().await;
                entry.deals = Arc::clone(&fresh);
                entry.last_refreshed = Some(Utc::now());
                fresh
            }
            Err(e) => {
                warn!("unable to refresh the open-deal list: {e}");
                crate::metrics::CACHE_REFRESHES
                    .with_label_values(&["error"])
                    .inc();
                deals
            }
        }
    }

    /// Timestamp of the last successful refresh.
    pub async fn last_refreshed(&self) -> Option<DateTime<Utc>> {
        self.entry.read().await.last_refreshed
    }

    fn is_stale(&self, entry: &CacheEntry) -> bool {
        match entry.last_refreshed {
            None => true,
            Some(at) => {
                let age = Utc::now().signed_duration_since(at);
                age.to_std().map(|a| a > self.refresh_interval).unwrap_or(true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockMarketplace;

    fn candidate(piece: &str) -> DealCandidate {
        crate::testing::fixtures::candidate(piece, "f01000")
    }

    #[tokio::test]
    async fn test_first_read_refreshes() {
        let marketplace = Arc::new(MockMarketplace::new());
        marketplace.set_open_deals(vec![candidate("baga6ea4seaqaaa")]).await;

        let cache = CandidateCache::new(
            Arc::clone(&marketplace) as Arc<dyn Marketplace>,
            Duration::from_secs(60),
        );

        let deals = cache.get_candidates().await;
        assert_eq!(deals.len(), 1);
        assert_eq!(marketplace.list_calls().await, 1);
        assert!(cache.last_refreshed().await.is_some());
    }

    #[tokio::test]
    async fn test_fresh_read_skips_refresh() {
        let marketplace = Arc::new(MockMarketplace::new());
        marketplace.set_open_deals(vec![candidate("baga6ea4seaqaaa")]).await;

        let cache = CandidateCache::new(
            Arc::clone(&marketplace) as Arc<dyn Marketplace>,
            Duration::from_secs(60),
        );

        cache.get_candidates().await;
        cache.get_candidates().await;
        cache.get_candidates().await;

        assert_eq!(marketplace.list_calls().await, 1);
    }

    #[tokio::test]
    async fn test_stale_read_refreshes_again() {
        let marketplace = Arc::new(MockMarketplace::new());
        marketplace.set_open_deals(vec![candidate("baga6ea4seaqaaa")]).await;

        let cache = CandidateCache::new(
            Arc::clone(&marketplace) as Arc<dyn Marketplace>,
            Duration::from_millis(10),
        );

        cache.get_candidates().await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        cache.get_candidates().await;

        assert_eq!(marketplace.list_calls().await, 2);
    }

    #[tokio::test]
    async fn test_refresh_failure_returns_stale_list() {
        let marketplace = Arc::new(MockMarketplace::new());
        marketplace.set_open_deals(vec![candidate("baga6ea4seaqaaa")]).await;

        let cache = CandidateCache::new(
            Arc::clone(&marketplace) as Arc<dyn Marketplace>,
            Duration::from_millis(10),
        );

        let first = cache.get_candidates().await;
        assert_eq!(first.len(), 1);

        marketplace.fail_next_list().await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        let second = cache.get_candidates().await;
        assert_eq!(second.len(), 1, "stale list served on refresh failure");
    }

    #[tokio::test]
    async fn test_concurrent_reads_single_refresh() {
        let marketplace = Arc::new(MockMarketplace::new());
        marketplace.set_open_deals(vec![candidate("baga6ea4seaqaaa")]).await;
        marketplace.set_list_delay(Duration::from_millis(50)).await;

        let cache = Arc::new(CandidateCache::new(
            Arc::clone(&marketplace) as Arc<dyn Marketplace>,
            Duration::from_secs(60),
        ));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move { cache.get_candidates().await }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(marketplace.list_calls().await, 1);
    }
}
