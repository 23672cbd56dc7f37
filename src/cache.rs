use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;

use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::error::Result;

/// Composite key identifying one cached fetch result. Every in-flight
/// request is tied to the key it was issued for, so completions can only
/// ever touch their own entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    /// The feed as a whole; invalidating it drops every cached page.
    Posts,
    PostsPage { limit: u32, offset: u32 },
    Post(Uuid),
    PostComments(Uuid),
    CommentReplies(Uuid),
    MyVote(Uuid),
    Groups(String),
}

#[derive(Debug, Default)]
struct CacheEntry {
    generation: u64,
    value: Option<serde_json::Value>,
}

/// Memoizing query cache. Each entry carries a generation that moves on
/// every invalidation; a fetch that was started against an older
/// generation returns its result to the caller but is not cached, so a
/// stale response can never overwrite newer state.
#[derive(Debug, Default)]
pub struct QueryCache {
    entries: Mutex<HashMap<QueryKey, CacheEntry>>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invalidate(&self, key: &QueryKey) {
        let mut entries = self.entries.lock().unwrap();
        if matches!(key, QueryKey::Posts) {
            for (k, entry) in entries.iter_mut() {
                if matches!(k, QueryKey::PostsPage { .. }) {
                    entry.generation += 1;
                    entry.value = None;
                }
            }
        }
        let entry = entries.entry(key.clone()).or_default();
        entry.generation += 1;
        entry.value = None;
        tracing::debug!(?key, "cache entry invalidated");
    }

    /// Returns the cached value for `key`, or runs `fetcher` and caches
    /// its result, unless the entry was invalidated while the fetch was
    /// in flight, in which case the result is returned but not stored.
    pub async fn get_or_fetch<T, F, Fut>(&self, key: QueryKey, fetcher: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let started_at = {
            let mut entries = self.entries.lock().unwrap();
            let entry = entries.entry(key.clone()).or_default();
            if let Some(value) = &entry.value {
                return Ok(serde_json::from_value(value.clone())?);
            }
            entry.generation
        };

        let fetched = fetcher().await?;

        let mut entries = self.entries.lock().unwrap();
        let entry = entries.entry(key.clone()).or_default();
        if entry.generation == started_at {
            entry.value = Some(serde_json::to_value(&fetched)?);
        } else {
            tracing::debug!(?key, "discarding stale fetch result");
        }

        Ok(fetched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn second_read_is_memoized() {
        let cache = QueryCache::new();
        let fetches = AtomicUsize::new(0);

        for _ in 0..3 {
            let n: u32 = cache
                .get_or_fetch(QueryKey::Posts, || async {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    Ok(7)
                })
                .await
                .unwrap();
            assert_eq!(n, 7);
        }

        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidation_forces_refetch() {
        let cache = QueryCache::new();
        let fetches = AtomicUsize::new(0);

        let fetch = || async {
            fetches.fetch_add(1, Ordering::SeqCst);
            Ok(1u32)
        };

        cache.get_or_fetch(QueryKey::Posts, fetch).await.unwrap();
        cache.invalidate(&QueryKey::Posts);
        cache.get_or_fetch(QueryKey::Posts, fetch).await.unwrap();

        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalidating_feed_drops_cached_pages() {
        let cache = QueryCache::new();
        let page_key = QueryKey::PostsPage {
            limit: 2,
            offset: 0,
        };
        let fetches = AtomicUsize::new(0);

        let fetch = || async {
            fetches.fetch_add(1, Ordering::SeqCst);
            Ok(vec![1u32, 2])
        };

        cache.get_or_fetch(page_key.clone(), fetch).await.unwrap();
        cache.invalidate(&QueryKey::Posts);
        cache.get_or_fetch(page_key, fetch).await.unwrap();

        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fetch_racing_an_invalidation_is_not_cached() {
        let cache = QueryCache::new();
        let key = QueryKey::Post(Uuid::new_v4());

        // Invalidation lands while the fetch is in flight.
        let value: u32 = cache
            .get_or_fetch(key.clone(), || async {
                cache.invalidate(&key);
                Ok(1)
            })
            .await
            .unwrap();
        assert_eq!(value, 1);

        // The stale 1 was discarded, so the next read fetches again.
        let fetches = AtomicUsize::new(0);
        let value: u32 = cache
            .get_or_fetch(key.clone(), || async {
                fetches.fetch_add(1, Ordering::SeqCst);
                Ok(2)
            })
            .await
            .unwrap();
        assert_eq!(value, 2);
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }
}
