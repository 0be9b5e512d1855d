//!
//! src/cache.rs  Oct 18th, 2025
//!
//! Memoizes successful upstream lookups by key. Failed computations are
//! never stored, so the next call with the same key tries again.
//!

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct CacheEntry<K, V> {
    pub key: K,
    pub value: V,
    pub inserted_at: DateTime<Utc>
}

/// Unbounded map. Concurrent misses on one key may both compute; the last
/// insert wins and readers only ever see whole entries.
pub struct ResponseCache<K, V> {
    name: &'static str,
    entries: RwLock<HashMap<K, CacheEntry<K, V>>>
}

impl<K, V> ResponseCache<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    V: Clone
{
    pub fn new(name: &'static str) -> Self {
        Self { name, entries: RwLock::new(HashMap::new()) }
    }

    pub async fn get_or_compute<F, Fut, E>(&self, key: &K, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>
    {
        if let Some(entry) = self.entries.read().await.get(key) {
            debug!(cache = self.name, key = ?key, "cache.hit");
            return Ok(entry.value.clone());
        }

        debug!(cache = self.name, key = ?key, "cache.miss");
        let value = compute().await?;

        let entry = CacheEntry { key: key.clone(), value: value.clone(), inserted_at: Utc::now() };
        self.entries.write().await.insert(key.clone(), entry);
        Ok(value)
    }

    #[cfg(test)]
    pub async fn get(&self, key: &K) -> Option<CacheEntry<K, V>> {
        self.entries.read().await.get(key).cloned()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn second_call_is_served_from_cache() {
        let cache: ResponseCache<String, String> = ResponseCache::new("test");
        let counter = AtomicUsize::new(0);
        let key = "X".to_string();

        for _ in 0..2 {
            let v = cache.get_or_compute(&key, || async {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ()>("value".to_string())
            }).await.unwrap();
            assert_eq!(v, "value");
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        let entry = cache.get(&key).await.unwrap();
        assert_eq!(entry.key, "X");
        assert!(entry.inserted_at <= Utc::now());
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let cache: ResponseCache<String, u32> = ResponseCache::new("test");
        let key = "A1".to_string();

        let err = cache.get_or_compute(&key, || async { Err::<u32, _>("boom") }).await;
        assert_eq!(err, Err("boom"));
        assert_eq!(cache.len().await, 0);

        let ok = cache.get_or_compute(&key, || async { Ok::<_, &str>(7) }).await;
        assert_eq!(ok, Ok(7));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn namespaces_are_independent() {
        let tracks: ResponseCache<String, u32> = ResponseCache::new("tracks");
        let albums: ResponseCache<String, u32> = ResponseCache::new("albums");
        let key = "same".to_string();

        tracks.get_or_compute(&key, || async { Ok::<_, ()>(1) }).await.unwrap();
        let v = albums.get_or_compute(&key, || async { Ok::<_, ()>(2) }).await.unwrap();
        assert_eq!(v, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_leave_a_whole_entry() {
        let cache: Arc<ResponseCache<String, Vec<u32>>> = Arc::new(ResponseCache::new("test"));
        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..32_u32 {
            let cache = cache.clone();
            tasks.spawn(async move {
                cache.get_or_compute(&"k".to_string(), || async move {
                    tokio::task::yield_now().await;
                    Ok::<_, ()>(vec![i; 64])
                }).await
            });
        }
        while let Some(r) = tasks.join_next().await {
            let v = r.unwrap().unwrap();
            assert_eq!(v.len(), 64);
        }
        let entry = cache.get(&"k".to_string()).await.unwrap();
        assert!(entry.value.iter().all(|x| *x == entry.value[0]));
    }
}
