//! In-process TTL cache with a background sweeper

use metrics::counter;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, RwLock};
use tokio::task::JoinHandle;

/// Default TTLs
pub mod ttl {
    pub const POLICY_SECS: u64 = 300; // 5 minutes
    pub const USER_SECS: u64 = 300; // 5 minutes
    pub const RESOURCE_SECS: u64 = 300; // 5 minutes
    pub const HIERARCHY_SECS: u64 = 600; // 10 minutes
}

const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(10);

struct Entry<V> {
    value: V,
    /// `None` when the TTL runs past what `Instant` can represent.
    expires_at: Option<Instant>,
}

impl<V> Entry<V> {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

struct Store<K, V> {
    name: &'static str,
    ttl: Duration,
    entries: RwLock<HashMap<K, Entry<V>>>,
}

impl<K: Eq + Hash, V> Store<K, V> {
    async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }
}

struct Sweeper {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Map from key to value where every entry expires `ttl` after insertion.
///
/// Expired entries are never returned. A sweeper task started at construction
/// (when a tokio runtime is available) evicts them every `ttl / 2`; it is
/// stopped by [`TtlCache::shutdown`] or when the cache is dropped.
pub struct TtlCache<K, V> {
    store: Arc<Store<K, V>>,
    sweeper: Mutex<Option<Sweeper>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(name: &'static str, ttl: Duration) -> Self {
        let store = Arc::new(Store {
            name,
            ttl,
            entries: RwLock::new(HashMap::new()),
        });
        let sweeper = Self::spawn_sweeper(Arc::downgrade(&store), ttl);
        Self {
            store,
            sweeper: Mutex::new(sweeper),
        }
    }

    fn spawn_sweeper(store: Weak<Store<K, V>>, ttl: Duration) -> Option<Sweeper> {
        let runtime = tokio::runtime::Handle::try_current().ok()?;
        let interval = (ttl / 2).max(MIN_SWEEP_INTERVAL);
        let (stop, mut stop_rx) = oneshot::channel::<()>();

        let handle = runtime.spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        let Some(store) = store.upgrade() else {
                            break;
                        };
                        let evicted = store.sweep().await;
                        if evicted > 0 {
                            tracing::trace!(cache = store.name, evicted, "Swept expired cache entries");
                        }
                    }
                    _ = &mut stop_rx => {
                        break;
                    }
                }
            }
        });

        Some(Sweeper { stop, handle })
    }

    pub fn name(&self) -> &'static str {
        self.store.name
    }

    pub fn ttl(&self) -> Duration {
        self.store.ttl
    }

    /// Returns the live value for `key`, if any.
    pub async fn get(&self, key: &K) -> Option<V> {
        let entries = self.store.entries.read().await;
        let hit = entries
            .get(key)
            .filter(|entry| entry.is_live(Instant::now()))
            .map(|entry| entry.value.clone());
        let result = if hit.is_some() { "hit" } else { "miss" };
        counter!("abac_cache_operations_total", "cache" => self.store.name, "result" => result)
            .increment(1);
        hit
    }

    pub async fn insert(&self, key: K, value: V) {
        let expires_at = Instant::now().checked_add(self.store.ttl);
        self.store
            .entries
            .write()
            .await
            .insert(key, Entry { value, expires_at });
    }

    pub async fn invalidate(&self, key: &K) {
        self.store.entries.write().await.remove(key);
    }

    pub async fn clear(&self) {
        self.store.entries.write().await.clear();
    }

    /// Number of stored entries, expired ones included until swept.
    pub async fn len(&self) -> usize {
        self.store.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Evicts expired entries now and returns how many were removed.
    pub async fn sweep_expired(&self) -> usize {
        self.store.sweep().await
    }

    pub fn is_sweeping(&self) -> bool {
        self.sweeper
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|s| !s.handle.is_finished())
    }

    /// Stops the sweeper and waits for it to exit. Cached entries stay
    /// readable until they expire.
    pub async fn shutdown(&self) {
        let sweeper = self
            .sweeper
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(Sweeper { stop, handle }) = sweeper {
            let _ = stop.send(());
            let _ = handle.await;
        }
    }
}

impl<K, V> Drop for TtlCache<K, V> {
    fn drop(&mut self) {
        if let Some(sweeper) = self
            .sweeper
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            sweeper.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_and_insert() {
        let cache: TtlCache<String, i32> = TtlCache::new("test", Duration::from_secs(60));
        assert_eq!(cache.get(&"a".to_string()).await, None);
        cache.insert("a".to_string(), 1).await;
        assert_eq!(cache.get(&"a".to_string()).await, Some(1));
        cache.invalidate(&"a".to_string()).await;
        assert_eq!(cache.get(&"a".to_string()).await, None);
    }

    #[tokio::test]
    async fn test_expired_entries_are_hidden_then_swept() {
        let cache: TtlCache<u32, &str> = TtlCache::new("test", Duration::from_millis(20));
        cache.shutdown().await;
        cache.insert(1, "x").await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get(&1).await, None);
        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.sweep_expired().await, 1);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_background_sweeper_evicts() {
        let cache: TtlCache<u32, u32> = TtlCache::new("test", Duration::from_millis(20));
        assert!(cache.is_sweeping());
        cache.insert(7, 7).await;
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_shutdown_stops_sweeper() {
        let cache: TtlCache<u32, u32> = TtlCache::new("test", Duration::from_secs(1));
        assert!(cache.is_sweeping());
        cache.shutdown().await;
        assert!(!cache.is_sweeping());
        cache.insert(1, 1).await;
        assert_eq!(cache.get(&1).await, Some(1));
    }

    #[test]
    fn test_no_runtime_means_no_sweeper() {
        let cache: TtlCache<u32, u32> = TtlCache::new("test", Duration::from_secs(1));
        assert!(!cache.is_sweeping());
    }

    #[tokio::test]
    async fn test_unrepresentable_ttl_never_expires() {
        let cache: TtlCache<u32, u32> = TtlCache::new("test", Duration::from_secs(u64::MAX));
        cache.insert(1, 1).await;
        assert_eq!(cache.get(&1).await, Some(1));
        assert_eq!(cache.sweep_expired().await, 0);
        cache.shutdown().await;
    }

    #[tokio::test]
    async fn test_clear() {
        let cache: TtlCache<u32, u32> = TtlCache::new("test", Duration::from_secs(60));
        cache.insert(1, 1).await;
        cache.insert(2, 2).await;
        cache.clear().await;
        assert!(cache.is_empty().await);
    }
}
