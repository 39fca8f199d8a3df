use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

struct CacheEntry<V> {
    data: V,
    stored_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.stored_at) >= self.ttl
    }
}

/// Keyed cache whose entries expire lazily on read.
///
/// There is no background sweep: an expired entry is evicted by the first
/// `get` or `has` that observes it.
#[derive(Clone)]
pub struct TtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    name: &'static str,
    default_ttl: Duration,
    inner: Arc<Mutex<HashMap<String, CacheEntry<V>>>>,
}

impl<V> TtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(name: &'static str, default_ttl: Duration) -> Self {
        Self {
            name,
            default_ttl,
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Stores `data` under `key` using the cache-wide default TTL.
    pub async fn set(&self, key: impl Into<String>, data: V) {
        self.set_with_ttl(key, data, self.default_ttl).await;
    }

    pub async fn set_with_ttl(&self, key: impl Into<String>, data: V, ttl: Duration) {
        let key = key.into();
        debug!(cache = self.name, key = %key, ?ttl, "Cache PUT");
        let entry = CacheEntry {
            data,
            stored_at: Instant::now(),
            ttl,
        };
        self.inner.lock().await.insert(key, entry);
    }

    pub async fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.inner.lock().await;
        let expired = match entries.get(key) {
            Some(entry) => entry.is_expired(Instant::now()),
            None => {
                debug!(cache = self.name, key, "Cache MISS");
                return None;
            }
        };

        if expired {
            debug!(cache = self.name, key, "Cache entry expired");
            entries.remove(key);
            return None;
        }

        debug!(cache = self.name, key, "Cache HIT");
        entries.get(key).map(|entry| entry.data.clone())
    }

    pub async fn has(&self, key: &str) -> bool {
        self.get(key).await.is_some()
    }

    pub async fn delete(&self, key: &str) {
        self.inner.lock().await.remove(key);
        debug!(cache = self.name, key, "Cache REMOVE");
    }

    pub async fn clear(&self) {
        self.inner.lock().await.clear();
        debug!(cache = self.name, "Cache CLEAR");
    }
}

/// Builds a deterministic key from a prefix and an ordered list of parts.
///
/// Every part is JSON-encoded so `["a:b"]` and `["a", "b"]` never collide.
pub fn cache_key<T: Serialize>(prefix: &str, parts: &[T]) -> String {
    let mut key = prefix.to_string();
    for part in parts {
        key.push(':');
        match serde_json::to_string(part) {
            Ok(encoded) => key.push_str(&encoded),
            Err(_) => key.push_str("null"),
        }
    }
    key
}
