//! Cache and queue adapter for Redis
//!
//! Key-value, hash, list-queue and pub/sub operations against the asset
//! bound to the `cache-queue` capability. Same discipline as the vector
//! adapter: the cache is an accelerator, so every failure degrades to a
//! miss or a no-op instead of an error.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;

/// Adapter over one Redis instance.
#[derive(Clone)]
pub struct CacheQueueAdapter {
    conn: Option<ConnectionManager>,
    url: String,
}

impl CacheQueueAdapter {
    /// Connect to Redis at `url`. Connection failures leave the adapter
    /// inert; the connection manager reconnects on its own once the backend
    /// comes back.
    pub async fn connect(url: impl Into<String>) -> Self {
        let url = url.into();
        let conn = match redis::Client::open(url.as_str()) {
            Ok(client) => match ConnectionManager::new(client).await {
                Ok(conn) => Some(conn),
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "cache connection unavailable");
                    None
                }
            },
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "invalid cache url");
                None
            }
        };
        Self { conn, url }
    }

    /// Adapter with no backing connection; used where the capability has no
    /// binding.
    pub fn disconnected(url: impl Into<String>) -> Self {
        Self {
            conn: None,
            url: url.into(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn handle(&self) -> Option<ConnectionManager> {
        self.conn.clone()
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        let mut conn = self.handle()?;
        match conn.get::<_, Option<String>>(key).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key, error = %e, "cache get failed");
                None
            }
        }
    }

    /// Set with optional TTL in seconds.
    pub async fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> bool {
        let Some(mut conn) = self.handle() else {
            return false;
        };
        let result = match ttl_secs {
            Some(ttl) => conn.set_ex::<_, _, ()>(key, value, ttl).await,
            None => conn.set::<_, _, ()>(key, value).await,
        };
        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(key, error = %e, "cache set failed");
                false
            }
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get(key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key, error = %e, "cached value unparseable, ignoring");
                None
            }
        }
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl_secs: Option<u64>) -> bool {
        match serde_json::to_string(value) {
            Ok(raw) => self.set(key, &raw, ttl_secs).await,
            Err(e) => {
                tracing::warn!(key, error = %e, "value not serializable for cache");
                false
            }
        }
    }

    pub async fn delete(&self, key: &str) -> bool {
        let Some(mut conn) = self.handle() else {
            return false;
        };
        match conn.del::<_, u64>(key).await {
            Ok(removed) => removed > 0,
            Err(e) => {
                tracing::warn!(key, error = %e, "cache delete failed");
                false
            }
        }
    }

    pub async fn exists(&self, key: &str) -> bool {
        let Some(mut conn) = self.handle() else {
            return false;
        };
        conn.exists::<_, bool>(key).await.unwrap_or(false)
    }

    pub async fn expire(&self, key: &str, ttl_secs: i64) -> bool {
        let Some(mut conn) = self.handle() else {
            return false;
        };
        conn.expire::<_, bool>(key, ttl_secs).await.unwrap_or(false)
    }

    pub async fn hget(&self, key: &str, field: &str) -> Option<String> {
        let mut conn = self.handle()?;
        conn.hget::<_, _, Option<String>>(key, field)
            .await
            .unwrap_or(None)
    }

    pub async fn hset(&self, key: &str, field: &str, value: &str) -> bool {
        let Some(mut conn) = self.handle() else {
            return false;
        };
        match conn.hset::<_, _, _, ()>(key, field, value).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(key, field, error = %e, "cache hset failed");
                false
            }
        }
    }

    pub async fn hgetall(&self, key: &str) -> HashMap<String, String> {
        let Some(mut conn) = self.handle() else {
            return HashMap::new();
        };
        conn.hgetall::<_, HashMap<String, String>>(key)
            .await
            .unwrap_or_default()
    }

    /// Enqueue at the head; consumers pop from the tail, so order is FIFO.
    pub async fn push(&self, queue: &str, value: &str) -> bool {
        let Some(mut conn) = self.handle() else {
            return false;
        };
        match conn.lpush::<_, _, ()>(queue, value).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(queue, error = %e, "queue push failed");
                false
            }
        }
    }

    pub async fn pop(&self, queue: &str) -> Option<String> {
        let mut conn = self.handle()?;
        conn.rpop::<_, Option<String>>(queue, None)
            .await
            .unwrap_or(None)
    }

    pub async fn queue_len(&self, queue: &str) -> u64 {
        let Some(mut conn) = self.handle() else {
            return 0;
        };
        conn.llen::<_, u64>(queue).await.unwrap_or(0)
    }

    /// Fire-and-forget publish; returns the subscriber count Redis reports.
    pub async fn publish(&self, channel: &str, message: &str) -> u64 {
        let Some(mut conn) = self.handle() else {
            return 0;
        };
        match conn.publish::<_, _, u64>(channel, message).await {
            Ok(receivers) => receivers,
            Err(e) => {
                tracing::warn!(channel, error = %e, "publish failed");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disconnected_adapter_degrades_to_misses_and_noops() {
        let cache = CacheQueueAdapter::disconnected("redis://localhost:6379");
        assert!(!cache.is_connected());
        assert_eq!(cache.get("k").await, None);
        assert!(!cache.set("k", "v", Some(60)).await);
        assert!(!cache.exists("k").await);
        assert!(!cache.delete("k").await);
        assert_eq!(cache.pop("q").await, None);
        assert_eq!(cache.queue_len("q").await, 0);
        assert_eq!(cache.publish("c", "m").await, 0);
        assert!(cache.hgetall("h").await.is_empty());
    }

    #[tokio::test]
    async fn get_json_returns_none_for_missing_key() {
        let cache = CacheQueueAdapter::disconnected("redis://localhost:6379");
        let value: Option<serde_json::Value> = cache.get_json("missing").await;
        assert!(value.is_none());
    }
}
