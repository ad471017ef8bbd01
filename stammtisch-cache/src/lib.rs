//! Short-TTL read-through cache over Redis.
//!
//! This is a staleness-tolerant accelerator, not a correctness mechanism:
//! readers check it first, fall back to the store on a miss, and write the
//! result back under a TTL. The transport boundary absorbs every failure:
//! a read that cannot reach Redis is a miss, and a write that cannot reach
//! Redis is dropped, so no cache error ever escapes into a request.

use async_trait::async_trait;
use redis::{AsyncCommands, aio::ConnectionManager};
use std::time::Duration;
use tracing::{debug, warn};

/// Key/value store with TTL-on-write semantics and two-outcome reads.
#[async_trait]
pub trait Cache: Send + Sync {
    /// `Some(value)` on a hit, `None` on a miss or any transport failure.
    async fn get(&self, key: &str) -> Option<String>;

    /// Best effort: failures are dropped, not reported.
    async fn set(&self, key: &str, value: String, ttl: Duration);
}

/// Redis-backed [`Cache`]. Running without a Redis service is a valid mode:
/// a client built from no URL misses every read and drops every write.
#[derive(Clone)]
pub struct RedisCache {
    manager: Option<ConnectionManager>,
}

impl RedisCache {
    /// Connect to `redis_url`, or construct the disabled client when no URL
    /// is configured. Connection setup failures degrade to the disabled
    /// client as well, with a warning; they never propagate.
    pub async fn connect(redis_url: Option<&str>) -> Self {
        let Some(url) = redis_url else {
            debug!("No redis url configured, cache disabled");
            return Self { manager: None };
        };

        let manager = match redis::Client::open(url) {
            Ok(client) => match ConnectionManager::new(client).await {
                Ok(manager) => Some(manager),
                Err(err) => {
                    warn!(error = %err, "Connecting to redis failed, cache disabled");
                    None
                }
            },
            Err(err) => {
                warn!(error = %err, "Invalid redis url, cache disabled");
                None
            }
        };

        Self { manager }
    }

    #[must_use]
    pub fn disabled() -> Self {
        Self { manager: None }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.manager.is_some()
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Option<String> {
        let mut manager = self.manager.clone()?;

        match manager.get::<_, Option<String>>(key).await {
            Ok(value) => value,
            Err(err) => {
                warn!(%key, error = %err, "Cache read failed, treating as miss");
                None
            }
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) {
        let Some(mut manager) = self.manager.clone() else {
            return;
        };

        if let Err(err) = manager
            .set_ex::<_, _, ()>(key, value, ttl.as_secs())
            .await
        {
            warn!(%key, error = %err, "Cache write failed, dropping value");
        }
    }
}
