// Distributed locking over Redis SET NX EX

use crate::db::RedisPool;
use crate::errors::StorageError;
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Distributed lock trait for ensuring exclusive access to resources
#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// Acquire a lock on the specified resource with a TTL
    async fn acquire(&self, resource: &str, ttl: Duration) -> Result<LockGuard, StorageError>;
}

/// Lock guard that automatically releases the lock when dropped
pub struct LockGuard {
    resource: String,
    lock_value: String,
    pool: Option<RedisPool>,
    acquired_at: Instant,
}

impl LockGuard {
    /// Get the resource name this lock guards
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Get the time elapsed since lock acquisition
    pub fn elapsed(&self) -> Duration {
        self.acquired_at.elapsed()
    }

    /// Build a guard that releases nothing on drop. Used by in-process lock
    /// implementations and tests.
    pub fn detached(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            lock_value: String::new(),
            pool: None,
            acquired_at: Instant::now(),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let Some(pool) = self.pool.take() else {
            return;
        };
        let resource = self.resource.clone();
        let lock_value = self.lock_value.clone();

        tokio::spawn(async move {
            if let Err(e) = release_lock(&pool, &resource, &lock_value).await {
                warn!(
                    resource = %resource,
                    error = %e,
                    "Failed to release lock on drop"
                );
            }
        });
    }
}

/// Redis-backed lock implementation
pub struct RedLock {
    pool: RedisPool,
    retry_count: u32,
    retry_delay: Duration,
}

impl RedLock {
    /// Create a new RedLock instance
    pub fn new(pool: RedisPool) -> Self {
        Self {
            pool,
            retry_count: 3,
            retry_delay: Duration::from_millis(200),
        }
    }

    /// Create a RedLock with custom retry configuration
    pub fn with_retry(pool: RedisPool, retry_count: u32, retry_delay: Duration) -> Self {
        Self {
            pool,
            retry_count,
            retry_delay,
        }
    }

    /// Try to acquire the lock once
    async fn try_acquire_once(
        &self,
        resource: &str,
        ttl: Duration,
    ) -> Result<LockGuard, StorageError> {
        let mut conn = self.pool.get_connection();
        let key = format!("lock:{}", resource);
        let lock_value = Uuid::new_v4().to_string();

        // SET NX EX atomically sets the key with expiration only if absent
        let result: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(&lock_value)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs())
            .query_async(&mut conn)
            .await
            .map_err(|e| StorageError::RedisError(format!("Failed to acquire lock: {}", e)))?;

        if result.is_some() {
            debug!(
                resource = %resource,
                ttl_seconds = ttl.as_secs(),
                "Lock acquired"
            );

            Ok(LockGuard {
                resource: resource.to_string(),
                lock_value,
                pool: Some(self.pool.clone()),
                acquired_at: Instant::now(),
            })
        } else {
            Err(StorageError::LockHeld(resource.to_string()))
        }
    }
}

#[async_trait]
impl DistributedLock for RedLock {
    /// Acquire a distributed lock with retry logic
    #[instrument(skip(self), fields(resource = %resource, ttl_seconds = ?ttl.as_secs()))]
    async fn acquire(&self, resource: &str, ttl: Duration) -> Result<LockGuard, StorageError> {
        let mut attempts = 0;

        loop {
            match self.try_acquire_once(resource, ttl).await {
                Ok(guard) => {
                    info!(
                        resource = %resource,
                        attempts = attempts + 1,
                        "Lock acquired successfully"
                    );
                    return Ok(guard);
                }
                Err(e) => {
                    attempts += 1;
                    if attempts >= self.retry_count {
                        debug!(
                            resource = %resource,
                            attempts,
                            "Failed to acquire lock after all retries"
                        );
                        return Err(e);
                    }

                    debug!(
                        resource = %resource,
                        attempt = attempts,
                        retry_delay_ms = self.retry_delay.as_millis(),
                        "Lock acquisition failed, retrying"
                    );

                    sleep(self.retry_delay).await;
                }
            }
        }
    }
}

/// Release a lock by deleting the key if it matches the lock value
async fn release_lock(
    pool: &RedisPool,
    resource: &str,
    lock_value: &str,
) -> Result<(), StorageError> {
    let mut conn = pool.get_connection();
    let key = format!("lock:{}", resource);

    // Lua script atomically checks ownership before deleting
    let script = r#"
        if redis.call("get", KEYS[1]) == ARGV[1] then
            return redis.call("del", KEYS[1])
        else
            return 0
        end
    "#;

    let result: i32 = redis::Script::new(script)
        .key(&key)
        .arg(lock_value)
        .invoke_async(&mut conn)
        .await
        .map_err(|e| StorageError::RedisError(format!("Failed to release lock: {}", e)))?;

    if result == 1 {
        debug!(resource = %resource, "Lock released successfully");
    } else {
        warn!(
            resource = %resource,
            "Lock was not owned or already expired"
        );
    }

    Ok(())
}
