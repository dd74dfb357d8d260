//! Redis store implementation over a `deadpool-redis` connection pool.
//!
//! Every primitive maps onto one Redis command, except [`QueueStore::claim`],
//! which runs as a single Lua script so the read of the best member and its
//! removal happen atomically on the server. Two consumers racing for the same
//! member therefore can never both get it.
//!
//! ## Example
//!
//! ```no_run
//! use redis_queue::{QueueClientFactory, QueueConfig, RedisConfig, StoreConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = QueueConfig {
//!     queue_name: "my_queue".to_string(),
//!     store: StoreConfig::Redis(RedisConfig {
//!         host: "localhost".to_string(),
//!         port: 6379,
//!         ..Default::default()
//!     }),
//!     ..Default::default()
//! };
//!
//! let client = QueueClientFactory::create_client(config).await?;
//! # Ok(())
//! # }
//! ```

use crate::client::QueueStore;
use crate::error::{ConfigurationError, QueueError, StoreError};
use crate::message::QueueName;
use crate::provider::{RedisConfig, StoreType};
use crate::score::{ScanOrder, ScoreRange};
use async_trait::async_trait;
use deadpool_redis::{redis, Config, Connection, Pool, PoolConfig, Runtime};
use tracing::debug;

#[cfg(test)]
#[path = "redis_tests.rs"]
mod tests;

/// Claims the first member found across `(min, max, order)` triples in ARGV.
///
/// Returns `{member, score}` or nil when no range holds a member.
const CLAIM_SCRIPT: &str = r#"
for i = 1, #ARGV, 3 do
    local found
    if ARGV[i + 2] == 'asc' then
        found = redis.call('ZRANGEBYSCORE', KEYS[1], ARGV[i], ARGV[i + 1], 'WITHSCORES', 'LIMIT', 0, 1)
    else
        found = redis.call('ZREVRANGEBYSCORE', KEYS[1], ARGV[i + 1], ARGV[i], 'WITHSCORES', 'LIMIT', 0, 1)
    end
    if #found > 0 then
        redis.call('ZREM', KEYS[1], found[1])
        return found
    end
end
return false
"#;

/// Redis-backed store
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
    claim_script: redis::Script,
}

impl RedisStore {
    /// Create a pooled store from configuration; connections open lazily
    pub fn new(config: &RedisConfig) -> Result<Self, QueueError> {
        let mut pool_config = Config::from_url(config.connection_url());
        pool_config.pool = Some(PoolConfig::new(config.pool_size));

        let pool = pool_config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| ConfigurationError::Invalid {
                message: format!("cannot create Redis pool: {}", e),
            })?;

        debug!(
            host = %config.host,
            port = config.port,
            database = config.database,
            pool_size = config.pool_size,
            "Created Redis connection pool"
        );
        Ok(Self::from_pool(pool))
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: Pool) -> Self {
        Self {
            pool,
            claim_script: redis::Script::new(CLAIM_SCRIPT),
        }
    }

    async fn connection(&self) -> Result<Connection, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))
    }
}

fn order_arg(order: ScanOrder) -> &'static str {
    match order {
        ScanOrder::Ascending => "asc",
        ScanOrder::Descending => "desc",
    }
}

/// Flattened `(min, max, order)` script arguments, one triple per range
fn claim_args(ranges: &[ScoreRange]) -> Vec<String> {
    ranges
        .iter()
        .flat_map(|range| {
            [
                range.min.to_string(),
                range.max.to_string(),
                order_arg(range.order).to_string(),
            ]
        })
        .collect()
}

/// `ZRANGEBYSCORE` / `ZREVRANGEBYSCORE` for a range, with scores
fn range_command(key: &QueueName, range: &ScoreRange, limit: usize) -> redis::Cmd {
    let mut cmd = match range.order {
        ScanOrder::Ascending => {
            let mut cmd = redis::cmd("ZRANGEBYSCORE");
            cmd.arg(key.as_str()).arg(range.min).arg(range.max);
            cmd
        }
        ScanOrder::Descending => {
            let mut cmd = redis::cmd("ZREVRANGEBYSCORE");
            cmd.arg(key.as_str()).arg(range.max).arg(range.min);
            cmd
        }
    };
    cmd.arg("WITHSCORES").arg("LIMIT").arg(0).arg(limit);
    cmd
}

fn command_error(error: redis::RedisError) -> StoreError {
    if error.is_io_error() || error.is_connection_refusal() || error.is_connection_dropped() {
        StoreError::Connection(error.to_string())
    } else if error.kind() == redis::ErrorKind::TypeError {
        StoreError::UnexpectedReply(error.to_string())
    } else {
        StoreError::Command(error.to_string())
    }
}

#[async_trait]
impl QueueStore for RedisStore {
    async fn add(&self, key: &QueueName, score: f64, member: &str) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let _added: i64 = redis::cmd("ZADD")
            .arg(key.as_str())
            .arg(score)
            .arg(member)
            .query_async(&mut *conn)
            .await
            .map_err(command_error)?;
        Ok(())
    }

    async fn range_by_score(
        &self,
        key: &QueueName,
        range: &ScoreRange,
        limit: usize,
    ) -> Result<Vec<(String, f64)>, StoreError> {
        // LIMIT 0 0 has no useful meaning; skip the round-trip
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut conn = self.connection().await?;
        range_command(key, range, limit)
            .query_async(&mut *conn)
            .await
            .map_err(command_error)
    }

    async fn remove(&self, key: &QueueName, member: &str) -> Result<bool, StoreError> {
        let mut conn = self.connection().await?;
        let removed: i64 = redis::cmd("ZREM")
            .arg(key.as_str())
            .arg(member)
            .query_async(&mut *conn)
            .await
            .map_err(command_error)?;
        Ok(removed > 0)
    }

    async fn cardinality(&self, key: &QueueName) -> Result<u64, StoreError> {
        let mut conn = self.connection().await?;
        redis::cmd("ZCARD")
            .arg(key.as_str())
            .query_async(&mut *conn)
            .await
            .map_err(command_error)
    }

    async fn append(&self, key: &QueueName, value: &str) -> Result<u64, StoreError> {
        let mut conn = self.connection().await?;
        redis::cmd("RPUSH")
            .arg(key.as_str())
            .arg(value)
            .query_async(&mut *conn)
            .await
            .map_err(command_error)
    }

    async fn claim(
        &self,
        key: &QueueName,
        ranges: &[ScoreRange],
    ) -> Result<Option<(String, f64)>, StoreError> {
        let mut invocation = self.claim_script.prepare_invoke();
        invocation.key(key.as_str());
        for arg in claim_args(ranges) {
            invocation.arg(arg);
        }

        let mut conn = self.connection().await?;
        invocation
            .invoke_async(&mut *conn)
            .await
            .map_err(command_error)
    }

    async fn clear(&self, key: &QueueName) -> Result<u64, StoreError> {
        let mut conn = self.connection().await?;
        redis::cmd("ZREMRANGEBYRANK")
            .arg(key.as_str())
            .arg(0)
            .arg(-1)
            .query_async(&mut *conn)
            .await
            .map_err(command_error)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let reply: String = redis::cmd("PING")
            .query_async(&mut *conn)
            .await
            .map_err(command_error)?;

        if reply == "PONG" {
            Ok(())
        } else {
            Err(StoreError::UnexpectedReply(reply))
        }
    }

    fn store_type(&self) -> StoreType {
        StoreType::Redis
    }
}
