//! Store types and queue configuration.

use crate::error::{ConfigurationError, QueueError, ValidationError};
use crate::message::{InstanceSalt, QueueName};
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Enumeration of supported backing stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    Redis,
    InMemory,
}

impl std::fmt::Display for StoreType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Redis => write!(f, "redis"),
            Self::InMemory => write!(f, "in_memory"),
        }
    }
}

/// Configuration for queue client initialization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Key of the sorted set holding pending messages
    pub queue_name: String,
    /// Key of the completion list; defaults to `<queue_name>:completed`
    pub completion_list: Option<String>,
    /// Interval between claim attempts while a receive waits
    pub poll_interval_ms: u64,
    /// Receive timeout used when the caller does not pass one
    pub default_receive_timeout_secs: u64,
    /// Salt appended to generated ids to keep producer instances apart
    pub instance_salt: Option<String>,
    pub store: StoreConfig,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            queue_name: "default_queue".to_string(),
            completion_list: None,
            poll_interval_ms: 100,
            default_receive_timeout_secs: 5,
            instance_salt: None,
            store: StoreConfig::default(),
        }
    }
}

impl QueueConfig {
    /// Validated queue key
    pub fn queue_name(&self) -> Result<QueueName, ValidationError> {
        QueueName::new(self.queue_name.clone())
    }

    /// Validated completion list key
    pub fn completion_list(&self) -> Result<QueueName, ValidationError> {
        match &self.completion_list {
            Some(name) => QueueName::new(name.clone()),
            None => self.queue_name()?.with_suffix("completed"),
        }
    }

    /// Validated instance salt, if configured
    pub fn instance_salt(&self) -> Result<Option<InstanceSalt>, ValidationError> {
        self.instance_salt
            .clone()
            .map(InstanceSalt::new)
            .transpose()
    }

    pub fn poll_interval(&self) -> Result<Duration, ConfigurationError> {
        i64::try_from(self.poll_interval_ms)
            .ok()
            .and_then(Duration::try_milliseconds)
            .ok_or_else(|| out_of_range("poll_interval_ms", self.poll_interval_ms))
    }

    pub fn default_receive_timeout(&self) -> Result<Duration, ConfigurationError> {
        i64::try_from(self.default_receive_timeout_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .ok_or_else(|| {
                out_of_range(
                    "default_receive_timeout_secs",
                    self.default_receive_timeout_secs,
                )
            })
    }

    /// Check the whole configuration before any store is contacted
    pub fn validate(&self) -> Result<(), QueueError> {
        let queue = self.queue_name()?;
        let completion = self.completion_list()?;
        if queue == completion {
            return Err(ConfigurationError::Invalid {
                message: "completion_list must differ from queue_name".to_string(),
            }
            .into());
        }

        self.instance_salt()?;

        if self.poll_interval_ms == 0 {
            return Err(ConfigurationError::Invalid {
                message: "poll_interval_ms must be greater than zero".to_string(),
            }
            .into());
        }
        self.poll_interval()?;
        self.default_receive_timeout()?;

        match &self.store {
            StoreConfig::Redis(redis) => redis.validate(),
            StoreConfig::InMemory(_) => Ok(()),
        }
    }
}

fn out_of_range(key: &str, value: u64) -> ConfigurationError {
    ConfigurationError::Invalid {
        message: format!("{} value {} is out of range", key, value),
    }
}

/// Store-specific configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    Redis(RedisConfig),
    InMemory(InMemoryConfig),
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Redis(RedisConfig::default())
    }
}

impl StoreConfig {
    pub fn store_type(&self) -> StoreType {
        match self {
            Self::Redis(_) => StoreType::Redis,
            Self::InMemory(_) => StoreType::InMemory,
        }
    }
}

/// Redis connection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub database: u32,
    pub username: Option<String>,
    pub password: Option<String>,
    pub pool_size: usize,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            database: 0,
            username: None,
            password: None,
            pool_size: 8,
        }
    }
}

impl RedisConfig {
    /// Connection URL in the `redis://[user[:password]@]host:port/db` form
    pub fn connection_url(&self) -> String {
        let credentials = match (&self.username, &self.password) {
            (Some(user), Some(password)) => format!("{}:{}@", user, password),
            (Some(user), None) => format!("{}@", user),
            (None, Some(password)) => format!(":{}@", password),
            (None, None) => String::new(),
        };

        format!(
            "redis://{}{}:{}/{}",
            credentials, self.host, self.port, self.database
        )
    }

    fn validate(&self) -> Result<(), QueueError> {
        if self.host.trim().is_empty() {
            return Err(ConfigurationError::Missing {
                key: "store.host".to_string(),
            }
            .into());
        }

        if self.port == 0 {
            return Err(ConfigurationError::Invalid {
                message: "store.port must be non-zero".to_string(),
            }
            .into());
        }

        if self.pool_size == 0 {
            return Err(ConfigurationError::Invalid {
                message: "store.pool_size must be greater than zero".to_string(),
            }
            .into());
        }

        Ok(())
    }
}

/// In-memory store configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InMemoryConfig {}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;
