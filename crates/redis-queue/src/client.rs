//! Client traits and the queue protocol engine.
//!
//! [`QueueStore`] is the seam to the shared store: a handful of atomic sorted
//! set and list primitives. [`StandardQueueClient`] implements the queue
//! protocol on top of it and holds no queue state of its own; every call goes
//! back to the store.

use crate::error::{QueueError, StoreError};
use crate::message::{
    decode, encode, IdGenerator, MessageId, PendingMessage, QueueName, ReceivedMessage, Timestamp,
};
use crate::provider::{QueueConfig, StoreConfig, StoreType};
use crate::providers::{InMemoryStore, RedisStore};
use crate::score::{claim_ranges, Priority, Score, ScoreRange};
use async_trait::async_trait;
use chrono::Duration;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Receive deadline used when the requested timeout overflows the clock
const FAR_FUTURE: std::time::Duration = std::time::Duration::from_secs(86_400 * 365 * 30);

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;

/// Main interface for queue operations against a single queue
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Enqueue at priority 0, immediately eligible
    async fn enqueue(&self, payload: &str) -> Result<MessageId, QueueError>;

    /// Enqueue with an explicit priority, immediately eligible
    async fn enqueue_with_priority(
        &self,
        payload: &str,
        priority: Priority,
    ) -> Result<MessageId, QueueError>;

    /// Enqueue a message that becomes eligible after `delay`
    async fn enqueue_delayed(
        &self,
        payload: &str,
        delay: Duration,
    ) -> Result<MessageId, QueueError>;

    /// Enqueue a message that becomes eligible at `at`
    async fn enqueue_at(&self, payload: &str, at: Timestamp) -> Result<MessageId, QueueError>;

    /// Enqueue several payloads at priority 0, in order; not atomic as a batch
    async fn enqueue_batch(&self, payloads: &[String]) -> Result<Vec<MessageId>, QueueError>;

    /// Enqueue several payloads with their own priorities, in order
    async fn enqueue_batch_prioritized(
        &self,
        items: &[(String, Priority)],
    ) -> Result<Vec<MessageId>, QueueError>;

    /// Claim the next eligible message, waiting up to `timeout`
    async fn receive(&self, timeout: Duration) -> Result<Option<ReceivedMessage>, QueueError>;

    /// Record a message id in the completion list
    async fn acknowledge(&self, message_id: &MessageId) -> Result<(), QueueError>;

    /// Number of pending messages, eligible or not
    async fn queue_length(&self) -> Result<u64, QueueError>;

    /// Look at up to `limit` eligible messages in claim order without claiming
    async fn peek(&self, limit: usize) -> Result<Vec<PendingMessage>, QueueError>;

    /// Remove a pending message before anyone claims it
    async fn cancel(&self, message: &PendingMessage) -> Result<bool, QueueError>;

    /// Drop every pending message, returning how many there were
    async fn purge(&self) -> Result<u64, QueueError>;

    /// Check that the store answers
    async fn health_check(&self) -> Result<(), QueueError>;

    /// Get the queue this client operates on
    fn queue_name(&self) -> &QueueName;

    /// Get the backing store type
    fn store_type(&self) -> StoreType;
}

/// Atomic primitives a backing store must provide.
///
/// Each method is one atomic operation from the store's point of view. Scores
/// are raw sorted-set values; the store knows nothing about priority versus
/// delay.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Insert or re-score a member (`ZADD`)
    async fn add(&self, key: &QueueName, score: f64, member: &str) -> Result<(), StoreError>;

    /// Up to `limit` members with scores inside `range`, in the range's order
    async fn range_by_score(
        &self,
        key: &QueueName,
        range: &ScoreRange,
        limit: usize,
    ) -> Result<Vec<(String, f64)>, StoreError>;

    /// Remove an exact member (`ZREM`); returns whether it was present
    async fn remove(&self, key: &QueueName, member: &str) -> Result<bool, StoreError>;

    /// Number of members (`ZCARD`)
    async fn cardinality(&self, key: &QueueName) -> Result<u64, StoreError>;

    /// Append to a list (`RPUSH`); returns the new list length
    async fn append(&self, key: &QueueName, value: &str) -> Result<u64, StoreError>;

    /// Read and remove the first member found across `ranges`, tried in order.
    ///
    /// The read and the removal must be a single atomic step so that no two
    /// callers can ever claim the same member.
    async fn claim(
        &self,
        key: &QueueName,
        ranges: &[ScoreRange],
    ) -> Result<Option<(String, f64)>, StoreError>;

    /// Remove every member of a sorted set; returns how many were removed
    async fn clear(&self, key: &QueueName) -> Result<u64, StoreError>;

    /// Round-trip to the store
    async fn ping(&self) -> Result<(), StoreError>;

    /// Get store type
    fn store_type(&self) -> StoreType;
}

/// Factory for creating queue clients with appropriate stores
pub struct QueueClientFactory;

impl QueueClientFactory {
    /// Create queue client from configuration
    pub async fn create_client(config: QueueConfig) -> Result<Box<dyn QueueClient>, QueueError> {
        config.validate()?;
        let store = Self::create_store(&config.store).await?;
        Ok(Box::new(StandardQueueClient::from_config(store, &config)?))
    }

    /// Create a store that several clients can share
    pub async fn create_store(config: &StoreConfig) -> Result<Arc<dyn QueueStore>, QueueError> {
        let store: Arc<dyn QueueStore> = match config {
            StoreConfig::Redis(redis_config) => Arc::new(RedisStore::new(redis_config)?),
            StoreConfig::InMemory(_) => Arc::new(InMemoryStore::new()),
        };
        Ok(store)
    }

    /// Create test client with in-memory store
    pub fn create_test_client() -> Box<dyn QueueClient> {
        let config = QueueConfig::default();
        let queue = QueueName::new(config.queue_name)
            .expect("default queue name is valid");
        let completion = queue
            .with_suffix("completed")
            .expect("default completion list name is valid");
        Box::new(StandardQueueClient::new(
            Arc::new(InMemoryStore::new()),
            queue,
            completion,
        ))
    }
}

/// Queue protocol engine over a [`QueueStore`]
///
/// # Examples
///
/// ```
/// use redis_queue::{InMemoryStore, Priority, QueueClient, QueueName, StandardQueueClient};
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let queue = QueueName::new("jobs".to_string()).unwrap();
/// let completed = queue.with_suffix("completed").unwrap();
/// let client = StandardQueueClient::new(Arc::new(InMemoryStore::new()), queue, completed);
///
/// client.enqueue("routine").await.unwrap();
/// client
///     .enqueue_with_priority("urgent", Priority::new(10).unwrap())
///     .await
///     .unwrap();
///
/// let next = client.receive(chrono::Duration::zero()).await.unwrap().unwrap();
/// assert_eq!(next.payload, "urgent");
/// client.acknowledge(&next.message_id).await.unwrap();
/// # });
/// ```
pub struct StandardQueueClient {
    store: Arc<dyn QueueStore>,
    queue: QueueName,
    completion_list: QueueName,
    ids: IdGenerator,
    poll_interval: std::time::Duration,
}

impl StandardQueueClient {
    const DEFAULT_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(100);

    /// Create new client for `queue`, acknowledging into `completion_list`
    pub fn new(store: Arc<dyn QueueStore>, queue: QueueName, completion_list: QueueName) -> Self {
        Self {
            store,
            queue,
            completion_list,
            ids: IdGenerator::new(),
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
        }
    }

    /// Create new client with names, salt and polling taken from configuration
    pub fn from_config(store: Arc<dyn QueueStore>, config: &QueueConfig) -> Result<Self, QueueError> {
        let ids = match config.instance_salt()? {
            Some(salt) => IdGenerator::with_salt(salt),
            None => IdGenerator::new(),
        };

        Ok(Self::new(store, config.queue_name()?, config.completion_list()?)
            .with_id_generator(ids)
            .with_poll_interval(config.poll_interval()?))
    }

    /// Replace the id generator
    pub fn with_id_generator(mut self, ids: IdGenerator) -> Self {
        self.ids = ids;
        self
    }

    /// Set how long a waiting receive sleeps between claim attempts
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        if let Ok(interval) = interval.to_std() {
            if !interval.is_zero() {
                self.poll_interval = interval;
            }
        }
        self
    }

    /// Get the completion list key
    pub fn completion_list(&self) -> &QueueName {
        &self.completion_list
    }

    async fn insert(&self, payload: &str, score: Score) -> Result<MessageId, QueueError> {
        let message_id = self.ids.generate();
        let member = encode(&message_id, payload);

        self.store
            .add(&self.queue, score.to_store(), &member)
            .await
            .map_err(|e| self.store_failure("enqueue", e))?;

        debug!(
            queue = %self.queue,
            message_id = %message_id,
            score = %score,
            "Enqueued message"
        );
        Ok(message_id)
    }

    async fn insert_batch(
        &self,
        items: impl Iterator<Item = (&str, Priority)> + Send,
    ) -> Result<Vec<MessageId>, QueueError> {
        let mut enqueued = Vec::new();

        for (index, (payload, priority)) in items.enumerate() {
            match self.insert(payload, Score::Priority(priority)).await {
                Ok(message_id) => enqueued.push(message_id),
                Err(source) => {
                    warn!(
                        queue = %self.queue,
                        failed_index = index,
                        enqueued = enqueued.len(),
                        error = %source,
                        "Batch enqueue stopped part-way"
                    );
                    return Err(QueueError::PartialBatch {
                        enqueued,
                        failed_index: index,
                        source: Box::new(source),
                    });
                }
            }
        }

        Ok(enqueued)
    }

    /// One claim attempt against the store
    async fn try_claim(&self) -> Result<Option<ReceivedMessage>, QueueError> {
        let claimed_at = Timestamp::now();
        let ranges = claim_ranges(claimed_at);

        let claimed = self
            .store
            .claim(&self.queue, &ranges)
            .await
            .map_err(|e| self.store_failure("claim", e))?;

        let Some((wire, raw_score)) = claimed else {
            return Ok(None);
        };

        // The entry is already gone from the queue; anything that fails from
        // here on loses the message.
        let (message_id, payload) = decode(&wire).map_err(|e| {
            error!(queue = %self.queue, wire = %wire, error = %e, "Claimed malformed message");
            e
        })?;

        let score = Score::from_store(raw_score).map_err(|e| {
            error!(
                queue = %self.queue,
                message_id = %message_id,
                raw_score,
                error = %e,
                "Claimed message with invalid score"
            );
            QueueError::MalformedMessage {
                wire: wire.clone(),
                reason: e.to_string(),
            }
        })?;

        debug!(
            queue = %self.queue,
            message_id = %message_id,
            score = %score,
            "Claimed message"
        );

        Ok(Some(ReceivedMessage {
            message_id,
            payload,
            score,
            claimed_at,
        }))
    }

    fn store_failure(&self, operation: &str, error: StoreError) -> QueueError {
        warn!(queue = %self.queue, operation, error = %error, "Store operation failed");
        QueueError::store(operation, error)
    }
}

#[async_trait]
impl QueueClient for StandardQueueClient {
    async fn enqueue(&self, payload: &str) -> Result<MessageId, QueueError> {
        self.enqueue_with_priority(payload, Priority::MIN).await
    }

    async fn enqueue_with_priority(
        &self,
        payload: &str,
        priority: Priority,
    ) -> Result<MessageId, QueueError> {
        self.insert(payload, Score::Priority(priority)).await
    }

    async fn enqueue_delayed(
        &self,
        payload: &str,
        delay: Duration,
    ) -> Result<MessageId, QueueError> {
        if delay < Duration::zero() {
            return Err(crate::error::ValidationError::OutOfRange {
                field: "delay".to_string(),
                message: "must not be negative".to_string(),
            }
            .into());
        }

        let at = Timestamp::now().checked_add(delay).ok_or_else(|| {
            crate::error::ValidationError::OutOfRange {
                field: "delay".to_string(),
                message: format!(
                    "{} seconds is past the latest representable date",
                    delay.num_seconds()
                ),
            }
        })?;

        self.enqueue_at(payload, at).await
    }

    async fn enqueue_at(&self, payload: &str, at: Timestamp) -> Result<MessageId, QueueError> {
        let score = Score::eligible_at(at)?;
        self.insert(payload, score).await
    }

    async fn enqueue_batch(&self, payloads: &[String]) -> Result<Vec<MessageId>, QueueError> {
        self.insert_batch(payloads.iter().map(|p| (p.as_str(), Priority::MIN)))
            .await
    }

    async fn enqueue_batch_prioritized(
        &self,
        items: &[(String, Priority)],
    ) -> Result<Vec<MessageId>, QueueError> {
        self.insert_batch(items.iter().map(|(p, priority)| (p.as_str(), *priority)))
            .await
    }

    async fn receive(&self, timeout: Duration) -> Result<Option<ReceivedMessage>, QueueError> {
        let wait = timeout.to_std().unwrap_or_default();
        let started = tokio::time::Instant::now();
        let deadline = started
            .checked_add(wait)
            .unwrap_or_else(|| started + FAR_FUTURE);

        loop {
            if let Some(message) = self.try_claim().await? {
                return Ok(Some(message));
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                debug!(queue = %self.queue, timeout_ms = wait.as_millis() as u64, "Receive timed out");
                return Ok(None);
            }

            tokio::time::sleep((deadline - now).min(self.poll_interval)).await;
        }
    }

    async fn acknowledge(&self, message_id: &MessageId) -> Result<(), QueueError> {
        let recorded = self
            .store
            .append(&self.completion_list, message_id.as_str())
            .await
            .map_err(|e| self.store_failure("acknowledge", e))?;

        debug!(
            queue = %self.queue,
            completion_list = %self.completion_list,
            message_id = %message_id,
            recorded,
            "Acknowledged message"
        );
        Ok(())
    }

    async fn queue_length(&self) -> Result<u64, QueueError> {
        self.store
            .cardinality(&self.queue)
            .await
            .map_err(|e| self.store_failure("queue_length", e))
    }

    async fn peek(&self, limit: usize) -> Result<Vec<PendingMessage>, QueueError> {
        let mut pending = Vec::new();

        for range in claim_ranges(Timestamp::now()) {
            if pending.len() >= limit {
                break;
            }

            let members = self
                .store
                .range_by_score(&self.queue, &range, limit - pending.len())
                .await
                .map_err(|e| self.store_failure("peek", e))?;

            for (wire, raw_score) in members {
                let decoded = decode(&wire).and_then(|(message_id, payload)| {
                    let score = Score::from_store(raw_score)?;
                    Ok(PendingMessage {
                        message_id,
                        payload,
                        score,
                    })
                });

                match decoded {
                    Ok(message) => pending.push(message),
                    Err(e) => {
                        warn!(queue = %self.queue, wire = %wire, error = %e, "Skipping malformed pending message");
                    }
                }
            }
        }

        Ok(pending)
    }

    async fn cancel(&self, message: &PendingMessage) -> Result<bool, QueueError> {
        let member = encode(&message.message_id, &message.payload);
        let removed = self
            .store
            .remove(&self.queue, &member)
            .await
            .map_err(|e| self.store_failure("cancel", e))?;

        debug!(queue = %self.queue, message_id = %message.message_id, removed, "Cancelled message");
        Ok(removed)
    }

    async fn purge(&self) -> Result<u64, QueueError> {
        let removed = self
            .store
            .clear(&self.queue)
            .await
            .map_err(|e| self.store_failure("purge", e))?;

        debug!(queue = %self.queue, removed, "Purged queue");
        Ok(removed)
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        self.store
            .ping()
            .await
            .map_err(|e| self.store_failure("health_check", e))
    }

    fn queue_name(&self) -> &QueueName {
        &self.queue
    }

    fn store_type(&self) -> StoreType {
        self.store.store_type()
    }
}
