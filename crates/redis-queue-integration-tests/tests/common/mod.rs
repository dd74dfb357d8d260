//! Common test utilities for redis-queue integration tests
//!
//! This module provides:
//! - Helpers for building clients over a shared store
//! - A mock store that records calls and injects failures
//! - Queue protocol scenarios shared by every store under test

use async_trait::async_trait;
use chrono::Duration;
use redis_queue::{
    InMemoryStore, Priority, QueueClient, QueueName, QueueStore, ScoreRange, StandardQueueClient,
    StoreError, StoreType,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

// ============================================================================
// Client Helpers
// ============================================================================

/// Queue name unique to one test, so tests sharing a store do not interfere
#[allow(dead_code)]
pub fn unique_queue(prefix: &str) -> QueueName {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    QueueName::new(format!("{}_{}", prefix, suffix)).unwrap()
}

/// Client over `store` for `queue`, polling quickly so tests stay short
#[allow(dead_code)]
pub fn client_for(store: Arc<dyn QueueStore>, queue: &QueueName) -> StandardQueueClient {
    StandardQueueClient::new(store, queue.clone(), queue.with_suffix("completed").unwrap())
        .with_poll_interval(Duration::milliseconds(20))
}

// ============================================================================
// Mock Store
// ============================================================================

/// Mock store that delegates to an in-memory store, records every primitive
/// called and can be told to fail a named primitive
#[derive(Clone, Default)]
#[allow(dead_code)]
pub struct MockStore {
    inner: InMemoryStore,
    calls: Arc<Mutex<Vec<&'static str>>>,
    failing: Arc<Mutex<HashSet<&'static str>>>,
}

impl MockStore {
    #[allow(dead_code)]
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(dead_code)]
    pub fn fail(&self, operation: &'static str) {
        self.failing.lock().unwrap().insert(operation);
    }

    #[allow(dead_code)]
    pub fn recover(&self, operation: &'static str) {
        self.failing.lock().unwrap().remove(operation);
    }

    #[allow(dead_code)]
    pub fn get_calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    #[allow(dead_code)]
    pub fn call_count(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| **c == operation)
            .count()
    }

    #[allow(dead_code)]
    pub fn inner(&self) -> &InMemoryStore {
        &self.inner
    }

    fn record(&self, operation: &'static str) -> Result<(), StoreError> {
        self.calls.lock().unwrap().push(operation);
        if self.failing.lock().unwrap().contains(operation) {
            Err(StoreError::Connection(format!("{} failed", operation)))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl QueueStore for MockStore {
    async fn add(&self, key: &QueueName, score: f64, member: &str) -> Result<(), StoreError> {
        self.record("add")?;
        self.inner.add(key, score, member).await
    }

    async fn range_by_score(
        &self,
        key: &QueueName,
        range: &ScoreRange,
        limit: usize,
    ) -> Result<Vec<(String, f64)>, StoreError> {
        self.record("range_by_score")?;
        self.inner.range_by_score(key, range, limit).await
    }

    async fn remove(&self, key: &QueueName, member: &str) -> Result<bool, StoreError> {
        self.record("remove")?;
        self.inner.remove(key, member).await
    }

    async fn cardinality(&self, key: &QueueName) -> Result<u64, StoreError> {
        self.record("cardinality")?;
        self.inner.cardinality(key).await
    }

    async fn append(&self, key: &QueueName, value: &str) -> Result<u64, StoreError> {
        self.record("append")?;
        self.inner.append(key, value).await
    }

    async fn claim(
        &self,
        key: &QueueName,
        ranges: &[ScoreRange],
    ) -> Result<Option<(String, f64)>, StoreError> {
        self.record("claim")?;
        self.inner.claim(key, ranges).await
    }

    async fn clear(&self, key: &QueueName) -> Result<u64, StoreError> {
        self.record("clear")?;
        self.inner.clear(key).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.record("ping")
    }

    fn store_type(&self) -> StoreType {
        StoreType::InMemory
    }
}

// ============================================================================
// Protocol Scenarios
// ============================================================================

/// Enqueue-then-receive returns exactly what was enqueued
#[allow(dead_code)]
pub async fn scenario_round_trip(store: Arc<dyn QueueStore>) {
    let client = client_for(store, &unique_queue("round_trip"));

    let id = client.enqueue("payload:with:colons").await.unwrap();
    let received = client
        .receive(Duration::seconds(1))
        .await
        .unwrap()
        .expect("message should be received");

    assert_eq!(received.message_id, id);
    assert_eq!(received.payload, "payload:with:colons");
    assert!(client.receive(Duration::zero()).await.unwrap().is_none());
}

/// Priorities [1, 100, 50] come out as 100, 50, 1
#[allow(dead_code)]
pub async fn scenario_priority_order(store: Arc<dyn QueueStore>) {
    let client = client_for(store, &unique_queue("priority"));

    for priority in [1, 100, 50] {
        client
            .enqueue_with_priority(&format!("p{}", priority), Priority::new(priority).unwrap())
            .await
            .unwrap();
    }

    let mut order = Vec::new();
    while let Some(message) = client.receive(Duration::zero()).await.unwrap() {
        order.push(message.payload);
    }
    assert_eq!(order, vec!["p100", "p50", "p1"]);
}

/// A 3 second delay hides the message for a 1 second receive, then it arrives
#[allow(dead_code)]
pub async fn scenario_delay(store: Arc<dyn QueueStore>) {
    let client = client_for(store, &unique_queue("delay"));

    let id = client
        .enqueue_delayed("Delayed message", Duration::seconds(3))
        .await
        .unwrap();

    let early = client.receive(Duration::seconds(1)).await.unwrap();
    assert!(early.is_none(), "delayed message received early");
    assert_eq!(client.queue_length().await.unwrap(), 1);

    let later = client
        .receive(Duration::seconds(4))
        .await
        .unwrap()
        .expect("delayed message should become eligible");
    assert_eq!(later.message_id, id);
    assert!(later.was_delayed());
}

/// Length goes 2 -> 1 -> 0 as messages are claimed
#[allow(dead_code)]
pub async fn scenario_length(store: Arc<dyn QueueStore>) {
    let client = client_for(store, &unique_queue("length"));

    client.enqueue("a").await.unwrap();
    client.enqueue("b").await.unwrap();
    assert_eq!(client.queue_length().await.unwrap(), 2);

    client.receive(Duration::zero()).await.unwrap().unwrap();
    assert_eq!(client.queue_length().await.unwrap(), 1);

    client.receive(Duration::zero()).await.unwrap().unwrap();
    assert_eq!(client.queue_length().await.unwrap(), 0);
}

/// Due delayed messages beat any priority; future ones stay put
#[allow(dead_code)]
pub async fn scenario_delayed_precedence(store: Arc<dyn QueueStore>) {
    let client = client_for(store, &unique_queue("precedence"));

    client
        .enqueue_with_priority("urgent", Priority::MAX)
        .await
        .unwrap();
    client
        .enqueue_delayed("future", Duration::hours(1))
        .await
        .unwrap();
    client
        .enqueue_at(
            "overdue",
            redis_queue::Timestamp::now() + Duration::seconds(-2),
        )
        .await
        .unwrap();

    let peeked: Vec<String> = client
        .peek(10)
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.payload)
        .collect();
    assert_eq!(peeked, vec!["overdue", "urgent"]);

    let first = client.receive(Duration::zero()).await.unwrap().unwrap();
    let second = client.receive(Duration::zero()).await.unwrap().unwrap();
    assert_eq!(first.payload, "overdue");
    assert_eq!(second.payload, "urgent");
    assert!(client.receive(Duration::zero()).await.unwrap().is_none());
    assert_eq!(client.queue_length().await.unwrap(), 1);

    assert_eq!(client.purge().await.unwrap(), 1);
    assert_eq!(client.queue_length().await.unwrap(), 0);
}

/// C consumers over M messages claim exactly M distinct messages
#[allow(dead_code)]
pub async fn scenario_concurrent_consumers(
    store: Arc<dyn QueueStore>,
    consumers: usize,
    messages: usize,
) {
    let queue = unique_queue("concurrent");
    let producer = client_for(store.clone(), &queue);
    let payloads: Vec<String> = (0..messages).map(|i| format!("job-{}", i)).collect();
    producer.enqueue_batch(&payloads).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..consumers {
        let consumer = client_for(store.clone(), &queue);
        handles.push(tokio::spawn(async move {
            let mut claimed = Vec::new();
            while let Some(message) = consumer.receive(Duration::zero()).await.unwrap() {
                claimed.push(message.payload);
            }
            claimed
        }));
    }

    let mut claimed = Vec::new();
    for handle in handles {
        claimed.extend(handle.await.unwrap());
    }

    assert_eq!(claimed.len(), messages, "every message claimed once");
    let distinct: HashSet<&String> = claimed.iter().collect();
    assert_eq!(distinct.len(), messages, "no message claimed twice");
    assert_eq!(producer.queue_length().await.unwrap(), 0);
}
