//! # Redis Queue
//!
//! Priority- and delay-aware message queue built on the atomic sorted-set and
//! list primitives of a shared Redis-like store.
//!
//! This library provides:
//! - Unique, ordered message ids and a lossless `(id, payload)` wire encoding
//! - Priority enqueue, delayed and scheduled enqueue, batch enqueue
//! - Exactly-once claim of the best eligible message across competing consumers
//! - Advisory acknowledgement into an append-only completion list
//! - Redis and in-memory stores behind one trait
//!
//! ## Module Organization
//!
//! - [error] - Error types for all queue operations
//! - [message] - Identifiers, id generation and the wire encoding
//! - [score] - Priority / eligibility-time score model
//! - [provider] - Store types and configuration
//! - [client] - Client traits and the protocol engine
//! - [providers] - Store implementations
//!
//! ## Example
//!
//! ```no_run
//! use redis_queue::{Priority, QueueClientFactory, QueueConfig};
//! use chrono::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = QueueClientFactory::create_client(QueueConfig::default()).await?;
//!
//! client.enqueue_with_priority("urgent", Priority::new(10)?).await?;
//! client.enqueue_delayed("later", Duration::seconds(20)).await?;
//!
//! if let Some(message) = client.receive(Duration::seconds(5)).await? {
//!     println!("{} -> {}", message.message_id, message.payload);
//!     client.acknowledge(&message.message_id).await?;
//! }
//! # Ok(())
//! # }
//! ```

// Module declarations
pub mod client;
pub mod error;
pub mod message;
pub mod provider;
pub mod providers;
pub mod score;

// Re-export commonly used types at crate root for convenience
pub use client::{QueueClient, QueueClientFactory, QueueStore, StandardQueueClient};
pub use error::{ConfigurationError, QueueError, StoreError, ValidationError};
pub use message::{
    decode, encode, IdGenerator, InstanceSalt, MessageId, PendingMessage, QueueName,
    ReceivedMessage, Timestamp,
};
pub use provider::{InMemoryConfig, QueueConfig, RedisConfig, StoreConfig, StoreType};
pub use providers::{InMemoryStore, RedisStore};
pub use score::{Priority, ScanOrder, Score, ScoreRange, EPOCH_THRESHOLD};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
