//! Queue store implementations.
//!
//! This module contains concrete implementations of the `QueueStore` trait for
//! different backends.

pub mod memory;
pub mod redis;

pub use self::memory::InMemoryStore;
pub use self::redis::RedisStore;
