//! In-memory store implementation for testing and development.
//!
//! This module provides a fully functional in-memory store that:
//! - Keeps sorted sets ordered by score, then member, like Redis
//! - Keeps append-only lists for completion records
//! - Makes every primitive, including claim, atomic behind one mutex
//!
//! This store is intended for:
//! - Unit testing of queue consumers
//! - Development and prototyping
//! - Reference behavior for the Redis store

use crate::client::QueueStore;
use crate::error::StoreError;
use crate::message::QueueName;
use crate::provider::StoreType;
use crate::score::{ScanOrder, ScoreRange};
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

// ============================================================================
// Internal Storage Structures
// ============================================================================

/// Total order over finite scores so they can key a `BTreeSet`
#[derive(Debug, Clone, Copy, PartialEq)]
struct ScoreKey(f64);

impl Eq for ScoreKey {}

impl PartialOrd for ScoreKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScoreKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// A sorted set: member lookup plus (score, member) ordering
#[derive(Default)]
struct SortedSet {
    scores: HashMap<String, f64>,
    ordered: BTreeSet<(ScoreKey, String)>,
}

impl SortedSet {
    fn insert(&mut self, score: f64, member: &str) {
        if let Some(previous) = self.scores.insert(member.to_string(), score) {
            self.ordered.remove(&(ScoreKey(previous), member.to_string()));
        }
        self.ordered.insert((ScoreKey(score), member.to_string()));
    }

    fn remove(&mut self, member: &str) -> bool {
        match self.scores.remove(member) {
            Some(score) => {
                self.ordered.remove(&(ScoreKey(score), member.to_string()));
                true
            }
            None => false,
        }
    }

    fn len(&self) -> usize {
        self.scores.len()
    }

    /// Members inside `range`, walked in the range's order
    fn scan<'a>(&'a self, range: &ScoreRange) -> Box<dyn Iterator<Item = (&'a str, f64)> + 'a> {
        let (min, max) = (range.min, range.max);
        match range.order {
            ScanOrder::Ascending => Box::new(
                self.ordered
                    .iter()
                    .skip_while(move |(score, _)| score.0 < min)
                    .take_while(move |(score, _)| score.0 <= max)
                    .map(|(score, member)| (member.as_str(), score.0)),
            ),
            ScanOrder::Descending => Box::new(
                self.ordered
                    .iter()
                    .rev()
                    .skip_while(move |(score, _)| score.0 > max)
                    .take_while(move |(score, _)| score.0 >= min)
                    .map(|(score, member)| (member.as_str(), score.0)),
            ),
        }
    }
}

/// Everything the store holds, keyed like Redis keys
#[derive(Default)]
struct StoreState {
    sorted_sets: HashMap<QueueName, SortedSet>,
    lists: HashMap<QueueName, Vec<String>>,
}

// ============================================================================
// InMemoryStore
// ============================================================================

/// In-memory store implementation.
///
/// Clones share the same underlying state, so one store can back several
/// clients in a test.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryStore {
    /// Create new empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a list, e.g. a completion record
    pub fn list_values(&self, key: &QueueName) -> Result<Vec<String>, StoreError> {
        self.with_state(|state| state.lists.get(key).cloned().unwrap_or_default())
    }

    /// Snapshot of a sorted set in ascending (score, member) order
    pub fn members(&self, key: &QueueName) -> Result<Vec<(String, f64)>, StoreError> {
        self.with_state(|state| {
            state
                .sorted_sets
                .get(key)
                .map(|set| {
                    set.ordered
                        .iter()
                        .map(|(score, member)| (member.clone(), score.0))
                        .collect()
                })
                .unwrap_or_default()
        })
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut StoreState) -> T) -> Result<T, StoreError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| StoreError::Connection("in-memory store lock poisoned".to_string()))?;
        Ok(f(&mut state))
    }
}

#[async_trait]
impl QueueStore for InMemoryStore {
    async fn add(&self, key: &QueueName, score: f64, member: &str) -> Result<(), StoreError> {
        if !score.is_finite() {
            return Err(StoreError::Command(format!(
                "score {} is not a finite number",
                score
            )));
        }

        self.with_state(|state| {
            state
                .sorted_sets
                .entry(key.clone())
                .or_default()
                .insert(score, member)
        })
    }

    async fn range_by_score(
        &self,
        key: &QueueName,
        range: &ScoreRange,
        limit: usize,
    ) -> Result<Vec<(String, f64)>, StoreError> {
        self.with_state(|state| {
            state
                .sorted_sets
                .get(key)
                .map(|set| {
                    set.scan(range)
                        .take(limit)
                        .map(|(member, score)| (member.to_string(), score))
                        .collect()
                })
                .unwrap_or_default()
        })
    }

    async fn remove(&self, key: &QueueName, member: &str) -> Result<bool, StoreError> {
        self.with_state(|state| {
            let Some(set) = state.sorted_sets.get_mut(key) else {
                return false;
            };
            let removed = set.remove(member);
            if set.len() == 0 {
                state.sorted_sets.remove(key);
            }
            removed
        })
    }

    async fn cardinality(&self, key: &QueueName) -> Result<u64, StoreError> {
        self.with_state(|state| {
            state
                .sorted_sets
                .get(key)
                .map_or(0, |set| set.len() as u64)
        })
    }

    async fn append(&self, key: &QueueName, value: &str) -> Result<u64, StoreError> {
        self.with_state(|state| {
            let list = state.lists.entry(key.clone()).or_default();
            list.push(value.to_string());
            list.len() as u64
        })
    }

    async fn claim(
        &self,
        key: &QueueName,
        ranges: &[ScoreRange],
    ) -> Result<Option<(String, f64)>, StoreError> {
        self.with_state(|state| {
            let set = state.sorted_sets.get_mut(key)?;

            let found = ranges.iter().find_map(|range| {
                set.scan(range)
                    .next()
                    .map(|(member, score)| (member.to_string(), score))
            })?;

            set.remove(&found.0);
            if set.len() == 0 {
                state.sorted_sets.remove(key);
            }
            Some(found)
        })
    }

    async fn clear(&self, key: &QueueName) -> Result<u64, StoreError> {
        self.with_state(|state| {
            state
                .sorted_sets
                .remove(key)
                .map_or(0, |set| set.len() as u64)
        })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.with_state(|_| ())
    }

    fn store_type(&self) -> StoreType {
        StoreType::InMemory
    }
}
