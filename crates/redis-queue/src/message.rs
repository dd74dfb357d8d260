//! Message types for queue operations including core domain identifiers.

use crate::error::{QueueError, ValidationError};
use crate::score::Score;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};

/// Separator between the message id and the payload in the stored member.
pub const WIRE_DELIMITER: char = ':';

// ============================================================================
// Core Domain Identifiers
// ============================================================================

/// Validated store key naming a queue's sorted set or its completion list
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueName(String);

impl QueueName {
    /// Create new queue name with validation
    pub fn new(name: String) -> Result<Self, ValidationError> {
        // Validate length
        if name.is_empty() || name.len() > 260 {
            return Err(ValidationError::OutOfRange {
                field: "queue_name".to_string(),
                message: "must be 1-260 characters".to_string(),
            });
        }

        // Validate characters (ASCII alphanumeric plus key separators)
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.'))
        {
            return Err(ValidationError::InvalidFormat {
                field: "queue_name".to_string(),
                message: "only ASCII alphanumeric, '-', '_', ':' and '.' allowed".to_string(),
            });
        }

        let is_separator = |c: char| matches!(c, '-' | ':' | '.');
        if name.starts_with(is_separator) || name.ends_with(is_separator) {
            return Err(ValidationError::InvalidFormat {
                field: "queue_name".to_string(),
                message: "no leading or trailing separators".to_string(),
            });
        }

        Ok(Self(name))
    }

    /// Derive a related key, e.g. the completion list `<queue>:completed`
    pub fn with_suffix(&self, suffix: &str) -> Result<Self, ValidationError> {
        Self::new(format!("{}:{}", self.0, suffix))
    }

    /// Get queue name as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QueueName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

/// Unique identifier for messages within a queue.
///
/// Generated ids have the shape `<unix-seconds>-<counter>` or, with an instance
/// salt, `<unix-seconds>-<counter>-<salt>`. An id never contains
/// [`WIRE_DELIMITER`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Get message ID as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Coarse generation time in Unix seconds, if the id was generated here
    pub fn timestamp_secs(&self) -> Option<i64> {
        self.0.split('-').next()?.parse().ok()
    }

    /// Generator counter value, if the id was generated here
    pub fn counter(&self) -> Option<u64> {
        self.0.split('-').nth(1)?.parse().ok()
    }

    /// `(timestamp, counter)` pair ids from one generator increase on
    pub fn sequence_key(&self) -> Option<(i64, u64)> {
        Some((self.timestamp_secs()?, self.counter()?))
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ValidationError::Required {
                field: "message_id".to_string(),
            });
        }

        if s.contains(WIRE_DELIMITER) {
            return Err(ValidationError::InvalidFormat {
                field: "message_id".to_string(),
                message: format!("must not contain '{}'", WIRE_DELIMITER),
            });
        }

        Ok(Self(s.to_string()))
    }
}

/// Per-instance discriminator appended to generated ids.
///
/// Two producers sharing a clock can generate the same `<seconds>-<counter>`
/// pair; giving each producer instance its own salt keeps their ids apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceSalt(String);

impl InstanceSalt {
    /// Create new salt with validation
    pub fn new(salt: String) -> Result<Self, ValidationError> {
        if salt.is_empty() {
            return Err(ValidationError::Required {
                field: "instance_salt".to_string(),
            });
        }

        if salt.len() > 64 {
            return Err(ValidationError::OutOfRange {
                field: "instance_salt".to_string(),
                message: "maximum 64 characters".to_string(),
            });
        }

        if !salt.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(ValidationError::InvalidFormat {
                field: "instance_salt".to_string(),
                message: "only ASCII alphanumeric and underscores allowed".to_string(),
            });
        }

        Ok(Self(salt))
    }

    /// Get salt as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Generator for [`MessageId`]s, owned by whoever enqueues.
///
/// The counter starts at zero and increments once per id for the lifetime of
/// the generator. The timestamp is read under the same lock that takes the
/// counter, so ids from a generator shared by concurrent producers still
/// order the same way by counter and by timestamp.
#[derive(Debug, Default)]
pub struct IdGenerator {
    counter: Mutex<u64>,
    salt: Option<InstanceSalt>,
}

impl IdGenerator {
    /// Create a generator without a salt
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a generator whose ids carry the given instance salt
    pub fn with_salt(salt: InstanceSalt) -> Self {
        Self {
            counter: Mutex::new(0),
            salt: Some(salt),
        }
    }

    /// Generate the next id
    pub fn generate(&self) -> MessageId {
        let (timestamp, counter) = {
            let mut next = self.counter.lock().unwrap_or_else(PoisonError::into_inner);
            let counter = *next;
            *next += 1;
            (Utc::now().timestamp(), counter)
        };

        match &self.salt {
            Some(salt) => MessageId(format!("{}-{}-{}", timestamp, counter, salt.as_str())),
            None => MessageId(format!("{}-{}", timestamp, counter)),
        }
    }

    /// Number of ids generated so far
    pub fn generated(&self) -> u64 {
        *self.counter.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Timestamp wrapper for consistent time handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create timestamp for current time
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Create timestamp from DateTime
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Create timestamp from milliseconds since the Unix epoch
    pub fn from_unix_millis(millis: i64) -> Option<Self> {
        Utc.timestamp_millis_opt(millis).single().map(Self)
    }

    /// Get underlying DateTime
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// Milliseconds since the Unix epoch
    pub fn unix_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }

    /// Add a duration, or `None` when the result is not a representable date
    pub fn checked_add(self, rhs: chrono::Duration) -> Option<Self> {
        self.0.checked_add_signed(rhs).map(Self)
    }
}

/// # Panics
///
/// Panics when the result is not a representable date. Use
/// [`Timestamp::checked_add`] for durations that come from callers.
impl std::ops::Add<chrono::Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: chrono::Duration) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S%.3f UTC"))
    }
}

impl FromStr for Timestamp {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let dt = s.parse::<DateTime<Utc>>()?;
        Ok(Self::from_datetime(dt))
    }
}

// ============================================================================
// Wire Encoding
// ============================================================================

/// Encode an id and payload into the single member string stored in the queue
pub fn encode(id: &MessageId, payload: &str) -> String {
    let mut wire = String::with_capacity(id.as_str().len() + 1 + payload.len());
    wire.push_str(id.as_str());
    wire.push(WIRE_DELIMITER);
    wire.push_str(payload);
    wire
}

/// Split a stored member back into id and payload at the first delimiter.
///
/// The payload keeps any further delimiters untouched.
pub fn decode(wire: &str) -> Result<(MessageId, String), QueueError> {
    let (id, payload) = wire
        .split_once(WIRE_DELIMITER)
        .ok_or_else(|| QueueError::MalformedMessage {
            wire: wire.to_string(),
            reason: format!("missing '{}' delimiter", WIRE_DELIMITER),
        })?;

    let id = id.parse::<MessageId>().map_err(|e| QueueError::MalformedMessage {
        wire: wire.to_string(),
        reason: e.to_string(),
    })?;

    Ok((id, payload.to_string()))
}

// ============================================================================
// Message Types
// ============================================================================

/// A message claimed from the queue by a receive call
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedMessage {
    pub message_id: MessageId,
    pub payload: String,
    pub score: Score,
    pub claimed_at: Timestamp,
}

impl ReceivedMessage {
    /// Check if the message was enqueued with a delay
    pub fn was_delayed(&self) -> bool {
        matches!(self.score, Score::EligibleAt(_))
    }
}

/// A message still pending in the queue, as seen by a peek
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMessage {
    pub message_id: MessageId,
    pub payload: String,
    pub score: Score,
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
