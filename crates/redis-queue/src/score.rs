//! Score model shared by priority and delayed messages.
//!
//! Every pending message lives in one sorted set, so both scoring modes share a
//! single numeric field. They are kept apart by range:
//!
//! - priority scores are integers in `[0, EPOCH_THRESHOLD)`, higher first;
//! - delay scores are Unix seconds (millisecond fraction) at or above
//!   `EPOCH_THRESHOLD`, earliest eligibility first.
//!
//! Any real clock reading is far above the threshold, so a delay score can
//! never be mistaken for a priority. A claim searches eligible delayed
//! messages first and falls back to priority messages; see [`claim_ranges`].

use crate::error::ValidationError;
use crate::message::Timestamp;
use serde::{Deserialize, Serialize};

#[cfg(test)]
#[path = "score_tests.rs"]
mod tests;

/// Boundary between the priority range and the timestamp range.
///
/// `1_000_000_000` Unix seconds is 2001-09-09T01:46:40Z.
pub const EPOCH_THRESHOLD: f64 = 1_000_000_000.0;

/// Message priority; higher values are claimed first
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "u32", into = "u32")]
pub struct Priority(u32);

impl Priority {
    pub const MIN: Priority = Priority(0);
    pub const MAX: Priority = Priority(999_999_999);

    /// Create new priority with range validation
    pub fn new(value: u32) -> Result<Self, ValidationError> {
        if value > Self::MAX.0 {
            return Err(ValidationError::OutOfRange {
                field: "priority".to_string(),
                message: format!("must be at most {}", Self::MAX.0),
            });
        }

        Ok(Self(value))
    }

    /// Get the numeric priority
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for Priority {
    type Error = ValidationError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Priority> for u32 {
    fn from(priority: Priority) -> Self {
        priority.0
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tagged ordering key of a pending message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Score {
    /// Immediately eligible, ranked by priority
    Priority(Priority),
    /// Eligible once the clock reaches the timestamp
    EligibleAt(Timestamp),
}

impl Score {
    /// Delay-mode score for an absolute eligibility time
    pub fn eligible_at(at: Timestamp) -> Result<Self, ValidationError> {
        if (at.unix_millis() as f64) < EPOCH_THRESHOLD * 1000.0 {
            return Err(ValidationError::OutOfRange {
                field: "eligible_at".to_string(),
                message: format!("must not be earlier than Unix time {}", EPOCH_THRESHOLD),
            });
        }

        Ok(Self::EligibleAt(at))
    }

    /// Raw value stored in the sorted set
    pub fn to_store(&self) -> f64 {
        match self {
            Self::Priority(priority) => f64::from(priority.value()),
            Self::EligibleAt(at) => timestamp_score(*at),
        }
    }

    /// Recover the tagged score from a raw stored value
    pub fn from_store(value: f64) -> Result<Self, ValidationError> {
        if !value.is_finite() || value < 0.0 {
            return Err(ValidationError::OutOfRange {
                field: "score".to_string(),
                message: format!("{} is not a valid queue score", value),
            });
        }

        if value < EPOCH_THRESHOLD {
            if value.fract() != 0.0 {
                return Err(ValidationError::InvalidFormat {
                    field: "score".to_string(),
                    message: format!("priority score {} is not an integer", value),
                });
            }
            return Priority::new(value as u32).map(Self::Priority);
        }

        let millis = (value * 1000.0).round() as i64;
        Timestamp::from_unix_millis(millis)
            .map(Self::EligibleAt)
            .ok_or_else(|| ValidationError::OutOfRange {
                field: "score".to_string(),
                message: format!("{} is not a representable timestamp", value),
            })
    }

    /// Check whether a message with this score may be claimed at `now`
    pub fn is_eligible(&self, now: Timestamp) -> bool {
        match self {
            Self::Priority(_) => true,
            Self::EligibleAt(at) => *at <= now,
        }
    }
}

impl std::fmt::Display for Score {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Priority(priority) => write!(f, "priority {}", priority),
            Self::EligibleAt(at) => write!(f, "eligible at {}", at),
        }
    }
}

fn timestamp_score(at: Timestamp) -> f64 {
    at.unix_millis() as f64 / 1000.0
}

/// Direction a range is scanned in when picking a member
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOrder {
    Ascending,
    Descending,
}

/// Inclusive score interval plus the order members are taken from it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreRange {
    pub min: f64,
    pub max: f64,
    pub order: ScanOrder,
}

impl ScoreRange {
    /// Check if a raw score falls inside the interval
    pub fn contains(&self, score: f64) -> bool {
        score >= self.min && score <= self.max
    }
}

/// Ranges a claim at `now` searches, in precedence order.
///
/// Delayed messages whose time has come are served first, oldest eligibility
/// first; only when none is due does the claim take the highest priority.
pub fn claim_ranges(now: Timestamp) -> [ScoreRange; 2] {
    [
        ScoreRange {
            min: EPOCH_THRESHOLD,
            max: timestamp_score(now),
            order: ScanOrder::Ascending,
        },
        ScoreRange {
            min: f64::from(Priority::MIN.value()),
            max: f64::from(Priority::MAX.value()),
            order: ScanOrder::Descending,
        },
    ]
}
