// Error taxonomy for the analytics core
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// A raw payload that was rejected before reaching a handler or the window store.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("{field} is not a finite number")]
    NonFinite { field: &'static str },

    #[error("{field}={value} outside [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("reading at {timestamp} precedes last accepted reading at {last}")]
    OutOfOrder {
        timestamp: DateTime<Utc>,
        last: DateTime<Utc>,
    },
}

/// Transport-level failure of a farm stream. Always recoverable by resubscribing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("failed to connect stream for farm {farm_id}: {reason}")]
    Connect { farm_id: String, reason: String },

    #[error("transport error on farm {farm_id}: {reason}")]
    Transport { farm_id: String, reason: String },

    #[error("stream for farm {farm_id} closed by source")]
    Closed { farm_id: String },
}

impl StreamError {
    pub fn farm_id(&self) -> &str {
        match self {
            StreamError::Connect { farm_id, .. }
            | StreamError::Transport { farm_id, .. }
            | StreamError::Closed { farm_id } => farm_id,
        }
    }
}

/// Advisory: no payload arrived within the configured idle period.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("stream for farm {farm_id} stale: no data for {idle_for:?}")]
pub struct StreamStale {
    pub farm_id: String,
    pub idle_for: Duration,
}

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid moisture band: min={min} max={max}")]
    InvalidBand { min: f64, max: f64 },

    #[error("confidence {0} outside [0, 100]")]
    InvalidConfidence(f64),
}
