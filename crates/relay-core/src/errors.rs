use std::time::Duration;

use crate::domain::{TopicId, UserId};

/// Core error type for the relay.
///
/// Adapter crates map their specific failures into this type. Every variant is
/// fatal for the update being handled except `RateLimited`, which the retry
/// gateway consumes internally.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("store error: {0}")]
    Store(String),

    #[error("network error: {0}")]
    Network(String),

    /// Non-2xx, non-429 HTTP status.
    #[error("http status {status}: {description}")]
    Transport { status: u16, description: String },

    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("still rate limited after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    /// HTTP success but the platform answered `ok: false`.
    #[error("platform error: {description}")]
    Platform { description: String },

    #[error("user {user} is already mapped to topic {existing}")]
    Conflict { user: UserId, existing: TopicId },

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
