//! Retry gateway for outbound platform calls.
//!
//! Only rate limiting (HTTP 429) is retried. Every other failure (non-2xx
//! status, `ok: false`, network error) is returned on the first attempt.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::{errors::Error, Result};

/// Raw outcome of one HTTP round trip.
#[derive(Clone, Debug)]
pub struct RawResponse {
    pub status: u16,
    /// Parsed `Retry-After` header, when present.
    pub retry_after: Option<Duration>,
    pub body: String,
}

/// One attempt at a platform method call. Implementations must not retry.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(&self, method: &str, payload: &Value) -> Result<RawResponse>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay after the `attempt`-th (0-based) rate-limited response.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << attempt.min(16))
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    ok: bool,
    result: Option<Value>,
    description: Option<String>,
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

pub struct RetryGateway<T> {
    transport: T,
    policy: RetryPolicy,
}

impl<T: Transport> RetryGateway<T> {
    pub fn new(transport: T, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Call `method` and return its `result` payload.
    pub async fn call(&self, method: &str, payload: &Value) -> Result<Value> {
        let attempts = self.policy.max_attempts.max(1);
        for attempt in 0..attempts {
            match self.call_once(method, payload).await {
                Err(Error::RateLimited { retry_after }) => {
                    let wait = retry_after.unwrap_or_else(|| self.policy.backoff(attempt));
                    warn!(
                        method,
                        attempt = attempt + 1,
                        wait_ms = wait.as_millis() as u64,
                        "rate limited; backing off"
                    );
                    sleep(wait).await;
                }
                other => return other,
            }
        }
        Err(Error::RetriesExhausted { attempts })
    }

    async fn call_once(&self, method: &str, payload: &Value) -> Result<Value> {
        let raw = self.transport.post(method, payload).await?;
        debug!(method, status = raw.status, "platform response");
        classify_response(raw)
    }
}

/// Map one raw response onto the relay's error taxonomy.
pub fn classify_response(raw: RawResponse) -> Result<Value> {
    let envelope = serde_json::from_str::<Envelope>(&raw.body);

    if raw.status == 429 {
        let hinted = envelope
            .ok()
            .and_then(|e| e.parameters)
            .and_then(|p| p.retry_after)
            .map(Duration::from_secs);
        return Err(Error::RateLimited {
            retry_after: raw.retry_after.or(hinted),
        });
    }

    if !(200..300).contains(&raw.status) {
        let description = match envelope {
            Ok(Envelope {
                description: Some(d),
                ..
            }) => d,
            _ => raw.body.chars().take(200).collect(),
        };
        return Err(Error::Transport {
            status: raw.status,
            description,
        });
    }

    let envelope = envelope?;
    if !envelope.ok {
        return Err(Error::Platform {
            description: envelope
                .description
                .unwrap_or_else(|| "unknown platform error".to_string()),
        });
    }
    Ok(envelope.result.unwrap_or(Value::Null))
}
