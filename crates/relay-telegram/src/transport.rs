use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use serde_json::Value;

use relay_core::{
    errors::Error,
    gateway::{RawResponse, Transport},
    Result,
};

/// Bot API transport over `reqwest`: one POST per call, no retries.
///
/// Not `Debug`: the endpoint embeds the bot token.
#[derive(Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(api_base: &str, token: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Network(format!("http client build failed: {e}")))?;
        Ok(Self {
            http,
            endpoint: format!("{}/bot{token}", api_base.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, method: &str, payload: &Value) -> Result<RawResponse> {
        // Strip the URL from errors: it embeds the bot token.
        let resp = self
            .http
            .post(format!("{}/{method}", self.endpoint))
            .json(payload)
            .send()
            .await
            .map_err(|e| Error::Network(format!("{method}: {}", e.without_url())))?;

        let status = resp.status().as_u16();
        let retry_after = resp
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = resp
            .text()
            .await
            .map_err(|e| Error::Network(format!("{method}: {}", e.without_url())))?;

        Ok(RawResponse {
            status,
            retry_after,
            body,
        })
    }
}
