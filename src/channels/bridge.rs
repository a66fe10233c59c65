//! WhatsApp bridge REST client.
//!
//! The bridge owns the WhatsApp session and message store; this client
//! only reads recent messages and asks the bridge to send text.
//!
//! - `GET  {base}/messages?after=..&limit=..&include_context=..` → `[InboundMessage]`
//! - `POST {base}/send` `{recipient, message}` → `{success, message}`
//! - `GET  {base}/health` → `{healthy}`

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::types::{FetchQuery, InboundMessage, MessageSink, MessageSource, SendOutcome};
use crate::error::ChannelError;

/// Per-request HTTP timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for a single health probe.
const HEALTH_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Serialize)]
struct SendRequest<'a> {
    recipient: &'a str,
    message: &'a str,
}

/// HTTP client for the bridge. Acts as both message source and sink.
#[derive(Debug, Clone)]
pub struct BridgeClient {
    client: reqwest::Client,
    base_url: String,
}

impl BridgeClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Single health probe. Any transport error counts as unhealthy.
    pub async fn is_healthy(&self) -> bool {
        let resp = match self
            .client
            .get(self.api_url("health"))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) => {
                debug!(status = %resp.status(), "Bridge health probe rejected");
                return false;
            }
            Err(e) => {
                debug!(error = %e, "Bridge health probe failed");
                return false;
            }
        };

        resp.json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|v| v.get("healthy").and_then(serde_json::Value::as_bool))
            .unwrap_or(false)
    }

    /// Probe until healthy, up to `max_attempts` times, `delay` apart.
    pub async fn wait_until_healthy(
        &self,
        max_attempts: u32,
        delay: Duration,
    ) -> Result<(), ChannelError> {
        for attempt in 1..=max_attempts {
            if self.is_healthy().await {
                info!(attempt, url = %self.base_url, "WhatsApp bridge is healthy");
                return Ok(());
            }
            warn!(attempt, max_attempts, "Bridge health check failed");
            if attempt < max_attempts {
                tokio::time::sleep(delay).await;
            }
        }
        Err(ChannelError::Unhealthy {
            attempts: max_attempts,
        })
    }
}

#[async_trait]
impl MessageSource for BridgeClient {
    async fn fetch(&self, query: &FetchQuery) -> Result<Vec<InboundMessage>, ChannelError> {
        let resp = self
            .client
            .get(self.api_url("messages"))
            .query(&[
                ("after", query.after.to_rfc3339()),
                ("limit", query.limit.to_string()),
                ("include_context", query.include_context.to_string()),
            ])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| ChannelError::FetchFailed {
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ChannelError::FetchFailed {
                reason: format!("bridge returned {status}: {body}"),
            });
        }

        let page = resp
            .json::<Vec<serde_json::Value>>()
            .await
            .map_err(|e| ChannelError::InvalidResponse(e.to_string()))?;
        Ok(decode_page(page))
    }
}

/// Decode each message on its own. An element that does not parse is
/// logged and dropped; the rest of the page survives.
fn decode_page(page: Vec<serde_json::Value>) -> Vec<InboundMessage> {
    let total = page.len();
    let messages: Vec<InboundMessage> = page
        .into_iter()
        .enumerate()
        .filter_map(|(position, raw)| match serde_json::from_value(raw) {
            Ok(message) => Some(message),
            Err(e) => {
                warn!(position, error = %e, "Skipping malformed message from bridge");
                None
            }
        })
        .collect();

    if messages.len() < total {
        debug!(
            kept = messages.len(),
            dropped = total - messages.len(),
            "Decoded partial message page"
        );
    }
    messages
}

#[async_trait]
impl MessageSink for BridgeClient {
    async fn send(&self, chat_id: &str, text: &str) -> Result<SendOutcome, ChannelError> {
        if chat_id.is_empty() {
            return Ok(SendOutcome::rejected("Recipient must be provided"));
        }

        let resp = self
            .client
            .post(self.api_url("send"))
            .json(&SendRequest {
                recipient: chat_id,
                message: text,
            })
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                chat_id: chat_id.to_string(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| ChannelError::Http(e.to_string()))?;

        // The bridge reports rejections in the body, sometimes with a non-2xx status.
        match serde_json::from_str::<SendOutcome>(&body) {
            Ok(outcome) => Ok(outcome),
            Err(_) if !status.is_success() => Err(ChannelError::SendFailed {
                chat_id: chat_id.to_string(),
                reason: format!("bridge returned {status}: {body}"),
            }),
            Err(e) => Err(ChannelError::InvalidResponse(e.to_string())),
        }
    }
}
