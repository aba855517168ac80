//! StatHat EZ API Integration
//!
//! Forwards single data points to StatHat using the EZ key API.
//!
//! ## API Reference
//!
//! Endpoint: https://api.stathat.com/ez (POST, form encoded)
//! Fields: `ezkey`, `stat`, `value`, `t` (unix seconds)
//! Returns: `{"status": 200, "msg": "ok"}` on success
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cwrelay::stathat::StatHatForwarder;
//!
//! let forwarder = StatHatForwarder::new(&config.sink)?;
//! forwarder.forward("requests", 42.0, 1_700_000_000).await?;
//! ```

use crate::relay::config::SinkConfig;
use crate::relay::error::ForwardError;
use crate::relay::forwarder::Forwarder;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Form body for one EZ value post
#[derive(Debug, Clone, Serialize)]
pub struct EzValue<'a> {
    pub ezkey: &'a str,
    pub stat: &'a str,
    pub value: f64,
    pub t: i64,
}

/// StatHat response body
#[derive(Debug, Clone, Deserialize)]
pub struct EzResponse {
    pub status: u16,
    #[serde(default)]
    pub msg: String,
}

#[derive(Debug, Clone)]
pub struct StatHatForwarder {
    http: reqwest::Client,
    url: String,
    key: String,
}

impl StatHatForwarder {
    pub fn new(config: &SinkConfig) -> Result<Self, ForwardError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ForwardError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            url: config.url.clone(),
            key: config.key.clone(),
        })
    }
}

/// Interpret a StatHat reply. An empty or non-JSON 2xx body counts as accepted.
fn check_response(status: reqwest::StatusCode, body: &str) -> Result<(), ForwardError> {
    if !status.is_success() {
        return Err(ForwardError::Rejected(format!("HTTP {}: {}", status, body.trim())));
    }

    match serde_json::from_str::<EzResponse>(body) {
        Ok(reply) if reply.status != 200 => Err(ForwardError::Rejected(format!(
            "status {}: {}",
            reply.status, reply.msg
        ))),
        _ => Ok(()),
    }
}

#[async_trait]
impl Forwarder for StatHatForwarder {
    async fn forward(&self, name: &str, value: f64, timestamp: i64) -> Result<(), ForwardError> {
        let form = EzValue {
            ezkey: &self.key,
            stat: name,
            value,
            t: timestamp,
        };

        let response = self
            .http
            .post(self.url.as_str())
            .form(&form)
            .send()
            .await
            .map_err(|e| ForwardError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ForwardError::Transport(e.to_string()))?;

        check_response(status, &body)
    }
}
