use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::{Client, ClientBuilder};
use serde_json::Value;
use thiserror::Error;

pub const DEFAULT_USER_AGENT: &str = "catalogtool/0.2 (+connector directory metadata refresh)";
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Response body of a successful request. Registries occasionally answer with
/// plain text (or HTML error pages behind a 2xx), so decoding never fails.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchBody {
    Json(Value),
    Text(String),
}

impl FetchBody {
    pub fn json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Text(_) => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

pub fn decode_body(text: String) -> FetchBody {
    match serde_json::from_str::<Value>(&text) {
        Ok(value) => FetchBody::Json(value),
        Err(_) => FetchBody::Text(text),
    }
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    user_agent: String,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout_ms: u64) -> Result<Self> {
        Self::from_builder(Client::builder(), user_agent, timeout_ms)
    }

    /// Loopback client for tests; ignores proxy settings from the environment.
    #[cfg(test)]
    pub(crate) fn local(user_agent: &str) -> Result<Self> {
        Self::from_builder(Client::builder().no_proxy(), user_agent, 5_000)
    }

    fn from_builder(builder: ClientBuilder, user_agent: &str, timeout_ms: u64) -> Result<Self> {
        let client = builder
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .context("failed to build registry HTTP client")?;
        Ok(Self {
            client,
            user_agent: user_agent.to_string(),
        })
    }

    /// Single GET, no retries. Only 2xx statuses count as success.
    pub fn get(&self, url: &str, headers: &[(&str, String)]) -> Result<FetchBody, FetchError> {
        let mut request = self
            .client
            .get(url)
            .header("User-Agent", self.user_agent.clone());
        for (name, value) in headers {
            request = request.header(*name, value.clone());
        }

        let response = request.send().map_err(|source| FetchError::Transport {
            url: url.to_string(),
            source,
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let text = response.text().map_err(|source| FetchError::Transport {
            url: url.to_string(),
            source,
        })?;
        Ok(decode_body(text))
    }
}
