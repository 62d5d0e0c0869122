//! HTTP client for the node RPC.
//!
//! Every fetch is a single GET bounded by a deadline that covers connect,
//! response head and body. Idle connections are not pooled, so each scrape
//! opens fresh connections and nothing outlives the request.

use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use hyper::http::uri::InvalidUri;
use hyper::{StatusCode, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

use crate::config::TargetConfig;

/// Errors from a single fetch against the node.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("invalid request url: {0}")]
    InvalidUrl(#[from] InvalidUri),

    #[error("request failed: {0}")]
    Transport(#[from] hyper_util::client::legacy::Error),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("unexpected HTTP status {0}")]
    Status(StatusCode),

    #[error("failed to read response body: {0}")]
    Body(#[from] hyper::Error),

    #[error("failed to decode JSON: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Client bound to one node's RPC base URL.
#[derive(Clone, Debug)]
pub struct NodeClient {
    /// Base URL without a trailing slash.
    base_url: String,
    /// Deadline per fetch.
    timeout: Duration,
    client: Client<HttpConnector, Empty<Bytes>>,
}

impl NodeClient {
    /// Create a client for `base_url`, e.g. `http://localhost:26657`.
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let client = Client::builder(TokioExecutor::new())
            .pool_max_idle_per_host(0)
            .build_http();

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            client,
        }
    }

    /// Create a client from the target section of the configuration.
    pub fn from_config(config: &TargetConfig) -> Self {
        Self::new(&config.url, config.timeout)
    }

    /// The base URL requests are issued against.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full URL for an RPC path such as `/status`.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// GET `path` and decode the JSON body into `T`.
    ///
    /// Non-2xx responses are errors regardless of their body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, FetchError> {
        let uri: Uri = self.endpoint(path).parse()?;

        debug!(url = %uri, "fetching");

        let fetch = async {
            let response = self.client.get(uri).await?;

            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status(status));
            }

            let body = response.into_body().collect().await?.to_bytes();
            Ok::<T, FetchError>(serde_json::from_slice(&body)?)
        };

        match timeout(self.timeout, fetch).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(self.timeout)),
        }
    }
}
