use std::collections::HashMap;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::Stream as StreamConfig;

#[derive(Debug, Clone, Serialize)]
pub struct StreamRequest {
    pub url: String,
    pub profile: String,
    pub profile_variables: HashMap<String, String>,
    pub metadata: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StreamEndpoint {
    pub stream_id: String,
    /// Path relative to the proxy host
    #[serde(alias = "direct_url")]
    pub stream_endpoint: String,
}

/// Upstream proxy that turns a source URL into a capturable endpoint
#[async_trait]
pub trait StreamService: Send + Sync {
    /// `None` when the proxy answered without a usable stream
    async fn create_stream(&self, req: &StreamRequest) -> Result<Option<StreamEndpoint>>;
}

#[derive(Clone, Debug)]
pub struct ProxyStreamService {
    url: String,
    api_token: Option<String>,
    client: Client,
}

impl ProxyStreamService {
    pub fn new(cfg: &StreamConfig) -> Result<Self> {
        Ok(Self {
            url: format!(
                "{}{}",
                cfg.proxy_host.trim_end_matches('/'),
                cfg.create_path
            ),
            api_token: cfg.api_token.clone(),
            client: Client::builder()
                .connect_timeout(Duration::from_millis(cfg.timeout.min(3000)))
                .timeout(Duration::from_millis(cfg.timeout))
                .build()?,
        })
    }
}

#[async_trait]
impl StreamService for ProxyStreamService {
    async fn create_stream(&self, req: &StreamRequest) -> Result<Option<StreamEndpoint>> {
        let mut request = self.client.post(&self.url).json(req);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            warn!(url = self.url, ?status, body, "[stream] create failed");
            return Err(anyhow!("proxy responded {}", status));
        }
        debug!(url = self.url, ?status, body, "[stream] created");

        Ok(parse_endpoint(&body))
    }
}

/// A response without `stream_id` carries no stream
pub fn parse_endpoint(body: &str) -> Option<StreamEndpoint> {
    serde_json::from_str::<StreamEndpoint>(body).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_endpoint() {
        let ep = parse_endpoint(r#"{"stream_id":"abc","stream_endpoint":"/stream/abc"}"#).unwrap();
        assert_eq!(ep.stream_endpoint, "/stream/abc");

        let ep = parse_endpoint(r#"{"stream_id":"abc","direct_url":"/direct/abc"}"#).unwrap();
        assert_eq!(ep.stream_endpoint, "/direct/abc");

        assert!(parse_endpoint(r#"{"error":"no capacity"}"#).is_none());
        assert!(parse_endpoint("").is_none());
    }

    #[test]
    fn test_service_url_joins_host_and_path() {
        let cfg = StreamConfig {
            proxy_host: "http://proxy:8085/".to_string(),
            ..StreamConfig::default()
        };
        let svc = ProxyStreamService::new(&cfg).unwrap();
        assert_eq!(svc.url, "http://proxy:8085/transcode");
    }
}
