use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::Url;
use thiserror::Error;

/// The upstream API rejects requests without a browser-like agent
pub const UPSTREAM_USER_AGENT: &str = "Mozilla/5.0";

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream request timed out")]
    Timeout,
    #[error("upstream request failed: {0}")]
    Request(String),
    #[error("failed to read upstream body: {0}")]
    Body(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// Where relayed requests go
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn get(&self, url: &Url) -> Result<UpstreamResponse, UpstreamError>;
}

pub struct ReqwestUpstream {
    client: reqwest::Client,
}

impl ReqwestUpstream {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(UPSTREAM_USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

fn map_error(error: reqwest::Error) -> UpstreamError {
    if error.is_timeout() {
        UpstreamError::Timeout
    } else {
        UpstreamError::Request(error.to_string())
    }
}

#[async_trait]
impl Upstream for ReqwestUpstream {
    async fn get(&self, url: &Url) -> Result<UpstreamResponse, UpstreamError> {
        let response = self.client.get(url.clone()).send().await.map_err(map_error)?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                UpstreamError::Timeout
            } else {
                UpstreamError::Body(e.to_string())
            }
        })?;

        Ok(UpstreamResponse {
            status,
            content_type,
            body,
        })
    }
}
