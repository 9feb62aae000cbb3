use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::warn;

use crate::upstream::UpstreamError;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Missing url parameter")]
    MissingUrl,
    #[error("Invalid url: {0}")]
    InvalidUrl(String),
    #[error("Unsupported scheme: {0}")]
    UnsupportedScheme(String),
    #[error("Host not allowed: {0}")]
    ForbiddenHost(String),
    #[error("Missing parking param")]
    MissingParking,
    #[error("Invalid parking value")]
    UnknownParking(String),
    #[error("Upstream fetch failed")]
    Upstream(#[from] UpstreamError),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::MissingUrl
            | ProxyError::InvalidUrl(_)
            | ProxyError::UnsupportedScheme(_)
            | ProxyError::MissingParking
            | ProxyError::UnknownParking(_) => StatusCode::BAD_REQUEST,
            ProxyError::ForbiddenHost(_) => StatusCode::FORBIDDEN,
            ProxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        match &self {
            ProxyError::Upstream(source) => warn!("Upstream failure: {}", source),
            other => warn!("Rejected request: {}", other),
        }
        (self.status(), self.to_string()).into_response()
    }
}
