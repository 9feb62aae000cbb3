//! # Relay Endpoint
//!
//! `GET /?url=<target>` forwards a request to the whitelisted parking API and
//! returns its status, content type and body unchanged.
//!
//! `GET /?parking=gd|uni` resolves one of the known endpoints, forwards any
//! other query parameters, and trims JSON answers down to the three fields the
//! clients read.
//!
//! Every response, errors included, is sent with
//! `Access-Control-Allow-Origin: *` and `Cache-Control: no-store`.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use reqwest::Url;
use serde_json::{Map, Value};
use shared::{ParkingEndpoint, StoreConfig};
use tower_http::{set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::{debug, info};

use crate::error::ProxyError;
use crate::upstream::{Upstream, UpstreamError, UpstreamResponse};

/// Fields kept when shaping a `?parking=` JSON answer
const SHAPED_FIELDS: [&str; 3] = ["CurrentFreeGroupCounterValue", "ParkingGroupName", "Timestamp"];

#[derive(Clone)]
pub struct AppState {
    pub upstream: Arc<dyn Upstream>,
    pub allowed_host: String,
    pub parking_endpoints: Vec<ParkingEndpoint>,
}

impl AppState {
    pub fn new(upstream: Arc<dyn Upstream>, allowed_host: impl Into<String>) -> Self {
        Self {
            upstream,
            allowed_host: allowed_host.into(),
            parking_endpoints: StoreConfig::default().endpoints,
        }
    }

    fn is_allowed_host(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.');
        host == self.allowed_host || host.ends_with(&format!(".{}", self.allowed_host))
    }
}

/// Relay routes without state or layers
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(relay))
}

/// Full application router
pub fn create_router(state: AppState) -> Router {
    router()
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn param<'a>(params: &'a [(String, String)], name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

pub async fn relay(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Response, ProxyError> {
    if let Some(parking) = param(&params, "parking") {
        return relay_parking(&state, parking, &params).await;
    }

    let raw = param(&params, "url")
        .filter(|raw| !raw.trim().is_empty())
        .ok_or(ProxyError::MissingUrl)?;
    let target = Url::parse(raw.trim()).map_err(|e| ProxyError::InvalidUrl(e.to_string()))?;

    if !matches!(target.scheme(), "http" | "https") {
        return Err(ProxyError::UnsupportedScheme(target.scheme().to_string()));
    }
    let host = target.host_str().unwrap_or_default();
    if !state.is_allowed_host(host) {
        return Err(ProxyError::ForbiddenHost(host.to_string()));
    }

    info!("GET {}", target);
    let upstream = state.upstream.get(&target).await?;
    debug!("Upstream answered {} ({} bytes)", upstream.status, upstream.body.len());

    Ok(passthrough(upstream))
}

async fn relay_parking(
    state: &AppState,
    parking: &str,
    params: &[(String, String)],
) -> Result<Response, ProxyError> {
    if parking.is_empty() {
        return Err(ProxyError::MissingParking);
    }
    let endpoint = state
        .parking_endpoints
        .iter()
        .find(|endpoint| endpoint.id == parking)
        .ok_or_else(|| ProxyError::UnknownParking(parking.to_string()))?;

    let mut target = Url::parse(&endpoint.url).map_err(|e| ProxyError::InvalidUrl(e.to_string()))?;
    let extras: Vec<_> = params.iter().filter(|(key, _)| key != "parking").collect();
    if !extras.is_empty() {
        let mut query = target.query_pairs_mut();
        for (key, value) in extras {
            query.append_pair(key, value);
        }
    }

    info!("GET {} (parking={})", target, parking);
    let upstream = state.upstream.get(&target).await?;
    let status = status_of(&upstream);

    let is_json = upstream
        .content_type
        .as_deref()
        .is_some_and(|content_type| content_type.contains("application/json"));
    let body = if is_json {
        let data: Value = serde_json::from_slice(&upstream.body)
            .map_err(|e| UpstreamError::Body(e.to_string()))?;
        shape_entry(&data).to_string().into_bytes().into()
    } else {
        upstream.body
    };

    Ok((
        status,
        [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
        body,
    )
        .into_response())
}

fn status_of(upstream: &UpstreamResponse) -> StatusCode {
    StatusCode::from_u16(upstream.status).unwrap_or(StatusCode::BAD_GATEWAY)
}

fn passthrough(upstream: UpstreamResponse) -> Response {
    let status = status_of(&upstream);
    let content_type = upstream
        .content_type
        .as_deref()
        .and_then(|value| HeaderValue::from_str(value).ok());

    let mut response = (status, upstream.body).into_response();
    match content_type {
        Some(value) => {
            response.headers_mut().insert(header::CONTENT_TYPE, value);
        }
        None => {
            response.headers_mut().remove(header::CONTENT_TYPE);
        }
    }
    response
}

/// Keep only the fields clients read; missing fields are left out
fn shape_entry(data: &Value) -> Value {
    let mut shaped = Map::new();
    if let Value::Object(fields) = data {
        for name in SHAPED_FIELDS {
            if let Some(value) = fields.get(name) {
                shaped.insert(name.to_string(), value.clone());
            }
        }
    }
    Value::Object(shaped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::{
        body::{Body, Bytes},
        http::Request,
    };
    use serde_json::json;
    use std::sync::Mutex;
    use tower::util::ServiceExt; // for `oneshot`

    struct MockUpstream {
        response: fn() -> Result<UpstreamResponse, UpstreamError>,
        requested: Mutex<Vec<String>>,
    }

    impl MockUpstream {
        fn new(response: fn() -> Result<UpstreamResponse, UpstreamError>) -> Arc<Self> {
            Arc::new(Self {
                response,
                requested: Mutex::new(Vec::new()),
            })
        }

        fn requested(&self) -> Vec<String> {
            self.requested.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Upstream for MockUpstream {
        async fn get(&self, url: &Url) -> Result<UpstreamResponse, UpstreamError> {
            self.requested.lock().unwrap().push(url.to_string());
            (self.response)()
        }
    }

    fn json_ok() -> Result<UpstreamResponse, UpstreamError> {
        Ok(UpstreamResponse {
            status: 200,
            content_type: Some("application/json; charset=utf-8".to_string()),
            body: Bytes::from_static(
                br#"{"ParkingGroupName":"Bank_1","Timestamp":"2024-01-15 14:30:00","CurrentFreeGroupCounterValue":17,"Internal":true}"#,
            ),
        })
    }

    fn plain_not_found() -> Result<UpstreamResponse, UpstreamError> {
        Ok(UpstreamResponse {
            status: 404,
            content_type: Some("text/plain".to_string()),
            body: Bytes::from_static(b"no such counter"),
        })
    }

    fn unreachable() -> Result<UpstreamResponse, UpstreamError> {
        Err(UpstreamError::Request("connection refused".to_string()))
    }

    fn setup_test_app(upstream: Arc<MockUpstream>) -> Router {
        create_router(AppState::new(upstream, "zaparkuj.pl"))
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, axum::http::HeaderMap, Bytes) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, body)
    }

    fn assert_relay_headers(headers: &axum::http::HeaderMap) {
        assert_eq!(headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "*");
        assert_eq!(headers.get(header::CACHE_CONTROL).unwrap(), "no-store");
    }

    #[tokio::test]
    async fn test_disallowed_host_is_forbidden() {
        let upstream = MockUpstream::new(json_ok);
        let (status, headers, _) = get(setup_test_app(upstream.clone()), "/?url=https://evil.com/x").await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_relay_headers(&headers);
        assert!(upstream.requested().is_empty());
    }

    #[tokio::test]
    async fn test_lookalike_hosts_are_forbidden() {
        for uri in [
            "/?url=https://notzaparkuj.pl/x",
            "/?url=https%3A%2F%2Fzaparkuj.pl.evil.com%2Fx",
            "/?url=https%3A%2F%2Fzaparkuj.pl%40evil.com%2Fx",
        ] {
            let (status, _, _) = get(setup_test_app(MockUpstream::new(json_ok)), uri).await;
            assert_eq!(status, StatusCode::FORBIDDEN, "{}", uri);
        }
    }

    #[tokio::test]
    async fn test_missing_url_is_bad_request() {
        let (status, headers, body) = get(setup_test_app(MockUpstream::new(json_ok)), "/").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_relay_headers(&headers);
        assert_eq!(&body[..], b"Missing url parameter");
    }

    #[tokio::test]
    async fn test_invalid_url_and_scheme_are_bad_requests() {
        for uri in ["/?url=not%20a%20url", "/?url=ftp://zaparkuj.pl/x", "/?url=javascript:alert(1)"] {
            let (status, _, _) = get(setup_test_app(MockUpstream::new(json_ok)), uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        }
    }

    #[tokio::test]
    async fn test_allowed_url_is_passed_through() {
        let upstream = MockUpstream::new(json_ok);
        let (status, headers, body) = get(
            setup_test_app(upstream.clone()),
            "/?url=https%3A%2F%2Fzaparkuj.pl%2Fapi%2Fdata%3Ft%3D1",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_relay_headers(&headers);
        assert_eq!(
            headers.get(header::CONTENT_TYPE).unwrap(),
            "application/json; charset=utf-8"
        );
        assert_eq!(body, json_ok().unwrap().body);
        assert_eq!(upstream.requested(), vec!["https://zaparkuj.pl/api/data?t=1".to_string()]);
    }

    #[tokio::test]
    async fn test_subdomain_and_upstream_status_are_relayed() {
        let (status, headers, body) = get(
            setup_test_app(MockUpstream::new(plain_not_found)),
            "/?url=https://gd.zaparkuj.pl/api/missing.json",
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_relay_headers(&headers);
        assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "text/plain");
        assert_eq!(&body[..], b"no such counter");
    }

    #[tokio::test]
    async fn test_upstream_failure_is_bad_gateway() {
        let (status, headers, _) = get(
            setup_test_app(MockUpstream::new(unreachable)),
            "/?url=https://zaparkuj.pl/api/data",
        )
        .await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_relay_headers(&headers);
    }

    #[tokio::test]
    async fn test_parking_shortcut_shapes_json() {
        let upstream = MockUpstream::new(json_ok);
        let (status, headers, body) = get(setup_test_app(upstream.clone()), "/?parking=uni&t=99").await;

        assert_eq!(status, StatusCode::OK);
        assert_relay_headers(&headers);
        assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "application/json");

        let shaped: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            shaped,
            json!({
                "CurrentFreeGroupCounterValue": 17,
                "ParkingGroupName": "Bank_1",
                "Timestamp": "2024-01-15 14:30:00"
            })
        );
        assert_eq!(
            upstream.requested(),
            vec!["https://gd.zaparkuj.pl/api/freegroupcountervalue-green.json?t=99".to_string()]
        );
    }

    #[tokio::test]
    async fn test_parking_shortcut_passes_non_json_through() {
        let upstream = MockUpstream::new(plain_not_found);
        let (status, _, body) = get(setup_test_app(upstream.clone()), "/?parking=gd").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(&body[..], b"no such counter");
        assert_eq!(
            upstream.requested(),
            vec!["https://gd.zaparkuj.pl/api/freegroupcountervalue.json".to_string()]
        );
    }

    #[tokio::test]
    async fn test_unknown_or_empty_parking_is_bad_request() {
        for uri in ["/?parking=xyz", "/?parking="] {
            let upstream = MockUpstream::new(json_ok);
            let (status, _, _) = get(setup_test_app(upstream.clone()), uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
            assert!(upstream.requested().is_empty());
        }
    }

    #[test]
    fn test_shape_entry_skips_missing_fields() {
        assert_eq!(shape_entry(&json!({"ParkingGroupName": "Green Day"})), json!({"ParkingGroupName": "Green Day"}));
        assert_eq!(shape_entry(&json!([1, 2])), json!({}));
    }
}
