//! Browser implementations of the store's storage and fetch capabilities.

use std::cell::Cell;
use std::rc::Rc;

use async_trait::async_trait;
use gloo::net::http::Request;
use gloo::timers::callback::Timeout;
use shared::adapters::with_cache_buster;
use shared::{FetchAdapter, FetchOptions, FetchResponse, StorageAdapter, StorageError, TransportError};
use web_sys::AbortController;

/// Route a request through the CORS relay: `<proxy_base>?url=<encoded target>`
pub fn proxied_url(proxy_base: &str, target: &str) -> String {
    let encoded: String = js_sys::encode_uri_component(target).into();
    let separator = if proxy_base.contains('?') { '&' } else { '?' };
    format!("{}{}url={}", proxy_base, separator, encoded)
}

/// `window.localStorage`
#[derive(Clone, Default)]
pub struct LocalStorageAdapter;

impl LocalStorageAdapter {
    fn storage() -> Result<web_sys::Storage, StorageError> {
        web_sys::window()
            .and_then(|window| window.local_storage().ok().flatten())
            .ok_or_else(|| StorageError::Unavailable("localStorage is not accessible".to_string()))
    }
}

#[async_trait(?Send)]
impl StorageAdapter for LocalStorageAdapter {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Self::storage()?.get_item(key).map_err(|e| StorageError::Read {
            key: key.to_string(),
            reason: format!("{:?}", e),
        })
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        Self::storage()?.set_item(key, value).map_err(|e| StorageError::Write {
            key: key.to_string(),
            reason: format!("{:?}", e),
        })
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        Self::storage()?.remove_item(key).map_err(|e| StorageError::Remove {
            key: key.to_string(),
            reason: format!("{:?}", e),
        })
    }
}

/// `fetch` through the CORS relay, with cache busting and an optional timeout
#[derive(Clone)]
pub struct WebFetchAdapter {
    proxy_base: Option<String>,
}

impl WebFetchAdapter {
    pub fn new(proxy_base: Option<String>) -> Self {
        Self { proxy_base }
    }

    fn final_url(&self, url: &str, options: &FetchOptions) -> String {
        let target = if options.cache_bust {
            with_cache_buster(url, js_sys::Date::now() as i64)
        } else {
            url.to_string()
        };
        match &self.proxy_base {
            Some(base) => proxied_url(base, &target),
            None => target,
        }
    }
}

#[async_trait(?Send)]
impl FetchAdapter for WebFetchAdapter {
    async fn request(&self, url: &str, options: &FetchOptions) -> Result<FetchResponse, TransportError> {
        let final_url = self.final_url(url, options);
        let network_error = |reason: String| TransportError::Network {
            url: url.to_string(),
            reason,
        };

        let controller = AbortController::new().map_err(|e| network_error(format!("{:?}", e)))?;
        let timed_out = Rc::new(Cell::new(false));
        // Dropping the timeout cancels it
        let _timeout = options.timeout_ms.map(|ms| {
            let controller = controller.clone();
            let timed_out = timed_out.clone();
            Timeout::new(ms, move || {
                timed_out.set(true);
                controller.abort();
            })
        });

        let mut builder = Request::get(&final_url);
        for (name, value) in &options.headers {
            builder = builder.header(name, value);
        }
        let signal = controller.signal();

        let response = match builder.abort_signal(Some(&signal)).send().await {
            Ok(response) => response,
            Err(_) if timed_out.get() => {
                return Err(TransportError::Timeout {
                    url: url.to_string(),
                })
            }
            Err(e) => return Err(network_error(e.to_string())),
        };

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Body(e.to_string()))?;
        Ok(FetchResponse { status, body })
    }
}

#[cfg(test)]
mod wasm_tests {
    use super::*;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    #[wasm_bindgen_test]
    fn test_proxied_url_encodes_target() {
        assert_eq!(
            proxied_url("https://relay.example/", "https://gd.zaparkuj.pl/api/x.json?t=1"),
            "https://relay.example/?url=https%3A%2F%2Fgd.zaparkuj.pl%2Fapi%2Fx.json%3Ft%3D1"
        );
        assert_eq!(
            proxied_url("https://relay.example/?v=2", "https://a.pl/"),
            "https://relay.example/?v=2&url=https%3A%2F%2Fa.pl%2F"
        );
    }

    #[wasm_bindgen_test]
    fn test_final_url_without_proxy() {
        let adapter = WebFetchAdapter::new(None);
        let options = FetchOptions {
            cache_bust: false,
            ..FetchOptions::default()
        };
        assert_eq!(adapter.final_url("https://a.pl/x.json", &options), "https://a.pl/x.json");
        assert!(adapter
            .final_url("https://a.pl/x.json", &FetchOptions::default())
            .starts_with("https://a.pl/x.json?t="));
    }

    #[wasm_bindgen_test]
    async fn test_local_storage_round_trip() {
        let storage = LocalStorageAdapter;
        storage.set("parking_test_key", "value").await.unwrap();
        assert_eq!(storage.get("parking_test_key").await.unwrap().as_deref(), Some("value"));
        storage.remove("parking_test_key").await.unwrap();
        assert_eq!(storage.get("parking_test_key").await.unwrap(), None);
    }
}
