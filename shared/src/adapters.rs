//! # Adapter Traits
//!
//! Capability interfaces the parking store is built on. Each platform
//! provides its own implementation:
//!
//! - **Web**: browser `localStorage` and `fetch`, routed through the CORS relay
//! - **Native**: a JSON file in the user's data directory and `reqwest`
//! - **Test**: the in-memory implementations in this module
//!
//! The store runs on a single-threaded event loop, so the async traits do not
//! require `Send` futures. That keeps them implementable on top of browser APIs.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Local};
use thiserror::Error;

use crate::config::DebugConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("failed to read '{key}': {reason}")]
    Read { key: String, reason: String },
    #[error("failed to write '{key}': {reason}")]
    Write { key: String, reason: String },
    #[error("failed to remove '{key}': {reason}")]
    Remove { key: String, reason: String },
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("request to {url} failed: {reason}")]
    Network { url: String, reason: String },
    #[error("failed to read response body: {0}")]
    Body(String),
}

/// Per-request options understood by every fetch adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    pub headers: Vec<(String, String)>,
    /// Append a `t=<millis>` query parameter so no cache layer serves old data
    pub cache_bust: bool,
    pub timeout_ms: Option<u32>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            headers: vec![("Accept".to_string(), "application/json".to_string())],
            cache_bust: true,
            timeout_ms: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub body: String,
}

impl FetchResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Key-value persistence. Missing keys are not errors.
#[async_trait(?Send)]
pub trait StorageAdapter {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// HTTP client. Timeouts and network failures come back as `Err`, never as panics.
#[async_trait(?Send)]
pub trait FetchAdapter {
    async fn request(&self, url: &str, options: &FetchOptions) -> Result<FetchResponse, TransportError>;
}

pub trait LoggerAdapter {
    fn debug(&self, message: &str);
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
}

/// Source of the current time
pub trait Clock {
    fn now(&self) -> DateTime<Local>;
}

/// Append a cache-busting `t` query parameter to a URL
pub fn with_cache_buster(url: &str, millis: i64) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}t={}", url, separator, millis)
}

// ---------------------------------------------------------------------------
// Default implementations
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Clock frozen at a given instant, moved forward by hand
#[derive(Debug)]
pub struct FixedClock {
    now: RefCell<DateTime<Local>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Local>) -> Self {
        Self { now: RefCell::new(now) }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.borrow_mut();
        *now = *now + by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Local> {
        *self.now.borrow()
    }
}

/// Logger backed by the `log` facade; debug lines are gated by `DebugConfig`
#[derive(Debug, Clone)]
pub struct LogLogger {
    debug: DebugConfig,
}

impl LogLogger {
    pub fn new(debug: DebugConfig) -> Self {
        Self { debug }
    }
}

impl LoggerAdapter for LogLogger {
    fn debug(&self, message: &str) {
        if self.debug.enabled {
            log::debug!("[DEBUG] {}", message);
        }
    }

    fn info(&self, message: &str) {
        log::info!("{}", message);
    }

    fn warn(&self, message: &str) {
        log::warn!("{}", message);
    }

    fn error(&self, message: &str) {
        log::error!("{}", message);
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullLogger;

impl LoggerAdapter for NullLogger {
    fn debug(&self, _message: &str) {}
    fn info(&self, _message: &str) {}
    fn warn(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
}

/// Storage that remembers nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStorage;

#[async_trait(?Send)]
impl StorageAdapter for NullStorage {
    async fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        Ok(())
    }

    async fn remove(&self, _key: &str) -> Result<(), StorageError> {
        Ok(())
    }
}

/// In-memory storage for tests, with switchable write failures
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RefCell<HashMap<String, String>>,
    fail_writes: Cell<bool>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(self, key: &str, value: &str) -> Self {
        self.entries.borrow_mut().insert(key.to_string(), value.to_string());
        self
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.set(fail);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.borrow().contains_key(key)
    }

    pub fn value(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }
}

#[async_trait(?Send)]
impl StorageAdapter for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.fail_writes.get() {
            return Err(StorageError::Write {
                key: key.to_string(),
                reason: "quota exceeded".to_string(),
            });
        }
        self.entries.borrow_mut().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}

/// Fetch adapter that replays scripted responses per URL.
///
/// Once a URL's queue holds a single response, that response is repeated.
/// Unknown URLs fail with a network error.
#[derive(Debug, Default)]
pub struct StaticFetch {
    responses: RefCell<HashMap<String, VecDeque<Result<FetchResponse, TransportError>>>>,
    requested: RefCell<Vec<String>>,
    options: RefCell<Vec<FetchOptions>>,
}

impl StaticFetch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, url: &str, response: Result<FetchResponse, TransportError>) -> Self {
        self.push(url, response);
        self
    }

    pub fn push(&self, url: &str, response: Result<FetchResponse, TransportError>) {
        self.responses
            .borrow_mut()
            .entry(url.to_string())
            .or_default()
            .push_back(response);
    }

    /// URLs requested so far, in order
    pub fn requested(&self) -> Vec<String> {
        self.requested.borrow().clone()
    }

    /// Options passed with each request, in the same order as [`StaticFetch::requested`]
    pub fn options(&self) -> Vec<FetchOptions> {
        self.options.borrow().clone()
    }
}

#[async_trait(?Send)]
impl FetchAdapter for StaticFetch {
    async fn request(&self, url: &str, options: &FetchOptions) -> Result<FetchResponse, TransportError> {
        self.requested.borrow_mut().push(url.to_string());
        self.options.borrow_mut().push(options.clone());

        let mut responses = self.responses.borrow_mut();
        let queue = responses.get_mut(url).ok_or_else(|| TransportError::Network {
            url: url.to_string(),
            reason: "no route to host".to_string(),
        })?;

        let next = if queue.len() > 1 { queue.pop_front() } else { queue.front().cloned() };
        next.unwrap_or_else(|| {
            Err(TransportError::Network {
                url: url.to_string(),
                reason: "no scripted response".to_string(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_cache_buster() {
        assert_eq!(with_cache_buster("https://a.pl/x.json", 42), "https://a.pl/x.json?t=42");
        assert_eq!(with_cache_buster("https://a.pl/x?y=1", 42), "https://a.pl/x?y=1&t=42");
    }

    #[tokio::test]
    async fn test_memory_storage_missing_key_is_none() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.get("missing").await, Ok(None));
        assert_eq!(storage.remove("missing").await, Ok(()));
    }

    #[tokio::test]
    async fn test_memory_storage_write_failure() {
        let storage = MemoryStorage::new();
        storage.set("k", "v").await.unwrap();
        assert_eq!(storage.get("k").await, Ok(Some("v".to_string())));

        storage.set_fail_writes(true);
        assert!(matches!(storage.set("k", "w").await, Err(StorageError::Write { .. })));
        assert_eq!(storage.value("k"), Some("v".to_string()));
    }

    #[tokio::test]
    async fn test_static_fetch_replays_queue_then_repeats_last() {
        let fetch = StaticFetch::new()
            .respond("u", Ok(FetchResponse::ok("first")))
            .respond("u", Ok(FetchResponse::ok("second")));
        let options = FetchOptions::default();

        assert_eq!(fetch.request("u", &options).await.unwrap().body, "first");
        assert_eq!(fetch.request("u", &options).await.unwrap().body, "second");
        assert_eq!(fetch.request("u", &options).await.unwrap().body, "second");
        assert!(fetch.request("other", &options).await.is_err());
        assert_eq!(fetch.requested().len(), 4);
    }

    #[test]
    fn test_fixed_clock_advances() {
        let start = Local::now();
        let clock = FixedClock::new(start);
        clock.advance(Duration::minutes(3));
        assert_eq!(clock.now(), start + Duration::minutes(3));
    }
}
