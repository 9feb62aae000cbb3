//! Configuration passed explicitly into the store and its adapters.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::date_utils::{DEFAULT_LOCALE, DEFAULT_STALE_THRESHOLD_MINUTES};
use crate::parking_utils::PARKING_MAX_CAPACITY;

/// Storage key holding the last successful realtime payload
pub const CACHE_KEY_REALTIME: &str = "parking_realtime_cache";

/// Storage key holding the recorded occupancy history
pub const CACHE_KEY_HISTORY: &str = "parking_history_cache";

/// Per-request timeout handed to the fetch adapter
pub const DEFAULT_REQUEST_TIMEOUT_MS: u32 = 15_000;

/// Debug logging switch, handed to whoever needs it instead of living in a global
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugConfig {
    pub enabled: bool,
}

impl DebugConfig {
    pub fn enabled() -> Self {
        Self { enabled: true }
    }

    pub fn disabled() -> Self {
        Self { enabled: false }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self::enabled()
    }
}

/// One upstream source of parking data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParkingEndpoint {
    /// Stable identifier, used as the record id
    pub id: String,
    pub url: String,
}

impl ParkingEndpoint {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
        }
    }
}

/// Everything the parking store needs to know besides its adapters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub endpoints: Vec<ParkingEndpoint>,
    pub cache_key: String,
    pub history_cache_key: String,
    pub stale_threshold_minutes: u64,
    pub refresh_interval_secs: u32,
    pub request_timeout_ms: u32,
    /// Relay that adds CORS headers; only browser clients need it
    pub proxy_base: Option<String>,
    /// Known lot capacities keyed by normalized display name
    pub capacities: HashMap<String, u32>,
    pub locale: String,
    pub debug: DebugConfig,
}

impl StoreConfig {
    pub fn with_endpoints(mut self, endpoints: Vec<ParkingEndpoint>) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_proxy_base(mut self, proxy_base: impl Into<String>) -> Self {
        self.proxy_base = Some(proxy_base.into());
        self
    }

    pub fn with_debug(mut self, debug: DebugConfig) -> Self {
        self.debug = debug;
        self
    }

    pub fn capacity_for(&self, normalized_name: &str) -> Option<u32> {
        self.capacities.get(normalized_name).copied()
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoints: vec![
                ParkingEndpoint::new("gd", "https://gd.zaparkuj.pl/api/freegroupcountervalue.json"),
                ParkingEndpoint::new("uni", "https://gd.zaparkuj.pl/api/freegroupcountervalue-green.json"),
            ],
            cache_key: CACHE_KEY_REALTIME.to_string(),
            history_cache_key: CACHE_KEY_HISTORY.to_string(),
            stale_threshold_minutes: DEFAULT_STALE_THRESHOLD_MINUTES,
            refresh_interval_secs: 300,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            proxy_base: None,
            capacities: PARKING_MAX_CAPACITY
                .iter()
                .map(|(name, capacity)| (name.to_string(), *capacity))
                .collect(),
            locale: DEFAULT_LOCALE.to_string(),
            debug: DebugConfig::default(),
        }
    }
}
