//! # Parking Store
//!
//! State container for realtime parking data, shared by every client.
//!
//! The store owns its [`StoreState`]; UI code only reads snapshots, subscribes
//! for change notifications and dispatches the async actions below. Platform
//! behavior is injected through [`Adapters`].
//!
//! ## Failure policy
//!
//! Network, payload and storage failures never escape an action. They are
//! recorded in `StoreState::error` and the previous records stay in place, so a
//! client keeps showing the last known numbers next to an error indicator.
//!
//! ## Overlapping fetches
//!
//! Every `fetch_parking_data` call takes a sequence number. A completion is
//! applied only if no newer call has been issued since; older completions are
//! dropped. `is_loading` therefore stays set until the newest call finishes.
//!
//! ## Clearing the cache
//!
//! `clear_cache` removes both storage keys and drops any fetch still in
//! flight. Until `reset_store`, further fetches are skipped so nothing writes
//! the cache again.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::adapters::{
    Clock, FetchAdapter, FetchOptions, LogLogger, LoggerAdapter, StorageAdapter, SystemClock,
};
use crate::config::StoreConfig;
use crate::date_utils::is_stale_timestamp_at;
use crate::error::StoreError;
use crate::history::{dedupe_history_rows, next_history_row, HistoryRow, HistorySnapshot};
use crate::parking_utils::{apply_approximations, ApproximatedRecord};
use crate::{ApiPayload, ParkingApiEntry, ParkingRecord};

/// Snapshot of everything the UI renders
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreState {
    /// In the order the endpoints returned them
    pub records: Vec<ParkingRecord>,
    pub is_loading: bool,
    pub error: Option<StoreError>,
    pub last_fetched_at: Option<DateTime<Local>>,
    /// Records came from the offline cache rather than the network
    pub from_cache: bool,
    /// The cache was cleared on request; fetches are skipped until a reset
    pub cache_cleared: bool,
    /// Recorded readings, oldest first
    pub history: Vec<HistoryRow>,
    pub last_history_update: Option<DateTime<Local>>,
}

impl StoreState {
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(|error| error.to_string())
    }
}

/// What is written to storage after every successful fetch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedSnapshot {
    pub records: Vec<ParkingRecord>,
    pub fetched_at: DateTime<Local>,
}

/// Records of one fetch plus the first raw entry of each endpoint
struct FetchedBatch {
    records: Vec<ParkingRecord>,
    heads: Vec<ParkingApiEntry>,
}

/// Platform capabilities the store is built from
#[derive(Clone)]
pub struct Adapters {
    pub storage: Rc<dyn StorageAdapter>,
    pub fetch: Rc<dyn FetchAdapter>,
    pub logger: Rc<dyn LoggerAdapter>,
    pub clock: Rc<dyn Clock>,
}

impl Adapters {
    /// Storage and fetch are required; logging goes to `log` and time to the system clock
    pub fn new(storage: Rc<dyn StorageAdapter>, fetch: Rc<dyn FetchAdapter>) -> Self {
        Self {
            storage,
            fetch,
            logger: Rc::new(LogLogger::new(Default::default())),
            clock: Rc::new(SystemClock),
        }
    }

    pub fn with_logger(mut self, logger: Rc<dyn LoggerAdapter>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_clock(mut self, clock: Rc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Rc<dyn Fn(&StoreState)>;

pub struct ParkingStore {
    config: StoreConfig,
    adapters: Adapters,
    state: RefCell<StoreState>,
    listeners: RefCell<Vec<(SubscriptionId, Listener)>>,
    next_subscription: Cell<u64>,
    latest_request: Cell<u64>,
    network_applied: Cell<bool>,
}

/// Create a store for one adapter set.
///
/// Call [`ParkingStore::hydrate_from_cache`] to show cached data before the
/// first network fetch completes.
pub fn create_parking_store(adapters: Adapters, config: StoreConfig) -> Rc<ParkingStore> {
    adapters.logger.debug(&format!(
        "Creating parking store with {} endpoint(s)",
        config.endpoints.len()
    ));
    Rc::new(ParkingStore {
        config,
        adapters,
        state: RefCell::new(StoreState::default()),
        listeners: RefCell::new(Vec::new()),
        next_subscription: Cell::new(0),
        latest_request: Cell::new(0),
        network_applied: Cell::new(false),
    })
}

impl ParkingStore {
    pub fn get_state(&self) -> StoreState {
        self.state.borrow().clone()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Register a listener called with the new state after every change
    pub fn subscribe(&self, listener: impl Fn(&StoreState) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.get());
        self.next_subscription.set(id.0 + 1);
        self.listeners.borrow_mut().push((id, Rc::new(listener)));
        id
    }

    /// Returns false if the id was not subscribed
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Load every configured endpoint and replace the records on success
    pub async fn fetch_parking_data(&self) {
        if self.state.borrow().cache_cleared {
            self.adapters.logger.debug("Cache cleared, skipping fetch");
            return;
        }

        let request_id = self.latest_request.get() + 1;
        self.latest_request.set(request_id);
        self.update(|state| state.is_loading = true);
        self.adapters.logger.debug(&format!("Fetch #{} started", request_id));

        let result = self.load_records().await;

        if !self.is_latest(request_id) {
            self.adapters.logger.debug(&format!(
                "Discarding fetch #{}, superseded by #{}",
                request_id,
                self.latest_request.get()
            ));
            return;
        }

        match result {
            Ok(FetchedBatch { records, heads }) => {
                let snapshot = CachedSnapshot {
                    records,
                    fetched_at: self.adapters.clock.now(),
                };
                self.network_applied.set(true);
                self.adapters.logger.info(&format!(
                    "Fetched {} parking record(s)",
                    snapshot.records.len()
                ));
                self.update(|state| {
                    state.records = snapshot.records.clone();
                    state.last_fetched_at = Some(snapshot.fetched_at);
                    state.is_loading = false;
                    state.error = None;
                    state.from_cache = false;
                });

                if let Err(error) = self.persist(&snapshot).await {
                    self.adapters.logger.warn(&format!("Failed to cache parking data: {}", error));
                    if self.is_latest(request_id) {
                        self.update(|state| state.error = Some(error));
                    }
                }

                self.record_history(&heads, request_id).await;
            }
            Err(error) => {
                self.adapters.logger.error(&format!("Fetch #{} failed: {}", request_id, error));
                self.update(|state| {
                    state.is_loading = false;
                    state.error = Some(error);
                });
            }
        }
    }

    /// Show the last cached payload, unless fresher network data already arrived,
    /// and the recorded history
    pub async fn hydrate_from_cache(&self) {
        self.hydrate_realtime().await;
        self.hydrate_history().await;
    }

    async fn hydrate_realtime(&self) {
        let cached = match self.adapters.storage.get(&self.config.cache_key).await {
            Ok(cached) => cached,
            Err(error) => {
                self.adapters.logger.warn(&format!("Failed to read parking cache: {}", error));
                if !self.network_applied.get() {
                    self.update(|state| state.error = Some(error.into()));
                }
                return;
            }
        };

        let Some(raw) = cached else {
            self.adapters.logger.debug("No cached parking data");
            return;
        };

        let snapshot = match serde_json::from_str::<CachedSnapshot>(&raw) {
            Ok(snapshot) => snapshot,
            Err(error) => {
                self.adapters.logger.warn(&format!("Ignoring corrupt parking cache: {}", error));
                if !self.network_applied.get() {
                    self.update(|state| state.error = Some(error.into()));
                }
                return;
            }
        };

        if self.network_applied.get() {
            self.adapters.logger.debug("Network data already loaded, skipping cache");
            return;
        }

        self.adapters.logger.debug(&format!(
            "Loaded {} record(s) from cache",
            snapshot.records.len()
        ));
        self.update(|state| {
            state.records = snapshot.records;
            state.last_fetched_at = Some(snapshot.fetched_at);
            state.from_cache = true;
        });
    }

    /// Back to the initial empty state; completions of in-flight fetches are dropped
    pub fn reset_store(&self) {
        self.latest_request.set(self.latest_request.get() + 1);
        self.network_applied.set(false);
        self.update(|state| *state = StoreState::default());
    }

    /// Remove the cached payload and history and stop fetching until a reset
    pub async fn clear_cache(&self) {
        let removed = match self.adapters.storage.remove(&self.config.cache_key).await {
            Ok(()) => self.adapters.storage.remove(&self.config.history_cache_key).await,
            Err(error) => Err(error),
        };

        match removed {
            Ok(()) => {
                self.latest_request.set(self.latest_request.get() + 1);
                self.adapters.logger.info("Cache cleared and auto-refresh stopped");
                self.update(|state| {
                    state.cache_cleared = true;
                    state.is_loading = false;
                });
            }
            Err(error) => {
                self.adapters.logger.error(&format!("Failed to clear cache: {}", error));
                self.update(|state| state.error = Some(error.into()));
            }
        }
    }

    /// True when nothing was fetched yet or the last fetch is past the stale threshold
    pub fn is_stale(&self) -> bool {
        let now = self.adapters.clock.now();
        let state = self.state.borrow();
        is_stale_timestamp_at(
            state.last_fetched_at.as_ref(),
            self.config.stale_threshold_minutes,
            &now,
        )
    }

    /// Ids of records whose own timestamp is missing or past the stale threshold
    pub fn stale_record_ids(&self) -> Vec<String> {
        let now = self.adapters.clock.now();
        self.state
            .borrow()
            .records
            .iter()
            .filter(|record| {
                is_stale_timestamp_at(
                    record.last_updated.as_ref(),
                    self.config.stale_threshold_minutes,
                    &now,
                )
            })
            .map(|record| record.id.clone())
            .collect()
    }

    /// Current records with cross-lot estimates for outdated ones
    pub fn approximated_records(&self) -> Vec<ApproximatedRecord> {
        let now = self.adapters.clock.now();
        apply_approximations(&self.state.borrow().records, &self.config.capacities, &now)
    }

    async fn load_records(&self) -> Result<FetchedBatch, StoreError> {
        let options = FetchOptions {
            timeout_ms: Some(self.config.request_timeout_ms),
            ..FetchOptions::default()
        };
        let mut records = Vec::new();
        let mut heads = Vec::new();

        for endpoint in &self.config.endpoints {
            let response = self.adapters.fetch.request(&endpoint.url, &options).await?;
            if !response.is_success() {
                return Err(StoreError::HttpStatus(response.status));
            }

            let entries = serde_json::from_str::<ApiPayload>(&response.body)?.into_entries();
            heads.push(entries.first().cloned().unwrap_or_default());
            let single = entries.len() == 1;
            for (index, entry) in entries.iter().enumerate() {
                let id = if single {
                    endpoint.id.clone()
                } else {
                    format!("{}-{}", endpoint.id, index)
                };
                records.push(ParkingRecord::from_api_entry(id, entry, &self.config)?);
            }
        }

        Ok(FetchedBatch { records, heads })
    }

    async fn persist(&self, snapshot: &CachedSnapshot) -> Result<(), StoreError> {
        let payload = serde_json::to_string(snapshot)?;
        self.adapters.storage.set(&self.config.cache_key, &payload).await?;
        Ok(())
    }

    async fn hydrate_history(&self) {
        let Some(snapshot) = self.read_history().await else {
            return;
        };
        if !self.state.borrow().history.is_empty() {
            return;
        }

        self.adapters.logger.debug(&format!(
            "Loaded {} history row(s) from cache",
            snapshot.data.len()
        ));
        self.update(|state| {
            state.history = snapshot.data;
            state.last_history_update = Some(snapshot.timestamp);
        });
    }

    /// Append a history row when the fetch carried a reading newer than the last one
    async fn record_history(&self, heads: &[ParkingApiEntry], request_id: u64) {
        let rows = match self.read_history().await {
            Some(snapshot) => snapshot.data,
            None => self.state.borrow().history.clone(),
        };
        if !self.is_latest(request_id) {
            return;
        }

        let Some(row) = next_history_row(&rows, heads) else {
            self.adapters.logger.debug("History already covers the fetched timestamps");
            return;
        };

        let mut rows = rows;
        rows.push(row);
        let snapshot = HistorySnapshot {
            data: dedupe_history_rows(rows),
            timestamp: self.adapters.clock.now(),
        };
        self.update(|state| {
            state.history = snapshot.data.clone();
            state.last_history_update = Some(snapshot.timestamp);
        });

        let written = match serde_json::to_string(&snapshot) {
            Ok(payload) => self
                .adapters
                .storage
                .set(&self.config.history_cache_key, &payload)
                .await
                .map_err(StoreError::from),
            Err(error) => Err(error.into()),
        };
        match written {
            Ok(()) => self.adapters.logger.debug(&format!(
                "History cache updated ({} row(s))",
                snapshot.data.len()
            )),
            Err(error) => self.adapters.logger.warn(&format!("Failed to cache history data: {}", error)),
        }
    }

    /// Stored history, or `None` when absent or unreadable
    async fn read_history(&self) -> Option<HistorySnapshot> {
        let raw = match self.adapters.storage.get(&self.config.history_cache_key).await {
            Ok(raw) => raw?,
            Err(error) => {
                self.adapters.logger.warn(&format!("Failed to read history cache: {}", error));
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(snapshot) => Some(snapshot),
            Err(error) => {
                self.adapters.logger.warn(&format!("Ignoring corrupt history cache: {}", error));
                None
            }
        }
    }

    fn is_latest(&self, request_id: u64) -> bool {
        self.latest_request.get() == request_id
    }

    fn update(&self, mutate: impl FnOnce(&mut StoreState)) {
        mutate(&mut self.state.borrow_mut());
        self.notify();
    }

    fn notify(&self) {
        let state = self.get_state();
        // Listeners may subscribe or read state while being called
        let listeners: Vec<Listener> = self
            .listeners
            .borrow()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(&state);
        }
    }
}
