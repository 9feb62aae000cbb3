//! Platform-agnostic core of the parking availability clients.
//!
//! Both the web client and the native client depend on this crate for the
//! data model, the parking store and the date/parking helpers. Platform
//! specifics enter only through the traits in [`adapters`].

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod adapters;
pub mod config;
pub mod date_utils;
pub mod error;
pub mod history;
pub mod parking_utils;
pub mod store;

pub use adapters::{
    Clock, FetchAdapter, FetchOptions, FetchResponse, LoggerAdapter, StorageAdapter, StorageError,
    TransportError,
};
pub use config::{DebugConfig, ParkingEndpoint, StoreConfig};
pub use error::StoreError;
pub use store::{create_parking_store, Adapters, ParkingStore, StoreState, SubscriptionId};

/// One entry as served by the upstream parking API
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParkingApiEntry {
    #[serde(rename = "ParkingGroupName", default, skip_serializing_if = "Option::is_none")]
    pub parking_group_name: Option<String>,
    #[serde(rename = "Timestamp", default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Usually a number, occasionally a numeric string
    #[serde(rename = "CurrentFreeGroupCounterValue", default, skip_serializing_if = "Option::is_none")]
    pub current_free_group_counter_value: Option<Value>,
}

impl ParkingApiEntry {
    /// Free spot count, if present and a non-negative integer
    pub fn free_spots(&self) -> Result<u32, StoreError> {
        let malformed = |detail: String| StoreError::MalformedPayload(detail);
        let count = match &self.current_free_group_counter_value {
            Some(Value::Number(number)) => number
                .as_u64()
                .or_else(|| number.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64))
                .ok_or_else(|| malformed(format!("free spot count {} is not a non-negative integer", number)))?,
            Some(Value::String(text)) => text
                .trim()
                .parse::<u64>()
                .map_err(|_| malformed(format!("free spot count '{}' is not a number", text)))?,
            Some(other) => return Err(malformed(format!("unexpected free spot value {}", other))),
            None => return Err(malformed("missing CurrentFreeGroupCounterValue".to_string())),
        };
        u32::try_from(count).map_err(|_| malformed(format!("free spot count {} out of range", count)))
    }
}

/// An endpoint answers with either a single entry or a list of them
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ApiPayload {
    Many(Vec<ParkingApiEntry>),
    One(ParkingApiEntry),
}

impl ApiPayload {
    pub fn into_entries(self) -> Vec<ParkingApiEntry> {
        match self {
            ApiPayload::Many(entries) => entries,
            ApiPayload::One(entry) => vec![entry],
        }
    }
}

/// Availability snapshot for one parking lot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StoredParkingRecord")]
pub struct ParkingRecord {
    pub id: String,
    pub name: String,
    pub free_spots: u32,
    /// Never less than `free_spots`
    pub total_spots: u32,
    pub last_updated: Option<DateTime<Local>>,
}

/// Serialized form of [`ParkingRecord`], checked before it becomes one
#[derive(Debug, Deserialize)]
pub struct StoredParkingRecord {
    pub id: String,
    pub name: String,
    pub free_spots: u32,
    pub total_spots: u32,
    pub last_updated: Option<DateTime<Local>>,
}

impl TryFrom<StoredParkingRecord> for ParkingRecord {
    type Error = String;

    fn try_from(stored: StoredParkingRecord) -> Result<Self, Self::Error> {
        if stored.free_spots > stored.total_spots {
            return Err(format!(
                "record '{}' has {} free spots but only {} in total",
                stored.id, stored.free_spots, stored.total_spots
            ));
        }
        Ok(Self {
            id: stored.id,
            name: stored.name,
            free_spots: stored.free_spots,
            total_spots: stored.total_spots,
            last_updated: stored.last_updated,
        })
    }
}

impl ParkingRecord {
    /// Build a record; a missing or too-small capacity is raised to `free_spots`
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        free_spots: u32,
        capacity: Option<u32>,
        last_updated: Option<DateTime<Local>>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            free_spots,
            total_spots: capacity.map_or(free_spots, |capacity| capacity.max(free_spots)),
            last_updated,
        }
    }

    /// Convert an upstream entry, looking its capacity up by display name
    pub fn from_api_entry(
        id: impl Into<String>,
        entry: &ParkingApiEntry,
        config: &StoreConfig,
    ) -> Result<Self, StoreError> {
        let name = parking_utils::normalize_parking_name(entry.parking_group_name.as_deref());
        let free_spots = entry.free_spots()?;
        let last_updated = date_utils::parse_timestamp(entry.timestamp.as_deref());
        let capacity = config.capacity_for(&name);
        Ok(Self::new(id, name, free_spots, capacity, last_updated))
    }

    pub fn occupied_spots(&self) -> u32 {
        self.total_spots.saturating_sub(self.free_spots)
    }

    pub fn age_in_minutes(&self, now: &DateTime<Local>) -> Option<u64> {
        self.last_updated
            .as_ref()
            .map(|updated| date_utils::get_age_in_minutes(Some(updated), Some(now)))
    }
}
