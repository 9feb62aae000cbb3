//! # Occupancy History
//!
//! Rows of timestamped free-spot counts for the two lots, shaped like the
//! spreadsheet export they were originally kept in: one row per observation,
//! with a time and a value column per lot. Column lookups are
//! case-insensitive and tolerate stray whitespace, since exported headers are
//! not consistent.
//!
//! The store appends a row whenever the API reports a timestamp newer than the
//! last recorded one, and keeps the rows in storage under the history cache key.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::date_utils::parse_timestamp;
use crate::ParkingApiEntry;

pub const GD_TIME: &str = "gd_time";
pub const GD_VALUE: &str = "greenday free";
pub const UNI_TIME: &str = "uni_time";
pub const UNI_VALUE: &str = "uni free";

/// One history row: column name to cell value
pub type HistoryRow = BTreeMap<String, Value>;

/// What is written to storage whenever the history changes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySnapshot {
    pub data: Vec<HistoryRow>,
    pub timestamp: DateTime<Local>,
}

/// A parsed observation for one lot
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    /// Timestamp exactly as it appeared, trimmed
    pub raw: String,
    pub date: DateTime<Local>,
    pub value: Option<f64>,
}

/// Newest observation per lot
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LastEntries {
    pub gd: Option<HistoryEntry>,
    pub uni: Option<HistoryEntry>,
}

pub fn normalize_key(key: Option<&str>) -> String {
    key.map(|key| key.trim().to_lowercase()).unwrap_or_default()
}

/// The row's own spelling of the column matching `target`
pub fn find_column_key<'a>(row: &'a HistoryRow, target: &str) -> Option<&'a str> {
    let target = normalize_key(Some(target));
    row.keys()
        .find(|key| normalize_key(Some(key.as_str())) == target)
        .map(String::as_str)
}

/// Cell value for a column, with surrounding whitespace removed from strings
pub fn get_row_value(row: &HistoryRow, column: &str) -> Option<Value> {
    let key = find_column_key(row, column)?;
    row.get(key).map(|value| match value {
        Value::String(text) => Value::String(text.trim().to_string()),
        other => other.clone(),
    })
}

/// Numeric reading of a cell or counter; blanks and non-numbers are `None`
fn numeric_value(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => {
            let text = text.trim();
            if text.is_empty() {
                None
            } else {
                text.parse::<f64>().ok().filter(|number| number.is_finite())
            }
        }
        _ => None,
    }
}

fn cell_text(value: Option<Value>) -> String {
    match value {
        Some(Value::String(text)) => text,
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Observation from one row's time and value columns; `None` without a valid time
pub fn build_entry_from_row(row: &HistoryRow, time_column: &str, value_column: &str) -> Option<HistoryEntry> {
    let raw = cell_text(get_row_value(row, time_column));
    let date = parse_timestamp(Some(&raw))?;
    Some(HistoryEntry {
        raw,
        date,
        value: numeric_value(get_row_value(row, value_column).as_ref()),
    })
}

pub fn extract_last_entry(rows: &[HistoryRow]) -> LastEntries {
    match rows.last() {
        Some(row) => LastEntries {
            gd: build_entry_from_row(row, GD_TIME, GD_VALUE),
            uni: build_entry_from_row(row, UNI_TIME, UNI_VALUE),
        },
        None => LastEntries::default(),
    }
}

/// Drop rows whose pair of time columns was already seen, keeping the first
pub fn dedupe_history_rows(rows: Vec<HistoryRow>) -> Vec<HistoryRow> {
    let mut seen = HashSet::new();
    rows.into_iter()
        .filter(|row| {
            let gd = cell_text(get_row_value(row, GD_TIME));
            let uni = cell_text(get_row_value(row, UNI_TIME));
            seen.insert((gd, uni))
        })
        .collect()
}

pub fn parse_api_entry(entry: &ParkingApiEntry) -> Option<HistoryEntry> {
    let raw = entry.timestamp.as_deref()?.trim();
    let date = parse_timestamp(Some(raw))?;
    Some(HistoryEntry {
        raw: raw.to_string(),
        date,
        value: numeric_value(entry.current_free_group_counter_value.as_ref()),
    })
}

/// Row recording one reading per lot; missing fields become empty cells
pub fn build_cache_row_from_payload(gd: Option<&ParkingApiEntry>, uni: Option<&ParkingApiEntry>) -> HistoryRow {
    let time = |entry: Option<&ParkingApiEntry>| {
        Value::String(
            entry
                .and_then(|entry| entry.timestamp.clone())
                .filter(|timestamp| !timestamp.is_empty())
                .unwrap_or_default(),
        )
    };
    let counter = |entry: Option<&ParkingApiEntry>| {
        entry
            .and_then(|entry| entry.current_free_group_counter_value.clone())
            .filter(|value| !value.is_null())
            .unwrap_or_else(|| Value::String(String::new()))
    };

    HistoryRow::from([
        (GD_TIME.to_string(), time(gd)),
        (GD_VALUE.to_string(), counter(gd)),
        (UNI_TIME.to_string(), time(uni)),
        (UNI_VALUE.to_string(), counter(uni)),
    ])
}

fn number_value(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Value::Number(Number::from(value as i64))
    } else {
        Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
    }
}

fn is_newer(api: Option<&HistoryEntry>, last: Option<&HistoryEntry>) -> bool {
    match (api, last) {
        (Some(api), Some(last)) => api.date > last.date,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

/// Carry the recorded observation forward when the API has nothing newer for a lot
fn backfill(entry: &mut ParkingApiEntry, api: Option<&HistoryEntry>, last: Option<&HistoryEntry>) {
    let Some(last) = last else {
        return;
    };
    if api.is_some_and(|api| api.date >= last.date) {
        return;
    }

    entry.timestamp = Some(last.raw.clone());
    entry.current_free_group_counter_value = match last.value {
        Some(value) => Some(number_value(value)),
        None => entry
            .current_free_group_counter_value
            .take()
            .or_else(|| Some(Value::Number(Number::from(0)))),
    };
}

/// Row to append after a fetch, or `None` when neither lot reports anything newer
/// than the last recorded row.
///
/// `heads` holds the first API entry per endpoint, Green Day first. A lot whose
/// API timestamp is missing or older than the recorded one keeps its recorded
/// reading in the new row.
pub fn next_history_row(rows: &[HistoryRow], heads: &[ParkingApiEntry]) -> Option<HistoryRow> {
    let mut payload: [ParkingApiEntry; 2] = Default::default();
    for (slot, head) in payload.iter_mut().zip(heads) {
        *slot = head.clone();
    }

    let api_gd = parse_api_entry(&payload[0]);
    let api_uni = parse_api_entry(&payload[1]);
    let last = extract_last_entry(rows);

    if !is_newer(api_gd.as_ref(), last.gd.as_ref()) && !is_newer(api_uni.as_ref(), last.uni.as_ref()) {
        return None;
    }

    let [mut gd, mut uni] = payload;
    backfill(&mut gd, api_gd.as_ref(), last.gd.as_ref());
    backfill(&mut uni, api_uni.as_ref(), last.uni.as_ref());
    Some(build_cache_row_from_payload(Some(&gd), Some(&uni)))
}

/// Entries inside `[start, end]` plus the nearest neighbor on each side, so a
/// line drawn through them still crosses the window edges.
///
/// `entries` must be sorted by date. Without a window everything is returned.
pub fn slice_with_connectors(
    entries: &[HistoryEntry],
    window: Option<(DateTime<Local>, DateTime<Local>)>,
) -> Vec<HistoryEntry> {
    let Some((start, end)) = window else {
        return entries.to_vec();
    };

    let inside = |entry: &HistoryEntry| entry.date >= start && entry.date <= end;
    let first = entries.iter().position(inside);
    let last = entries.iter().rposition(inside);

    let (from, to) = match (first, last) {
        (Some(first), Some(last)) => (first.saturating_sub(1), (last + 1).min(entries.len() - 1)),
        _ => {
            // Nothing inside: keep the last point before and the first point after
            let before = entries.iter().rposition(|entry| entry.date < start);
            let after = entries.iter().position(|entry| entry.date > end);
            return before.into_iter().chain(after).map(|index| entries[index].clone()).collect();
        }
    };
    entries[from..=to].to_vec()
}
