//! Parking-specific display and estimation helpers.

use std::collections::HashMap;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::date_utils::get_age_in_minutes;
use crate::ParkingRecord;

/// Maximum capacity of each known parking area, keyed by display name
pub const PARKING_MAX_CAPACITY: &[(&str, u32)] = &[("Green Day", 187), ("Uni Wroc", 41)];

/// Data at least this old is replaced by an estimate when the other lot is fresh
pub const APPROXIMATION_THRESHOLD_MINUTES: u64 = 30;

/// Map raw upstream group names to display names
pub fn normalize_parking_name(name: Option<&str>) -> String {
    match name.map(str::trim) {
        None | Some("") => "Unknown".to_string(),
        Some("Bank_1") => "Uni Wroc".to_string(),
        Some(other) => other.to_string(),
    }
}

/// Capacity of a known parking area, by raw or normalized name
pub fn max_capacity(name: &str) -> Option<u32> {
    let normalized = normalize_parking_name(Some(name));
    PARKING_MAX_CAPACITY
        .iter()
        .find(|(known, _)| *known == name || *known == normalized)
        .map(|(_, capacity)| *capacity)
}

/// CSS class used to tint a card by the age of its data
pub fn age_class(age_minutes: u64) -> &'static str {
    if age_minutes >= 15 {
        "age-old"
    } else if age_minutes > 5 {
        "age-medium"
    } else {
        ""
    }
}

/// Human readable age, plus the longer form used for accessibility labels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeLabel {
    pub display: String,
    pub aria: String,
}

/// Format an age with minute, hour or half-day granularity
pub fn format_age_label(age_minutes: Option<u64>) -> AgeLabel {
    let Some(minutes) = age_minutes else {
        return AgeLabel {
            display: "--".to_string(),
            aria: "Data age unavailable".to_string(),
        };
    };

    if minutes < 60 {
        return AgeLabel {
            display: format!("{} min ago", minutes),
            aria: format!("Data from {} minute{} ago", minutes, plural(minutes == 1)),
        };
    }

    if minutes < 1440 {
        let hours = (minutes as f64 / 60.0).round() as u64;
        return AgeLabel {
            display: format!("{} h ago", hours),
            aria: format!("Data from {} hour{} ago", hours, plural(hours == 1)),
        };
    }

    let half_days = (minutes as f64 / 1440.0 * 2.0).round() / 2.0;
    let days = if half_days.fract() == 0.0 {
        format!("{}", half_days as u64)
    } else {
        format!("{:.1}", half_days)
    };
    AgeLabel {
        display: format!("{} d ago", days),
        aria: format!("Data from {} day{} ago", days, plural(days == "1")),
    }
}

fn plural(singular: bool) -> &'static str {
    if singular {
        ""
    } else {
        "s"
    }
}

/// Sum of free spots across all records
pub fn calculate_total_spaces(records: &[ParkingRecord]) -> u64 {
    records.iter().map(|record| u64::from(record.free_spots)).sum()
}

/// Why a stale record could not be estimated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApproximationSkip {
    UnknownCapacity,
}

/// Outcome of estimating a record's free spots from another lot's occupancy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Approximation {
    pub approximated: u32,
    pub original: u32,
    pub is_approximated: bool,
    /// `None` when the record has no timestamp
    pub age_minutes: Option<u64>,
    pub fresh_ratio: Option<f64>,
    pub skipped: Option<ApproximationSkip>,
}

impl Approximation {
    fn unchanged(record: &ParkingRecord, age_minutes: Option<u64>) -> Self {
        Self {
            approximated: record.free_spots,
            original: record.free_spots,
            is_approximated: false,
            age_minutes,
            fresh_ratio: None,
            skipped: None,
        }
    }
}

/// A record paired with its (possibly estimated) free spot count
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApproximatedRecord {
    pub record: ParkingRecord,
    pub approximation: Approximation,
}

fn age_of(record: &ParkingRecord, now: &DateTime<Local>) -> Option<u64> {
    record
        .last_updated
        .as_ref()
        .map(|updated| get_age_in_minutes(Some(updated), Some(now)))
}

fn is_too_old(age_minutes: Option<u64>) -> bool {
    age_minutes.map_or(true, |age| age >= APPROXIMATION_THRESHOLD_MINUTES)
}

/// Estimate the free spots of `stale` using the occupancy ratio of `fresh`
pub fn calculate_approximation(
    stale: &ParkingRecord,
    fresh: &ParkingRecord,
    capacities: &HashMap<String, u32>,
    now: &DateTime<Local>,
) -> Approximation {
    let stale_age = age_of(stale, now);
    if !is_too_old(stale_age) {
        return Approximation::unchanged(stale, stale_age);
    }

    let (Some(stale_max), Some(fresh_max)) = (
        capacities.get(&stale.name).copied(),
        capacities.get(&fresh.name).copied(),
    ) else {
        return Approximation {
            skipped: Some(ApproximationSkip::UnknownCapacity),
            ..Approximation::unchanged(stale, stale_age)
        };
    };
    if fresh_max == 0 {
        return Approximation {
            skipped: Some(ApproximationSkip::UnknownCapacity),
            ..Approximation::unchanged(stale, stale_age)
        };
    }

    let fresh_ratio = f64::from(fresh.free_spots) / f64::from(fresh_max);
    let approximated = (fresh_ratio * f64::from(stale_max)).round() as u32;
    log::debug!(
        "Approximating {}: ({} / {}) * {} = {}",
        stale.name,
        fresh.free_spots,
        fresh_max,
        stale_max,
        approximated
    );

    Approximation {
        approximated,
        original: stale.free_spots,
        is_approximated: true,
        age_minutes: stale_age,
        fresh_ratio: Some(fresh_ratio),
        skipped: None,
    }
}

/// Attach approximation info to every record.
///
/// Estimation only happens with exactly two lots, when one is old and the other fresh.
pub fn apply_approximations(
    records: &[ParkingRecord],
    capacities: &HashMap<String, u32>,
    now: &DateTime<Local>,
) -> Vec<ApproximatedRecord> {
    let unchanged = |record: &ParkingRecord| ApproximatedRecord {
        record: record.clone(),
        approximation: Approximation::unchanged(record, age_of(record, now)),
    };

    let [first, second] = records else {
        return records.iter().map(unchanged).collect();
    };

    let first_old = is_too_old(age_of(first, now));
    let second_old = is_too_old(age_of(second, now));

    let estimate = |stale: &ParkingRecord, fresh: &ParkingRecord| ApproximatedRecord {
        record: stale.clone(),
        approximation: calculate_approximation(stale, fresh, capacities, now),
    };

    vec![
        if first_old && !second_old { estimate(first, second) } else { unchanged(first) },
        if second_old && !first_old { estimate(second, first) } else { unchanged(second) },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn capacities() -> HashMap<String, u32> {
        PARKING_MAX_CAPACITY
            .iter()
            .map(|(name, capacity)| (name.to_string(), *capacity))
            .collect()
    }

    fn record(name: &str, free: u32, updated: Option<DateTime<Local>>) -> ParkingRecord {
        ParkingRecord::new(name.to_lowercase(), name, free, max_capacity(name), updated)
    }

    fn now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_normalize_parking_name() {
        assert_eq!(normalize_parking_name(Some("Bank_1")), "Uni Wroc");
        assert_eq!(normalize_parking_name(Some("Green Day")), "Green Day");
        assert_eq!(normalize_parking_name(Some("")), "Unknown");
        assert_eq!(normalize_parking_name(None), "Unknown");
    }

    #[test]
    fn test_max_capacity() {
        assert_eq!(max_capacity("Green Day"), Some(187));
        assert_eq!(max_capacity("Bank_1"), Some(41));
        assert_eq!(max_capacity("Elsewhere"), None);
    }

    #[test]
    fn test_age_class() {
        assert_eq!(age_class(0), "");
        assert_eq!(age_class(5), "");
        assert_eq!(age_class(6), "age-medium");
        assert_eq!(age_class(15), "age-old");
    }

    #[test]
    fn test_format_age_label() {
        assert_eq!(format_age_label(None).display, "--");
        assert_eq!(format_age_label(Some(1)).aria, "Data from 1 minute ago");
        assert_eq!(format_age_label(Some(12)).display, "12 min ago");
        assert_eq!(format_age_label(Some(90)).display, "2 h ago");
        assert_eq!(format_age_label(Some(60)).aria, "Data from 1 hour ago");
        assert_eq!(format_age_label(Some(1440)).display, "1 d ago");
        assert_eq!(format_age_label(Some(1440)).aria, "Data from 1 day ago");
        assert_eq!(format_age_label(Some(2160)).display, "1.5 d ago");
        assert_eq!(format_age_label(Some(2160)).aria, "Data from 1.5 days ago");
    }

    #[test]
    fn test_calculate_total_spaces() {
        let records = vec![record("Green Day", 40, None), record("Uni Wroc", 2, None)];
        assert_eq!(calculate_total_spaces(&records), 42);
        assert_eq!(calculate_total_spaces(&[]), 0);
    }

    #[test]
    fn test_calculate_approximation_uses_fresh_ratio() {
        let stale = record("Uni Wroc", 3, Some(now() - Duration::minutes(45)));
        let fresh = record("Green Day", 187, Some(now() - Duration::minutes(2)));

        let result = calculate_approximation(&stale, &fresh, &capacities(), &now());
        assert!(result.is_approximated);
        assert_eq!(result.approximated, 41);
        assert_eq!(result.original, 3);
        assert_eq!(result.age_minutes, Some(45));
        assert_eq!(result.fresh_ratio, Some(1.0));
    }

    #[test]
    fn test_calculate_approximation_skips_recent_and_unknown() {
        let recent = record("Uni Wroc", 3, Some(now() - Duration::minutes(10)));
        let fresh = record("Green Day", 100, Some(now()));
        let result = calculate_approximation(&recent, &fresh, &capacities(), &now());
        assert!(!result.is_approximated);
        assert_eq!(result.approximated, 3);

        let unknown = record("Elsewhere", 7, Some(now() - Duration::hours(2)));
        let result = calculate_approximation(&unknown, &fresh, &capacities(), &now());
        assert!(!result.is_approximated);
        assert_eq!(result.skipped, Some(ApproximationSkip::UnknownCapacity));
    }

    #[test]
    fn test_apply_approximations() {
        let green = record("Green Day", 93, Some(now() - Duration::minutes(1)));
        let uni = record("Uni Wroc", 30, Some(now() - Duration::minutes(31)));

        let processed = apply_approximations(&[green.clone(), uni.clone()], &capacities(), &now());
        assert_eq!(processed.len(), 2);
        assert!(!processed[0].approximation.is_approximated);
        assert!(processed[1].approximation.is_approximated);
        assert_eq!(processed[1].approximation.approximated, 20);

        // Both stale: nothing to estimate from
        let old_green = record("Green Day", 93, None);
        let processed = apply_approximations(&[old_green, uni], &capacities(), &now());
        assert!(processed.iter().all(|p| !p.approximation.is_approximated));

        // Only one lot
        let processed = apply_approximations(&[green], &capacities(), &now());
        assert_eq!(processed.len(), 1);
        assert_eq!(processed[0].approximation.age_minutes, Some(1));
    }
}
