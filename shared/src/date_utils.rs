//! Date and time helpers shared by the store and the display layers.
//!
//! Upstream parking timestamps come without a time zone and usually with a
//! space between date and time (`2024-01-15 14:30:00`). They are interpreted
//! in local time, the same way a browser would.

use chrono::{DateTime, Duration, Local, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Locale used by `format_time` when the caller has no preference
pub const DEFAULT_LOCALE: &str = "pl-PL";

/// Default age (in minutes) at which data is considered stale
pub const DEFAULT_STALE_THRESHOLD_MINUTES: u64 = 15;

/// Shown in place of a time that is missing or could not be parsed
pub const TIME_PLACEHOLDER: &str = "--:--:--";

const NAIVE_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

/// Parse a raw timestamp string, with or without a `T` separator.
///
/// Returns `None` for absent, empty or unparseable input.
pub fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<Local>> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }

    let normalized = if raw.contains('T') {
        raw.to_string()
    } else {
        raw.replacen(' ', "T", 1)
    };

    if let Ok(with_offset) = DateTime::parse_from_rfc3339(&normalized) {
        return Some(with_offset.with_timezone(&Local));
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&normalized, format) {
            return resolve_local(naive, |naive| Local.from_local_datetime(naive));
        }
    }

    // Bare dates are midnight UTC, as in ECMAScript date parsing
    NaiveDate::parse_from_str(&normalized, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive).with_timezone(&Local))
}

/// Resolve a wall-clock time through `lookup`.
///
/// Repeated times take the earlier instant. Times skipped by a DST jump are
/// moved forward by an hour, so `02:30` on a spring-forward night reads as `03:30`.
fn resolve_local<T>(naive: NaiveDateTime, lookup: impl Fn(&NaiveDateTime) -> LocalResult<T>) -> Option<T> {
    match lookup(&naive) {
        LocalResult::None => lookup(&(naive + Duration::hours(1))).earliest(),
        resolved => resolved.earliest(),
    }
}

/// Whole minutes elapsed between `from` and `to`, never negative.
///
/// Returns 0 when either side is absent.
pub fn get_age_in_minutes(from: Option<&DateTime<Local>>, to: Option<&DateTime<Local>>) -> u64 {
    match (from, to) {
        (Some(from), Some(to)) => to.signed_duration_since(*from).num_minutes().max(0) as u64,
        _ => 0,
    }
}

/// Whole minutes elapsed between `from` and the current time
pub fn get_age_in_minutes_now(from: Option<&DateTime<Local>>) -> u64 {
    get_age_in_minutes(from, Some(&Local::now()))
}

/// Format the time-of-day part of a timestamp for the given locale
pub fn format_time(timestamp: Option<&DateTime<Local>>, locale: &str) -> String {
    match timestamp {
        Some(timestamp) => timestamp.format(time_pattern(locale)).to_string(),
        None => TIME_PLACEHOLDER.to_string(),
    }
}

/// Parse a raw timestamp and format it, falling back to the placeholder
pub fn format_raw_time(raw: Option<&str>, locale: &str) -> String {
    format_time(parse_timestamp(raw).as_ref(), locale)
}

/// True when the timestamp is absent or at least `threshold_minutes` old
pub fn is_stale_timestamp(timestamp: Option<&DateTime<Local>>, threshold_minutes: u64) -> bool {
    is_stale_timestamp_at(timestamp, threshold_minutes, &Local::now())
}

/// Same as `is_stale_timestamp` but measured against an explicit `now`
pub fn is_stale_timestamp_at(
    timestamp: Option<&DateTime<Local>>,
    threshold_minutes: u64,
    now: &DateTime<Local>,
) -> bool {
    match timestamp {
        Some(timestamp) => get_age_in_minutes(Some(timestamp), Some(now)) >= threshold_minutes,
        None => true,
    }
}

fn time_pattern(locale: &str) -> &'static str {
    if uses_twelve_hour_clock(locale) {
        "%-I:%M:%S %p"
    } else {
        "%H:%M:%S"
    }
}

fn uses_twelve_hour_clock(locale: &str) -> bool {
    let mut parts = locale.split(['-', '_']);
    let language = parts.next().unwrap_or_default().to_ascii_lowercase();
    let region = parts.next().unwrap_or_default().to_ascii_uppercase();
    language == "en" && !matches!(region.as_str(), "GB" | "IE")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Timelike};

    fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_wall_clock_in_dst_gap_moves_forward() {
        let at = |h: u32, mi: u32| NaiveDate::from_ymd_opt(2024, 3, 31).unwrap().and_hms_opt(h, mi, 0).unwrap();
        // Clocks jump from 02:00 to 03:00 and fall back over 01:00-02:00 in this zone
        let lookup = |naive: &NaiveDateTime| match naive.hour() {
            2 => LocalResult::None,
            1 => LocalResult::Ambiguous(*naive, *naive + Duration::hours(1)),
            _ => LocalResult::Single(*naive),
        };

        assert_eq!(resolve_local(at(2, 30), lookup), Some(at(3, 30)));
        assert_eq!(resolve_local(at(1, 15), lookup), Some(at(1, 15)));
        assert_eq!(resolve_local(at(4, 0), lookup), Some(at(4, 0)));
        assert_eq!(resolve_local(at(2, 30), |_: &NaiveDateTime| LocalResult::<NaiveDateTime>::None), None);
    }

    #[test]
    fn test_parse_timestamp_with_space_separator() {
        let parsed = parse_timestamp(Some("2024-01-15 14:30:00")).unwrap();
        assert_eq!(parsed, local(2024, 1, 15, 14, 30, 0));
        assert_eq!(parsed.hour(), 14);
        assert_eq!(parsed.minute(), 30);
    }

    #[test]
    fn test_parse_timestamp_separators_are_equivalent() {
        assert_eq!(
            parse_timestamp(Some("2024-01-01 12:00:00")),
            parse_timestamp(Some("2024-01-01T12:00:00"))
        );
        assert!(parse_timestamp(Some("2024-01-01T12:00:00")).is_some());
    }

    #[test]
    fn test_parse_timestamp_accepts_offsets_and_fractions() {
        let utc = parse_timestamp(Some("2024-01-15T14:30:00Z")).unwrap();
        assert_eq!(utc.with_timezone(&Utc), Utc.with_ymd_and_hms(2024, 1, 15, 14, 30, 0).unwrap());

        let fractional = parse_timestamp(Some("2024-01-15 14:30:00.250")).unwrap();
        assert_eq!(fractional.second(), 0);
        assert_eq!(fractional.nanosecond(), 250_000_000);

        assert!(parse_timestamp(Some("2024-01-15 14:30")).is_some());
        assert!(parse_timestamp(Some("2024-01-15")).is_some());
    }

    #[test]
    fn test_parse_timestamp_rejects_invalid_input() {
        assert_eq!(parse_timestamp(Some("not-a-date")), None);
        assert_eq!(parse_timestamp(Some("invalid-date")), None);
        assert_eq!(parse_timestamp(Some("")), None);
        assert_eq!(parse_timestamp(Some("   ")), None);
        assert_eq!(parse_timestamp(None), None);
        assert_eq!(parse_timestamp(Some("2024-13-45 99:99:99")), None);
    }

    #[test]
    fn test_get_age_in_minutes() {
        let from = local(2024, 1, 15, 14, 0, 0);
        assert_eq!(get_age_in_minutes(Some(&from), Some(&local(2024, 1, 15, 14, 5, 0))), 5);
        assert_eq!(get_age_in_minutes(Some(&from), Some(&local(2024, 1, 15, 15, 0, 0))), 60);
        assert_eq!(get_age_in_minutes(Some(&from), Some(&from)), 0);

        // Partial minutes round down
        assert_eq!(get_age_in_minutes(Some(&from), Some(&local(2024, 1, 15, 14, 5, 59))), 5);
    }

    #[test]
    fn test_get_age_in_minutes_edge_cases() {
        let earlier = local(2024, 1, 15, 14, 0, 0);
        let later = local(2024, 1, 15, 15, 0, 0);

        // Future dates clamp to zero
        assert_eq!(get_age_in_minutes(Some(&later), Some(&earlier)), 0);
        assert_eq!(get_age_in_minutes(None, Some(&later)), 0);
        assert_eq!(get_age_in_minutes(Some(&earlier), None), 0);
    }

    #[test]
    fn test_get_age_in_minutes_now() {
        let five_minutes_ago = Local::now() - Duration::minutes(5);
        assert_eq!(get_age_in_minutes_now(Some(&five_minutes_ago)), 5);
        assert_eq!(get_age_in_minutes_now(None), 0);
    }

    #[test]
    fn test_format_time() {
        let afternoon = local(2024, 1, 15, 14, 5, 9);
        assert_eq!(format_time(Some(&afternoon), DEFAULT_LOCALE), "14:05:09");
        assert_eq!(format_time(Some(&afternoon), "de-DE"), "14:05:09");
        assert_eq!(format_time(Some(&afternoon), "en-GB"), "14:05:09");
        assert_eq!(format_time(Some(&afternoon), "en-US"), "2:05:09 PM");
        assert_eq!(format_time(None, DEFAULT_LOCALE), TIME_PLACEHOLDER);
    }

    #[test]
    fn test_format_raw_time() {
        assert_eq!(format_raw_time(Some("2024-01-15 08:00:00"), "pl-PL"), "08:00:00");
        assert_eq!(format_raw_time(Some("garbage"), "pl-PL"), "--:--:--");
        assert_eq!(format_raw_time(None, "pl-PL"), "--:--:--");
    }

    #[test]
    fn test_is_stale_timestamp() {
        let now = Local::now();
        assert!(!is_stale_timestamp(Some(&now), DEFAULT_STALE_THRESHOLD_MINUTES));

        let sixteen_minutes_ago = now - Duration::minutes(16);
        assert!(is_stale_timestamp(Some(&sixteen_minutes_ago), 15));
        assert!(is_stale_timestamp(None, DEFAULT_STALE_THRESHOLD_MINUTES));
    }

    #[test]
    fn test_is_stale_timestamp_boundary_is_inclusive() {
        let now = local(2024, 1, 15, 14, 15, 0);
        let exactly_fifteen = local(2024, 1, 15, 14, 0, 0);
        let fourteen = local(2024, 1, 15, 14, 1, 0);

        assert!(is_stale_timestamp_at(Some(&exactly_fifteen), 15, &now));
        assert!(!is_stale_timestamp_at(Some(&fourteen), 15, &now));
        assert!(is_stale_timestamp_at(None, 15, &now));
    }
}
