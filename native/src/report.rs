use chrono::{DateTime, Local};
use shared::date_utils::{format_time, is_stale_timestamp_at};
use shared::parking_utils::{calculate_total_spaces, format_age_label, ApproximatedRecord};
use shared::{StoreConfig, StoreState};

/// Plain text table of the current store state
pub fn render_report(
    state: &StoreState,
    records: &[ApproximatedRecord],
    config: &StoreConfig,
    now: &DateTime<Local>,
) -> String {
    let mut lines = Vec::new();

    let updated = format_time(state.last_fetched_at.as_ref(), &config.locale);
    let source = if state.from_cache { " (cached)" } else { "" };
    lines.push(format!("Parking availability, updated {}{}", updated, source));

    if let Some(message) = state.error_message() {
        lines.push(format!("! {}", message));
    }

    if records.is_empty() {
        lines.push(if state.is_loading {
            "Loading...".to_string()
        } else {
            "No parking data available".to_string()
        });
        return lines.join("\n");
    }

    let name_width = records
        .iter()
        .map(|entry| entry.record.name.chars().count())
        .max()
        .unwrap_or(0);

    for entry in records {
        let record = &entry.record;
        let age = record.age_in_minutes(now);
        let stale = is_stale_timestamp_at(record.last_updated.as_ref(), config.stale_threshold_minutes, now);
        let marker = if entry.approximation.is_approximated { "~" } else { " " };

        lines.push(format!(
            "{:<width$}  {}{:>4} / {:<4}  {:>8}  {}{}",
            record.name,
            marker,
            entry.approximation.approximated,
            record.total_spots,
            format_time(record.last_updated.as_ref(), &config.locale),
            format_age_label(age).display,
            if stale { "  [stale]" } else { "" },
            width = name_width,
        ));
    }

    lines.push(format!("Total free: {}", calculate_total_spaces(&state.records)));
    lines.join("\n")
}
