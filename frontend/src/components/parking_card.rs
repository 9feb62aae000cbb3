use chrono::{DateTime, Local};
use shared::date_utils::{format_time, is_stale_timestamp_at};
use shared::parking_utils::{age_class, format_age_label, Approximation};
use shared::ParkingRecord;
use yew::prelude::*;

#[derive(Properties, PartialEq)]
pub struct ParkingCardProps {
    pub record: ParkingRecord,
    pub approximation: Approximation,
    pub now: DateTime<Local>,
    pub locale: String,
    pub stale_threshold_minutes: u64,
}

#[function_component(ParkingCard)]
pub fn parking_card(props: &ParkingCardProps) -> Html {
    let record = &props.record;
    let age = record.age_in_minutes(&props.now);
    let label = format_age_label(age);
    let stale = is_stale_timestamp_at(record.last_updated.as_ref(), props.stale_threshold_minutes, &props.now);

    // Missing timestamps count as old
    let card_class = classes!(
        "parking-card",
        age_class(age.unwrap_or(u64::MAX)),
        stale.then_some("stale")
    );

    let shown_free = props.approximation.approximated;

    html! {
        <div class={card_class}>
            <div class="parking-name">{ &record.name }</div>
            <div class="parking-spots">
                <span class="free">{ shown_free }</span>
                <span class="total">{ format!(" / {}", record.total_spots) }</span>
                if props.approximation.is_approximated {
                    <span
                        class="approximation-marker"
                        title={format!("Estimated, last reported value {}", props.approximation.original)}
                    >
                        {"≈"}
                    </span>
                }
            </div>
            <div class="parking-age" aria-label={label.aria.clone()}>{ label.display.clone() }</div>
            <div class="parking-timestamp">
                { format_time(record.last_updated.as_ref(), &props.locale) }
            </div>
        </div>
    }
}
