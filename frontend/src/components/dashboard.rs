use chrono::Local;
use shared::date_utils::format_time;
use shared::parking_utils::calculate_total_spaces;
use shared::StoreConfig;
use yew::prelude::*;

use super::ad_slot::{AdProvider, AdSlot};
use super::loading_skeleton::{LoadingSkeleton, LoadingSpinner};
use super::parking_card::ParkingCard;
use crate::hooks::use_parking_store::use_parking_store;

const DASHBOARD_AD_SLOT: &str = "parking-dashboard";

#[derive(Properties, PartialEq)]
pub struct DashboardProps {
    pub config: StoreConfig,
    pub ad_provider: AdProvider,
}

#[function_component(Dashboard)]
pub fn dashboard(props: &DashboardProps) -> Html {
    let handle = use_parking_store(props.config.clone());
    let state = &handle.state;
    let config = handle.store.config();
    let now = Local::now();

    let approximated = handle.store.approximated_records();
    let total_free = calculate_total_spaces(&state.records);
    let stale = handle.store.is_stale();

    let on_refresh = {
        let refresh = handle.refresh.clone();
        Callback::from(move |_: MouseEvent| refresh.emit(()))
    };
    let on_clear_cache = {
        let clear_cache = handle.clear_cache.clone();
        Callback::from(move |_: MouseEvent| clear_cache.emit(()))
    };

    let body = if state.is_loading && state.records.is_empty() {
        html! { <LoadingSkeleton count={config.endpoints.len().max(1)} /> }
    } else if state.records.is_empty() {
        html! { <div class="empty-state">{"No parking data available"}</div> }
    } else {
        html! {
            <div class="parking-list">
                { for approximated.into_iter().map(|entry| {
                    let key = entry.record.id.clone();
                    html! {
                        <ParkingCard
                            {key}
                            record={entry.record}
                            approximation={entry.approximation}
                            now={now}
                            locale={config.locale.clone()}
                            stale_threshold_minutes={config.stale_threshold_minutes}
                        />
                    }
                }) }
            </div>
        }
    };

    html! {
        <main class="dashboard">
            <header class="dashboard-header">
                <h1>{"Parking availability"}</h1>
                <div class="summary">
                    <span class="summary-label">{"Free spaces: "}</span>
                    <span class="summary-total">{ total_free }</span>
                </div>
                <div class={classes!("last-update", stale.then_some("stale"))}>
                    {"Updated: "}
                    { format_time(state.last_fetched_at.as_ref(), &config.locale) }
                    if state.from_cache {
                        <span class="cache-badge">{" (offline copy)"}</span>
                    }
                    if state.is_loading && !state.records.is_empty() {
                        <LoadingSpinner />
                    }
                </div>
            </header>

            if let Some(message) = state.error_message() {
                <div class="error-banner" role="alert">
                    <span>{ message }</span>
                    <button onclick={on_refresh.clone()}>{"Retry"}</button>
                </div>
            }

            { body }

            <footer class="dashboard-footer">
                <button onclick={on_refresh} disabled={state.is_loading || state.cache_cleared}>{"Refresh"}</button>
                <button onclick={on_clear_cache}>{"Clear cache"}</button>
                if state.cache_cleared {
                    <span class="cache-cleared">{"Cache cleared, automatic refresh paused"}</span>
                }
                if !state.history.is_empty() {
                    <span class="history-summary">
                        { format!("{} readings recorded, last at ", state.history.len()) }
                        { format_time(state.last_history_update.as_ref(), &config.locale) }
                    </span>
                }
            </footer>

            <AdSlot provider={props.ad_provider.clone()} slot={DASHBOARD_AD_SLOT.to_string()} />
        </main>
    }
}
