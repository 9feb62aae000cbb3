use shared::{DebugConfig, StoreConfig};
use yew::prelude::*;

mod components;
mod hooks;
mod services;

use components::ad_slot::AdProvider;
use components::dashboard::Dashboard;

const DEFAULT_PROXY_URL: &str = "http://localhost:8787/";

fn app_config() -> StoreConfig {
    let proxy = option_env!("PARKING_PROXY_URL").unwrap_or(DEFAULT_PROXY_URL);
    let debug = match option_env!("PARKING_DEBUG") {
        Some("0") | Some("false") => DebugConfig::disabled(),
        _ => DebugConfig::enabled(),
    };
    StoreConfig::default().with_proxy_base(proxy).with_debug(debug)
}

#[function_component(App)]
fn app() -> Html {
    let config = use_memo((), |_| app_config());
    let ad_provider = use_memo((), |_| AdProvider::detect());

    html! {
        <Dashboard config={(*config).clone()} ad_provider={(*ad_provider).clone()} />
    }
}

fn main() {
    yew::Renderer::<App>::new().render();
}
