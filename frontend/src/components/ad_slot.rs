use wasm_bindgen::{JsCast, JsValue};
use yew::prelude::*;

const ADSENSE_CLIENT: &str = "ca-pub-4295926250176261";

/// Ad integration, resolved once at startup
#[derive(Clone, Debug, PartialEq)]
pub enum AdProvider {
    AdSense { client: String },
    Unavailable { reason: String },
}

impl AdProvider {
    /// AdSense is only usable if its loader script defined `window.adsbygoogle`
    pub fn detect() -> Self {
        let Some(window) = web_sys::window() else {
            return AdProvider::Unavailable {
                reason: "no window".to_string(),
            };
        };
        match js_sys::Reflect::has(&window, &JsValue::from_str("adsbygoogle")) {
            Ok(true) => AdProvider::AdSense {
                client: ADSENSE_CLIENT.to_string(),
            },
            Ok(false) => AdProvider::Unavailable {
                reason: "ad script not loaded".to_string(),
            },
            Err(e) => AdProvider::Unavailable {
                reason: format!("{:?}", e),
            },
        }
    }
}

fn request_ad_fill() -> Result<(), JsValue> {
    let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
    let queue = js_sys::Reflect::get(&window, &JsValue::from_str("adsbygoogle"))?;
    let queue: js_sys::Array = queue.dyn_into()?;
    queue.push(&js_sys::Object::new());
    Ok(())
}

#[derive(Properties, PartialEq)]
pub struct AdSlotProps {
    pub provider: AdProvider,
    pub slot: String,
}

#[function_component(AdSlot)]
pub fn ad_slot(props: &AdSlotProps) -> Html {
    let enabled = matches!(props.provider, AdProvider::AdSense { .. });

    use_effect_with(enabled, |enabled| {
        if *enabled {
            if let Err(e) = request_ad_fill() {
                gloo::console::error!("AdSense error:", e);
            }
        }
        || ()
    });

    match &props.provider {
        AdProvider::AdSense { client } => html! {
            <ins
                class="adsbygoogle"
                style="display:block"
                data-ad-client={client.clone()}
                data-ad-slot={props.slot.clone()}
                data-ad-format="auto"
                data-full-width-responsive="true"
            />
        },
        AdProvider::Unavailable { reason } => {
            gloo::console::debug!(format!("Ad slot {} disabled: {}", props.slot, reason));
            html! {}
        }
    }
}
