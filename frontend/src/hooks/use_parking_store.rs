use std::cell::RefCell;
use std::rc::Rc;

use gloo::timers::callback::Interval;
use shared::{create_parking_store, Adapters, ParkingStore, StoreConfig, StoreState};
use wasm_bindgen_futures::spawn_local;
use yew::prelude::*;

use crate::services::logging::ConsoleLogger;
use crate::services::web_adapters::{LocalStorageAdapter, WebFetchAdapter};

/// Wire the browser adapters into a parking store
pub fn build_web_store(config: StoreConfig) -> Rc<ParkingStore> {
    let adapters = Adapters::new(
        Rc::new(LocalStorageAdapter),
        Rc::new(WebFetchAdapter::new(config.proxy_base.clone())),
    )
    .with_logger(Rc::new(ConsoleLogger::new("parking-store", config.debug)));
    create_parking_store(adapters, config)
}

/// Periodic refresh that stops for good once the store reports a cleared cache
#[derive(Default)]
pub struct RefreshTimer {
    interval: RefCell<Option<Interval>>,
}

impl RefreshTimer {
    pub fn start(&self, interval_ms: u32, tick: impl FnMut() + 'static) {
        *self.interval.borrow_mut() = Some(Interval::new(interval_ms, tick));
    }

    pub fn is_running(&self) -> bool {
        self.interval.borrow().is_some()
    }

    /// Drops the timer when `state` has the cache cleared; true if this call stopped it
    pub fn observe(&self, state: &StoreState) -> bool {
        if !state.cache_cleared {
            return false;
        }
        let stopped = self.interval.borrow_mut().take().is_some();
        if stopped {
            gloo::console::debug!("Automatic refresh stopped");
        }
        stopped
    }

    pub fn stop(&self) {
        self.interval.borrow_mut().take();
    }
}

#[derive(Clone)]
pub struct UseParkingStoreHandle {
    pub state: StoreState,
    pub store: Rc<ParkingStore>,
    pub refresh: Callback<()>,
    pub reset: Callback<()>,
    pub clear_cache: Callback<()>,
}

/// Store bound to the component lifecycle.
///
/// On mount the cached payload is shown first, then the network is queried.
/// Data refreshes every `refresh_interval_secs` until the cache is cleared;
/// the timer is then dropped and a reset does not restart it.
#[hook]
pub fn use_parking_store(config: StoreConfig) -> UseParkingStoreHandle {
    let store = (*use_memo((), move |_| build_web_store(config))).clone();
    let state = {
        let store = store.clone();
        use_state(move || store.get_state())
    };

    {
        let store = store.clone();
        let state = state.clone();
        use_effect_with((), move |_| {
            let timer = Rc::new(RefreshTimer::default());

            let subscription = {
                let timer = timer.clone();
                store.subscribe(move |next| {
                    state.set(next.clone());
                    timer.observe(next);
                })
            };

            {
                let store = store.clone();
                spawn_local(async move {
                    store.hydrate_from_cache().await;
                    store.fetch_parking_data().await;
                });
            }

            let interval_ms = store.config().refresh_interval_secs.saturating_mul(1000);
            if !store.get_state().cache_cleared {
                let store = store.clone();
                timer.start(interval_ms, move || {
                    let store = store.clone();
                    spawn_local(async move { store.fetch_parking_data().await });
                });
            }

            move || {
                timer.stop();
                store.unsubscribe(subscription);
            }
        });
    }

    let refresh = {
        let store = store.clone();
        Callback::from(move |_| {
            let store = store.clone();
            spawn_local(async move { store.fetch_parking_data().await });
        })
    };

    let reset = {
        let store = store.clone();
        Callback::from(move |_| store.reset_store())
    };

    let clear_cache = {
        let store = store.clone();
        Callback::from(move |_| {
            let store = store.clone();
            spawn_local(async move { store.clear_cache().await });
        })
    };

    UseParkingStoreHandle {
        state: (*state).clone(),
        store,
        refresh,
        reset,
        clear_cache,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    #[wasm_bindgen_test]
    fn test_refresh_timer_stops_once_cache_is_cleared() {
        let ticks = Rc::new(Cell::new(0));
        let timer = RefreshTimer::default();
        {
            let ticks = ticks.clone();
            timer.start(60_000, move || ticks.set(ticks.get() + 1));
        }
        assert!(timer.is_running());

        assert!(!timer.observe(&StoreState::default()));
        assert!(timer.is_running());

        let cleared = StoreState {
            cache_cleared: true,
            ..StoreState::default()
        };
        assert!(timer.observe(&cleared));
        assert!(!timer.is_running());
        assert!(!timer.observe(&cleared));
        assert_eq!(ticks.get(), 0);
    }
}
