use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use log::info;
use shared::{DebugConfig, StoreConfig};

mod adapters;
mod report;

use adapters::build_parking_store;
use report::render_report;

#[derive(Parser)]
#[command(name = "parking-native")]
#[command(about = "Realtime parking availability in the terminal")]
struct Cli {
    /// Refresh every SECS seconds instead of printing once
    #[arg(long, value_name = "SECS")]
    watch: Option<u64>,
    /// Locale used for time formatting
    #[arg(long, default_value = shared::date_utils::DEFAULT_LOCALE)]
    locale: String,
    /// Remove the offline cache and exit
    #[arg(long, default_value_t = false)]
    clear_cache: bool,
    /// Verbose store logging
    #[arg(long, default_value_t = false)]
    debug: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    let debug = if cli.debug {
        DebugConfig::enabled()
    } else {
        DebugConfig::disabled()
    };
    let mut config = StoreConfig::default().with_debug(debug);
    config.locale = cli.locale;

    let store = build_parking_store(config).context("Failed to set up parking store")?;

    if cli.clear_cache {
        store.clear_cache().await;
        let state = store.get_state();
        if let Some(message) = state.error_message() {
            anyhow::bail!("Failed to clear cache: {}", message);
        }
        println!("Cache cleared");
        return Ok(());
    }

    store.hydrate_from_cache().await;
    store.fetch_parking_data().await;
    print_state(&store);

    let Some(seconds) = cli.watch else {
        return Ok(());
    };

    info!("Refreshing every {}s, press Ctrl+C to stop", seconds);
    let mut ticker = tokio::time::interval(Duration::from_secs(seconds.max(1)));
    // The first tick completes immediately
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                store.fetch_parking_data().await;
                print_state(&store);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Stopping");
                return Ok(());
            }
        }
    }
}

fn print_state(store: &shared::ParkingStore) {
    let now = chrono::Local::now();
    let state = store.get_state();
    let records = store.approximated_records();
    println!("{}\n", render_report(&state, &records, store.config(), &now));
}
