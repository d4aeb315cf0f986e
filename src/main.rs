use aipg_state_sync::config::{COIN_DECIMALS, WalletConfig};
use aipg_state_sync::utils::format_token_amount;
use aipg_state_sync::wallet::script;
use aipg_state_sync::wallet::sync::events::{EventDispatcher, LoggingEventHandler};
use aipg_state_sync::wallet::sync::repositories::{Database, FileRecordStore};
use aipg_state_sync::wallet::{WalletContext, WatchOnlyAddress};

use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::time())
        .init();

    let mut args = std::env::args().skip(1);
    let Some(address) = args.next() else {
        return Err("usage: aipg-state-sync <address> [config.toml]".into());
    };
    let mut config = match args.next().or_else(|| std::env::var("AIPG_CONFIG").ok()) {
        Some(path) => WalletConfig::from_file(Path::new(&path))?,
        None => WalletConfig::default(),
    };
    let params = config.chain_params();

    match script::decode_address(&address) {
        Some((version, _)) if version == params.pubkey_address_version => {}
        _ => return Err(format!("{} is not a {} address", address, params.name).into()),
    }

    info!("Starting wallet sync service for {} on {}", address, params.name);

    let store = Arc::new(FileRecordStore::new(config.data_dir.clone(), &config.profile));
    let mut events = EventDispatcher::new();
    events.register_handler(Box::new(LoggingEventHandler));

    // The stored auto-switch preference wins over the file default
    let settings = Database::new(store.clone())
        .get_settings()
        .await?;
    config.sync.auto_switch = settings.auto_switch;

    let explorer = WalletContext::connect_explorer(&params, &config)?;
    let context = WalletContext::open(
        config,
        Arc::new(WatchOnlyAddress::new(address)),
        explorer,
        store,
        events,
    )?;

    if context.load_on_startup().await? {
        info!("Restored wallet history from disk");
    }
    if let Err(e) = context.full_sync().await {
        warn!("Initial sync failed, continuing in the background: {}", e);
    }

    let balances = context.balances().await;
    info!(
        "Balance: {} {} spendable, {} cold, {} immature",
        format_token_amount(balances.spendable, COIN_DECIMALS),
        params.ticker,
        format_token_amount(balances.cold, COIN_DECIMALS),
        format_token_amount(balances.immature, COIN_DECIMALS)
    );

    let sync_loop = context.spawn_sync_loop();
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutting down");
    sync_loop.shutdown().await;

    Ok(())
}
