use std::time::Duration;

use tracing_subscriber::EnvFilter;

use striketag_engine::collab::{InProcessPresence, LogRelay, StaticDirectory};
use striketag_engine::config::EngineConfig;
use striketag_engine::enforcer::{DeadlineEnforcer, spawn_enforcer};
use striketag_engine::store::MemoryStore;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = EngineConfig::load();
    config.validate();

    tracing::info!(
        interval_secs = config.enforce_interval_secs,
        "striketag engine starting"
    );

    let store_timeout = Duration::from_millis(config.store_timeout_ms);
    let enforcer = DeadlineEnforcer::new(
        MemoryStore::new(),
        InProcessPresence::new(),
        LogRelay,
        StaticDirectory::new(),
        store_timeout,
    );
    let (handle, stop_tx) = spawn_enforcer(
        enforcer,
        Duration::from_secs(config.enforce_interval_secs),
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    let _ = stop_tx.send(()).await;
    let _ = handle.await;
    tracing::info!("striketag engine stopped");
}
