//! Role-integrity reconciliation server - Main Entry Point

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use rw_server::{
    api,
    audit::AuditResolver,
    config,
    enforce::Enforcer,
    engine::{self, resolve_engine_user, Dispatcher, Reconciler},
    observability,
    platform::HttpPlatform,
    policy::PolicyStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env before the filter reads RUST_LOG
    dotenvy::dotenv().ok();
    observability::init();

    let config = config::Config::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        admin_enabled = config.has_admin(),
        "Starting role-integrity server"
    );

    // Enforcement never starts against an invalid policy
    let policies = Arc::new(
        PolicyStore::load(&config.policy_path)
            .await
            .with_context(|| format!("Invalid policy at {}", config.policy_path.display()))?,
    );

    let platform = Arc::new(
        HttpPlatform::new(&config.platform_api_url, &config.platform_bot_token)
            .context("Failed to build platform client")?,
    );

    let engine_user_id = resolve_engine_user(config.engine_user_id, &*platform)
        .await
        .context("Failed to determine the engine's own user id")?;

    let resolver = AuditResolver::new(
        platform.clone(),
        config.audit_retry_delays.clone(),
        config.audit_lookup_limit,
        config.audit_max_entry_age,
    );
    let enforcer = Enforcer::new(platform.clone(), platform.clone());
    let reconciler = Arc::new(Reconciler::new(
        policies.clone(),
        resolver,
        platform,
        enforcer,
        engine_user_id,
    ));

    let (events_tx, events_rx) = engine::event_queue(config.event_queue_capacity);
    let dispatcher = tokio::spawn(Dispatcher::new(reconciler, events_rx).run());

    let watcher = config
        .policy_reload_interval
        .map(|interval| policies.clone().spawn_watcher(interval));

    let bind_address = config.bind_address.clone();
    let state = api::AppState::new(config, policies, events_tx);
    let app = api::create_router(state.clone());

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {bind_address}"))?;
    info!(address = %bind_address, "Server listening");

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal, draining events...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    if let Some(watcher) = watcher {
        watcher.abort();
    }

    // Closing the last sender lets the dispatcher finish in-flight events
    drop(state);
    if let Err(e) = dispatcher.await {
        tracing::error!(error = %e, "Dispatcher task failed");
    }

    info!("Server shutdown complete");

    Ok(())
}
