use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use workfleet::api::fleet_routes;
use workfleet::config::{FleetConfig, PayoutConfig, ServerConfig};
use workfleet::fleet::{self, Fleet, FleetManager};
use workfleet::payout::{self, HttpGateway, PayoutPolicy, PayoutService};
use workfleet::store::{self, JsonFileStore, SnapshotStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let server_config = ServerConfig::from_env()?;

    // Keep the guard alive for the life of the process so file logs flush.
    let _log_guard = init_tracing(&server_config);

    let fleet_config = FleetConfig::from_env()?;
    let payout_config = PayoutConfig::from_env()?;

    eprintln!("🤖 Workfleet v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Max workers: {}", fleet_config.max_workers);
    eprintln!("   Time scale: {}x", fleet_config.time_scale);
    eprintln!("   API: http://0.0.0.0:{}/api/workers", server_config.port);
    eprintln!("   Live feed: ws://0.0.0.0:{}/ws", server_config.port);

    // ── Fleet ───────────────────────────────────────────────────────────
    let mut core = Fleet::new(fleet_config);

    let snapshot_store: Option<Arc<dyn SnapshotStore>> = server_config
        .snapshot_path
        .as_ref()
        .map(|path| Arc::new(JsonFileStore::new(path)) as Arc<dyn SnapshotStore>);

    if let Some(store) = &snapshot_store {
        match store.load().await {
            Ok(Some(import)) => {
                let report = core.import(&import);
                eprintln!(
                    "   Restored {} workers ({} skipped)",
                    report.imported,
                    report.skipped()
                );
            }
            Ok(None) => eprintln!("   No snapshot yet, starting empty"),
            Err(e) => {
                tracing::warn!(error = %e, "Could not load snapshot, starting empty");
            }
        }
    }

    let manager = FleetManager::from_fleet(core);
    let _clock_handle = fleet::spawn_clock_driver(Arc::clone(&manager));
    let _sampler_handle = fleet::spawn_sampler(Arc::clone(&manager));

    if let Some(store) = &snapshot_store {
        let _autosave_handle = store::spawn_autosave(
            Arc::clone(&manager),
            Arc::clone(store),
            server_config.autosave_interval,
        );
        eprintln!(
            "   Snapshots: every {}s",
            server_config.autosave_interval.as_secs()
        );
    }

    // ── Payouts ─────────────────────────────────────────────────────────
    let payouts = match (
        &payout_config.endpoint,
        &payout_config.api_key,
        &payout_config.recipient,
    ) {
        (Some(endpoint), Some(api_key), Some(recipient)) => {
            let gateway = Arc::new(HttpGateway::new(endpoint.clone(), api_key.clone()));
            let service = PayoutService::new(
                Arc::clone(&manager),
                gateway,
                PayoutPolicy::from_config(&payout_config),
                recipient.clone(),
            );
            let _payout_handle =
                payout::spawn_payout_task(Arc::clone(&service), payout_config.interval);
            eprintln!(
                "   Payouts: enabled (every {}s)",
                payout_config.interval.as_secs()
            );
            Some(service)
        }
        _ => {
            eprintln!("   Payouts: disabled");
            None
        }
    };

    // ── Server ──────────────────────────────────────────────────────────
    let app = fleet_routes(Arc::clone(&manager), payouts);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", server_config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", server_config.port))?;
    tracing::info!(port = server_config.port, "Fleet server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // ── Shutdown ────────────────────────────────────────────────────────
    let stopped = manager.write(|f| f.stop_all()).await;
    tracing::info!(stopped, "Fleet stopped");

    if let Some(store) = &snapshot_store {
        match store::save_fleet(&manager, store.as_ref()).await {
            Ok(saved) => tracing::info!(saved, "Final snapshot written"),
            Err(e) => tracing::error!(error = %e, "Final snapshot failed"),
        }
    }

    Ok(())
}

fn init_tracing(config: &ServerConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = tracing_subscriber::fmt::layer().with_target(false);

    match &config.log_dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(dir, "workfleet.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(file_layer)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .init();
            None
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
