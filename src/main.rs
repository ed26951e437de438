//! tickcache - Cache driver
//!
//! Loads the files named on the command line into an asset cache and
//! reports cache statistics until shut down.
//!
//! # Startup Sequence
//! 1. Initialize tracing subscriber for logging
//! 2. Load configuration from environment variables
//! 3. Build the asset cache on the global scheduler
//! 4. Load every path given as an argument
//! 5. Report statistics every `STATS_INTERVAL` seconds
//! 6. Stop the scheduler on SIGINT/SIGTERM

use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tickcache::cache::{CacheEvent, Entry, FnListener};
use tickcache::loader::asset_cache_builder;
use tickcache::tasks::Scheduler;
use tickcache::{stop_all, AssetLoader, Config, FileLoader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tickcache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting tickcache");

    let config = Config::from_env();
    info!(
        "Configuration loaded: expire_after_ms={}, basis={}, delete_on_expire={}, capacity_limit={}, tick_rate={}",
        config.expire_after_ms,
        config.expire_basis,
        config.delete_on_expire,
        config.capacity_limit,
        config.tick_rate
    );

    // A non-default rate gets its own scheduler; otherwise share the global one
    let scheduler = if config.tick_rate == tickcache::tasks::DEFAULT_TICK_RATE {
        Scheduler::global().clone()
    } else {
        Scheduler::new(config.tick_rate)?
    };

    let cache = asset_cache_builder::<Vec<u8>>()
        .policy(config.policy())
        .scheduler(&scheduler)
        .build()
        .context("building asset cache")?;

    cache.register(FnListener::new(|event: CacheEvent, entry: &Entry<Vec<u8>>| {
        info!(key = entry.key(), bytes = entry.peek().len(), "{:?}", event);
    }));

    let loader = FileLoader::new(".", cache.clone());
    for path in std::env::args().skip(1) {
        match loader.get_cached_or_load(&path) {
            Ok(bytes) => info!("Loaded '{}' ({} bytes)", path, bytes.len()),
            Err(e) => warn!("{}", e),
        }
    }

    let mut report = tokio::time::interval(Duration::from_secs(config.stats_interval));
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = report.tick() => {
                let stats = serde_json::to_string(&cache.stats())?;
                info!(
                    cache = cache.name(),
                    measured_tick_rate = scheduler.measured_tick_rate(),
                    "stats {}",
                    stats
                );
            }
        }
    }

    // Stopping joins the scheduler thread; keep that off the async workers
    tokio::task::spawn_blocking(move || {
        scheduler.stop();
        stop_all();
    })
    .await
    .context("stopping scheduler")?;
    info!("Shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
