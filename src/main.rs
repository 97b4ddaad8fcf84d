// offline-proxy - Network-first caching proxy with offline fallback
// Author: kelexine (https://github.com/kelexine)

use anyhow::{Context, Result};
use clap::Parser;
use offline_proxy::cache;
use offline_proxy::cli::Args;
use offline_proxy::config::AppConfig;
use offline_proxy::engine::{EngineSettings, OfflineEngine};
use offline_proxy::network::HttpFetcher;
use offline_proxy::push::LogGateway;
use offline_proxy::server::create_router;
use offline_proxy::utils::logging;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Phase 1: Load configuration, CLI flags win over file and environment
    let mut config = AppConfig::load_from(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate()?;

    // Phase 2: Initialize logging
    logging::init(&config.logging)?;
    info!("Starting offline-proxy v{}", env!("CARGO_PKG_VERSION"));

    // Phase 3: Build the engine for the configured generation
    let store = cache::open_store(&config.cache).await?;
    let fetcher = Arc::new(HttpFetcher::new(&config.upstream)?);
    let settings = EngineSettings::from_config(&config)?;
    info!(
        "Generation {} against upstream {}",
        settings.generation, settings.origin
    );
    let engine = Arc::new(OfflineEngine::new(
        settings,
        store,
        fetcher,
        Arc::new(LogGateway),
    ));

    // Phase 4: Install and activate, unless the host drives the lifecycle
    if args.skip_lifecycle {
        info!("Skipping lifecycle; POST /__offline/install and /__offline/activate to run it");
    } else {
        let installed = match engine.install().await {
            Ok(count) => {
                info!("Installed {} preload resources", count);
                true
            }
            Err(e) => {
                // Offline at startup: a previous run may have left this generation installed
                warn!("Install failed: {}", e);
                let resumed = engine
                    .resume_installed()
                    .await
                    .context("checking for an installed generation")?;
                if resumed {
                    info!("Resumed previously installed generation {}", engine.generation());
                } else if let Some(previous) = engine.previous_generation().await {
                    warn!(
                        "Serving generation {} until generation {} installs",
                        previous,
                        engine.generation()
                    );
                } else {
                    return Err(e).context("no installed generation to fall back on");
                }
                resumed
            }
        };
        if installed {
            let evicted = engine.activate().await?;
            info!("Activated generation {} (evicted {:?})", engine.generation(), evicted);
        }
    }

    // Phase 5: Build and start HTTP server
    let app = create_router(config.clone(), Arc::clone(&engine))?;
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;

    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Phase 6: Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Background cache writes may still be in flight
    let pending = engine.pending_writes();
    if pending > 0 {
        info!("Waiting for {} cache writes", pending);
    }
    engine.flush().await;

    info!("Server shut down gracefully");
    Ok(())
}

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
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
