use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::info;

use venuebook::compactor;
use venuebook::config::{self, Config};
use venuebook::engine::Engine;
use venuebook::identity::TokenIdentity;
use venuebook::notify::NotifyHub;
use venuebook::server::{self, Server};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let cfg = Config::from_env();
    venuebook::observability::init(cfg.metrics_port)?;

    // Ensure data directory exists
    std::fs::create_dir_all(&cfg.data_dir)?;

    let venues = match &cfg.venues_file {
        Some(path) => config::load_venues(path)?,
        None => {
            tracing::warn!("VENUEBOOK_VENUES not set, starting with an empty venue catalog");
            Vec::new()
        }
    };
    let identity = match &cfg.tokens_file {
        Some(path) => TokenIdentity::load(path)?,
        None => TokenIdentity::default(),
    };
    if identity.is_empty() {
        tracing::warn!("no identity tokens configured, all writes will be rejected");
    }
    let token_count = identity.len();

    let engine = Arc::new(Engine::new(cfg.wal_path(), venues, Arc::new(NotifyHub::new()))?);
    let compactor_engine = engine.clone();
    let threshold = cfg.compact_threshold;
    tokio::spawn(async move {
        compactor::run_compactor(compactor_engine, threshold).await;
    });

    let server = Arc::new(Server::new(engine.clone(), Arc::new(identity)));
    let semaphore = Arc::new(Semaphore::new(cfg.max_connections));
    let max_connections = cfg.max_connections;

    let addr = cfg.addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("venuebook listening on {addr}");
    info!("  data_dir: {}", cfg.data_dir.display());
    info!("  venues: {}", engine.list_venues().len());
    info!("  tokens: {token_count}");
    info!("  max_connections: {max_connections}");
    info!("  metrics: {}", cfg.metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics")));

    // Graceful shutdown: stop accepting on SIGTERM/ctrl-c, drain in-flight connections
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => {}
                        _ = sigterm.recv() => {}
                    }
                }
                Err(e) => {
                    tracing::warn!("cannot listen for SIGTERM: {e}");
                    ctrl_c.await.ok();
                }
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
        }
    };
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (socket, peer) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::error!("accept error: {e}");
                        continue;
                    }
                };

                let permit = match semaphore.clone().try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => {
                        tracing::warn!("connection limit reached, rejecting {peer}");
                        metrics::counter!(venuebook::observability::CONNECTIONS_REJECTED_TOTAL).increment(1);
                        drop(socket);
                        continue;
                    }
                };

                info!("connection from {peer}");
                metrics::counter!(venuebook::observability::CONNECTIONS_TOTAL).increment(1);
                metrics::gauge!(venuebook::observability::CONNECTIONS_ACTIVE).increment(1.0);
                let srv = server.clone();

                tokio::spawn(async move {
                    let _permit = permit; // held until connection closes
                    if let Err(e) = server::process_connection(socket, srv).await {
                        tracing::error!("connection error from {peer}: {e}");
                    }
                    metrics::gauge!(venuebook::observability::CONNECTIONS_ACTIVE).decrement(1.0);
                });
            }
            _ = &mut shutdown => {
                info!("shutdown signal received, stopping accept loop");
                break;
            }
        }
    }

    // Wait for in-flight connections to finish (up to 10s)
    info!("draining connections...");
    let drain_deadline = tokio::time::sleep(std::time::Duration::from_secs(10));
    tokio::pin!(drain_deadline);

    loop {
        if semaphore.available_permits() == max_connections {
            info!("all connections drained");
            break;
        }
        tokio::select! {
            _ = &mut drain_deadline => {
                let remaining = max_connections - semaphore.available_permits();
                tracing::warn!("drain timeout, {remaining} connections still open");
                break;
            }
            _ = tokio::time::sleep(std::time::Duration::from_millis(100)) => {}
        }
    }

    info!("venuebook stopped");
    Ok(())
}
