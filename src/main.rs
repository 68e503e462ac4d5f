use std::sync::Arc;

use anyhow::Result;
use tokio::{net::TcpListener, signal};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use smart_salle_service::{
    api,
    config::{Config, DocumentStoreKind},
    context::AppContext,
    db::{self, DocumentStore, MemoryDocumentStore, PgDocumentStore},
    monitor::SensorMonitor,
    realtime::RealtimeClient,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env (ignore error if file absent, env vars may be set externally)
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;

    let documents: Arc<dyn DocumentStore> = match &config.document_store {
        DocumentStoreKind::Postgres { database_url } => {
            let pool = db::create_pool(database_url).await?;
            db::run_migrations(&pool).await?;
            info!("Database ready");
            Arc::new(PgDocumentStore::new(pool))
        }
        DocumentStoreKind::Memory => {
            warn!("Using in-memory document store, data is lost on restart");
            Arc::new(MemoryDocumentStore::new())
        }
    };

    let realtime = Arc::new(RealtimeClient::new(&config));
    let ctx = AppContext::new(documents, realtime);

    // Cancelled on shutdown so every sensor stream is released
    let shutdown = CancellationToken::new();

    let monitor = if config.monitored_rooms.is_empty() {
        info!("No monitored rooms configured");
        None
    } else {
        let monitor = SensorMonitor::new(ctx.clone(), config.monitored_rooms.clone());
        Some(tokio::spawn(monitor.run(shutdown.clone())))
    };

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "HTTP server listening");

    axum::serve(listener, api::router(ctx))
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    if let Some(handle) = monitor {
        if let Err(e) = handle.await {
            error!(error = %e, "Sensor monitor task failed");
        }
    }

    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
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
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
    shutdown.cancel();
}
