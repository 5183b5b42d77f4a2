use std::sync::Arc;

use lingua_progress::config::Config;
use lingua_progress::logging::{init_tracing, LoggingConfig};
use lingua_progress::progression::ProgressionService;
use lingua_progress::store::{MemoryStore, PgStore, ProgressStore};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let _log_guard = init_tracing(&LoggingConfig::from_env());
    let config = Config::from_env();

    let store: Arc<dyn ProgressStore> = match config.database.as_ref() {
        Some(db) => match PgStore::connect(db).await {
            Ok(pg) => {
                if let Err(err) = pg.migrate().await {
                    tracing::error!(error = %err, "database migration failed");
                    std::process::exit(1);
                }
                Arc::new(pg)
            }
            Err(err) => {
                tracing::error!(error = %err, "database connection failed");
                std::process::exit(1);
            }
        },
        None => {
            tracing::warn!("DATABASE_URL not set, progress is kept in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    let service = Arc::new(ProgressionService::new(store, config.engine.clone()));
    let app = lingua_progress::create_app(service);

    let addr = config.bind_addr();
    tracing::info!(%addr, "lingua-progress listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("bind listener failed");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "server error");
    }

    tracing::info!("Graceful shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
