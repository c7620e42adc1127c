use std::sync::Arc;

use platen_core::gcode::GcodeHeaderAnalyzer;
use platen_server::bus::EventBus;
use platen_server::config::Config;
use platen_server::dispatcher::Dispatcher;
use platen_server::identity::IdentityProvider;
use platen_server::state::AppState;
use platen_server::storage::FileStore;
use platen_server::watchdog::Watchdog;
use platen_server::{bootstrap, routes};
use sea_orm_migration::MigratorTrait;

const EXIT_CONFIG: i32 = 1;
const EXIT_DATABASE: i32 = 2;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("configuration error: {err}");
            std::process::exit(EXIT_CONFIG);
        }
    };

    let default_filter = cfg.env_filter_directive();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    let state = match init(&cfg).await {
        Ok(state) => state,
        Err(err) => {
            tracing::error!(%err, "database initialisation failed");
            std::process::exit(EXIT_DATABASE);
        }
    };

    if let Some(interval) = cfg.watchdog_interval {
        Watchdog::new(state.dispatcher.clone(), interval).spawn();
    }

    let app = routes::router(state);
    let addr = cfg.bind_addr;
    tracing::info!(%addr, "platen-server HTTP listening");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(%err, %addr, "failed to bind");
            std::process::exit(EXIT_CONFIG);
        }
    };

    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(%err, "server error");
    }
}

async fn init(cfg: &Config) -> anyhow::Result<AppState> {
    let db = platen_db::connect(&cfg.database_url).await?;

    // Apply migrations on boot (idempotent), then seed catalogs once.
    platen_migration::Migrator::up(&db, None).await?;
    let catalog = bootstrap::run(&db).await?;

    if cfg.event_bus_queue.is_some() {
        tracing::warn!("PLATEN_EVENT_BUS_QUEUE is set but only the in-process bus is available");
    }

    let db = Arc::new(db);
    let bus = EventBus::new();
    let catalog = Arc::new(catalog);
    let dispatcher = Dispatcher::new(db.clone(), bus.clone(), catalog.clone());
    let identity = IdentityProvider::from_config(cfg)
        .map_err(|e| anyhow::anyhow!("identity provider: {e}"))?;
    let store = FileStore::open(cfg.file_storage_dir.clone()).await?;

    Ok(AppState {
        db,
        cfg: Arc::new(cfg.clone()),
        identity: Arc::new(identity),
        store,
        analyzer: Arc::new(GcodeHeaderAnalyzer::new()),
        bus,
        dispatcher,
        catalog,
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received");
}
