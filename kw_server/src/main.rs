//! Keyward identity server.
//!
//! Wires the PostgreSQL store, the shared cache and the notification
//! publisher into an identity service and serves it over HTTP.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Error};
use keyward::{
    CallContext, EventDispatcher, IdentityController, IdentityService,
    cache::{DistributedCache, MemoryCache, RedisCache},
    db::Database,
    events::MemoryPublisher,
};
use kw_server::{
    api::{self, AppState, CookieSettings},
    config::{ServerConfig, ServerOverrides},
    logging, metrics,
};
use pico_args::Arguments;
use tracing::{info, warn};

const HELP: &str = "\
Run the keyward identity server

USAGE:
  kw_server [OPTIONS]

OPTIONS:
  --bind       IP:PORT     Server socket bind address  [default: env SERVER_BIND or 127.0.0.1:6969]
  --db-url     URL         Database connection string  [default: env DATABASE_URL]
  --cache-url  URL         Redis URL for the shared cache  [default: env CACHE_URL or in-process]
  --metrics    IP:PORT     Prometheus scrape address  [default: env METRICS_BIND or disabled]

FLAGS:
  -h, --help               Print help information

ENVIRONMENT:
  SERVER_BIND              Server bind address (e.g., 0.0.0.0:8080)
  DATABASE_URL             PostgreSQL connection string
  CACHE_URL                Redis connection string
  PASSWORD_PEPPER          Password hashing pepper
  (See .env file for all configuration options)
";

/// How often the notification failure gauge is refreshed
const GAUGE_INTERVAL: Duration = Duration::from_secs(15);

fn parse_overrides(mut pargs: Arguments) -> Result<ServerOverrides, Error> {
    Ok(ServerOverrides {
        bind: pargs.opt_value_from_str::<_, SocketAddr>("--bind")?,
        database_url: pargs.opt_value_from_str("--db-url")?,
        cache_url: pargs.opt_value_from_str("--cache-url")?,
        metrics_bind: pargs.opt_value_from_str::<_, SocketAddr>("--metrics")?,
    })
}

async fn shared_cache(config: &ServerConfig) -> Result<Arc<dyn DistributedCache>, Error> {
    match &config.cache_url {
        Some(url) => {
            let cache = RedisCache::connect(url, &config.cache_prefix)
                .await
                .context("Failed to connect to the shared cache")?;
            info!("Shared cache connected");
            Ok(Arc::new(cache))
        }
        None => {
            warn!("CACHE_URL not set; using the in-process cache (single instance only)");
            Ok(Arc::new(MemoryCache::new()))
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        return Ok(());
    }

    logging::init();

    let config = ServerConfig::from_env(parse_overrides(pargs)?)?;
    info!("Starting keyward identity server at {}", config.bind);

    if let Some(addr) = config.metrics_bind {
        metrics::init_metrics(addr).map_err(anyhow::Error::msg)?;
        info!("Metrics exported at http://{}/metrics", addr);
    }

    let db = Database::new(&config.database)
        .await
        .context("Failed to connect to database")?;
    info!("Database connected successfully");

    let cache = shared_cache(&config).await?;
    let store = Arc::new(db.identity_store());
    let controller = IdentityController::new(&config.identity, store, cache)?;

    let publisher = Arc::new(MemoryPublisher::new());
    let dispatcher = EventDispatcher::new(publisher);
    let service = Arc::new(IdentityService::new(controller, dispatcher.clone()));

    let admin = service
        .bootstrap_admin_role(&CallContext::new())
        .await
        .context("Failed to bootstrap the admin role")?;
    info!("Admin role '{}' ready ({})", admin.title, admin.id);

    let gauge = tokio::spawn(async move {
        let mut interval = tokio::time::interval(GAUGE_INTERVAL);
        loop {
            interval.tick().await;
            metrics::notification_failures(dispatcher.failures());
        }
    });

    let state = AppState::new(
        service,
        CookieSettings {
            name: config.identity.session_cookie_name.clone(),
            secure: config.secure_cookies,
        },
    );
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind))?;

    info!(
        "Server is running at http://{}. Press Ctrl+C to stop.",
        config.bind
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutting down server...");
    gauge.abort();
    db.close().await;

    Ok(())
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}
