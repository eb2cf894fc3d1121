//! Warden API server binary.
//!
//! Connects to PostgreSQL and the cache, migrates, seeds the default roles
//! and permissions, then serves the HTTP API until Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use warden_api::config::ApiConfig;
use warden_core::auth::TokenService;
use warden_core::cache::CacheStore;
use warden_core::cache::memory::MemoryCacheStore;
use warden_core::rbac::seed_default_rbac;
use warden_core::repo::{Repositories, Resources};
use warden_core::store::postgres::PgStorage;

/// CLI arguments for the API server.
///
/// Everything else comes from the environment (see `ApiConfig::from_env`);
/// flags given here take precedence.
#[derive(Parser, Debug)]
#[command(name = "warden_api_server", about = "Warden RBAC API server")]
struct Args {
    /// Address to listen on (`BIND_ADDR`).
    #[arg(long)]
    bind_addr: Option<String>,

    /// PostgreSQL connection URL (`DATABASE_URL`).
    #[arg(long)]
    database_url: Option<String>,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 10)]
    max_connections: u32,

    /// Redis URL for the shared cache (`REDIS_URL`). Without it an
    /// in-process cache is used.
    #[arg(long)]
    redis_url: Option<String>,

    /// Disable entity caching (`CACHE_DISABLED`). Refresh tokens still use
    /// the session store.
    #[arg(long, default_value_t = false)]
    cache_disabled: bool,

    /// PEM private key used to sign tokens (`JWT_PRIVATE_KEY_PATH`); its
    /// type picks the algorithm.
    #[arg(long)]
    jwt_private_key_path: Option<String>,
}

impl Args {
    fn apply(self, mut config: ApiConfig) -> ApiConfig {
        if let Some(addr) = self.bind_addr {
            config.bind_addr = addr;
        }
        if let Some(url) = self.database_url {
            config.pg_connection_url = url;
        }
        if self.redis_url.is_some() {
            config.redis_url = self.redis_url;
        }
        config.cache_disabled |= self.cache_disabled;
        if self.jwt_private_key_path.is_some() {
            config.jwt_private_key_path = self.jwt_private_key_path;
        }
        config
    }
}

#[cfg(feature = "redis")]
async fn shared_cache(url: &str) -> Result<Arc<dyn CacheStore>, Box<dyn std::error::Error>> {
    let store = warden_core::cache::redis::RedisCacheStore::connect(url).await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "redis"))]
async fn shared_cache(_url: &str) -> Result<Arc<dyn CacheStore>, Box<dyn std::error::Error>> {
    Err("REDIS_URL is set but this build lacks the `redis` feature".into())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,warden_api=debug,warden_core=debug".into()),
        )
        .init();

    let args = Args::parse();
    let max_connections = args.max_connections;
    let config = args.apply(ApiConfig::from_env());
    let key_path = config
        .jwt_private_key_path
        .clone()
        .ok_or("JWT_PRIVATE_KEY_PATH or --jwt-private-key-path is required")?;

    info!(bind_addr = %config.bind_addr, "starting warden_api_server");

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&config.pg_connection_url)
        .await?;

    info!("running database migrations");
    warden_api::migrate(&pool).await?;

    let store: Arc<dyn CacheStore> = match config.redis_url.as_deref() {
        Some(url) => {
            info!("using redis cache");
            shared_cache(url).await?
        }
        None => {
            info!("using in-process cache");
            Arc::new(MemoryCacheStore::new())
        }
    };
    let entity_cache = (!config.cache_disabled).then(|| store.clone());
    if entity_cache.is_none() {
        info!("entity caching disabled");
    }
    let resources =
        Resources::new(Arc::new(PgStorage::new(pool)), entity_cache).with_sessions(store);

    let tokens = TokenService::load_signing_material(&key_path)?;
    info!(algorithm = tokens.algorithm().as_str(), "signing key loaded");

    let report = seed_default_rbac(&Repositories::new(&resources)).await?;
    info!(
        permissions = report.permissions,
        roles = report.roles,
        grants = report.grants,
        "default rbac seeded"
    );

    let state = warden_api::AppState::new(&resources, Arc::new(tokens), &config);
    let app = warden_api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %listener.local_addr()?, "REST API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
