use serde::Deserialize;
use sqlx::PgPool;
use stammtisch_cache::{Cache, RedisCache};
use stammtisch_common::snowflake::{ProcessId, WorkerId};
use stammtisch_db::client::DbClient;
use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::Duration,
};
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod server;

use server::{ServerState, feed::FeedService};

#[derive(Debug, Error)]
enum InitError {
    #[error("Error parsing .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),
    #[error("Error parsing environment: {0}")]
    Envy(#[from] envy::Error),
    #[error("Error connecting to the database: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Error running migrations: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("Error binding tcp listener: {0}")]
    TcpBind(std::io::Error),
    #[error("Error serving server: {0}")]
    TcpServe(std::io::Error),
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
struct Env {
    server_address: IpAddr,
    server_port: u16,
    database_url: String,
    worker_id: WorkerId,
    process_id: ProcessId,
    redis_url: Option<String>,
    #[serde(default = "default_feed_cache_ttl_seconds")]
    feed_cache_ttl_seconds: u64,
}

fn default_feed_cache_ttl_seconds() -> u64 {
    5
}

fn install_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "stammtisch_api=debug,stammtisch_common=debug,stammtisch_db=debug,\
                stammtisch_cache=debug,tower_http=debug,axum::rejection=trace,sqlx=debug"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn get_env() -> Result<Env, InitError> {
    if let Err(e) = dotenvy::dotenv() {
        if e.not_found() {
            debug!("No .dotenv file found");
        } else {
            return Err(e.into());
        }
    }

    envy::from_env().map_err(InitError::from)
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutting down");
    }
}

#[tokio::main]
async fn main() -> Result<(), InitError> {
    install_tracing();
    let env = get_env()?;

    let pool = PgPool::connect(&env.database_url).await?;
    let db_client = Arc::new(DbClient::new(pool, env.worker_id, env.process_id));
    db_client.run_migrations().await?;

    let cache: Arc<dyn Cache> = Arc::new(RedisCache::connect(env.redis_url.as_deref()).await);
    let feed = Arc::new(FeedService::new(
        db_client.clone(),
        cache.clone(),
        Duration::from_secs(env.feed_cache_ttl_seconds),
    ));

    let state = ServerState {
        db_client,
        feed,
        cache,
    };

    let tracing_layer = TraceLayer::new_for_http();
    let app = server::routes().with_state(state).layer(tracing_layer);

    let server_address = SocketAddr::new(env.server_address, env.server_port);
    let listener = tokio::net::TcpListener::bind(server_address)
        .await
        .map_err(InitError::TcpBind)?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(InitError::TcpServe)?;

    Ok(())
}
