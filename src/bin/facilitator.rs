//! X402 Facilitator Server
//!
//! A standalone facilitator that verifies EIP-3009 authorizations and settles them on
//! chain. Sellers reach it through `FacilitatorClient`.
//!
//! ## Environment
//!
//! - `X402_CONFIG`: path to the JSON configuration (needs a `facilitator` section and
//!   at least one entry in `chain_networks`)
//! - `BIND_ADDRESS`: overrides `bind_address` from the file
//! - `STORAGE_BACKEND`: `memory` (default) or `redis`
//! - `REDIS_URL`, `REDIS_KEY_PREFIX`: Redis settings when `STORAGE_BACKEND=redis`
//!
//! ## Storage Backends
//!
//! - **In-Memory**: Default storage (settled nonces are lost on restart)
//! - **Redis**: Persistent storage (enable with `redis` feature)

use std::env;
use std::sync::Arc;

use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use x402_pay::{
    config::GatewayConfig,
    facilitator::{Facilitator, LocalFacilitator},
    facilitator_storage::{InMemoryStorage, NonceStorage},
    server::facilitator_router,
    X402Error,
};

#[cfg(feature = "redis")]
use x402_pay::facilitator_storage::redis_storage::RedisStorage;

async fn storage_from_env() -> x402_pay::Result<Arc<dyn NonceStorage>> {
    let backend = env::var("STORAGE_BACKEND").unwrap_or_else(|_| "memory".to_string());
    match backend.as_str() {
        "memory" => {
            tracing::info!("Using in-memory nonce storage");
            Ok(Arc::new(InMemoryStorage::new()))
        }
        #[cfg(feature = "redis")]
        "redis" => {
            let redis_url =
                env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
            let key_prefix = env::var("REDIS_KEY_PREFIX").ok();
            tracing::info!(redis_url = %redis_url, "Using Redis nonce storage");
            let storage = RedisStorage::new(&redis_url, key_prefix.as_deref()).await?;
            Ok(Arc::new(storage))
        }
        #[cfg(not(feature = "redis"))]
        "redis" => Err(X402Error::config(
            "Redis storage requested but the 'redis' feature is not enabled; \
             rebuild with --features redis",
        )),
        other => Err(X402Error::config(format!(
            "unknown STORAGE_BACKEND {other}, expected memory or redis"
        ))),
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let path = env::var("X402_CONFIG").map_err(|_| X402Error::config("X402_CONFIG is not set"))?;
    let config = GatewayConfig::from_file(&path)?;
    let facilitator_config = config
        .facilitator
        .as_ref()
        .ok_or_else(|| X402Error::config(format!("{path}: facilitator section is required")))?;

    let networks = config.network_table()?;
    let storage = storage_from_env().await?;
    let facilitator: Arc<dyn Facilitator> = Arc::new(LocalFacilitator::from_config(
        facilitator_config,
        networks.clone(),
        storage,
    )?);

    let app = facilitator_router(facilitator).layer(TraceLayer::new_for_http());

    let bind_address = env::var("BIND_ADDRESS").unwrap_or(config.bind_address);
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!(
        bind_address = %bind_address,
        networks = ?networks.names(),
        "Facilitator listening: POST /verify, POST /settle, GET /supported, GET /health"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
