//! X402 Gateway
//!
//! Fronts an upstream HTTP service with a seller gate, a buyer gate, or both.
//!
//! - **Seller**: callers must pay for the configured resource before the request is
//!   forwarded upstream
//! - **Buyer**: payment challenges from the upstream are answered with the configured
//!   key and the request is resent
//!
//! With both configured the seller runs first, so an inbound payment is settled
//! before the gateway pays the upstream.
//!
//! ## Environment
//!
//! - `X402_CONFIG`: path to the JSON configuration
//! - `BIND_ADDRESS`: overrides `bind_address` from the file

use std::env;
use std::sync::Arc;

use axum::{middleware, Router};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use x402_pay::{
    config::GatewayConfig,
    facilitator::{Facilitator, FacilitatorClient, LocalFacilitator},
    facilitator_storage::InMemoryStorage,
    middleware::{buyer_middleware, seller_middleware, BuyerGate, SellerGate},
    proxy::{proxy_handler, UpstreamProxy},
    types::{FacilitatorConfig, NetworkTable},
    X402Error,
};

/// Facilitator the seller settles through: in process when a key is configured,
/// otherwise the remote service at `facilitator_url`
fn build_facilitator(
    config: &GatewayConfig,
    networks: &Arc<NetworkTable>,
) -> x402_pay::Result<Arc<dyn Facilitator>> {
    if let Some(local) = &config.facilitator {
        tracing::info!("Settling payments in process");
        let storage = Arc::new(InMemoryStorage::new());
        let facilitator = LocalFacilitator::from_config(local, networks.clone(), storage)?;
        return Ok(Arc::new(facilitator));
    }
    let url = config
        .facilitator_url
        .as_deref()
        .ok_or_else(|| X402Error::config("seller: a facilitator or facilitator_url is required"))?;
    tracing::info!(facilitator_url = %url, "Settling payments through remote facilitator");
    Ok(Arc::new(FacilitatorClient::new(FacilitatorConfig::new(url))?))
}

fn build_app(config: &GatewayConfig) -> x402_pay::Result<Router> {
    let networks = config.network_table()?;
    let upstream = config
        .upstream
        .as_deref()
        .ok_or_else(|| X402Error::config("upstream is required"))?;
    let proxy = Arc::new(UpstreamProxy::new(upstream, config.max_body_bytes)?);

    let mut app = Router::new().fallback(proxy_handler).with_state(proxy);

    if let Some(buyer) = &config.buyer {
        let gate = BuyerGate::from_config(buyer)?;
        tracing::info!(
            payer = %gate.wallet().address_hex(),
            max_amount_pay = %buyer.max_amount_pay,
            max_retries = buyer.effective_max_retries(),
            "Buyer gate enabled"
        );
        app = app.layer(middleware::from_fn_with_state(gate, buyer_middleware));
    }

    if let Some(seller) = &config.seller {
        let facilitator = build_facilitator(config, &networks)?;
        let gate = SellerGate::new(seller.clone(), networks.clone(), facilitator)?;
        tracing::info!(
            network = %seller.network,
            resource = %seller.resource,
            pay_to = %seller.pay_to,
            required = %seller.max_amount_required,
            "Seller gate enabled"
        );
        app = app.layer(middleware::from_fn_with_state(gate, seller_middleware));
    }

    Ok(app.layer(TraceLayer::new_for_http()))
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
    if config.seller.is_none() && config.buyer.is_none() {
        return Err(X402Error::config(format!(
            "{path}: the gateway needs a seller or a buyer section; \
             run the facilitator binary for a facilitator-only setup"
        ))
        .into());
    }

    let app = build_app(&config)?;

    let bind_address = env::var("BIND_ADDRESS").unwrap_or_else(|_| config.bind_address.clone());
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!(
        bind_address = %bind_address,
        upstream = config.upstream.as_deref().unwrap_or_default(),
        "Gateway listening"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
