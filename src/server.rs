//! Facilitator HTTP API
//!
//! Exposes any [`Facilitator`] over the JSON API that [`FacilitatorClient`] speaks:
//! `POST /verify`, `POST /settle`, `GET /supported` and `GET /health`.
//!
//! [`FacilitatorClient`]: crate::facilitator::FacilitatorClient

use crate::facilitator::Facilitator;
use crate::types::{
    SettleRequest, SettleResponse, SupportedKinds, VerifyRequest, VerifyResponse, X402_VERSION,
};
use crate::X402Error;
use axum::extract::State;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

type SharedFacilitator = Arc<dyn Facilitator>;

/// Router serving the facilitator API
pub fn facilitator_router(facilitator: SharedFacilitator) -> Router {
    Router::new()
        .route("/verify", post(verify_handler))
        .route("/settle", post(settle_handler))
        .route("/supported", get(supported_handler))
        .route("/health", get(health_handler))
        .with_state(facilitator)
}

fn check_version(version: u32) -> Result<(), X402Error> {
    if version != X402_VERSION {
        return Err(X402Error::invalid_payment_requirements(format!(
            "unsupported x402 version {version}"
        )));
    }
    Ok(())
}

async fn verify_handler(
    State(facilitator): State<SharedFacilitator>,
    Json(request): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, X402Error> {
    check_version(request.x402_version)?;
    let response = facilitator
        .verify(&request.payment_payload, &request.payment_requirements)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Verification error");
            e
        })?;
    Ok(Json(response))
}

async fn settle_handler(
    State(facilitator): State<SharedFacilitator>,
    Json(request): Json<SettleRequest>,
) -> Result<Json<SettleResponse>, X402Error> {
    check_version(request.x402_version)?;
    let response = facilitator
        .settle(&request.payment_payload, &request.payment_requirements)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Settlement error");
            e
        })?;
    Ok(Json(response))
}

async fn supported_handler(
    State(facilitator): State<SharedFacilitator>,
) -> Result<Json<SupportedKinds>, X402Error> {
    Ok(Json(facilitator.supported().await?))
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": crate::VERSION,
        "x402_version": X402_VERSION,
    }))
}
