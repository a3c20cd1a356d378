//! Seller gate
//!
//! Guards a resource behind a payment. A request without an `X-Payment` header gets
//! a 402 challenge. A request with one is decoded, checked against the configured
//! scheme and network, verified and then settled through the [`Facilitator`]. Only a
//! settled payment reaches the downstream handler.

use crate::config::SellerConfig;
use crate::facilitator::Facilitator;
use crate::requirements::RequirementsBuilder;
use crate::types::headers::{X_PAYMENT, X_PAYMENT_REQUIRED, X_PAYMENT_RESPONSE};
use crate::types::{
    NetworkTable, PaymentPayload, PaymentRequiredBody, PaymentRequirements, SettleResponse,
};
use crate::{Result, X402Error};
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use std::future::Future;
use std::sync::Arc;

/// Outcome of inspecting a request's payment header
#[derive(Debug)]
pub enum SellerDecision {
    /// No payment offered; answer with these requirements
    Challenge(PaymentRequirements),
    /// Payment offered but refused
    Rejected(X402Error),
    /// Payment verified and settled
    Paid(SettleResponse),
}

/// Payment gate in front of one resource
#[derive(Clone)]
pub struct SellerGate {
    config: Arc<SellerConfig>,
    requirements: RequirementsBuilder,
    facilitator: Arc<dyn Facilitator>,
}

impl std::fmt::Debug for SellerGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SellerGate")
            .field("config", &self.config)
            .finish()
    }
}

impl SellerGate {
    /// Build a gate; fails if the config cannot produce requirements
    pub fn new(
        config: SellerConfig,
        networks: Arc<NetworkTable>,
        facilitator: Arc<dyn Facilitator>,
    ) -> Result<Self> {
        config.validate()?;
        let gate = Self {
            config: Arc::new(config),
            requirements: RequirementsBuilder::new(networks),
            facilitator,
        };
        gate.payment_requirements()?;
        Ok(gate)
    }

    pub fn config(&self) -> &SellerConfig {
        &self.config
    }

    /// Requirements advertised in challenges and sent to the facilitator
    pub fn payment_requirements(&self) -> Result<PaymentRequirements> {
        let config = &self.config;
        self.requirements.build(
            &config.resource,
            &config.description,
            &config.network,
            &config.pay_to,
            &config.max_amount_required,
        )
    }

    /// Decide what to do with a request carrying `headers`
    pub async fn evaluate(&self, headers: &HeaderMap) -> SellerDecision {
        let requirements = match self.payment_requirements() {
            Ok(requirements) => requirements,
            Err(e) => return SellerDecision::Rejected(e),
        };

        let Some(header) = headers.get(X_PAYMENT) else {
            return SellerDecision::Challenge(requirements);
        };

        let payload = match PaymentPayload::from_header_value(header) {
            Ok(payload) => payload,
            Err(e) => return SellerDecision::Rejected(e),
        };

        if payload.scheme != self.config.scheme || payload.network != self.config.network {
            return SellerDecision::Rejected(X402Error::scheme_mismatch(
                &self.config.scheme,
                &self.config.network,
                &payload.scheme,
                &payload.network,
            ));
        }

        match self.facilitator.verify(&payload, &requirements).await {
            Ok(verification) if verification.is_valid => {}
            Ok(verification) => {
                let reason = verification
                    .invalid_reason
                    .unwrap_or_else(|| "payment is not valid".to_string());
                return SellerDecision::Rejected(X402Error::verification_failed(reason));
            }
            Err(e) => {
                return SellerDecision::Rejected(X402Error::verification_failed(e.to_string()))
            }
        }

        match self.facilitator.settle(&payload, &requirements).await {
            Ok(settlement) if settlement.success => SellerDecision::Paid(settlement),
            Ok(settlement) => {
                let reason = settlement
                    .error_reason
                    .unwrap_or_else(|| "settlement was not successful".to_string());
                SellerDecision::Rejected(X402Error::settlement_failed(reason))
            }
            Err(e) => SellerDecision::Rejected(X402Error::settlement_failed(e.to_string())),
        }
    }

    /// Gate `request`, calling `next` only for a settled payment
    pub async fn handle<F, Fut>(&self, request: Request, next: F) -> Response
    where
        F: FnOnce(Request) -> Fut,
        Fut: Future<Output = Response>,
    {
        match self.evaluate(request.headers()).await {
            SellerDecision::Challenge(requirements) => {
                tracing::info!(
                    resource = %requirements.resource,
                    network = %requirements.network,
                    required = %requirements.max_amount_required,
                    "Payment required"
                );
                challenge_response(requirements)
            }
            SellerDecision::Rejected(error) => {
                tracing::warn!(
                    resource = %self.config.resource,
                    network = %self.config.network,
                    error = %error,
                    "Payment rejected"
                );
                error.into_response()
            }
            SellerDecision::Paid(settlement) => {
                tracing::info!(
                    resource = %self.config.resource,
                    network = %settlement.network,
                    payer = settlement.payer.as_deref().unwrap_or_default(),
                    transaction = %settlement.transaction,
                    "Payment settled"
                );
                let mut response = next(request).await;
                if self.config.settlement_header {
                    attach_settlement(&mut response, &settlement);
                }
                response
            }
        }
    }
}

/// The 402 challenge for `requirements`
pub fn challenge_response(requirements: PaymentRequirements) -> Response {
    let mut response = (
        StatusCode::PAYMENT_REQUIRED,
        Json(PaymentRequiredBody::new(requirements)),
    )
        .into_response();
    response
        .headers_mut()
        .insert(X_PAYMENT_REQUIRED, HeaderValue::from_static("true"));
    response
}

fn attach_settlement(response: &mut Response, settlement: &SettleResponse) {
    let encoded = match settlement.to_base64() {
        Ok(encoded) => encoded,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to encode settlement receipt");
            return;
        }
    };
    match HeaderValue::from_str(&encoded) {
        Ok(value) => {
            response.headers_mut().insert(X_PAYMENT_RESPONSE, value);
        }
        Err(e) => tracing::warn!(error = %e, "Settlement receipt is not a valid header"),
    }
}

/// Axum middleware for [`SellerGate`]
///
/// ```no_run
/// use axum::{middleware, routing::get, Router};
/// use x402_pay::middleware::{seller_middleware, SellerGate};
///
/// # fn example(gate: SellerGate) {
/// let app: Router = Router::new()
///     .route("/weather", get(|| async { "sunny" }))
///     .layer(middleware::from_fn_with_state(gate, seller_middleware));
/// # }
/// ```
pub async fn seller_middleware(
    State(gate): State<SellerGate>,
    request: Request,
    next: Next,
) -> Response {
    gate.handle(request, |request| next.run(request)).await
}
