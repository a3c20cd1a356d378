//! Buyer gate
//!
//! Sits in front of an outbound call. When the downstream answers 402 with payment
//! requirements, the gate checks them against its spending cap, signs a payment
//! authorization and resends the original request with an `X-Payment` header.
//! Anything it cannot pay for is handed back as the original challenge.

use super::capture::{BufferedResponse, Inspection};
use crate::config::BuyerConfig;
use crate::crypto::NonceStrategy;
use crate::types::constants::DEFAULT_MAX_BODY_BYTES;
use crate::types::headers::X_PAYMENT;
use crate::types::{parse_amount, unix_timestamp, PaymentPayload, PaymentRequirements};
use crate::wallet::Wallet;
use crate::{Result, X402Error};
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::request::Parts;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use ethereum_types::U256;
use std::future::Future;
use std::sync::Arc;

/// Paying side of the payment flow
#[derive(Debug, Clone)]
pub struct BuyerGate {
    wallet: Arc<Wallet>,
    max_amount_pay: U256,
    max_retries: u32,
    nonce_strategy: NonceStrategy,
    max_body_bytes: usize,
}

impl BuyerGate {
    /// A gate paying from `wallet` up to `max_amount_pay` per request; zero disables the cap
    pub fn new(wallet: Wallet, max_amount_pay: U256) -> Self {
        Self {
            wallet: Arc::new(wallet),
            max_amount_pay,
            max_retries: 1,
            nonce_strategy: NonceStrategy::default(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn from_config(config: &BuyerConfig) -> Result<Self> {
        config.validate()?;
        let wallet = Wallet::from_private_key(&config.private_key)?;
        let max_amount_pay = parse_amount(&config.max_amount_pay)
            .map_err(|e| X402Error::config(format!("buyer: max_amount_pay: {e}")))?;
        Ok(Self::new(wallet, max_amount_pay)
            .with_max_retries(config.effective_max_retries())
            .with_nonce_strategy(config.nonce_strategy)
            .with_max_body_bytes(config.max_body_bytes))
    }

    /// Paid attempts per request; 0 is treated as 1
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    pub fn with_nonce_strategy(mut self, nonce_strategy: NonceStrategy) -> Self {
        self.nonce_strategy = nonce_strategy;
        self
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    /// Refuse requirements above the spending cap
    pub fn check_spending_cap(&self, requirements: &PaymentRequirements) -> Result<()> {
        if self.max_amount_pay.is_zero() {
            return Ok(());
        }
        let required = requirements.max_amount()?;
        if required > self.max_amount_pay {
            return Err(X402Error::amount_limit_exceeded(
                &requirements.max_amount_required,
                self.max_amount_pay.to_string(),
            ));
        }
        Ok(())
    }

    /// Sign a fresh payload for `requirements`
    pub fn create_payment_payload(
        &self,
        requirements: &PaymentRequirements,
    ) -> Result<PaymentPayload> {
        self.wallet
            .create_payment_payload(requirements, unix_timestamp(), self.nonce_strategy)
    }

    /// Send `request` through `next`, paying for it if challenged
    pub async fn handle<F, Fut>(&self, request: Request, next: F) -> Response
    where
        F: Fn(Request) -> Fut,
        Fut: Future<Output = Response>,
    {
        let (parts, body) = request.into_parts();
        let body = match axum::body::to_bytes(body, self.max_body_bytes).await {
            Ok(body) => body,
            Err(e) => return X402Error::request_body(e.to_string()).into_response(),
        };

        let pending = next(rebuild_request(&parts, body.clone(), None));
        let response = pending.await;
        let mut challenge = match BufferedResponse::capture(response, self.max_body_bytes).await {
            Ok(captured) => captured,
            Err(e) => return e.into_response(),
        };
        let mut requirements = match challenge.inspect() {
            Inspection::Passthrough => return challenge.into_response(),
            Inspection::Malformed(reason) => {
                tracing::warn!(uri = %parts.uri, reason = %reason, "Unreadable payment challenge");
                return challenge.into_response();
            }
            Inspection::Challenge(requirements) => *requirements,
        };

        for attempt in 1..=self.max_retries {
            if let Err(e) = requirements.max_amount() {
                tracing::warn!(
                    resource = %requirements.resource,
                    required = %requirements.max_amount_required,
                    error = %e,
                    "Unreadable payment amount, returning the challenge"
                );
                return challenge.into_response();
            }
            if let Err(error) = self.check_spending_cap(&requirements) {
                tracing::warn!(
                    resource = %requirements.resource,
                    required = %requirements.max_amount_required,
                    max_allowed = %self.max_amount_pay,
                    error = %error,
                    "Refusing payment"
                );
                return error.into_response();
            }

            let header = match self
                .create_payment_payload(&requirements)
                .and_then(|payload| payload.to_header_value())
            {
                Ok(header) => header,
                Err(e) => {
                    tracing::warn!(
                        resource = %requirements.resource,
                        error = %e,
                        "Failed to build payment, returning the challenge"
                    );
                    return challenge.into_response();
                }
            };

            tracing::info!(
                resource = %requirements.resource,
                network = %requirements.network,
                payer = %self.wallet.address_hex(),
                amount = %requirements.max_amount_required,
                attempt,
                "Paying for request"
            );

            let pending = next(rebuild_request(&parts, body.clone(), Some(header)));
            let retried = pending.await;
            if attempt == self.max_retries {
                return retried;
            }

            let captured = match BufferedResponse::capture(retried, self.max_body_bytes).await {
                Ok(captured) => captured,
                Err(e) => return e.into_response(),
            };
            match captured.inspect() {
                Inspection::Challenge(next_requirements) => {
                    requirements = *next_requirements;
                    challenge = captured;
                }
                _ => return captured.into_response(),
            }
        }

        challenge.into_response()
    }
}

fn rebuild_request(parts: &Parts, body: Bytes, payment: Option<HeaderValue>) -> Request {
    let mut request = Request::new(Body::from(body));
    *request.method_mut() = parts.method.clone();
    *request.uri_mut() = parts.uri.clone();
    *request.version_mut() = parts.version;
    *request.headers_mut() = parts.headers.clone();
    *request.extensions_mut() = parts.extensions.clone();
    if let Some(payment) = payment {
        request.headers_mut().insert(X_PAYMENT, payment);
    }
    request
}

/// Axum middleware for [`BuyerGate`]
pub async fn buyer_middleware(
    State(gate): State<BuyerGate>,
    request: Request,
    next: Next,
) -> Response {
    gate.handle(request, move |request| next.clone().run(request))
        .await
}
