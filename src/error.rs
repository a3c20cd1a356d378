//! Error types for x402 payment gating
//!
//! Every failure in this crate is an [`X402Error`]. Each variant maps to an HTTP
//! status and a stable `error` kind string so that interceptors can turn any
//! per-request failure into a JSON body instead of a server fault.

use crate::types::ErrorBody;
use http::StatusCode;
use thiserror::Error;

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, X402Error>;

/// Errors produced by x402 payment processing
#[derive(Debug, Error)]
pub enum X402Error {
    /// Bad or missing static configuration. Fatal at startup.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// The payment header could not be decoded
    #[error("Malformed payment payload: {message}")]
    MalformedPayload { message: String },

    /// The payload targets a different scheme or network than the gate
    #[error(
        "payment scheme/network mismatch: expected scheme={expected_scheme} network={expected_network}, got scheme={scheme} network={network}"
    )]
    SchemeMismatch {
        expected_scheme: String,
        expected_network: String,
        scheme: String,
        network: String,
    },

    /// Buyer-side spending cap refused the challenge
    #[error("Required payment amount {required} exceeds max allowed amount {allowed}")]
    AmountLimitExceeded { required: String, allowed: String },

    /// A challenge carried requirements the buyer cannot interpret
    #[error("Invalid payment requirements: {message}")]
    InvalidPaymentRequirements { message: String },

    /// The facilitator rejected the payment, or could not be asked
    #[error("payment verification failed: {reason}")]
    VerificationFailed { reason: String },

    /// The facilitator accepted the payment but could not settle it
    #[error("payment settlement failed: {reason}")]
    SettlementFailed { reason: String },

    /// The downstream handler or upstream server failed at the transport level
    #[error("Upstream transport error: {message}")]
    UpstreamTransport { message: String },

    /// The inbound request body could not be buffered
    #[error("Invalid request body: {message}")]
    RequestBody { message: String },

    /// A remote facilitator answered with an unexpected status
    #[error("Facilitator error: {message}")]
    Facilitator { message: String },

    #[error("Invalid signature: {message}")]
    InvalidSignature { message: String },

    #[error("Invalid authorization: {message}")]
    InvalidAuthorization { message: String },

    /// Nonce storage backend failure
    #[error("Storage error: {message}")]
    Storage { message: String },

    /// JSON-RPC call to a chain node failed
    #[error("Chain RPC error: {message}")]
    ChainRpc { message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl X402Error {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn malformed_payload(message: impl Into<String>) -> Self {
        Self::MalformedPayload {
            message: message.into(),
        }
    }

    pub fn scheme_mismatch(
        expected_scheme: impl Into<String>,
        expected_network: impl Into<String>,
        scheme: impl Into<String>,
        network: impl Into<String>,
    ) -> Self {
        Self::SchemeMismatch {
            expected_scheme: expected_scheme.into(),
            expected_network: expected_network.into(),
            scheme: scheme.into(),
            network: network.into(),
        }
    }

    pub fn amount_limit_exceeded(required: impl Into<String>, allowed: impl Into<String>) -> Self {
        Self::AmountLimitExceeded {
            required: required.into(),
            allowed: allowed.into(),
        }
    }

    pub fn invalid_payment_requirements(message: impl Into<String>) -> Self {
        Self::InvalidPaymentRequirements {
            message: message.into(),
        }
    }

    pub fn verification_failed(reason: impl Into<String>) -> Self {
        Self::VerificationFailed {
            reason: reason.into(),
        }
    }

    pub fn settlement_failed(reason: impl Into<String>) -> Self {
        Self::SettlementFailed {
            reason: reason.into(),
        }
    }

    pub fn upstream_transport(message: impl Into<String>) -> Self {
        Self::UpstreamTransport {
            message: message.into(),
        }
    }

    pub fn request_body(message: impl Into<String>) -> Self {
        Self::RequestBody {
            message: message.into(),
        }
    }

    pub fn facilitator_error(message: impl Into<String>) -> Self {
        Self::Facilitator {
            message: message.into(),
        }
    }

    pub fn invalid_signature(message: impl Into<String>) -> Self {
        Self::InvalidSignature {
            message: message.into(),
        }
    }

    pub fn invalid_authorization(message: impl Into<String>) -> Self {
        Self::InvalidAuthorization {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn chain_rpc(message: impl Into<String>) -> Self {
        Self::ChainRpc {
            message: message.into(),
        }
    }

    /// HTTP status this error is reported with
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MalformedPayload { .. }
            | Self::InvalidPaymentRequirements { .. }
            | Self::RequestBody { .. } => StatusCode::BAD_REQUEST,
            Self::SchemeMismatch { .. }
            | Self::AmountLimitExceeded { .. }
            | Self::VerificationFailed { .. }
            | Self::SettlementFailed { .. } => StatusCode::PAYMENT_REQUIRED,
            Self::UpstreamTransport { .. } | Self::Facilitator { .. } | Self::ChainRpc { .. } => {
                StatusCode::BAD_GATEWAY
            }
            Self::Config { .. }
            | Self::InvalidSignature { .. }
            | Self::InvalidAuthorization { .. }
            | Self::Storage { .. }
            | Self::Json(_)
            | Self::Http(_)
            | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable kind used as the `error` field of JSON bodies
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config_error",
            Self::MalformedPayload { .. } => "invalid_payment_payload",
            Self::SchemeMismatch { .. } => "scheme_mismatch",
            Self::AmountLimitExceeded { .. } => "amount_limit_exceeded",
            Self::InvalidPaymentRequirements { .. } => "invalid_payment_requirements",
            Self::VerificationFailed { .. } => "verification_failed",
            Self::SettlementFailed { .. } => "settlement_failed",
            Self::UpstreamTransport { .. } => "upstream_transport_error",
            Self::RequestBody { .. } => "invalid_request_body",
            Self::Facilitator { .. } => "facilitator_error",
            Self::InvalidSignature { .. } => "invalid_signature",
            Self::InvalidAuthorization { .. } => "invalid_authorization",
            Self::Storage { .. } => "storage_error",
            Self::ChainRpc { .. } => "chain_rpc_error",
            Self::Json(_) => "serialization_error",
            Self::Http(_) => "http_client_error",
            Self::Io(_) => "io_error",
        }
    }

    /// JSON body describing this error
    pub fn to_error_body(&self) -> ErrorBody {
        ErrorBody::new(self.kind(), self.to_string(), self.status_code())
    }
}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for X402Error {
    fn into_response(self) -> axum::response::Response {
        (self.status_code(), axum::Json(self.to_error_body())).into_response()
    }
}
