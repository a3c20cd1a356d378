//! Buffered downstream responses
//!
//! The buyer gate has to look at a downstream response before deciding whether to
//! pass it on. [`BufferedResponse`] reads the whole response into memory, reports
//! whether it is a payment challenge, and can be turned back into a response that
//! is byte-for-byte what the downstream produced.

use crate::types::PaymentRequirements;
use crate::{Result, X402Error};
use axum::body::Body;
use axum::http::{HeaderMap, StatusCode, Version};
use axum::response::Response;
use bytes::Bytes;
use serde::Deserialize;

/// A fully read downstream response
#[derive(Debug, Clone)]
pub struct BufferedResponse {
    pub status: StatusCode,
    pub version: Version,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// What a buffered response means to the buyer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inspection {
    /// Not a 402; hand it back unchanged
    Passthrough,
    /// A 402 carrying payment requirements
    Challenge(Box<PaymentRequirements>),
    /// A 402 whose body does not carry usable requirements
    Malformed(String),
}

#[derive(Deserialize)]
struct ChallengeEnvelope {
    #[serde(rename = "paymentRequirements")]
    payment_requirements: PaymentRequirements,
}

impl BufferedResponse {
    /// Read `response` into memory, failing if the body exceeds `limit` bytes
    pub async fn capture(response: Response, limit: usize) -> Result<Self> {
        let (parts, body) = response.into_parts();
        let body = axum::body::to_bytes(body, limit).await.map_err(|e| {
            X402Error::upstream_transport(format!("failed to read downstream response: {e}"))
        })?;
        Ok(Self {
            status: parts.status,
            version: parts.version,
            headers: parts.headers,
            body,
        })
    }

    pub fn is_payment_required(&self) -> bool {
        self.status == StatusCode::PAYMENT_REQUIRED
    }

    pub fn inspect(&self) -> Inspection {
        if !self.is_payment_required() {
            return Inspection::Passthrough;
        }
        match serde_json::from_slice::<ChallengeEnvelope>(&self.body) {
            Ok(envelope) => Inspection::Challenge(Box::new(envelope.payment_requirements)),
            Err(e) => Inspection::Malformed(e.to_string()),
        }
    }

    /// Rebuild the response exactly as captured
    pub fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.version_mut() = self.version;
        *response.headers_mut() = self.headers;
        response
    }
}
