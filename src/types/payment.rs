//! Payment-related types and the payment payload codec

use super::constants::{PAYMENT_REQUIRED_ERROR, PAYMENT_REQUIRED_MESSAGE};
use crate::{Result, X402Error};
use ethereum_types::U256;
use http::{HeaderValue, StatusCode};
use serde::{Deserialize, Serialize};

/// x402 protocol version
pub const X402_VERSION: u32 = 1;

/// Current unix time in seconds
pub fn unix_timestamp() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

/// Parse a non-negative decimal integer in smallest token units
pub fn parse_amount(value: &str) -> Result<U256> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(X402Error::invalid_payment_requirements(format!(
            "amount must be a non-negative integer, got {value:?}"
        )));
    }
    U256::from_dec_str(value).map_err(|e| {
        X402Error::invalid_payment_requirements(format!("amount {value:?} is out of range: {e}"))
    })
}

/// Token metadata the buyer needs to sign an authorization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetExtra {
    /// EIP-712 domain name of the token
    pub name: String,
    /// EIP-712 domain version of the token
    pub version: String,
    #[serde(rename = "chainId")]
    pub chain_id: u64,
}

/// Payment requirements for a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequirements {
    /// Payment scheme identifier (e.g., "exact")
    pub scheme: String,
    /// Logical network name
    pub network: String,
    /// Opaque identifier of the protected resource
    pub resource: String,
    /// Human-readable description of the resource
    #[serde(default)]
    pub description: String,
    /// Recipient wallet address for the payment
    #[serde(rename = "payTo")]
    pub pay_to: String,
    /// Required payment amount in atomic token units
    #[serde(rename = "maxAmountRequired")]
    pub max_amount_required: String,
    /// Token contract address
    #[serde(default)]
    pub asset: String,
    /// Maximum time allowed for payment completion in seconds
    #[serde(rename = "maxTimeoutSeconds", default)]
    pub max_timeout_seconds: u32,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub extra: Option<AssetExtra>,
}

impl PaymentRequirements {
    /// Get the required amount as an integer
    pub fn max_amount(&self) -> Result<U256> {
        parse_amount(&self.max_amount_required)
    }
}

/// Signed payment authorization submitted by the buyer in the `X-Payment` header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentPayload {
    /// Protocol version identifier
    #[serde(rename = "x402Version", default = "default_version")]
    pub x402_version: u32,
    pub scheme: String,
    pub network: String,
    /// Address derived from the signing key
    pub payer: String,
    /// Recipient the authorization pays
    #[serde(rename = "payTo")]
    pub pay_to: String,
    /// Authorized amount in atomic units
    pub amount: String,
    /// Unix timestamp when authorization becomes valid
    #[serde(rename = "validAfter")]
    pub valid_after: u64,
    /// Unix timestamp when authorization expires
    #[serde(rename = "validBefore")]
    pub valid_before: u64,
    /// 32-byte hex nonce
    pub nonce: String,
    /// 65-byte hex EIP-712 signature
    pub signature: String,
}

fn default_version() -> u32 {
    X402_VERSION
}

impl PaymentPayload {
    /// Encode the payload as a flat JSON object
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode a payload. Only structure is checked here.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| X402Error::malformed_payload(e.to_string()))
    }

    /// Encode the payload into an `X-Payment` header value
    pub fn to_header_value(&self) -> Result<HeaderValue> {
        HeaderValue::from_bytes(&self.encode()?)
            .map_err(|e| {
                X402Error::malformed_payload(format!("payload is not a valid header: {e}"))
            })
    }

    pub fn from_header_value(value: &HeaderValue) -> Result<Self> {
        Self::decode(value.as_bytes())
    }

    /// Check the authorization window contains `now`
    pub fn is_valid_at(&self, now: u64) -> bool {
        self.valid_after <= now && now < self.valid_before
    }
}

/// Body of a 402 payment challenge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequiredBody {
    pub error: String,
    pub message: String,
    pub code: u16,
    #[serde(rename = "paymentRequirements")]
    pub payment_requirements: PaymentRequirements,
}

impl PaymentRequiredBody {
    pub fn new(payment_requirements: PaymentRequirements) -> Self {
        Self {
            error: PAYMENT_REQUIRED_ERROR.to_string(),
            message: PAYMENT_REQUIRED_MESSAGE.to_string(),
            code: StatusCode::PAYMENT_REQUIRED.as_u16(),
            payment_requirements,
        }
    }
}

/// Body of every non-challenge error response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    pub code: u16,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>, message: impl Into<String>, status: StatusCode) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            code: status.as_u16(),
        }
    }
}
