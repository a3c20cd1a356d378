//! Facilitator request, response and configuration types

use super::payment::{PaymentPayload, PaymentRequirements, X402_VERSION};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Remote facilitator configuration
#[derive(Debug, Clone)]
pub struct FacilitatorConfig {
    /// Base URL of the facilitator service
    pub url: String,
    /// Request timeout
    pub timeout: Option<Duration>,
}

impl FacilitatorConfig {
    /// Create a new facilitator config
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: None,
        }
    }

    /// Validate the facilitator configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.url.is_empty() {
            return Err(crate::X402Error::config("Facilitator URL cannot be empty"));
        }

        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            return Err(crate::X402Error::config(
                "Facilitator URL must start with http:// or https://",
            ));
        }

        Ok(())
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A payload paired with the requirements it claims to satisfy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyRequest {
    #[serde(rename = "x402Version", default = "default_version")]
    pub x402_version: u32,
    #[serde(rename = "paymentPayload")]
    pub payment_payload: PaymentPayload,
    #[serde(rename = "paymentRequirements")]
    pub payment_requirements: PaymentRequirements,
}

fn default_version() -> u32 {
    X402_VERSION
}

impl VerifyRequest {
    pub fn new(payment_payload: PaymentPayload, payment_requirements: PaymentRequirements) -> Self {
        Self {
            x402_version: X402_VERSION,
            payment_payload,
            payment_requirements,
        }
    }
}

/// Settle requests carry the same pair as verify requests
pub type SettleRequest = VerifyRequest;

/// Payment verification response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyResponse {
    /// Whether the payment is valid
    #[serde(rename = "isValid")]
    pub is_valid: bool,
    /// Reason for invalidity, present iff invalid
    #[serde(rename = "invalidReason", skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<String>,
    /// Payer's address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
}

impl VerifyResponse {
    pub fn valid(payer: impl Into<String>) -> Self {
        Self {
            is_valid: true,
            invalid_reason: None,
            payer: Some(payer.into()),
        }
    }

    pub fn invalid(reason: impl Into<String>, payer: Option<String>) -> Self {
        Self {
            is_valid: false,
            invalid_reason: Some(reason.into()),
            payer,
        }
    }
}

/// Payment settlement response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettleResponse {
    /// Whether the settlement was successful
    pub success: bool,
    /// Error reason, present iff settlement failed
    #[serde(rename = "errorReason", skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
    /// Transaction hash or identifier
    #[serde(default)]
    pub transaction: String,
    /// Network where the transaction was executed
    #[serde(default)]
    pub network: String,
    /// Payer address if applicable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
}

impl SettleResponse {
    pub fn settled(
        transaction: impl Into<String>,
        network: impl Into<String>,
        payer: impl Into<String>,
    ) -> Self {
        Self {
            success: true,
            error_reason: None,
            transaction: transaction.into(),
            network: network.into(),
            payer: Some(payer.into()),
        }
    }

    pub fn failed(
        reason: impl Into<String>,
        network: impl Into<String>,
        payer: Option<String>,
    ) -> Self {
        Self {
            success: false,
            error_reason: Some(reason.into()),
            transaction: String::new(),
            network: network.into(),
            payer,
        }
    }

    /// Encode the settle response to base64
    pub fn to_base64(&self) -> crate::Result<String> {
        use base64::{engine::general_purpose, Engine as _};
        let json = serde_json::to_string(self)?;
        Ok(general_purpose::STANDARD.encode(json))
    }
}

/// Supported payment schemes and networks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportedKinds {
    /// List of supported payment schemes and networks
    pub kinds: Vec<SupportedKind>,
}

/// Individual supported payment scheme and network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportedKind {
    /// Protocol version
    #[serde(rename = "x402Version")]
    pub x402_version: u32,
    /// Payment scheme identifier
    pub scheme: String,
    /// Logical network name
    pub network: String,
    /// Additional metadata provided by the facilitator
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_facilitator_config_validation() {
        assert!(FacilitatorConfig::new("https://facilitator.local").validate().is_ok());
        assert!(FacilitatorConfig::new("").validate().is_err());
        assert!(FacilitatorConfig::new("ftp://facilitator.local").validate().is_err());
    }

    #[test]
    fn test_verify_response_wire_names() {
        let json =
            serde_json::to_value(VerifyResponse::invalid("authorization_expired", None)).unwrap();
        assert_eq!(json["isValid"], false);
        assert_eq!(json["invalidReason"], "authorization_expired");
        assert!(json.get("payer").is_none());

        let json = serde_json::to_value(VerifyResponse::valid("0xabc")).unwrap();
        assert!(json.get("invalidReason").is_none());
    }

    #[test]
    fn test_settle_response_base64() {
        use base64::{engine::general_purpose, Engine as _};
        let response = SettleResponse::settled("0xdeadbeef", "localhost", "0xabc");
        let decoded = general_purpose::STANDARD
            .decode(response.to_base64().unwrap())
            .unwrap();
        let parsed: SettleResponse = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(parsed, response);
    }

    #[test]
    fn test_failed_settlement_has_reason() {
        let response = SettleResponse::failed("insufficient_funds", "localhost", None);
        assert!(!response.success);
        assert_eq!(response.error_reason.as_deref(), Some("insufficient_funds"));
        assert!(response.transaction.is_empty());
    }
}
