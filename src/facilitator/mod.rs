//! Facilitator contract for payment verification and settlement
//!
//! The seller gate depends only on the [`Facilitator`] trait. Two implementations
//! are provided:
//! - [`FacilitatorClient`] - talks to a facilitator service over HTTP
//! - [`LocalFacilitator`] - verifies signatures in-process and settles through a [`Settler`]
//!
//! # Examples
//!
//! ```no_run
//! use x402_pay::facilitator::{Facilitator, FacilitatorClient};
//! use x402_pay::types::FacilitatorConfig;
//!
//! # async fn example() -> x402_pay::Result<()> {
//! let client = FacilitatorClient::new(FacilitatorConfig::new("http://127.0.0.1:4021"))?;
//! let supported = client.supported().await?;
//! println!("Supported kinds: {:?}", supported.kinds);
//! # Ok(())
//! # }
//! ```
//!
//! A facilitator instance is shared by every request, so implementations must be
//! safe for concurrent use. Verify always precedes settle for one request, and
//! settling the same authorization twice never yields two successful settlements.

use crate::types::{
    PaymentPayload, PaymentRequirements, SettleResponse, SupportedKinds, VerifyResponse,
};
use crate::Result;
use async_trait::async_trait;

pub mod client;
pub mod local;
pub mod settlement;

#[cfg(test)]
mod tests;

pub use client::FacilitatorClient;
pub use local::{reasons, LocalFacilitator};
pub use settlement::{EvmRpcSettler, Settler};

/// Verify/settle contract consumed by the seller gate
#[async_trait]
pub trait Facilitator: Send + Sync {
    /// Check a payload against requirements without moving funds
    async fn verify(
        &self,
        payment_payload: &PaymentPayload,
        payment_requirements: &PaymentRequirements,
    ) -> Result<VerifyResponse>;

    /// Re-validate and execute the transfer
    async fn settle(
        &self,
        payment_payload: &PaymentPayload,
        payment_requirements: &PaymentRequirements,
    ) -> Result<SettleResponse>;

    /// Schemes and networks this facilitator accepts
    async fn supported(&self) -> Result<SupportedKinds>;
}
