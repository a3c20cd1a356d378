//! Core types for the x402 payment flow
//!
//! - [`network`] - chain network descriptors and the frozen network table
//! - [`payment`] - payment requirements, the payment payload codec and response bodies
//! - [`facilitator`] - verify/settle request and response types
//! - [`constants`] - header names, schemes and default policy values
//!
//! # Example
//!
//! ```
//! use x402_pay::types::PaymentPayload;
//!
//! # fn example() -> x402_pay::Result<()> {
//! let header = br#"{"scheme":"exact","network":"localhost","payer":"0x1","payTo":"0x2",
//!     "amount":"10","validAfter":0,"validBefore":300,"nonce":"0x00","signature":"0x00"}"#;
//! let payload = PaymentPayload::decode(header)?;
//! assert_eq!(payload.network, "localhost");
//! # Ok(())
//! # }
//! ```

pub mod constants;
pub mod facilitator;
pub mod network;
pub mod payment;

pub use constants::{headers, schemes};
pub use facilitator::{
    FacilitatorConfig, SettleRequest, SettleResponse, SupportedKind, SupportedKinds,
    VerifyRequest, VerifyResponse,
};
pub use network::{ChainNetworkConfig, NetworkTable, NetworkTableBuilder, TokenType};
pub use payment::{
    parse_amount, unix_timestamp, AssetExtra, ErrorBody, PaymentPayload, PaymentRequiredBody,
    PaymentRequirements, X402_VERSION,
};
