//! Cryptographic utilities for x402 payments
//!
//! - [`eip712`] - EIP-712 hashing of EIP-3009 `TransferWithAuthorization` messages
//! - [`signature`] - signature recovery, payload verification and nonce derivation
//!
//! # Example
//!
//! ```
//! use x402_pay::crypto::{eip712::Domain, parse_address};
//!
//! # fn example() -> x402_pay::Result<()> {
//! let domain = Domain {
//!     name: "USD Coin".to_string(),
//!     version: "2".to_string(),
//!     chain_id: 84532,
//!     verifying_contract: parse_address("0x036CbD53842c5426634e7929541eC2318f3dCF7e")?,
//! };
//! let separator = domain.separator();
//! assert_eq!(separator.as_bytes().len(), 32);
//! # Ok(())
//! # }
//! ```

use crate::{Result, X402Error};
use ethereum_types::Address;

pub mod eip712;
pub mod signature;


pub use eip712::{Domain, TransferAuthorization};
pub use signature::{
    deterministic_nonce, generate_nonce, recover_signer, verify_payment_payload, NonceStrategy,
};

/// Keccak-256 hash function
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    use sha3::{Digest, Keccak256};
    Keccak256::digest(data).into()
}

/// Strict check: `0x` followed by exactly 40 hex digits
pub fn is_hex_address(value: &str) -> bool {
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => hex.len() == 40 && hex.bytes().all(|b| b.is_ascii_hexdigit()),
        None => false,
    }
}

/// Lenient check used for configured recipients: `0x` followed by 1 to 40 hex digits
pub fn looks_like_address(value: &str) -> bool {
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => {
            !hex.is_empty() && hex.len() <= 40 && hex.bytes().all(|b| b.is_ascii_hexdigit())
        }
        None => false,
    }
}

/// Parse a full 20-byte hex address
pub fn parse_address(value: &str) -> Result<Address> {
    if !is_hex_address(value) {
        return Err(X402Error::invalid_authorization(format!(
            "invalid address: {value}"
        )));
    }
    let bytes = hex::decode(&value[2..])
        .map_err(|_| X402Error::invalid_authorization(format!("invalid address: {value}")))?;
    Ok(Address::from_slice(&bytes))
}

/// Lowercase `0x`-prefixed hex form of an address
pub fn format_address(address: &Address) -> String {
    format!("0x{}", hex::encode(address.as_bytes()))
}

/// Address equality ignoring hex case
pub fn same_address(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}
