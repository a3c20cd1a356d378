//! Signature utilities

use super::eip712::{Domain, TransferAuthorization};
use super::{keccak256, parse_address};
use crate::types::PaymentPayload;
use crate::{Result, X402Error};
use ethereum_types::{Address, H256};
use k256::ecdsa::{RecoveryId, Signature as K256Signature, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use serde::{Deserialize, Serialize};

/// Recover the address that produced a 65-byte `r || s || v` signature over `message_hash`
pub fn recover_signer(signature: &str, message_hash: H256) -> Result<Address> {
    let sig_bytes = hex::decode(signature.trim_start_matches("0x"))
        .map_err(|_| X402Error::invalid_signature("Invalid hex signature"))?;

    if sig_bytes.len() != 65 {
        return Err(X402Error::invalid_signature("Signature must be 65 bytes"));
    }

    let v = match sig_bytes[64] {
        v @ (27 | 28) => v - 27,
        v @ (0 | 1) => v,
        _ => return Err(X402Error::invalid_signature("Invalid recovery ID")),
    };
    let mut recovery_id =
        RecoveryId::try_from(v).map_err(|_| X402Error::invalid_signature("Invalid recovery ID"))?;

    let mut k256_sig = K256Signature::from_slice(&sig_bytes[..64])
        .map_err(|_| X402Error::invalid_signature("Invalid signature format"))?;

    // Normalize to low-s; the recovery parity flips with it
    if let Some(normalized) = k256_sig.normalize_s() {
        k256_sig = normalized;
        recovery_id = RecoveryId::new(!recovery_id.is_y_odd(), recovery_id.is_x_reduced());
    }

    let verifying_key =
        VerifyingKey::recover_from_prehash(message_hash.as_bytes(), &k256_sig, recovery_id)
            .map_err(|_| X402Error::invalid_signature("Failed to recover public key"))?;

    Ok(ethereum_address_from_pubkey(&verifying_key))
}

/// Check a signature was produced by `expected_address`
pub fn verify_signature(
    signature: &str,
    message_hash: H256,
    expected_address: Address,
) -> Result<bool> {
    Ok(recover_signer(signature, message_hash)? == expected_address)
}

/// Check a payload's signature recovers its `payer` under the token domain
pub fn verify_payment_payload(payload: &PaymentPayload, domain: &Domain) -> Result<bool> {
    let payer = parse_address(&payload.payer)?;
    let authorization = TransferAuthorization::from_payload(payload)?;
    verify_signature(
        &payload.signature,
        authorization.signing_hash(domain),
        payer,
    )
}

pub(crate) fn ethereum_address_from_pubkey(pubkey: &VerifyingKey) -> Address {
    let point = pubkey.to_encoded_point(false);
    // Drop the 0x04 tag, keep the last 20 bytes of the hash
    let hash = keccak256(&point.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

/// Generate a random nonce for EIP-3009 authorization
pub fn generate_nonce() -> H256 {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    H256::from_slice(&bytes)
}

/// `keccak256("{now}-{payer}-{pay_to}")`
///
/// Two authorizations in the same second from the same payer to the same
/// recipient collide. The facilitator's replay check rejects the second one.
pub fn deterministic_nonce(now: u64, payer: &str, pay_to: &str) -> H256 {
    H256::from(keccak256(format!("{now}-{payer}-{pay_to}").as_bytes()))
}

/// How the buyer derives authorization nonces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NonceStrategy {
    /// 32 random bytes per authorization
    #[default]
    Random,
    /// Hash of timestamp, payer and recipient
    Deterministic,
}

impl NonceStrategy {
    pub fn nonce(&self, now: u64, payer: &str, pay_to: &str) -> H256 {
        match self {
            NonceStrategy::Random => generate_nonce(),
            NonceStrategy::Deterministic => deterministic_nonce(now, payer, pay_to),
        }
    }
}
