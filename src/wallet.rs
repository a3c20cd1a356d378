//! Signing key wrapper
//!
//! A [`Wallet`] holds a secp256k1 private key, derives its Ethereum address and
//! produces recoverable signatures for EIP-712 digests and transactions. Buyers use
//! it to answer a payment challenge with a signed [`PaymentPayload`].

use crate::crypto::{
    format_address, keccak256, parse_address, Domain, NonceStrategy, TransferAuthorization,
};
use crate::types::constants::{VALIDITY_WINDOW_SECS, VALID_AFTER_OFFSET_SECS};
use crate::types::{parse_amount, PaymentPayload, PaymentRequirements, X402_VERSION};
use crate::{Result, X402Error};
use ethereum_types::{Address, H256};
use secp256k1::{Message, PublicKey, SecretKey, SECP256K1};

/// A private key and its derived address
#[derive(Clone)]
pub struct Wallet {
    secret: SecretKey,
    address: Address,
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("address", &self.address_hex())
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl Wallet {
    /// Load a wallet from a hex private key, with or without `0x`
    pub fn from_private_key(private_key: &str) -> Result<Self> {
        let key = private_key.trim();
        let bytes = hex::decode(key.strip_prefix("0x").unwrap_or(key))
            .map_err(|_| X402Error::config("Invalid hex private key"))?;
        let secret =
            SecretKey::from_slice(&bytes).map_err(|_| X402Error::config("Invalid private key"))?;
        let public = PublicKey::from_secret_key(SECP256K1, &secret);
        let uncompressed = public.serialize_uncompressed();
        let hash = keccak256(&uncompressed[1..]);
        Ok(Self {
            secret,
            address: Address::from_slice(&hash[12..]),
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn address_hex(&self) -> String {
        format_address(&self.address)
    }

    /// Sign a digest, returning `(r || s, recovery id)`
    pub fn sign_recoverable(&self, hash: H256) -> Result<([u8; 64], u8)> {
        let message = Message::from_digest_slice(hash.as_bytes())
            .map_err(|_| X402Error::invalid_signature("Invalid message hash"))?;
        let signature = SECP256K1.sign_ecdsa_recoverable(&message, &self.secret);
        let (recovery_id, compact) = signature.serialize_compact();
        Ok((compact, recovery_id.to_i32() as u8))
    }

    /// Sign a digest as a 65-byte `0x` hex signature with `v` in {27, 28}
    pub fn sign_hash(&self, hash: H256) -> Result<String> {
        let (compact, recovery_id) = self.sign_recoverable(hash)?;
        let mut sig_bytes = [0u8; 65];
        sig_bytes[..64].copy_from_slice(&compact);
        sig_bytes[64] = 27 + recovery_id;
        Ok(format!("0x{}", hex::encode(sig_bytes)))
    }

    /// Build and sign a payload answering `requirements` at time `now`
    ///
    /// The payload pays the full `maxAmountRequired` to `payTo`, is valid from far
    /// in the past until `now + 300s`, and is signed under the token domain carried
    /// in the requirements' `asset` and `extra` fields.
    pub fn create_payment_payload(
        &self,
        requirements: &PaymentRequirements,
        now: u64,
        nonce_strategy: NonceStrategy,
    ) -> Result<PaymentPayload> {
        let extra = requirements.extra.as_ref().ok_or_else(|| {
            X402Error::invalid_payment_requirements("missing token metadata in requirements")
        })?;
        let domain = Domain {
            name: extra.name.clone(),
            version: extra.version.clone(),
            chain_id: extra.chain_id,
            verifying_contract: parse_address(&requirements.asset)
                .map_err(|e| X402Error::invalid_payment_requirements(e.to_string()))?,
        };
        parse_amount(&requirements.max_amount_required)?;

        let payer = self.address_hex();
        let nonce = nonce_strategy.nonce(now, &payer, &requirements.pay_to);
        let mut payload = PaymentPayload {
            x402_version: X402_VERSION,
            scheme: requirements.scheme.clone(),
            network: requirements.network.clone(),
            payer,
            pay_to: requirements.pay_to.clone(),
            amount: requirements.max_amount_required.clone(),
            valid_after: now.saturating_sub(VALID_AFTER_OFFSET_SECS),
            valid_before: now + VALIDITY_WINDOW_SECS,
            nonce: format!("{nonce:?}"),
            signature: String::new(),
        };

        let authorization = TransferAuthorization::from_payload(&payload)
            .map_err(|e| X402Error::invalid_payment_requirements(e.to_string()))?;
        payload.signature = self.sign_hash(authorization.signing_hash(&domain))?;
        Ok(payload)
    }
}
