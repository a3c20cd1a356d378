//! EIP-712 typed data hashing for EIP-3009 transfers

use super::{keccak256, parse_address};
use crate::types::{ChainNetworkConfig, PaymentPayload};
use crate::{Result, X402Error};
use ethereum_types::{Address, H256, U256};

const DOMAIN_TYPE: &[u8] =
    b"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";

const TRANSFER_WITH_AUTHORIZATION_TYPE: &[u8] = b"TransferWithAuthorization(address from,address to,uint256 value,uint256 validAfter,uint256 validBefore,bytes32 nonce)";

/// EIP-712 domain of a token contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Domain {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    pub verifying_contract: Address,
}

impl Domain {
    /// Domain of the fee token of a configured network
    pub fn for_network(network: &ChainNetworkConfig) -> Result<Self> {
        Ok(Self {
            name: network.token_name.clone(),
            version: network.token_version.clone(),
            chain_id: network.id,
            verifying_contract: parse_address(&network.token_address)?,
        })
    }

    /// hashStruct(EIP712Domain)
    pub fn separator(&self) -> H256 {
        let mut data = Vec::with_capacity(32 * 5);
        data.extend_from_slice(&keccak256(DOMAIN_TYPE));
        data.extend_from_slice(&keccak256(self.name.as_bytes()));
        data.extend_from_slice(&keccak256(self.version.as_bytes()));
        data.extend_from_slice(&u256_word(U256::from(self.chain_id)));
        data.extend_from_slice(&address_word(&self.verifying_contract));
        H256::from(keccak256(&data))
    }
}

/// The EIP-3009 message a payment payload signs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferAuthorization {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub valid_after: U256,
    pub valid_before: U256,
    pub nonce: H256,
}

impl TransferAuthorization {
    /// Extract the signed fields of a payload
    pub fn from_payload(payload: &PaymentPayload) -> Result<Self> {
        let value = crate::types::parse_amount(&payload.amount)
            .map_err(|e| X402Error::invalid_authorization(e.to_string()))?;
        Ok(Self {
            from: parse_address(&payload.payer)?,
            to: parse_address(&payload.pay_to)?,
            value,
            valid_after: U256::from(payload.valid_after),
            valid_before: U256::from(payload.valid_before),
            nonce: parse_nonce(&payload.nonce)?,
        })
    }

    /// hashStruct(TransferWithAuthorization)
    pub fn struct_hash(&self) -> H256 {
        let mut data = Vec::with_capacity(32 * 7);
        data.extend_from_slice(&keccak256(TRANSFER_WITH_AUTHORIZATION_TYPE));
        data.extend_from_slice(&address_word(&self.from));
        data.extend_from_slice(&address_word(&self.to));
        data.extend_from_slice(&u256_word(self.value));
        data.extend_from_slice(&u256_word(self.valid_after));
        data.extend_from_slice(&u256_word(self.valid_before));
        data.extend_from_slice(self.nonce.as_bytes());
        H256::from(keccak256(&data))
    }

    /// keccak256(0x1901 || domainSeparator || structHash)
    pub fn signing_hash(&self, domain: &Domain) -> H256 {
        let mut data = Vec::with_capacity(2 + 64);
        data.extend_from_slice(&[0x19, 0x01]);
        data.extend_from_slice(domain.separator().as_bytes());
        data.extend_from_slice(self.struct_hash().as_bytes());
        H256::from(keccak256(&data))
    }
}

/// Parse a `0x`-prefixed 32-byte hex nonce
pub fn parse_nonce(value: &str) -> Result<H256> {
    let hex_str = value
        .strip_prefix("0x")
        .ok_or_else(|| X402Error::invalid_authorization(format!("invalid nonce: {value}")))?;
    let bytes = hex::decode(hex_str)
        .map_err(|_| X402Error::invalid_authorization(format!("invalid nonce: {value}")))?;
    if bytes.len() != 32 {
        return Err(X402Error::invalid_authorization(format!(
            "nonce must be 32 bytes, got {}",
            bytes.len()
        )));
    }
    Ok(H256::from_slice(&bytes))
}

pub(crate) fn u256_word(value: U256) -> [u8; 32] {
    let mut word = [0u8; 32];
    value.to_big_endian(&mut word);
    word
}

pub(crate) fn address_word(address: &Address) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address.as_bytes());
    word
}
