//! On-chain settlement of EIP-3009 authorizations
//!
//! [`EvmRpcSettler`] calls `transferWithAuthorization` on the token contract from the
//! facilitator's own account, signing a legacy EIP-155 transaction and submitting it
//! over JSON-RPC.

use crate::crypto::eip712::{address_word, u256_word, TransferAuthorization};
use crate::crypto::{keccak256, parse_address};
use crate::types::{ChainNetworkConfig, PaymentPayload};
use crate::wallet::Wallet;
use crate::{Result, X402Error};
use async_trait::async_trait;
use ethereum_types::{Address, U256};
use reqwest::Client;
use rlp::RlpStream;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

/// Gas limit used when none is configured
pub const DEFAULT_GAS_LIMIT: u64 = 100_000;

const TRANSFER_WITH_AUTHORIZATION_SIGNATURE: &[u8] =
    b"transferWithAuthorization(address,address,uint256,uint256,uint256,bytes32,uint8,bytes32,bytes32)";

/// Executes a verified authorization and returns the transaction id
#[async_trait]
pub trait Settler: Send + Sync {
    async fn submit_transfer(
        &self,
        network: &ChainNetworkConfig,
        payload: &PaymentPayload,
    ) -> Result<String>;
}

/// Settler that submits raw transactions to an EVM JSON-RPC node
pub struct EvmRpcSettler {
    wallet: Wallet,
    client: Client,
    gas_limit: u64,
    gas_price: u64,
    request_id: AtomicU64,
    // Account nonces must be fetched and consumed one transaction at a time
    submit_lock: Mutex<()>,
}

impl std::fmt::Debug for EvmRpcSettler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvmRpcSettler")
            .field("wallet", &self.wallet)
            .field("gas_limit", &self.gas_limit)
            .field("gas_price", &self.gas_price)
            .finish()
    }
}

impl EvmRpcSettler {
    /// `gas_limit` of 0 uses [`DEFAULT_GAS_LIMIT`]; `gas_price` of 0 asks the node
    pub fn new(wallet: Wallet, gas_limit: u64, gas_price: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| X402Error::config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            wallet,
            client,
            gas_limit: if gas_limit == 0 { DEFAULT_GAS_LIMIT } else { gas_limit },
            gas_price,
            request_id: AtomicU64::new(1),
            submit_lock: Mutex::new(()),
        })
    }

    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    async fn rpc(&self, endpoint: &str, method: &str, params: Value) -> Result<Value> {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| X402Error::chain_rpc(format!("{method}: {e}")))?;

        if !response.status().is_success() {
            return Err(X402Error::chain_rpc(format!(
                "{method} failed with status: {}",
                response.status()
            )));
        }

        let mut reply: Value = response
            .json()
            .await
            .map_err(|e| X402Error::chain_rpc(format!("{method}: invalid response: {e}")))?;

        if let Some(error) = reply.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Err(X402Error::chain_rpc(format!("{method}: {message}")));
        }

        match reply.get_mut("result") {
            Some(result) => Ok(result.take()),
            None => Err(X402Error::chain_rpc(format!("{method}: missing result"))),
        }
    }

    async fn rpc_quantity(&self, endpoint: &str, method: &str, params: Value) -> Result<U256> {
        let value = self.rpc(endpoint, method, params).await?;
        let hex_str = value
            .as_str()
            .ok_or_else(|| X402Error::chain_rpc(format!("{method}: expected hex quantity")))?;
        parse_quantity(hex_str)
            .ok_or_else(|| X402Error::chain_rpc(format!("{method}: invalid quantity {hex_str}")))
    }
}

#[async_trait]
impl Settler for EvmRpcSettler {
    async fn submit_transfer(
        &self,
        network: &ChainNetworkConfig,
        payload: &PaymentPayload,
    ) -> Result<String> {
        let token = parse_address(&network.token_address)?;
        let data = transfer_with_authorization_calldata(payload)?;

        let _guard = self.submit_lock.lock().await;

        let account_nonce = self
            .rpc_quantity(
                &network.rpc,
                "eth_getTransactionCount",
                json!([self.wallet.address_hex(), "pending"]),
            )
            .await?;
        let gas_price = if self.gas_price == 0 {
            self.rpc_quantity(&network.rpc, "eth_gasPrice", json!([])).await?
        } else {
            U256::from(self.gas_price)
        };

        let transaction = LegacyTransaction {
            nonce: account_nonce,
            gas_price,
            gas_limit: U256::from(self.gas_limit),
            to: token,
            data,
            chain_id: network.id,
        };
        let raw = transaction.sign(&self.wallet)?;

        tracing::debug!(
            network = %network.name,
            account_nonce = %account_nonce,
            gas_price = %gas_price,
            "Submitting transferWithAuthorization"
        );

        let hash = self
            .rpc(
                &network.rpc,
                "eth_sendRawTransaction",
                json!([format!("0x{}", hex::encode(raw))]),
            )
            .await?;

        hash.as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                X402Error::chain_rpc("eth_sendRawTransaction: expected transaction hash")
            })
    }
}

/// ABI-encode `transferWithAuthorization(from, to, value, validAfter, validBefore, nonce, v, r, s)`
pub fn transfer_with_authorization_calldata(payload: &PaymentPayload) -> Result<Vec<u8>> {
    let authorization = TransferAuthorization::from_payload(payload)?;

    let signature = hex::decode(payload.signature.trim_start_matches("0x"))
        .map_err(|_| X402Error::invalid_signature("Invalid hex signature"))?;
    if signature.len() != 65 {
        return Err(X402Error::invalid_signature("Signature must be 65 bytes"));
    }
    let v = match signature[64] {
        v @ (0 | 1) => v + 27,
        v => v,
    };

    let mut data = Vec::with_capacity(4 + 32 * 9);
    data.extend_from_slice(&keccak256(TRANSFER_WITH_AUTHORIZATION_SIGNATURE)[..4]);
    data.extend_from_slice(&address_word(&authorization.from));
    data.extend_from_slice(&address_word(&authorization.to));
    data.extend_from_slice(&u256_word(authorization.value));
    data.extend_from_slice(&u256_word(authorization.valid_after));
    data.extend_from_slice(&u256_word(authorization.valid_before));
    data.extend_from_slice(authorization.nonce.as_bytes());
    data.extend_from_slice(&u256_word(U256::from(v)));
    data.extend_from_slice(&signature[..32]);
    data.extend_from_slice(&signature[32..64]);
    Ok(data)
}

/// Legacy transaction signed with EIP-155 replay protection
#[derive(Debug, Clone)]
pub struct LegacyTransaction {
    pub nonce: U256,
    pub gas_price: U256,
    pub gas_limit: U256,
    pub to: Address,
    pub data: Vec<u8>,
    pub chain_id: u64,
}

impl LegacyTransaction {
    fn append_body(&self, stream: &mut RlpStream) {
        stream.append(&self.nonce);
        stream.append(&self.gas_price);
        stream.append(&self.gas_limit);
        stream.append(&self.to);
        stream.append(&U256::zero());
        stream.append(&self.data);
    }

    /// keccak256(rlp([nonce, gasPrice, gasLimit, to, 0, data, chainId, 0, 0]))
    pub fn signing_hash(&self) -> ethereum_types::H256 {
        let mut stream = RlpStream::new_list(9);
        self.append_body(&mut stream);
        stream.append(&self.chain_id);
        stream.append(&0u64);
        stream.append(&0u64);
        ethereum_types::H256::from(keccak256(&stream.out()))
    }

    /// Raw signed transaction bytes
    pub fn sign(&self, wallet: &Wallet) -> Result<Vec<u8>> {
        let (compact, recovery_id) = wallet.sign_recoverable(self.signing_hash())?;
        let v = u64::from(recovery_id) + self.chain_id * 2 + 35;

        let mut stream = RlpStream::new_list(9);
        self.append_body(&mut stream);
        stream.append(&v);
        stream.append(&U256::from_big_endian(&compact[..32]));
        stream.append(&U256::from_big_endian(&compact[32..]));
        Ok(stream.out().to_vec())
    }
}

fn parse_quantity(value: &str) -> Option<U256> {
    let digits = value.strip_prefix("0x")?;
    if digits.is_empty() {
        return Some(U256::zero());
    }
    U256::from_str_radix(digits, 16).ok()
}
