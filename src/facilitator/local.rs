//! In-process facilitator
//!
//! Verifies EIP-3009 authorizations against the configured networks and settles them
//! through a [`Settler`]. Replay protection lives in a [`NonceStorage`].

use super::{EvmRpcSettler, Facilitator, Settler};
use crate::config::LocalFacilitatorConfig;
use crate::crypto::{self, Domain};
use crate::facilitator_storage::{NonceKey, NonceStorage};
use crate::types::{
    parse_amount, schemes, unix_timestamp, NetworkTable, PaymentPayload, PaymentRequirements,
    SettleResponse, SupportedKind, SupportedKinds, VerifyResponse, X402_VERSION,
};
use crate::wallet::Wallet;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// `invalidReason` / `errorReason` values reported by [`LocalFacilitator`]
pub mod reasons {
    pub const UNSUPPORTED_SCHEME: &str = "unsupported_scheme";
    pub const SCHEME_MISMATCH: &str = "scheme_mismatch";
    pub const NETWORK_MISMATCH: &str = "network_mismatch";
    pub const UNKNOWN_NETWORK: &str = "unknown_network";
    pub const ASSET_MISMATCH: &str = "asset_mismatch";
    pub const INVALID_VALIDITY_WINDOW: &str = "invalid_validity_window";
    pub const NOT_YET_VALID: &str = "authorization_not_yet_valid";
    pub const EXPIRED: &str = "authorization_expired";
    pub const INVALID_PAYLOAD: &str = "invalid_payload";
    pub const INVALID_REQUIREMENTS: &str = "invalid_payment_requirements";
    pub const AMOUNT_EXCEEDS_MAXIMUM: &str = "amount_exceeds_maximum";
    pub const RECIPIENT_MISMATCH: &str = "recipient_mismatch";
    pub const INVALID_SIGNATURE: &str = "invalid_signature";
    pub const NONCE_ALREADY_USED: &str = "nonce_already_used";
    pub const NONCE_ALREADY_SETTLED: &str = "nonce_already_settled";
    pub const TRANSACTION_FAILED: &str = "transaction_failed";
}

/// Facilitator that verifies locally and settles on chain
#[derive(Clone)]
pub struct LocalFacilitator {
    networks: Arc<NetworkTable>,
    supported_schemes: Vec<String>,
    storage: Arc<dyn NonceStorage>,
    settler: Arc<dyn Settler>,
}

impl std::fmt::Debug for LocalFacilitator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalFacilitator")
            .field("networks", &self.networks.names())
            .field("supported_schemes", &self.supported_schemes)
            .finish()
    }
}

impl LocalFacilitator {
    pub fn new(
        networks: Arc<NetworkTable>,
        storage: Arc<dyn NonceStorage>,
        settler: Arc<dyn Settler>,
    ) -> Self {
        Self {
            networks,
            supported_schemes: vec![schemes::EXACT.to_string()],
            storage,
            settler,
        }
    }

    /// Facilitator settling on chain with the configured key
    pub fn from_config(
        config: &LocalFacilitatorConfig,
        networks: Arc<NetworkTable>,
        storage: Arc<dyn NonceStorage>,
    ) -> Result<Self> {
        config.validate()?;
        let wallet = Wallet::from_private_key(&config.private_key)?;
        tracing::info!(
            address = %wallet.address_hex(),
            networks = ?networks.names(),
            "Facilitator settlement account"
        );
        let settler = EvmRpcSettler::new(wallet, config.gas_limit, config.gas_price)?;
        Ok(Self::new(networks, storage, Arc::new(settler))
            .with_supported_schemes(config.supported_schemes.clone()))
    }

    pub fn with_supported_schemes(mut self, supported_schemes: Vec<String>) -> Self {
        self.supported_schemes = supported_schemes;
        self
    }

    /// Every check that does not need nonce storage, in order
    fn check(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
        now: u64,
    ) -> Result<std::result::Result<(), &'static str>> {
        if !self.supported_schemes.iter().any(|s| s == &payload.scheme) {
            return Ok(Err(reasons::UNSUPPORTED_SCHEME));
        }
        if payload.scheme != requirements.scheme {
            return Ok(Err(reasons::SCHEME_MISMATCH));
        }
        if payload.network != requirements.network {
            return Ok(Err(reasons::NETWORK_MISMATCH));
        }
        let Some(chain) = self.networks.get(&payload.network) else {
            return Ok(Err(reasons::UNKNOWN_NETWORK));
        };
        if !requirements.asset.is_empty()
            && !crypto::same_address(&requirements.asset, &chain.token_address)
        {
            return Ok(Err(reasons::ASSET_MISMATCH));
        }

        if payload.valid_after >= payload.valid_before {
            return Ok(Err(reasons::INVALID_VALIDITY_WINDOW));
        }
        if now < payload.valid_after {
            return Ok(Err(reasons::NOT_YET_VALID));
        }
        if now >= payload.valid_before {
            return Ok(Err(reasons::EXPIRED));
        }

        let Ok(amount) = parse_amount(&payload.amount) else {
            return Ok(Err(reasons::INVALID_PAYLOAD));
        };
        let Ok(max_amount) = requirements.max_amount() else {
            return Ok(Err(reasons::INVALID_REQUIREMENTS));
        };
        if amount > max_amount {
            return Ok(Err(reasons::AMOUNT_EXCEEDS_MAXIMUM));
        }

        if !crypto::same_address(&payload.pay_to, &requirements.pay_to) {
            return Ok(Err(reasons::RECIPIENT_MISMATCH));
        }

        let domain = Domain::for_network(chain)?;
        match crypto::verify_payment_payload(payload, &domain) {
            Ok(true) => Ok(Ok(())),
            Ok(false) | Err(_) => Ok(Err(reasons::INVALID_SIGNATURE)),
        }
    }

    /// Verify against an explicit clock
    pub async fn verify_at(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
        now: u64,
    ) -> Result<VerifyResponse> {
        if let Err(reason) = self.check(payload, requirements, now)? {
            tracing::info!(
                network = %payload.network,
                payer = %payload.payer,
                reason,
                "Payment verification rejected"
            );
            return Ok(VerifyResponse::invalid(reason, Some(payload.payer.clone())));
        }

        let Ok(key) = NonceKey::from_payload(payload) else {
            return Ok(VerifyResponse::invalid(
                reasons::INVALID_PAYLOAD,
                Some(payload.payer.clone()),
            ));
        };
        if self.storage.has_nonce(&key).await? {
            tracing::warn!(
                network = %payload.network,
                payer = %payload.payer,
                nonce = %payload.nonce,
                "Replayed authorization nonce"
            );
            return Ok(VerifyResponse::invalid(
                reasons::NONCE_ALREADY_USED,
                Some(payload.payer.clone()),
            ));
        }

        Ok(VerifyResponse::valid(payload.payer.clone()))
    }

    /// Settle against an explicit clock
    pub async fn settle_at(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
        now: u64,
    ) -> Result<SettleResponse> {
        let payer = Some(payload.payer.clone());
        let Ok(key) = NonceKey::from_payload(payload) else {
            return Ok(SettleResponse::failed(
                reasons::INVALID_PAYLOAD,
                &payload.network,
                payer,
            ));
        };

        if let Some(transaction) = self.storage.settlement(&key).await? {
            tracing::warn!(
                network = %payload.network,
                payer = %payload.payer,
                transaction = %transaction,
                "Authorization already settled"
            );
            let mut response =
                SettleResponse::failed(reasons::NONCE_ALREADY_SETTLED, &payload.network, payer);
            response.transaction = transaction;
            return Ok(response);
        }

        if let Err(reason) = self.check(payload, requirements, now)? {
            return Ok(SettleResponse::failed(reason, &payload.network, payer));
        }

        if !self.storage.claim_nonce(&key).await? {
            return Ok(SettleResponse::failed(
                reasons::NONCE_ALREADY_USED,
                &payload.network,
                payer,
            ));
        }

        let Some(chain) = self.networks.get(&payload.network) else {
            self.storage.release_nonce(&key).await?;
            return Ok(SettleResponse::failed(
                reasons::UNKNOWN_NETWORK,
                &payload.network,
                payer,
            ));
        };

        match self.settler.submit_transfer(chain, payload).await {
            Ok(transaction) => {
                // The transfer is on chain; a bookkeeping failure leaves the nonce claimed
                if let Err(e) = self.storage.record_settlement(&key, &transaction).await {
                    tracing::error!(
                        network = %payload.network,
                        payer = %payload.payer,
                        nonce = %payload.nonce,
                        transaction = %transaction,
                        error = %e,
                        "Settled on chain but failed to record the settlement"
                    );
                }
                tracing::info!(
                    network = %payload.network,
                    payer = %payload.payer,
                    amount = %payload.amount,
                    transaction = %transaction,
                    "Payment settled"
                );
                Ok(SettleResponse::settled(
                    transaction,
                    &payload.network,
                    &payload.payer,
                ))
            }
            Err(e) => {
                tracing::error!(
                    network = %payload.network,
                    payer = %payload.payer,
                    error = %e,
                    "Settlement submission failed"
                );
                self.storage.release_nonce(&key).await?;
                Ok(SettleResponse::failed(
                    format!("{}: {}", reasons::TRANSACTION_FAILED, e),
                    &payload.network,
                    payer,
                ))
            }
        }
    }
}

#[async_trait]
impl Facilitator for LocalFacilitator {
    async fn verify(
        &self,
        payment_payload: &PaymentPayload,
        payment_requirements: &PaymentRequirements,
    ) -> Result<VerifyResponse> {
        self.verify_at(payment_payload, payment_requirements, unix_timestamp())
            .await
    }

    async fn settle(
        &self,
        payment_payload: &PaymentPayload,
        payment_requirements: &PaymentRequirements,
    ) -> Result<SettleResponse> {
        self.settle_at(payment_payload, payment_requirements, unix_timestamp())
            .await
    }

    async fn supported(&self) -> Result<SupportedKinds> {
        let mut kinds = Vec::new();
        for scheme in &self.supported_schemes {
            for network in self.networks.names() {
                kinds.push(SupportedKind {
                    x402_version: X402_VERSION,
                    scheme: scheme.clone(),
                    network: network.to_string(),
                    metadata: None,
                });
            }
        }
        Ok(SupportedKinds { kinds })
    }
}
