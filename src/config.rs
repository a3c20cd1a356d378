//! Gateway and facilitator configuration
//!
//! Configuration is a single JSON document. Private keys may be written inline or
//! as `env:NAME` references, which are resolved from the environment when the file
//! is loaded. Loading also validates every section, so a config that loads is one
//! the binaries can serve from.

use crate::crypto::{looks_like_address, NonceStrategy};
use crate::facilitator::settlement::DEFAULT_GAS_LIMIT;
use crate::types::constants::{
    schemes, DEFAULT_MAX_AMOUNT_PAY, DEFAULT_MAX_BODY_BYTES, DEFAULT_MAX_RETRIES,
};
use crate::types::{parse_amount, ChainNetworkConfig, NetworkTable};
use crate::{Result, X402Error};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

const SECRET_ENV_PREFIX: &str = "env:";

/// Resolve a secret reference
///
/// `env:NAME` reads `NAME` from the environment; anything else is returned as is.
pub fn resolve_secret(value: &str) -> Result<String> {
    match value.strip_prefix(SECRET_ENV_PREFIX) {
        Some(name) => std::env::var(name).map_err(|_| {
            X402Error::config(format!("environment variable {name} is not set"))
        }),
        None => Ok(value.to_string()),
    }
}

fn default_scheme() -> String {
    schemes::EXACT.to_string()
}

fn default_max_amount_pay() -> String {
    DEFAULT_MAX_AMOUNT_PAY.to_string()
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

fn default_supported_schemes() -> Vec<String> {
    vec![schemes::EXACT.to_string()]
}

fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

/// Seller side: what a protected resource costs and who gets paid
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellerConfig {
    #[serde(default = "default_scheme")]
    pub scheme: String,
    pub network: String,
    pub resource: String,
    #[serde(default)]
    pub description: String,
    pub pay_to: String,
    /// Price in the token's atomic units
    pub max_amount_required: String,
    /// Attach `X-Payment-Response` to paid responses
    #[serde(default)]
    pub settlement_header: bool,
}

impl SellerConfig {
    pub fn new(
        network: impl Into<String>,
        resource: impl Into<String>,
        pay_to: impl Into<String>,
        max_amount_required: impl Into<String>,
    ) -> Self {
        Self {
            scheme: default_scheme(),
            network: network.into(),
            resource: resource.into(),
            description: String::new(),
            pay_to: pay_to.into(),
            max_amount_required: max_amount_required.into(),
            settlement_header: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_settlement_header(mut self, enabled: bool) -> Self {
        self.settlement_header = enabled;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.scheme.is_empty() {
            return Err(X402Error::config("seller: scheme is required"));
        }
        if !schemes::is_supported(&self.scheme) {
            return Err(X402Error::config(format!(
                "seller: unsupported scheme {}",
                self.scheme
            )));
        }
        if self.network.is_empty() {
            return Err(X402Error::config("seller: network is required"));
        }
        if self.resource.is_empty() {
            return Err(X402Error::config("seller: resource is required"));
        }
        if self.pay_to.is_empty() {
            return Err(X402Error::config("seller: pay_to is required"));
        }
        if !looks_like_address(&self.pay_to) {
            return Err(X402Error::config(format!(
                "seller: pay_to is not a valid address: {}",
                self.pay_to
            )));
        }
        if self.max_amount_required.is_empty() {
            return Err(X402Error::config("seller: max_amount_required is required"));
        }
        parse_amount(&self.max_amount_required)
            .map_err(|e| X402Error::config(format!("seller: {e}")))?;
        Ok(())
    }
}

/// Buyer side: the paying key and the spending policy
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyerConfig {
    pub private_key: String,
    /// Per-request spending ceiling in atomic units; "0" disables the cap
    #[serde(default = "default_max_amount_pay")]
    pub max_amount_pay: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub nonce_strategy: NonceStrategy,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl std::fmt::Debug for BuyerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuyerConfig")
            .field("private_key", &"<redacted>")
            .field("max_amount_pay", &self.max_amount_pay)
            .field("max_retries", &self.max_retries)
            .field("nonce_strategy", &self.nonce_strategy)
            .field("max_body_bytes", &self.max_body_bytes)
            .finish()
    }
}

impl BuyerConfig {
    pub fn new(private_key: impl Into<String>) -> Self {
        Self {
            private_key: private_key.into(),
            max_amount_pay: default_max_amount_pay(),
            max_retries: DEFAULT_MAX_RETRIES,
            nonce_strategy: NonceStrategy::default(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_max_amount_pay(mut self, max_amount_pay: impl Into<String>) -> Self {
        self.max_amount_pay = max_amount_pay.into();
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_nonce_strategy(mut self, nonce_strategy: NonceStrategy) -> Self {
        self.nonce_strategy = nonce_strategy;
        self
    }

    /// Attempts actually made; 0 means the default of one
    pub fn effective_max_retries(&self) -> u32 {
        self.max_retries.max(1)
    }

    pub fn validate(&self) -> Result<()> {
        if self.private_key.is_empty() {
            return Err(X402Error::config("buyer: private_key is required"));
        }
        parse_amount(&self.max_amount_pay)
            .map_err(|e| X402Error::config(format!("buyer: max_amount_pay: {e}")))?;
        if self.max_body_bytes == 0 {
            return Err(X402Error::config("buyer: max_body_bytes must be positive"));
        }
        Ok(())
    }
}

/// In-process facilitator: settlement key, schemes and gas policy
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalFacilitatorConfig {
    pub private_key: String,
    #[serde(default = "default_supported_schemes")]
    pub supported_schemes: Vec<String>,
    /// 0 uses the default gas limit
    #[serde(default)]
    pub gas_limit: u64,
    /// Gas price in wei; 0 asks the node
    #[serde(default)]
    pub gas_price: u64,
}

impl std::fmt::Debug for LocalFacilitatorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalFacilitatorConfig")
            .field("private_key", &"<redacted>")
            .field("supported_schemes", &self.supported_schemes)
            .field("gas_limit", &self.gas_limit)
            .field("gas_price", &self.gas_price)
            .finish()
    }
}

impl LocalFacilitatorConfig {
    pub fn new(private_key: impl Into<String>) -> Self {
        Self {
            private_key: private_key.into(),
            supported_schemes: default_supported_schemes(),
            gas_limit: DEFAULT_GAS_LIMIT,
            gas_price: 0,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.private_key.is_empty() {
            return Err(X402Error::config("facilitator: private_key is required"));
        }
        if self.supported_schemes.is_empty() {
            return Err(X402Error::config(
                "facilitator: at least one supported scheme is required",
            ));
        }
        if let Some(scheme) = self
            .supported_schemes
            .iter()
            .find(|s| !schemes::is_supported(s))
        {
            return Err(X402Error::config(format!(
                "facilitator: unsupported scheme {scheme}"
            )));
        }
        Ok(())
    }
}

/// Top-level configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default)]
    pub chain_networks: Vec<ChainNetworkConfig>,
    /// Settle in process with this key
    #[serde(default)]
    pub facilitator: Option<LocalFacilitatorConfig>,
    /// Or delegate to a remote facilitator service
    #[serde(default)]
    pub facilitator_url: Option<String>,
    #[serde(default)]
    pub seller: Option<SellerConfig>,
    #[serde(default)]
    pub buyer: Option<BuyerConfig>,
    /// Base URL the gateway forwards to
    #[serde(default)]
    pub upstream: Option<String>,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl GatewayConfig {
    /// Parse, resolve secret references and validate
    pub fn from_json_str(json: &str) -> Result<Self> {
        let mut config: Self = serde_json::from_str(json)
            .map_err(|e| X402Error::config(format!("invalid configuration: {e}")))?;
        config.resolve_secrets()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            X402Error::config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&json)
    }

    fn resolve_secrets(&mut self) -> Result<()> {
        if let Some(buyer) = self.buyer.as_mut() {
            buyer.private_key = resolve_secret(&buyer.private_key)?;
        }
        if let Some(facilitator) = self.facilitator.as_mut() {
            facilitator.private_key = resolve_secret(&facilitator.private_key)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.seller.is_none() && self.buyer.is_none() && self.facilitator.is_none() {
            return Err(X402Error::config(
                "nothing to serve: configure a seller, a buyer or a facilitator",
            ));
        }
        if self.max_body_bytes == 0 {
            return Err(X402Error::config("max_body_bytes must be positive"));
        }

        if let Some(facilitator) = &self.facilitator {
            facilitator.validate()?;
            if self.chain_networks.is_empty() {
                return Err(X402Error::config(
                    "facilitator: at least one chain network is required",
                ));
            }
        }

        if let Some(seller) = &self.seller {
            seller.validate()?;
            if self.facilitator.is_none() && self.facilitator_url.is_none() {
                return Err(X402Error::config(
                    "seller: a facilitator or facilitator_url is required",
                ));
            }
            if !self.chain_networks.iter().any(|n| n.name == seller.network) {
                return Err(X402Error::config(format!(
                    "seller: network {} is not configured",
                    seller.network
                )));
            }
        }

        if let Some(buyer) = &self.buyer {
            buyer.validate()?;
        }

        if (self.seller.is_some() || self.buyer.is_some()) && self.upstream.is_none() {
            return Err(X402Error::config(
                "upstream is required when a seller or buyer is configured",
            ));
        }
        if let Some(upstream) = &self.upstream {
            url::Url::parse(upstream)
                .map_err(|e| X402Error::config(format!("invalid upstream URL: {e}")))?;
        }

        Ok(())
    }

    /// Freeze every configured chain network into one shared table
    pub fn network_table(&self) -> Result<Arc<NetworkTable>> {
        NetworkTable::builder()
            .with_networks(self.chain_networks.iter().cloned())
            .build()
    }
}
