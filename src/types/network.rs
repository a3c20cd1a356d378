//! Chain network configuration
//!
//! Networks are collected once at startup through [`NetworkTableBuilder`] and frozen
//! into a [`NetworkTable`] that is shared read-only by the requirements builder and
//! the facilitator.

use crate::{Result, X402Error};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Token standard of the fee token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    /// ERC-20 token implementing EIP-3009 `transferWithAuthorization`
    #[default]
    Erc20,
}

/// Static description of one blockchain network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainNetworkConfig {
    /// Logical network name used in requirements and payloads
    pub name: String,
    /// JSON-RPC endpoint
    pub rpc: String,
    /// EIP-155 chain id
    pub id: u64,
    /// Fee token contract address
    pub token_address: String,
    /// EIP-712 domain name of the token
    pub token_name: String,
    /// EIP-712 domain version of the token
    pub token_version: String,
    #[serde(default = "default_decimals")]
    pub token_decimals: u8,
    #[serde(default)]
    pub token_type: TokenType,
}

fn default_decimals() -> u8 {
    6
}

impl ChainNetworkConfig {
    /// Check the descriptor is usable
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(X402Error::config("chain network name is required"));
        }
        if self.rpc.trim().is_empty() {
            return Err(X402Error::config(format!(
                "rpc endpoint is required for network {}",
                self.name
            )));
        }
        url::Url::parse(&self.rpc).map_err(|e| {
            X402Error::config(format!("invalid rpc endpoint for network {}: {e}", self.name))
        })?;
        if self.id == 0 {
            return Err(X402Error::config(format!(
                "chain id is required for network {}",
                self.name
            )));
        }
        if !crate::crypto::is_hex_address(&self.token_address) {
            return Err(X402Error::config(format!(
                "invalid token address for network {}: {}",
                self.name, self.token_address
            )));
        }
        if self.token_name.is_empty() || self.token_version.is_empty() {
            return Err(X402Error::config(format!(
                "token name and version are required for network {}",
                self.name
            )));
        }
        Ok(())
    }
}

/// Immutable set of configured networks keyed by logical name
#[derive(Debug, Default)]
pub struct NetworkTable {
    networks: HashMap<String, ChainNetworkConfig>,
}

impl NetworkTable {
    pub fn builder() -> NetworkTableBuilder {
        NetworkTableBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<&ChainNetworkConfig> {
        self.networks.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.networks.contains_key(name)
    }

    /// Network names in sorted order
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.networks.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChainNetworkConfig> {
        self.networks.values()
    }

    pub fn len(&self) -> usize {
        self.networks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }
}

/// Startup-only accumulator for [`NetworkTable`]
#[derive(Debug, Default)]
pub struct NetworkTableBuilder {
    networks: Vec<ChainNetworkConfig>,
}

impl NetworkTableBuilder {
    pub fn with_network(mut self, network: ChainNetworkConfig) -> Self {
        self.networks.push(network);
        self
    }

    pub fn with_networks(mut self, networks: impl IntoIterator<Item = ChainNetworkConfig>) -> Self {
        self.networks.extend(networks);
        self
    }

    /// Validate every descriptor and freeze the table
    pub fn build(self) -> Result<Arc<NetworkTable>> {
        let mut networks = HashMap::with_capacity(self.networks.len());
        for network in self.networks {
            network.validate()?;
            if networks.contains_key(&network.name) {
                return Err(X402Error::config(format!(
                    "duplicate chain network: {}",
                    network.name
                )));
            }
            networks.insert(network.name.clone(), network);
        }
        Ok(Arc::new(NetworkTable { networks }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn localhost() -> ChainNetworkConfig {
        ChainNetworkConfig {
            name: "localhost".to_string(),
            rpc: "http://127.0.0.1:8545".to_string(),
            id: 31337,
            token_address: "0x5FbDB2315678afecb367f032d93F642f64180aa3".to_string(),
            token_name: "USD Coin".to_string(),
            token_version: "2".to_string(),
            token_decimals: 6,
            token_type: TokenType::Erc20,
        }
    }

    #[test]
    fn test_build_table() {
        let mut sepolia = localhost();
        sepolia.name = "base-sepolia".to_string();
        sepolia.id = 84532;

        let table = NetworkTable::builder()
            .with_network(localhost())
            .with_network(sepolia)
            .build()
            .unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.names(), vec!["base-sepolia", "localhost"]);
        assert_eq!(table.get("localhost").unwrap().id, 31337);
        assert!(!table.contains("mainnet"));
    }

    #[test]
    fn test_duplicate_network_rejected() {
        let result = NetworkTable::builder()
            .with_networks([localhost(), localhost()])
            .build();
        assert!(matches!(result, Err(X402Error::Config { .. })));
    }

    #[test]
    fn test_invalid_descriptor_rejected() {
        let mut network = localhost();
        network.token_address = "not-an-address".to_string();
        assert!(NetworkTable::builder().with_network(network).build().is_err());

        let mut network = localhost();
        network.id = 0;
        assert!(network.validate().is_err());

        let mut network = localhost();
        network.rpc = "::".to_string();
        assert!(network.validate().is_err());
    }

    #[test]
    fn test_deserialize_defaults() {
        let network: ChainNetworkConfig = serde_json::from_str(
            r#"{
                "name": "localhost",
                "rpc": "http://127.0.0.1:8545",
                "id": 31337,
                "token_address": "0x5FbDB2315678afecb367f032d93F642f64180aa3",
                "token_name": "USD Coin",
                "token_version": "2"
            }"#,
        )
        .unwrap();
        assert_eq!(network.token_decimals, 6);
        assert_eq!(network.token_type, TokenType::Erc20);
    }
}
