//! Payment requirements builder
//!
//! Derives the canonical [`PaymentRequirements`] a seller issues in its challenge and
//! hands to the facilitator. The builder is a pure function of its inputs and the
//! frozen network table.

use crate::crypto::looks_like_address;
use crate::types::constants::{schemes, DEFAULT_MAX_TIMEOUT_SECONDS};
use crate::types::{parse_amount, AssetExtra, NetworkTable, PaymentRequirements};
use crate::{Result, X402Error};
use std::sync::Arc;

/// Builds payment requirements against the configured networks
#[derive(Debug, Clone)]
pub struct RequirementsBuilder {
    networks: Arc<NetworkTable>,
}

impl RequirementsBuilder {
    pub fn new(networks: Arc<NetworkTable>) -> Self {
        Self { networks }
    }

    pub fn networks(&self) -> &Arc<NetworkTable> {
        &self.networks
    }

    /// Build the requirements for one resource
    ///
    /// Fails with a configuration error when `network` is not configured, when
    /// `max_amount_required` is not a non-negative integer or when `pay_to` is not
    /// a hex address.
    pub fn build(
        &self,
        resource: &str,
        description: &str,
        network: &str,
        pay_to: &str,
        max_amount_required: &str,
    ) -> Result<PaymentRequirements> {
        let chain = self.networks.get(network).ok_or_else(|| {
            X402Error::config(format!(
                "network {network} is not configured; configured networks: {:?}",
                self.networks.names()
            ))
        })?;

        parse_amount(max_amount_required).map_err(|e| X402Error::config(e.to_string()))?;

        if !looks_like_address(pay_to) {
            return Err(X402Error::config(format!(
                "pay_to is not a valid address: {pay_to}"
            )));
        }

        Ok(PaymentRequirements {
            scheme: schemes::EXACT.to_string(),
            network: network.to_string(),
            resource: resource.to_string(),
            description: description.to_string(),
            pay_to: pay_to.to_string(),
            max_amount_required: max_amount_required.to_string(),
            asset: chain.token_address.clone(),
            max_timeout_seconds: DEFAULT_MAX_TIMEOUT_SECONDS,
            extra: Some(AssetExtra {
                name: chain.token_name.clone(),
                version: chain.token_version.clone(),
                chain_id: chain.id,
            }),
        })
    }
}
