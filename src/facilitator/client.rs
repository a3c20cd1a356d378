//! HTTP client for a remote facilitator service

use super::Facilitator;
use crate::types::{
    FacilitatorConfig, PaymentPayload, PaymentRequirements, SettleResponse, SupportedKinds,
    VerifyRequest, VerifyResponse,
};
use crate::{Result, X402Error};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;

/// Facilitator client for verifying and settling payments
#[derive(Debug, Clone)]
pub struct FacilitatorClient {
    /// Base URL of the facilitator service, without trailing slash
    url: String,
    /// HTTP client
    client: Client,
}

impl FacilitatorClient {
    /// Create a new facilitator client
    pub fn new(config: FacilitatorConfig) -> Result<Self> {
        config.validate()?;

        let mut client_builder = Client::builder();

        if let Some(timeout) = config.timeout {
            client_builder = client_builder.timeout(timeout);
        }

        let client = client_builder
            .build()
            .map_err(|e| X402Error::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            url: config.url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Get the base URL of this facilitator
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: &VerifyRequest) -> Result<T> {
        let endpoint = format!("{}/{}", self.url, path);
        tracing::debug!(
            endpoint = %endpoint,
            network = %body.payment_requirements.network,
            "Sending facilitator request"
        );

        let response = self.client.post(&endpoint).json(body).send().await?;
        let status = response.status();

        if !status.is_success() {
            let response_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read response body".to_string());
            tracing::error!(
                endpoint = %endpoint,
                status = %status,
                response = %response_body,
                "Facilitator request failed"
            );
            return Err(X402Error::facilitator_error(format!(
                "{} failed with status: {}. Response: {}",
                path, status, response_body
            )));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl Facilitator for FacilitatorClient {
    async fn verify(
        &self,
        payment_payload: &PaymentPayload,
        payment_requirements: &PaymentRequirements,
    ) -> Result<VerifyResponse> {
        let request = VerifyRequest::new(payment_payload.clone(), payment_requirements.clone());
        self.post("verify", &request).await
    }

    async fn settle(
        &self,
        payment_payload: &PaymentPayload,
        payment_requirements: &PaymentRequirements,
    ) -> Result<SettleResponse> {
        let request = VerifyRequest::new(payment_payload.clone(), payment_requirements.clone());
        self.post("settle", &request).await
    }

    async fn supported(&self) -> Result<SupportedKinds> {
        let response = self
            .client
            .get(format!("{}/supported", self.url))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(X402Error::facilitator_error(format!(
                "Failed to get supported kinds with status: {}",
                response.status()
            )));
        }

        Ok(response.json().await?)
    }
}
