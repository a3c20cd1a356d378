//! Tests for the facilitator client, the local facilitator and settlement

use super::local::reasons;
use super::{EvmRpcSettler, Facilitator, FacilitatorClient, LocalFacilitator, Settler};
use crate::crypto::NonceStrategy;
use crate::facilitator_storage::{InMemoryStorage, NonceKey, NonceStorage};
use crate::requirements::RequirementsBuilder;
use crate::types::{
    ChainNetworkConfig, FacilitatorConfig, NetworkTable, PaymentPayload, PaymentRequirements,
    TokenType,
};
use crate::wallet::Wallet;
use crate::{Result, X402Error};
use async_trait::async_trait;
use mockito::{Matcher, Server};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const PAYER_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
const FACILITATOR_KEY: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";
const PAY_TO: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";
const NOW: u64 = 1_700_000_000;

fn localhost(rpc: &str) -> ChainNetworkConfig {
    ChainNetworkConfig {
        name: "localhost".to_string(),
        rpc: rpc.to_string(),
        id: 31337,
        token_address: "0x5FbDB2315678afecb367f032d93F642f64180aa3".to_string(),
        token_name: "USD Coin".to_string(),
        token_version: "2".to_string(),
        token_decimals: 6,
        token_type: TokenType::Erc20,
    }
}

fn table() -> Arc<NetworkTable> {
    NetworkTable::builder()
        .with_network(localhost("http://127.0.0.1:8545"))
        .build()
        .unwrap()
}

fn requirements(max_amount_required: &str) -> PaymentRequirements {
    RequirementsBuilder::new(table())
        .build("/weather", "Weather report", "localhost", PAY_TO, max_amount_required)
        .unwrap()
}

fn signed_payload(requirements: &PaymentRequirements, now: u64) -> PaymentPayload {
    Wallet::from_private_key(PAYER_KEY)
        .unwrap()
        .create_payment_payload(requirements, now, NonceStrategy::Random)
        .unwrap()
}

/// Settler that counts submissions and can be told to fail
#[derive(Default)]
struct StubSettler {
    calls: AtomicUsize,
    fail: bool,
}

#[async_trait]
impl Settler for StubSettler {
    async fn submit_transfer(
        &self,
        _network: &ChainNetworkConfig,
        _payload: &PaymentPayload,
    ) -> Result<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(X402Error::chain_rpc("insufficient funds for gas"));
        }
        Ok(format!("0x{:064x}", call + 1))
    }
}

fn local(settler: Arc<StubSettler>) -> LocalFacilitator {
    LocalFacilitator::new(table(), Arc::new(InMemoryStorage::new()), settler)
}

// Remote client

#[tokio::test]
async fn test_facilitator_client_creation() {
    let config = FacilitatorConfig::new("https://example.com/facilitator/");
    let client = FacilitatorClient::new(config).unwrap();
    assert_eq!(client.url(), "https://example.com/facilitator");
}

#[test]
fn test_facilitator_client_creation_with_invalid_config() {
    let result = FacilitatorClient::new(FacilitatorConfig::new("not-a-url"));
    assert!(matches!(result, Err(X402Error::Config { .. })));
}

#[tokio::test]
async fn test_facilitator_verify_success() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/verify")
        .match_body(Matcher::PartialJson(json!({
            "x402Version": 1,
            "paymentRequirements": { "network": "localhost", "payTo": PAY_TO }
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "isValid": true,
                "payer": "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
            })
            .to_string(),
        )
        .create_async()
        .await;

    let client = FacilitatorClient::new(FacilitatorConfig::new(server.url())).unwrap();
    let requirements = requirements("1000000");
    let payload = signed_payload(&requirements, NOW);

    let response = client.verify(&payload, &requirements).await.unwrap();
    assert!(response.is_valid);
    assert_eq!(
        response.payer.as_deref(),
        Some("0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266")
    );
    mock.assert_async().await;
}

#[tokio::test]
async fn test_facilitator_verify_failure() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/verify")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({ "isValid": false, "invalidReason": "authorization_expired" }).to_string(),
        )
        .create_async()
        .await;

    let client = FacilitatorClient::new(FacilitatorConfig::new(server.url())).unwrap();
    let requirements = requirements("1000000");
    let response = client
        .verify(&signed_payload(&requirements, NOW), &requirements)
        .await
        .unwrap();
    assert!(!response.is_valid);
    assert_eq!(response.invalid_reason.as_deref(), Some("authorization_expired"));
}

#[tokio::test]
async fn test_facilitator_settle_success() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/settle")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "success": true,
                "transaction": "0xabc",
                "network": "localhost",
                "payer": "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
            })
            .to_string(),
        )
        .create_async()
        .await;

    let client = FacilitatorClient::new(FacilitatorConfig::new(server.url())).unwrap();
    let requirements = requirements("1000000");
    let response = client
        .settle(&signed_payload(&requirements, NOW), &requirements)
        .await
        .unwrap();
    assert!(response.success);
    assert_eq!(response.transaction, "0xabc");
}

#[tokio::test]
async fn test_facilitator_settle_failure() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/settle")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "success": false, "errorReason": "insufficient_funds" }).to_string())
        .create_async()
        .await;

    let client = FacilitatorClient::new(FacilitatorConfig::new(server.url())).unwrap();
    let requirements = requirements("1000000");
    let response = client
        .settle(&signed_payload(&requirements, NOW), &requirements)
        .await
        .unwrap();
    assert!(!response.success);
    assert_eq!(response.error_reason.as_deref(), Some("insufficient_funds"));
    assert!(response.transaction.is_empty());
}

#[tokio::test]
async fn test_facilitator_server_error() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/verify")
        .with_status(500)
        .with_body("Internal Server Error")
        .create_async()
        .await;

    let client = FacilitatorClient::new(FacilitatorConfig::new(server.url())).unwrap();
    let requirements = requirements("1000000");
    let err = client
        .verify(&signed_payload(&requirements, NOW), &requirements)
        .await
        .unwrap_err();
    assert!(matches!(err, X402Error::Facilitator { .. }));
    assert!(err.to_string().contains("500"));
}

#[tokio::test]
async fn test_facilitator_supported() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/supported")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "kinds": [{ "x402Version": 1, "scheme": "exact", "network": "localhost" }]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let client = FacilitatorClient::new(FacilitatorConfig::new(server.url())).unwrap();
    let supported = client.supported().await.unwrap();
    assert_eq!(supported.kinds.len(), 1);
    assert_eq!(supported.kinds[0].network, "localhost");
}

#[tokio::test]
async fn test_facilitator_timeout() {
    let client = FacilitatorClient::new(
        FacilitatorConfig::new("http://10.255.255.1:9").with_timeout(Duration::from_millis(50)),
    )
    .unwrap();
    let requirements = requirements("1000000");
    let result = client
        .verify(&signed_payload(&requirements, NOW), &requirements)
        .await;
    assert!(matches!(result, Err(X402Error::Http(_))));
}

// Local facilitator

#[tokio::test]
async fn test_verify_then_settle_once_per_nonce() {
    let settler = Arc::new(StubSettler::default());
    let facilitator = local(settler.clone());
    let requirements = requirements("1000000");
    let payload = signed_payload(&requirements, NOW);

    let verified = facilitator.verify_at(&payload, &requirements, NOW).await.unwrap();
    assert!(verified.is_valid, "{:?}", verified.invalid_reason);
    assert_eq!(verified.payer.as_deref(), Some(payload.payer.as_str()));

    let settled = facilitator.settle_at(&payload, &requirements, NOW).await.unwrap();
    assert!(settled.success, "{:?}", settled.error_reason);
    assert_eq!(settled.network, "localhost");
    assert_eq!(settled.payer.as_deref(), Some(payload.payer.as_str()));

    let replay = facilitator.settle_at(&payload, &requirements, NOW).await.unwrap();
    assert!(!replay.success);
    assert_eq!(replay.error_reason.as_deref(), Some(reasons::NONCE_ALREADY_SETTLED));
    assert_eq!(replay.transaction, settled.transaction);
    assert_eq!(settler.calls.load(Ordering::SeqCst), 1);

    let reverify = facilitator.verify_at(&payload, &requirements, NOW).await.unwrap();
    assert_eq!(reverify.invalid_reason.as_deref(), Some(reasons::NONCE_ALREADY_USED));
}

#[tokio::test]
async fn test_respelled_nonce_cannot_settle_twice() {
    let settler = Arc::new(StubSettler::default());
    let facilitator = local(settler.clone());
    let requirements = requirements("1000000");
    let payload = signed_payload(&requirements, NOW);

    let settled = facilitator.settle_at(&payload, &requirements, NOW).await.unwrap();
    assert!(settled.success, "{:?}", settled.error_reason);

    let mut upper = payload.clone();
    upper.nonce = format!("0x{}", payload.nonce[2..].to_ascii_uppercase());
    upper.payer = format!("0x{}", payload.payer[2..].to_ascii_uppercase());
    let verified = facilitator.verify_at(&upper, &requirements, NOW).await.unwrap();
    assert_eq!(verified.invalid_reason.as_deref(), Some(reasons::NONCE_ALREADY_USED));
    let replay = facilitator.settle_at(&upper, &requirements, NOW).await.unwrap();
    assert_eq!(replay.error_reason.as_deref(), Some(reasons::NONCE_ALREADY_SETTLED));
    assert_eq!(replay.transaction, settled.transaction);

    let mut unprefixed = payload.clone();
    unprefixed.nonce = payload.nonce.trim_start_matches("0x").to_string();
    let verified = facilitator
        .verify_at(&unprefixed, &requirements, NOW)
        .await
        .unwrap();
    assert!(!verified.is_valid);
    let replay = facilitator
        .settle_at(&unprefixed, &requirements, NOW)
        .await
        .unwrap();
    assert!(!replay.success);

    assert_eq!(settler.calls.load(Ordering::SeqCst), 1);
}

/// Storage that claims nonces but cannot record settlements
#[derive(Default)]
struct UnrecordableStorage {
    inner: InMemoryStorage,
}

#[async_trait]
impl NonceStorage for UnrecordableStorage {
    async fn has_nonce(&self, key: &NonceKey) -> Result<bool> {
        self.inner.has_nonce(key).await
    }

    async fn claim_nonce(&self, key: &NonceKey) -> Result<bool> {
        self.inner.claim_nonce(key).await
    }

    async fn release_nonce(&self, key: &NonceKey) -> Result<()> {
        self.inner.release_nonce(key).await
    }

    async fn record_settlement(&self, _key: &NonceKey, _transaction: &str) -> Result<()> {
        Err(X402Error::storage("connection reset"))
    }

    async fn settlement(&self, key: &NonceKey) -> Result<Option<String>> {
        self.inner.settlement(key).await
    }
}

#[tokio::test]
async fn test_submitted_transfer_reported_when_recording_fails() {
    let settler = Arc::new(StubSettler::default());
    let facilitator = LocalFacilitator::new(
        table(),
        Arc::new(UnrecordableStorage::default()),
        settler.clone(),
    );
    let requirements = requirements("1000000");
    let payload = signed_payload(&requirements, NOW);

    let settled = facilitator.settle_at(&payload, &requirements, NOW).await.unwrap();
    assert!(settled.success);
    assert_eq!(settled.transaction, format!("0x{:064x}", 1));

    let replay = facilitator.settle_at(&payload, &requirements, NOW).await.unwrap();
    assert_eq!(replay.error_reason.as_deref(), Some(reasons::NONCE_ALREADY_USED));
    assert_eq!(settler.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_concurrent_settlements_settle_once() {
    let settler = Arc::new(StubSettler::default());
    let facilitator = Arc::new(local(settler.clone()));
    let requirements = requirements("1000000");
    let payload = signed_payload(&requirements, NOW);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let facilitator = facilitator.clone();
        let payload = payload.clone();
        let requirements = requirements.clone();
        handles.push(tokio::spawn(async move {
            facilitator.settle_at(&payload, &requirements, NOW).await.unwrap()
        }));
    }
    let mut successes = 0;
    for handle in handles {
        if handle.await.unwrap().success {
            successes += 1;
        }
    }
    assert_eq!(successes, 1);
    assert_eq!(settler.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_zero_requirement_rejects_nonzero_amount() {
    let facilitator = local(Arc::new(StubSettler::default()));
    let mut payload = signed_payload(&requirements("1"), NOW);
    payload.amount = "1".to_string();
    let response = facilitator
        .verify_at(&payload, &requirements("0"), NOW)
        .await
        .unwrap();
    assert_eq!(response.invalid_reason.as_deref(), Some(reasons::AMOUNT_EXCEEDS_MAXIMUM));
}

#[tokio::test]
async fn test_expired_authorization_rejected() {
    let facilitator = local(Arc::new(StubSettler::default()));
    let requirements = requirements("1000000");
    let payload = signed_payload(&requirements, NOW);

    let at_deadline = facilitator
        .verify_at(&payload, &requirements, payload.valid_before)
        .await
        .unwrap();
    assert_eq!(at_deadline.invalid_reason.as_deref(), Some(reasons::EXPIRED));

    let settled = facilitator
        .settle_at(&payload, &requirements, payload.valid_before + 10)
        .await
        .unwrap();
    assert!(!settled.success);
    assert_eq!(settled.error_reason.as_deref(), Some(reasons::EXPIRED));
}

#[tokio::test]
async fn test_not_yet_valid_and_inverted_window() {
    let facilitator = local(Arc::new(StubSettler::default()));
    let requirements = requirements("1000000");
    let mut payload = signed_payload(&requirements, NOW);

    let early = facilitator
        .verify_at(&payload, &requirements, payload.valid_after - 1)
        .await
        .unwrap();
    assert_eq!(early.invalid_reason.as_deref(), Some(reasons::NOT_YET_VALID));

    payload.valid_after = payload.valid_before;
    let inverted = facilitator.verify_at(&payload, &requirements, NOW).await.unwrap();
    assert_eq!(
        inverted.invalid_reason.as_deref(),
        Some(reasons::INVALID_VALIDITY_WINDOW)
    );
}

#[tokio::test]
async fn test_tampered_payload_rejected() {
    let facilitator = local(Arc::new(StubSettler::default()));
    let requirements = requirements("1000000");

    let mut payload = signed_payload(&requirements, NOW);
    payload.amount = "999999".to_string();
    let response = facilitator.verify_at(&payload, &requirements, NOW).await.unwrap();
    assert_eq!(response.invalid_reason.as_deref(), Some(reasons::INVALID_SIGNATURE));

    let mut payload = signed_payload(&requirements, NOW);
    payload.signature = "0x1234".to_string();
    let response = facilitator.verify_at(&payload, &requirements, NOW).await.unwrap();
    assert_eq!(response.invalid_reason.as_deref(), Some(reasons::INVALID_SIGNATURE));
}

#[tokio::test]
async fn test_scheme_network_and_recipient_checks() {
    let facilitator = local(Arc::new(StubSettler::default()));
    let requirements = requirements("1000000");

    let mut payload = signed_payload(&requirements, NOW);
    payload.scheme = "upto".to_string();
    let response = facilitator.verify_at(&payload, &requirements, NOW).await.unwrap();
    assert_eq!(response.invalid_reason.as_deref(), Some(reasons::UNSUPPORTED_SCHEME));

    let mut payload = signed_payload(&requirements, NOW);
    payload.network = "mainnet".to_string();
    let response = facilitator.verify_at(&payload, &requirements, NOW).await.unwrap();
    assert_eq!(response.invalid_reason.as_deref(), Some(reasons::NETWORK_MISMATCH));

    let mut other = requirements.clone();
    other.network = "mainnet".to_string();
    let response = facilitator.verify_at(&payload, &other, NOW).await.unwrap();
    assert_eq!(response.invalid_reason.as_deref(), Some(reasons::UNKNOWN_NETWORK));

    let mut payload = signed_payload(&requirements, NOW);
    payload.pay_to = "0x3C44CdDdB6a900fa2b585dd299e03d12FA4293BC".to_string();
    let response = facilitator.verify_at(&payload, &requirements, NOW).await.unwrap();
    assert_eq!(response.invalid_reason.as_deref(), Some(reasons::RECIPIENT_MISMATCH));
}

#[tokio::test]
async fn test_failed_submission_releases_nonce() {
    let facilitator = local(Arc::new(StubSettler {
        calls: AtomicUsize::new(0),
        fail: true,
    }));
    let requirements = requirements("1000000");
    let payload = signed_payload(&requirements, NOW);

    let response = facilitator.settle_at(&payload, &requirements, NOW).await.unwrap();
    assert!(!response.success);
    assert!(response
        .error_reason
        .unwrap()
        .starts_with(reasons::TRANSACTION_FAILED));

    let verified = facilitator.verify_at(&payload, &requirements, NOW).await.unwrap();
    assert!(verified.is_valid);
}

#[tokio::test]
async fn test_local_supported_kinds() {
    let facilitator = local(Arc::new(StubSettler::default()));
    let supported = facilitator.supported().await.unwrap();
    assert_eq!(supported.kinds.len(), 1);
    assert_eq!(supported.kinds[0].scheme, "exact");
    assert_eq!(supported.kinds[0].network, "localhost");
}

#[tokio::test]
async fn test_local_from_config() {
    let config = crate::config::LocalFacilitatorConfig::new(FACILITATOR_KEY);
    let facilitator =
        LocalFacilitator::from_config(&config, table(), Arc::new(InMemoryStorage::new())).unwrap();
    let supported = facilitator.supported().await.unwrap();
    assert_eq!(supported.kinds[0].network, "localhost");

    let mut config = crate::config::LocalFacilitatorConfig::new(FACILITATOR_KEY);
    config.supported_schemes = vec!["upto".to_string()];
    let err = LocalFacilitator::from_config(&config, table(), Arc::new(InMemoryStorage::new()))
        .unwrap_err();
    assert!(matches!(err, X402Error::Config { .. }));
}

// EVM settlement against a mocked JSON-RPC node

#[tokio::test]
async fn test_evm_settler_submits_raw_transaction() {
    let mut server = Server::new_async().await;
    let nonce_mock = server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({ "method": "eth_getTransactionCount" })))
        .with_status(200)
        .with_body(json!({ "jsonrpc": "2.0", "id": 1, "result": "0x5" }).to_string())
        .create_async()
        .await;
    let gas_mock = server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({ "method": "eth_gasPrice" })))
        .with_status(200)
        .with_body(json!({ "jsonrpc": "2.0", "id": 2, "result": "0x3b9aca00" }).to_string())
        .create_async()
        .await;
    let send_mock = server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({ "method": "eth_sendRawTransaction" })))
        .with_status(200)
        .with_body(json!({ "jsonrpc": "2.0", "id": 3, "result": "0xfeed" }).to_string())
        .create_async()
        .await;

    let settler =
        EvmRpcSettler::new(Wallet::from_private_key(FACILITATOR_KEY).unwrap(), 0, 0).unwrap();
    let network = localhost(&server.url());
    let requirements = requirements("1000000");
    let payload = signed_payload(&requirements, NOW);

    let transaction = settler.submit_transfer(&network, &payload).await.unwrap();
    assert_eq!(transaction, "0xfeed");
    nonce_mock.assert_async().await;
    gas_mock.assert_async().await;
    send_mock.assert_async().await;
}

#[tokio::test]
async fn test_evm_settler_surfaces_rpc_errors() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/")
        .with_status(200)
        .with_body(
            json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": { "code": -32000, "message": "insufficient funds" }
            })
            .to_string(),
        )
        .create_async()
        .await;

    let settler =
        EvmRpcSettler::new(Wallet::from_private_key(FACILITATOR_KEY).unwrap(), 0, 1).unwrap();
    let requirements = requirements("1000000");
    let payload = signed_payload(&requirements, NOW);

    let err = settler
        .submit_transfer(&localhost(&server.url()), &payload)
        .await
        .unwrap_err();
    assert!(matches!(err, X402Error::ChainRpc { .. }));
    assert!(err.to_string().contains("insufficient funds"));
}

#[test]
fn test_calldata_layout() {
    let requirements = requirements("1000000");
    let payload = signed_payload(&requirements, NOW);
    let data = super::settlement::transfer_with_authorization_calldata(&payload).unwrap();
    assert_eq!(data.len(), 4 + 32 * 9);
    assert_eq!(&data[..4], &[0xe3, 0xee, 0x16, 0x0e]);
    let v = data[4 + 32 * 6 + 31];
    assert!(v == 27 || v == 28);
}
