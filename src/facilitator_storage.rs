//! Nonce storage for facilitator replay protection
//!
//! Every authorization nonce moves through `unused -> claimed -> settled`. A claim is
//! atomic, so two concurrent settlements of the same authorization cannot both reach
//! the chain. A claim whose submission failed is released so the buyer can retry.

use crate::crypto::{self, eip712::parse_nonce};
use crate::types::PaymentPayload;
use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Identity of one authorization: the nonce is scoped to payer and network
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NonceKey {
    pub network: String,
    pub payer: String,
    pub nonce: String,
}

impl NonceKey {
    pub fn new(network: &str, payer: &str, nonce: &str) -> Self {
        Self {
            network: network.to_string(),
            payer: payer.to_ascii_lowercase(),
            nonce: nonce.to_ascii_lowercase(),
        }
    }

    /// Key for a payload's authorization
    ///
    /// Payer and nonce are parsed and re-encoded in lowercase `0x` hex, so every
    /// spelling of one authorization maps to the same key.
    pub fn from_payload(payload: &PaymentPayload) -> Result<Self> {
        let payer = crypto::parse_address(&payload.payer)?;
        let nonce = parse_nonce(&payload.nonce)?;
        Ok(Self {
            network: payload.network.clone(),
            payer: crypto::format_address(&payer),
            nonce: format!("{nonce:?}"),
        })
    }

    /// Flat key used by key-value backends
    pub fn storage_key(&self) -> String {
        format!("{}:{}:{}", self.network, self.payer, self.nonce)
    }
}

/// Trait for storing and retrieving nonce state
#[async_trait]
pub trait NonceStorage: Send + Sync {
    /// Check if a nonce is claimed or settled
    async fn has_nonce(&self, key: &NonceKey) -> Result<bool>;

    /// Atomically claim an unused nonce. Returns `false` if it was already taken.
    async fn claim_nonce(&self, key: &NonceKey) -> Result<bool>;

    /// Drop a claim that did not settle
    async fn release_nonce(&self, key: &NonceKey) -> Result<()>;

    /// Mark a claimed nonce as settled by `transaction`
    async fn record_settlement(&self, key: &NonceKey, transaction: &str) -> Result<()>;

    /// Transaction that settled a nonce, if any
    async fn settlement(&self, key: &NonceKey) -> Result<Option<String>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NonceState {
    Claimed,
    Settled(String),
}

/// In-memory storage implementation
///
/// Data is lost when the server restarts.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStorage {
    nonces: Arc<RwLock<HashMap<NonceKey, NonceState>>>,
}

impl InMemoryStorage {
    /// Create a new in-memory storage instance
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NonceStorage for InMemoryStorage {
    async fn has_nonce(&self, key: &NonceKey) -> Result<bool> {
        Ok(self.nonces.read().await.contains_key(key))
    }

    async fn claim_nonce(&self, key: &NonceKey) -> Result<bool> {
        let mut nonces = self.nonces.write().await;
        if nonces.contains_key(key) {
            return Ok(false);
        }
        nonces.insert(key.clone(), NonceState::Claimed);
        Ok(true)
    }

    async fn release_nonce(&self, key: &NonceKey) -> Result<()> {
        let mut nonces = self.nonces.write().await;
        if nonces.get(key) == Some(&NonceState::Claimed) {
            nonces.remove(key);
        }
        Ok(())
    }

    async fn record_settlement(&self, key: &NonceKey, transaction: &str) -> Result<()> {
        self.nonces
            .write()
            .await
            .insert(key.clone(), NonceState::Settled(transaction.to_string()));
        Ok(())
    }

    async fn settlement(&self, key: &NonceKey) -> Result<Option<String>> {
        Ok(match self.nonces.read().await.get(key) {
            Some(NonceState::Settled(transaction)) => Some(transaction.clone()),
            _ => None,
        })
    }
}


#[cfg(feature = "redis")]
pub mod redis_storage {
    use super::{NonceKey, NonceStorage, Result};
    use crate::X402Error;
    use redis::{AsyncCommands, Client};

    const CLAIMED: &str = "claimed";
    const SETTLED_PREFIX: &str = "settled:";

    /// Redis-based storage implementation
    ///
    /// Nonce state survives restarts and is shared by every facilitator pointing at
    /// the same Redis. Keys expire after `ttl_secs`, which must exceed the longest
    /// authorization window.
    #[derive(Debug, Clone)]
    pub struct RedisStorage {
        client: Client,
        key_prefix: String,
        ttl_secs: u64,
    }

    impl RedisStorage {
        /// Create a new Redis storage instance
        ///
        /// # Arguments
        ///
        /// * `redis_url` - Redis connection URL (e.g., "redis://localhost:6379")
        /// * `key_prefix` - Optional prefix for Redis keys (default: "x402:nonce:")
        pub async fn new(redis_url: &str, key_prefix: Option<&str>) -> Result<Self> {
            let client = Client::open(redis_url)
                .map_err(|e| X402Error::config(format!("Failed to connect to Redis: {}", e)))?;

            let key_prefix = key_prefix.unwrap_or("x402:nonce:").to_string();

            Ok(Self {
                client,
                key_prefix,
                ttl_secs: 86400,
            })
        }

        pub fn with_ttl(mut self, ttl_secs: u64) -> Self {
            self.ttl_secs = ttl_secs;
            self
        }

        fn make_key(&self, key: &NonceKey) -> String {
            format!("{}{}", self.key_prefix, key.storage_key())
        }

        async fn connection(&self) -> Result<redis::aio::MultiplexedConnection> {
            self.client
                .get_multiplexed_async_connection()
                .await
                .map_err(|e| X402Error::storage(format!("Failed to get Redis connection: {}", e)))
        }
    }

    #[async_trait::async_trait]
    impl NonceStorage for RedisStorage {
        async fn has_nonce(&self, key: &NonceKey) -> Result<bool> {
            let mut conn = self.connection().await?;
            conn.exists::<_, bool>(self.make_key(key))
                .await
                .map_err(|e| X402Error::storage(format!("Redis EXISTS command failed: {}", e)))
        }

        async fn claim_nonce(&self, key: &NonceKey) -> Result<bool> {
            let mut conn = self.connection().await?;
            let reply: Option<String> = redis::cmd("SET")
                .arg(self.make_key(key))
                .arg(CLAIMED)
                .arg("NX")
                .arg("EX")
                .arg(self.ttl_secs)
                .query_async(&mut conn)
                .await
                .map_err(|e| X402Error::storage(format!("Redis SET NX command failed: {}", e)))?;
            Ok(reply.is_some())
        }

        async fn release_nonce(&self, key: &NonceKey) -> Result<()> {
            let mut conn = self.connection().await?;
            let redis_key = self.make_key(key);
            let current: Option<String> = conn
                .get(&redis_key)
                .await
                .map_err(|e| X402Error::storage(format!("Redis GET command failed: {}", e)))?;
            if current.as_deref() == Some(CLAIMED) {
                conn.del::<_, ()>(&redis_key)
                    .await
                    .map_err(|e| X402Error::storage(format!("Redis DEL command failed: {}", e)))?;
            }
            Ok(())
        }

        async fn record_settlement(&self, key: &NonceKey, transaction: &str) -> Result<()> {
            let mut conn = self.connection().await?;
            conn.set_ex::<_, _, ()>(
                self.make_key(key),
                format!("{SETTLED_PREFIX}{transaction}"),
                self.ttl_secs,
            )
            .await
            .map_err(|e| X402Error::storage(format!("Redis SET command failed: {}", e)))
        }

        async fn settlement(&self, key: &NonceKey) -> Result<Option<String>> {
            let mut conn = self.connection().await?;
            let current: Option<String> = conn
                .get(self.make_key(key))
                .await
                .map_err(|e| X402Error::storage(format!("Redis GET command failed: {}", e)))?;
            Ok(current.and_then(|value| value.strip_prefix(SETTLED_PREFIX).map(str::to_string)))
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use std::env;

        /// Tests are skipped when Redis is not reachable
        async fn test_storage() -> Option<RedisStorage> {
            let redis_url =
                env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
            let prefix = format!("test:{}:", uuid::Uuid::new_v4());
            let storage = RedisStorage::new(&redis_url, Some(&prefix)).await.ok()?;
            match storage.connection().await {
                Ok(_) => Some(storage),
                Err(_) => {
                    println!("Skipping Redis test: Redis not available at {}", redis_url);
                    None
                }
            }
        }

        fn key(nonce: &str) -> NonceKey {
            NonceKey::new("localhost", "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266", nonce)
        }

        #[tokio::test]
        async fn test_redis_storage_custom_prefix() {
            let storage = RedisStorage::new("redis://localhost:6379", Some("test:prefix:"))
                .await
                .unwrap();
            assert_eq!(storage.key_prefix, "test:prefix:");
            assert_eq!(
                storage.make_key(&key("0x01")),
                "test:prefix:localhost:0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266:0x01"
            );
        }

        #[tokio::test]
        async fn test_redis_claim_settle_cycle() {
            let Some(storage) = test_storage().await else {
                return;
            };
            let nonce = key("0x02");

            assert!(!storage.has_nonce(&nonce).await.unwrap());
            assert!(storage.claim_nonce(&nonce).await.unwrap());
            assert!(!storage.claim_nonce(&nonce).await.unwrap());
            assert_eq!(storage.settlement(&nonce).await.unwrap(), None);

            storage.record_settlement(&nonce, "0xtx").await.unwrap();
            storage.release_nonce(&nonce).await.unwrap();
            assert_eq!(
                storage.settlement(&nonce).await.unwrap().as_deref(),
                Some("0xtx")
            );
        }

        #[tokio::test]
        async fn test_redis_release() {
            let Some(storage) = test_storage().await else {
                return;
            };
            let nonce = key("0x03");
            assert!(storage.claim_nonce(&nonce).await.unwrap());
            storage.release_nonce(&nonce).await.unwrap();
            assert!(!storage.has_nonce(&nonce).await.unwrap());
        }

        #[tokio::test]
        async fn test_redis_storage_ttl() {
            let Some(storage) = test_storage().await else {
                return;
            };
            let nonce = key("0x04");
            storage.claim_nonce(&nonce).await.unwrap();

            let mut conn = storage.connection().await.unwrap();
            let ttl: i64 = conn.ttl(storage.make_key(&nonce)).await.unwrap();
            assert!(ttl > 0 && ttl <= 86400);

            storage.release_nonce(&nonce).await.unwrap();
        }
    }
}
