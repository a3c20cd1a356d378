//! # x402 payment gating
//!
//! HTTP 402 micropayments for services and their clients. A **seller** gate puts a
//! price on a resource, answers unpaid requests with a payment challenge and only
//! serves requests whose payment a facilitator has verified and settled. A **buyer**
//! gate sits in front of outbound calls, answers challenges by signing an EIP-3009
//! `transferWithAuthorization` and resends the request.
//!
//! ## Quick Start
//!
//! ### Protecting a route
//!
//! ```rust,no_run
//! use axum::{middleware, routing::get, Router};
//! use std::sync::Arc;
//! use x402_pay::{
//!     config::SellerConfig,
//!     facilitator::FacilitatorClient,
//!     middleware::{seller_middleware, SellerGate},
//!     types::{ChainNetworkConfig, FacilitatorConfig, NetworkTable, TokenType},
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let networks = NetworkTable::builder()
//!         .with_network(ChainNetworkConfig {
//!             name: "localhost".to_string(),
//!             rpc: "http://127.0.0.1:8545".to_string(),
//!             id: 31337,
//!             token_address: "0x5FbDB2315678afecb367f032d93F642f64180aa3".to_string(),
//!             token_name: "USD Coin".to_string(),
//!             token_version: "2".to_string(),
//!             token_decimals: 6,
//!             token_type: TokenType::Erc20,
//!         })
//!         .build()?;
//!
//!     let facilitator = FacilitatorClient::new(FacilitatorConfig::new("http://127.0.0.1:4021"))?;
//!     let gate = SellerGate::new(
//!         SellerConfig::new(
//!             "localhost",
//!             "/joke",
//!             "0x70997970C51812dc3A010C7d01b50e0d17dc79C8",
//!             "10000",
//!         ),
//!         networks,
//!         Arc::new(facilitator),
//!     )?;
//!
//!     let app = Router::new()
//!         .route("/joke", get(|| async { "Why do programmers prefer dark mode?" }))
//!         .layer(middleware::from_fn_with_state(gate, seller_middleware));
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:4021").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **`types`**: wire types, network table and protocol constants
//! - **`requirements`**: builds the requirements a seller advertises
//! - **`crypto`**: EIP-712 hashing, signature recovery and nonces
//! - **`wallet`**: signing key that produces payment payloads
//! - **`facilitator`**: verify/settle contract, remote client and in-process facilitator
//! - **`facilitator_storage`**: replay protection (in-memory, or Redis with the `redis` feature)
//! - **`middleware`**: seller and buyer gates for axum and tower
//! - **`proxy`**: upstream forwarding for the gateway binary
//! - **`server`**: facilitator HTTP API
//! - **`config`**: JSON configuration for the binaries
//! - **`error`**: error type with HTTP status mapping
//!
//! ## Optional Features
//!
//! - **`axum`** (default): gates, proxy, facilitator server and both binaries
//! - **`redis`**: Redis-backed nonce storage

pub mod config;
pub mod crypto;
pub mod error;
pub mod facilitator;
pub mod facilitator_storage;
pub mod requirements;
pub mod types;
pub mod wallet;

#[cfg(feature = "axum")]
pub mod middleware;
#[cfg(feature = "axum")]
pub mod proxy;
#[cfg(feature = "axum")]
pub mod server;

pub use error::{Result, X402Error};
pub use types::X402_VERSION;
pub use wallet::Wallet;

/// Current version of the x402 library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
