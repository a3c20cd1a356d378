//! Payment gates for axum and tower
//!
//! - [`seller`] - challenges unpaid requests and settles paid ones before serving
//! - [`buyer`] - answers payment challenges from downstream by signing and retrying
//! - [`capture`] - buffered responses the buyer inspects before passing them on
//! - [`service`] - tower `Layer`s for both gates
//!
//! # Examples
//!
//! ## Seller
//!
//! ```no_run
//! use axum::{routing::get, Router};
//! use std::sync::Arc;
//! use x402_pay::config::SellerConfig;
//! use x402_pay::facilitator::FacilitatorClient;
//! use x402_pay::middleware::{seller_middleware, SellerGate};
//! use x402_pay::types::{FacilitatorConfig, NetworkTable};
//!
//! # fn example(networks: Arc<NetworkTable>) -> x402_pay::Result<()> {
//! let facilitator = FacilitatorClient::new(FacilitatorConfig::new("http://127.0.0.1:4021"))?;
//! let gate = SellerGate::new(
//!     SellerConfig::new(
//!         "localhost",
//!         "/weather",
//!         "0x70997970C51812dc3A010C7d01b50e0d17dc79C8",
//!         "1000000",
//!     ),
//!     networks,
//!     Arc::new(facilitator),
//! )?;
//!
//! let app: Router = Router::new()
//!     .route("/weather", get(|| async { "sunny" }))
//!     .layer(axum::middleware::from_fn_with_state(gate, seller_middleware));
//! # Ok(())
//! # }
//! ```
//!
//! ## Buyer
//!
//! ```no_run
//! use x402_pay::config::BuyerConfig;
//! use x402_pay::middleware::{BuyerGate, BuyerLayer};
//!
//! # fn example() -> x402_pay::Result<()> {
//! let gate = BuyerGate::from_config(
//!     &BuyerConfig::new("env:BUYER_KEY").with_max_amount_pay("500000"),
//! )?;
//! let layer = BuyerLayer::new(gate);
//! # Ok(())
//! # }
//! ```

pub mod buyer;
pub mod capture;
pub mod seller;
pub mod service;


pub use buyer::{buyer_middleware, BuyerGate};
pub use capture::{BufferedResponse, Inspection};
pub use seller::{challenge_response, seller_middleware, SellerDecision, SellerGate};
pub use service::{BuyerLayer, BuyerService, SellerLayer, SellerService};
