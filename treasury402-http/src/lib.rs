#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! HTTP side of the treasury unlock flow.
//!
//! [`NegotiationClient`] speaks to the resource server: it fetches the
//! payment challenge for a resource and resubmits the request with the
//! signed proof. [`PaymentContext`] owns the session state and drives the
//! whole flow: connect, fetch, sign, submit.
//!
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//!
//! use treasury402::networks::{BASE_MAINNET, NetworkRegistry};
//! use treasury402::wallet::{WalletHost, WalletKind};
//! use treasury402_http::{ClientConfig, NegotiationClient, PaymentContext, StaticAuth};
//!
//! # let provider: Arc<dyn treasury402::WalletProvider> = unimplemented!();
//! let client = NegotiationClient::new(ClientConfig::load()?, Arc::new(StaticAuth::bearer("token")))?;
//! let context = PaymentContext::new(NetworkRegistry::builtin(), WalletHost::single(provider), client)?;
//!
//! context.connect_wallet(WalletKind::MetaMask).await?;
//! let challenge = context.fetch_payment_info(&BASE_MAINNET, "abc123").await?;
//! println!("paying {} to {}", challenge.amount, challenge.pay_to);
//! let content_url = context.execute_payment().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`client`] - Challenge fetch and proof resubmission over `reqwest`
//! - [`context`] - The single-writer payment state machine
//! - [`config`] - TOML configuration with environment expansion
//! - [`auth`] - Read-only access to the sign-in session
//! - [`constants`] - Header names, paths and defaults
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation

pub mod auth;
pub mod client;
pub mod config;
pub mod constants;
pub mod context;

pub use auth::{AuthSession, StaticAuth};
pub use client::{FetchedChallenge, NegotiationClient};
pub use config::{ClientConfig, ConfigError};
pub use context::PaymentContext;
