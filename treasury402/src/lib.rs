#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core types for the treasury pay-per-content unlock flow.
//!
//! Gated content on the treasury platform is unlocked with an HTTP-402-style
//! challenge/response exchange: the resource server answers an unpaid request
//! with an EIP-712 typed-data template describing an ERC-3009
//! `TransferWithAuthorization`, the user's wallet signs it, and the client
//! resubmits the request with the signature in an `X-PAYMENT` header.
//! Settlement happens off-client.
//!
//! This crate holds everything that does not need an HTTP stack or local
//! key material. Transport lives in `treasury402-http`, EIP-712 hashing
//! and the local key wallet in `treasury402-evm`.
//!
//! # Modules
//!
//! - [`networks`] - Network/asset registry and default network selection
//! - [`wallet`] - Wallet kinds, the provider interface, locator, connect and signing
//! - [`proto`] - Challenge and typed-data wire types, payment-proof header
//! - [`session`] - The payment session state record and its transitions
//! - [`error`] - The payment error taxonomy
//! - [`timestamp`] - Unix timestamps for authorization validity windows
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation
//! - `test-utils` - Exposes a scriptable [`wallet::mock::MockProvider`]

pub mod error;
pub mod networks;
pub mod proto;
pub mod session;
pub mod timestamp;
pub mod wallet;

pub use error::PaymentError;
pub use networks::{Currency, NetworkId, NetworkProfile, NetworkRegistry};
pub use proto::{PaymentChallenge, PaymentProofHeader, SignedAuthorization, TypedData};
pub use session::{PaymentPhase, PaymentSessionState, SessionView};
pub use wallet::{WalletKind, WalletProvider, WalletSession};
