#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! EIP-712 / ERC-3009 support for the treasury unlock flow.
//!
//! Resource servers ask for an ERC-3009 `transferWithAuthorization`
//! signature. This crate computes the EIP-712 signing hash for such a
//! typed-data bundle, recovers the signer from a signature over it, builds
//! the bundle locally when a server only sends a flat challenge, and
//! provides [`LocalWallet`], a private-key wallet that speaks the same
//! EIP-1193 surface as a browser extension.
//!
//! # Modules
//!
//! - [`authorization`] - Builds `TransferWithAuthorization` typed data
//! - [`verify`] - Signing hash and signer recovery
//! - [`local`] - Private-key [`WalletProvider`](treasury402::WalletProvider)
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation

pub mod authorization;
pub mod local;
pub mod verify;

mod error;

pub use authorization::{TransferAuthorizationParams, build_transfer_authorization};
pub use error::AuthorizationError;
pub use local::LocalWallet;
pub use verify::{recover_signer, signing_hash, verify_signed_authorization};
