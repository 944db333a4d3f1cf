//! Error taxonomy for the unlock flow.
//!
//! Errors fall into three groups, which callers are expected to treat
//! differently:
//!
//! - **Wallet-originated** ([`PaymentError::WalletNotInstalled`],
//!   [`PaymentError::NoAccountSelected`], [`PaymentError::SignatureRejected`]):
//!   expected, user-recoverable outcomes. They carry enough detail to render
//!   an install prompt or a retry button.
//! - **Network-originated** ([`PaymentError::ChallengeFetchFailed`],
//!   [`PaymentError::PaymentSubmissionFailed`]): carry the HTTP status and
//!   message. Nothing in this workspace retries them.
//! - **Contract violations** ([`PaymentError::WalletNotConnected`],
//!   [`PaymentError::MissingChallenge`], [`PaymentError::PaymentInProgress`]):
//!   the caller drove the flow out of order. They are detected before any I/O.

use alloy_primitives::Address;

use crate::networks::RegistryError;
use crate::wallet::{ProviderError, WalletKind};

/// Errors surfaced by the payment flow.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PaymentError {
    /// No provider for the requested wallet kind is present on the host.
    #[error("{0} is not installed")]
    WalletNotInstalled(WalletKind),

    /// The wallet is installed but exposed no account, or the user declined access.
    #[error("no account selected in {kind}: {reason}")]
    NoAccountSelected {
        /// The wallet kind that was asked for an account.
        kind: WalletKind,
        /// What the wallet reported.
        reason: String,
    },

    /// The wallet is acting for a different address than the session expects.
    #[error("wallet mismatch: expected {expected}, wallet is using {actual}")]
    WalletMismatch {
        /// Address bound to the session.
        expected: Address,
        /// Address the wallet reported or the signature recovered to.
        actual: Address,
    },

    /// The challenge request failed or its body could not be understood.
    #[error("challenge fetch failed{}: {message}", status_suffix(.status.as_ref()))]
    ChallengeFetchFailed {
        /// HTTP status, if a response was received.
        status: Option<u16>,
        /// Underlying reason.
        message: String,
    },

    /// An operation that needs a connected wallet was called without one.
    #[error("wallet not connected")]
    WalletNotConnected,

    /// `execute_payment` was called without an active challenge.
    #[error("no payment challenge is active; fetch payment info first")]
    MissingChallenge,

    /// The user declined the signature request in the wallet UI.
    #[error("signature rejected: {0}")]
    SignatureRejected(String),

    /// The resubmission carrying the payment proof was not accepted.
    #[error("payment submission failed{}: {message}", status_suffix(.status.as_ref()))]
    PaymentSubmissionFailed {
        /// HTTP status, if a response was received.
        status: Option<u16>,
        /// Underlying reason.
        message: String,
    },

    /// A signature or submission is already in flight for this session.
    #[error("a payment is already in progress")]
    PaymentInProgress,

    /// The wallet or the negotiation changed while this operation was suspended.
    /// Its result was discarded.
    #[error("payment session changed while the operation was in flight")]
    SessionChanged,

    /// Any other error reported by the wallet provider.
    #[error("wallet provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Network or currency is missing from the registry.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The signature or authorization failed local validation.
    #[error("invalid authorization: {0}")]
    Authorization(String),

    /// The payment proof header could not be encoded.
    #[error("payment proof encoding failed: {0}")]
    Encoding(String),

    /// Client configuration does not cover the requested operation.
    #[error("configuration error: {0}")]
    Config(String),
}

impl PaymentError {
    /// Creates a [`PaymentError::ChallengeFetchFailed`].
    #[must_use]
    pub fn challenge_fetch(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::ChallengeFetchFailed {
            status,
            message: message.into(),
        }
    }

    /// Creates a [`PaymentError::PaymentSubmissionFailed`].
    #[must_use]
    pub fn submission(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::PaymentSubmissionFailed {
            status,
            message: message.into(),
        }
    }

    /// Returns `true` for outcomes the user can resolve in the wallet UI.
    #[must_use]
    pub const fn is_user_recoverable(&self) -> bool {
        matches!(
            self,
            Self::WalletNotInstalled(_)
                | Self::NoAccountSelected { .. }
                | Self::SignatureRejected(_)
                | Self::WalletMismatch { .. }
        )
    }

    /// Returns `true` when the caller invoked the flow out of order.
    #[must_use]
    pub const fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::WalletNotConnected | Self::MissingChallenge | Self::PaymentInProgress
        )
    }
}

fn status_suffix(status: Option<&u16>) -> String {
    status.map_or_else(String::new, |s| format!(" (HTTP {s})"))
}
