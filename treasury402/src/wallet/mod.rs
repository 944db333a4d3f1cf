//! Wallet kinds, the EIP-1193 provider interface, and wallet sessions.
//!
//! A browser page may carry several injected wallet extensions at once, each
//! of which can impersonate the others' identity flags. [`locator`] picks the
//! genuine provider for a [`WalletKind`]; [`connect`] turns it into a
//! [`WalletSession`]; [`signing`] obtains typed-data signatures through the
//! call shape the wallet kind expects.

pub mod locator;
pub mod signing;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

use std::fmt::{self, Debug, Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::error::PaymentError;
use crate::networks::{NetworkId, NetworkRegistry};

pub use locator::{WalletHost, locate};
pub use signing::{SigningMethod, sign_typed_data};

/// `eth_requestAccounts`: prompts the user to grant account access.
pub const ETH_REQUEST_ACCOUNTS: &str = "eth_requestAccounts";
/// `eth_accounts`: lists accounts already granted to the page.
pub const ETH_ACCOUNTS: &str = "eth_accounts";
/// `eth_chainId`: current chain as a hex string.
pub const ETH_CHAIN_ID: &str = "eth_chainId";
/// `eth_signTypedData_v4`: EIP-712 signature request.
pub const ETH_SIGN_TYPED_DATA_V4: &str = "eth_signTypedData_v4";

/// The supported wallet implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletKind {
    /// MetaMask browser extension.
    MetaMask,
    /// Coinbase Wallet extension.
    Coinbase,
    /// OKX Wallet extension.
    Okx,
}

impl WalletKind {
    /// All supported kinds.
    pub const ALL: [Self; 3] = [Self::MetaMask, Self::Coinbase, Self::Okx];

    /// Stable lower-case tag, also used as the stored auth method.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MetaMask => "metamask",
            Self::Coinbase => "coinbase",
            Self::Okx => "okx",
        }
    }

    /// Name shown in install prompts.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::MetaMask => "MetaMask",
            Self::Coinbase => "Coinbase Wallet",
            Self::Okx => "OKX Wallet",
        }
    }

    /// The typed-data call shape this wallet accepts.
    #[must_use]
    pub const fn signing_method(self) -> SigningMethod {
        match self {
            Self::Okx => SigningMethod::ExtensionDirect,
            Self::MetaMask | Self::Coinbase => SigningMethod::Standard,
        }
    }
}

impl Display for WalletKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Returned when a string names no supported wallet kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown wallet kind: {0}")]
pub struct UnknownWalletKind(pub String);

impl FromStr for WalletKind {
    type Err = UnknownWalletKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "metamask" => Ok(Self::MetaMask),
            "coinbase" | "coinbasewallet" | "coinbase-wallet" => Ok(Self::Coinbase),
            "okx" | "okxwallet" | "okx-wallet" => Ok(Self::Okx),
            other => Err(UnknownWalletKind(other.to_owned())),
        }
    }
}

/// Identity markers an injected provider publishes about itself.
///
/// These are self-reported and untrusted; they are only used to tell
/// co-installed providers apart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct ProviderFlags {
    /// `isMetaMask`
    pub is_meta_mask: bool,
    /// `isCoinbaseWallet`
    pub is_coinbase_wallet: bool,
    /// `isOkxWallet`
    pub is_okx_wallet: bool,
    /// Presence of MetaMask's private `_metamask` object.
    pub has_meta_mask_internals: bool,
}

impl ProviderFlags {
    /// The flags a genuine provider of `kind` publishes.
    #[must_use]
    pub const fn for_kind(kind: WalletKind) -> Self {
        match kind {
            WalletKind::MetaMask => Self {
                is_meta_mask: true,
                is_coinbase_wallet: false,
                is_okx_wallet: false,
                has_meta_mask_internals: true,
            },
            WalletKind::Coinbase => Self {
                is_meta_mask: false,
                is_coinbase_wallet: true,
                is_okx_wallet: false,
                has_meta_mask_internals: false,
            },
            WalletKind::Okx => Self {
                is_meta_mask: false,
                is_coinbase_wallet: false,
                is_okx_wallet: true,
                has_meta_mask_internals: false,
            },
        }
    }

    /// Returns `true` if the provider claims the identity of `kind`.
    #[must_use]
    pub const fn claims(&self, kind: WalletKind) -> bool {
        match kind {
            WalletKind::MetaMask => self.is_meta_mask,
            WalletKind::Coinbase => self.is_coinbase_wallet,
            WalletKind::Okx => self.is_okx_wallet,
        }
    }
}

/// EIP-1193 error object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message} (code {code})")]
pub struct ProviderError {
    /// EIP-1193 / JSON-RPC error code.
    pub code: i64,
    /// Wallet-supplied message.
    pub message: String,
}

impl ProviderError {
    /// The user rejected the request.
    pub const USER_REJECTED: i64 = 4001;
    /// The requested method or account has not been authorized.
    pub const UNAUTHORIZED: i64 = 4100;
    /// The provider does not support the method.
    pub const UNSUPPORTED_METHOD: i64 = 4200;
    /// The provider is disconnected from all chains.
    pub const DISCONNECTED: i64 = 4900;
    /// JSON-RPC internal error.
    pub const INTERNAL: i64 = -32603;

    /// Creates a provider error.
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// A user-rejection error with the given message.
    #[must_use]
    pub fn user_rejected(message: impl Into<String>) -> Self {
        Self::new(Self::USER_REJECTED, message)
    }

    /// The wallet answered, but with something that is not the expected shape.
    #[must_use]
    pub fn malformed(method: &str, detail: impl Display) -> Self {
        Self::new(
            Self::INTERNAL,
            format!("unexpected {method} response: {detail}"),
        )
    }

    /// Returns `true` if the user dismissed the wallet prompt.
    #[must_use]
    pub const fn is_user_rejection(&self) -> bool {
        self.code == Self::USER_REJECTED
    }
}

/// An injected wallet provider.
///
/// Mirrors the EIP-1193 `request({ method, params })` surface plus the
/// self-reported identity flags. Implementations may suspend for an
/// unbounded time while the user interacts with the wallet.
#[async_trait::async_trait]
pub trait WalletProvider: Send + Sync {
    /// Identity markers used for disambiguation.
    fn flags(&self) -> ProviderFlags;

    /// Sends a JSON-RPC request to the wallet.
    ///
    /// # Errors
    ///
    /// Returns the wallet's EIP-1193 error object.
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError>;
}

/// A connected wallet.
///
/// Created by [`connect`]. The signing method is fixed at connect time from
/// the wallet kind and carried here so call sites never branch on kind.
#[derive(Clone)]
pub struct WalletSession {
    /// Provider handle.
    pub provider: Arc<dyn WalletProvider>,
    /// Account the session acts for.
    pub address: Address,
    /// Which wallet implementation this is.
    pub kind: WalletKind,
    /// Registry network matching the wallet's chain, when known.
    pub connected_network: Option<NetworkId>,
    /// Typed-data call shape for this wallet.
    pub signing: SigningMethod,
}

impl Debug for WalletSession {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletSession")
            .field("address", &self.address)
            .field("kind", &self.kind)
            .field("connected_network", &self.connected_network)
            .field("signing", &self.signing)
            .finish_non_exhaustive()
    }
}

impl WalletSession {
    /// Abbreviated address for display, e.g. `0x1234...abcd`.
    #[must_use]
    pub fn short_address(&self) -> String {
        short_address(&self.address)
    }
}

/// Abbreviates an address as `0x1234...abcd`.
#[must_use]
pub fn short_address(address: &Address) -> String {
    let full = address.to_checksum(None);
    format!("{}...{}", &full[..6], &full[full.len() - 4..])
}

/// Requests account access and returns the active account.
///
/// Asks the wallet to grant access (`eth_requestAccounts`), then reads the
/// granted list (`eth_accounts`). An empty list means the extension is
/// present but has no account for this page.
///
/// # Errors
///
/// - [`PaymentError::NoAccountSelected`] if the user declines or no account is available
/// - [`PaymentError::Provider`] for any other wallet failure
#[cfg_attr(feature = "telemetry", instrument(skip_all, err, fields(kind = %kind)))]
pub async fn request_account(
    provider: &dyn WalletProvider,
    kind: WalletKind,
) -> Result<Address, PaymentError> {
    if let Err(err) = provider.request(ETH_REQUEST_ACCOUNTS, json!([])).await {
        return Err(if err.is_user_rejection() {
            PaymentError::NoAccountSelected {
                kind,
                reason: err.message,
            }
        } else {
            PaymentError::Provider(err)
        });
    }

    active_account(provider)
        .await?
        .ok_or_else(|| PaymentError::NoAccountSelected {
            kind,
            reason: "wallet returned no accounts".to_owned(),
        })
}

/// Reads the wallet's currently active account without prompting.
///
/// # Errors
///
/// Returns [`PaymentError::Provider`] if the call fails or the reply is not
/// a list of addresses.
pub async fn active_account(provider: &dyn WalletProvider) -> Result<Option<Address>, PaymentError> {
    let accounts = provider.request(ETH_ACCOUNTS, json!([])).await?;
    let accounts: Vec<Address> = serde_json::from_value(accounts)
        .map_err(|e| ProviderError::malformed(ETH_ACCOUNTS, e))?;
    Ok(accounts.into_iter().next())
}

/// Connects to a located provider and opens a [`WalletSession`].
///
/// The wallet's chain is read on a best-effort basis; a failure or an
/// unregistered chain leaves `connected_network` unset.
///
/// # Errors
///
/// See [`request_account`].
#[cfg_attr(feature = "telemetry", instrument(skip_all, err, fields(kind = %kind)))]
pub async fn connect(
    provider: Arc<dyn WalletProvider>,
    kind: WalletKind,
    registry: &NetworkRegistry,
) -> Result<WalletSession, PaymentError> {
    let address = request_account(provider.as_ref(), kind).await?;
    let connected_network = match provider.request(ETH_CHAIN_ID, json!([])).await {
        Ok(value) => parse_chain_id(&value)
            .and_then(|id| registry.network_by_chain_id(id))
            .map(|p| p.network_id.clone()),
        Err(_err) => {
            #[cfg(feature = "telemetry")]
            tracing::debug!(error = %_err, "eth_chainId failed; network unknown");
            None
        }
    };

    #[cfg(feature = "telemetry")]
    tracing::info!(address = %address, network = ?connected_network, "wallet connected");

    Ok(WalletSession {
        provider,
        address,
        kind,
        connected_network,
        signing: kind.signing_method(),
    })
}

/// Parses an `eth_chainId` reply: a hex string, or a number from lenient wallets.
fn parse_chain_id(value: &Value) -> Option<u64> {
    match value {
        Value::String(s) => match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => u64::from_str_radix(hex, 16).ok(),
            None => s.parse().ok(),
        },
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}
