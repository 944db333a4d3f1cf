//! Resolves the genuine provider for a wallet kind among co-installed extensions.
//!
//! Extensions inject into a shared namespace and routinely set each other's
//! identity flags (OKX and Coinbase both report `isMetaMask`, for example).
//! Selection therefore rejects a candidate that also claims a *different*
//! kind's identity. Locating never sends a request to any provider.

use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use super::{WalletKind, WalletProvider};
use crate::error::PaymentError;

/// The injected provider objects visible to the page.
///
/// - `ethereum`: the shared `window.ethereum` slot
/// - `providers`: `window.ethereum.providers`, when a wallet aggregates several
/// - `okxwallet`, `okx_ethereum`: OKX's dedicated globals
/// - `metamask`: a dedicated MetaMask global some pages receive alongside OKX
/// - `coinbase_wallet_extension`: Coinbase's dedicated global
#[derive(Clone, Default)]
pub struct WalletHost {
    ethereum: Option<Arc<dyn WalletProvider>>,
    providers: Option<Vec<Arc<dyn WalletProvider>>>,
    okxwallet: Option<Arc<dyn WalletProvider>>,
    okx_ethereum: Option<Arc<dyn WalletProvider>>,
    metamask: Option<Arc<dyn WalletProvider>>,
    coinbase_wallet_extension: Option<Arc<dyn WalletProvider>>,
}

impl Debug for WalletHost {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletHost")
            .field("ethereum", &self.ethereum.is_some())
            .field("providers", &self.providers.as_ref().map(Vec::len))
            .field("okxwallet", &self.okxwallet.is_some())
            .field("okx_ethereum", &self.okx_ethereum.is_some())
            .field("metamask", &self.metamask.is_some())
            .field(
                "coinbase_wallet_extension",
                &self.coinbase_wallet_extension.is_some(),
            )
            .finish()
    }
}

impl WalletHost {
    /// A host with no wallets installed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A host whose only wallet is `provider`, in the shared slot.
    #[must_use]
    pub fn single(provider: Arc<dyn WalletProvider>) -> Self {
        Self::new().with_ethereum(provider)
    }

    /// Sets the shared provider slot.
    #[must_use]
    pub fn with_ethereum(mut self, provider: Arc<dyn WalletProvider>) -> Self {
        self.ethereum = Some(provider);
        self
    }

    /// Sets the aggregated provider list.
    #[must_use]
    pub fn with_providers(mut self, providers: Vec<Arc<dyn WalletProvider>>) -> Self {
        self.providers = Some(providers);
        self
    }

    /// Sets OKX's `okxwallet` global.
    #[must_use]
    pub fn with_okxwallet(mut self, provider: Arc<dyn WalletProvider>) -> Self {
        self.okxwallet = Some(provider);
        self
    }

    /// Sets OKX's `okx.ethereum` global.
    #[must_use]
    pub fn with_okx_ethereum(mut self, provider: Arc<dyn WalletProvider>) -> Self {
        self.okx_ethereum = Some(provider);
        self
    }

    /// Sets the dedicated MetaMask global.
    #[must_use]
    pub fn with_metamask(mut self, provider: Arc<dyn WalletProvider>) -> Self {
        self.metamask = Some(provider);
        self
    }

    /// Sets Coinbase's `coinbaseWalletExtension` global.
    #[must_use]
    pub fn with_coinbase_wallet_extension(mut self, provider: Arc<dyn WalletProvider>) -> Self {
        self.coinbase_wallet_extension = Some(provider);
        self
    }

    /// Returns `true` if no provider of any kind is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ethereum.is_none()
            && self.providers.as_ref().is_none_or(Vec::is_empty)
            && self.okxwallet.is_none()
            && self.okx_ethereum.is_none()
            && self.metamask.is_none()
            && self.coinbase_wallet_extension.is_none()
    }
}

/// Returns `true` if `provider` is a genuine provider of `kind`.
fn is_genuine(provider: &dyn WalletProvider, kind: WalletKind) -> bool {
    let flags = provider.flags();
    match kind {
        WalletKind::MetaMask => {
            flags.is_meta_mask && !flags.is_okx_wallet && !flags.is_coinbase_wallet
        }
        WalletKind::Coinbase => flags.is_coinbase_wallet && !flags.is_okx_wallet,
        WalletKind::Okx => flags.is_okx_wallet,
    }
}

/// Finds the provider for `kind` on `host`.
///
/// # Errors
///
/// Returns [`PaymentError::WalletNotInstalled`] if no genuine provider exists.
pub fn locate(host: &WalletHost, kind: WalletKind) -> Result<Arc<dyn WalletProvider>, PaymentError> {
    let found = match kind {
        WalletKind::Okx => locate_okx(host),
        WalletKind::MetaMask | WalletKind::Coinbase => match &host.providers {
            Some(list) if !list.is_empty() => from_list(list, kind),
            _ => from_globals(host, kind),
        },
    };

    #[cfg(feature = "telemetry")]
    tracing::debug!(kind = %kind, found = found.is_some(), "wallet provider lookup");

    found.ok_or(PaymentError::WalletNotInstalled(kind))
}

fn from_list(list: &[Arc<dyn WalletProvider>], kind: WalletKind) -> Option<Arc<dyn WalletProvider>> {
    list.iter()
        .find(|p| is_genuine(p.as_ref(), kind))
        .or_else(|| match kind {
            // Last resort for MetaMask: its private internals are hard to fake.
            WalletKind::MetaMask => list.iter().find(|p| {
                let flags = p.flags();
                flags.has_meta_mask_internals && flags.is_meta_mask
            }),
            _ => None,
        })
        .cloned()
}

fn from_globals(host: &WalletHost, kind: WalletKind) -> Option<Arc<dyn WalletProvider>> {
    match kind {
        WalletKind::MetaMask => {
            // OKX takes over the shared slot; MetaMask then lives in its own global.
            if host.okxwallet.is_some()
                && let Some(mm) = host.metamask.as_ref().filter(|p| p.flags().is_meta_mask)
            {
                return Some(mm.clone());
            }
            host.ethereum
                .as_ref()
                .filter(|p| is_genuine(p.as_ref(), WalletKind::MetaMask))
                .cloned()
        }
        WalletKind::Coinbase => host
            .ethereum
            .as_ref()
            .filter(|p| p.flags().is_coinbase_wallet)
            .or(host.coinbase_wallet_extension.as_ref())
            .cloned(),
        WalletKind::Okx => locate_okx(host),
    }
}

fn locate_okx(host: &WalletHost) -> Option<Arc<dyn WalletProvider>> {
    host.okxwallet
        .as_ref()
        .or(host.okx_ethereum.as_ref())
        .cloned()
        .or_else(|| {
            host.providers
                .as_deref()
                .and_then(|list| from_list(list, WalletKind::Okx))
        })
        .or_else(|| {
            host.ethereum
                .as_ref()
                .filter(|p| p.flags().is_okx_wallet)
                .cloned()
        })
}
