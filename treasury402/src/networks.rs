//! Network/asset registry.
//!
//! Static configuration mapping a network identifier to chain metadata and
//! mapping a currency symbol to the token contract deployed on that network.
//! Lookups are pure; a miss is a configuration error and is never silently
//! replaced by a default.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

use alloy_primitives::{Address, address};
use serde::{Deserialize, Serialize};

use crate::wallet::WalletKind;

/// Identifier of a payment network (e.g. `"xlayer"`, `"base-mainnet"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkId(Cow<'static, str>);

impl NetworkId {
    /// Creates an identifier from a static string.
    #[must_use]
    pub const fn from_static(id: &'static str) -> Self {
        Self(Cow::Borrowed(id))
    }

    /// Creates an identifier from an owned string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(Cow::Owned(id.into()))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for NetworkId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NetworkId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Lower-case token symbol (e.g. `"usdc"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Currency(Cow<'static, str>);

impl Currency {
    /// USD Coin.
    pub const USDC: Self = Self(Cow::Borrowed("usdc"));

    /// Tether USD.
    pub const USDT: Self = Self(Cow::Borrowed("usdt"));

    /// Creates a currency symbol, normalised to lower case.
    #[must_use]
    pub fn new(symbol: &str) -> Self {
        Self(Cow::Owned(symbol.trim().to_ascii_lowercase()))
    }

    /// Returns the symbol as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Currency {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Currency {
    fn from(symbol: &str) -> Self {
        Self::new(symbol)
    }
}

/// X Layer mainnet.
pub const XLAYER: NetworkId = NetworkId::from_static("xlayer");

/// Base mainnet.
pub const BASE_MAINNET: NetworkId = NetworkId::from_static("base-mainnet");

/// Base Sepolia testnet.
pub const BASE_SEPOLIA: NetworkId = NetworkId::from_static("base-sepolia");

/// X Layer chain ID.
pub const XLAYER_CHAIN_ID: u64 = 196;

/// Base mainnet chain ID.
pub const BASE_MAINNET_CHAIN_ID: u64 = 8453;

/// Base Sepolia chain ID.
pub const BASE_SEPOLIA_CHAIN_ID: u64 = 84532;

/// USDC contract address on X Layer.
pub const USDC_XLAYER: Address = address!("74b7F16337b8972027F6196A17a631aC6dE26d22");

/// USDT contract address on X Layer.
pub const USDT_XLAYER: Address = address!("779ded0c9e1022225f8e0630b35a9b54be713736");

/// USDC contract address on Base mainnet.
pub const USDC_BASE: Address = address!("833589fCD6eDb6E08f4c7C32D4f71b54bdA02913");

/// USDC contract address on Base Sepolia.
pub const USDC_BASE_SEPOLIA: Address = address!("036CbD53842c5426634e7929541eC2318f3dCF7e");

/// A token contract deployed on a network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenDeployment {
    /// Contract address.
    pub address: Address,
    /// Number of decimals (6 for the supported stablecoins).
    pub decimals: u8,
    /// EIP-712 domain name of the token contract.
    pub name: String,
    /// EIP-712 domain version of the token contract.
    pub version: String,
}

/// Native gas currency of a network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    /// Display name.
    pub name: String,
    /// Ticker symbol.
    pub symbol: String,
    /// Decimals.
    pub decimals: u8,
}

/// Immutable description of one supported network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkProfile {
    /// Registry key.
    pub network_id: NetworkId,
    /// Human-readable name.
    pub display_name: String,
    /// EIP-155 chain ID.
    pub chain_id: u64,
    /// JSON-RPC endpoints.
    pub rpc_urls: Vec<String>,
    /// Block explorer base URLs.
    pub explorer_urls: Vec<String>,
    /// Native gas currency.
    pub native_currency: NativeCurrency,
    /// Currency preselected when this network is chosen.
    pub default_currency: Currency,
    /// Token deployments keyed by currency. One contract per currency.
    pub tokens: BTreeMap<Currency, TokenDeployment>,
}

impl NetworkProfile {
    /// Returns the deployment for `currency`, if this network supports it.
    #[must_use]
    pub fn token(&self, currency: &Currency) -> Option<&TokenDeployment> {
        self.tokens.get(currency)
    }

    /// Returns the contract address for `currency`, if this network supports it.
    #[must_use]
    pub fn token_contract(&self, currency: &Currency) -> Option<Address> {
        self.token(currency).map(|t| t.address)
    }

    /// Returns the currency whose deployment is at `contract`.
    #[must_use]
    pub fn currency_for_contract(&self, contract: Address) -> Option<&Currency> {
        self.tokens
            .iter()
            .find(|(_, token)| token.address == contract)
            .map(|(currency, _)| currency)
    }

    /// Returns the chain ID as the `0x`-prefixed hex string wallets report.
    #[must_use]
    pub fn chain_id_hex(&self) -> String {
        format!("{:#x}", self.chain_id)
    }
}

/// Lookup failures. Both indicate a configuration problem.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The network is not registered.
    #[error("unsupported network: {0}")]
    UnknownNetwork(NetworkId),

    /// The network does not support the currency.
    #[error("currency {currency} is not supported on {network}")]
    UnsupportedCurrency {
        /// Network that was queried.
        network: NetworkId,
        /// Currency that was requested.
        currency: Currency,
    },
}

/// Ordered collection of [`NetworkProfile`]s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkRegistry {
    profiles: Vec<NetworkProfile>,
}

impl NetworkRegistry {
    /// Creates a registry from the given profiles. A later profile replaces
    /// an earlier one with the same identifier.
    #[must_use]
    pub fn new(profiles: impl IntoIterator<Item = NetworkProfile>) -> Self {
        let mut registry = Self {
            profiles: Vec::new(),
        };
        for profile in profiles {
            registry.register(profile);
        }
        registry
    }

    /// Creates the registry of networks the treasury platform supports.
    #[must_use]
    pub fn builtin() -> Self {
        Self::new(known_networks())
    }

    /// Adds or replaces a profile.
    pub fn register(&mut self, profile: NetworkProfile) {
        if let Some(existing) = self
            .profiles
            .iter_mut()
            .find(|p| p.network_id == profile.network_id)
        {
            *existing = profile;
        } else {
            self.profiles.push(profile);
        }
    }

    /// Looks up a network profile.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownNetwork`] if the network is not registered.
    pub fn get_network_profile(&self, network: &NetworkId) -> Result<&NetworkProfile, RegistryError> {
        self.profiles
            .iter()
            .find(|p| &p.network_id == network)
            .ok_or_else(|| RegistryError::UnknownNetwork(network.clone()))
    }

    /// Looks up the token deployment for a network and currency.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] if either the network or the currency is unknown.
    pub fn get_token(
        &self,
        network: &NetworkId,
        currency: &Currency,
    ) -> Result<&TokenDeployment, RegistryError> {
        self.get_network_profile(network)?
            .token(currency)
            .ok_or_else(|| RegistryError::UnsupportedCurrency {
                network: network.clone(),
                currency: currency.clone(),
            })
    }

    /// Looks up the token contract address for a network and currency.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] if either the network or the currency is unknown.
    pub fn get_token_contract(
        &self,
        network: &NetworkId,
        currency: &Currency,
    ) -> Result<Address, RegistryError> {
        self.get_token(network, currency).map(|t| t.address)
    }

    /// Lists the currencies a network supports, in symbol order.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownNetwork`] if the network is not registered.
    pub fn supported_currencies(&self, network: &NetworkId) -> Result<Vec<Currency>, RegistryError> {
        Ok(self
            .get_network_profile(network)?
            .tokens
            .keys()
            .cloned()
            .collect())
    }

    /// Returns `true` if the network exists and supports the currency.
    #[must_use]
    pub fn is_token_supported(&self, network: &NetworkId, currency: &Currency) -> bool {
        self.get_token(network, currency).is_ok()
    }

    /// Finds the profile for an EIP-155 chain ID.
    #[must_use]
    pub fn network_by_chain_id(&self, chain_id: u64) -> Option<&NetworkProfile> {
        self.profiles.iter().find(|p| p.chain_id == chain_id)
    }

    /// Iterates over all profiles in registration order.
    pub fn networks(&self) -> impl Iterator<Item = &NetworkProfile> {
        self.profiles.iter()
    }
}

impl Default for NetworkRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Picks the home network for a user from how they last signed in.
///
/// OKX wallet users land on X Layer, everyone else on Base. This only seeds
/// the selection; the user may change it any time before signing.
#[must_use]
pub fn default_network_for(last_auth_method: Option<&str>) -> NetworkId {
    match last_auth_method.and_then(|m| m.parse::<WalletKind>().ok()) {
        Some(WalletKind::Okx) => XLAYER,
        _ => BASE_MAINNET,
    }
}

/// Returns the built-in network profiles.
#[must_use]
pub fn known_networks() -> Vec<NetworkProfile> {
    let eth = NativeCurrency {
        name: "Ethereum".to_owned(),
        symbol: "ETH".to_owned(),
        decimals: 18,
    };
    vec![
        NetworkProfile {
            network_id: XLAYER,
            display_name: "X Layer Mainnet".to_owned(),
            chain_id: XLAYER_CHAIN_ID,
            rpc_urls: vec![
                "https://rpc.xlayer.tech".to_owned(),
                "https://xlayerrpc.okx.com".to_owned(),
            ],
            explorer_urls: vec!["https://www.oklink.com/xlayer".to_owned()],
            native_currency: NativeCurrency {
                name: "OKB".to_owned(),
                symbol: "OKB".to_owned(),
                decimals: 18,
            },
            default_currency: Currency::USDT,
            tokens: BTreeMap::from([
                (Currency::USDC, stablecoin(USDC_XLAYER, "USD Coin", "2")),
                (Currency::USDT, stablecoin(USDT_XLAYER, "USDT", "1")),
            ]),
        },
        NetworkProfile {
            network_id: BASE_MAINNET,
            display_name: "Base Mainnet".to_owned(),
            chain_id: BASE_MAINNET_CHAIN_ID,
            rpc_urls: vec![
                "https://mainnet.base.org".to_owned(),
                "https://developer-access-mainnet.base.org".to_owned(),
            ],
            explorer_urls: vec!["https://basescan.org".to_owned()],
            native_currency: eth.clone(),
            default_currency: Currency::USDC,
            tokens: BTreeMap::from([(Currency::USDC, stablecoin(USDC_BASE, "USD Coin", "2"))]),
        },
        NetworkProfile {
            network_id: BASE_SEPOLIA,
            display_name: "Base Sepolia".to_owned(),
            chain_id: BASE_SEPOLIA_CHAIN_ID,
            rpc_urls: vec!["https://sepolia.base.org".to_owned()],
            explorer_urls: vec!["https://sepolia.basescan.org".to_owned()],
            native_currency: eth,
            default_currency: Currency::USDC,
            tokens: BTreeMap::from([(
                Currency::USDC,
                stablecoin(USDC_BASE_SEPOLIA, "USDC", "2"),
            )]),
        },
    ]
}

fn stablecoin(address: Address, name: &str, version: &str) -> TokenDeployment {
    TokenDeployment {
        address,
        decimals: 6,
        name: name.to_owned(),
        version: version.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_token_contracts() {
        let registry = NetworkRegistry::builtin();
        assert_eq!(
            registry.get_token_contract(&XLAYER, &Currency::USDT).unwrap(),
            USDT_XLAYER
        );
        assert_eq!(
            registry
                .get_token_contract(&BASE_MAINNET, &Currency::USDC)
                .unwrap(),
            USDC_BASE
        );
    }

    #[test]
    fn test_currency_for_contract() {
        let registry = NetworkRegistry::builtin();
        let xlayer = registry.get_network_profile(&XLAYER).unwrap();
        assert_eq!(xlayer.currency_for_contract(USDT_XLAYER), Some(&Currency::USDT));
        assert_eq!(xlayer.currency_for_contract(USDC_XLAYER), Some(&Currency::USDC));
        assert_eq!(xlayer.currency_for_contract(USDC_BASE), None);
    }

    #[test]
    fn test_missing_currency_is_not_defaulted() {
        let registry = NetworkRegistry::builtin();
        let err = registry
            .get_token_contract(&BASE_SEPOLIA, &Currency::USDT)
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::UnsupportedCurrency {
                network: BASE_SEPOLIA,
                currency: Currency::USDT,
            }
        );
        assert!(!registry.is_token_supported(&BASE_SEPOLIA, &Currency::USDT));
    }

    #[test]
    fn test_unknown_network() {
        let registry = NetworkRegistry::builtin();
        let err = registry
            .get_network_profile(&NetworkId::new("solana"))
            .unwrap_err();
        assert_eq!(err, RegistryError::UnknownNetwork(NetworkId::new("solana")));
    }

    #[test]
    fn test_supported_currencies() {
        let registry = NetworkRegistry::builtin();
        assert_eq!(
            registry.supported_currencies(&XLAYER).unwrap(),
            vec![Currency::USDC, Currency::USDT]
        );
        assert_eq!(
            registry.supported_currencies(&BASE_MAINNET).unwrap(),
            vec![Currency::USDC]
        );
    }

    #[test]
    fn test_network_by_chain_id() {
        let registry = NetworkRegistry::builtin();
        assert_eq!(
            registry.network_by_chain_id(8453).unwrap().network_id,
            BASE_MAINNET
        );
        assert_eq!(registry.get_network_profile(&XLAYER).unwrap().chain_id_hex(), "0xc4");
        assert!(registry.network_by_chain_id(1).is_none());
    }

    #[test]
    fn test_default_network_for_auth_method() {
        assert_eq!(default_network_for(Some("okx")), XLAYER);
        assert_eq!(default_network_for(Some("metamask")), BASE_MAINNET);
        assert_eq!(default_network_for(Some("email")), BASE_MAINNET);
        assert_eq!(default_network_for(None), BASE_MAINNET);
    }

    #[test]
    fn test_register_replaces_existing() {
        let mut registry = NetworkRegistry::builtin();
        let mut profile = registry.get_network_profile(&XLAYER).unwrap().clone();
        profile.default_currency = Currency::USDC;
        registry.register(profile);
        assert_eq!(registry.networks().count(), 3);
        assert_eq!(
            registry.get_network_profile(&XLAYER).unwrap().default_currency,
            Currency::USDC
        );
    }

    #[test]
    fn test_currency_is_normalised() {
        assert_eq!(Currency::new(" USDC "), Currency::USDC);
        assert_eq!(Currency::from("UsDt"), Currency::USDT);
    }
}
