//! A scriptable in-memory [`WalletProvider`] for tests.

use std::sync::{Mutex, PoisonError};

use alloy_primitives::{Address, Bytes};
use serde_json::{Value, json};

use super::{
    ETH_ACCOUNTS, ETH_CHAIN_ID, ETH_REQUEST_ACCOUNTS, ETH_SIGN_TYPED_DATA_V4, ProviderError,
    ProviderFlags, WalletKind, WalletProvider,
};

/// Records every request and answers from a fixed script.
#[derive(Debug)]
pub struct MockProvider {
    flags: ProviderFlags,
    accounts: Mutex<Vec<Address>>,
    chain_id: u64,
    account_error: Option<ProviderError>,
    signature: Option<Bytes>,
    sign_error: Option<ProviderError>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl MockProvider {
    /// A provider publishing the genuine flags for `kind`, with no accounts.
    #[must_use]
    pub fn new(kind: WalletKind) -> Self {
        Self::with_flags(ProviderFlags::for_kind(kind))
    }

    /// A provider publishing arbitrary identity flags.
    #[must_use]
    pub fn with_flags(flags: ProviderFlags) -> Self {
        Self {
            flags,
            accounts: Mutex::new(Vec::new()),
            chain_id: 1,
            account_error: None,
            signature: None,
            sign_error: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Adds an account to the list `eth_accounts` returns.
    #[must_use]
    pub fn with_account(self, account: Address) -> Self {
        self.accounts_mut().push(account);
        self
    }

    /// Sets the chain `eth_chainId` reports.
    #[must_use]
    pub const fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = chain_id;
        self
    }

    /// Makes `eth_requestAccounts` fail.
    #[must_use]
    pub fn with_account_error(mut self, error: ProviderError) -> Self {
        self.account_error = Some(error);
        self
    }

    /// Sets the raw signature returned for typed-data requests.
    #[must_use]
    pub fn with_signature(mut self, signature: impl Into<Bytes>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    /// Makes typed-data requests fail.
    #[must_use]
    pub fn with_sign_error(mut self, error: ProviderError) -> Self {
        self.sign_error = Some(error);
        self
    }

    /// Replaces the active account, as if the user switched accounts in the wallet.
    pub fn switch_account(&self, account: Address) {
        let mut accounts = self.accounts_mut();
        accounts.clear();
        accounts.push(account);
    }

    /// Methods called so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(method, _)| method.clone())
            .collect()
    }

    /// Parameters of the most recent call to `method`.
    #[must_use]
    pub fn last_params(&self, method: &str) -> Option<Value> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .find(|(m, _)| m == method)
            .map(|(_, params)| params.clone())
    }

    fn accounts_mut(&self) -> std::sync::MutexGuard<'_, Vec<Address>> {
        self.accounts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait::async_trait]
impl WalletProvider for MockProvider {
    fn flags(&self) -> ProviderFlags {
        self.flags
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((method.to_owned(), params));

        match method {
            ETH_REQUEST_ACCOUNTS => match &self.account_error {
                Some(err) => Err(err.clone()),
                None => Ok(json!(*self.accounts_mut())),
            },
            ETH_ACCOUNTS => Ok(json!(*self.accounts_mut())),
            ETH_CHAIN_ID => Ok(json!(format!("{:#x}", self.chain_id))),
            ETH_SIGN_TYPED_DATA_V4 => match (&self.sign_error, &self.signature) {
                (Some(err), _) => Err(err.clone()),
                (None, Some(sig)) => Ok(json!(sig)),
                (None, None) => Err(ProviderError::new(
                    ProviderError::UNSUPPORTED_METHOD,
                    "no signature scripted",
                )),
            },
            other => Err(ProviderError::new(
                ProviderError::UNSUPPORTED_METHOD,
                format!("{other} is not supported"),
            )),
        }
    }
}
