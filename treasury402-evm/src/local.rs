//! A private-key wallet behind the EIP-1193 provider interface.
//!
//! Lets command line tools and integration tests run the unlock flow without
//! a browser extension. Only `TransferWithAuthorization` bundles can be
//! signed, since the hash is computed locally.

use std::fmt::{self, Debug, Formatter};

use alloy_primitives::Address;
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use serde_json::{Value, json};
use treasury402::WalletKind;
use treasury402::proto::TypedData;
use treasury402::wallet::{
    ETH_ACCOUNTS, ETH_CHAIN_ID, ETH_REQUEST_ACCOUNTS, ETH_SIGN_TYPED_DATA_V4, ProviderError,
    ProviderFlags, WalletProvider,
};

use crate::verify::signing_hash;

/// Private-key signer answering `eth_*` requests like an injected wallet.
pub struct LocalWallet {
    signer: PrivateKeySigner,
    flags: ProviderFlags,
    chain_id: u64,
}

impl Debug for LocalWallet {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalWallet")
            .field("address", &self.signer.address())
            .field("flags", &self.flags)
            .field("chain_id", &self.chain_id)
            .finish_non_exhaustive()
    }
}

impl LocalWallet {
    /// Wraps `signer`, presenting as a genuine `kind` wallet on `chain_id`.
    #[must_use]
    pub fn new(signer: PrivateKeySigner, kind: WalletKind, chain_id: u64) -> Self {
        Self {
            signer,
            flags: ProviderFlags::for_kind(kind),
            chain_id,
        }
    }

    /// Replaces the published identity flags.
    #[must_use]
    pub const fn with_flags(mut self, flags: ProviderFlags) -> Self {
        self.flags = flags;
        self
    }

    /// The account this wallet signs for.
    #[must_use]
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    async fn sign_typed_data_v4(&self, params: &Value) -> Result<Value, ProviderError> {
        let requested: Address = params
            .get(0)
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| ProviderError::malformed(ETH_SIGN_TYPED_DATA_V4, "missing signer address"))?;
        if requested != self.address() {
            return Err(ProviderError::new(
                ProviderError::UNAUTHORIZED,
                format!("account {requested} is not available"),
            ));
        }

        // Standard callers send a JSON string, extension callers an object.
        let typed_data: TypedData = match params.get(1) {
            Some(Value::String(text)) => serde_json::from_str(text),
            Some(value) => serde_json::from_value(value.clone()),
            None => return Err(ProviderError::malformed(ETH_SIGN_TYPED_DATA_V4, "missing typed data")),
        }
        .map_err(|e| ProviderError::malformed(ETH_SIGN_TYPED_DATA_V4, e))?;

        let hash = signing_hash(&typed_data)
            .map_err(|e| ProviderError::new(ProviderError::UNSUPPORTED_METHOD, e.to_string()))?;
        let signature = self
            .signer
            .sign_hash(&hash)
            .await
            .map_err(|e| ProviderError::new(ProviderError::INTERNAL, e.to_string()))?;

        #[cfg(feature = "telemetry")]
        tracing::debug!(signer = %self.address(), "local wallet signed typed data");

        Ok(json!(alloy_primitives::Bytes::copy_from_slice(&signature.as_bytes())))
    }
}

#[async_trait::async_trait]
impl WalletProvider for LocalWallet {
    fn flags(&self) -> ProviderFlags {
        self.flags
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        match method {
            ETH_REQUEST_ACCOUNTS | ETH_ACCOUNTS => Ok(json!([self.address()])),
            ETH_CHAIN_ID => Ok(json!(format!("{:#x}", self.chain_id))),
            ETH_SIGN_TYPED_DATA_V4 => self.sign_typed_data_v4(&params).await,
            other => Err(ProviderError::new(
                ProviderError::UNSUPPORTED_METHOD,
                format!("{other} is not supported"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use treasury402::networks::{BASE_MAINNET, NetworkRegistry};
    use treasury402::proto::ChallengeBody;
    use treasury402::wallet::{connect, sign_typed_data};

    use super::*;
    use crate::verify::recover_signer;

    const KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcaee8f3d5b7d2ff80";

    fn wallet(kind: WalletKind) -> Arc<LocalWallet> {
        Arc::new(LocalWallet::new(KEY.parse().unwrap(), kind, 8453))
    }

    fn template() -> TypedData {
        let body = json!({
            "domain": {
                "name": "USD Coin",
                "version": "2",
                "chainId": "8453",
                "verifyingContract": "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"
            },
            "message": {
                "to": "0x95C2259343Bca2E1c1E6bd4F0CBe5b4C8ac2890F",
                "value": "10000",
                "validAfter": "0",
                "validBefore": "1999999999",
                "nonce": "0x2222222222222222222222222222222222222222222222222222222222222222"
            }
        });
        match ChallengeBody::parse(&body) {
            Ok(ChallengeBody::TypedData { typed_data, .. }) => typed_data.ensure_domain_type(),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_connect_and_sign_both_call_shapes() {
        let registry = NetworkRegistry::builtin();
        for kind in [WalletKind::MetaMask, WalletKind::Okx] {
            let provider = wallet(kind);
            let session = connect(provider.clone(), kind, &registry).await.unwrap();
            assert_eq!(session.address, provider.address());
            assert_eq!(session.connected_network, Some(BASE_MAINNET));

            let data = template().with_from(session.address);
            let signed = sign_typed_data(&session, data).await.unwrap();
            assert_eq!(
                recover_signer(signed.typed_data(), signed.signature()).unwrap(),
                provider.address()
            );
        }
    }

    #[tokio::test]
    async fn test_refuses_foreign_account() {
        let provider = wallet(WalletKind::MetaMask);
        let params = json!([
            "0x95C2259343Bca2E1c1E6bd4F0CBe5b4C8ac2890F",
            serde_json::to_string(&template()).unwrap()
        ]);
        let err = provider
            .request(ETH_SIGN_TYPED_DATA_V4, params)
            .await
            .unwrap_err();
        assert_eq!(err.code, ProviderError::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let err = wallet(WalletKind::Coinbase)
            .request("eth_sendTransaction", json!([]))
            .await
            .unwrap_err();
        assert_eq!(err.code, ProviderError::UNSUPPORTED_METHOD);
    }
}
