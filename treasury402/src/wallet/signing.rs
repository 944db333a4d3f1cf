//! Typed-data signing through a connected wallet.
//!
//! Two call shapes exist for `eth_signTypedData_v4`. The standard one sends
//! the checksummed signer and the typed data as a JSON string; OKX's
//! extension wants the lower-case signer and the typed data as an object.
//! Both return the same signature, which is normalised here so the server
//! sees one format regardless of wallet.
//!
//! Signing is never retried: every signature authorizes a specific amount,
//! so a retry must come from the user.

use alloy_primitives::{Address, Bytes};
use serde_json::{Value, json};
#[cfg(feature = "telemetry")]
use tracing::instrument;

use super::{ETH_SIGN_TYPED_DATA_V4, ProviderError, WalletSession};
use crate::error::PaymentError;
use crate::proto::{SignedAuthorization, TypedData, normalize_signature};

/// How a wallet expects `eth_signTypedData_v4` to be called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningMethod {
    /// `[checksummed address, JSON string]`.
    Standard,
    /// `[lower-case address, typed-data object]`.
    ExtensionDirect,
}

impl SigningMethod {
    /// Builds the request parameters for this call shape.
    ///
    /// # Errors
    ///
    /// Returns [`PaymentError::Encoding`] if the typed data cannot be serialized.
    pub fn params(self, from: Address, typed_data: &TypedData) -> Result<Value, PaymentError> {
        let encode_err = |e: serde_json::Error| PaymentError::Encoding(e.to_string());
        match self {
            Self::Standard => {
                let payload = serde_json::to_string(typed_data).map_err(encode_err)?;
                Ok(json!([from.to_checksum(None), payload]))
            }
            Self::ExtensionDirect => {
                let payload = serde_json::to_value(typed_data).map_err(encode_err)?;
                Ok(json!([format!("{from:#x}"), payload]))
            }
        }
    }
}

/// Asks the session's wallet to sign `typed_data`.
///
/// `typed_data` must already carry `message.from`; it is moved into the
/// returned [`SignedAuthorization`] untouched.
///
/// # Errors
///
/// - [`PaymentError::SignatureRejected`] if the user declines, with the wallet's message
/// - [`PaymentError::Provider`] for any other wallet failure
/// - [`PaymentError::Authorization`] if the wallet returns something that is not a signature
#[cfg_attr(
    feature = "telemetry",
    instrument(skip_all, err, fields(kind = %session.kind, method = ?session.signing))
)]
pub async fn sign_typed_data(
    session: &WalletSession,
    typed_data: TypedData,
) -> Result<SignedAuthorization, PaymentError> {
    let params = session.signing.params(session.address, &typed_data)?;
    let raw = session
        .provider
        .request(ETH_SIGN_TYPED_DATA_V4, params)
        .await
        .map_err(|err| {
            if err.is_user_rejection() {
                PaymentError::SignatureRejected(err.message)
            } else {
                PaymentError::Provider(err)
            }
        })?;

    let raw: Bytes = serde_json::from_value(raw)
        .map_err(|e| ProviderError::malformed(ETH_SIGN_TYPED_DATA_V4, e))?;
    let signature =
        normalize_signature(&raw).map_err(|e| PaymentError::Authorization(e.to_string()))?;

    #[cfg(feature = "telemetry")]
    tracing::debug!(signer = %session.address, "typed data signed");

    Ok(SignedAuthorization::new(typed_data, signature, session.address))
}
