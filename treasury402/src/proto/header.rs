//! The `X-PAYMENT` proof header.
//!
//! Base64 of a JSON envelope:
//!
//! ```json
//! {
//!   "x402Version": 1,
//!   "scheme": "exact",
//!   "network": "base-mainnet",
//!   "asset": "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913",
//!   "currency": "usdc",
//!   "payload": {
//!     "signature": "0x...",
//!     "authorization": { "from": "0x...", "to": "0x...", "value": "10000", ... }
//!   }
//! }
//! ```
//!
//! [`PaymentProofHeader::decode`] is the exact inverse of
//! [`PaymentProofHeader::encode`]; the resource server side uses it.

use alloy_primitives::{Address, Bytes};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::SignedAuthorization;
use super::encoding::Base64Bytes;
use crate::networks::{Currency, NetworkId};

/// Protocol version written into every header.
pub const X402_VERSION: u8 = 1;

/// Payment scheme: a fixed amount moved by `transferWithAuthorization`.
pub const SCHEME_EXACT: &str = "exact";

/// Decoded `X-PAYMENT` envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentProofHeader {
    /// Protocol version.
    pub x402_version: u8,
    /// Payment scheme.
    pub scheme: String,
    /// Target network.
    pub network: NetworkId,
    /// Target token contract.
    pub asset: Address,
    /// Target token symbol.
    pub currency: Currency,
    /// Signature and the message it covers.
    pub payload: ProofPayload,
}

/// The signed part of the envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofPayload {
    /// 65-byte `r || s || v` signature, `0x`-hex.
    pub signature: Bytes,
    /// The exact message that was signed.
    pub authorization: Map<String, Value>,
}

/// Header encoding and decoding failures.
#[derive(Debug, thiserror::Error)]
pub enum ProofHeaderError {
    /// The envelope is not valid base64.
    #[error("invalid base64 in payment header: {0}")]
    Base64(#[from] base64::DecodeError),
    /// The envelope is not the expected JSON.
    #[error("invalid payment header JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl PaymentProofHeader {
    /// Builds the envelope for a signed authorization.
    #[must_use]
    pub fn new(
        signed: &SignedAuthorization,
        network: NetworkId,
        asset: Address,
        currency: Currency,
    ) -> Self {
        Self {
            x402_version: X402_VERSION,
            scheme: SCHEME_EXACT.to_owned(),
            network,
            asset,
            currency,
            payload: ProofPayload {
                signature: signed.signature().clone(),
                authorization: signed.message().clone(),
            },
        }
    }

    /// Encodes the envelope as a header value.
    ///
    /// # Errors
    ///
    /// Returns [`ProofHeaderError::Json`] if serialization fails.
    pub fn encode(&self) -> Result<String, ProofHeaderError> {
        let json = serde_json::to_vec(self)?;
        Ok(Base64Bytes::encode(json).to_string())
    }

    /// Decodes a header value.
    ///
    /// # Errors
    ///
    /// Returns [`ProofHeaderError`] if the value is not base64 JSON of the
    /// expected shape.
    pub fn decode(header: &str) -> Result<Self, ProofHeaderError> {
        let json = Base64Bytes::from(header).decode()?;
        Ok(serde_json::from_slice(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::address;
    use serde_json::json;

    use super::*;
    use crate::networks::{BASE_MAINNET, USDC_BASE};
    use crate::proto::{ChallengeBody, TypedData};

    fn signed() -> SignedAuthorization {
        let body = json!({
            "domain": {"name": "USD Coin", "version": "2", "chainId": 8453},
            "message": {"to": "0x95C2259343Bca2E1c1E6bd4F0CBe5b4C8ac2890F", "value": "10000"},
            "types": {}
        });
        let Ok(ChallengeBody::TypedData { typed_data, .. }) = ChallengeBody::parse(&body) else {
            panic!("expected typed data");
        };
        let payer = address!("7447dEbdaCAe3638BdBaC2F4A443C5615d3f007D");
        let typed_data: TypedData = typed_data.with_from(payer);
        let mut sig = [0x42u8; 65];
        sig[64] = 28;
        SignedAuthorization::new(typed_data, Bytes::copy_from_slice(&sig), payer)
    }

    #[test]
    fn test_encode_decode_preserves_signature_and_message() {
        let signed = signed();
        let header = PaymentProofHeader::new(&signed, BASE_MAINNET, USDC_BASE, Currency::USDC);
        let decoded = PaymentProofHeader::decode(&header.encode().unwrap()).unwrap();

        assert_eq!(decoded, header);
        assert_eq!(&decoded.payload.signature, signed.signature());
        assert_eq!(&decoded.payload.authorization, signed.message());
        assert_eq!(decoded.network, BASE_MAINNET);
        assert_eq!(decoded.asset, USDC_BASE);
    }

    #[test]
    fn test_wire_shape() {
        let header = PaymentProofHeader::new(&signed(), BASE_MAINNET, USDC_BASE, Currency::USDC);
        let json: Value = serde_json::to_value(&header).unwrap();
        assert_eq!(json["x402Version"], json!(1));
        assert_eq!(json["scheme"], json!("exact"));
        assert_eq!(json["network"], json!("base-mainnet"));
        assert_eq!(json["currency"], json!("usdc"));
        assert!(
            json["payload"]["signature"]
                .as_str()
                .unwrap()
                .starts_with("0x4242")
        );
        assert_eq!(json["payload"]["authorization"]["value"], json!("10000"));
    }

    #[test]
    fn test_decode_rejects_bad_input() {
        assert!(matches!(
            PaymentProofHeader::decode("not base64!"),
            Err(ProofHeaderError::Base64(_))
        ));
        let not_json = Base64Bytes::encode("hello").to_string();
        assert!(matches!(
            PaymentProofHeader::decode(&not_json),
            Err(ProofHeaderError::Json(_))
        ));
    }
}
