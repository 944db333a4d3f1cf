//! Wire types for the payment negotiation.
//!
//! The resource server answers an unpaid request with a [`ChallengeBody`]:
//! either an EIP-712 [`TypedData`] bundle ready for signing, or a legacy flat
//! description the client must turn into typed data itself. The signed
//! result travels back as a [`PaymentProofHeader`].

mod encoding;
pub mod header;

use std::collections::BTreeMap;

use alloy_primitives::{Address, B256, Bytes, Signature, U256};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use serde_with::skip_serializing_none;

use crate::networks::NetworkId;

pub use encoding::Base64Bytes;
pub use header::{PaymentProofHeader, ProofHeaderError, ProofPayload};

/// Primary type assumed when a challenge omits `primaryType`.
pub const TRANSFER_WITH_AUTHORIZATION: &str = "TransferWithAuthorization";

/// Name of the domain struct inside `types`.
pub const EIP712_DOMAIN: &str = "EIP712Domain";

/// One member of an EIP-712 struct type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedDataField {
    /// Member name.
    pub name: String,
    /// Solidity type, e.g. `address` or `uint256`.
    #[serde(rename = "type")]
    pub kind: String,
}

impl TypedDataField {
    /// Creates a field.
    #[must_use]
    pub fn new(name: &str, kind: &str) -> Self {
        Self {
            name: name.to_owned(),
            kind: kind.to_owned(),
        }
    }
}

/// The EIP-712 domain separator fields. All are optional per EIP-712.
#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedDataDomain {
    /// Token contract name.
    pub name: Option<String>,
    /// Token contract version.
    pub version: Option<String>,
    /// EIP-155 chain ID. Accepts a JSON number, a decimal string, or a hex string.
    #[serde(default, deserialize_with = "lenient_chain_id")]
    pub chain_id: Option<u64>,
    /// Token contract address.
    pub verifying_contract: Option<Address>,
    /// Disambiguating salt.
    pub salt: Option<B256>,
}

/// An EIP-712 typed-data bundle, shaped for `eth_signTypedData_v4`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedData {
    /// Struct definitions, keyed by type name.
    #[serde(default)]
    pub types: BTreeMap<String, Vec<TypedDataField>>,
    /// The struct `message` is an instance of.
    #[serde(default = "default_primary_type")]
    pub primary_type: String,
    /// Domain separator values.
    pub domain: TypedDataDomain,
    /// The values being signed.
    pub message: Map<String, Value>,
}

fn default_primary_type() -> String {
    TRANSFER_WITH_AUTHORIZATION.to_owned()
}

impl TypedData {
    /// Returns the bundle with `message.from` set to `address`.
    ///
    /// Server-issued templates omit `from`; it must be filled with the
    /// connected wallet before signing.
    #[must_use]
    pub fn with_from(mut self, address: Address) -> Self {
        self.message
            .insert("from".to_owned(), Value::String(address.to_checksum(None)));
        self
    }

    /// Adds an `EIP712Domain` type derived from the domain fields present,
    /// unless the bundle already declares one.
    #[must_use]
    pub fn ensure_domain_type(mut self) -> Self {
        if !self.types.contains_key(EIP712_DOMAIN) {
            let d = &self.domain;
            let fields = [
                d.name.is_some().then(|| TypedDataField::new("name", "string")),
                d.version.is_some().then(|| TypedDataField::new("version", "string")),
                d.chain_id.is_some().then(|| TypedDataField::new("chainId", "uint256")),
                d.verifying_contract
                    .is_some()
                    .then(|| TypedDataField::new("verifyingContract", "address")),
                d.salt.is_some().then(|| TypedDataField::new("salt", "bytes32")),
            ];
            self.types
                .insert(EIP712_DOMAIN.to_owned(), fields.into_iter().flatten().collect());
        }
        self
    }

    /// Recipient (`message.to`), as sent by the server.
    #[must_use]
    pub fn pay_to(&self) -> Option<&str> {
        self.message.get("to").and_then(Value::as_str)
    }

    /// Transfer amount in the token's smallest unit (`message.value`).
    #[must_use]
    pub fn value(&self) -> Option<U256> {
        self.message.get("value").and_then(value_to_u256)
    }

    /// The payer (`message.from`), once filled.
    #[must_use]
    pub fn from_address(&self) -> Option<Address> {
        self.message
            .get("from")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
    }
}

/// Flat challenge shape that carries no typed data.
///
/// Deprecated: the client has to build the authorization itself, resolving
/// the token contract through the registry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyChallenge {
    /// Recipient.
    pub pay_to: Address,
    /// Amount in the token's smallest unit.
    #[serde(deserialize_with = "lenient_u256")]
    pub amount: U256,
    /// URL to resubmit with the payment proof, if the server names one.
    #[serde(default)]
    pub resource: Option<String>,
}

/// A parsed challenge response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeBody {
    /// `{domain, message, primaryType, types}`, optionally with `resource`.
    TypedData {
        /// The signing template.
        typed_data: TypedData,
        /// URL to resubmit with the payment proof, if the server names one.
        resource: Option<String>,
    },
    /// `{payTo, amount, resource?}`.
    Legacy(LegacyChallenge),
}

impl ChallengeBody {
    /// Interprets a challenge response body.
    ///
    /// A body carrying both `domain` and `message` objects is typed data;
    /// anything else is tried as the legacy shape.
    ///
    /// # Errors
    ///
    /// Returns the JSON error if the body matches neither shape.
    pub fn parse(body: &Value) -> Result<Self, serde_json::Error> {
        let is_typed = body.get("domain").is_some_and(Value::is_object)
            && body.get("message").is_some_and(Value::is_object);
        if is_typed {
            let typed_data = TypedData::deserialize(body)?;
            let resource = body
                .get("resource")
                .and_then(Value::as_str)
                .map(str::to_owned);
            Ok(Self::TypedData {
                typed_data,
                resource,
            })
        } else {
            LegacyChallenge::deserialize(body).map(Self::Legacy)
        }
    }
}

/// Display view of the active challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentChallenge {
    /// Recipient, as the server sent it.
    pub pay_to: String,
    /// Token contract.
    pub asset: Address,
    /// Amount in the token's smallest unit.
    pub amount: U256,
    /// Network the challenge was issued for.
    pub network: NetworkId,
    /// URL to resubmit with the payment proof.
    pub resource_url: String,
}

/// A wallet signature over a typed-data bundle.
///
/// `typed_data` is exactly the bundle handed to the wallet; it must not be
/// modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedAuthorization {
    typed_data: TypedData,
    signature: Bytes,
    signer: Address,
}

impl SignedAuthorization {
    /// Bundles a normalised 65-byte signature with the data it covers.
    #[must_use]
    pub const fn new(typed_data: TypedData, signature: Bytes, signer: Address) -> Self {
        Self {
            typed_data,
            signature,
            signer,
        }
    }

    /// The typed data that was signed.
    #[must_use]
    pub const fn typed_data(&self) -> &TypedData {
        &self.typed_data
    }

    /// The signed message.
    #[must_use]
    pub const fn message(&self) -> &Map<String, Value> {
        &self.typed_data.message
    }

    /// `r || s || v`, 65 bytes, `v` in `{27, 28}`.
    #[must_use]
    pub const fn signature(&self) -> &Bytes {
        &self.signature
    }

    /// The address the signature was requested from.
    #[must_use]
    pub const fn signer(&self) -> Address {
        self.signer
    }

    /// The `v` byte.
    #[must_use]
    pub fn v(&self) -> u8 {
        self.signature.get(64).copied().unwrap_or_default()
    }

    /// The `r` component.
    #[must_use]
    pub fn r(&self) -> B256 {
        self.signature
            .get(..32)
            .map(B256::from_slice)
            .unwrap_or_default()
    }

    /// The `s` component.
    #[must_use]
    pub fn s(&self) -> B256 {
        self.signature
            .get(32..64)
            .map(B256::from_slice)
            .unwrap_or_default()
    }
}

/// Normalises a wallet signature to 65 bytes with `v` in `{27, 28}`.
///
/// Wallets differ in whether they report `v` as `0/1` or `27/28`.
///
/// # Errors
///
/// Returns an error if `raw` is not a 65-byte ECDSA signature.
pub fn normalize_signature(raw: &[u8]) -> Result<Bytes, alloy_primitives::SignatureError> {
    let signature = Signature::from_raw(raw)?;
    Ok(Bytes::copy_from_slice(&signature.as_bytes()))
}

fn value_to_u256(value: &Value) -> Option<U256> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_u64().map(U256::from),
        _ => None,
    }
}

fn lenient_u256<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
    let value = Value::deserialize(deserializer)?;
    value_to_u256(&value)
        .ok_or_else(|| serde::de::Error::custom("amount must be a non-negative integer"))
}

fn lenient_chain_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    let Some(value) = value else {
        return Ok(None);
    };
    let parsed = match &value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .map_or_else(|| s.parse().ok(), |hex| u64::from_str_radix(hex, 16).ok()),
        Value::Null => return Ok(None),
        _ => None,
    };
    parsed
        .map(Some)
        .ok_or_else(|| serde::de::Error::custom("chainId must be an integer"))
}
