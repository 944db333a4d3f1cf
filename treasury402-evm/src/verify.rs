//! EIP-712 signing hash and signer recovery for `TransferWithAuthorization`.
//!
//! The hash is computed from the typed data exactly as it was handed to the
//! wallet, so recovering the signer proves both who signed and that the
//! bundle was not modified after signing.

use std::borrow::Cow;

use alloy_primitives::{Address, B256, Signature, U256};
use alloy_sol_types::{Eip712Domain, SolStruct, sol};
use serde_json::Value;
use treasury402::proto::{SignedAuthorization, TRANSFER_WITH_AUTHORIZATION, TypedData, TypedDataField};

use crate::error::AuthorizationError;

sol!(
    /// ERC-3009 `TransferWithAuthorization`, as hashed by the token contract.
    #[derive(Debug, PartialEq, Eq)]
    struct TransferWithAuthorization {
        address from;
        address to;
        uint256 value;
        uint256 validAfter;
        uint256 validBefore;
        bytes32 nonce;
    }
);

/// The canonical `TransferWithAuthorization` member list.
#[must_use]
pub fn transfer_with_authorization_fields() -> Vec<TypedDataField> {
    [
        ("from", "address"),
        ("to", "address"),
        ("value", "uint256"),
        ("validAfter", "uint256"),
        ("validBefore", "uint256"),
        ("nonce", "bytes32"),
    ]
    .into_iter()
    .map(|(name, kind)| TypedDataField::new(name, kind))
    .collect()
}

/// Extracts the ERC-3009 struct from a typed-data bundle.
///
/// # Errors
///
/// Returns [`AuthorizationError`] if the primary type is not
/// `TransferWithAuthorization`, its declared schema differs from the
/// canonical one, or a message field is missing or malformed.
pub fn transfer_authorization(
    typed_data: &TypedData,
) -> Result<TransferWithAuthorization, AuthorizationError> {
    if typed_data.primary_type != TRANSFER_WITH_AUTHORIZATION {
        return Err(AuthorizationError::UnsupportedPrimaryType(
            typed_data.primary_type.clone(),
        ));
    }
    if let Some(declared) = typed_data.types.get(TRANSFER_WITH_AUTHORIZATION)
        && *declared != transfer_with_authorization_fields()
    {
        return Err(AuthorizationError::NonCanonicalSchema(
            TRANSFER_WITH_AUTHORIZATION.to_owned(),
        ));
    }

    let message = &typed_data.message;
    Ok(TransferWithAuthorization {
        from: address_field(message.get("from"), "from")?,
        to: address_field(message.get("to"), "to")?,
        value: uint_field(message.get("value"), "value")?,
        validAfter: uint_field(message.get("validAfter"), "validAfter")?,
        validBefore: uint_field(message.get("validBefore"), "validBefore")?,
        nonce: bytes32_field(message.get("nonce"), "nonce")?,
    })
}

/// The EIP-712 domain of a typed-data bundle.
#[must_use]
pub fn domain(typed_data: &TypedData) -> Eip712Domain {
    let d = &typed_data.domain;
    Eip712Domain::new(
        d.name.clone().map(Cow::Owned),
        d.version.clone().map(Cow::Owned),
        d.chain_id.map(U256::from),
        d.verifying_contract,
        d.salt,
    )
}

/// Computes the digest a wallet signs for `typed_data`.
///
/// # Errors
///
/// See [`transfer_authorization`].
pub fn signing_hash(typed_data: &TypedData) -> Result<B256, AuthorizationError> {
    let authorization = transfer_authorization(typed_data)?;
    Ok(authorization.eip712_signing_hash(&domain(typed_data)))
}

/// Recovers the address that produced `signature` over `typed_data`.
///
/// # Errors
///
/// Returns [`AuthorizationError::InvalidSignature`] if the signature is
/// malformed or does not recover, or the errors of [`signing_hash`].
pub fn recover_signer(typed_data: &TypedData, signature: &[u8]) -> Result<Address, AuthorizationError> {
    let hash = signing_hash(typed_data)?;
    let signature =
        Signature::from_raw(signature).map_err(|e| AuthorizationError::InvalidSignature(e.to_string()))?;
    signature
        .recover_address_from_prehash(&hash)
        .map_err(|e| AuthorizationError::InvalidSignature(e.to_string()))
}

/// Checks that a signed authorization recovers to its signer and that the
/// signed `from` is that same address. Returns the recovered address.
///
/// # Errors
///
/// Returns [`AuthorizationError::InvalidSignature`] naming the mismatch, or
/// the errors of [`recover_signer`].
pub fn verify_signed_authorization(signed: &SignedAuthorization) -> Result<Address, AuthorizationError> {
    let recovered = recover_signer(signed.typed_data(), signed.signature())?;
    let from = transfer_authorization(signed.typed_data())?.from;
    if recovered != from {
        return Err(AuthorizationError::InvalidSignature(format!(
            "signature recovers to {recovered}, authorization is from {from}"
        )));
    }
    Ok(recovered)
}

fn address_field(value: Option<&Value>, field: &'static str) -> Result<Address, AuthorizationError> {
    let text = value
        .ok_or(AuthorizationError::MissingField(field))?
        .as_str()
        .ok_or_else(|| invalid(field, "expected a hex string"))?;
    text.parse().map_err(|e| invalid(field, e))
}

fn uint_field(value: Option<&Value>, field: &'static str) -> Result<U256, AuthorizationError> {
    match value.ok_or(AuthorizationError::MissingField(field))? {
        Value::String(s) => s.parse().map_err(|e| invalid(field, e)),
        Value::Number(n) => n
            .as_u64()
            .map(U256::from)
            .ok_or_else(|| invalid(field, "expected a non-negative integer")),
        _ => Err(invalid(field, "expected an integer")),
    }
}

fn bytes32_field(value: Option<&Value>, field: &'static str) -> Result<B256, AuthorizationError> {
    let text = value
        .ok_or(AuthorizationError::MissingField(field))?
        .as_str()
        .ok_or_else(|| invalid(field, "expected a hex string"))?;
    text.parse().map_err(|e| invalid(field, e))
}

fn invalid(field: &'static str, reason: impl ToString) -> AuthorizationError {
    AuthorizationError::InvalidField {
        field,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{Bytes, address};
    use alloy_signer::Signer;
    use alloy_signer_local::PrivateKeySigner;
    use serde_json::json;
    use treasury402::proto::ChallengeBody;

    use super::*;

    const KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcaee8f3d5b7d2ff80";

    fn signer() -> PrivateKeySigner {
        KEY.parse().unwrap()
    }

    fn typed_data(from: Address) -> TypedData {
        let body = json!({
            "domain": {
                "name": "USD Coin",
                "version": "2",
                "chainId": 8453,
                "verifyingContract": "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"
            },
            "message": {
                "to": "0x95C2259343Bca2E1c1E6bd4F0CBe5b4C8ac2890F",
                "value": "10000",
                "validAfter": "1700000000",
                "validBefore": 1700003600,
                "nonce": "0x1111111111111111111111111111111111111111111111111111111111111111"
            },
            "primaryType": "TransferWithAuthorization",
            "types": {}
        });
        match ChallengeBody::parse(&body) {
            Ok(ChallengeBody::TypedData { typed_data, .. }) => typed_data.with_from(from),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_extracts_struct() {
        let from = signer().address();
        let auth = transfer_authorization(&typed_data(from)).unwrap();
        assert_eq!(auth.from, from);
        assert_eq!(auth.to, address!("95C2259343Bca2E1c1E6bd4F0CBe5b4C8ac2890F"));
        assert_eq!(auth.value, U256::from(10_000));
        assert_eq!(auth.validBefore, U256::from(1_700_003_600u64));
        assert_eq!(auth.nonce, B256::repeat_byte(0x11));
    }

    #[test]
    fn test_rejects_other_primary_types() {
        let mut data = typed_data(signer().address());
        data.primary_type = "Permit".to_owned();
        assert_eq!(
            signing_hash(&data).unwrap_err(),
            AuthorizationError::UnsupportedPrimaryType("Permit".to_owned())
        );
    }

    #[test]
    fn test_rejects_reordered_schema() {
        let mut data = typed_data(signer().address());
        let mut fields = transfer_with_authorization_fields();
        fields.swap(0, 1);
        data.types.insert(TRANSFER_WITH_AUTHORIZATION.to_owned(), fields);
        assert!(matches!(
            signing_hash(&data),
            Err(AuthorizationError::NonCanonicalSchema(_))
        ));
    }

    #[test]
    fn test_missing_from() {
        let mut data = typed_data(signer().address());
        data.message.remove("from");
        assert_eq!(
            signing_hash(&data).unwrap_err(),
            AuthorizationError::MissingField("from")
        );
    }

    #[tokio::test]
    async fn test_recover_signer_round_trip() {
        let signer = signer();
        let data = typed_data(signer.address());
        let hash = signing_hash(&data).unwrap();
        let signature = signer.sign_hash(&hash).await.unwrap();

        let recovered = recover_signer(&data, &signature.as_bytes()).unwrap();
        assert_eq!(recovered, signer.address());

        let signed = SignedAuthorization::new(
            data,
            Bytes::copy_from_slice(&signature.as_bytes()),
            signer.address(),
        );
        assert_eq!(verify_signed_authorization(&signed).unwrap(), signer.address());
    }

    #[tokio::test]
    async fn test_mutation_after_signing_changes_signer() {
        let signer = signer();
        let data = typed_data(signer.address());
        let signature = signer.sign_hash(&signing_hash(&data).unwrap()).await.unwrap();

        let mut tampered = data;
        tampered
            .message
            .insert("value".to_owned(), json!("20000"));
        let recovered = recover_signer(&tampered, &signature.as_bytes()).unwrap();
        assert_ne!(recovered, signer.address());

        let signed = SignedAuthorization::new(
            tampered,
            Bytes::copy_from_slice(&signature.as_bytes()),
            signer.address(),
        );
        assert!(matches!(
            verify_signed_authorization(&signed),
            Err(AuthorizationError::InvalidSignature(_))
        ));
    }
}
