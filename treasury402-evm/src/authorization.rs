//! Builds a `TransferWithAuthorization` typed-data bundle on the client.
//!
//! Used when a resource server answers with a flat `{payTo, amount}`
//! challenge instead of a signing template. The token's EIP-712 domain comes
//! from the registry deployment; the validity window and nonce are chosen
//! here.

use std::collections::BTreeMap;

use alloy_primitives::{Address, B256, U256};
use rand::RngExt;
use serde_json::{Map, Value, json};
use treasury402::networks::TokenDeployment;
use treasury402::proto::{TRANSFER_WITH_AUTHORIZATION, TypedData, TypedDataDomain};
use treasury402::timestamp::UnixTimestamp;

use crate::verify::transfer_with_authorization_fields;

/// How far back `validAfter` is set, so the authorization is usable
/// immediately despite clock skew.
pub const VALID_AFTER_SKEW_SECS: u64 = 10 * 60;

/// Inputs for [`build_transfer_authorization`].
#[derive(Debug, Clone)]
pub struct TransferAuthorizationParams<'a> {
    /// EIP-155 chain ID of the token.
    pub chain_id: u64,
    /// Token deployment supplying the EIP-712 domain.
    pub token: &'a TokenDeployment,
    /// Payer.
    pub from: Address,
    /// Recipient.
    pub pay_to: Address,
    /// Amount in the token's smallest unit.
    pub amount: U256,
    /// Seconds from now until the authorization expires.
    pub validity_secs: u64,
}

/// Builds a ready-to-sign bundle with a fresh random nonce.
#[must_use]
pub fn build_transfer_authorization(params: &TransferAuthorizationParams<'_>) -> TypedData {
    let nonce = B256::from(rand::rng().random::<[u8; 32]>());
    build_with(params, UnixTimestamp::now(), nonce)
}

fn build_with(params: &TransferAuthorizationParams<'_>, now: UnixTimestamp, nonce: B256) -> TypedData {
    let valid_after = now.saturating_sub(VALID_AFTER_SKEW_SECS);
    let valid_before = now + params.validity_secs;

    let message: Map<String, Value> = [
        ("from", json!(params.from.to_checksum(None))),
        ("to", json!(params.pay_to.to_checksum(None))),
        ("value", json!(params.amount.to_string())),
        ("validAfter", json!(valid_after)),
        ("validBefore", json!(valid_before)),
        ("nonce", json!(nonce)),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_owned(), v))
    .collect();

    let typed_data = TypedData {
        types: BTreeMap::from([(
            TRANSFER_WITH_AUTHORIZATION.to_owned(),
            transfer_with_authorization_fields(),
        )]),
        primary_type: TRANSFER_WITH_AUTHORIZATION.to_owned(),
        domain: TypedDataDomain {
            name: Some(params.token.name.clone()),
            version: Some(params.token.version.clone()),
            chain_id: Some(params.chain_id),
            verifying_contract: Some(params.token.address),
            salt: None,
        },
        message,
    };
    typed_data.ensure_domain_type()
}
