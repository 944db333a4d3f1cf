use treasury402::PaymentError;

/// Failures while building, hashing or checking an authorization.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthorizationError {
    /// Only `TransferWithAuthorization` can be hashed locally.
    #[error("unsupported primary type: {0}")]
    UnsupportedPrimaryType(String),

    /// The type schema does not match the canonical ERC-3009 definition.
    #[error("non-canonical {0} schema")]
    NonCanonicalSchema(String),

    /// A message field is absent.
    #[error("missing message field: {0}")]
    MissingField(&'static str),

    /// A message field has the wrong type or format.
    #[error("invalid message field {field}: {reason}")]
    InvalidField {
        /// Field name.
        field: &'static str,
        /// What was wrong.
        reason: String,
    },

    /// The signature bytes are not a 65-byte ECDSA signature or do not recover.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// The local key failed to sign.
    #[error("signing failed: {0}")]
    Signing(String),
}

impl From<AuthorizationError> for PaymentError {
    fn from(err: AuthorizationError) -> Self {
        Self::Authorization(err.to_string())
    }
}
