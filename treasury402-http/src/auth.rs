//! Read-only access to the platform's sign-in session.
//!
//! The unlock flow needs two things from it: the bearer token sent on both
//! the challenge request and the resubmission, and the method the user last
//! signed in with, which seeds the default network. This crate never issues
//! or refreshes tokens.

use std::fmt::{self, Debug, Formatter};

use http::HeaderValue;

/// Supplies the bearer credential and sign-in method.
pub trait AuthSession: Send + Sync {
    /// Current bearer token, if the user is signed in.
    fn bearer_token(&self) -> Option<String>;

    /// How the user last signed in (`"okx"`, `"metamask"`, `"email"`, ...).
    fn last_auth_method(&self) -> Option<String> {
        None
    }
}

/// Returns the `Authorization` header value for `session`, if it has a
/// token that is a valid header value.
#[must_use]
pub fn bearer_header(session: &dyn AuthSession) -> Option<HeaderValue> {
    let token = session.bearer_token()?;
    HeaderValue::from_str(&format!("Bearer {token}"))
        .ok()
        .map(|mut value| {
            value.set_sensitive(true);
            value
        })
}

/// An [`AuthSession`] with fixed values.
#[derive(Clone, Default)]
pub struct StaticAuth {
    token: Option<String>,
    last_auth_method: Option<String>,
}

impl Debug for StaticAuth {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticAuth")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("last_auth_method", &self.last_auth_method)
            .finish()
    }
}

impl StaticAuth {
    /// A signed-out session.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// A session holding `token`.
    #[must_use]
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            last_auth_method: None,
        }
    }

    /// Sets the recorded sign-in method.
    #[must_use]
    pub fn with_last_auth_method(mut self, method: impl Into<String>) -> Self {
        self.last_auth_method = Some(method.into());
        self
    }
}

impl AuthSession for StaticAuth {
    fn bearer_token(&self) -> Option<String> {
        self.token.clone()
    }

    fn last_auth_method(&self) -> Option<String> {
        self.last_auth_method.clone()
    }
}
