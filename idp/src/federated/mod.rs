//! Login through an external identity provider.
//!
//! The flow is a redirect round trip: the login view posts to the
//! federated route, which stores a state/nonce pair in cookies and redirects
//! to the provider. The provider answers on the callback page, which reposts
//! the response to the same federated route, where the cookies are consumed
//! and the returned ID token is verified by the client library.

mod google;
pub mod handshake;

use std::collections::HashMap;
use std::future::Future;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::provider::Claims;

pub use google::GoogleClient;

/// The only provider wired into the routes.
pub const GOOGLE: &str = "google";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// Picks the response parameters out of a submitted form. `None` when
    /// the form carries none of them.
    pub fn from_form(form: &HashMap<String, String>) -> Option<Self> {
        let field = |name: &str| {
            form.get(name)
                .filter(|value| !value.is_empty())
                .cloned()
        };
        let params = Self {
            state: field("state"),
            id_token: field("id_token"),
            code: field("code"),
            access_token: field("access_token"),
            token_type: field("token_type"),
            expires_in: field("expires_in"),
            error: field("error"),
            error_description: field("error_description"),
        };
        (params != Self::default()).then_some(params)
    }
}

pub struct AuthorizationRequest<'a> {
    pub state: &'a str,
    pub nonce: &'a str,
    pub scope: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackChecks {
    pub state: Option<String>,
    pub nonce: Option<String>,
    pub response_type: &'static str,
}

#[derive(Debug, thiserror::Error)]
pub enum FederatedError {
    #[error("identity provider returned {error}: {description}")]
    Provider { error: String, description: String },
    #[error("{0} check value is missing")]
    MissingCheck(&'static str),
    #[error("state mismatch")]
    StateMismatch,
    #[error("id_token not present in the response")]
    MissingIdToken,
    #[error("id token verification failed: {0}")]
    Verification(String),
    #[error("provider discovery failed: {0}")]
    Discovery(String),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}

pub trait FederatedClient: Send + Sync + 'static {
    fn callback_params(&self, form: &HashMap<String, String>) -> Option<CallbackParams> {
        CallbackParams::from_form(form)
    }

    fn authorization_url(&self, request: &AuthorizationRequest<'_>) -> Result<Url, FederatedError>;

    /// Verifies a callback response and returns the identity claims it
    /// asserts.
    fn callback(
        &self,
        params: CallbackParams,
        checks: CallbackChecks,
    ) -> impl Future<Output = Result<Claims, FederatedError>> + Send;
}
