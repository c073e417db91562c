//! The OIDC engine as seen from the interaction router.
//!
//! The engine owns every interaction, session, client and grant. The router
//! only reads the pending interaction and reports the end-user's decision
//! back through [`InteractionProvider`].

mod memory;

use std::future::Future;

use axum::http::StatusCode;
use axum::response::Response;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::result::InteractionResult;

pub use memory::{FinishedInteraction, MemoryProvider};

pub type Claims = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PromptName {
    SelectAccount,
    Login,
    Consent,
    Other(String),
}

impl PromptName {
    pub fn as_str(&self) -> &str {
        match self {
            PromptName::SelectAccount => "select_account",
            PromptName::Login => "login",
            PromptName::Consent => "consent",
            PromptName::Other(name) => name,
        }
    }
}

impl From<String> for PromptName {
    fn from(name: String) -> Self {
        match name.as_str() {
            "select_account" => PromptName::SelectAccount,
            "login" => PromptName::Login,
            "consent" => PromptName::Consent,
            _ => PromptName::Other(name),
        }
    }
}

impl From<PromptName> for String {
    fn from(name: PromptName) -> Self {
        name.as_str().to_owned()
    }
}

impl std::fmt::Display for PromptName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub name: PromptName,
    /// Engine specific reasons, e.g. `missingOIDCScope` for consent.
    #[serde(default)]
    pub details: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationParams {
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AuthorizationParams {
    /// Forces a fresh login once the interaction resumes.
    ///
    /// `login` is added to an existing prompt list (without duplicates),
    /// otherwise the prompt becomes `logout`.
    pub fn request_account_switch(&mut self) {
        let prompt = match self.prompt.take() {
            Some(prompt) if !prompt.trim().is_empty() => {
                let mut prompts: Vec<&str> = Vec::new();
                for name in prompt.split(' ').filter(|name| !name.is_empty()) {
                    if !prompts.contains(&name) {
                        prompts.push(name);
                    }
                }
                if !prompts.contains(&"login") {
                    prompts.push("login");
                }
                prompts.join(" ")
            }
            _ => "logout".to_owned(),
        };
        self.prompt = Some(prompt);
    }

    pub fn extra_str(&self, name: &str) -> Option<&str> {
        self.extra.get(name).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub account_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub uid: String,
    pub prompt: Prompt,
    pub params: AuthorizationParams,
    pub session: Option<Session>,
    /// Where the engine resumes once the interaction is finished.
    pub return_to: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMetadata {
    pub client_id: String,
    #[serde(default)]
    pub client_name: Option<String>,
    #[serde(default)]
    pub logo_uri: Option<String>,
    #[serde(default)]
    pub policy_uri: Option<String>,
    #[serde(default)]
    pub tos_uri: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FinishOptions {
    pub merge_with_last_submission: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// The interaction or the session backing it is gone.
    SessionNotFound,
    Server,
}

#[derive(Debug, thiserror::Error)]
#[error("{error}: {error_description}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub status: StatusCode,
    pub error: String,
    pub error_description: String,
}

impl ProviderError {
    pub fn session_not_found(description: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::SessionNotFound,
            status: StatusCode::BAD_REQUEST,
            error: "invalid_request".to_owned(),
            error_description: description.into(),
        }
    }

    pub fn server(description: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Server,
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: "server_error".to_owned(),
            error_description: description.into(),
        }
    }

    pub fn is_session_not_found(&self) -> bool {
        self.kind == ProviderErrorKind::SessionNotFound
    }
}

pub trait InteractionProvider: Send + Sync + 'static {
    /// Looks up the pending interaction.
    ///
    /// Fails with [`ProviderErrorKind::SessionNotFound`] when the interaction
    /// expired or never existed.
    fn interaction_details(
        &self,
        uid: &str,
    ) -> impl Future<Output = Result<Interaction, ProviderError>> + Send;

    fn save_interaction(
        &self,
        interaction: &Interaction,
    ) -> impl Future<Output = Result<(), ProviderError>> + Send;

    /// Resolves the interaction and resumes the protocol. The returned
    /// response (usually a redirect) is sent to the user-agent as is.
    fn interaction_finished(
        &self,
        uid: &str,
        result: InteractionResult,
        options: FinishOptions,
    ) -> impl Future<Output = Result<Response, ProviderError>> + Send;

    fn find_client(
        &self,
        client_id: &str,
    ) -> impl Future<Output = Result<Option<ClientMetadata>, ProviderError>> + Send;

    /// Claims of an account for the given usage (`"prompt"`, `"userinfo"`, ...)
    /// and space separated scope. `None` if the account is unknown.
    fn account_claims(
        &self,
        account_id: &str,
        usage: &str,
        scope: &str,
    ) -> impl Future<Output = Result<Option<Claims>, ProviderError>> + Send;
}
