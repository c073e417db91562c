#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, header};
use color_eyre::Result;
use oidc_interactions::accounts::{Account, AccountStore, Credentials};
use oidc_interactions::federated::{
    AuthorizationRequest, CallbackChecks, CallbackParams, FederatedClient, FederatedError,
};
use oidc_interactions::provider::{
    AuthorizationParams, Claims, Interaction, MemoryProvider, Prompt, PromptName, Session,
};
use oidc_interactions::{InteractionSettings, interaction_routes};
use serde_json::{Map, Value, json};
use tower::ServiceExt;
use url::Url;

pub const UID: &str = "abc";

/// `alice` / `secret` is account `u1`, the Google subject `g-1` is `u2`.
pub struct StaticAccounts;

impl AccountStore for StaticAccounts {
    async fn find_by_login(&self, credentials: &Credentials) -> Result<Option<Account>> {
        Ok(
            (credentials.login == "alice" && credentials.password == "secret").then(|| Account {
                account_id: "u1".to_owned(),
            }),
        )
    }

    async fn find_by_federated(&self, provider: &str, claims: &Claims) -> Result<Option<Account>> {
        let subject = claims.get("sub").and_then(Value::as_str);
        Ok((provider == "google" && subject == Some("g-1")).then(|| Account {
            account_id: "u2".to_owned(),
        }))
    }

    async fn claims(&self, account_id: &str) -> Result<Option<Claims>> {
        Ok((account_id == "u1").then(|| {
            object(json!({
                "sub": "u1",
                "email": "alice@example.com",
                "email_verified": true,
                "name": "Alice"
            }))
        }))
    }
}

/// Accepts the ID token `good`, for subject `g-1`.
pub struct StubFederated;

impl FederatedClient for StubFederated {
    fn authorization_url(&self, request: &AuthorizationRequest<'_>) -> Result<Url, FederatedError> {
        Ok(Url::parse_with_params(
            "https://idp.example/authorize",
            &[
                ("response_type", "id_token"),
                ("state", request.state),
                ("nonce", request.nonce),
                ("scope", request.scope),
            ],
        )?)
    }

    async fn callback(
        &self,
        params: CallbackParams,
        checks: CallbackChecks,
    ) -> Result<Claims, FederatedError> {
        if let Some(error) = params.error {
            return Err(FederatedError::Provider {
                error,
                description: params.error_description.unwrap_or_default(),
            });
        }
        let state = checks.state.ok_or(FederatedError::MissingCheck("state"))?;
        if params.state.as_deref() != Some(state.as_str()) {
            return Err(FederatedError::StateMismatch);
        }
        checks.nonce.ok_or(FederatedError::MissingCheck("nonce"))?;

        match params.id_token.as_deref() {
            Some("good") => Ok(object(json!({ "sub": "g-1" }))),
            Some(_) => Err(FederatedError::Verification("bad signature".to_owned())),
            None => Err(FederatedError::MissingIdToken),
        }
    }
}

pub fn object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

pub struct TestApp {
    pub provider: Arc<MemoryProvider<StaticAccounts>>,
    router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        Self::build(true)
    }

    pub fn without_federated() -> Self {
        Self::build(false)
    }

    fn build(federated: bool) -> Self {
        let accounts = Arc::new(StaticAccounts);
        let provider = Arc::new(MemoryProvider::new(accounts.clone()));
        let router = interaction_routes(
            provider.clone(),
            accounts,
            federated.then_some(StubFederated),
            InteractionSettings::new().with_secure_cookies(false),
        );
        Self { provider, router }
    }

    /// Seeds the interaction `abc`.
    pub async fn interaction(&self, name: PromptName, session: Option<&str>) -> Interaction {
        self.interaction_with(name, session, AuthorizationParams::default(), Map::new())
            .await
    }

    pub async fn interaction_with(
        &self,
        name: PromptName,
        session: Option<&str>,
        params: AuthorizationParams,
        details: Map<String, Value>,
    ) -> Interaction {
        let interaction = Interaction {
            uid: UID.to_owned(),
            prompt: Prompt { name, details },
            params: AuthorizationParams {
                client_id: "app".to_owned(),
                ..params
            },
            session: session.map(|account_id| Session {
                account_id: account_id.to_owned(),
            }),
            return_to: format!("/auth/{UID}"),
        };
        self.provider.insert(interaction.clone()).await;
        interaction
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    pub async fn post(&self, uri: &str, form: &str) -> Response<Body> {
        self.send(form_request(uri, form)).await
    }

    /// Latest result the engine stored for `abc`, as JSON.
    pub async fn result(&self) -> Option<Value> {
        self.provider
            .result(UID)
            .await
            .map(|result| serde_json::to_value(result).unwrap())
    }
}

pub fn form_request(uri: &str, form: &str) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form.to_owned()))
        .unwrap()
}

pub async fn body(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub fn location(response: &Response<Body>) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
}

pub fn set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|value| value.to_str().unwrap().to_owned())
        .collect()
}
