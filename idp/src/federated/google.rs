use std::str::FromStr;

use openidconnect::core::{CoreAuthenticationFlow, CoreClient, CoreIdToken, CoreProviderMetadata};
use openidconnect::{ClientId, CsrfToken, IssuerUrl, Nonce, RedirectUrl, Scope, reqwest};
use serde_json::Value;
use tracing::{info, warn};
use url::Url;

use super::{AuthorizationRequest, CallbackChecks, CallbackParams, FederatedClient, FederatedError};
use crate::provider::Claims;

pub const GOOGLE_ISSUER: &str = "https://accounts.google.com";

/// Google sign-in with the implicit `id_token` flow.
///
/// The ID token comes back in the URL fragment of the callback page and is
/// verified (signature, issuer, audience, expiry and nonce) by
/// `openidconnect` against the discovered provider metadata.
pub struct GoogleClient {
    metadata: CoreProviderMetadata,
    client_id: ClientId,
    redirect_uri: RedirectUrl,
}

impl GoogleClient {
    pub async fn discover(client_id: String, redirect_uri: String) -> Result<Self, FederatedError> {
        let http_client = reqwest::ClientBuilder::new()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|err| FederatedError::Discovery(err.to_string()))?;

        let metadata =
            CoreProviderMetadata::discover_async(IssuerUrl::new(GOOGLE_ISSUER.to_owned())?, &http_client)
                .await
                .map_err(|err| FederatedError::Discovery(err.to_string()))?;

        info!(issuer = GOOGLE_ISSUER, "Discovered federated provider");

        Ok(Self::new(metadata, client_id, RedirectUrl::new(redirect_uri)?))
    }

    pub fn new(metadata: CoreProviderMetadata, client_id: String, redirect_uri: RedirectUrl) -> Self {
        Self {
            metadata,
            client_id: ClientId::new(client_id),
            redirect_uri,
        }
    }
}

impl FederatedClient for GoogleClient {
    fn authorization_url(&self, request: &AuthorizationRequest<'_>) -> Result<Url, FederatedError> {
        let client = CoreClient::from_provider_metadata(
            self.metadata.clone(),
            self.client_id.clone(),
            None,
        )
        .set_redirect_uri(self.redirect_uri.clone());

        let state = request.state.to_owned();
        let nonce = request.nonce.to_owned();
        // openid is always requested by the client
        let scopes = request
            .scope
            .split(' ')
            .filter(|scope| !scope.is_empty() && *scope != "openid")
            .map(|scope| Scope::new(scope.to_owned()));

        let (url, _, _) = client
            .authorize_url(
                CoreAuthenticationFlow::Implicit(false),
                move || CsrfToken::new(state),
                move || Nonce::new(nonce),
            )
            .add_scopes(scopes)
            .url();

        Ok(url)
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

        let expected_state = checks.state.ok_or(FederatedError::MissingCheck("state"))?;
        if params.state.as_deref() != Some(expected_state.as_str()) {
            warn!("Federated callback state mismatch");
            return Err(FederatedError::StateMismatch);
        }
        let nonce = checks.nonce.ok_or(FederatedError::MissingCheck("nonce"))?;

        let raw = params.id_token.ok_or(FederatedError::MissingIdToken)?;
        let id_token = CoreIdToken::from_str(&raw)
            .map_err(|err| FederatedError::Verification(err.to_string()))?;

        let client = CoreClient::from_provider_metadata(
            self.metadata.clone(),
            self.client_id.clone(),
            None,
        )
        .set_redirect_uri(self.redirect_uri.clone());

        let verified = id_token
            .claims(&client.id_token_verifier(), &Nonce::new(nonce))
            .map_err(|err| FederatedError::Verification(err.to_string()))?;

        let mut claims = Claims::new();
        claims.insert("sub".to_owned(), verified.subject().as_str().into());
        if let Some(email) = verified.email() {
            claims.insert("email".to_owned(), email.as_str().into());
        }
        if let Some(email_verified) = verified.email_verified() {
            claims.insert("email_verified".to_owned(), Value::Bool(email_verified));
        }
        if let Some(name) = verified.name().and_then(|name| name.get(None)) {
            claims.insert("name".to_owned(), name.as_str().into());
        }

        Ok(claims)
    }
}
