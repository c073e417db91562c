use std::collections::HashMap;
use std::sync::Arc;

use askama::Template;
use axum::extract::{Path, Request, State};
use axum::http::{HeaderValue, header};
use axum::middleware::{self, Next};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use axum_extra::extract::CookieJar;
use base64::{Engine, prelude::BASE64_URL_SAFE_NO_PAD};
use rand_core::RngCore;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::accounts::{AccountStore, Credentials};
use crate::config::InteractionSettings;
use crate::error::InteractionError;
use crate::federated::handshake::{self, HandshakeState};
use crate::federated::{
    AuthorizationRequest, CallbackChecks, CallbackParams, FederatedClient, GOOGLE,
};
use crate::provider::{FinishOptions, Interaction, InteractionProvider, PromptName};
use crate::result::{InteractionResult, Resolution};
use crate::views::{
    ConsentTemplate, LoginTemplate, PageContext, RepostTemplate, SelectAccountTemplate,
};

struct InteractionState<P, A, F> {
    provider: Arc<P>,
    accounts: Arc<A>,
    federated: Option<Arc<F>>,
    settings: InteractionSettings,
}

impl<P, A, F> Clone for InteractionState<P, A, F> {
    fn clone(&self) -> Self {
        Self {
            provider: self.provider.clone(),
            accounts: self.accounts.clone(),
            federated: self.federated.clone(),
            settings: self.settings.clone(),
        }
    }
}

/// Without a federated client the login view has no Google button and the
/// federated route answers 404.
pub fn interaction_routes<P, A, F>(
    provider: Arc<P>,
    accounts: Arc<A>,
    federated: Option<F>,
    settings: InteractionSettings,
) -> Router
where
    P: InteractionProvider,
    A: AccountStore,
    F: FederatedClient,
{
    let state = InteractionState {
        provider,
        accounts,
        federated: federated.map(Arc::new),
        settings,
    };

    Router::new()
        .route("/interaction/callback/google", get(repost))
        .route("/interaction/{uid}", get(inspect::<P, A, F>))
        .route("/interaction/{uid}/login", post(login::<P, A, F>))
        .route("/interaction/{uid}/federated", post(federated_login::<P, A, F>))
        .route("/interaction/{uid}/continue", post(continue_::<P, A, F>))
        .route("/interaction/{uid}/confirm", post(confirm::<P, A, F>))
        .route("/interaction/{uid}/abort", get(abort::<P, A, F>))
        .layer(middleware::from_fn(no_cache))
        .with_state(state)
}

async fn no_cache(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store"),
    );
    response
}

fn expect_prompt(interaction: &Interaction, expected: PromptName) -> Result<(), InteractionError> {
    if interaction.prompt.name == expected {
        Ok(())
    } else {
        Err(InteractionError::PromptMismatch {
            expected: match expected {
                PromptName::SelectAccount => "select_account",
                PromptName::Login => "login",
                PromptName::Consent => "consent",
                PromptName::Other(_) => "other",
            },
            actual: interaction.prompt.name.to_string(),
        })
    }
}

async fn finish<P: InteractionProvider>(
    provider: &P,
    uid: &str,
    result: InteractionResult,
    merge_with_last_submission: bool,
) -> Result<Response, InteractionError> {
    debug!(%uid, ?result, merge_with_last_submission, "Resolving interaction");
    Ok(provider
        .interaction_finished(
            uid,
            result,
            FinishOptions {
                merge_with_last_submission,
            },
        )
        .await?)
}

fn render(template: impl Template) -> Result<Response, InteractionError> {
    Ok(Html(template.render()?).into_response())
}

async fn inspect<P: InteractionProvider, A: AccountStore, F: FederatedClient>(
    State(state): State<InteractionState<P, A, F>>,
    Path(uid): Path<String>,
) -> Result<Response, InteractionError> {
    let interaction = state.provider.interaction_details(&uid).await?;
    let client = state
        .provider
        .find_client(&interaction.params.client_id)
        .await?;

    match &interaction.prompt.name {
        PromptName::SelectAccount => {
            let Some(session) = &interaction.session else {
                info!(uid = %interaction.uid, "No session, skipping account selection");
                return finish(
                    state.provider.as_ref(),
                    &interaction.uid,
                    Resolution::select_account().into(),
                    false,
                )
                .await;
            };

            let claims = state
                .provider
                .account_claims(&session.account_id, "prompt", "email")
                .await?;
            let email = claims
                .as_ref()
                .and_then(|claims| claims.get("email"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned();

            render(SelectAccountTemplate {
                page: PageContext::new("Sign-in", client, &interaction)?,
                email,
            })
        }
        PromptName::Login => render(LoginTemplate {
            page: PageContext::new("Sign-in", client, &interaction)?,
            login_hint: interaction
                .params
                .extra_str("login_hint")
                .unwrap_or_default()
                .to_owned(),
            federated: state.federated.is_some(),
        }),
        PromptName::Consent => {
            let page = PageContext::new("Authorize", client, &interaction)?;
            render(ConsentTemplate::new(page, &interaction))
        }
        PromptName::Other(name) => Err(InteractionError::UnhandledPrompt(name.clone())),
    }
}

async fn login<P: InteractionProvider, A: AccountStore, F: FederatedClient>(
    State(state): State<InteractionState<P, A, F>>,
    Path(uid): Path<String>,
    Form(credentials): Form<Credentials>,
) -> Result<Response, InteractionError> {
    let interaction = state.provider.interaction_details(&uid).await?;
    expect_prompt(&interaction, PromptName::Login)?;

    let account = state
        .accounts
        .find_by_login(&credentials)
        .await
        .map_err(InteractionError::Accounts)?;

    if account.is_none() {
        info!(uid = %interaction.uid, "Login failed, prompting again");
    }

    finish(
        state.provider.as_ref(),
        &interaction.uid,
        Resolution::for_account(account).into(),
        false,
    )
    .await
}

async fn federated_login<P: InteractionProvider, A: AccountStore, F: FederatedClient>(
    State(state): State<InteractionState<P, A, F>>,
    Path(uid): Path<String>,
    jar: CookieJar,
    Form(form): Form<HashMap<String, String>>,
) -> Result<Response, InteractionError> {
    let interaction = state.provider.interaction_details(&uid).await?;
    expect_prompt(&interaction, PromptName::Login)?;

    let provider = form.get("provider").map(String::as_str).unwrap_or_default();
    let client = match (provider, &state.federated) {
        (GOOGLE, Some(client)) => client,
        _ => return Err(InteractionError::UnknownProvider(provider.to_owned())),
    };

    let path = handshake::cookie_path(&interaction.uid);

    let Some(params) = client.callback_params(&form) else {
        let pending = HandshakeState::generate(&interaction.uid);
        let url = client.authorization_url(&AuthorizationRequest {
            state: &pending.state,
            nonce: &pending.nonce,
            scope: &state.settings.federated_scope,
        })?;
        let jar = handshake::begin(jar, GOOGLE, &pending, &path, state.settings.secure_cookies);

        info!(uid = %interaction.uid, provider = GOOGLE, "Starting federated login");
        return Ok((jar, Redirect::to(url.as_str())).into_response());
    };

    // cleared before anything else, the handshake is single use
    let (jar, checks) = handshake::take(jar, GOOGLE, &path);

    let outcome = complete_federated(&state, client.as_ref(), &interaction, params, checks).await;

    Ok((jar, outcome).into_response())
}

async fn complete_federated<P: InteractionProvider, A: AccountStore, F: FederatedClient>(
    state: &InteractionState<P, A, F>,
    client: &F,
    interaction: &Interaction,
    params: CallbackParams,
    checks: CallbackChecks,
) -> Result<Response, InteractionError> {
    let claims = client.callback(params, checks).await?;
    let account = state
        .accounts
        .find_by_federated(GOOGLE, &claims)
        .await
        .map_err(InteractionError::Accounts)?;

    if account.is_none() {
        info!(uid = %interaction.uid, provider = GOOGLE, "No account for federated identity");
    }

    finish(
        state.provider.as_ref(),
        &interaction.uid,
        Resolution::for_account(account).into(),
        false,
    )
    .await
}

/// Reposts the fragment of a provider response to the federated route.
async fn repost() -> Result<Response, InteractionError> {
    let mut bytes = [0_u8; 32];
    rand_core::OsRng.fill_bytes(&mut bytes);
    let nonce = BASE64_URL_SAFE_NO_PAD.encode(bytes);

    let page = RepostTemplate {
        provider: GOOGLE,
        nonce: &nonce,
    }
    .render()?;

    Ok((
        [(
            header::CONTENT_SECURITY_POLICY,
            format!("default-src 'none'; script-src 'nonce-{nonce}'; form-action 'self'"),
        )],
        Html(page),
    )
        .into_response())
}

#[derive(Deserialize)]
struct ContinueForm {
    switch: Option<String>,
}

async fn continue_<P: InteractionProvider, A: AccountStore, F: FederatedClient>(
    State(state): State<InteractionState<P, A, F>>,
    Path(uid): Path<String>,
    Form(form): Form<ContinueForm>,
) -> Result<Response, InteractionError> {
    let mut interaction = state.provider.interaction_details(&uid).await?;
    expect_prompt(&interaction, PromptName::SelectAccount)?;

    if form.switch.is_some_and(|switch| !switch.is_empty()) {
        interaction.params.request_account_switch();
        state.provider.save_interaction(&interaction).await?;
        info!(uid = %interaction.uid, prompt = ?interaction.params.prompt, "Switching account");
    }

    finish(
        state.provider.as_ref(),
        &interaction.uid,
        Resolution::select_account().into(),
        false,
    )
    .await
}

async fn confirm<P: InteractionProvider, A: AccountStore, F: FederatedClient>(
    State(state): State<InteractionState<P, A, F>>,
    Path(uid): Path<String>,
) -> Result<Response, InteractionError> {
    let interaction = state.provider.interaction_details(&uid).await?;
    expect_prompt(&interaction, PromptName::Consent)?;

    // consent layers onto the login submitted earlier in the same flow
    finish(
        state.provider.as_ref(),
        &interaction.uid,
        Resolution::consent_all().into(),
        true,
    )
    .await
}

async fn abort<P: InteractionProvider, A: AccountStore, F: FederatedClient>(
    State(state): State<InteractionState<P, A, F>>,
    Path(uid): Path<String>,
) -> Result<Response, InteractionError> {
    let interaction = state.provider.interaction_details(&uid).await?;
    info!(uid = %interaction.uid, "End-user aborted interaction");

    finish(
        state.provider.as_ref(),
        &interaction.uid,
        InteractionResult::aborted(),
        false,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{AuthorizationParams, Prompt};

    fn interaction(name: PromptName) -> Interaction {
        Interaction {
            uid: "abc".to_owned(),
            prompt: Prompt {
                name,
                details: Default::default(),
            },
            params: AuthorizationParams::default(),
            session: None,
            return_to: "/auth/abc".to_owned(),
        }
    }

    #[test]
    fn matching_prompt_passes() {
        assert!(expect_prompt(&interaction(PromptName::Login), PromptName::Login).is_ok());
    }

    #[test]
    fn mismatched_prompt_names_both() {
        let err = expect_prompt(&interaction(PromptName::Consent), PromptName::Login).unwrap_err();
        let InteractionError::PromptMismatch { expected, actual } = err else {
            panic!("expected a prompt mismatch");
        };
        assert_eq!(expected, "login");
        assert_eq!(actual, "consent");
    }
}
