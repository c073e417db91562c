use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use axum::response::{IntoResponse, Redirect, Response};
use rand_core::RngCore;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, error};

use super::{
    AuthorizationParams, Claims, ClientMetadata, FinishOptions, Interaction, InteractionProvider,
    Prompt, PromptName, ProviderError, Session,
};
use crate::accounts::AccountStore;
use crate::result::InteractionResult;

const INTERACTION_TTL: Duration = Duration::from_secs(60 * 60);

/// Resolutions kept by [`MemoryProvider::finished`].
const FINISHED_LOG_LEN: usize = 100;

const SCOPE_CLAIMS: &[(&str, &[&str])] = &[
    ("openid", &["sub"]),
    ("email", &["email", "email_verified"]),
    ("profile", &["name", "given_name", "family_name", "picture", "locale"]),
];

pub fn generate_uid() -> String {
    let mut bytes = [0_u8; 16];
    rand_core::OsRng.fill_bytes(&mut bytes);
    base32::encode(base32::Alphabet::Rfc4648 { padding: false }, &bytes).to_lowercase()
}

struct StoredInteraction {
    interaction: Interaction,
    expires_at: jiff::Timestamp,
    result: Option<InteractionResult>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FinishedInteraction {
    pub uid: String,
    pub result: InteractionResult,
    pub merge_with_last_submission: bool,
}

/// An in-process engine for development and tests.
///
/// Interactions live in memory for an hour and expired ones are dropped
/// whenever a new one is inserted. Finishing one stores the (possibly
/// merged) result and redirects to the interaction's `return_to`. Account
/// claims are served by the account store.
pub struct MemoryProvider<A> {
    accounts: Arc<A>,
    clients: Mutex<HashMap<String, ClientMetadata>>,
    interactions: Mutex<HashMap<String, StoredInteraction>>,
    finished: Mutex<VecDeque<FinishedInteraction>>,
}

impl<A: AccountStore> MemoryProvider<A> {
    pub fn new(accounts: Arc<A>) -> Self {
        Self {
            accounts,
            clients: Mutex::new(HashMap::new()),
            interactions: Mutex::new(HashMap::new()),
            finished: Mutex::new(VecDeque::with_capacity(FINISHED_LOG_LEN)),
        }
    }

    pub async fn register_client(&self, client: ClientMetadata) {
        self.clients
            .lock()
            .await
            .insert(client.client_id.clone(), client);
    }

    /// Pauses an authorization request for end-user input.
    ///
    /// The prompt follows the requested `prompt` parameter: `consent` and
    /// `select_account` are honored, anything else asks for a login.
    pub async fn start(
        &self,
        params: AuthorizationParams,
        session: Option<Session>,
    ) -> Interaction {
        let requested = params.prompt.clone().unwrap_or_default();
        let requested: Vec<&str> = requested.split(' ').collect();

        let prompt = if requested.contains(&"consent") {
            let scopes: Vec<Value> = params
                .scope
                .as_deref()
                .unwrap_or("openid")
                .split(' ')
                .filter(|scope| !scope.is_empty())
                .map(|scope| Value::String(scope.to_owned()))
                .collect();
            let mut details = Map::new();
            details.insert("missingOIDCScope".to_owned(), Value::Array(scopes));
            Prompt {
                name: PromptName::Consent,
                details,
            }
        } else if requested.contains(&"select_account") {
            Prompt {
                name: PromptName::SelectAccount,
                details: Map::new(),
            }
        } else {
            Prompt {
                name: PromptName::Login,
                details: Map::new(),
            }
        };

        let uid = generate_uid();
        let interaction = Interaction {
            return_to: format!("/auth/{uid}"),
            uid,
            prompt,
            params,
            session,
        };
        self.insert(interaction.clone()).await;
        interaction
    }

    pub async fn insert(&self, interaction: Interaction) {
        let expires_at = jiff::Timestamp::now()
            .checked_add(INTERACTION_TTL)
            .unwrap_or(jiff::Timestamp::MAX);
        self.insert_expiring(interaction, expires_at).await;
    }

    async fn insert_expiring(&self, interaction: Interaction, expires_at: jiff::Timestamp) {
        let now = jiff::Timestamp::now();
        let mut interactions = self.interactions.lock().await;
        interactions.retain(|_, stored| stored.expires_at > now);
        interactions.insert(
            interaction.uid.clone(),
            StoredInteraction {
                interaction,
                expires_at,
                result: None,
            },
        );
    }

    pub async fn result(&self, uid: &str) -> Option<InteractionResult> {
        self.interactions
            .lock()
            .await
            .get(uid)
            .and_then(|stored| stored.result.clone())
    }

    /// The latest resolutions received, oldest first.
    pub async fn finished(&self) -> Vec<FinishedInteraction> {
        self.finished.lock().await.iter().cloned().collect()
    }
}

impl<A: AccountStore> InteractionProvider for MemoryProvider<A> {
    async fn interaction_details(&self, uid: &str) -> Result<Interaction, ProviderError> {
        let mut interactions = self.interactions.lock().await;
        match interactions.get(uid) {
            Some(stored) if stored.expires_at > jiff::Timestamp::now() => {
                Ok(stored.interaction.clone())
            }
            Some(_) => {
                interactions.remove(uid);
                Err(ProviderError::session_not_found("interaction session has expired"))
            }
            None => Err(ProviderError::session_not_found("interaction session not found")),
        }
    }

    async fn save_interaction(&self, interaction: &Interaction) -> Result<(), ProviderError> {
        let mut interactions = self.interactions.lock().await;
        let stored = interactions
            .get_mut(&interaction.uid)
            .ok_or_else(|| ProviderError::session_not_found("interaction session not found"))?;
        stored.interaction = interaction.clone();
        Ok(())
    }

    async fn interaction_finished(
        &self,
        uid: &str,
        result: InteractionResult,
        options: FinishOptions,
    ) -> Result<Response, ProviderError> {
        let mut interactions = self.interactions.lock().await;
        let stored = interactions
            .get_mut(uid)
            .ok_or_else(|| ProviderError::session_not_found("interaction session not found"))?;

        let mut finished = self.finished.lock().await;
        if finished.len() == FINISHED_LOG_LEN {
            finished.pop_front();
        }
        finished.push_back(FinishedInteraction {
            uid: uid.to_owned(),
            result: result.clone(),
            merge_with_last_submission: options.merge_with_last_submission,
        });
        drop(finished);

        let result = match (options.merge_with_last_submission, stored.result.take()) {
            (true, Some(last)) => result.merge_onto(last),
            _ => result,
        };
        debug!(%uid, ?result, "Interaction finished");
        stored.result = Some(result);

        Ok(Redirect::to(&stored.interaction.return_to).into_response())
    }

    async fn find_client(&self, client_id: &str) -> Result<Option<ClientMetadata>, ProviderError> {
        Ok(self.clients.lock().await.get(client_id).cloned())
    }

    async fn account_claims(
        &self,
        account_id: &str,
        _usage: &str,
        scope: &str,
    ) -> Result<Option<Claims>, ProviderError> {
        let claims = self.accounts.claims(account_id).await.map_err(|err| {
            error!(?err, "Error fetching account claims");
            ProviderError::server("failed to load account")
        })?;

        Ok(claims.map(|claims| {
            let allowed: Vec<&str> = SCOPE_CLAIMS
                .iter()
                .filter(|(name, _)| *name == "openid" || scope.split(' ').any(|s| s == *name))
                .flat_map(|(_, claims)| claims.iter().copied())
                .collect();
            claims
                .into_iter()
                .filter(|(name, _)| allowed.contains(&name.as_str()))
                .collect()
        }))
    }
}
