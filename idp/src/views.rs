use askama::Template;
use serde_json::Value;

use crate::debug;
use crate::provider::{ClientMetadata, Interaction};

/// What every interaction view shows: the client, the prompt and the
/// debug panels.
pub struct PageContext {
    pub title: &'static str,
    pub uid: String,
    pub client_name: String,
    pub client_logo: Option<String>,
    pub policy_uri: Option<String>,
    pub tos_uri: Option<String>,
    pub session_debug: Option<String>,
    pub params_debug: String,
    pub prompt_debug: String,
}

impl PageContext {
    pub fn new(
        title: &'static str,
        client: Option<ClientMetadata>,
        interaction: &Interaction,
    ) -> Result<Self, askama::Error> {
        let client = client.unwrap_or_else(|| ClientMetadata {
            client_id: interaction.params.client_id.clone(),
            ..ClientMetadata::default()
        });

        Ok(Self {
            title,
            uid: interaction.uid.clone(),
            client_name: client.client_name.unwrap_or(client.client_id),
            client_logo: client.logo_uri,
            policy_uri: client.policy_uri,
            tos_uri: client.tos_uri,
            session_debug: interaction
                .session
                .as_ref()
                .map(|session| debug::render_value(session))
                .transpose()?,
            params_debug: debug::render_value(&interaction.params)?,
            prompt_debug: debug::render_value(&interaction.prompt)?,
        })
    }
}

#[derive(Template)]
#[template(path = "select_account.html")]
pub struct SelectAccountTemplate {
    pub page: PageContext,
    pub email: String,
}

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub page: PageContext,
    pub login_hint: String,
    pub federated: bool,
}

#[derive(Template)]
#[template(path = "interaction.html")]
pub struct ConsentTemplate {
    pub page: PageContext,
    pub missing_scopes: Vec<String>,
    pub missing_claims: Vec<String>,
}

impl ConsentTemplate {
    pub fn new(page: PageContext, interaction: &Interaction) -> Self {
        let strings = |name: &str| -> Vec<String> {
            interaction
                .prompt
                .details
                .get(name)
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_owned)
                        .collect()
                })
                .unwrap_or_default()
        };

        Self {
            missing_scopes: strings("missingOIDCScope"),
            missing_claims: strings("missingOIDCClaims"),
            page,
        }
    }
}

/// Carries the fragment of a provider callback back to the server.
#[derive(Template)]
#[template(path = "repost.html")]
pub struct RepostTemplate<'a> {
    pub provider: &'a str,
    pub nonce: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorOut {
    pub error: String,
    pub error_description: String,
}

#[derive(Template)]
#[template(path = "error.html")]
struct ErrorTemplate<'a> {
    entries: Vec<(&'a str, &'a str)>,
}

pub fn render_error(out: &ErrorOut) -> Result<String, askama::Error> {
    ErrorTemplate {
        entries: vec![
            ("error", out.error.as_str()),
            ("error_description", out.error_description.as_str()),
        ],
    }
    .render()
}

#[cfg(test)]
mod tests {
    use serde_json::{Map, json};

    use super::*;
    use crate::provider::{AuthorizationParams, Prompt, PromptName, Session};

    fn interaction(name: PromptName, details: Value) -> Interaction {
        Interaction {
            uid: "abc".to_owned(),
            prompt: Prompt {
                name,
                details: details.as_object().cloned().unwrap_or_else(Map::new),
            },
            params: AuthorizationParams {
                client_id: "app".to_owned(),
                scope: Some("openid email".to_owned()),
                ..AuthorizationParams::default()
            },
            session: Some(Session {
                account_id: "u1".to_owned(),
            }),
            return_to: "/auth/abc".to_owned(),
        }
    }

    #[test]
    fn error_page_lists_pairs() {
        let html = render_error(&ErrorOut {
            error: "invalid_request".to_owned(),
            error_description: "interaction session not found".to_owned(),
        })
        .unwrap();
        assert!(html.contains("oops! something went wrong"));
        assert!(html.contains("<strong>error</strong>: invalid_request"));
        assert!(html.contains("<strong>error_description</strong>: interaction session not found"));
    }

    #[test]
    fn error_page_escapes_values() {
        let html = render_error(&ErrorOut {
            error: "<b>".to_owned(),
            error_description: String::new(),
        })
        .unwrap();
        assert!(!html.contains("<b>"));
    }

    #[test]
    fn page_falls_back_to_client_id() {
        let page = PageContext::new(
            "Sign-in",
            None,
            &interaction(PromptName::Login, json!({})),
        )
        .unwrap();
        assert_eq!(page.client_name, "app");
        assert!(page.session_debug.unwrap().contains("u1"));
        assert!(page.params_debug.contains("<strong>client_id</strong>: app"));
    }

    #[test]
    fn consent_lists_missing_scopes() {
        let interaction = interaction(
            PromptName::Consent,
            json!({ "missingOIDCScope": ["openid", "email"], "missingOIDCClaims": ["email"] }),
        );
        let client = ClientMetadata {
            client_id: "app".to_owned(),
            client_name: Some("Example App".to_owned()),
            ..ClientMetadata::default()
        };
        let page = PageContext::new("Authorize", Some(client), &interaction).unwrap();
        let template = ConsentTemplate::new(page, &interaction);
        assert_eq!(template.missing_scopes, ["openid", "email"]);
        assert_eq!(template.missing_claims, ["email"]);

        let html = template.render().unwrap();
        assert!(html.contains("Example App"));
        assert!(html.contains("/interaction/abc/confirm"));
        assert!(html.contains("/interaction/abc/abort"));
    }

    #[test]
    fn login_shows_federated_button_when_enabled() {
        let interaction = interaction(PromptName::Login, json!({}));
        let with = LoginTemplate {
            page: PageContext::new("Sign-in", None, &interaction).unwrap(),
            login_hint: String::new(),
            federated: true,
        }
        .render()
        .unwrap();
        assert!(with.contains("/interaction/abc/federated"));

        let without = LoginTemplate {
            page: PageContext::new("Sign-in", None, &interaction).unwrap(),
            login_hint: String::new(),
            federated: false,
        }
        .render()
        .unwrap();
        assert!(!without.contains("/interaction/abc/federated"));
        assert!(without.contains("/interaction/abc/login"));
    }
}
