//! Outcomes handed back to the engine when an interaction is resolved.

use serde::Serialize;

use crate::accounts::Account;

pub const ACCESS_DENIED: &str = "access_denied";
pub const ABORTED_DESCRIPTION: &str = "End-User aborted interaction";

/// The end-user's decision for a pending interaction.
///
/// Serializes to the shape the engine expects: either the resolution
/// record (`{"select_account": {}, "login": {...}, "consent": {...}}`) or
/// an error outcome (`{"error": ..., "error_description": ...}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum InteractionResult {
    Resolved(Resolution),
    Aborted(AbortResult),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Resolution {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub select_account: Option<SelectAccount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login: Option<LoginResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consent: Option<ConsentResult>,
}

/// Serializes as `{}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SelectAccount {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoginResult {
    pub account: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentResult {
    pub rejected_scopes: Vec<String>,
    pub rejected_claims: Vec<String>,
    /// `false` keeps rejections from earlier consents in place.
    pub replace: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AbortResult {
    pub error: String,
    pub error_description: String,
}

impl Resolution {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn select_account() -> Self {
        Self {
            select_account: Some(SelectAccount {}),
            ..Self::default()
        }
    }

    /// Result of a credential or federated lookup.
    ///
    /// A found account also satisfies account selection, so the engine does
    /// not prompt for it right after a fresh login. A missing account yields
    /// the empty resolution, which makes the engine prompt again.
    pub fn for_account(account: Option<Account>) -> Self {
        match account {
            Some(account) => Self {
                select_account: Some(SelectAccount {}),
                login: Some(LoginResult {
                    account: account.account_id,
                }),
                consent: None,
            },
            None => Self::empty(),
        }
    }

    pub fn consent_all() -> Self {
        Self {
            consent: Some(ConsentResult::default()),
            ..Self::default()
        }
    }
}

impl InteractionResult {
    pub fn aborted() -> Self {
        Self::Aborted(AbortResult {
            error: ACCESS_DENIED.to_owned(),
            error_description: ABORTED_DESCRIPTION.to_owned(),
        })
    }

    pub fn merge_onto(self, last: InteractionResult) -> InteractionResult {
        match (self, last) {
            (InteractionResult::Resolved(next), InteractionResult::Resolved(last)) => {
                InteractionResult::Resolved(Resolution {
                    select_account: next.select_account.or(last.select_account),
                    login: next.login.or(last.login),
                    consent: next.consent.or(last.consent),
                })
            }
            (next, _) => next,
        }
    }
}

impl From<Resolution> for InteractionResult {
    fn from(resolution: Resolution) -> Self {
        InteractionResult::Resolved(resolution)
    }
}
