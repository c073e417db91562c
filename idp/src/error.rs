use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use tracing::{error, warn};

use crate::federated::FederatedError;
use crate::provider::ProviderError;
use crate::views::{ErrorOut, render_error};

#[derive(Debug, thiserror::Error)]
pub enum InteractionError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// A submission arrived for a prompt other than the one it answers.
    #[error("expected prompt `{expected}`, pending prompt is `{actual}`")]
    PromptMismatch { expected: &'static str, actual: String },

    #[error("prompt `{0}` is not handled here")]
    UnhandledPrompt(String),

    #[error("unknown federated provider `{0}`")]
    UnknownProvider(String),

    #[error("account store: {0:?}")]
    Accounts(color_eyre::Report),

    #[error(transparent)]
    Federated(#[from] FederatedError),

    #[error("rendering view: {0}")]
    Render(#[from] askama::Error),
}

impl IntoResponse for InteractionError {
    fn into_response(self) -> Response {
        match self {
            InteractionError::Provider(err) if err.is_session_not_found() => {
                warn!(error = %err.error, description = %err.error_description, "Interaction not found");
                let out = ErrorOut {
                    error: err.error,
                    error_description: err.error_description,
                };
                match render_error(&out) {
                    Ok(page) => (err.status, Html(page)).into_response(),
                    Err(err) => {
                        error!(?err, "Error rendering error page");
                        StatusCode::INTERNAL_SERVER_ERROR.into_response()
                    }
                }
            }
            InteractionError::UnhandledPrompt(_) | InteractionError::UnknownProvider(_) => {
                warn!(err = %self, "No handler for interaction request");
                StatusCode::NOT_FOUND.into_response()
            }
            err => {
                error!(?err, "Error handling interaction");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}
