use std::str::FromStr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::get,
};
use color_eyre::Result;
use color_eyre::eyre::Context;
use oidc_interactions::config::Config;
use oidc_interactions::provider::{AuthorizationParams, ClientMetadata, Session};
use oidc_interactions::{GoogleClient, MemoryProvider, SqliteAccounts, interaction_routes};
use serde::Deserialize;
use sqlx::{SqlitePool, sqlite::SqliteConnectOptions};
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::EnvFilter;

type Provider = MemoryProvider<SqliteAccounts>;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let config = Config::from_env().wrap_err("reading configuration")?;

    let opts = SqliteConnectOptions::from_str(&config.database_url)
        .wrap_err("parsing DATABASE_URL")?
        .create_if_missing(true);

    let pool = SqlitePool::connect_with(opts)
        .await
        .wrap_err("connecting to db")?;

    sqlx::migrate!()
        .run(&pool)
        .await
        .wrap_err("running migrations")?;

    let accounts = Arc::new(SqliteAccounts::new(pool));

    if let Some((login, password)) = &config.dev_account {
        match accounts
            .create_account(login, password.clone(), None)
            .await
            .wrap_err("creating dev account")?
        {
            Some(account) => info!(%login, account_id = %account.account_id, "Created dev account"),
            None => info!(%login, "Dev account already exists"),
        }
    }

    let provider = Arc::new(MemoryProvider::new(accounts.clone()));
    provider
        .register_client(ClientMetadata {
            client_id: "dev".to_owned(),
            client_name: Some("Development client".to_owned()),
            ..ClientMetadata::default()
        })
        .await;

    let google = match &config.google_client_id {
        Some(client_id) => {
            let client = GoogleClient::discover(client_id.clone(), config.federated_redirect_uri())
                .await
                .wrap_err("discovering google provider")?;
            info!("Google sign-in enabled");
            Some(client)
        }
        None => {
            warn!("GOOGLE_CLIENT_ID not set, Google sign-in disabled");
            None
        }
    };

    let app = Router::new()
        .route("/auth", get(authorize))
        .route("/auth/{uid}", get(resume))
        .with_state(provider.clone())
        .merge(interaction_routes(
            provider,
            accounts,
            google,
            config.interaction_settings(),
        ));

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .wrap_err("binding listener")?;
    info!(addr = ?config.listen_addr, "Starting server");
    axum::serve(listener, app).await.wrap_err("serving app")
}

#[derive(Deserialize)]
struct AuthorizeQuery {
    /// Account of an already signed-in end-user.
    account_id: Option<String>,
    #[serde(flatten)]
    params: AuthorizationParams,
}

/// Pauses an authorization request and sends the user-agent to its
/// interaction.
async fn authorize(
    State(provider): State<Arc<Provider>>,
    Query(query): Query<AuthorizeQuery>,
) -> Response {
    let session = query.account_id.map(|account_id| Session { account_id });
    let interaction = provider.start(query.params, session).await;
    info!(uid = %interaction.uid, prompt = %interaction.prompt.name, "Started interaction");
    Redirect::to(&format!("/interaction/{}", interaction.uid)).into_response()
}

async fn resume(State(provider): State<Arc<Provider>>, Path(uid): Path<String>) -> Response {
    match provider.result(&uid).await {
        Some(result) => Json(result).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
