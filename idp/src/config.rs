use std::net::SocketAddr;

use crate::federated::GOOGLE;

pub const DEFAULT_FEDERATED_SCOPE: &str = "openid email profile";

#[derive(Debug, Clone)]
pub struct InteractionSettings {
    pub(crate) secure_cookies: bool,
    pub(crate) federated_scope: String,
}

impl Default for InteractionSettings {
    fn default() -> Self {
        Self {
            secure_cookies: true,
            federated_scope: DEFAULT_FEDERATED_SCOPE.to_owned(),
        }
    }
}

impl InteractionSettings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.secure_cookies = secure;
        self
    }
}

#[derive(Debug, thiserror::Error)]
#[error("configuration: {0}")]
pub struct ConfigError(String);

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub database_url: String,
    /// Externally visible origin, used to build the federated callback URL.
    pub public_url: String,
    pub secure_cookies: bool,
    pub google_client_id: Option<String>,
    /// `login:password` of an account created at startup.
    pub dev_account: Option<(String, String)>,
}

impl Config {
    /// # Env vars
    /// - `LISTEN_ADDR` (default `0.0.0.0:3000`)
    /// - `DATABASE_URL` (default `sqlite://accounts.sqlite`)
    /// - `PUBLIC_URL` (default `http://localhost:3000`)
    /// - `SECURE_COOKIES`: `1` or `true` to mark cookies `Secure`
    /// - `GOOGLE_CLIENT_ID`: enables the Google sign-in
    /// - `DEV_ACCOUNT`: `login:password`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let listen_addr: SocketAddr = var("LISTEN_ADDR")
            .unwrap_or_else(|| "0.0.0.0:3000".to_owned())
            .parse()
            .map_err(|e| ConfigError(format!("LISTEN_ADDR: {e}")))?;

        let public_url = var("PUBLIC_URL").unwrap_or_else(|| "http://localhost:3000".to_owned());
        url::Url::parse(&public_url).map_err(|e| ConfigError(format!("PUBLIC_URL: {e}")))?;

        let dev_account = match var("DEV_ACCOUNT") {
            Some(account) => {
                let (login, password) = account
                    .split_once(':')
                    .ok_or_else(|| ConfigError("DEV_ACCOUNT must be login:password".into()))?;
                Some((login.to_owned(), password.to_owned()))
            }
            None => None,
        };

        Ok(Self {
            listen_addr,
            database_url: var("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://accounts.sqlite".to_owned()),
            public_url: public_url.trim_end_matches('/').to_owned(),
            secure_cookies: matches!(var("SECURE_COOKIES").as_deref(), Some("1") | Some("true")),
            google_client_id: var("GOOGLE_CLIENT_ID").filter(|id| !id.is_empty()),
            dev_account,
        })
    }

    pub fn federated_redirect_uri(&self) -> String {
        format!("{}/interaction/callback/{GOOGLE}", self.public_url)
    }

    pub fn interaction_settings(&self) -> InteractionSettings {
        InteractionSettings::new().with_secure_cookies(self.secure_cookies)
    }
}
