use std::future::Future;

use color_eyre::{Result, eyre::Context};
use serde::Deserialize;
use serde_json::Value;
use sqlx::SqlitePool;

use crate::provider::Claims;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub account_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub login: String,
    #[serde(default)]
    pub password: String,
}

pub trait AccountStore: Send + Sync + 'static {
    /// `None` when the login is unknown or the password does not match.
    fn find_by_login(
        &self,
        credentials: &Credentials,
    ) -> impl Future<Output = Result<Option<Account>>> + Send;

    /// Resolves the account behind verified claims of a federated identity
    /// provider.
    fn find_by_federated(
        &self,
        provider: &str,
        claims: &Claims,
    ) -> impl Future<Output = Result<Option<Account>>> + Send;

    fn claims(&self, account_id: &str) -> impl Future<Output = Result<Option<Claims>>> + Send;
}

#[derive(Clone)]
pub struct SqliteAccounts {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct AccountWithPassword {
    id: i64,
    password: Option<String>,
}

#[derive(sqlx::FromRow)]
struct AccountClaims {
    id: i64,
    email: Option<String>,
    email_verified: bool,
    name: Option<String>,
}

fn hash_password(password: &str) -> Result<String> {
    use password_hash::PasswordHasher;
    let salt = password_hash::SaltString::generate(&mut rand_core::OsRng);
    let argon2 = argon2::Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| color_eyre::eyre::eyre!("hashing password: {err}"))
}

fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Ok(hash) = password_hash::PasswordHash::parse(stored_hash, password_hash::Encoding::B64)
    else {
        return false;
    };

    hash.verify_password(&[&argon2::Argon2::default()], password)
        .is_ok()
}

impl SqliteAccounts {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Returns `None` if the login is taken.
    pub async fn create_account(
        &self,
        login: &str,
        password: String,
        email: Option<&str>,
    ) -> Result<Option<Account>> {
        let password = tokio::task::spawn_blocking(move || hash_password(&password)).await??;

        let result = sqlx::query_scalar::<_, i64>(
            "insert into accounts (login, password, email, created) values (?, ?, ?, ?) returning id",
        )
        .bind(login)
        .bind(password)
        .bind(email)
        .bind(jiff::Timestamp::now().as_millisecond())
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(id) => Ok(Some(Account {
                account_id: id.to_string(),
            })),
            Err(sqlx::Error::Database(db)) if db.kind() == sqlx::error::ErrorKind::UniqueViolation => {
                Ok(None)
            }
            Err(err) => Err(err).wrap_err("creating account"),
        }
    }
}

impl AccountStore for SqliteAccounts {
    async fn find_by_login(&self, credentials: &Credentials) -> Result<Option<Account>> {
        let result = sqlx::query_as::<_, AccountWithPassword>(
            "select id, password from accounts where login = ?",
        )
        .bind(&credentials.login)
        .fetch_one(&self.pool)
        .await;

        let account = match result {
            Ok(account) => account,
            Err(sqlx::Error::RowNotFound) => return Ok(None),
            Err(e) => return Err(e).wrap_err("failed to fetch account"),
        };

        // federated-only accounts have no password
        let Some(stored) = account.password else {
            return Ok(None);
        };

        let password = credentials.password.clone();
        let is_ok = tokio::task::spawn_blocking(move || verify_password(&password, &stored)).await?;

        if !is_ok {
            return Ok(None);
        }

        Ok(Some(Account {
            account_id: account.id.to_string(),
        }))
    }

    async fn find_by_federated(&self, provider: &str, claims: &Claims) -> Result<Option<Account>> {
        let Some(subject) = claims.get("sub").and_then(Value::as_str) else {
            return Ok(None);
        };

        let linked = sqlx::query_scalar::<_, i64>(
            "select account_id from federated_identities where provider = ? and subject = ?",
        )
        .bind(provider)
        .bind(subject)
        .fetch_optional(&self.pool)
        .await
        .wrap_err("failed to fetch federated identity")?;

        if let Some(id) = linked {
            return Ok(Some(Account {
                account_id: id.to_string(),
            }));
        }

        let mut tx = self.pool.begin().await.wrap_err("starting transaction")?;

        let id = sqlx::query_scalar::<_, i64>(
            "insert into accounts (login, email, email_verified, name, created) values (?, ?, ?, ?, ?) returning id",
        )
        .bind(format!("{provider}:{subject}"))
        .bind(claims.get("email").and_then(Value::as_str))
        .bind(claims.get("email_verified").and_then(Value::as_bool).unwrap_or(false))
        .bind(claims.get("name").and_then(Value::as_str))
        .bind(jiff::Timestamp::now().as_millisecond())
        .fetch_one(&mut *tx)
        .await
        .wrap_err("inserting federated account")?;

        sqlx::query(
            "insert into federated_identities (provider, subject, account_id) values (?, ?, ?)",
        )
        .bind(provider)
        .bind(subject)
        .bind(id)
        .execute(&mut *tx)
        .await
        .wrap_err("linking federated identity")?;

        tx.commit().await.wrap_err("committing federated account")?;

        tracing::info!(%provider, account_id = id, "Created account for federated identity");

        Ok(Some(Account {
            account_id: id.to_string(),
        }))
    }

    async fn claims(&self, account_id: &str) -> Result<Option<Claims>> {
        let Ok(id) = account_id.parse::<i64>() else {
            return Ok(None);
        };

        let account = sqlx::query_as::<_, AccountClaims>(
            "select id, email, email_verified, name from accounts where id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .wrap_err("failed to fetch account claims")?;

        Ok(account.map(|account| {
            let mut claims = Claims::new();
            claims.insert("sub".to_owned(), account.id.to_string().into());
            if let Some(email) = account.email {
                claims.insert("email".to_owned(), email.into());
                claims.insert("email_verified".to_owned(), account.email_verified.into());
            }
            if let Some(name) = account.name {
                claims.insert("name".to_owned(), name.into());
            }
            claims
        }))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    use super::*;

    async fn accounts() -> SqliteAccounts {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!().run(&pool).await.unwrap();
        SqliteAccounts::new(pool)
    }

    fn credentials(login: &str, password: &str) -> Credentials {
        Credentials {
            login: login.to_owned(),
            password: password.to_owned(),
        }
    }

    #[tokio::test]
    async fn login_checks_password() {
        let accounts = accounts().await;
        let created = accounts
            .create_account("alice", "hunter2".to_owned(), Some("alice@example.com"))
            .await
            .unwrap()
            .unwrap();

        let found = accounts
            .find_by_login(&credentials("alice", "hunter2"))
            .await
            .unwrap();
        assert_eq!(found, Some(created));

        let wrong = accounts
            .find_by_login(&credentials("alice", "hunter3"))
            .await
            .unwrap();
        assert_eq!(wrong, None);

        let unknown = accounts
            .find_by_login(&credentials("bob", "hunter2"))
            .await
            .unwrap();
        assert_eq!(unknown, None);
    }

    #[tokio::test]
    async fn duplicate_login_is_rejected() {
        let accounts = accounts().await;
        assert!(
            accounts
                .create_account("alice", "a".to_owned(), None)
                .await
                .unwrap()
                .is_some()
        );
        assert!(
            accounts
                .create_account("alice", "b".to_owned(), None)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn federated_identity_is_linked_once() {
        let accounts = accounts().await;
        let claims = json!({
            "sub": "1077305720238",
            "email": "alice@gmail.com",
            "email_verified": true,
            "name": "Alice"
        });
        let claims = claims.as_object().unwrap();

        let first = accounts
            .find_by_federated("google", claims)
            .await
            .unwrap()
            .unwrap();
        let second = accounts
            .find_by_federated("google", claims)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first, second);

        let stored = accounts.claims(&first.account_id).await.unwrap().unwrap();
        assert_eq!(stored["email"], "alice@gmail.com");
        assert_eq!(stored["email_verified"], true);
        assert_eq!(stored["name"], "Alice");
        assert_eq!(stored["sub"], first.account_id.as_str());

        // no password, so the credential login never matches
        let by_login = accounts
            .find_by_login(&credentials("google:1077305720238", ""))
            .await
            .unwrap();
        assert_eq!(by_login, None);
    }

    #[tokio::test]
    async fn federated_claims_without_subject() {
        let accounts = accounts().await;
        let claims = json!({ "email": "alice@gmail.com" });
        let found = accounts
            .find_by_federated("google", claims.as_object().unwrap())
            .await
            .unwrap();
        assert_eq!(found, None);
    }

    #[tokio::test]
    async fn unknown_account_has_no_claims() {
        let accounts = accounts().await;
        assert_eq!(accounts.claims("42").await.unwrap(), None);
        assert_eq!(accounts.claims("not-a-number").await.unwrap(), None);
    }
}
