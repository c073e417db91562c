use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use rand_core::RngCore;
use time::Duration;

use super::CallbackChecks;

/// Single-use values protecting one federated login round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeState {
    /// `<uid>|<64 hex chars>`, ties the callback to the interaction.
    pub state: String,
    pub nonce: String,
}

fn random_hex() -> String {
    let mut bytes = [0_u8; 32];
    rand_core::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

impl HandshakeState {
    pub fn generate(uid: &str) -> Self {
        Self {
            state: format!("{uid}|{}", random_hex()),
            nonce: random_hex(),
        }
    }
}

/// The cookies are scoped to this path, so only the federated route of the
/// same interaction sees them.
pub fn cookie_path(uid: &str) -> String {
    format!("/interaction/{uid}/federated")
}

fn state_cookie_name(provider: &str) -> String {
    format!("{provider}.state")
}

fn nonce_cookie_name(provider: &str) -> String {
    format!("{provider}.nonce")
}

fn handshake_cookie(name: String, value: String, path: &str, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Strict)
        .path(path.to_owned())
        .max_age(Duration::minutes(10))
        .build()
}

pub fn begin(
    jar: CookieJar,
    provider: &str,
    handshake: &HandshakeState,
    path: &str,
    secure: bool,
) -> CookieJar {
    jar.add(handshake_cookie(
        state_cookie_name(provider),
        handshake.state.clone(),
        path,
        secure,
    ))
    .add(handshake_cookie(
        nonce_cookie_name(provider),
        handshake.nonce.clone(),
        path,
        secure,
    ))
}

/// Reads the pending handshake and clears its cookies on the same path.
///
/// The returned jar carries the removal cookies and has to be part of the
/// response whatever the outcome of the callback.
pub fn take(jar: CookieJar, provider: &str, path: &str) -> (CookieJar, CallbackChecks) {
    let state_name = state_cookie_name(provider);
    let nonce_name = nonce_cookie_name(provider);

    let checks = CallbackChecks {
        state: jar.get(&state_name).map(|c| c.value().to_owned()),
        nonce: jar.get(&nonce_name).map(|c| c.value().to_owned()),
        response_type: "id_token",
    };

    let jar = jar
        .remove(Cookie::build((state_name, "")).path(path.to_owned()))
        .remove(Cookie::build((nonce_name, "")).path(path.to_owned()));

    (jar, checks)
}
