//! End-user interaction routes of an OpenID Connect identity provider.
//!
//! The embedded engine pauses authorization requests that need input
//! (account selection, login or consent) and hands them to these routes
//! by uid. The routes render the matching view, collect the decision and
//! report it back through [`InteractionProvider`].

pub mod accounts;
pub mod config;
mod debug;
pub mod error;
pub mod federated;
pub mod provider;
pub mod result;
mod routes;
mod views;

pub use accounts::{Account, AccountStore, Credentials, SqliteAccounts};
pub use config::{Config, InteractionSettings};
pub use error::InteractionError;
pub use federated::{FederatedClient, GoogleClient};
pub use provider::{InteractionProvider, MemoryProvider};
pub use result::{InteractionResult, Resolution};
pub use routes::interaction_routes;
