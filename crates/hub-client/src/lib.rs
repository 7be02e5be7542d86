//! Blocking HTTP client for the Sentinel Hub process and catalog APIs.
//!
//! Implements the [`cube_store::TileProvider`] interface the virtual store
//! consumes. Credentials come from `SH_CLIENT_ID` / `SH_CLIENT_SECRET`, read
//! once at construction; the core never sees them.

pub mod auth;
pub mod client;

pub use auth::TokenProvider;
pub use client::{ClientConfig, SentinelHubClient};

use thiserror::Error;

/// Errors of the HTTP collaborator. The store surface sees them mapped into
/// `CatalogError` / `ProviderError`.
#[derive(Error, Debug)]
pub enum HubClientError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("request failed: {0}")]
    Http(String),

    #[error("unexpected status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("malformed response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for HubClientError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, HubClientError>;
