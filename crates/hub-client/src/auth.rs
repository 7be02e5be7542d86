//! OAuth2 client-credentials token handling.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::sync::Mutex;
use tracing::debug;

use crate::{HubClientError, Result};

/// Refresh this long before the reported expiry.
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone)]
struct Token {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl Token {
    fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - Duration::seconds(EXPIRY_MARGIN_SECS) > now
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// Acquires and refreshes the bearer token for API calls.
///
/// The token is cached until shortly before expiry; concurrent callers
/// share one cached value.
pub struct TokenProvider {
    http: reqwest::blocking::Client,
    oauth2_url: String,
    client_id: String,
    client_secret: String,
    cached: Mutex<Option<Token>>,
}

impl TokenProvider {
    pub fn new(
        http: reqwest::blocking::Client,
        oauth2_url: String,
        client_id: String,
        client_secret: String,
    ) -> Self {
        Self {
            http,
            oauth2_url,
            client_id,
            client_secret,
            cached: Mutex::new(None),
        }
    }

    /// A currently valid access token, fetching a fresh one if needed.
    pub fn access_token(&self) -> Result<String> {
        let now = Utc::now();

        if let Ok(cached) = self.cached.lock() {
            if let Some(token) = cached.as_ref() {
                if token.is_valid(now) {
                    return Ok(token.access_token.clone());
                }
            }
        }

        let token = self.request_token(now)?;
        let access_token = token.access_token.clone();
        if let Ok(mut cached) = self.cached.lock() {
            *cached = Some(token);
        }
        Ok(access_token)
    }

    fn request_token(&self, now: DateTime<Utc>) -> Result<Token> {
        debug!(url = %self.oauth2_url, "requesting access token");

        let response = self
            .http
            .post(format!("{}/token", self.oauth2_url))
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .map_err(|e| HubClientError::Auth(e.to_string()))?;

        if !response.status().is_success() {
            return Err(HubClientError::Auth(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }

        let body: TokenResponse = response
            .json()
            .map_err(|e| HubClientError::Auth(e.to_string()))?;

        Ok(Token {
            access_token: body.access_token,
            expires_at: now + Duration::seconds(body.expires_in),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_validity_margin() {
        let now = Utc::now();
        let token = Token {
            access_token: "t".to_string(),
            expires_at: now + Duration::seconds(3600),
        };
        assert!(token.is_valid(now));
        assert!(!token.is_valid(now + Duration::seconds(3600 - 30)));
        assert!(!token.is_valid(now + Duration::seconds(3700)));
    }
}
