//! Credential provider seam for the notification hub.
//!
//! The live connection and the API client both authenticate with a bearer
//! token owned by the auth subsystem. The hub only needs two things from it:
//! the current token, and a way to refresh it when the provider reports
//! expiry. Refreshes are single-flighted so concurrent expiry signals share
//! one refresh request.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use staynest_shared::AuthError;

use crate::single_flight::SingleFlight;

/// Supplies the current bearer credential and refreshes it on demand.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// The current cached bearer token, if the user is authenticated.
    fn bearer_token(&self) -> Option<String>;

    /// Refresh the credential, returning the new bearer token. Concurrent
    /// calls must share a single in-flight refresh.
    async fn refresh(&self) -> Result<String, AuthError>;
}

/// Token-pair credentials refreshed against the Staynest auth endpoint.
///
/// Persistence of the tokens (local storage, keychain, ...) is the caller's
/// concern; this type only holds them in memory for the session.
#[derive(Clone)]
pub struct SessionCredentials {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    http: reqwest::Client,
    base_url: String,
    tokens: Mutex<TokenState>,
    refresh_flight: SingleFlight<Result<String, AuthError>>,
}

#[derive(Default)]
struct TokenState {
    access: Option<String>,
    refresh: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest {
    refresh_token: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

impl SessionCredentials {
    pub fn new(
        base_url: impl Into<String>,
        access_token: Option<String>,
        refresh_token: Option<String>,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                http: reqwest::Client::new(),
                base_url: base_url.into(),
                tokens: Mutex::new(TokenState {
                    access: access_token,
                    refresh: refresh_token,
                }),
                refresh_flight: SingleFlight::new(),
            }),
        }
    }

    /// Replace both tokens, e.g. after a fresh login.
    pub fn set_tokens(&self, access_token: Option<String>, refresh_token: Option<String>) {
        let mut tokens = self.inner.tokens.lock().unwrap();
        tokens.access = access_token;
        tokens.refresh = refresh_token;
    }
}

#[async_trait]
impl CredentialProvider for SessionCredentials {
    fn bearer_token(&self) -> Option<String> {
        self.inner.tokens.lock().unwrap().access.clone()
    }

    async fn refresh(&self) -> Result<String, AuthError> {
        let inner = self.inner.clone();
        self.inner
            .refresh_flight
            .run(move || async move {
                let refresh_token = inner
                    .tokens
                    .lock()
                    .unwrap()
                    .refresh
                    .clone()
                    .ok_or(AuthError::NotAuthenticated)?;

                let url = format!("{}/api/auth/refresh", inner.base_url.trim_end_matches('/'));
                tracing::debug!("refreshing access token via {}", url);

                let resp = inner
                    .http
                    .post(&url)
                    .json(&RefreshRequest { refresh_token })
                    .send()
                    .await
                    .map_err(|e| AuthError::Refresh(e.to_string()))?;

                if !resp.status().is_success() {
                    return Err(AuthError::Refresh(format!(
                        "HTTP {}",
                        resp.status().as_u16()
                    )));
                }

                let body: RefreshResponse = resp
                    .json()
                    .await
                    .map_err(|e| AuthError::Refresh(e.to_string()))?;

                let mut tokens = inner.tokens.lock().unwrap();
                tokens.access = Some(body.access_token.clone());
                if let Some(rotated) = body.refresh_token {
                    tokens.refresh = Some(rotated);
                }
                Ok(body.access_token)
            })
            .await
    }
}
