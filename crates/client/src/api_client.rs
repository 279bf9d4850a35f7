//! HTTP API client for the persisted notification history.

use std::sync::Arc;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use staynest_shared::{ApiError, Notification};

use crate::auth::CredentialProvider;

/// HTTP client for making authenticated requests to the Staynest API.
///
/// Requests carry the current bearer token; a 401 triggers exactly one
/// credential refresh (shared with any concurrent refresh through the
/// provider's single-flight) before the request is retried.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    credentials: Option<Arc<dyn CredentialProvider>>,
}

impl ApiClient {
    /// Create a new API client
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: String::new(),
            credentials: None,
        }
    }

    /// Set the base URL for API requests
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Attach a credential provider for bearer auth and 401 retry
    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if self.base_url.is_empty() {
            if path.starts_with('/') {
                path.to_string()
            } else {
                format!("/{path}")
            }
        } else {
            let base = self.base_url.trim_end_matches('/');
            let path = path.trim_start_matches('/');
            format!("{base}/{path}")
        }
    }

    /// Make an authenticated GET request
    pub async fn get_json<TRes: DeserializeOwned>(&self, path: &str) -> Result<TRes, ApiError> {
        let url = self.url(path);
        let text = self.send_with_retry(|| self.client.get(&url)).await?;
        serde_json::from_str(&text).map_err(|e| ApiError::Deserialize(e.to_string()))
    }

    /// Make an authenticated PUT request with no body
    pub async fn put_empty(&self, path: &str) -> Result<(), ApiError> {
        let url = self.url(path);
        self.send_with_retry(|| self.client.put(&url)).await?;
        Ok(())
    }

    /// Send a request, refreshing the credential and retrying once on a 401.
    async fn send_with_retry(
        &self,
        make: impl Fn() -> RequestBuilder,
    ) -> Result<String, ApiError> {
        let mut refreshed = false;
        loop {
            let mut rb = make();
            if let Some(credentials) = &self.credentials {
                if let Some(token) = credentials.bearer_token() {
                    rb = rb.bearer_auth(token);
                }
            }

            let resp = rb
                .send()
                .await
                .map_err(|e| ApiError::Network(e.to_string()))?;

            let status = resp.status().as_u16();
            let is_success = resp.status().is_success();

            let text = resp
                .text()
                .await
                .map_err(|e| ApiError::Network(format!("failed to read body: {e}")))?;

            if is_success {
                return Ok(text);
            }

            if status == 401 && !refreshed {
                if let Some(credentials) = &self.credentials {
                    tracing::debug!("got 401, refreshing credential and retrying");
                    if credentials.refresh().await.is_ok() {
                        refreshed = true;
                        continue;
                    }
                }
            }

            return Err(ApiError::Http { status, body: text });
        }
    }

    // --- Notification API methods ---

    /// Fetch the user's persisted notifications, newest first.
    pub async fn fetch_notifications(&self) -> Result<Vec<Notification>, ApiError> {
        self.get_json("/api/notifications").await
    }

    /// Mark all of the user's notifications read.
    pub async fn mark_all_read(&self) -> Result<(), ApiError> {
        self.put_empty("/api/notifications/read").await
    }
}

impl Default for ApiClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joining() {
        let client = ApiClient::new().with_base_url("https://staynest.example/");
        assert_eq!(
            client.url("/api/notifications"),
            "https://staynest.example/api/notifications"
        );
        assert_eq!(
            client.url("api/notifications"),
            "https://staynest.example/api/notifications"
        );
        assert_eq!(
            client.url("https://other.example/x"),
            "https://other.example/x"
        );

        let bare = ApiClient::new();
        assert_eq!(bare.url("api/notifications"), "/api/notifications");
    }
}
