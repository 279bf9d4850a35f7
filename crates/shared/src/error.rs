//! Shared error types for the Staynest client.

use serde::Deserialize;
use thiserror::Error;

/// API error type for client-side use.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("Deserialization error: {0}")]
    Deserialize(String),
}

impl ApiError {
    /// Status code for HTTP-level failures, if this is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Errors opening the live transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The server refused the handshake. A reason of `"Token expired"`
    /// signals credential expiry.
    #[error("connection rejected: {reason}")]
    Rejected { reason: String },
    #[error("connect failed: {0}")]
    Connect(String),
}

/// Credential errors surfaced by the auth subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("credential refresh failed: {0}")]
    Refresh(String),
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Attempt to extract a human-readable `message` field from a JSON error
/// body, the envelope the Staynest API uses for `/api/*` failures.
pub fn try_error_message(body: &str) -> Option<String> {
    let parsed = serde_json::from_str::<ErrorBody>(body).ok()?;
    if parsed.message.trim().is_empty() {
        None
    } else {
        Some(parsed.message)
    }
}
