//! Typed errors raised by the LZT REST adapter.
//!
//! Ports and use cases speak `anyhow`; this enum travels inside those
//! errors so the watcher can tell a transient outage from a request the
//! remote will keep rejecting.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("invalid client configuration: {0}")]
    InvalidConfig(String),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("error response from the server with code {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

impl ApiError {
    /// Whether retrying the same request later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::RetriesExhausted { .. } => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::InvalidConfig(_) | Self::Decode(_) => false,
        }
    }

    /// Classify an arbitrary error chain. Errors that carry no `ApiError`
    /// are assumed transient.
    pub fn is_transient_chain(err: &anyhow::Error) -> bool {
        err.chain()
            .find_map(|cause| cause.downcast_ref::<Self>())
            .is_none_or(Self::is_transient)
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Context;

    use super::*;

    #[test]
    fn test_status_classification() {
        let throttled = ApiError::Status { status: 429, body: String::new() };
        let unavailable = ApiError::Status { status: 503, body: String::new() };
        let unauthorized = ApiError::Status { status: 401, body: "bad token".into() };
        assert!(throttled.is_transient());
        assert!(unavailable.is_transient());
        assert!(!unauthorized.is_transient());
    }

    #[test]
    fn test_chain_classification_sees_through_context() {
        let err = Err::<(), _>(ApiError::Status { status: 403, body: String::new() })
            .context("Failed to fetch payments history")
            .unwrap_err();
        assert!(!ApiError::is_transient_chain(&err));

        let opaque = anyhow::anyhow!("connection reset");
        assert!(ApiError::is_transient_chain(&opaque));
    }

    #[test]
    fn test_status_message_includes_body() {
        let err = ApiError::Status { status: 401, body: "invalid_token".into() };
        assert_eq!(
            err.to_string(),
            "error response from the server with code 401: invalid_token"
        );
    }
}
