//! Error taxonomy for the authorization-code flow.

use serde::Serialize;
use thiserror::Error;

/// Maximum number of bytes of a provider response kept inside an error.
pub const MAX_ERROR_BODY: usize = 2048;

const REDACTED: &str = "[redacted]";

/// Errors returned by every fallible operation of the client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The `state` echoed by the callback does not match the stored one.
    #[error("state parameter mismatch")]
    StateMismatch,
    /// The user (or the provider on their behalf) refused the authorization.
    #[error("authorization denied by user: {error}")]
    UserDenied {
        error: String,
        description: Option<String>,
    },
    /// The provider answered with a non-success status.
    #[error("provider rejected request with status {status}")]
    ProviderRejected { status: u16, body: String },
    /// DNS, TLS, connection or timeout failure.
    #[error("transport failure: {0}")]
    TransportFailure(String),
    /// The response body could not be interpreted. `body` is the scrubbed raw body.
    #[error("malformed provider response: {reason}")]
    MalformedResponse { reason: String, body: Option<String> },
    /// The profile endpoint refused the access token.
    #[error("access token rejected with status {status}")]
    TokenRejected { status: u16 },
    /// The profile did not yield a subject identifier.
    #[error("profile has no subject identifier")]
    MissingSubjectId,
    /// The provider configuration is unusable.
    #[error("invalid provider configuration: {0}")]
    InvalidConfig(String),
    /// The caller supplied an unusable argument (empty code, incomplete callback).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Payload-free discriminant of [`AuthError`], handy for structured logs and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthErrorKind {
    StateMismatch,
    UserDenied,
    ProviderRejected,
    TransportFailure,
    MalformedResponse,
    TokenRejected,
    MissingSubjectId,
    InvalidConfig,
    InvalidRequest,
}

impl AuthErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthErrorKind::StateMismatch => "state_mismatch",
            AuthErrorKind::UserDenied => "user_denied",
            AuthErrorKind::ProviderRejected => "provider_rejected",
            AuthErrorKind::TransportFailure => "transport_failure",
            AuthErrorKind::MalformedResponse => "malformed_response",
            AuthErrorKind::TokenRejected => "token_rejected",
            AuthErrorKind::MissingSubjectId => "missing_subject_id",
            AuthErrorKind::InvalidConfig => "invalid_config",
            AuthErrorKind::InvalidRequest => "invalid_request",
        }
    }
}

impl std::fmt::Display for AuthErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AuthError {
    pub fn kind(&self) -> AuthErrorKind {
        match self {
            AuthError::StateMismatch => AuthErrorKind::StateMismatch,
            AuthError::UserDenied { .. } => AuthErrorKind::UserDenied,
            AuthError::ProviderRejected { .. } => AuthErrorKind::ProviderRejected,
            AuthError::TransportFailure(_) => AuthErrorKind::TransportFailure,
            AuthError::MalformedResponse { .. } => AuthErrorKind::MalformedResponse,
            AuthError::TokenRejected { .. } => AuthErrorKind::TokenRejected,
            AuthError::MissingSubjectId => AuthErrorKind::MissingSubjectId,
            AuthError::InvalidConfig(_) => AuthErrorKind::InvalidConfig,
            AuthError::InvalidRequest(_) => AuthErrorKind::InvalidRequest,
        }
    }

    /// HTTP status reported by the provider, if the error came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            AuthError::ProviderRejected { status, .. } | AuthError::TokenRejected { status } => Some(*status),
            _ => None,
        }
    }

    /// Whether restarting the whole login flow may succeed.
    ///
    /// Only transport failures qualify. Even then the caller must start over
    /// from a fresh authorization request: an authorization code is single-use.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthError::TransportFailure(_))
    }

    /// Message safe to show to the end user.
    pub fn user_message(&self) -> &'static str {
        match self {
            AuthError::TransportFailure(_) | AuthError::ProviderRejected { .. } => {
                "Login failed because the identity provider could not be reached. Please try again."
            }
            AuthError::InvalidConfig(_) => "Login is not available right now.",
            _ => "Login failed.",
        }
    }
}

/// Truncates `body` and replaces every occurrence of a secret with a marker.
///
/// Empty secrets are ignored.
pub fn scrub(body: &str, secrets: &[&str]) -> String {
    let mut out = body.to_string();
    for secret in secrets.iter().filter(|s| !s.is_empty()) {
        out = out.replace(secret, REDACTED);
    }
    if out.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !out.is_char_boundary(cut) {
            cut -= 1;
        }
        out.truncate(cut);
        out.push_str("...");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_failures_are_retryable() {
        assert!(AuthError::TransportFailure("timeout".into()).is_retryable());
        assert!(!AuthError::StateMismatch.is_retryable());
        assert!(!AuthError::ProviderRejected { status: 400, body: String::new() }.is_retryable());
        assert!(!AuthError::MissingSubjectId.is_retryable());
    }

    #[test]
    fn probing_errors_get_generic_message() {
        let denied = AuthError::UserDenied { error: "access_denied".into(), description: None };
        assert_eq!(denied.user_message(), "Login failed.");
        assert_eq!(AuthError::StateMismatch.user_message(), "Login failed.");
        assert!(AuthError::TransportFailure("x".into()).user_message().contains("try again"));
    }

    #[test]
    fn scrub_removes_secrets_and_truncates() {
        let body = format!("{{\"echo\":\"s3cr3t\",\"pad\":\"{}\"}}", "x".repeat(4096));
        let cleaned = scrub(&body, &["s3cr3t", ""]);
        assert!(!cleaned.contains("s3cr3t"));
        assert!(cleaned.contains(REDACTED));
        assert!(cleaned.len() <= MAX_ERROR_BODY + 3);
    }

    #[test]
    fn kind_labels_are_snake_case() {
        assert_eq!(AuthError::MissingSubjectId.kind().to_string(), "missing_subject_id");
        assert_eq!(
            serde_json::to_string(&AuthErrorKind::ProviderRejected).unwrap(),
            "\"provider_rejected\""
        );
    }
}
