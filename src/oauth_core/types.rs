//! Values exchanged between the caller and the client during one login attempt.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One login attempt's authorize redirect.
///
/// The caller stores `state` (and `pkce_verifier`, if any) with session
/// scope until the callback arrives, then consumes it exactly once.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    /// Anti-CSRF value bound to this attempt.
    pub state: String,
    /// Full authorize URL the user agent is redirected to.
    pub redirect_url: String,
    /// PKCE verifier, present when the provider config enables PKCE.
    pub pkce_verifier: Option<String>,
}

impl fmt::Debug for AuthorizationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationRequest")
            .field("redirect_url", &self.redirect_url)
            .field("pkce", &self.pkce_verifier.is_some())
            .finish_non_exhaustive()
    }
}

/// Result of a successful code exchange or refresh.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResult {
    /// Opaque bearer credential.
    pub access_token: String,
    /// Always `"Bearer"` for tokens this crate accepts.
    pub token_type: String,
    /// Lifetime in seconds; `None` when the provider did not say.
    pub expires_in_seconds: Option<u64>,
    pub refresh_token: Option<String>,
    /// Scope actually granted, as reported by the provider.
    pub scope: Option<String>,
}

impl fmt::Debug for TokenResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResult")
            .field("access_token", &"[redacted]")
            .field("token_type", &self.token_type)
            .field("expires_in_seconds", &self.expires_in_seconds)
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[redacted]"))
            .field("scope", &self.scope)
            .finish()
    }
}

/// Optional profile fields produced by a field mapper.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileFields {
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub username: Option<String>,
}

/// Provider-independent view of an authenticated user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalIdentity {
    pub provider_id: String,
    /// Provider's stable subject identifier. Never empty.
    pub external_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub username: Option<String>,
    /// Profile document exactly as returned by the provider.
    pub raw_profile: Map<String, Value>,
}

/// `code` and `state` taken from the provider's redirect back to the callback URL.
#[derive(Clone, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: String,
    pub state: String,
}

impl fmt::Debug for CallbackParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackParams")
            .field("code", &"[redacted]")
            .field("state", &"[redacted]")
            .finish()
    }
}

/// Progress of a single login attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginStage {
    /// State generated, redirect URL built.
    Initiated,
    /// State stored, user agent sent to the provider.
    AwaitingCallback,
    /// Callback arrived and its state matched.
    CodeReceived,
    TokenAcquired,
    /// Terminal success.
    ProfileFetched,
    /// Terminal failure.
    Failed,
}

impl LoginStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoginStage::ProfileFetched | LoginStage::Failed)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// Stages only advance one step at a time; any non-terminal stage may fail.
    pub fn can_advance_to(&self, next: LoginStage) -> bool {
        use LoginStage::*;
        match (self, next) {
            (s, Failed) => !s.is_terminal(),
            (Initiated, AwaitingCallback)
            | (AwaitingCallback, CodeReceived)
            | (CodeReceived, TokenAcquired)
            | (TokenAcquired, ProfileFetched) => true,
            _ => false,
        }
    }
}

impl fmt::Display for LoginStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoginStage::Initiated => "initiated",
            LoginStage::AwaitingCallback => "awaiting_callback",
            LoginStage::CodeReceived => "code_received",
            LoginStage::TokenAcquired => "token_acquired",
            LoginStage::ProfileFetched => "profile_fetched",
            LoginStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_cannot_skip_state_validation() {
        assert!(!LoginStage::AwaitingCallback.can_advance_to(LoginStage::TokenAcquired));
        assert!(!LoginStage::Initiated.can_advance_to(LoginStage::CodeReceived));
        assert!(LoginStage::AwaitingCallback.can_advance_to(LoginStage::CodeReceived));
        assert!(LoginStage::TokenAcquired.can_advance_to(LoginStage::Failed));
        assert!(!LoginStage::ProfileFetched.can_advance_to(LoginStage::Failed));
    }

    #[test]
    fn token_debug_hides_credentials() {
        let token = TokenResult {
            access_token: "tok1".into(),
            token_type: "Bearer".into(),
            expires_in_seconds: Some(7200),
            refresh_token: Some("ref1".into()),
            scope: None,
        };
        let shown = format!("{:?}", token);
        assert!(!shown.contains("tok1"));
        assert!(!shown.contains("ref1"));
    }
}
