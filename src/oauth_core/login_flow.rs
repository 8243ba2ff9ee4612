use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::callback::parse_callback;
use super::error::AuthError;
use super::http_client::OAuthHttpClient;
use super::oauth_client::AuthorizationCodeClient;
use super::state_store::{DEFAULT_STATE_TTL, PendingLogin, StateStore};
use super::types::{CanonicalIdentity, LoginStage};

/// Authorization-code flow bound to a [`StateStore`].
///
/// `begin` persists the attempt under the caller's session id and returns the
/// redirect URL; `complete` consumes it when the callback arrives. The stored
/// attempt is removed by `complete` whatever the outcome.
pub struct LoginFlow<C: OAuthHttpClient, S: StateStore> {
    client: AuthorizationCodeClient<C>,
    store: Arc<S>,
    ttl: Duration,
}

impl<C: OAuthHttpClient, S: StateStore> LoginFlow<C, S> {
    /// Constructs a flow with the default ten minute state lifetime.
    pub fn new(client: AuthorizationCodeClient<C>, store: Arc<S>) -> Self {
        LoginFlow { client, store, ttl: DEFAULT_STATE_TTL }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn client(&self) -> &AuthorizationCodeClient<C> {
        &self.client
    }

    /// Fresh opaque session identifier for callers without a session layer of their own.
    pub fn new_session_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Initiate the login: store state (and PKCE verifier) and return the authorize URL.
    #[instrument(skip_all, fields(provider = %self.client.provider_id()), level = "debug")]
    pub async fn begin(&self, session_id: &str, scope: Option<&[String]>) -> Result<String, AuthError> {
        let mut stage = Stage::new();
        let request = self.client.build_authorization_request(scope);
        let pending = PendingLogin {
            provider_id: self.client.provider_id().to_string(),
            state: request.state,
            pkce_verifier: request.pkce_verifier,
            created_at: Utc::now(),
        };
        if let Err(e) = self.store.put(session_id, pending, self.ttl).await {
            stage.fail(&e);
            return Err(e);
        }
        stage.advance(LoginStage::AwaitingCallback);
        Ok(request.redirect_url)
    }

    /// Finish the login from the callback query string.
    ///
    /// A session without a live pending attempt (never started, expired, or
    /// already completed) fails with [`AuthError::StateMismatch`].
    #[instrument(skip_all, fields(provider = %self.client.provider_id()), level = "debug")]
    pub async fn complete(&self, session_id: &str, callback_query: &str) -> Result<CanonicalIdentity, AuthError> {
        let mut stage = Stage::resumed();
        let result = self.run_callback(session_id, callback_query, &mut stage).await;
        if let Err(e) = &result {
            stage.fail(e);
        }
        result
    }

    async fn run_callback(
        &self,
        session_id: &str,
        callback_query: &str,
        stage: &mut Stage,
    ) -> Result<CanonicalIdentity, AuthError> {
        let pending = self
            .store
            .take(session_id)
            .await?
            .filter(|p| p.provider_id == self.client.provider_id())
            .ok_or(AuthError::StateMismatch)?;
        let params = parse_callback(callback_query)?;

        self.client.verify_state(&pending.state, &params.state)?;
        stage.advance(LoginStage::CodeReceived);

        let token = self
            .client
            .exchange_verified_code(&params.code, pending.pkce_verifier.as_deref())
            .await?;
        stage.advance(LoginStage::TokenAcquired);

        let identity = self.client.fetch_profile(&token).await?;
        stage.advance(LoginStage::ProfileFetched);
        Ok(identity)
    }
}

/// Tracks and logs the stage of one attempt.
struct Stage(LoginStage);

impl Stage {
    fn new() -> Self {
        debug!(stage = %LoginStage::Initiated, "login stage");
        Stage(LoginStage::Initiated)
    }

    fn resumed() -> Self {
        Stage(LoginStage::AwaitingCallback)
    }

    fn advance(&mut self, next: LoginStage) {
        debug_assert!(self.0.can_advance_to(next), "illegal login transition {} -> {}", self.0, next);
        debug!(from = %self.0, to = %next, "login stage");
        self.0 = next;
    }

    fn fail(&mut self, error: &AuthError) {
        warn!(from = %self.0, error_kind = %error.kind(), "login failed");
        self.0 = LoginStage::Failed;
    }
}
