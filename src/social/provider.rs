use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::oauth_core::error::AuthError;
use crate::oauth_core::http_client::OAuthHttpClient;
use crate::oauth_core::oauth_client::AuthorizationCodeClient;
use crate::oauth_core::types::{AuthorizationRequest, CanonicalIdentity};

/// Implement this to support "Login via X" (42, GitHub, another OAuth2 server…)
#[async_trait]
pub trait ExternalLoginProvider: Send + Sync + 'static {
    /// e.g. "42", "github", "my-oauth2-server"
    fn provider_id(&self) -> &str;

    /// Build the redirect to the upstream /authorize endpoint for a new attempt.
    fn auth_redirect(&self, scope: Option<&[String]>) -> AuthorizationRequest;

    /// After callback: exchange code → token → profile → CanonicalIdentity
    async fn handle_callback(
        &self,
        code: &str,
        expected_state: &str,
        received_state: &str,
        pkce_verifier: Option<&str>,
    ) -> Result<CanonicalIdentity, AuthError>;
}

#[async_trait]
impl<C: OAuthHttpClient> ExternalLoginProvider for AuthorizationCodeClient<C> {
    fn provider_id(&self) -> &str {
        AuthorizationCodeClient::provider_id(self)
    }

    fn auth_redirect(&self, scope: Option<&[String]>) -> AuthorizationRequest {
        self.build_authorization_request(scope)
    }

    async fn handle_callback(
        &self,
        code: &str,
        expected_state: &str,
        received_state: &str,
        pkce_verifier: Option<&str>,
    ) -> Result<CanonicalIdentity, AuthError> {
        let token = self
            .exchange_code_with_verifier(code, expected_state, received_state, pkce_verifier)
            .await?;
        self.fetch_profile(&token).await
    }
}

/// Caller-owned set of providers keyed by provider id.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn ExternalLoginProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a provider. Ids must be unique.
    pub fn register(&mut self, provider: Arc<dyn ExternalLoginProvider>) -> Result<(), AuthError> {
        let id = provider.provider_id().to_string();
        if self.providers.contains_key(&id) {
            return Err(AuthError::InvalidConfig(format!("provider {:?} is already registered", id)));
        }
        self.providers.insert(id, provider);
        Ok(())
    }

    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn ExternalLoginProvider>> {
        self.providers.get(provider_id).cloned()
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
