use std::fmt;
use std::sync::Arc;

use ring::rand::SystemRandom;
use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};
use url::Url;
use url::form_urlencoded::Serializer;

use super::config::ProviderConfig;
use super::crypto::{constant_time_eq, pkce_code_challenge, random_token};
use super::error::{AuthError, scrub};
use super::http_client::{HttpMethod, HttpRequest, HttpResponse, OAuthHttpClient};
use super::mapping::{FieldMapper, SubjectIdExtractor, default_field_mapper, default_subject_id};
use super::types::{AuthorizationRequest, CanonicalIdentity, ProfileFields, TokenResult};

/// OAuth2 authorization-code client for a single provider.
///
/// Holds only the immutable provider config, the two mapping hooks and a
/// clonable transport, so one instance can serve concurrent login attempts.
/// The `state` of an attempt is never kept here: the caller threads it from
/// [`build_authorization_request`](Self::build_authorization_request) to
/// [`exchange_code`](Self::exchange_code).
#[derive(Clone)]
pub struct AuthorizationCodeClient<C: OAuthHttpClient> {
    config: Arc<ProviderConfig>,
    http_client: C,
    subject_id: SubjectIdExtractor,
    field_mapper: FieldMapper,
    rng: SystemRandom,
}

impl<C: OAuthHttpClient> fmt::Debug for AuthorizationCodeClient<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationCodeClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<C: OAuthHttpClient> AuthorizationCodeClient<C> {
    /// Creates a client with the default mapping rules (`id` subject, generic field names).
    pub fn new(config: ProviderConfig, http_client: C) -> Self {
        AuthorizationCodeClient {
            config: Arc::new(config),
            http_client,
            subject_id: Arc::new(default_subject_id),
            field_mapper: Arc::new(default_field_mapper),
            rng: SystemRandom::new(),
        }
    }

    /// Replaces the rule that extracts the subject identifier from the profile.
    pub fn with_subject_extractor<F>(mut self, extractor: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> String + Send + Sync + 'static,
    {
        self.subject_id = Arc::new(extractor);
        self
    }

    /// Replaces the rule that fills email, display name and username.
    pub fn with_field_mapper<F>(mut self, mapper: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> ProfileFields + Send + Sync + 'static,
    {
        self.field_mapper = Arc::new(mapper);
        self
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn provider_id(&self) -> &str {
        self.config.provider_id()
    }

    /// Generates a fresh `state` and the authorize URL for one login attempt.
    ///
    /// `requested_scope` overrides the configured scope when given and non-empty.
    /// Performs no I/O.
    pub fn build_authorization_request(&self, requested_scope: Option<&[String]>) -> AuthorizationRequest {
        let state = random_token(&self.rng);
        let scope = match requested_scope {
            Some(scope) if !scope.is_empty() => scope.join(self.config.scope_delimiter()),
            _ => self.config.scope().join(self.config.scope_delimiter()),
        };
        let pkce_verifier = self.config.pkce().then(|| random_token(&self.rng));

        let mut params = vec![
            ("response_type", "code".to_string()),
            ("client_id", self.config.client_id().to_string()),
            ("redirect_uri", self.config.callback_url().to_string()),
            ("scope", scope),
            ("state", state.clone()),
        ];
        if let Some(verifier) = &pkce_verifier {
            params.push(("code_challenge", pkce_code_challenge(verifier)));
            params.push(("code_challenge_method", "S256".to_string()));
        }

        let redirect_url = append_query(self.config.authorize_url(), &params);
        debug!(provider = self.provider_id(), pkce = pkce_verifier.is_some(), "built authorization request");
        AuthorizationRequest { state, redirect_url, pkce_verifier }
    }

    /// Exchanges an authorization code for an access token.
    ///
    /// The state check happens before anything else; on mismatch no request is sent.
    /// Never retried: the code is single-use.
    pub async fn exchange_code(
        &self,
        code: &str,
        expected_state: &str,
        received_state: &str,
    ) -> Result<TokenResult, AuthError> {
        self.exchange_code_with_verifier(code, expected_state, received_state, None).await
    }

    /// [`exchange_code`](Self::exchange_code) for PKCE-enabled providers.
    #[instrument(skip_all, fields(provider = %self.config.provider_id()), level = "debug")]
    pub async fn exchange_code_with_verifier(
        &self,
        code: &str,
        expected_state: &str,
        received_state: &str,
        pkce_verifier: Option<&str>,
    ) -> Result<TokenResult, AuthError> {
        self.verify_state(expected_state, received_state)?;
        self.exchange_verified_code(code, pkce_verifier).await
    }

    /// Compares the callback `state` with the stored one in constant time.
    pub(crate) fn verify_state(&self, expected_state: &str, received_state: &str) -> Result<(), AuthError> {
        if expected_state.is_empty() || !constant_time_eq(&self.rng, expected_state, received_state) {
            warn!(error_kind = "state_mismatch", "callback state does not match the stored state");
            return Err(AuthError::StateMismatch);
        }
        Ok(())
    }

    /// Code exchange for a callback whose state was already checked with [`verify_state`](Self::verify_state).
    pub(crate) async fn exchange_verified_code(
        &self,
        code: &str,
        pkce_verifier: Option<&str>,
    ) -> Result<TokenResult, AuthError> {
        if code.is_empty() {
            return Err(AuthError::InvalidRequest("authorization code is empty".into()));
        }

        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.config.client_id()),
            ("client_secret", self.config.client_secret()),
            ("redirect_uri", self.config.callback_url()),
        ];
        if let Some(verifier) = pkce_verifier {
            form.push(("code_verifier", verifier));
        }

        let response = self.post_form(&form).await?;
        let token = self.parse_token_response(&response, &[code])?;
        debug!(expires_in = ?token.expires_in_seconds, refresh = token.refresh_token.is_some(), "code exchanged");
        Ok(token)
    }

    /// Obtains a new token from a refresh token. Only runs when called explicitly.
    #[instrument(skip_all, fields(provider = %self.config.provider_id()), level = "debug")]
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResult, AuthError> {
        if refresh_token.is_empty() {
            return Err(AuthError::InvalidRequest("refresh token is empty".into()));
        }
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id()),
            ("client_secret", self.config.client_secret()),
        ];
        let response = self.post_form(&form).await?;
        let mut token = self.parse_token_response(&response, &[refresh_token])?;
        // Providers that do not rotate refresh tokens omit them from the response.
        if token.refresh_token.is_none() {
            token.refresh_token = Some(refresh_token.to_string());
        }
        debug!(expires_in = ?token.expires_in_seconds, "token refreshed");
        Ok(token)
    }

    /// Fetches the profile with the bearer token and normalises it.
    #[instrument(skip_all, fields(provider = %self.config.provider_id()), level = "debug")]
    pub async fn fetch_profile(&self, token: &TokenResult) -> Result<CanonicalIdentity, AuthError> {
        let request = HttpRequest {
            method: HttpMethod::GET,
            url: self.config.profile_url().to_string(),
            headers: vec![
                ("Authorization".to_string(), format!("Bearer {}", token.access_token)),
                ("Accept".to_string(), "application/json".to_string()),
            ],
            body: None,
            timeout: Some(self.config.timeout()),
        };
        let response = self.send(request).await?;

        if response.status == 401 || response.status == 403 {
            warn!(status = response.status, error_kind = "token_rejected", "profile endpoint refused token");
            return Err(AuthError::TokenRejected { status: response.status });
        }
        if !response.is_success() {
            return Err(self.rejected(&response, &[token.access_token.as_str()]));
        }

        let secrets = [token.access_token.as_str()];
        let value: Value = serde_json::from_slice(&response.body)
            .map_err(|e| self.malformed(format!("profile body is not JSON: {}", e), &response, &secrets))?;
        let raw_profile = match value {
            Value::Object(map) => map,
            _ => return Err(self.malformed("profile body is not a JSON object".into(), &response, &secrets)),
        };

        let external_id = (self.subject_id)(&raw_profile);
        if external_id.trim().is_empty() {
            warn!(error_kind = "missing_subject_id", "profile has no subject identifier");
            return Err(AuthError::MissingSubjectId);
        }
        let fields = (self.field_mapper)(&raw_profile);
        debug!(external_id = %external_id, "profile fetched");

        Ok(CanonicalIdentity {
            provider_id: self.config.provider_id().to_string(),
            external_id,
            email: fields.email,
            display_name: fields.display_name,
            username: fields.username,
            raw_profile,
        })
    }

    async fn post_form(&self, form: &[(&str, &str)]) -> Result<HttpResponse, AuthError> {
        let body = Serializer::new(String::new()).extend_pairs(form.iter()).finish().into_bytes();
        let request = HttpRequest {
            method: HttpMethod::POST,
            url: self.config.token_url().to_string(),
            headers: vec![
                ("Content-Type".to_string(), "application/x-www-form-urlencoded".to_string()),
                ("Accept".to_string(), "application/json".to_string()),
            ],
            body: Some(body),
            timeout: Some(self.config.timeout()),
        };
        self.send(request).await
    }

    /// Executes one request under the configured timeout. Dropping the future aborts the call.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, AuthError> {
        let method = request.method;
        let url = request.url.clone();
        match tokio::time::timeout(self.config.timeout(), self.http_client.execute(request)).await {
            Ok(Ok(response)) => {
                debug!(%method, %url, status = response.status, "provider responded");
                Ok(response)
            }
            Ok(Err(e)) => {
                let cause = scrub(&e.to_string(), &[self.config.client_secret()]);
                warn!(%method, %url, error_kind = "transport_failure", cause = %cause, "request failed");
                Err(AuthError::TransportFailure(cause))
            }
            Err(_) => {
                warn!(%method, %url, error_kind = "transport_failure", "request timed out");
                Err(AuthError::TransportFailure(format!(
                    "no response within {} ms",
                    self.config.timeout().as_millis()
                )))
            }
        }
    }

    fn scrubbed_body(&self, response: &HttpResponse, extra_secrets: &[&str]) -> String {
        let mut secrets = vec![self.config.client_secret()];
        secrets.extend_from_slice(extra_secrets);
        scrub(&response.body_text(), &secrets)
    }

    fn rejected(&self, response: &HttpResponse, extra_secrets: &[&str]) -> AuthError {
        warn!(status = response.status, error_kind = "provider_rejected", "provider rejected request");
        AuthError::ProviderRejected { status: response.status, body: self.scrubbed_body(response, extra_secrets) }
    }

    fn malformed(&self, reason: String, response: &HttpResponse, extra_secrets: &[&str]) -> AuthError {
        warn!(status = response.status, error_kind = "malformed_response", reason = %reason, "unusable provider response");
        AuthError::MalformedResponse { reason, body: Some(self.scrubbed_body(response, extra_secrets)) }
    }

    fn parse_token_response(&self, response: &HttpResponse, extra_secrets: &[&str]) -> Result<TokenResult, AuthError> {
        if !response.is_success() {
            return Err(self.rejected(response, extra_secrets));
        }
        let v: Value = serde_json::from_slice(&response.body)
            .map_err(|e| self.malformed(format!("token body is not JSON: {}", e), response, extra_secrets))?;
        if !v.is_object() {
            return Err(self.malformed("token body is not a JSON object".into(), response, extra_secrets));
        }

        let access_token = match v.get("access_token").and_then(Value::as_str) {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => {
                return Err(self.malformed("token response has no access_token".into(), response, extra_secrets));
            }
        };
        let token_type = match v.get("token_type").and_then(Value::as_str) {
            None => "Bearer".to_string(),
            Some(t) if t.eq_ignore_ascii_case("bearer") => "Bearer".to_string(),
            Some(t) => {
                let mut secrets: Vec<&str> = extra_secrets.iter().copied().collect();
                secrets.push(access_token.as_str());
                return Err(self.malformed(format!("unsupported token_type {:?}", t), response, &secrets));
            }
        };
        let expires_in_seconds = v.get("expires_in").and_then(|t| match t {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        });
        let refresh_token = v
            .get("refresh_token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        let scope = v.get("scope").and_then(Value::as_str).map(str::to_string);

        Ok(TokenResult { access_token, token_type, expires_in_seconds, refresh_token, scope })
    }
}

/// Appends query parameters to `base`, keeping any query it already has.
///
/// Existing pairs whose key is also in `params` are dropped so that every
/// key in `params` appears exactly once.
fn append_query(base: &str, params: &[(&str, String)]) -> String {
    match Url::parse(base) {
        Ok(mut url) => {
            let kept: Vec<(String, String)> = url
                .query_pairs()
                .filter(|(k, _)| !params.iter().any(|(p, _)| &**k == *p))
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            url.set_query(None);
            url.query_pairs_mut()
                .extend_pairs(kept)
                .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())));
            url.to_string()
        }
        // Config validation guarantees an absolute URL; fall back to plain concatenation.
        Err(_) => {
            let query = Serializer::new(String::new())
                .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())))
                .finish();
            format!("{}?{}", base, query)
        }
    }
}
