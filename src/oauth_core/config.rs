//! Provider configuration.
//!
//! A [`ProviderConfig`] is validated once when built and is immutable
//! afterwards. It can be assembled in code through [`ProviderConfigBuilder`],
//! deserialized with serde (validation runs on deserialization too), or read
//! from environment variables with [`ProviderConfigBuilder::apply_env`].

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize, Serializer};
use url::{Host, Url};

use super::error::AuthError;

/// Per-call HTTP timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Scope requested when none is configured.
pub const DEFAULT_SCOPE: &str = "public";

/// Immutable description of one OAuth2 provider and this application's registration with it.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "ProviderConfigBuilder")]
pub struct ProviderConfig {
    provider_id: String,
    authorize_url: String,
    token_url: String,
    profile_url: String,
    client_id: String,
    #[serde(skip_serializing)]
    client_secret: String,
    scope: Vec<String>,
    scope_delimiter: String,
    callback_url: String,
    #[serde(rename = "timeout_ms", serialize_with = "serialize_millis")]
    timeout: Duration,
    pkce: bool,
    allow_insecure_loopback: bool,
}

impl ProviderConfig {
    /// Starts a builder for the provider identified by `provider_id`.
    pub fn builder(provider_id: impl Into<String>) -> ProviderConfigBuilder {
        ProviderConfigBuilder {
            provider_id: Some(provider_id.into()),
            ..ProviderConfigBuilder::default()
        }
    }

    /// Builds a config entirely from `{PREFIX}_*` environment variables.
    pub fn from_env(provider_id: impl Into<String>, prefix: &str) -> Result<Self, AuthError> {
        Self::builder(provider_id).apply_env(prefix)?.build()
    }

    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    pub fn authorize_url(&self) -> &str {
        &self.authorize_url
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    pub fn profile_url(&self) -> &str {
        &self.profile_url
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Only read when building token request bodies.
    pub(crate) fn client_secret(&self) -> &str {
        &self.client_secret
    }

    pub fn scope(&self) -> &[String] {
        &self.scope
    }

    pub fn scope_delimiter(&self) -> &str {
        &self.scope_delimiter
    }

    /// Redirect URI exactly as registered with the provider.
    pub fn callback_url(&self) -> &str {
        &self.callback_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn pkce(&self) -> bool {
        self.pkce
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("provider_id", &self.provider_id)
            .field("authorize_url", &self.authorize_url)
            .field("token_url", &self.token_url)
            .field("profile_url", &self.profile_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[redacted]")
            .field("scope", &self.scope)
            .field("callback_url", &self.callback_url)
            .field("timeout", &self.timeout)
            .field("pkce", &self.pkce)
            .finish()
    }
}

fn serialize_millis<S: Serializer>(timeout: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    let millis = u64::try_from(timeout.as_millis()).map_err(serde::ser::Error::custom)?;
    serializer.serialize_u64(millis)
}

/// Mutable staging area for a [`ProviderConfig`].
///
/// Also the serde representation of a config: every field is optional here
/// and [`ProviderConfigBuilder::build`] decides what is mandatory.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProviderConfigBuilder {
    provider_id: Option<String>,
    authorize_url: Option<String>,
    token_url: Option<String>,
    profile_url: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    scope: Option<Vec<String>>,
    scope_delimiter: Option<String>,
    callback_url: Option<String>,
    timeout_ms: Option<u64>,
    pkce: Option<bool>,
    allow_insecure_loopback: Option<bool>,
}

impl ProviderConfigBuilder {
    pub fn authorize_url(mut self, url: impl Into<String>) -> Self {
        self.authorize_url = Some(url.into());
        self
    }

    pub fn token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = Some(url.into());
        self
    }

    pub fn profile_url(mut self, url: impl Into<String>) -> Self {
        self.profile_url = Some(url.into());
        self
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn client_secret(mut self, client_secret: impl Into<String>) -> Self {
        self.client_secret = Some(client_secret.into());
        self
    }

    pub fn scope<I, S>(mut self, scope: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scope = Some(scope.into_iter().map(Into::into).collect());
        self
    }

    /// Separator used when joining scopes into the `scope` query parameter.
    pub fn scope_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.scope_delimiter = Some(delimiter.into());
        self
    }

    pub fn callback_url(mut self, url: impl Into<String>) -> Self {
        self.callback_url = Some(url.into());
        self
    }

    /// Per-call timeout. Durations beyond `u64::MAX` milliseconds saturate.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn pkce(mut self, enabled: bool) -> Self {
        self.pkce = Some(enabled);
        self
    }

    /// Accept `http://` URLs pointing at loopback hosts. Meant for local test servers.
    pub fn allow_insecure_loopback(mut self, allow: bool) -> Self {
        self.allow_insecure_loopback = Some(allow);
        self
    }

    /// Overrides fields from `{PREFIX}_*` process environment variables.
    pub fn apply_env(self, prefix: &str) -> Result<Self, AuthError> {
        self.apply_env_with(prefix, |key| std::env::var(key).ok())
    }

    /// Same as [`apply_env`](Self::apply_env) with an explicit variable lookup.
    ///
    /// Recognised suffixes: `CLIENT_ID`, `CLIENT_SECRET`, `CALLBACK_URL`,
    /// `AUTHORIZE_URL`, `TOKEN_URL`, `PROFILE_URL`, `SCOPE` (comma or space
    /// separated), `TIMEOUT_SECS`, `PKCE`.
    pub fn apply_env_with<F>(mut self, prefix: &str, lookup: F) -> Result<Self, AuthError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| lookup(&format!("{}_{}", prefix, suffix)).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("CLIENT_ID") {
            self.client_id = Some(v);
        }
        if let Some(v) = var("CLIENT_SECRET") {
            self.client_secret = Some(v);
        }
        if let Some(v) = var("CALLBACK_URL") {
            self.callback_url = Some(v);
        }
        if let Some(v) = var("AUTHORIZE_URL") {
            self.authorize_url = Some(v);
        }
        if let Some(v) = var("TOKEN_URL") {
            self.token_url = Some(v);
        }
        if let Some(v) = var("PROFILE_URL") {
            self.profile_url = Some(v);
        }
        if let Some(v) = var("SCOPE") {
            let scope = v
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            self.scope = Some(scope);
        }
        if let Some(v) = var("TIMEOUT_SECS") {
            let millis = v
                .trim()
                .parse::<u64>()
                .ok()
                .and_then(|secs| secs.checked_mul(1000))
                .ok_or_else(|| {
                    AuthError::InvalidConfig(format!("{}_TIMEOUT_SECS is not a usable number of seconds", prefix))
                })?;
            self.timeout_ms = Some(millis);
        }
        if let Some(v) = var("PKCE") {
            let enabled = match v.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => return Err(AuthError::InvalidConfig(format!("{}_PKCE is not a boolean", prefix))),
            };
            self.pkce = Some(enabled);
        }
        Ok(self)
    }

    /// Validates the collected fields and freezes them into a [`ProviderConfig`].
    pub fn build(self) -> Result<ProviderConfig, AuthError> {
        let allow_insecure_loopback = self.allow_insecure_loopback.unwrap_or(false);

        let provider_id = required("provider_id", self.provider_id)?;
        let client_id = required("client_id", self.client_id)?;
        let client_secret = required("client_secret", self.client_secret)?;
        let authorize_url = required("authorize_url", self.authorize_url)?;
        let token_url = required("token_url", self.token_url)?;
        let profile_url = required("profile_url", self.profile_url)?;
        let callback_url = required("callback_url", self.callback_url)?;
        for (field, value) in [
            ("authorize_url", &authorize_url),
            ("token_url", &token_url),
            ("profile_url", &profile_url),
            ("callback_url", &callback_url),
        ] {
            validate_url(field, value, allow_insecure_loopback)?;
        }

        let scope = self.scope.unwrap_or_else(|| vec![DEFAULT_SCOPE.to_string()]);
        if scope.is_empty() || scope.iter().any(|s| s.trim().is_empty()) {
            return Err(AuthError::InvalidConfig("scope entries must be non-empty".into()));
        }

        let timeout = self.timeout_ms.map(Duration::from_millis).unwrap_or(DEFAULT_TIMEOUT);
        if timeout.is_zero() {
            return Err(AuthError::InvalidConfig("timeout must be greater than zero".into()));
        }

        Ok(ProviderConfig {
            provider_id,
            authorize_url,
            token_url,
            profile_url,
            client_id,
            client_secret,
            scope,
            scope_delimiter: self.scope_delimiter.unwrap_or_else(|| " ".to_string()),
            callback_url,
            timeout,
            pkce: self.pkce.unwrap_or(false),
            allow_insecure_loopback,
        })
    }
}

impl TryFrom<ProviderConfigBuilder> for ProviderConfig {
    type Error = AuthError;

    fn try_from(builder: ProviderConfigBuilder) -> Result<Self, Self::Error> {
        builder.build()
    }
}

fn required(field: &str, value: Option<String>) -> Result<String, AuthError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(AuthError::InvalidConfig(format!("{} is required", field))),
    }
}

fn validate_url(field: &str, value: &str, allow_insecure_loopback: bool) -> Result<(), AuthError> {
    let url = Url::parse(value)
        .map_err(|e| AuthError::InvalidConfig(format!("{} is not an absolute URL: {}", field, e)))?;
    match url.scheme() {
        "https" => Ok(()),
        "http" if allow_insecure_loopback && is_loopback(&url) => Ok(()),
        scheme => Err(AuthError::InvalidConfig(format!(
            "{} must use https, got {}",
            field, scheme
        ))),
    }
}

fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => ip.is_loopback(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base() -> ProviderConfigBuilder {
        ProviderConfig::builder("42")
            .authorize_url("https://auth.local/oauth/authorize")
            .token_url("https://auth.local/oauth/token")
            .profile_url("https://auth.local/v2/me")
            .client_id("cid")
            .client_secret("csecret")
            .callback_url("https://app.local/accounts/42/login/callback/")
    }

    #[test]
    fn defaults_apply() {
        let config = base().build().unwrap();
        assert_eq!(config.scope(), &["public".to_string()]);
        assert_eq!(config.scope_delimiter(), " ");
        assert_eq!(config.timeout(), DEFAULT_TIMEOUT);
        assert!(!config.pkce());
    }

    #[test]
    fn rejects_plain_http() {
        let err = base().token_url("http://auth.local/oauth/token").build().unwrap_err();
        assert!(matches!(err, AuthError::InvalidConfig(ref m) if m.contains("token_url")));
    }

    #[test]
    fn rejects_relative_url() {
        let err = base().profile_url("/v2/me").build().unwrap_err();
        assert!(matches!(err, AuthError::InvalidConfig(_)));
    }

    #[test]
    fn loopback_http_needs_opt_in() {
        let local = base().token_url("http://127.0.0.1:8080/token");
        assert!(local.clone().build().is_err());
        assert!(local.allow_insecure_loopback(true).build().is_ok());
        let remote = base().token_url("http://example.com/token").allow_insecure_loopback(true);
        assert!(remote.build().is_err());
    }

    #[test]
    fn missing_secret_is_rejected() {
        let err = ProviderConfig::builder("42")
            .authorize_url("https://a.local/authorize")
            .token_url("https://a.local/token")
            .profile_url("https://a.local/me")
            .client_id("cid")
            .callback_url("https://app.local/cb")
            .build()
            .unwrap_err();
        assert_eq!(err, AuthError::InvalidConfig("client_secret is required".into()));
    }

    #[test]
    fn secret_never_leaves_via_debug_or_serde() {
        let config = base().build().unwrap();
        assert!(!format!("{:?}", config).contains("csecret"));
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("csecret"));
        assert!(json.contains("\"timeout_ms\":10000"));
    }

    #[test]
    fn deserialization_validates() {
        let json = r#"{
            "provider_id": "42",
            "authorize_url": "https://auth.local/authorize",
            "token_url": "https://auth.local/token",
            "profile_url": "https://auth.local/me",
            "client_id": "cid",
            "client_secret": "csecret",
            "callback_url": "https://app.local/cb",
            "timeout_ms": 2500
        }"#;
        let config: ProviderConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.timeout(), Duration::from_millis(2500));
        assert_eq!(config.client_secret(), "csecret");

        let insecure = json.replace("https://auth.local/token", "http://auth.local/token");
        assert!(serde_json::from_str::<ProviderConfig>(&insecure).is_err());
    }

    #[test]
    fn env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("APP_CLIENT_ID", "env-id"),
            ("APP_CLIENT_SECRET", "env-secret"),
            ("APP_SCOPE", "public, projects"),
            ("APP_TIMEOUT_SECS", "3"),
            ("APP_PKCE", "yes"),
        ]);
        let config = base()
            .apply_env_with("APP", |k| vars.get(k).map(|v| v.to_string()))
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(config.client_id(), "env-id");
        assert_eq!(config.scope(), &["public".to_string(), "projects".to_string()]);
        assert_eq!(config.timeout(), Duration::from_secs(3));
        assert!(config.pkce());
    }

    #[test]
    fn env_rejects_garbage_timeout() {
        let err = base()
            .apply_env_with("APP", |k| (k == "APP_TIMEOUT_SECS").then(|| "soon".to_string()))
            .err()
            .unwrap();
        assert!(matches!(err, AuthError::InvalidConfig(_)));
    }

    #[test]
    fn env_rejects_overflowing_timeout() {
        let err = base()
            .apply_env_with("APP", |k| (k == "APP_TIMEOUT_SECS").then(|| u64::MAX.to_string()))
            .err()
            .unwrap();
        assert!(matches!(err, AuthError::InvalidConfig(ref m) if m.contains("APP_TIMEOUT_SECS")));
    }

    #[test]
    fn huge_timeout_saturates_and_serializes() {
        let config = base().timeout(Duration::MAX).build().unwrap();
        assert_eq!(config.timeout(), Duration::from_millis(u64::MAX));
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains(&format!("\"timeout_ms\":{}", u64::MAX)));
    }
}
