//! Preset for the 42 intranet API (`api.intra.42.fr`).
//!
//! ```no_run
//! # async fn run() -> Result<(), oauth42::AuthError> {
//! use oauth42::social::fortytwo;
//! use oauth42::ReqwestHttpClient;
//!
//! let http = ReqwestHttpClient::new().map_err(|e| oauth42::AuthError::InvalidConfig(e.to_string()))?;
//! let config = fortytwo::from_env()?;
//! let client = fortytwo::client(config, http);
//! let request = client.build_authorization_request(None);
//! println!("redirect to {}", request.redirect_url);
//! # Ok(())
//! # }
//! ```

use serde_json::{Map, Value};

use crate::oauth_core::config::{ProviderConfig, ProviderConfigBuilder};
use crate::oauth_core::error::AuthError;
use crate::oauth_core::http_client::OAuthHttpClient;
use crate::oauth_core::mapping::{default_subject_id, string_field};
use crate::oauth_core::oauth_client::AuthorizationCodeClient;
use crate::oauth_core::types::ProfileFields;

pub const PROVIDER_ID: &str = "42";
pub const AUTHORIZE_URL: &str = "https://api.intra.42.fr/oauth/authorize";
pub const TOKEN_URL: &str = "https://api.intra.42.fr/oauth/token";
pub const PROFILE_URL: &str = "https://api.intra.42.fr/v2/me";
pub const DEFAULT_SCOPE: &str = "public";
/// Prefix of the environment variables read by [`from_env`].
pub const ENV_PREFIX: &str = "FORTYTWO";

/// Builder with the 42 endpoints and scope filled in.
pub fn config_builder(
    client_id: impl Into<String>,
    client_secret: impl Into<String>,
    callback_url: impl Into<String>,
) -> ProviderConfigBuilder {
    preset()
        .client_id(client_id)
        .client_secret(client_secret)
        .callback_url(callback_url)
}

/// 42 config whose credentials come from `FORTYTWO_*` environment variables.
pub fn from_env() -> Result<ProviderConfig, AuthError> {
    preset().apply_env(ENV_PREFIX)?.build()
}

/// Client with the 42 field mapping installed.
pub fn client<C: OAuthHttpClient>(config: ProviderConfig, http_client: C) -> AuthorizationCodeClient<C> {
    AuthorizationCodeClient::new(config, http_client)
        .with_subject_extractor(default_subject_id)
        .with_field_mapper(field_mapper)
}

/// Maps a `/v2/me` document.
///
/// The display name prefers `usual_full_name`, then `displayname`, then the
/// first and last names joined.
pub fn field_mapper(profile: &Map<String, Value>) -> ProfileFields {
    let display_name = string_field(profile, "usual_full_name")
        .or_else(|| string_field(profile, "displayname"))
        .or_else(|| {
            let parts: Vec<String> = ["first_name", "last_name"]
                .iter()
                .filter_map(|k| string_field(profile, k))
                .collect();
            (!parts.is_empty()).then(|| parts.join(" "))
        });
    ProfileFields {
        email: string_field(profile, "email"),
        display_name,
        username: string_field(profile, "login"),
    }
}

fn preset() -> ProviderConfigBuilder {
    ProviderConfig::builder(PROVIDER_ID)
        .authorize_url(AUTHORIZE_URL)
        .token_url(TOKEN_URL)
        .profile_url(PROFILE_URL)
        .scope([DEFAULT_SCOPE])
}
