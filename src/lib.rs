//! OAuth2 authorization-code client.
//!
//! The crate drives the three HTTP legs of the grant (authorize redirect,
//! code exchange, profile fetch) against one provider per client, and ships
//! a preset for the 42 intranet API in [`social::fortytwo`].

pub mod oauth_core;
pub mod social;

pub use oauth_core::callback::parse_callback;
pub use oauth_core::config::{ProviderConfig, ProviderConfigBuilder};
pub use oauth_core::error::{AuthError, AuthErrorKind};
pub use oauth_core::http_client::{HttpMethod, HttpRequest, HttpResponse, InMemoryHttpClient, OAuthHttpClient};
#[cfg(feature = "reqwest")]
pub use oauth_core::http_client::ReqwestHttpClient;
pub use oauth_core::login_flow::LoginFlow;
pub use oauth_core::mapping::{FieldMapper, SubjectIdExtractor};
pub use oauth_core::oauth_client::AuthorizationCodeClient;
pub use oauth_core::state_store::{InMemoryStateStore, PendingLogin, StateStore};
pub use oauth_core::types::{AuthorizationRequest, CallbackParams, CanonicalIdentity, LoginStage, ProfileFields, TokenResult};
pub use social::provider::{ExternalLoginProvider, ProviderRegistry};
