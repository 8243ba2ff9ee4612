//! Provider-independent pieces of the authorization-code grant.

pub mod callback;
pub mod config;
pub mod crypto;
pub mod error;
pub mod http_client;
pub mod login_flow;
pub mod mapping;
pub mod oauth_client;
pub mod state_store;
pub mod types;
