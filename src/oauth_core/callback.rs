//! Parsing of the provider's redirect back to the callback URL.

use tracing::warn;

use super::error::AuthError;
use super::types::CallbackParams;

/// Parses the callback query string (`code=…&state=…`, or `error=…` on denial).
///
/// Accepts the raw query with or without a leading `?`. An `error` parameter
/// wins over everything else and becomes [`AuthError::UserDenied`].
pub fn parse_callback(query: &str) -> Result<CallbackParams, AuthError> {
    let query = query.strip_prefix('?').unwrap_or(query);
    let mut code = None;
    let mut state = None;
    let mut error = None;
    let mut description = None;

    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        // First occurrence wins; repeated parameters are ignored.
        let slot = match key.as_ref() {
            "code" => &mut code,
            "state" => &mut state,
            "error" => &mut error,
            "error_description" => &mut description,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(value.into_owned());
        }
    }

    if let Some(error) = error {
        warn!(error_kind = "user_denied", provider_error = %error, "provider reported an authorization error");
        return Err(AuthError::UserDenied { error, description });
    }

    let code = code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AuthError::InvalidRequest("callback is missing the code parameter".into()))?;
    let state = state
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AuthError::InvalidRequest("callback is missing the state parameter".into()))?;
    Ok(CallbackParams { code, state })
}
