//! Rules turning a provider's raw profile into identity fields.
//!
//! Both hooks are plain functions supplied at construction time. They must be
//! pure: the client may call them from any thread.

use std::sync::Arc;

use serde_json::{Map, Value};

use super::types::ProfileFields;

/// Extracts the subject identifier. An empty string means "not found".
pub type SubjectIdExtractor = Arc<dyn Fn(&Map<String, Value>) -> String + Send + Sync>;

/// Extracts the optional profile fields.
pub type FieldMapper = Arc<dyn Fn(&Map<String, Value>) -> ProfileFields + Send + Sync>;

/// Reads the `id` field, coercing numbers to their decimal form.
pub fn default_subject_id(profile: &Map<String, Value>) -> String {
    profile.get("id").map(coerce_id).unwrap_or_default()
}

/// `email`, `name` then `display_name` for the display name, `username` then `login` for the username.
pub fn default_field_mapper(profile: &Map<String, Value>) -> ProfileFields {
    ProfileFields {
        email: string_field(profile, "email"),
        display_name: string_field(profile, "name").or_else(|| string_field(profile, "display_name")),
        username: string_field(profile, "username").or_else(|| string_field(profile, "login")),
    }
}

/// Converts a JSON id value to a string; anything but a string or number yields `""`.
pub fn coerce_id(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

/// Returns a trimmed, non-empty string field.
pub fn string_field(profile: &Map<String, Value>, key: &str) -> Option<String> {
    profile
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
