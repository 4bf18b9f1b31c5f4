//! Serde helpers for credential fields.

use secrecy::SecretString;
use serde::{Deserialize, Deserializer};

/// Deserializes an optional string into an optional [`SecretString`].
///
/// Empty strings are treated as absent so that `password = ""` in a config
/// file behaves like an omitted key.
pub fn deserialize_optional<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value
        .filter(|s| !s.is_empty())
        .map(SecretString::from))
}

/// Deserializes a required string into a [`SecretString`].
pub fn deserialize<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Ok(SecretString::from(s))
}

/// Returns an empty secret, used as a serde default.
pub fn empty() -> SecretString {
    SecretString::from(String::new())
}
