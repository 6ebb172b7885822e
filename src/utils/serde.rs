/*!
 * Serde helpers for identifiers arriving from clients.
 *
 * Identifiers may be sent as JSON numbers or as numeric strings (query
 * strings and path segments are always strings). Either way they must be
 * positive integers: zero, negatives, fractions and non-numeric text are
 * rejected, never coerced to a default.
 */

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::{AutoAssignError, Result};

/// Parse a raw identifier token as a positive integer.
pub fn parse_positive_id(field: &str, raw: &str) -> Result<i64> {
    let trimmed = raw.trim();
    let id: i64 = trimmed.parse().map_err(|_| {
        AutoAssignError::validation(format!("{field} must be a positive integer, got '{raw}'"))
    })?;
    if id <= 0 {
        return Err(AutoAssignError::validation(format!(
            "{field} must be a positive integer, got {id}"
        )));
    }
    Ok(id)
}

fn id_from_value(value: &Value) -> std::result::Result<i64, String> {
    match value {
        Value::Number(n) => match n.as_i64() {
            Some(id) if id > 0 => Ok(id),
            _ => Err(format!("identifier must be a positive integer, got {n}")),
        },
        Value::String(s) => parse_positive_id("identifier", s).map_err(|e| e.to_string()),
        other => Err(format!("identifier must be a positive integer, got {other}")),
    }
}

/// Deserialize a required positive identifier from a number or numeric string.
///
/// ```rust
/// use serde::Deserialize;
/// use autoassign_core::utils::serde::deserialize_positive_id;
///
/// #[derive(Deserialize)]
/// struct Path {
///     #[serde(deserialize_with = "deserialize_positive_id")]
///     entry_id: i64,
/// }
/// ```
pub fn deserialize_positive_id<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    let value = Value::deserialize(deserializer)?;
    id_from_value(&value).map_err(D::Error::custom)
}

/// Optional variant of [`deserialize_positive_id`]; `null` and missing map to `None`.
pub fn deserialize_optional_positive_id<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    let value: Option<Value> = Option::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(value) => id_from_value(&value).map(Some).map_err(D::Error::custom),
    }
}
