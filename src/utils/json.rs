//! Lenient deserializers for payloads that arrive either as JSON or as
//! multipart text, where every scalar is a string.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

pub fn optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    classify_string(value.as_ref()).map_err(serde::de::Error::custom)
}

pub fn optional_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    classify_number(value.as_ref()).map_err(serde::de::Error::custom)
}

pub fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    classify_bool(value.as_ref()).map_err(serde::de::Error::custom)
}

/// Nested object that may also arrive JSON-encoded inside a string, as
/// multipart forms send it. Null and blank strings read as the default.
pub fn embedded_object<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let value = match value {
        None | Some(Value::Null) => return Ok(T::default()),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(T::default()),
        Some(Value::String(s)) => serde_json::from_str::<Value>(&s)
            .map_err(|err| serde::de::Error::custom(format!("invalid embedded JSON: {err}")))?,
        Some(other) => other,
    };
    serde_json::from_value(value).map_err(serde::de::Error::custom)
}

pub fn classify_string(optional_value: Option<&Value>) -> Result<Option<String>, String> {
    match optional_value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_owned())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(format!("expected string or null, got {other}")),
    }
}

pub fn classify_number(optional_value: Option<&Value>) -> Result<Option<f64>, String> {
    match optional_value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| format!("number {n} is out of range")),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => {
            let cleaned: String = s
                .trim()
                .chars()
                .filter(|ch| *ch != ',' && *ch != '$')
                .collect();
            cleaned
                .parse::<f64>()
                .map(Some)
                .map_err(|_| format!("expected a number, got \"{s}\""))
        }
        Some(other) => Err(format!("expected number or null, got {other}")),
    }
}

pub fn classify_bool(optional_value: Option<&Value>) -> Result<bool, String> {
    match optional_value {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(Value::Number(n)) => Ok(n.as_i64().map(|v| v != 0).unwrap_or(false)),
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "" | "false" | "0" | "off" | "no" => Ok(false),
            "true" | "1" | "on" | "si" | "sí" | "yes" => Ok(true),
            other => Err(format!("expected a boolean, got \"{other}\"")),
        },
        Some(other) => Err(format!("expected boolean, got {other}")),
    }
}
