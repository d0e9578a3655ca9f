// Field values are parsed once into these types at the remote boundary. The
// API is loose about scalar types (ids and agent ids show up as strings or
// numbers, optional fields as null), so every scalar is read leniently.
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::Result;

/// One conversation as returned by `GET /chats/<id>`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Record {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    /// Chat start, seconds since the UNIX epoch.
    #[serde(default, deserialize_with = "lenient_i64")]
    pub started_timestamp: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub events: Vec<Event>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub visitor: Visitor,
    #[serde(default, deserialize_with = "null_as_default")]
    pub prechat_survey: Vec<SurveyEntry>,
}

impl Record {
    /// Parse and validate a raw record body.
    pub fn parse(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// A single message or system event inside a chat, in source order.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Event {
    #[serde(default, deserialize_with = "lenient_string")]
    pub date: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub author_name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub agent_id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub text: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Visitor {
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub email: Option<String>,
}

/// One question/answer pair from the pre-chat survey.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SurveyEntry {
    #[serde(default, deserialize_with = "lenient_string")]
    pub key: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub value: String,
}

fn value_to_string(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    }
}

fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(value_to_string(Value::deserialize(deserializer)?))
}

fn lenient_opt_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        other => Ok(Some(value_to_string(other))),
    }
}

fn lenient_i64<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    })
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
