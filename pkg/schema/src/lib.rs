use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as _};
use serde_json::{Number, Value};

// ---------------------------------------------------------------------------
// Wire documents
//
// Exactly what a client may send. Every field is optional at this level so
// that missing values surface as `required` validation errors rather than
// decode errors. Unknown fields are rejected at every nesting level.
// ---------------------------------------------------------------------------

pub type RawAttributes = BTreeMap<String, Value>;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SessionDocument {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub session_start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub session_end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub application_id: Option<String>,
    #[serde(default)]
    pub application_version: Option<String>,
    #[serde(default)]
    pub attributes: Option<RawAttributes>,
    #[serde(default, deserialize_with = "null_elements_as_default")]
    pub events: Option<Vec<EventDocument>>,
    #[serde(default, deserialize_with = "null_elements_as_default")]
    pub spans: Option<Vec<SpanDocument>>,
}

/// A `null` list element decodes to an empty document, so its missing fields
/// are reported by validation rather than failing the whole decode.
fn null_elements_as_default<'de, D, T>(deserializer: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    let items = Option::<Vec<Option<T>>>::deserialize(deserializer)?;
    Ok(items.map(|items| items.into_iter().map(Option::unwrap_or_default).collect()))
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EventDocument {
    #[serde(default, rename = "type")]
    pub event_type: Option<String>,
    #[serde(default)]
    pub time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attributes: Option<RawAttributes>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SpanDocument {
    #[serde(default, rename = "type")]
    pub span_type: Option<String>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attributes: Option<RawAttributes>,
}

// ---------------------------------------------------------------------------
// Stored records
// ---------------------------------------------------------------------------

pub type Attributes = BTreeMap<String, AttributeValue>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,
    pub user_id: String,
    pub session_start_time: DateTime<Utc>,
    pub session_end_time: DateTime<Utc>,
    /// Always stamped by the server, never taken from the client.
    pub ingestion_time: DateTime<Utc>,
    pub application_id: String,
    pub application_version: String,
    pub attributes: Attributes,
    pub events: Vec<Event>,
    pub spans: Vec<Span>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: String,
    pub time: DateTime<Utc>,
    pub attributes: Attributes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Span {
    #[serde(rename = "type")]
    pub span_type: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub attributes: Attributes,
}

// ---------------------------------------------------------------------------
// Attribute values
// ---------------------------------------------------------------------------

/// Scalar attribute value. Numbers keep the exact text the client sent, so
/// `123` stays an integer and `1.3` stays a float when re-serialized.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
}

impl TryFrom<Value> for AttributeValue {
    type Error = Value;

    /// Arrays and objects are handed back unchanged as the error.
    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Null => Ok(Self::Null),
            Value::Bool(flag) => Ok(Self::Bool(flag)),
            Value::Number(number) => Ok(Self::Number(number)),
            Value::String(text) => Ok(Self::String(text)),
            compound @ (Value::Array(_) | Value::Object(_)) => Err(compound),
        }
    }
}

impl From<AttributeValue> for Value {
    fn from(value: AttributeValue) -> Self {
        match value {
            AttributeValue::Null => Value::Null,
            AttributeValue::Bool(flag) => Value::Bool(flag),
            AttributeValue::Number(number) => Value::Number(number),
            AttributeValue::String(text) => Value::String(text),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Number(Number::from(value))
    }
}

impl Serialize for AttributeValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(flag) => serializer.serialize_bool(*flag),
            Self::Number(number) => number.serialize(serializer),
            Self::String(text) => serializer.serialize_str(text),
        }
    }
}

// Goes through `Value` rather than `#[serde(untagged)]`: untagged enums buffer
// their input and lose the original number text.
impl<'de> Deserialize<'de> for AttributeValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::try_from(value).map_err(|compound| {
            D::Error::custom(format!(
                "attribute values must be scalar, found {}",
                if compound.is_array() { "array" } else { "object" }
            ))
        })
    }
}
