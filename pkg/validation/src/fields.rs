use chrono::{DateTime, SecondsFormat, Utc};
use schema::{EventDocument, SessionDocument, SpanDocument};
use serde_json::Value;

// Seconds from the Unix epoch to 0001-01-01T00:00:00Z, the zero timestamp
// clients emit when a time was never set.
const ZERO_TIME_SECONDS: i64 = -62_135_596_800;

/// Borrowed view of a single field, independent of its Rust type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    Absent,
    Text(&'a str),
    Time(&'a DateTime<Utc>),
    Json(&'a Value),
}

impl<'a> FieldValue<'a> {
    pub fn is_zero(self) -> bool {
        match self {
            Self::Absent => true,
            Self::Text(text) => text.is_empty(),
            Self::Time(time) => {
                time.timestamp() == ZERO_TIME_SECONDS && time.timestamp_subsec_nanos() == 0
            }
            Self::Json(value) => value.is_null(),
        }
    }

    /// JSON rendering used for `invalidValue` in error reports.
    pub fn to_json(self) -> Option<Value> {
        match self {
            Self::Absent => None,
            Self::Text(text) => Some(Value::String(text.to_string())),
            Self::Time(time) => Some(Value::String(
                time.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            )),
            Self::Json(value) => Some(value.clone()),
        }
    }
}

fn text(value: &Option<String>) -> FieldValue<'_> {
    value.as_deref().map_or(FieldValue::Absent, FieldValue::Text)
}

fn time(value: &Option<DateTime<Utc>>) -> FieldValue<'_> {
    value.as_ref().map_or(FieldValue::Absent, FieldValue::Time)
}

/// Lookup of fields by their wire name, so rule tables can stay declarative.
pub trait Fields {
    fn field(&self, name: &str) -> FieldValue<'_>;
}

impl Fields for SessionDocument {
    fn field(&self, name: &str) -> FieldValue<'_> {
        match name {
            "sessionId" => text(&self.session_id),
            "userId" => text(&self.user_id),
            "sessionStartTime" => time(&self.session_start_time),
            "sessionEndTime" => time(&self.session_end_time),
            "applicationId" => text(&self.application_id),
            "applicationVersion" => text(&self.application_version),
            _ => FieldValue::Absent,
        }
    }
}

impl Fields for EventDocument {
    fn field(&self, name: &str) -> FieldValue<'_> {
        match name {
            "type" => text(&self.event_type),
            "time" => time(&self.time),
            _ => FieldValue::Absent,
        }
    }
}

impl Fields for SpanDocument {
    fn field(&self, name: &str) -> FieldValue<'_> {
        match name {
            "type" => text(&self.span_type),
            "startTime" => time(&self.start_time),
            "endTime" => time(&self.end_time),
            _ => FieldValue::Absent,
        }
    }
}
