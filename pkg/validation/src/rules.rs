use std::sync::LazyLock;

use regex::Regex;
use uuid::{Uuid, Variant};

use crate::fields::FieldValue;

/// Client applications allowed to submit sessions.
pub const KNOWN_APPLICATION_IDS: &[&str] = &["batect", "test-app", "smoke-test-app"];

// Prerelease and build metadata are only accepted after a full MAJOR.MINOR.PATCH.
static VERSION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[0-9]+(?:\.[0-9]+(?:\.[0-9]+(?:-[0-9A-Za-z-]+(?:\.[0-9A-Za-z-]+)*)?(?:\+[0-9A-Za-z-]+(?:\.[0-9A-Za-z-]+)*)?)?)?$",
    )
    .expect("version pattern is a valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    Required,
    Uuid4,
    /// Timestamp must not be earlier than the named sibling field.
    GteField(&'static str),
    ApplicationId,
    Version,
    AttributeName,
    AttributeValue,
}

impl Rule {
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::Uuid4 => "uuid4",
            Self::GteField(_) => "gtefield",
            Self::ApplicationId => "applicationId",
            Self::Version => "version",
            Self::AttributeName => "attributeName",
            Self::AttributeValue => "attributeValue",
        }
    }

    pub const fn param(self) -> Option<&'static str> {
        match self {
            Self::GteField(field) => Some(field),
            _ => None,
        }
    }

    /// `sibling` is the value of the field named by [`Rule::param`], if any.
    pub fn check(self, value: FieldValue<'_>, sibling: Option<FieldValue<'_>>) -> bool {
        match self {
            Self::Required => !value.is_zero(),
            Self::Uuid4 => matches!(value, FieldValue::Text(text) if is_uuid4(text)),
            Self::GteField(_) => match (value, sibling) {
                (FieldValue::Time(end), Some(FieldValue::Time(start))) => end >= start,
                _ => true,
            },
            Self::ApplicationId => {
                matches!(value, FieldValue::Text(text) if KNOWN_APPLICATION_IDS.contains(&text))
            }
            Self::Version => {
                matches!(value, FieldValue::Text(text) if VERSION_PATTERN.is_match(text))
            }
            Self::AttributeName => {
                matches!(value, FieldValue::Text(text) if is_attribute_name(text))
            }
            Self::AttributeValue => match value {
                FieldValue::Json(json) => is_scalar(json),
                FieldValue::Absent | FieldValue::Text(_) => true,
                FieldValue::Time(_) => false,
            },
        }
    }
}

/// Lowercase hyphenated form only. The ID is used verbatim as the storage
/// key, so `A` and `a` would otherwise name the same session twice.
pub fn is_uuid4(text: &str) -> bool {
    // 36 characters is the hyphenated form; braced, URN and simple forms differ in length.
    text.len() == 36
        && !text.bytes().any(|byte| byte.is_ascii_uppercase())
        && Uuid::try_parse(text)
            .is_ok_and(|id| id.get_version_num() == 4 && id.get_variant() == Variant::RFC4122)
}

pub fn is_attribute_name(text: &str) -> bool {
    let mut chars = text.chars();
    chars.next().is_some_and(|first| first.is_ascii_alphabetic())
        && chars.all(|ch| ch.is_ascii_alphanumeric())
}

fn is_scalar(value: &serde_json::Value) -> bool {
    use serde_json::Value;

    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => true,
        Value::Array(_) | Value::Object(_) => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRules {
    /// Wire name of the field.
    pub field: &'static str,
    /// Evaluated in order; the first failure is the only one reported.
    pub rules: &'static [Rule],
}

pub const SESSION_FIELDS: &[FieldRules] = &[
    FieldRules {
        field: "sessionId",
        rules: &[Rule::Required, Rule::Uuid4],
    },
    FieldRules {
        field: "userId",
        rules: &[Rule::Required, Rule::Uuid4],
    },
    FieldRules {
        field: "sessionStartTime",
        rules: &[Rule::Required],
    },
    FieldRules {
        field: "sessionEndTime",
        rules: &[Rule::Required, Rule::GteField("sessionStartTime")],
    },
    FieldRules {
        field: "applicationId",
        rules: &[Rule::Required, Rule::ApplicationId],
    },
    FieldRules {
        field: "applicationVersion",
        rules: &[Rule::Required, Rule::Version],
    },
];

pub const EVENT_FIELDS: &[FieldRules] = &[
    FieldRules {
        field: "type",
        rules: &[Rule::Required],
    },
    FieldRules {
        field: "time",
        rules: &[Rule::Required],
    },
];

pub const SPAN_FIELDS: &[FieldRules] = &[
    FieldRules {
        field: "type",
        rules: &[Rule::Required],
    },
    FieldRules {
        field: "startTime",
        rules: &[Rule::Required],
    },
    FieldRules {
        field: "endTime",
        rules: &[Rule::Required, Rule::GteField("startTime")],
    },
];

pub const ATTRIBUTE_NAME_RULES: &[Rule] = &[Rule::Required, Rule::AttributeName];
pub const ATTRIBUTE_VALUE_RULES: &[Rule] = &[Rule::AttributeValue];
