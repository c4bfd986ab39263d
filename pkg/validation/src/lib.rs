mod fields;
mod rules;
mod translate;

use std::fmt;

use schema::{RawAttributes, SessionDocument};
use serde::Serialize;
use serde_json::Value;

pub use fields::{FieldValue, Fields};
pub use rules::{
    ATTRIBUTE_NAME_RULES, ATTRIBUTE_VALUE_RULES, EVENT_FIELDS, FieldRules,
    KNOWN_APPLICATION_IDS, Rule, SESSION_FIELDS, SPAN_FIELDS, is_attribute_name, is_uuid4,
};
pub use translate::Translator;

/// One failed rule, in the shape reported to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    pub key: String,
    #[serde(rename = "type")]
    pub rule: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalid_value: Option<Value>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Request body has validation errors")]
pub struct ValidationErrors(Vec<ValidationError>);

impl ValidationErrors {
    pub fn errors(&self) -> &[ValidationError] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<ValidationError> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Comma separated `key:type` pairs, for log fields.
    pub fn summary(&self) -> String {
        self.0
            .iter()
            .map(|error| format!("{}:{}", error.key, error.rule))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Proof that a value passed validation. Only this crate can construct one.
#[derive(Debug, Clone, PartialEq)]
pub struct Validated<T>(T);

impl<T> Validated<T> {
    pub fn get(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

/// Immutable rule engine, built once and shared across requests.
#[derive(Debug, Clone, Default)]
pub struct Validator {
    translator: Translator,
}

impl Validator {
    pub fn new() -> Self {
        Self {
            translator: Translator::english(),
        }
    }

    /// Runs every rule and collects all failures.
    ///
    /// Errors are ordered: top-level fields in table order, then top-level
    /// attributes by key, then each event and each span in submission order.
    pub fn validate_session(
        &self,
        doc: SessionDocument,
    ) -> Result<Validated<SessionDocument>, ValidationErrors> {
        let mut report = Report::new(&self.translator);

        report.check_fields("", &doc, SESSION_FIELDS);
        report.check_attributes("attributes", doc.attributes.as_ref());

        for (index, event) in doc.events.iter().flatten().enumerate() {
            let prefix = format!("events[{index}]");
            report.check_fields(&prefix, event, EVENT_FIELDS);
            report.check_attributes(&format!("{prefix}.attributes"), event.attributes.as_ref());
        }

        for (index, span) in doc.spans.iter().flatten().enumerate() {
            let prefix = format!("spans[{index}]");
            report.check_fields(&prefix, span, SPAN_FIELDS);
            report.check_attributes(&format!("{prefix}.attributes"), span.attributes.as_ref());
        }

        report.finish(doc)
    }
}

struct Report<'t> {
    translator: &'t Translator,
    errors: Vec<ValidationError>,
}

impl<'t> Report<'t> {
    fn new(translator: &'t Translator) -> Self {
        Self {
            translator,
            errors: Vec::new(),
        }
    }

    fn check_fields<F: Fields>(&mut self, prefix: &str, target: &F, table: &[FieldRules]) {
        for spec in table {
            let key = join_key(prefix, spec.field);
            let value = target.field(spec.field);
            self.run(&key, value, spec.rules, |name| target.field(name));
        }
    }

    fn check_attributes(&mut self, path: &str, attributes: Option<&RawAttributes>) {
        for (name, value) in attributes.into_iter().flatten() {
            let key = format!("{path}[{name}]");
            self.run(&key, FieldValue::Text(name), ATTRIBUTE_NAME_RULES, |_| {
                FieldValue::Absent
            });
            self.run(&key, FieldValue::Json(value), ATTRIBUTE_VALUE_RULES, |_| {
                FieldValue::Absent
            });
        }
    }

    fn run<'a>(
        &mut self,
        key: &str,
        value: FieldValue<'a>,
        rules: &[Rule],
        sibling: impl Fn(&str) -> FieldValue<'a>,
    ) {
        let failed = rules
            .iter()
            .copied()
            .find(|rule| !rule.check(value, rule.param().map(&sibling)));

        if let Some(rule) = failed {
            self.errors.push(ValidationError {
                key: key.to_string(),
                rule: rule.tag(),
                invalid_value: match rule {
                    Rule::Required => None,
                    _ => value.to_json(),
                },
                message: self.translator.translate(rule, key),
            });
        }
    }

    fn finish<T>(self, value: T) -> Result<Validated<T>, ValidationErrors> {
        if self.errors.is_empty() {
            Ok(Validated(value))
        } else {
            Err(ValidationErrors(self.errors))
        }
    }
}

fn join_key(prefix: &str, field: &str) -> String {
    if prefix.is_empty() {
        field.to_string()
    } else {
        format!("{prefix}.{field}")
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}
