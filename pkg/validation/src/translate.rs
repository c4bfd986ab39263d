use std::collections::HashMap;

use crate::rules::Rule;

// `{0}` is the field key, `{1}` the rule parameter.
const ENGLISH: &[(&str, &str)] = &[
    ("required", "{0} is a required field"),
    ("uuid4", "{0} must be a valid version 4 UUID"),
    ("gtefield", "{0} must be greater than or equal to {1}"),
    ("applicationId", "{0} must be a valid application ID"),
    ("version", "{0} must be a valid version"),
    ("attributeName", "{0} must have a valid attribute name"),
    (
        "attributeValue",
        "{0} must be a string, integer, boolean or null value",
    ),
];

/// Renders human-readable messages for failed rules.
#[derive(Debug, Clone)]
pub struct Translator {
    templates: HashMap<&'static str, &'static str>,
}

impl Translator {
    pub fn english() -> Self {
        Self {
            templates: ENGLISH.iter().copied().collect(),
        }
    }

    pub fn translate(&self, rule: Rule, key: &str) -> String {
        match self.templates.get(rule.tag()) {
            Some(template) => render(template, key, rule.param().unwrap_or_default()),
            None => format!("{key} failed on the '{}' rule", rule.tag()),
        }
    }
}

// Single pass: placeholders inside the substituted key are left alone.
fn render(template: &str, key: &str, param: &str) -> String {
    let mut out = String::with_capacity(template.len() + key.len() + param.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        if let Some(after) = tail.strip_prefix("{0}") {
            out.push_str(key);
            rest = after;
        } else if let Some(after) = tail.strip_prefix("{1}") {
            out.push_str(param);
            rest = after;
        } else {
            out.push('{');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    out
}

impl Default for Translator {
    fn default() -> Self {
        Self::english()
    }
}
