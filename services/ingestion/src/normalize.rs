use chrono::{DateTime, Utc};
use schema::{
    AttributeValue, Attributes, Event, EventDocument, RawAttributes, Session, SessionDocument,
    Span, SpanDocument,
};
use validation::Validated;

/// Produces the stored form of a validated upload.
///
/// Missing collections become empty ones and `ingestion_time` is always the
/// value passed in. Cannot fail.
pub fn normalize_session(doc: Validated<SessionDocument>, ingestion_time: DateTime<Utc>) -> Session {
    let doc = doc.into_inner();

    Session {
        session_id: doc.session_id.unwrap_or_default(),
        user_id: doc.user_id.unwrap_or_default(),
        session_start_time: doc.session_start_time.unwrap_or_default(),
        session_end_time: doc.session_end_time.unwrap_or_default(),
        ingestion_time,
        application_id: doc.application_id.unwrap_or_default(),
        application_version: doc.application_version.unwrap_or_default(),
        attributes: attributes(doc.attributes),
        events: doc.events.unwrap_or_default().into_iter().map(event).collect(),
        spans: doc.spans.unwrap_or_default().into_iter().map(span).collect(),
    }
}

fn event(doc: EventDocument) -> Event {
    Event {
        event_type: doc.event_type.unwrap_or_default(),
        time: doc.time.unwrap_or_default(),
        attributes: attributes(doc.attributes),
    }
}

fn span(doc: SpanDocument) -> Span {
    Span {
        span_type: doc.span_type.unwrap_or_default(),
        start_time: doc.start_time.unwrap_or_default(),
        end_time: doc.end_time.unwrap_or_default(),
        attributes: attributes(doc.attributes),
    }
}

fn attributes(raw: Option<RawAttributes>) -> Attributes {
    raw.unwrap_or_default()
        .into_iter()
        // compound values never get past validation
        .filter_map(|(name, value)| AttributeValue::try_from(value).ok().map(|value| (name, value)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use validation::Validator;

    fn validated(json: &str) -> Validated<SessionDocument> {
        Validator::new()
            .validate_session(serde_json::from_str(json).unwrap())
            .unwrap()
    }

    const MINIMAL: &str = r#"{
        "sessionId": "11112222-3333-4444-a555-666677778888",
        "userId": "99990000-3333-4444-a555-666677778888",
        "sessionStartTime": "2019-01-02T03:04:05.678Z",
        "sessionEndTime": "2019-01-02T09:04:05.678Z",
        "applicationId": "test-app",
        "applicationVersion": "1.0.0"
    }"#;

    #[test]
    fn missing_collections_become_empty() {
        let now = "2020-05-24T10:12:14.000123Z".parse().unwrap();
        let session = normalize_session(validated(MINIMAL), now);

        assert_eq!(session.ingestion_time, now);
        assert!(session.attributes.is_empty());
        assert!(session.events.is_empty());
        assert!(session.spans.is_empty());
        assert_eq!(session.application_version, "1.0.0");
    }

    #[test]
    fn nested_attributes_default_independently() {
        let json = MINIMAL.replace(
            r#""applicationVersion": "1.0.0""#,
            r#""applicationVersion": "1.0.0",
               "attributes": {"os": "Mac", "cpus": 8, "ratio": 1.3, "ci": false, "extra": null},
               "events": [{"type": "a", "time": "2019-01-02T03:04:06Z"}],
               "spans": [{"type": "b", "startTime": "2019-01-02T03:04:06Z", "endTime": "2019-01-02T03:04:07Z",
                          "attributes": {"step": "compile"}}]"#,
        );
        let session = normalize_session(validated(&json), Utc::now());

        assert_eq!(session.attributes.len(), 5);
        assert_eq!(session.attributes["os"], AttributeValue::from("Mac"));
        assert_eq!(session.attributes["extra"], AttributeValue::Null);
        assert!(session.events[0].attributes.is_empty());
        assert_eq!(session.spans[0].attributes["step"], AttributeValue::from("compile"));

        let stored = serde_json::to_value(&session).unwrap();
        assert_eq!(stored["attributes"]["cpus"].to_string(), "8");
        assert_eq!(stored["attributes"]["ratio"].to_string(), "1.3");
        assert_eq!(stored["events"][0]["attributes"], serde_json::json!({}));
    }
}
