//! Parse S3 event notifications out of queue message bodies.
//!
//! Bodies arrive either as a raw S3 event (`{"Records": [...]}`) or wrapped
//! in an SNS envelope whose `Message` field holds the S3 event as a string.

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use ticksink_core::SourceObject;

use crate::consumer::QueueMessage;
use crate::error::QueueError;

#[derive(Debug, Deserialize)]
struct S3Event {
    #[serde(rename = "Records", default)]
    records: Vec<S3EventRecord>,
}

#[derive(Debug, Deserialize)]
struct S3EventRecord {
    #[serde(rename = "eventName", default)]
    event_name: Option<String>,
    s3: S3Entity,
}

#[derive(Debug, Deserialize)]
struct S3Entity {
    bucket: S3Bucket,
    object: S3Object,
}

#[derive(Debug, Deserialize)]
struct S3Bucket {
    name: String,
}

#[derive(Debug, Deserialize)]
struct S3Object {
    key: String,
}

/// Decode an object key as S3 writes it into notifications:
/// spaces as `+`, everything else percent-encoded.
pub fn decode_key(raw: &str) -> Result<String, QueueError> {
    let plus_decoded = raw.replace('+', " ");
    urlencoding::decode(&plus_decoded)
        .map(|key| key.into_owned())
        .map_err(|e| QueueError::Parse(format!("invalid object key encoding '{raw}': {e}")))
}

/// Extract the created objects named by one notification body.
///
/// S3 test events and non-creation records yield nothing. Bodies that are not
/// JSON, or JSON of no recognised shape, are parse errors.
pub fn parse_notifications(body: &str) -> Result<Vec<SourceObject>, QueueError> {
    let json: Value = serde_json::from_str(body)
        .map_err(|e| QueueError::Parse(format!("invalid JSON notification: {e}")))?;
    notifications_from_value(json)
}

fn notifications_from_value(json: Value) -> Result<Vec<SourceObject>, QueueError> {
    let Some(obj) = json.as_object() else {
        return Err(QueueError::Parse("notification body is not a JSON object".into()));
    };

    if let Some(message) = obj.get("Message").and_then(Value::as_str) {
        debug!("Unwrapping SNS envelope");
        return parse_notifications(message);
    }

    if obj.get("Event").and_then(Value::as_str) == Some("s3:TestEvent") {
        debug!("Ignoring s3:TestEvent");
        return Ok(Vec::new());
    }

    if obj.contains_key("Records") {
        let event: S3Event = serde_json::from_value(json)
            .map_err(|e| QueueError::Parse(format!("malformed S3 event: {e}")))?;
        return event
            .records
            .into_iter()
            .filter(|r| is_object_created(r.event_name.as_deref()))
            .map(|r| {
                decode_key(&r.s3.object.key).map(|key| SourceObject::new(r.s3.bucket.name, key))
            })
            .collect();
    }

    Err(QueueError::Parse(
        "notification has neither Records nor an SNS Message".into(),
    ))
}

fn is_object_created(event_name: Option<&str>) -> bool {
    event_name.map_or(true, |name| name.starts_with("ObjectCreated"))
}

/// Parse a batch of messages, separating successes from failures.
///
/// Returns `(parsed, errors)` where each parsed entry pairs the message with
/// the objects it names. Good messages are never blocked by bad ones.
pub fn parse_batch(
    messages: &[QueueMessage],
) -> (Vec<(&QueueMessage, Vec<SourceObject>)>, Vec<(&QueueMessage, QueueError)>) {
    let mut parsed = Vec::with_capacity(messages.len());
    let mut errors = Vec::new();

    for msg in messages {
        match parse_notifications(&msg.body) {
            Ok(objects) => parsed.push((msg, objects)),
            Err(e) => {
                warn!(message_id = %msg.id, error = %e, "Failed to parse notification");
                errors.push((msg, e));
            }
        }
    }

    (parsed, errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn s3_event(bucket: &str, key: &str, event_name: &str) -> String {
        json!({
            "Records": [{
                "eventVersion": "2.1",
                "eventSource": "aws:s3",
                "eventName": event_name,
                "s3": {
                    "bucket": {"name": bucket, "arn": format!("arn:aws:s3:::{bucket}")},
                    "object": {"key": key, "size": 1024}
                }
            }]
        })
        .to_string()
    }

    fn make_msg(id: &str, body: &str) -> QueueMessage {
        QueueMessage {
            id: id.to_string(),
            body: body.to_string(),
            receipt_handle: "handle-test".to_string(),
            timestamp: Utc::now(),
            attempt_count: 1,
        }
    }

    #[test]
    fn parses_direct_s3_event() {
        let body = s3_event("incoming", "magnificent7-2024.json.gz", "ObjectCreated:Put");
        let objects = parse_notifications(&body).unwrap();
        assert_eq!(objects, vec![SourceObject::new("incoming", "magnificent7-2024.json.gz")]);
    }

    #[test]
    fn decodes_plus_and_percent_in_keys() {
        assert_eq!(decode_key("my+file%3A1.json.gz").unwrap(), "my file:1.json.gz");
        assert_eq!(
            decode_key("fundamentals-2025-06-17T21_36_09.840Z.json.gz").unwrap(),
            "fundamentals-2025-06-17T21_36_09.840Z.json.gz"
        );
    }

    #[test]
    fn unwraps_sns_envelope() {
        let inner = s3_event("incoming", "fundamentals-x.json.gz", "ObjectCreated:CompleteMultipartUpload");
        let body = json!({"Type": "Notification", "Message": inner}).to_string();
        let objects = parse_notifications(&body).unwrap();
        assert_eq!(objects[0].key, "fundamentals-x.json.gz");
    }

    #[test]
    fn skips_test_events_and_removals() {
        let test_event = json!({"Service": "Amazon S3", "Event": "s3:TestEvent", "Bucket": "incoming"});
        assert!(parse_notifications(&test_event.to_string()).unwrap().is_empty());

        let removal = s3_event("incoming", "magnificent7-1.json.gz", "ObjectRemoved:Delete");
        assert!(parse_notifications(&removal).unwrap().is_empty());
    }

    #[test]
    fn rejects_unrecognised_bodies() {
        assert!(matches!(parse_notifications("not json"), Err(QueueError::Parse(_))));
        assert!(matches!(parse_notifications("[1,2]"), Err(QueueError::Parse(_))));
        assert!(matches!(parse_notifications(r#"{"foo": 1}"#), Err(QueueError::Parse(_))));
    }

    #[test]
    fn parse_batch_partial_success() {
        let good = s3_event("incoming", "magnificent7-a.json.gz", "ObjectCreated:Put");
        let messages = vec![
            make_msg("good-1", &good),
            make_msg("bad-1", "not json"),
            make_msg("good-2", &good),
        ];

        let (parsed, errors) = parse_batch(&messages);

        assert_eq!(parsed.len(), 2);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0.id, "bad-1");
        assert_eq!(parsed[1].0.id, "good-2");
    }
}
