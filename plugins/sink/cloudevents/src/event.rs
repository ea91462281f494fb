use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use stream_api::Record;

pub const SPEC_VERSION: &str = "1.0";
pub const DYNAMODB_STREAM_RECORD: &str = "com.amazon.dynamodb.stream_record";

/// A CloudEvent in structured JSON mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudEvent {
    pub specversion: String,
    pub id: String,
    pub source: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    pub datacontenttype: String,
    /// Extension attribute carrying the record's operation.
    pub dynamodboperation: String,
    pub data: Value,
}

/// Fixed attributes stamped on every event.
#[derive(Debug, Clone)]
pub struct EventEncoder {
    source: String,
    event_type: String,
}

impl EventEncoder {
    pub fn new(source: impl Into<String>, event_type: impl Into<String>) -> Self {
        Self { source: source.into(), event_type: event_type.into() }
    }

    /// Events of type `com.amazon.dynamodb.stream_record` sourced from `table_arn`.
    pub fn dynamodb(table_arn: impl Into<String>) -> Self {
        Self::new(table_arn, DYNAMODB_STREAM_RECORD)
    }

    pub fn encode(&self, record: Record) -> CloudEvent {
        CloudEvent {
            specversion: SPEC_VERSION.to_string(),
            id: record.event_id,
            source: self.source.clone(),
            event_type: self.event_type.clone(),
            subject: record.subject,
            time: record.time_ms.and_then(format_time),
            datacontenttype: "application/json".to_string(),
            dynamodboperation: record.operation,
            data: record.data,
        }
    }
}

fn format_time(ms: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp_millis(ms).map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn record() -> Record {
        Record {
            shard_id: "shardId-1".into(),
            sequence: "100".into(),
            event_id: "evt-1".into(),
            operation: "INSERT".into(),
            subject: Some("pk,sk".into()),
            time_ms: Some(1_700_000_000_500),
            data: json!({ "eventID": "evt-1" }),
        }
    }

    #[test]
    fn encodes_record_attributes() {
        let encoder = EventEncoder::dynamodb("arn:aws:dynamodb:us-fake-0:123456789012:table/MyTable");

        let event = encoder.encode(record());

        assert_eq!(event.id, "evt-1");
        assert_eq!(event.source, "arn:aws:dynamodb:us-fake-0:123456789012:table/MyTable");
        assert_eq!(event.event_type, "com.amazon.dynamodb.stream_record");
        assert_eq!(event.subject.as_deref(), Some("pk,sk"));
        assert_eq!(event.time.as_deref(), Some("2023-11-14T22:13:20.500Z"));
        assert_eq!(event.dynamodboperation, "INSERT");
    }

    #[test]
    fn structured_json_layout() {
        let mut record = record();
        record.subject = None;
        record.time_ms = None;

        let doc = serde_json::to_value(EventEncoder::new("src", "t").encode(record)).unwrap();

        assert_eq!(
            doc,
            json!({
                "specversion": "1.0",
                "id": "evt-1",
                "source": "src",
                "type": "t",
                "datacontenttype": "application/json",
                "dynamodboperation": "INSERT",
                "data": { "eventID": "evt-1" }
            })
        );
    }
}
