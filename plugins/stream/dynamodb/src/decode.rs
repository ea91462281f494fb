use serde_json::Value;

use stream_api::{RawRecord, Record, RecordDecoder, StreamError};

/// Decodes DynamoDB Streams JSON documents as produced by the stream
/// client.
///
/// The subject is the comma-joined, sorted list of key attribute names.
/// The full document is kept as the record's data.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamRecordDecoder;

impl RecordDecoder for StreamRecordDecoder {
    fn decode(&self, shard_id: &str, raw: RawRecord) -> Result<Record, StreamError> {
        let data: Value = serde_json::from_slice(&raw.data)?;
        if !data.is_object() {
            return Err(StreamError::format_err("stream record is not a JSON object"));
        }

        let event_id = data
            .get("eventID")
            .and_then(Value::as_str)
            .ok_or_else(|| StreamError::format_err("stream record has no eventID"))?
            .to_string();

        let operation = data
            .get("eventName")
            .and_then(Value::as_str)
            .unwrap_or("UNKNOWN")
            .to_string();

        let stream_record = data.get("dynamodb");

        let subject = stream_record
            .and_then(|r| r.get("Keys"))
            .and_then(Value::as_object)
            .filter(|keys| !keys.is_empty())
            .map(|keys| {
                let mut names: Vec<&str> = keys.keys().map(String::as_str).collect();
                names.sort_unstable();
                names.join(",")
            });

        let time_ms = stream_record
            .and_then(|r| r.get("ApproximateCreationDateTime"))
            .and_then(Value::as_f64)
            .map(|secs| (secs * 1000.0).round() as i64);

        Ok(Record {
            shard_id: shard_id.to_string(),
            sequence: raw.sequence,
            event_id,
            operation,
            subject,
            time_ms,
            data,
        })
    }
}
