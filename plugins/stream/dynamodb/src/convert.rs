//! SDK stream records to DynamoDB Streams JSON.
//!
//! The produced document has the same shape as the records returned by
//! the `GetRecords` wire API: `eventID`, `eventName`, `dynamodb.Keys`,
//! `dynamodb.NewImage`, ... with attribute values in DynamoDB JSON.

use std::collections::HashMap;

use aws_sdk_dynamodbstreams::types::{AttributeValue, Record, StreamRecord};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Map, Value, json};

pub fn record_to_json(record: &Record) -> Value {
    let mut doc = Map::new();

    insert_str(&mut doc, "eventID", record.event_id());
    insert_str(&mut doc, "eventName", record.event_name().map(|op| op.as_str()));
    insert_str(&mut doc, "eventVersion", record.event_version());
    insert_str(&mut doc, "eventSource", record.event_source());
    insert_str(&mut doc, "awsRegion", record.aws_region());

    if let Some(stream_record) = record.dynamodb() {
        doc.insert("dynamodb".into(), stream_record_to_json(stream_record));
    }

    if let Some(identity) = record.user_identity() {
        let mut user = Map::new();
        insert_str(&mut user, "type", identity.r#type());
        insert_str(&mut user, "principalId", identity.principal_id());
        doc.insert("userIdentity".into(), Value::Object(user));
    }

    Value::Object(doc)
}

fn stream_record_to_json(record: &StreamRecord) -> Value {
    let mut doc = Map::new();

    if let Some(created) = record.approximate_creation_date_time() {
        doc.insert("ApproximateCreationDateTime".into(), json!(created.as_secs_f64()));
    }
    if let Some(keys) = record.keys() {
        doc.insert("Keys".into(), attribute_map_to_json(keys));
    }
    if let Some(image) = record.new_image() {
        doc.insert("NewImage".into(), attribute_map_to_json(image));
    }
    if let Some(image) = record.old_image() {
        doc.insert("OldImage".into(), attribute_map_to_json(image));
    }
    insert_str(&mut doc, "SequenceNumber", record.sequence_number());
    if let Some(size) = record.size_bytes() {
        doc.insert("SizeBytes".into(), json!(size));
    }
    insert_str(&mut doc, "StreamViewType", record.stream_view_type().map(|v| v.as_str()));

    Value::Object(doc)
}

pub fn attribute_map_to_json(map: &HashMap<String, AttributeValue>) -> Value {
    Value::Object(
        map.iter()
            .map(|(name, value)| (name.clone(), attribute_to_json(value)))
            .collect(),
    )
}

/// One attribute value in DynamoDB JSON, e.g. `{"N": "42"}`. Binary
/// values are base64 encoded.
pub fn attribute_to_json(value: &AttributeValue) -> Value {
    match value {
        AttributeValue::S(s) => json!({ "S": s }),
        AttributeValue::N(n) => json!({ "N": n }),
        AttributeValue::B(b) => json!({ "B": STANDARD.encode(b.as_ref()) }),
        AttributeValue::Ss(items) => json!({ "SS": items }),
        AttributeValue::Ns(items) => json!({ "NS": items }),
        AttributeValue::Bs(items) => {
            let encoded: Vec<String> = items.iter().map(|b| STANDARD.encode(b.as_ref())).collect();
            json!({ "BS": encoded })
        }
        AttributeValue::M(map) => json!({ "M": attribute_map_to_json(map) }),
        AttributeValue::L(items) => {
            let list: Vec<Value> = items.iter().map(attribute_to_json).collect();
            json!({ "L": list })
        }
        AttributeValue::Null(is_null) => json!({ "NULL": is_null }),
        AttributeValue::Bool(b) => json!({ "BOOL": b }),
        // Variants added by newer service models.
        _ => Value::Null,
    }
}

fn insert_str(doc: &mut Map<String, Value>, key: &str, value: Option<&str>) {
    if let Some(value) = value {
        doc.insert(key.to_string(), Value::String(value.to_string()));
    }
}
