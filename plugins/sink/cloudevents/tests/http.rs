use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use serde_json::{Value, json};

use sink_cloudevents::{EventEncoder, HttpSink};
use stream_api::{Record, RecordSink};

#[derive(Clone, Default)]
struct Received {
    events: Arc<Mutex<Vec<(String, Value)>>>,
}

async fn accept(State(received): State<Received>, headers: HeaderMap, body: String) -> StatusCode {
    let content_type = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let event: Value = serde_json::from_str(&body).unwrap();
    received.events.lock().unwrap().push((content_type, event));
    StatusCode::ACCEPTED
}

async fn reject() -> StatusCode {
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
    format!("http://{addr}/")
}

fn record(id: &str) -> Record {
    Record {
        shard_id: "s1".into(),
        sequence: id.into(),
        event_id: id.into(),
        operation: "REMOVE".into(),
        subject: Some("pk".into()),
        time_ms: Some(0),
        data: json!({ "eventID": id }),
    }
}

#[tokio::test]
async fn posts_structured_cloudevents() {
    let received = Received::default();
    let url = serve(Router::new().route("/", post(accept)).with_state(received.clone())).await;
    let sink = HttpSink::new(url, EventEncoder::dynamodb("arn:aws:dynamodb:us-fake-0:1:table/T"));

    sink.emit(record("e1")).await.unwrap();
    sink.emit(record("e2")).await.unwrap();

    let events = received.events.lock().unwrap().clone();
    assert_eq!(events.len(), 2);
    let (content_type, event) = &events[0];
    assert_eq!(content_type, "application/cloudevents+json");
    assert_eq!(event["id"], "e1");
    assert_eq!(event["type"], "com.amazon.dynamodb.stream_record");
    assert_eq!(event["source"], "arn:aws:dynamodb:us-fake-0:1:table/T");
    assert_eq!(event["subject"], "pk");
    assert_eq!(event["time"], "1970-01-01T00:00:00.000Z");
    assert_eq!(event["dynamodboperation"], "REMOVE");
    assert_eq!(event["data"], json!({ "eventID": "e1" }));
    assert_eq!(events[1].1["id"], "e2");
}

#[tokio::test]
async fn non_success_status_is_an_error() {
    let url = serve(Router::new().route("/", post(reject))).await;
    let sink = HttpSink::new(url, EventEncoder::dynamodb("table"));

    let err = sink.emit(record("e1")).await.unwrap_err();

    assert_eq!(err.kind(), stream_api::ErrorKind::Io);
    assert!(err.message().contains("500"), "{err}");
}

#[tokio::test]
async fn unreachable_sink_is_an_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let sink = HttpSink::new(format!("http://{addr}/"), EventEncoder::dynamodb("table"));

    assert!(sink.emit(record("e1")).await.is_err());
}
