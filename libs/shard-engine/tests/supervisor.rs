use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use shard_engine::{EngineConfig, EngineError, Supervisor, StreamSource};
use stream_api::{Readiness, ShardDescriptor};
use stream_memory::{CollectingSink, JsonDecoder, MemoryStream, json_record};

const TABLE: &str = "arn:aws:dynamodb:us-fake-0:123456789012:table/MyTable";

fn supervisor(stream: &Arc<MemoryStream>, sink: &Arc<CollectingSink>, readiness: &Readiness) -> Supervisor {
    let source = StreamSource::new(
        TABLE,
        stream.clone(),
        stream.clone(),
        Arc::new(JsonDecoder),
        sink.clone(),
    );
    let config = EngineConfig::new(Duration::from_millis(20), Duration::from_millis(10));
    Supervisor::new(source, config, readiness.clone())
}

async fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn missing_stream_fails_startup() {
    let stream = Arc::new(MemoryStream::new("stream-1"));
    let sink = Arc::new(CollectingSink::new());
    let readiness = Readiness::new();
    stream.fail_resolve(true);

    let err = supervisor(&stream, &sink, &readiness)
        .run(CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::StreamCheck { .. }));
    assert!(err.is_fatal());
    assert!(!readiness.is_ready());
    assert_eq!(stream.list_calls(), 0);
}

#[tokio::test]
async fn invalid_config_fails_startup() {
    let stream = Arc::new(MemoryStream::new("stream-1"));
    let sink = Arc::new(CollectingSink::new());
    let source = StreamSource::new(TABLE, stream.clone(), stream.clone(), Arc::new(JsonDecoder), sink);
    let config = EngineConfig::new(Duration::ZERO, Duration::ZERO);

    let err = Supervisor::new(source, config, Readiness::new())
        .run(CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Config(_)));
    assert_eq!(stream.resolve_calls(), 0);
}

#[tokio::test]
async fn consumes_shards_until_cancelled() {
    let stream = Arc::new(MemoryStream::new("stream-1"));
    let sink = Arc::new(CollectingSink::new());
    let readiness = Readiness::new();
    stream.add_shard(ShardDescriptor::new("s1"));
    stream.add_shard(ShardDescriptor::new("s2"));
    stream.push_page("s1", vec![json_record("1", "INSERT", "id"), json_record("2", "MODIFY", "id")]);
    stream.push_page("s2", vec![json_record("3", "INSERT", "id")]);

    let supervisor = supervisor(&stream, &sink, &readiness);
    let registry = supervisor.registry();
    let token = CancellationToken::new();
    let run = tokio::spawn(supervisor.run(token.clone()));

    assert!(sink.wait_for(3, Duration::from_secs(5)).await);
    assert!(readiness.is_ready());
    assert_eq!(sink.sequences("s1"), vec!["1", "2"]);
    assert_eq!(registry.snapshot(), vec!["s1", "s2"]);

    token.cancel();
    let result = tokio::time::timeout(Duration::from_secs(5), run).await.unwrap().unwrap();

    assert!(result.is_ok());
    assert!(registry.is_empty());
}

#[tokio::test]
async fn shards_appearing_later_are_picked_up() {
    let stream = Arc::new(MemoryStream::new("stream-1"));
    let sink = Arc::new(CollectingSink::new());
    let readiness = Readiness::new();

    let supervisor = supervisor(&stream, &sink, &readiness);
    let registry = supervisor.registry();
    let token = CancellationToken::new();
    let run = tokio::spawn(supervisor.run(token.clone()));

    wait_until("first poll", || stream.list_calls() > 0).await;
    stream.add_shard(ShardDescriptor::new("late"));
    stream.push_page("late", vec![json_record("L", "INSERT", "id")]);

    assert!(sink.wait_for(1, Duration::from_secs(5)).await);
    assert!(registry.contains("late"));

    token.cancel();
    tokio::time::timeout(Duration::from_secs(5), run).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn shutdown_waits_for_in_flight_fetches() {
    let stream = Arc::new(MemoryStream::new("stream-1"));
    let sink = Arc::new(CollectingSink::new());
    let readiness = Readiness::new();
    for id in ["s1", "s2"] {
        stream.add_shard(ShardDescriptor::new(id));
        stream.push_page(id, vec![json_record(&format!("{id}-first"), "INSERT", "id")]);
        stream.push_page(id, vec![json_record(&format!("{id}-second"), "INSERT", "id")]);
    }
    stream.set_fetch_delay(Duration::from_millis(200));

    let supervisor = supervisor(&stream, &sink, &readiness);
    let registry = supervisor.registry();
    let token = CancellationToken::new();
    let run = tokio::spawn(supervisor.run(token.clone()));

    wait_until("two fetches in flight", || stream.in_flight() == 2).await;
    token.cancel();
    let result = tokio::time::timeout(Duration::from_secs(5), run).await.unwrap().unwrap();

    assert!(result.is_ok());
    // Both fetches ran to completion before `run` returned.
    assert_eq!(stream.in_flight(), 0);
    assert!(registry.is_empty());
    // The loop-top check stopped both consumers before a second fetch.
    for id in ["s1", "s2"] {
        assert_eq!(stream.fetch_calls(id), 1);
        assert!(!sink.sequences(id).contains(&format!("{id}-second")));
    }
}

#[tokio::test]
async fn losing_the_stream_at_runtime_stops_everything() {
    let stream = Arc::new(MemoryStream::new("stream-1"));
    let sink = Arc::new(CollectingSink::new());
    let readiness = Readiness::new();
    stream.add_shard(ShardDescriptor::new("s1"));

    let supervisor = supervisor(&stream, &sink, &readiness);
    let registry = supervisor.registry();
    let run = tokio::spawn(supervisor.run(CancellationToken::new()));

    wait_until("s1 consumer", || registry.contains("s1")).await;
    stream.fail_resolve(true);

    let err = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .unwrap()
        .unwrap()
        .unwrap_err();

    assert!(matches!(err, EngineError::StreamResolve { .. }));
    assert!(registry.is_empty());
}
