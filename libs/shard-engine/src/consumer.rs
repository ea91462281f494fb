use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use stream_api::{
    RecordDecoder, RecordPage, RecordSink, ShardCursor, ShardIterator, StreamHandle,
};

use crate::error::EngineError;

/// How a consumer ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardExit {
    /// The shard returned no next cursor. Nothing will ever follow.
    Sealed,
    /// Cancellation was observed before the shard sealed.
    Cancelled,
}

// ═══════════════════════════════════════════════════════════════
//  ShardConsumer
// ═══════════════════════════════════════════════════════════════

/// Owns the iterator lifecycle of one shard:
/// acquire cursor → { fetch → decode/emit → advance } → sealed | cancelled | failed.
///
/// Records are handed to the sink one by one, in the order the shard
/// returned them. A decode or sink failure ends the consumer, nothing is
/// skipped or re-ordered.
pub struct ShardConsumer {
    stream: StreamHandle,
    shard_id: String,
    iterator: Arc<dyn ShardIterator>,
    decoder: Arc<dyn RecordDecoder>,
    sink: Arc<dyn RecordSink>,
    fetch_interval: Duration,
}

impl ShardConsumer {
    pub fn new(
        stream: StreamHandle,
        shard_id: impl Into<String>,
        iterator: Arc<dyn ShardIterator>,
        decoder: Arc<dyn RecordDecoder>,
        sink: Arc<dyn RecordSink>,
        fetch_interval: Duration,
    ) -> Self {
        Self {
            stream,
            shard_id: shard_id.into(),
            iterator,
            decoder,
            sink,
            fetch_interval,
        }
    }

    pub fn shard_id(&self) -> &str {
        &self.shard_id
    }

    /// Get a cursor anchored at the latest position of the shard.
    pub async fn acquire_cursor(&self) -> Result<ShardCursor, EngineError> {
        self.iterator
            .initial_cursor(&self.stream, &self.shard_id)
            .await
            .map_err(|error| EngineError::Cursor { shard: self.shard_id.clone(), error })
    }

    /// Acquire a cursor, then consume the shard until it seals or `token`
    /// is cancelled.
    pub async fn run(&self, token: CancellationToken) -> Result<ShardExit, EngineError> {
        let cursor = tokio::select! {
            biased;
            _ = token.cancelled() => return Ok(ShardExit::Cancelled),
            cursor = self.acquire_cursor() => cursor?,
        };
        self.consume_from(cursor, token).await
    }

    /// Fetch loop starting at `cursor`.
    ///
    /// Cancellation is checked at the top of every iteration and while
    /// waiting out the pacing delay. An in-flight fetch is awaited to
    /// completion.
    pub async fn consume_from(
        &self,
        mut cursor: ShardCursor,
        token: CancellationToken,
    ) -> Result<ShardExit, EngineError> {
        // Each fetch is billed upstream, pace them once the shard is drained.
        let mut delay = Duration::ZERO;

        loop {
            if token.is_cancelled() {
                return Ok(ShardExit::Cancelled);
            }

            if !delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return Ok(ShardExit::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            let page = self
                .iterator
                .fetch_records(&cursor)
                .await
                .map_err(|error| EngineError::Fetch { shard: self.shard_id.clone(), error })?;

            // Keep fetching immediately while records flow, so bursts drain fast.
            delay = if page.records.is_empty() { self.fetch_interval } else { Duration::ZERO };

            let RecordPage { records, next_cursor } = page;
            for raw in records {
                let sequence = raw.sequence.clone();
                let record = self.decoder.decode(&self.shard_id, raw).map_err(|error| EngineError::Decode {
                    shard: self.shard_id.clone(),
                    sequence: sequence.clone(),
                    error,
                })?;

                tracing::debug!(shard = %self.shard_id, sequence = %sequence, event_id = %record.event_id, "processing record");

                self.sink.emit(record).await.map_err(|error| EngineError::Emit {
                    shard: self.shard_id.clone(),
                    sequence,
                    error,
                })?;
            }

            match next_cursor {
                Some(next) => cursor = next,
                None => {
                    tracing::debug!(shard = %self.shard_id, "shard got sealed");
                    return Ok(ShardExit::Sealed);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;

    use stream_api::{RawRecord, Record, StreamError, StreamStatus};

    use super::*;

    /// Hands out scripted pages in order, then empty pages on the same cursor.
    struct ScriptedIterator {
        pages: Mutex<Vec<RecordPage>>,
    }

    impl ShardIterator for ScriptedIterator {
        fn initial_cursor<'a>(
            &'a self,
            _stream: &'a StreamHandle,
            shard_id: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<ShardCursor, StreamError>> + Send + 'a>> {
            Box::pin(async move { Ok(ShardCursor::new(format!("{shard_id}:0"))) })
        }

        fn fetch_records<'a>(
            &'a self,
            cursor: &'a ShardCursor,
        ) -> Pin<Box<dyn Future<Output = Result<RecordPage, StreamError>> + Send + 'a>> {
            Box::pin(async move {
                let mut pages = self.pages.lock().unwrap();
                if pages.is_empty() {
                    // Script exhausted: the shard stays open and idle.
                    return Ok(RecordPage { records: Vec::new(), next_cursor: Some(cursor.clone()) });
                }
                Ok(pages.remove(0))
            })
        }
    }

    struct SequenceDecoder;

    impl RecordDecoder for SequenceDecoder {
        fn decode(&self, shard_id: &str, raw: RawRecord) -> Result<Record, StreamError> {
            if raw.data == b"bad" {
                return Err(StreamError::format_err("bad payload"));
            }
            Ok(Record {
                shard_id: shard_id.to_string(),
                event_id: raw.sequence.clone(),
                sequence: raw.sequence,
                operation: "INSERT".into(),
                subject: None,
                time_ms: None,
                data: serde_json::Value::Null,
            })
        }
    }

    #[derive(Default)]
    struct VecSink {
        seen: Mutex<Vec<String>>,
    }

    impl RecordSink for VecSink {
        fn emit(&self, record: Record) -> Pin<Box<dyn Future<Output = Result<(), StreamError>> + Send + '_>> {
            Box::pin(async move {
                self.seen.lock().unwrap().push(record.sequence);
                Ok(())
            })
        }
    }

    fn page(seqs: &[&str], next: Option<&str>) -> RecordPage {
        RecordPage {
            records: seqs.iter().map(|s| RawRecord::new(*s, s.as_bytes().to_vec())).collect(),
            next_cursor: next.map(ShardCursor::new),
        }
    }

    fn consumer(pages: Vec<RecordPage>, sink: Arc<VecSink>) -> ShardConsumer {
        ShardConsumer::new(
            StreamHandle::new("stream-1", StreamStatus::Enabled),
            "shard-1",
            Arc::new(ScriptedIterator { pages: Mutex::new(pages) }),
            Arc::new(SequenceDecoder),
            sink,
            Duration::from_millis(5),
        )
    }

    #[tokio::test]
    async fn emits_pages_in_order_until_sealed() {
        let sink = Arc::new(VecSink::default());
        let consumer = consumer(
            vec![page(&["A", "B"], Some("c1")), page(&[], Some("c2")), page(&["C"], None)],
            sink.clone(),
        );

        let exit = consumer.run(CancellationToken::new()).await.unwrap();

        assert_eq!(exit, ShardExit::Sealed);
        assert_eq!(*sink.seen.lock().unwrap(), vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn decode_failure_stops_before_later_records() {
        let sink = Arc::new(VecSink::default());
        let mut bad = page(&["A", "B", "C"], Some("c1"));
        bad.records[1].data = b"bad".to_vec();
        let consumer = consumer(vec![bad], sink.clone());

        let err = consumer.run(CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, EngineError::Decode { ref sequence, .. } if sequence == "B"));
        assert_eq!(*sink.seen.lock().unwrap(), vec!["A"]);
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_first_fetch() {
        let sink = Arc::new(VecSink::default());
        let consumer = consumer(vec![page(&["A"], None)], sink.clone());
        let token = CancellationToken::new();
        token.cancel();

        let exit = consumer.consume_from(ShardCursor::new("c0"), token).await.unwrap();

        assert_eq!(exit, ShardExit::Cancelled);
        assert!(sink.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancellation_interrupts_pacing_delay() {
        let sink = Arc::new(VecSink::default());
        let mut consumer = consumer(vec![], sink.clone());
        consumer.fetch_interval = Duration::from_secs(3600);
        let token = CancellationToken::new();

        let run = consumer.run(token.clone());
        let cancel = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        };
        let (exit, ()) = tokio::time::timeout(Duration::from_secs(5), async { tokio::join!(run, cancel) })
            .await
            .expect("consumer did not observe cancellation");

        assert_eq!(exit.unwrap(), ShardExit::Cancelled);
    }
}
