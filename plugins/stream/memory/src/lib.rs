//! In-memory stream collaborators. Shards, pages and failures are
//! scripted up front, which makes consumer behaviour deterministic.

use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use stream_api::{
    RawRecord, Record, RecordDecoder, RecordPage, RecordSink, ShardCursor,
    ShardDescriptor, ShardIterator, ShardListPage, StreamDirectory, StreamError,
    StreamHandle, StreamStatus,
};

// ═══════════════════════════════════════════════════════════════
//  MemoryStream
// ═══════════════════════════════════════════════════════════════

#[derive(Default)]
struct ShardQueue {
    pages: VecDeque<Vec<RawRecord>>,
    sealed: bool,
}

struct State {
    stream: StreamHandle,
    shards: Vec<ShardDescriptor>,
    queues: HashMap<String, ShardQueue>,
    /// Shards per `list_shards` page, 0 = everything on one page.
    page_size: usize,
    fail_resolve: bool,
    fail_list: bool,
    /// Remaining `initial_cursor` failures per shard.
    cursor_failures: HashMap<String, usize>,
    fetch_failures: HashSet<String>,
    fetch_delay: Duration,

    resolve_calls: usize,
    list_calls: usize,
    cursor_requests: HashMap<String, usize>,
    fetch_calls: HashMap<String, usize>,
    in_flight: usize,
}

/// Scriptable `StreamDirectory` + `ShardIterator`.
///
/// Fetching from a shard pops its next queued page. Once the queue is
/// empty a sealed shard returns no next cursor; an open shard keeps
/// returning empty pages.
pub struct MemoryStream {
    state: Mutex<State>,
}

impl MemoryStream {
    pub fn new(stream_id: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(State {
                stream: StreamHandle::new(stream_id, StreamStatus::Enabled),
                shards: Vec::new(),
                queues: HashMap::new(),
                page_size: 0,
                fail_resolve: false,
                fail_list: false,
                cursor_failures: HashMap::new(),
                fetch_failures: HashSet::new(),
                fetch_delay: Duration::ZERO,
                resolve_calls: 0,
                list_calls: 0,
                cursor_requests: HashMap::new(),
                fetch_calls: HashMap::new(),
                in_flight: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_shard(&self, shard: ShardDescriptor) {
        let mut state = self.lock();
        state.queues.entry(shard.shard_id.clone()).or_default();
        state.shards.push(shard);
    }

    /// Queue one page of records on `shard_id`.
    pub fn push_page(&self, shard_id: &str, records: Vec<RawRecord>) {
        self.lock().queues.entry(shard_id.to_string()).or_default().pages.push_back(records);
    }

    /// No next cursor once the already queued pages are consumed.
    pub fn seal(&self, shard_id: &str) {
        self.lock().queues.entry(shard_id.to_string()).or_default().sealed = true;
    }

    pub fn set_status(&self, status: StreamStatus) {
        self.lock().stream.status = status;
    }

    /// Replace the active stream. Shards of the old stream are no longer
    /// listed but stay readable through the cursors already handed out.
    pub fn rotate(&self, stream_id: impl Into<String>) {
        let mut state = self.lock();
        state.stream = StreamHandle::new(stream_id, StreamStatus::Enabled);
        state.shards.clear();
    }

    /// Stop listing `shard_id`, as the upstream does once a shard is trimmed.
    pub fn trim_shard(&self, shard_id: &str) {
        self.lock().shards.retain(|s| s.shard_id != shard_id);
    }

    pub fn set_page_size(&self, page_size: usize) {
        self.lock().page_size = page_size;
    }

    pub fn fail_resolve(&self, fail: bool) {
        self.lock().fail_resolve = fail;
    }

    pub fn fail_list(&self, fail: bool) {
        self.lock().fail_list = fail;
    }

    /// Fail the next `times` cursor requests for `shard_id`.
    pub fn fail_cursor(&self, shard_id: &str, times: usize) {
        self.lock().cursor_failures.insert(shard_id.to_string(), times);
    }

    pub fn fail_fetch(&self, shard_id: &str) {
        self.lock().fetch_failures.insert(shard_id.to_string());
    }

    /// Every fetch waits this long before answering.
    pub fn set_fetch_delay(&self, delay: Duration) {
        self.lock().fetch_delay = delay;
    }

    pub fn resolve_calls(&self) -> usize {
        self.lock().resolve_calls
    }

    pub fn list_calls(&self) -> usize {
        self.lock().list_calls
    }

    pub fn cursor_requests(&self, shard_id: &str) -> usize {
        self.lock().cursor_requests.get(shard_id).copied().unwrap_or(0)
    }

    pub fn fetch_calls(&self, shard_id: &str) -> usize {
        self.lock().fetch_calls.get(shard_id).copied().unwrap_or(0)
    }

    /// Fetches currently waiting out their delay.
    pub fn in_flight(&self) -> usize {
        self.lock().in_flight
    }

    fn cursor_for(stream_id: &str, shard_id: &str) -> ShardCursor {
        ShardCursor::new(format!("{stream_id}|{shard_id}"))
    }

    fn finish_fetch(&self, cursor: &ShardCursor, shard_id: &str) -> Result<RecordPage, StreamError> {
        let mut state = self.lock();
        state.in_flight -= 1;

        if state.fetch_failures.contains(shard_id) {
            return Err(StreamError::io(format!("GetRecords throttled on {shard_id}")));
        }
        let queue = state
            .queues
            .get_mut(shard_id)
            .ok_or_else(|| StreamError::not_found(format!("shard {shard_id} not found")))?;

        let records = queue.pages.pop_front().unwrap_or_default();
        let sealed = queue.sealed && queue.pages.is_empty();
        Ok(RecordPage {
            records,
            next_cursor: if sealed { None } else { Some(cursor.clone()) },
        })
    }
}

impl StreamDirectory for MemoryStream {
    fn resolve_stream<'a>(
        &'a self,
        source_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<StreamHandle, StreamError>> + Send + 'a>> {
        Box::pin(async move {
            let mut state = self.lock();
            state.resolve_calls += 1;
            if state.fail_resolve {
                return Err(StreamError::not_found(format!("no stream is associated with {source_id}")));
            }
            Ok(state.stream.clone())
        })
    }

    fn list_shards<'a>(
        &'a self,
        stream: &'a StreamHandle,
        page_token: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<ShardListPage, StreamError>> + Send + 'a>> {
        Box::pin(async move {
            let mut state = self.lock();
            state.list_calls += 1;
            if state.fail_list {
                return Err(StreamError::io("DescribeStream unavailable"));
            }
            if state.stream.id != stream.id {
                return Err(StreamError::not_found(format!("stream {} not found", stream.id)));
            }

            // The token is the last shard ID of the previous page.
            let start = match page_token {
                Some(token) => state
                    .shards
                    .iter()
                    .position(|s| s.shard_id == token)
                    .map(|i| i + 1)
                    .ok_or_else(|| StreamError::new(format!("unknown page token {token}")))?,
                None => 0,
            };
            let end = if state.page_size == 0 {
                state.shards.len()
            } else {
                (start + state.page_size).min(state.shards.len())
            };

            let shards = state.shards[start..end].to_vec();
            let next_page_token = if end < state.shards.len() {
                shards.last().map(|s| s.shard_id.clone())
            } else {
                None
            };
            Ok(ShardListPage { shards, next_page_token })
        })
    }
}

impl ShardIterator for MemoryStream {
    fn initial_cursor<'a>(
        &'a self,
        stream: &'a StreamHandle,
        shard_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<ShardCursor, StreamError>> + Send + 'a>> {
        Box::pin(async move {
            let mut state = self.lock();
            *state.cursor_requests.entry(shard_id.to_string()).or_default() += 1;

            if let Some(remaining) = state.cursor_failures.get_mut(shard_id) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(StreamError::io(format!("GetShardIterator failed for {shard_id}")));
                }
            }
            if !state.queues.contains_key(shard_id) {
                return Err(StreamError::not_found(format!("shard {shard_id} not found")));
            }
            Ok(Self::cursor_for(&stream.id, shard_id))
        })
    }

    fn fetch_records<'a>(
        &'a self,
        cursor: &'a ShardCursor,
    ) -> Pin<Box<dyn Future<Output = Result<RecordPage, StreamError>> + Send + 'a>> {
        Box::pin(async move {
            let (shard_id, delay) = {
                let mut state = self.lock();
                let shard_id = cursor
                    .as_str()
                    .split_once('|')
                    .map(|(_, shard)| shard.to_string())
                    .ok_or_else(|| StreamError::new("malformed cursor"))?;
                *state.fetch_calls.entry(shard_id.clone()).or_default() += 1;
                state.in_flight += 1;
                (shard_id, state.fetch_delay)
            };

            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            self.finish_fetch(cursor, &shard_id)
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  JSON records
// ═══════════════════════════════════════════════════════════════

/// Raw record whose payload is `{"id": <sequence>, "op": <operation>, "key": <key>}`.
pub fn json_record(sequence: &str, operation: &str, key: &str) -> RawRecord {
    let data = serde_json::json!({ "id": sequence, "op": operation, "key": key });
    RawRecord::new(sequence, data.to_string().into_bytes())
}

/// Decodes the payloads produced by [`json_record`]. Missing fields fall
/// back to the sequence number and `INSERT`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonDecoder;

impl RecordDecoder for JsonDecoder {
    fn decode(&self, shard_id: &str, raw: RawRecord) -> Result<Record, StreamError> {
        let data: serde_json::Value = serde_json::from_slice(&raw.data)?;
        let field = |name: &str| data.get(name).and_then(|v| v.as_str()).map(str::to_string);

        Ok(Record {
            shard_id: shard_id.to_string(),
            event_id: field("id").unwrap_or_else(|| raw.sequence.clone()),
            operation: field("op").unwrap_or_else(|| "INSERT".to_string()),
            subject: field("key"),
            time_ms: None,
            sequence: raw.sequence,
            data,
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  CollectingSink
// ═══════════════════════════════════════════════════════════════

/// Keeps every emitted record, in emission order.
#[derive(Default)]
pub struct CollectingSink {
    records: Mutex<Vec<Record>>,
    fail_on: Mutex<HashSet<String>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the record with this sequence number.
    pub fn fail_on(&self, sequence: &str) {
        self.fail_on.lock().unwrap_or_else(PoisonError::into_inner).insert(sequence.to_string());
    }

    pub fn records(&self) -> Vec<Record> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sequence numbers emitted for `shard_id`, in emission order.
    pub fn sequences(&self, shard_id: &str) -> Vec<String> {
        self.records()
            .into_iter()
            .filter(|r| r.shard_id == shard_id)
            .map(|r| r.sequence)
            .collect()
    }

    /// Wait until at least `count` records were emitted.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.len() < count {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        true
    }
}

impl RecordSink for CollectingSink {
    fn emit(&self, record: Record) -> Pin<Box<dyn Future<Output = Result<(), StreamError>> + Send + '_>> {
        Box::pin(async move {
            if self.fail_on.lock().unwrap_or_else(PoisonError::into_inner).contains(&record.sequence) {
                return Err(StreamError::io(format!("sink rejected {}", record.sequence)));
            }
            self.records.lock().unwrap_or_else(PoisonError::into_inner).push(record);
            Ok(())
        })
    }
}
