// ════════════════════════════════════════════════════════════════
//  Stream
// ════════════════════════════════════════════════════════════════

/// Status of a change stream as reported by the upstream directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StreamStatus {
    Enabled,
    Disabled,
    /// Any other upstream status (e.g. `ENABLING`, `DISABLING`).
    Other(String),
}

impl StreamStatus {
    pub fn is_enabled(&self) -> bool {
        matches!(self, StreamStatus::Enabled)
    }
}

impl std::fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamStatus::Enabled => f.write_str("ENABLED"),
            StreamStatus::Disabled => f.write_str("DISABLED"),
            StreamStatus::Other(s) => f.write_str(s),
        }
    }
}

/// The active change stream of a source. A new identifier means the
/// upstream rotated the stream and every shard of the old one is stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHandle {
    pub id: String,
    pub status: StreamStatus,
}

impl StreamHandle {
    pub fn new(id: impl Into<String>, status: StreamStatus) -> Self {
        Self { id: id.into(), status }
    }
}

// ════════════════════════════════════════════════════════════════
//  Shards
// ════════════════════════════════════════════════════════════════

/// A shard as listed by the directory. Immutable once observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardDescriptor {
    pub shard_id: String,
    pub parent_shard_id: Option<String>,
}

impl ShardDescriptor {
    pub fn new(shard_id: impl Into<String>) -> Self {
        Self { shard_id: shard_id.into(), parent_shard_id: None }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent_shard_id = Some(parent.into());
        self
    }
}

/// One page of a (possibly paginated) shard listing.
/// `next_page_token == None` marks the last page.
#[derive(Debug, Clone, Default)]
pub struct ShardListPage {
    pub shards: Vec<ShardDescriptor>,
    pub next_page_token: Option<String>,
}

/// Opaque read position inside a shard. Only meaningful to the
/// `ShardIterator` that issued it.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ShardCursor(String);

impl ShardCursor {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Cursors are bearer tokens for the upstream API: keep them out of logs.
impl std::fmt::Debug for ShardCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ShardCursor({} bytes)", self.0.len())
    }
}

// ════════════════════════════════════════════════════════════════
//  Records
// ════════════════════════════════════════════════════════════════

/// A record as returned by the upstream, before decoding.
#[derive(Debug, Clone)]
pub struct RawRecord {
    /// Per-shard sequence key.
    pub sequence: String,
    /// Upstream encoding of the change event.
    pub data: Vec<u8>,
}

impl RawRecord {
    pub fn new(sequence: impl Into<String>, data: Vec<u8>) -> Self {
        Self { sequence: sequence.into(), data }
    }
}

/// One page of records fetched from a shard. `next_cursor == None`
/// means the shard is sealed and no record will ever follow.
#[derive(Debug, Clone, Default)]
pub struct RecordPage {
    pub records: Vec<RawRecord>,
    pub next_cursor: Option<ShardCursor>,
}

impl RecordPage {
    pub fn is_sealed(&self) -> bool {
        self.next_cursor.is_none()
    }
}

/// A decoded change event. Ownership moves into the `RecordSink`.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub shard_id: String,
    /// Per-shard sequence key.
    pub sequence: String,
    pub event_id: String,
    /// Kind of modification (e.g. `INSERT`, `MODIFY`, `REMOVE`).
    pub operation: String,
    /// Short description of the affected item, if any.
    pub subject: Option<String>,
    /// Approximate creation time in milliseconds (Unix epoch).
    pub time_ms: Option<i64>,
    pub data: serde_json::Value,
}
