mod error;
mod types;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub use error::{ErrorKind, StreamError};
pub use types::{
    RawRecord, Record, RecordPage, ShardCursor, ShardDescriptor,
    ShardListPage, StreamHandle, StreamStatus,
};

// ════════════════════════════════════════════════════════════════
//  Stream Directory
// ════════════════════════════════════════════════════════════════

/// Discovers the change stream attached to a source and lists its shards.
pub trait StreamDirectory: Send + Sync {
    /// Resolve the currently active stream of `source_id`.
    fn resolve_stream<'a>(
        &'a self,
        source_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<StreamHandle, StreamError>> + Send + 'a>>;

    /// List one page of shards. Pass the previous page's
    /// `next_page_token` to continue, `None` to start over.
    fn list_shards<'a>(
        &'a self,
        stream: &'a StreamHandle,
        page_token: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<ShardListPage, StreamError>> + Send + 'a>>;
}

// ════════════════════════════════════════════════════════════════
//  Shard Iterator
// ════════════════════════════════════════════════════════════════

/// Reads records out of a single shard.
pub trait ShardIterator: Send + Sync {
    /// Cursor anchored at the latest position of the shard. New shards
    /// never replay history.
    fn initial_cursor<'a>(
        &'a self,
        stream: &'a StreamHandle,
        shard_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<ShardCursor, StreamError>> + Send + 'a>>;

    /// Next page of records after `cursor`.
    fn fetch_records<'a>(
        &'a self,
        cursor: &'a ShardCursor,
    ) -> Pin<Box<dyn Future<Output = Result<RecordPage, StreamError>> + Send + 'a>>;
}

// ════════════════════════════════════════════════════════════════
//  Decoder / Sink
// ════════════════════════════════════════════════════════════════

/// Turns an upstream record into the engine's `Record`.
pub trait RecordDecoder: Send + Sync {
    fn decode(&self, shard_id: &str, raw: RawRecord) -> Result<Record, StreamError>;
}

/// Downstream receiver of decoded records. Called synchronously, one
/// record at a time, in per-shard order.
pub trait RecordSink: Send + Sync {
    fn emit(&self, record: Record) -> Pin<Box<dyn Future<Output = Result<(), StreamError>> + Send + '_>>;
}

// ════════════════════════════════════════════════════════════════
//  Readiness
// ════════════════════════════════════════════════════════════════

/// Readiness flag shared between the engine and the health endpoint.
/// Flipped once, after the first successful stream existence check.
#[derive(Debug, Clone, Default)]
pub struct Readiness(Arc<AtomicBool>);

impl Readiness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_ready(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_ready(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readiness_is_shared_between_clones() {
        let ready = Readiness::new();
        let probe = ready.clone();
        assert!(!probe.is_ready());
        ready.mark_ready();
        assert!(probe.is_ready());
    }

    #[test]
    fn sealed_page_has_no_cursor() {
        let page = RecordPage { records: vec![], next_cursor: None };
        assert!(page.is_sealed());
        let page = RecordPage { records: vec![], next_cursor: Some(ShardCursor::new("c")) };
        assert!(!page.is_sealed());
    }

    #[test]
    fn status_display_matches_upstream_names() {
        assert_eq!(StreamStatus::Enabled.to_string(), "ENABLED");
        assert_eq!(StreamStatus::Other("ENABLING".into()).to_string(), "ENABLING");
        assert!(!StreamStatus::Disabled.is_enabled());
    }

    #[test]
    fn cursor_debug_hides_token() {
        let cursor = ShardCursor::new("secret-token");
        assert_eq!(format!("{cursor:?}"), "ShardCursor(12 bytes)");
    }
}
