use std::sync::Arc;

use stream_api::{RecordDecoder, RecordSink, ShardIterator, StreamDirectory};

/// A source identifier together with the collaborators that serve it.
#[derive(Clone)]
pub struct StreamSource {
    pub source_id: String,
    pub directory: Arc<dyn StreamDirectory>,
    pub iterator: Arc<dyn ShardIterator>,
    pub decoder: Arc<dyn RecordDecoder>,
    pub sink: Arc<dyn RecordSink>,
}

impl StreamSource {
    pub fn new(
        source_id: impl Into<String>,
        directory: Arc<dyn StreamDirectory>,
        iterator: Arc<dyn ShardIterator>,
        decoder: Arc<dyn RecordDecoder>,
        sink: Arc<dyn RecordSink>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            directory,
            iterator,
            decoder,
            sink,
        }
    }
}

impl std::fmt::Debug for StreamSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSource").field("source_id", &self.source_id).finish_non_exhaustive()
    }
}
