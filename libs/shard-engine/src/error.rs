use stream_api::StreamError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("config error: {0}")]
    Config(String),

    #[error("verifying stream for source '{source_id}': {error}")]
    StreamCheck { source_id: String, error: StreamError },

    #[error("retrieving stream for source '{source_id}': {error}")]
    StreamResolve { source_id: String, error: StreamError },

    #[error("listing shards of stream '{stream}': {error}")]
    ListShards { stream: String, error: StreamError },

    #[error("getting cursor for shard '{shard}': {error}")]
    Cursor { shard: String, error: StreamError },

    #[error("getting records from shard '{shard}': {error}")]
    Fetch { shard: String, error: StreamError },

    #[error("decoding record {sequence} of shard '{shard}': {error}")]
    Decode { shard: String, sequence: String, error: StreamError },

    #[error("emitting record {sequence} of shard '{shard}': {error}")]
    Emit { shard: String, sequence: String, error: StreamError },
}

impl EngineError {
    /// Fatal errors stop the whole subsystem. Everything else is scoped
    /// to a single shard or a single poll cycle.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::Config(_) | EngineError::StreamCheck { .. } | EngineError::StreamResolve { .. }
        )
    }
}
