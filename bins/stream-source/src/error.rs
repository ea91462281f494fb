#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("config ({context}): {detail}")]
    Config { context: &'static str, detail: String },

    #[error("{0}")]
    Stream(#[from] stream_api::StreamError),

    #[error("{0}")]
    Engine(#[from] shard_engine::EngineError),

    #[error("{0}")]
    Health(#[from] health_server::HealthError),

    #[error("task: {0}")]
    Task(#[from] tokio::task::JoinError),
}
