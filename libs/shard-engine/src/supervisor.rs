use std::sync::Arc;

use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use stream_api::Readiness;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::poller::TopologyPoller;
use crate::registry::ShardRegistry;
use crate::source::StreamSource;

// ═══════════════════════════════════════════════════════════════
//  Supervisor
// ═══════════════════════════════════════════════════════════════

/// Top-level loop: verifies the stream exists, reports readiness, ticks
/// the topology poller and joins every shard consumer on the way out.
pub struct Supervisor {
    source: StreamSource,
    config: EngineConfig,
    readiness: Readiness,
    registry: Arc<ShardRegistry>,
}

impl Supervisor {
    pub fn new(source: StreamSource, config: EngineConfig, readiness: Readiness) -> Self {
        Self {
            source,
            config,
            readiness,
            registry: Arc::new(ShardRegistry::new()),
        }
    }

    /// Registry shared with every consumer this supervisor starts.
    pub fn registry(&self) -> Arc<ShardRegistry> {
        Arc::clone(&self.registry)
    }

    /// Run until `token` is cancelled or the stream can no longer be
    /// resolved. Returns only after all shard consumers have exited.
    pub async fn run(self, token: CancellationToken) -> Result<(), EngineError> {
        self.config.validate()?;

        let source_id = self.source.source_id.clone();

        self.source
            .directory
            .resolve_stream(&source_id)
            .await
            .map_err(|error| EngineError::StreamCheck { source_id: source_id.clone(), error })?;

        self.readiness.mark_ready();
        tracing::info!(source = %source_id, "starting collection of stream records");

        let tracker = TaskTracker::new();
        let consumers = token.child_token();
        let mut poller = TopologyPoller::new(
            self.source,
            self.registry,
            tracker.clone(),
            consumers.clone(),
            self.config.fetch_interval(),
        );

        let poll_interval = self.config.poll_interval();
        let ticker = sleep(std::time::Duration::ZERO);
        tokio::pin!(ticker);

        let result = loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break Ok(()),
                _ = &mut ticker => {
                    let polled = tokio::select! {
                        biased;
                        _ = token.cancelled() => break Ok(()),
                        polled = poller.poll() => polled,
                    };
                    if let Err(e) = polled {
                        tracing::error!(source = %source_id, error = %e, "stopping stream collection");
                        break Err(e);
                    }
                    ticker.as_mut().reset(Instant::now() + poll_interval);
                }
            }
        };

        consumers.cancel();
        tracker.close();
        tracing::debug!(source = %source_id, running = tracker.len(), "waiting for termination of records processors");
        tracker.wait().await;
        tracing::info!(source = %source_id, "stream collection stopped");

        result
    }
}
