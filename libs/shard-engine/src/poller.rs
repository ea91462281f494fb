use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use stream_api::{ShardDescriptor, StreamHandle, StreamStatus};

use crate::consumer::{ShardConsumer, ShardExit};
use crate::error::EngineError;
use crate::registry::{ShardLease, ShardRegistry};
use crate::source::StreamSource;

// ═══════════════════════════════════════════════════════════════
//  Shard outcomes
// ═══════════════════════════════════════════════════════════════

/// How a consumer task ended, as reported back to the poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Sealed,
    Cancelled,
    /// No cursor could be acquired. The shard was never consumed and
    /// is retried on the next cycle.
    StartFailed,
    /// Fetch, decode or sink failure mid-stream.
    Failed,
}

#[derive(Debug, Clone)]
struct ShardOutcome {
    stream_id: String,
    shard_id: String,
    kind: OutcomeKind,
}

/// What a single poll cycle observed and did.
#[derive(Debug, Clone)]
pub struct PollReport {
    pub stream: StreamHandle,
    /// The active stream differs from the one seen on the previous cycle.
    pub rotated: bool,
    /// Shards returned by the directory, across all pages.
    pub listed: usize,
    /// Shards a consumer was started for during this cycle.
    pub spawned: Vec<String>,
    /// Shard discovery ran to the last page.
    pub complete: bool,
}

// ═══════════════════════════════════════════════════════════════
//  TopologyPoller
// ═══════════════════════════════════════════════════════════════

/// Re-lists the stream's shards on every cycle and starts a consumer for
/// each shard that has none.
///
/// Shards that sealed or failed mid-stream are retired for the current
/// stream generation and not attached again until the upstream stops
/// listing them; a rotation to a new stream starts from a clean slate. Consumers of the previous stream are left
/// running until they exit on their own.
pub struct TopologyPoller {
    source: StreamSource,
    registry: Arc<ShardRegistry>,
    tracker: TaskTracker,
    token: CancellationToken,
    fetch_interval: Duration,

    last_stream: Option<String>,
    last_status: Option<StreamStatus>,
    retired: HashSet<String>,

    outcome_tx: mpsc::UnboundedSender<ShardOutcome>,
    outcome_rx: mpsc::UnboundedReceiver<ShardOutcome>,
}

impl TopologyPoller {
    /// `tracker` joins every spawned consumer, `token` is handed to them.
    pub fn new(
        source: StreamSource,
        registry: Arc<ShardRegistry>,
        tracker: TaskTracker,
        token: CancellationToken,
        fetch_interval: Duration,
    ) -> Self {
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        Self {
            source,
            registry,
            tracker,
            token,
            fetch_interval,
            last_stream: None,
            last_status: None,
            retired: HashSet::new(),
            outcome_tx,
            outcome_rx,
        }
    }

    pub fn registry(&self) -> &Arc<ShardRegistry> {
        &self.registry
    }

    /// Shards retired for the current stream generation, sorted.
    pub fn retired(&mut self) -> Vec<String> {
        self.collect_outcomes();
        let mut ids: Vec<String> = self.retired.iter().cloned().collect();
        ids.sort();
        ids
    }

    /// Run one cycle. Only a failure to resolve the stream is returned as
    /// an error; shard listing failures are logged and end the cycle.
    pub async fn poll(&mut self) -> Result<PollReport, EngineError> {
        self.collect_outcomes();

        let stream = self
            .source
            .directory
            .resolve_stream(&self.source.source_id)
            .await
            .map_err(|error| EngineError::StreamResolve {
                source_id: self.source.source_id.clone(),
                error,
            })?;

        let rotated = self.observe_stream(&stream);
        self.observe_status(&stream);

        let mut report = PollReport {
            stream: stream.clone(),
            rotated,
            listed: 0,
            spawned: Vec::new(),
            complete: false,
        };

        if !stream.status.is_enabled() {
            tracing::debug!(stream = %stream.id, status = %stream.status, "skipping shard discovery");
            return Ok(report);
        }

        tracing::debug!(stream = %stream.id, "checking stream for new shards");
        match self.discover(&stream, &mut report).await {
            Ok(listed) => {
                report.complete = true;
                self.prune_retired(&listed);
            }
            Err(e) => tracing::error!(stream = %stream.id, error = %e, "error while re-checking stream"),
        }

        Ok(report)
    }

    fn observe_stream(&mut self, stream: &StreamHandle) -> bool {
        let rotated = match &self.last_stream {
            Some(last) if *last != stream.id => {
                tracing::warn!(from = %last, to = %stream.id, "active stream changed");
                self.last_status = None;
                self.retired.clear();
                true
            }
            _ => false,
        };
        self.last_stream = Some(stream.id.clone());
        rotated
    }

    fn observe_status(&mut self, stream: &StreamHandle) {
        match &self.last_status {
            Some(last) if *last != stream.status => {
                tracing::warn!(stream = %stream.id, from = %last, to = %stream.status, "stream status changed");
            }
            None if !stream.status.is_enabled() => {
                tracing::warn!(
                    stream = %stream.id,
                    status = %stream.status,
                    "stream is not enabled, no records collection will occur"
                );
            }
            _ => {}
        }
        self.last_status = Some(stream.status.clone());
    }

    /// Walk every page of the shard listing. Returns the IDs listed.
    async fn discover(
        &mut self,
        stream: &StreamHandle,
        report: &mut PollReport,
    ) -> Result<HashSet<String>, EngineError> {
        let mut page_token: Option<String> = None;
        let mut listed = HashSet::new();

        loop {
            let page = self
                .source
                .directory
                .list_shards(stream, page_token.as_deref())
                .await
                .map_err(|error| EngineError::ListShards { stream: stream.id.clone(), error })?;

            report.listed += page.shards.len();
            for shard in &page.shards {
                if self.ensure_consumer(stream, shard) {
                    report.spawned.push(shard.shard_id.clone());
                }
                listed.insert(shard.shard_id.clone());
            }

            // No token: the last page has been processed.
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => return Ok(listed),
            }
        }
    }

    /// Forget retired shards the upstream trimmed from the listing.
    fn prune_retired(&mut self, listed: &HashSet<String>) {
        let before = self.retired.len();
        self.retired.retain(|id| listed.contains(id));
        let pruned = before - self.retired.len();
        if pruned > 0 {
            tracing::debug!(pruned, retired = self.retired.len(), "forgot trimmed shards");
        }
    }

    /// Start a consumer for `shard` unless one is running or the shard is
    /// retired. Returns `true` if a consumer was started.
    fn ensure_consumer(&mut self, stream: &StreamHandle, shard: &ShardDescriptor) -> bool {
        if self.retired.contains(&shard.shard_id) {
            return false;
        }

        let Some(lease) = self.registry.lease(&shard.shard_id) else {
            tracing::debug!(shard = %shard.shard_id, "records processor already running");
            return false;
        };

        // A consumer reports before releasing, so an outcome for a shard
        // we just acquired is already queued.
        self.collect_outcomes();
        if self.retired.contains(&shard.shard_id) {
            return false;
        }

        self.spawn_consumer(stream, shard, lease);
        true
    }

    fn spawn_consumer(&self, stream: &StreamHandle, shard: &ShardDescriptor, lease: ShardLease) {
        let consumer = ShardConsumer::new(
            stream.clone(),
            shard.shard_id.clone(),
            Arc::clone(&self.source.iterator),
            Arc::clone(&self.source.decoder),
            Arc::clone(&self.source.sink),
            self.fetch_interval,
        );
        let token = self.token.child_token();
        let outcomes = self.outcome_tx.clone();
        let stream_id = stream.id.clone();

        tracing::debug!(
            shard = %shard.shard_id,
            parent = ?shard.parent_shard_id,
            "starting records processor"
        );

        self.tracker.spawn(async move {
            let shard_id = lease.shard_id().to_string();

            let kind = match consumer.run(token).await {
                Ok(ShardExit::Sealed) => {
                    tracing::debug!(shard = %shard_id, "records processor stopped, shard sealed");
                    OutcomeKind::Sealed
                }
                Ok(ShardExit::Cancelled) => {
                    tracing::debug!(shard = %shard_id, "records processor stopped");
                    OutcomeKind::Cancelled
                }
                Err(e @ EngineError::Cursor { .. }) => {
                    tracing::error!(shard = %shard_id, error = %e, "records processor failed to start");
                    OutcomeKind::StartFailed
                }
                Err(e) => {
                    tracing::error!(shard = %shard_id, error = %e, "records processor returned with error");
                    OutcomeKind::Failed
                }
            };

            // Receiver lives as long as the poller, a closed channel only
            // means nobody is left to re-attach the shard.
            let _ = outcomes.send(ShardOutcome { stream_id, shard_id, kind });
            drop(lease);
        });
    }

    fn collect_outcomes(&mut self) {
        while let Ok(outcome) = self.outcome_rx.try_recv() {
            let current = self.last_stream.as_deref() == Some(outcome.stream_id.as_str());
            let retire = matches!(outcome.kind, OutcomeKind::Sealed | OutcomeKind::Failed);
            if current && retire {
                self.retired.insert(outcome.shard_id);
            }
        }
    }
}
