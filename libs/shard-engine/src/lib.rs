//! Sharded change-stream consumer.
//!
//! The [`Supervisor`] ticks a [`TopologyPoller`], which keeps exactly one
//! [`ShardConsumer`] per live shard, guarded by the [`ShardRegistry`].

pub mod config;
pub mod error;
mod consumer;
mod poller;
mod registry;
mod source;
mod supervisor;

pub use config::EngineConfig;
pub use consumer::{ShardConsumer, ShardExit};
pub use error::EngineError;
pub use poller::{OutcomeKind, PollReport, TopologyPoller};
pub use registry::{ShardLease, ShardRegistry};
pub use source::StreamSource;
pub use supervisor::Supervisor;
