//! DynamoDB Streams backend.
//!
//! [`DynamoDbStreams`] locates the latest stream of a table, lists its
//! shards and reads records from them; [`StreamRecordDecoder`] turns the
//! records into engine records.

mod arn;
mod client;
pub mod convert;
mod decode;

pub use arn::TableArn;
pub use client::{ConnectOptions, DynamoDbStreams};
pub use decode::StreamRecordDecoder;
