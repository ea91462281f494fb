//! CloudEvents delivery of decoded stream records.

mod event;
mod sink;

pub use event::{CloudEvent, DYNAMODB_STREAM_RECORD, EventEncoder, SPEC_VERSION};
pub use sink::{HttpSink, JsonLinesSink};
