use std::future::Future;
use std::pin::Pin;

use reqwest::header::CONTENT_TYPE;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use stream_api::{Record, RecordSink, StreamError};

use crate::event::EventEncoder;

const CLOUDEVENTS_JSON: &str = "application/cloudevents+json";

// ═══════════════════════════════════════════════════════════════
//  HttpSink
// ═══════════════════════════════════════════════════════════════

/// Posts each record as a structured CloudEvent. Any non-2xx answer is
/// a delivery failure.
pub struct HttpSink {
    client: reqwest::Client,
    url: String,
    encoder: EventEncoder,
}

impl HttpSink {
    pub fn new(url: impl Into<String>, encoder: EventEncoder) -> Self {
        Self::with_client(reqwest::Client::new(), url, encoder)
    }

    pub fn with_client(client: reqwest::Client, url: impl Into<String>, encoder: EventEncoder) -> Self {
        Self { client, url: url.into(), encoder }
    }
}

impl RecordSink for HttpSink {
    fn emit(&self, record: Record) -> Pin<Box<dyn Future<Output = Result<(), StreamError>> + Send + '_>> {
        Box::pin(async move {
            let event = self.encoder.encode(record);
            let body = serde_json::to_vec(&event)?;

            let response = self
                .client
                .post(&self.url)
                .header(CONTENT_TYPE, CLOUDEVENTS_JSON)
                .body(body)
                .send()
                .await
                .map_err(|e| StreamError::io(format!("sending event {}: {e}", event.id)))?;

            let status = response.status();
            if !status.is_success() {
                return Err(StreamError::io(format!("sink rejected event {} with status {status}", event.id)));
            }

            tracing::trace!(id = %event.id, status = %status, "event delivered");
            Ok(())
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  JsonLinesSink
// ═══════════════════════════════════════════════════════════════

/// Writes each event as one JSON line, stdout by default. Lines of
/// concurrent shards never interleave.
pub struct JsonLinesSink {
    encoder: EventEncoder,
    out: Mutex<Pin<Box<dyn AsyncWrite + Send>>>,
}

impl JsonLinesSink {
    pub fn new(encoder: EventEncoder, out: impl AsyncWrite + Send + 'static) -> Self {
        Self { encoder, out: Mutex::new(Box::pin(out)) }
    }

    pub fn stdout(encoder: EventEncoder) -> Self {
        Self::new(encoder, tokio::io::stdout())
    }
}

impl RecordSink for JsonLinesSink {
    fn emit(&self, record: Record) -> Pin<Box<dyn Future<Output = Result<(), StreamError>> + Send + '_>> {
        Box::pin(async move {
            let mut line = serde_json::to_vec(&self.encoder.encode(record))?;
            line.push(b'\n');

            let mut out = self.out.lock().await;
            out.write_all(&line).await?;
            out.flush().await?;
            Ok(())
        })
    }
}
