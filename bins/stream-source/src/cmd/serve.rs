use std::pin::pin;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::{Effective, ServeArgs};
use crate::error::ServerError;
use shard_engine::{StreamSource, Supervisor};
use sink_cloudevents::{EventEncoder, HttpSink, JsonLinesSink};
use stream_api::{Readiness, RecordSink};
use stream_dynamodb::{ConnectOptions, DynamoDbStreams, StreamRecordDecoder, TableArn};

pub async fn run(args: ServeArgs) -> Result<(), ServerError> {
    tracing::info!("stream-source starting");

    // --- Load config ---
    let eff = Effective::new(&args)?;
    eff.engine.validate()?;
    let table: TableArn = eff.arn.parse()?;
    tracing::info!(config = %args.config, table = %table, "loaded config");

    // --- AWS clients ---
    let options = ConnectOptions {
        assume_role_arn: eff.assume_role_arn.clone(),
        endpoint_url: eff.endpoint_url.clone(),
    };
    let streams = Arc::new(DynamoDbStreams::connect(table.clone(), &options).await);
    tracing::info!(region = %table.region(), "initialized DynamoDB clients");

    // --- Sink ---
    let encoder = EventEncoder::dynamodb(table.to_string());
    let sink: Arc<dyn RecordSink> = match &eff.sink_url {
        Some(url) => {
            tracing::info!(sink = %url, "sending events over HTTP");
            Arc::new(HttpSink::new(url.clone(), encoder))
        }
        None => {
            tracing::info!("no sink configured, writing events to stdout");
            Arc::new(JsonLinesSink::stdout(encoder))
        }
    };

    // --- CancellationToken for graceful shutdown ---
    let token = CancellationToken::new();
    let readiness = Readiness::new();

    // --- Health server ---
    let health = tokio::spawn({
        let token = token.clone();
        let readiness = readiness.clone();
        let port = eff.health_port;
        async move {
            let result = health_server::run(port, readiness, token.clone()).await;
            if let Err(e) = &result {
                tracing::error!(error = %e, "health server failed");
                token.cancel();
            }
            result
        }
    });

    // --- Engine ---
    let source = StreamSource::new(
        table.to_string(),
        streams.clone(),
        streams,
        Arc::new(StreamRecordDecoder),
        sink,
    );
    let mut engine = pin!(Supervisor::new(source, eff.engine, readiness).run(token.clone()));

    let result = tokio::select! {
        result = &mut engine => result,
        signal = shutdown_signal() => {
            match signal {
                Ok(()) => tracing::info!("shutdown signal received"),
                Err(e) => tracing::error!(error = %e, "cannot listen for shutdown signals"),
            }
            token.cancel();
            engine.await
        }
    };

    // --- Shutdown ---
    token.cancel();
    let health_result = health.await;

    result?;
    health_result??;
    tracing::info!("stream-source stopped");
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result,
            _ = terminate.recv() => Ok(()),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}
