use std::future::Future;
use std::pin::Pin;

use aws_config::BehaviorVersion;
use aws_config::sts::AssumeRoleProvider;
use aws_sdk_dynamodb::config::{Region, SharedCredentialsProvider};
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodbstreams::types::{ShardIteratorType, StreamStatus as SdkStreamStatus};

use stream_api::{
    RawRecord, RecordPage, ShardCursor, ShardDescriptor, ShardIterator, ShardListPage,
    StreamDirectory, StreamError, StreamHandle, StreamStatus,
};

use crate::arn::TableArn;
use crate::convert::record_to_json;

const SESSION_NAME: &str = "stream-source";

/// Connection settings on top of the default AWS credential chain.
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    /// Role to assume with the default credentials before calling AWS.
    pub assume_role_arn: Option<String>,
    /// Alternative endpoint, e.g. a local DynamoDB.
    pub endpoint_url: Option<String>,
}

// ═══════════════════════════════════════════════════════════════
//  DynamoDbStreams
// ═══════════════════════════════════════════════════════════════

/// Stream directory and shard iterator backed by DynamoDB and
/// DynamoDB Streams.
///
/// The active stream of a table is its `LatestStreamArn`. Cursors are
/// shard iterators of type `LATEST`.
#[derive(Debug, Clone)]
pub struct DynamoDbStreams {
    table: TableArn,
    tables: aws_sdk_dynamodb::Client,
    streams: aws_sdk_dynamodbstreams::Client,
}

impl DynamoDbStreams {
    /// Build clients for the region of `table`.
    pub async fn connect(table: TableArn, options: &ConnectOptions) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(Region::new(table.region().to_string()));
        if let Some(url) = &options.endpoint_url {
            loader = loader.endpoint_url(url);
        }
        let base = loader.load().await;

        let config = match &options.assume_role_arn {
            Some(role_arn) => {
                tracing::debug!(role = %role_arn, "assuming role for stream access");
                let provider = AssumeRoleProvider::builder(role_arn)
                    .session_name(SESSION_NAME)
                    .configure(&base)
                    .build()
                    .await;
                base.into_builder()
                    .credentials_provider(SharedCredentialsProvider::new(provider))
                    .build()
            }
            None => base,
        };

        Self::from_clients(
            table,
            aws_sdk_dynamodb::Client::new(&config),
            aws_sdk_dynamodbstreams::Client::new(&config),
        )
    }

    pub fn from_clients(
        table: TableArn,
        tables: aws_sdk_dynamodb::Client,
        streams: aws_sdk_dynamodbstreams::Client,
    ) -> Self {
        Self { table, tables, streams }
    }

    async fn latest_stream_arn(&self, table: &TableArn) -> Result<String, StreamError> {
        let output = self
            .tables
            .describe_table()
            .table_name(table.table_name())
            .send()
            .await
            .map_err(|e| {
                let not_found = e
                    .as_service_error()
                    .is_some_and(|se| se.is_resource_not_found_exception());
                if not_found {
                    StreamError::not_found(format!("table {table} does not exist"))
                } else {
                    sdk_error("describing table", e)
                }
            })?;

        output
            .table()
            .and_then(|t| t.latest_stream_arn())
            .map(str::to_string)
            .ok_or_else(|| StreamError::not_found(format!("no stream is associated with table {table}")))
    }
}

impl StreamDirectory for DynamoDbStreams {
    fn resolve_stream<'a>(
        &'a self,
        source_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<StreamHandle, StreamError>> + Send + 'a>> {
        Box::pin(async move {
            let table: TableArn = source_id.parse()?;
            if table.region() != self.table.region() {
                return Err(StreamError::config(format!(
                    "table {table} is outside region {} of the configured clients",
                    self.table.region()
                )));
            }
            let stream_arn = self.latest_stream_arn(&table).await?;

            let output = self
                .streams
                .describe_stream()
                .stream_arn(&stream_arn)
                .limit(1)
                .send()
                .await
                .map_err(|e| sdk_error("describing stream", e))?;

            let status = output
                .stream_description()
                .and_then(|d| d.stream_status())
                .map(convert_status)
                .unwrap_or_else(|| StreamStatus::Other("UNKNOWN".into()));

            Ok(StreamHandle::new(stream_arn, status))
        })
    }

    fn list_shards<'a>(
        &'a self,
        stream: &'a StreamHandle,
        page_token: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<ShardListPage, StreamError>> + Send + 'a>> {
        Box::pin(async move {
            let output = self
                .streams
                .describe_stream()
                .stream_arn(&stream.id)
                .set_exclusive_start_shard_id(page_token.map(str::to_string))
                .send()
                .await
                .map_err(|e| sdk_error("describing stream", e))?;

            let Some(description) = output.stream_description() else {
                return Ok(ShardListPage::default());
            };

            let shards = description
                .shards()
                .iter()
                .filter_map(|shard| {
                    let id = shard.shard_id()?;
                    let descriptor = ShardDescriptor::new(id);
                    Some(match shard.parent_shard_id() {
                        Some(parent) => descriptor.with_parent(parent),
                        None => descriptor,
                    })
                })
                .collect();

            Ok(ShardListPage {
                shards,
                next_page_token: description.last_evaluated_shard_id().map(str::to_string),
            })
        })
    }
}

impl ShardIterator for DynamoDbStreams {
    fn initial_cursor<'a>(
        &'a self,
        stream: &'a StreamHandle,
        shard_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<ShardCursor, StreamError>> + Send + 'a>> {
        Box::pin(async move {
            let output = self
                .streams
                .get_shard_iterator()
                .stream_arn(&stream.id)
                .shard_id(shard_id)
                .shard_iterator_type(ShardIteratorType::Latest)
                .send()
                .await
                .map_err(|e| sdk_error("getting shard iterator", e))?;

            output
                .shard_iterator()
                .map(ShardCursor::new)
                .ok_or_else(|| StreamError::new(format!("no shard iterator returned for shard {shard_id}")))
        })
    }

    fn fetch_records<'a>(
        &'a self,
        cursor: &'a ShardCursor,
    ) -> Pin<Box<dyn Future<Output = Result<RecordPage, StreamError>> + Send + 'a>> {
        Box::pin(async move {
            let output = self
                .streams
                .get_records()
                .shard_iterator(cursor.as_str())
                .send()
                .await
                .map_err(|e| sdk_error("getting records", e))?;

            let mut records = Vec::with_capacity(output.records().len());
            for record in output.records() {
                let sequence = record
                    .dynamodb()
                    .and_then(|r| r.sequence_number())
                    .unwrap_or_default();
                records.push(RawRecord::new(sequence, serde_json::to_vec(&record_to_json(record))?));
            }

            Ok(RecordPage {
                records,
                next_cursor: output.next_shard_iterator().map(ShardCursor::new),
            })
        })
    }
}

fn convert_status(status: &SdkStreamStatus) -> StreamStatus {
    match status {
        SdkStreamStatus::Enabled => StreamStatus::Enabled,
        SdkStreamStatus::Disabled => StreamStatus::Disabled,
        other => StreamStatus::Other(other.as_str().to_string()),
    }
}

fn sdk_error(op: &str, err: impl std::error::Error) -> StreamError {
    StreamError::io(format!("{op}: {}", DisplayErrorContext(err)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_keeps_transitional_states() {
        assert_eq!(convert_status(&SdkStreamStatus::Enabled), StreamStatus::Enabled);
        assert_eq!(convert_status(&SdkStreamStatus::Disabled), StreamStatus::Disabled);
        assert_eq!(convert_status(&SdkStreamStatus::Enabling), StreamStatus::Other("ENABLING".into()));
        assert_eq!(convert_status(&SdkStreamStatus::Disabling), StreamStatus::Other("DISABLING".into()));
    }
}
