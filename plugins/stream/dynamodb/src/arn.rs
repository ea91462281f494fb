use std::str::FromStr;

use stream_api::StreamError;

/// ARN of a DynamoDB table: `arn:<partition>:dynamodb:<region>:<account>:table/<name>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableArn {
    partition: String,
    region: String,
    account_id: String,
    table_name: String,
}

impl TableArn {
    pub fn partition(&self) -> &str {
        &self.partition
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }
}

impl FromStr for TableArn {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |why: &str| StreamError::config(format!("invalid table ARN '{s}': {why}"));

        let parts: Vec<&str> = s.splitn(6, ':').collect();
        let [prefix, partition, service, region, account_id, resource] = parts[..] else {
            return Err(invalid("expected 6 ':'-separated sections"));
        };

        if prefix != "arn" {
            return Err(invalid("missing 'arn' prefix"));
        }
        if service != "dynamodb" {
            return Err(invalid("not a DynamoDB resource"));
        }
        if partition.is_empty() || region.is_empty() {
            return Err(invalid("partition and region are required"));
        }

        // The resource may carry a sub-resource, e.g. "table/Name/stream/<label>".
        let table_name = resource
            .strip_prefix("table/")
            .and_then(|rest| rest.split('/').next())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| invalid("resource must be 'table/<name>'"))?;

        Ok(Self {
            partition: partition.to_string(),
            region: region.to_string(),
            account_id: account_id.to_string(),
            table_name: table_name.to_string(),
        })
    }
}

impl std::fmt::Display for TableArn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "arn:{}:dynamodb:{}:{}:table/{}",
            self.partition, self.region, self.account_id, self.table_name
        )
    }
}
