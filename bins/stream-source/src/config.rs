use std::path::Path;

use clap::{Args, Parser, Subcommand};
use serde::Deserialize;

use shard_engine::EngineConfig;

use crate::error::ServerError;

#[derive(Parser)]
#[command(name = "stream-source", about = "DynamoDB stream to CloudEvents source")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Collect stream records until interrupted
    Serve(ServeArgs),
}

#[derive(Args, Clone, Debug, Default)]
pub struct ServeArgs {
    /// Path to the TOML config file
    #[arg(long, default_value = "config.toml", env = "CONFIG_PATH")]
    pub config: String,

    /// ARN of the DynamoDB table
    #[arg(long, env = "ARN")]
    pub arn: Option<String>,

    /// URL events are posted to. Without one, events go to stdout
    #[arg(long, env = "K_SINK")]
    pub sink: Option<String>,

    /// Role to assume before accessing the table
    #[arg(long, env = "AWS_ASSUME_ROLE_ARN")]
    pub assume_role: Option<String>,

    /// Port of the /health and /ready endpoints
    #[arg(long, env = "HEALTH_PORT")]
    pub health_port: Option<u16>,
}

// ═══════════════════════════════════════════════════════════════
//  Config file (TOML)
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Default, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub source: SourceSection,
    #[serde(default)]
    pub sink: SinkSection,
    #[serde(default)]
    pub engine: EngineConfig,
    pub health_port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SourceSection {
    pub arn: Option<String>,
    pub assume_role_arn: Option<String>,
    pub endpoint_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SinkSection {
    pub url: Option<String>,
}

fn default_health_port() -> u16 {
    8080
}

impl ServerConfig {
    pub fn load(path: &str) -> Result<Self, ServerError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config { context: "read", detail: format!("'{path}': {e}") })?;
        Self::parse(path, &content)
    }

    fn parse(path: &str, content: &str) -> Result<Self, ServerError> {
        toml::from_str(content)
            .map_err(|e| ServerError::Config { context: "parse", detail: format!("'{path}': {e}") })
    }
}

// ═══════════════════════════════════════════════════════════════
//  Effective: merged config
// ═══════════════════════════════════════════════════════════════

/// Final settings: config.toml < env/CLI.
#[derive(Debug)]
pub struct Effective {
    pub arn: String,
    pub sink_url: Option<String>,
    pub assume_role_arn: Option<String>,
    pub endpoint_url: Option<String>,
    pub health_port: u16,
    pub engine: EngineConfig,
}

impl Effective {
    pub fn new(args: &ServeArgs) -> Result<Self, ServerError> {
        let cfg = match ServerConfig::load(&args.config) {
            Ok(c) => c,
            Err(e) => {
                if Path::new(&args.config).exists() {
                    return Err(e);
                }
                ServerConfig::default()
            }
        };
        Self::merge(args, cfg)
    }

    pub fn merge(args: &ServeArgs, cfg: ServerConfig) -> Result<Self, ServerError> {
        let arn = args
            .arn
            .clone()
            .or(cfg.source.arn)
            .filter(|arn| !arn.is_empty())
            .ok_or(ServerError::Config { context: "source", detail: "no table ARN configured".into() })?;

        Ok(Self {
            arn,
            sink_url: args.sink.clone().or(cfg.sink.url).filter(|url| !url.is_empty()),
            assume_role_arn: args.assume_role.clone().or(cfg.source.assume_role_arn).filter(|r| !r.is_empty()),
            endpoint_url: cfg.source.endpoint_url,
            health_port: args.health_port.or(cfg.health_port).unwrap_or_else(default_health_port),
            engine: cfg.engine,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> ServeArgs {
        ServeArgs { config: "config.toml".into(), ..Default::default() }
    }

    #[test]
    fn file_values_fill_in_defaults() {
        let cfg = ServerConfig::parse(
            "test.toml",
            r#"
            health_port = 9090

            [source]
            arn = "arn:aws:dynamodb:us-fake-0:123456789012:table/MyTable"
            endpoint_url = "http://localhost:8000"

            [sink]
            url = "http://broker.local/"

            [engine]
            fetch_interval_ms = 500
            "#,
        )
        .unwrap();

        let eff = Effective::merge(&args(), cfg).unwrap();

        assert_eq!(eff.arn, "arn:aws:dynamodb:us-fake-0:123456789012:table/MyTable");
        assert_eq!(eff.sink_url.as_deref(), Some("http://broker.local/"));
        assert_eq!(eff.endpoint_url.as_deref(), Some("http://localhost:8000"));
        assert_eq!(eff.health_port, 9090);
        assert_eq!(eff.engine.fetch_interval_ms, 500);
        assert_eq!(eff.engine.poll_interval_ms, 15_000);
    }

    #[test]
    fn cli_overrides_file() {
        let cfg = ServerConfig::parse(
            "test.toml",
            r#"
            [source]
            arn = "arn:aws:dynamodb:us-fake-0:1:table/FromFile"
            assume_role_arn = "arn:aws:iam::1:role/file"
            "#,
        )
        .unwrap();
        let args = ServeArgs {
            arn: Some("arn:aws:dynamodb:us-fake-0:1:table/FromCli".into()),
            sink: Some("http://sink/".into()),
            assume_role: Some("arn:aws:iam::1:role/cli".into()),
            health_port: Some(1234),
            ..args()
        };

        let eff = Effective::merge(&args, cfg).unwrap();

        assert_eq!(eff.arn, "arn:aws:dynamodb:us-fake-0:1:table/FromCli");
        assert_eq!(eff.sink_url.as_deref(), Some("http://sink/"));
        assert_eq!(eff.assume_role_arn.as_deref(), Some("arn:aws:iam::1:role/cli"));
        assert_eq!(eff.health_port, 1234);
    }

    #[test]
    fn empty_config_uses_defaults_but_needs_arn() {
        let err = Effective::merge(&args(), ServerConfig::default()).unwrap_err();
        assert!(matches!(err, ServerError::Config { context: "source", .. }));

        let args = ServeArgs { arn: Some("arn:aws:dynamodb:r:1:table/T".into()), ..args() };
        let eff = Effective::merge(&args, ServerConfig::default()).unwrap();
        assert_eq!(eff.health_port, 8080);
        assert_eq!(eff.sink_url, None);
        assert_eq!(eff.engine.poll_interval_ms, 15_000);
    }

    #[test]
    fn unknown_toml_is_rejected_with_context() {
        let err = ServerConfig::parse("bad.toml", "health_port = \"x\"").unwrap_err();
        assert!(err.to_string().contains("bad.toml"));
    }
}
