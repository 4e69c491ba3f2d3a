//! LeafGuard CLI
//!
//! The `leafguard` command talks to a running `leafguardd`.
//!
//! ## Commands
//!
//! - `climate`: push a temperature / humidity pair
//! - `process`: push a soil-moisture reading and print the decision
//! - `force-spray`: queue a manual spray
//! - `status`: show the current verdict, sensors and pump state
//! - `logs`: show the activity log
//! - `check-config`: validate a config file and print the effective settings

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use leafguard_core::telemetry::level_for_verbosity;
use leafguard_core::{init_tracing, LeafguardConfig};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::debug;

#[derive(Parser)]
#[command(name = "leafguard")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Client for the LeafGuard irrigation daemon", long_about = None)]
struct Cli {
    /// Daemon base URL
    #[arg(long, global = true, env = "LEAFGUARD_URL", default_value = "http://127.0.0.1:5000")]
    server: String,

    /// Print raw JSON responses
    #[arg(long, global = true)]
    raw: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Increase log verbosity
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Push a DHT22 reading
    Climate {
        /// Air temperature in °C
        #[arg(short, long, allow_negative_numbers = true)]
        temperature: f64,

        /// Relative humidity in percent
        #[arg(short = 'H', long)]
        humidity: f64,
    },

    /// Push a soil-moisture reading and run one decision cycle
    Process {
        /// Soil moisture in percent
        #[arg(short, long)]
        moisture: f64,
    },

    /// Queue a one-shot manual spray
    ForceSpray,

    /// Show current status
    Status,

    /// Show recent activity
    Logs {
        /// Only show the newest N entries
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Validate a configuration file
    CheckConfig {
        /// Path to the TOML file (defaults only when omitted)
        path: Option<PathBuf>,
    },
}

struct DaemonClient {
    base: String,
    http: reqwest::Client,
}

impl DaemonClient {
    fn new(base: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("leafguard-cli/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            base: base.trim_end_matches('/').to_string(),
            http,
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{path}", self.base);
        debug!(url = %url, "GET");
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("failed to reach {url}"))?;
        Self::decode(response).await
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T> {
        let url = format!("{}{path}", self.base);
        debug!(url = %url, "POST");
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("failed to reach {url}"))?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body: Value = response.json().await.unwrap_or(Value::Null);
            match body.get("error").and_then(Value::as_str) {
                Some(message) => bail!("daemon returned {status}: {message}"),
                None => bail!("daemon returned {status}"),
            }
        }
        response.json().await.context("invalid response body")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json, level_for_verbosity(cli.verbose));

    let client = DaemonClient::new(&cli.server)?;
    let output = match cli.command {
        Commands::CheckConfig { path } => return cmd_check_config(path.as_deref()),
        Commands::Climate {
            temperature,
            humidity,
        } => {
            client
                .post::<Value>(
                    "/dht22",
                    &json!({ "temperature": temperature, "humidity": humidity }),
                )
                .await?
        }
        Commands::Process { moisture } => {
            client
                .post::<Value>("/process", &json!({ "moisture": moisture }))
                .await?
        }
        Commands::ForceSpray => client.post::<Value>("/force_spray", &json!({})).await?,
        Commands::Status => client.get::<Value>("/status").await?,
        Commands::Logs { limit } => {
            let entries: Vec<Value> = client.get("/logs").await?;
            Value::Array(tail(entries, limit))
        }
    };

    if cli.raw {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{}", render(&output));
    }
    Ok(())
}

fn cmd_check_config(path: Option<&std::path::Path>) -> Result<()> {
    let config = LeafguardConfig::load(path).context("configuration is invalid")?;
    let text = toml::to_string_pretty(&config).context("failed to render configuration")?;
    println!("{text}");
    Ok(())
}

fn tail(mut entries: Vec<Value>, limit: Option<usize>) -> Vec<Value> {
    if let Some(limit) = limit {
        let skip = entries.len().saturating_sub(limit);
        entries.drain(..skip);
    }
    entries
}

/// Human-readable rendering of a daemon response.
fn render(value: &Value) -> String {
    match value {
        Value::Array(entries) => entries
            .iter()
            .map(|e| {
                format!(
                    "{} [{}] {}",
                    e["time"].as_str().unwrap_or("-"),
                    e["type"].as_str().unwrap_or("info"),
                    e["message"].as_str().unwrap_or_default()
                )
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Object(fields) => fields
            .iter()
            .filter(|(_, v)| !v.is_object())
            .map(|(k, v)| match v {
                Value::String(s) => format!("{k:<28} {s}"),
                Value::Null => format!("{k:<28} -"),
                other => format!("{k:<28} {other}"),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}
