use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fs;
use std::path::PathBuf;
use tracing::info;

use tracker_collector::config::Config;
use tracker_collector::observability::{self, init_logging};
use tracker_collector::pipeline::collector::Collector;
use tracker_collector::pipeline::ingestion::request::{HttpMethod, RawRequest, RequestHeaders};
use tracker_collector::server::{run_server, AppState};

#[derive(Parser)]
#[command(name = "tracker-collector")]
#[command(about = "Collects JavaScript-tracker analytics hits and normalizes them into wide rows")]
#[command(version)]
struct Cli {
    /// Config file (defaults to $COLLECTOR_CONFIG, then ./config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP collector
    Serve {
        /// Port to listen on, overriding the config file
        #[arg(long)]
        port: Option<u16>,
    },
    /// Normalize a captured request and print one JSON line per event
    Normalize {
        /// JSON file with `method`, `query`, `body`, and `headers`
        request: PathBuf,
    },
}

/// A captured request as stored in fixture files.
#[derive(Debug, Deserialize)]
struct RequestFixture {
    method: HttpMethod,
    #[serde(default)]
    query: String,
    /// Either the raw body text or an inline JSON document.
    #[serde(default)]
    body: Option<Value>,
    #[serde(default)]
    headers: RequestHeaders,
}

impl RequestFixture {
    fn into_request(self) -> RawRequest {
        let body = match self.body {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::String(text)) => text.into_bytes(),
            Some(other) => other.to_string().into_bytes(),
        };
        RawRequest {
            method: self.method,
            query: self.query,
            body,
            headers: self.headers,
        }
    }
}

fn normalize(config: &Config, path: &PathBuf) -> anyhow::Result<()> {
    let content = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let fixture: RequestFixture =
        serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;

    let collector = Collector::new(
        std::sync::Arc::new(config.schema_registry()),
        config.contexts.duplicate_policy,
    );
    let batch = match collector.process(&fixture.into_request()) {
        Ok(batch) => batch,
        Err(e) => bail!("request rejected: {}", e),
    };

    for outcome in &batch.outcomes {
        let line = match &outcome.result {
            Ok(row) => json!({"index": outcome.index, "row": row}),
            Err(e) => json!({"index": outcome.index, "error": e.to_string()}),
        };
        println!("{}", line);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    init_logging(&config.logging);

    match cli.command {
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            observability::init()?;
            let state = AppState::from_config(&config).await?;
            info!("Sink: {}", state.sink.name());
            run_server(&config, state).await?;
        }
        Commands::Normalize { request } => normalize(&config, &request)?,
    }

    Ok(())
}
