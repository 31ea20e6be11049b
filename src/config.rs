use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{CollectorError, Result};
use crate::pipeline::processing::context::DuplicatePolicy;
use crate::pipeline::processing::schema_registry::{CustomSchemas, SchemaRegistry};

const DEFAULT_CONFIG_PATH: &str = "config.toml";
const CONFIG_PATH_ENV: &str = "COLLECTOR_CONFIG";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub schemas: CustomSchemas,
    pub contexts: ContextsConfig,
    pub sink: SinkConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub post_endpoint: String,
    pub get_endpoint: String,
    pub post_aliases: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            post_endpoint: "/com.snowplowanalytics.snowplow/tp2".to_string(),
            get_endpoint: "/i".to_string(),
            post_aliases: vec!["/tracker".to_string()],
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ContextsConfig {
    pub duplicate_policy: DuplicatePolicy,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    #[default]
    Memory,
    JsonLines,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    pub kind: SinkKind,
    /// Output file for the `json_lines` sink.
    pub path: PathBuf,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            kind: SinkKind::Memory,
            path: PathBuf::from("data/rows.jsonl"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// JSON console output instead of human-readable lines.
    pub json: bool,
    /// Directory for daily-rotated log files. No file output when unset.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "tracker_collector=info,tower_http=info".to_string(),
            json: false,
            directory: None,
        }
    }
}

impl Config {
    /// Loads configuration from `path`, else `$COLLECTOR_CONFIG`, else
    /// `config.toml`. A missing default file yields the defaults; a missing
    /// file that was asked for explicitly is an error. Environment overrides
    /// are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenv::dotenv().ok();

        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from));

        let mut config = match explicit {
            Some(path) => Self::from_file(&path)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::from_file(Path::new(DEFAULT_CONFIG_PATH))?,
            None => {
                debug!("No config file found, using defaults");
                Self::default()
            }
        };

        config.apply_env_overrides(|key| env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            CollectorError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(host) = var("COLLECTOR_HOST") {
            self.server.host = host;
        }
        if let Some(port) = var("COLLECTOR_PORT") {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|e| CollectorError::Config(format!("Invalid COLLECTOR_PORT '{}': {}", port, e)))?;
        }
        if let Some(level) = var("COLLECTOR_LOG_LEVEL") {
            self.logging.level = level;
        }
        Ok(())
    }

    /// The immutable registry the pipeline components are built from.
    pub fn schema_registry(&self) -> SchemaRegistry {
        SchemaRegistry::new(&self.schemas)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
