use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure for checkpoint-flow
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FlowConfig {
    /// Transition engine settings
    pub engine: EngineConfig,
    /// Event fan-out settings
    pub fanout: FanoutConfig,
    /// Observability settings
    pub observability: ObservabilityConfig,
    /// Database settings (optional)
    pub database: Option<DatabaseConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Deadline applied when a caller does not supply one
    pub default_deadline_ms: u64,
    /// How many times a lost conditional write is re-read and retried
    pub conflict_retries: u32,
    /// Upper bound on waiting for the activity sink after a commit
    pub side_effect_timeout_ms: u64,
}

impl EngineConfig {
    pub fn default_deadline(&self) -> Duration {
        Duration::from_millis(self.default_deadline_ms)
    }

    pub fn side_effect_timeout(&self) -> Duration {
        Duration::from_millis(self.side_effect_timeout_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_deadline_ms: 5_000,
            conflict_retries: 1,
            side_effect_timeout_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FanoutConfig {
    /// Buffered events per work order channel
    pub channel_capacity: usize,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self { channel_capacity: 100 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level used when RUST_LOG is not set
    pub log_level: String,
    /// Emit JSON lines instead of human readable logs
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Database URL (SQLite file path or connection string)
    pub url: String,
    /// Maximum connections in pool
    pub max_connections: u32,
    /// Enable automatic migrations
    pub auto_migrate: bool,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            fanout: FanoutConfig::default(),
            observability: ObservabilityConfig::default(),
            database: None,
        }
    }
}

impl FlowConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration file (checkpoint-flow.toml)
    /// 3. Environment variables (prefixed with CHECKPOINT_FLOW_)
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("checkpoint-flow.toml"))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let defaults = Config::try_from(&FlowConfig::default())?;
        let mut builder = Config::builder().add_source(defaults);

        if path.exists() {
            builder = builder.add_source(File::from(path));
        }

        // Double underscore separates nesting so field names keep their underscores
        builder = builder.add_source(
            Environment::with_prefix("CHECKPOINT_FLOW")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}
