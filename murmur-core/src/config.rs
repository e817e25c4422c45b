//! Configuration types for the murmur core

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{MurmurError, Result};

/// Main configuration for the engagement and memory core
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MurmurConfig {
    /// Heartbeat/tension state machine configuration
    pub engagement: EngagementConfig,

    /// Context window configuration
    pub context: ContextConfig,

    /// Durable memory log configuration
    pub memory: MemoryConfig,

    /// Engagement store configuration
    pub store: StoreConfig,

    /// Orchestrator configuration
    pub workflow: WorkflowConfig,
}

/// Heartbeat and tension configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngagementConfig {
    /// Upper bound of the heartbeat scalar
    pub max_heartbeat: f64,

    /// Heartbeat after the first unaddressed message out of Idle
    pub wakeup_growth: f64,

    /// Heartbeat increment per unaddressed message while Warming
    pub idle_growth: f64,

    /// Boost applied on a mention or related follow-up
    pub tense_boost: f64,

    /// Floor the boost is applied on top of
    pub tense_floor: f64,

    /// Fixed hold after an explicit mention
    #[serde(with = "humantime_serde")]
    pub tense_hold: Duration,

    /// How long a spontaneous invocation waits for a related follow-up
    #[serde(with = "humantime_serde")]
    pub relevance_window: Duration,
}

impl Default for EngagementConfig {
    fn default() -> Self {
        Self {
            max_heartbeat: 100.0,
            wakeup_growth: 6.0,
            idle_growth: 2.0,
            tense_boost: 24.0,
            tense_floor: 60.0,
            tense_hold: Duration::from_secs(900),
            relevance_window: Duration::from_secs(120),
        }
    }
}

/// Context window configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Maximum messages kept per scope
    pub capacity: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self { capacity: 100 }
    }
}

/// Memory log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Path of the JSON-lines memory log
    pub log_path: PathBuf,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            log_path: PathBuf::from("./data/memory_pool.jsonl"),
        }
    }
}

/// Engagement store backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreConfig {
    /// SQLite database on disk
    Sqlite {
        /// Database file path
        path: PathBuf,
    },

    /// Process-local, lost on restart
    Memory,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::Sqlite {
            path: PathBuf::from("./data/engagement.db"),
        }
    }
}

/// Orchestrator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Scope ids or scope keys allowed to reach the pipeline (empty = all)
    pub allowed_scopes: Vec<String>,

    /// Upper bound on a single agent call
    #[serde(with = "humantime_serde")]
    pub agent_timeout: Duration,

    /// Sender name used when replies are remembered
    pub agent_name: String,

    /// Prefix that marks a structured command
    pub command_prefix: String,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            allowed_scopes: Vec::new(),
            agent_timeout: Duration::from_secs(30),
            agent_name: "assistant".to_string(),
            command_prefix: "/".to_string(),
        }
    }
}

/// Builder for MurmurConfig
pub struct ConfigBuilder {
    config: MurmurConfig,
}

impl ConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self {
            config: MurmurConfig::default(),
        }
    }

    /// Set engagement configuration
    pub fn engagement(mut self, config: EngagementConfig) -> Self {
        self.config.engagement = config;
        self
    }

    /// Set context configuration
    pub fn context(mut self, config: ContextConfig) -> Self {
        self.config.context = config;
        self
    }

    /// Set memory configuration
    pub fn memory(mut self, config: MemoryConfig) -> Self {
        self.config.memory = config;
        self
    }

    /// Set store configuration
    pub fn store(mut self, config: StoreConfig) -> Self {
        self.config.store = config;
        self
    }

    /// Set workflow configuration
    pub fn workflow(mut self, config: WorkflowConfig) -> Self {
        self.config.workflow = config;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<MurmurConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MurmurConfig {
    /// Load configuration from file and environment variables.
    ///
    /// Loads in this order:
    /// 1. Default configuration
    /// 2. `murmur.toml` in the working directory
    /// 3. The file named by `MURMUR_CONFIG_PATH`
    /// 4. `MURMUR_` environment overrides (`MURMUR_CONTEXT__CAPACITY=50`)
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration file is invalid or validation fails.
    pub fn load() -> Result<Self> {
        use figment::{
            Figment,
            providers::{Env, Format, Toml},
        };

        let mut figment = Figment::new().merge(Toml::file("murmur.toml"));

        if let Ok(path) = std::env::var("MURMUR_CONFIG_PATH") {
            figment = figment.merge(Toml::file(path));
        }

        let config: MurmurConfig = figment
            .merge(Env::prefixed("MURMUR_").ignore(&["CONFIG_PATH"]).split("__"))
            .extract()
            .map_err(|e| {
                MurmurError::Configuration(format!("Failed to load configuration: {}", e))
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        use figment::{
            Figment,
            providers::{Format, Toml},
        };

        let path = path.as_ref();
        if !path.exists() {
            return Err(MurmurError::Configuration(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        let config: MurmurConfig = Figment::new()
            .merge(Toml::file(path))
            .extract()
            .map_err(|e| {
                MurmurError::Configuration(format!("Failed to load configuration file: {}", e))
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any bound is unusable.
    pub fn validate(&self) -> Result<()> {
        let engagement = &self.engagement;
        if engagement.max_heartbeat <= 0.0 || !engagement.max_heartbeat.is_finite() {
            return Err(MurmurError::Configuration(
                "engagement.max_heartbeat must be positive".to_string(),
            ));
        }
        for (name, value) in [
            ("wakeup_growth", engagement.wakeup_growth),
            ("idle_growth", engagement.idle_growth),
            ("tense_boost", engagement.tense_boost),
            ("tense_floor", engagement.tense_floor),
        ] {
            if value < 0.0 || !value.is_finite() {
                return Err(MurmurError::Configuration(format!(
                    "engagement.{} must be a non-negative number",
                    name
                )));
            }
        }
        if engagement.tense_hold.is_zero() {
            return Err(MurmurError::Configuration(
                "engagement.tense_hold must be non-zero".to_string(),
            ));
        }
        if engagement.relevance_window.is_zero() {
            return Err(MurmurError::Configuration(
                "engagement.relevance_window must be non-zero".to_string(),
            ));
        }
        if self.context.capacity == 0 {
            return Err(MurmurError::Configuration(
                "context.capacity must be at least 1".to_string(),
            ));
        }
        if self.workflow.agent_timeout.is_zero() {
            return Err(MurmurError::Configuration(
                "workflow.agent_timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
