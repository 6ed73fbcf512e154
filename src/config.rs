//! sqliteserver Configuration
//!
//! This module provides configuration structures for a sqliteserver node.
//! Every section has defaults, so a missing file yields a single-node leader.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::replication::FollowerEndpoint;

/// Main sqliteserver configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Node role and cluster addresses
    #[serde(default)]
    pub node: NodeConfig,

    /// Embedded database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// HTTP API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Statement replication configuration
    #[serde(default)]
    pub replication: ReplicationConfig,

    /// Write log (audit mode) configuration
    #[serde(default)]
    pub write_log: WriteLogConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Role of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    /// Accepts writes and fans them out to followers
    #[default]
    Leader,
    /// Registers with a leader and receives its statements
    Follower,
}

impl std::fmt::Display for NodeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeRole::Leader => write!(f, "LEADER"),
            NodeRole::Follower => write!(f, "FOLLOWER"),
        }
    }
}

/// Node-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub role: NodeRole,

    /// Leader base URL (e.g. `http://localhost:5050`), required for followers
    #[serde(default)]
    pub leader_address: Option<String>,

    /// Address a follower advertises to the leader; the listen port is appended
    #[serde(default = "default_advertise_address")]
    pub advertise_address: String,
}

/// Embedded database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database file path (`:memory:` for a private in-memory database)
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    /// Number of pooled connections
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// How long a connection waits on a locked database, in milliseconds
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// HTTP API bind address
    #[serde(default = "default_api_address")]
    pub bind_address: String,

    /// Shared secret expected in the `secret` header
    #[serde(default = "default_secret")]
    pub secret: String,

    /// Enable CORS
    #[serde(default)]
    pub cors_enabled: bool,
}

/// Replication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationConfig {
    /// Fan mutating statements out to registered followers (leader only)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Keywords that mark a statement as mutating
    #[serde(default = "default_mutating_keywords")]
    pub mutating_keywords: Vec<String>,

    /// Per-follower request timeout in milliseconds (0 = wait indefinitely)
    #[serde(default)]
    pub request_timeout_ms: u64,
}

/// Write log configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WriteLogConfig {
    /// Append every mutating statement to the `write_log` table
    #[serde(default)]
    pub enabled: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, compact)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_advertise_address() -> String {
    "http://localhost".to_string()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./database.db")
}

fn default_pool_size() -> usize {
    4
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_api_address() -> String {
    "0.0.0.0:5050".to_string()
}

fn default_secret() -> String {
    "secret".to_string()
}

fn default_true() -> bool {
    true
}

fn default_mutating_keywords() -> Vec<String> {
    crate::executor::DEFAULT_MUTATING_KEYWORDS
        .iter()
        .map(|k| k.to_string())
        .collect()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            role: NodeRole::Leader,
            leader_address: None,
            advertise_address: default_advertise_address(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            pool_size: default_pool_size(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_api_address(),
            secret: default_secret(),
            cors_enabled: false,
        }
    }
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mutating_keywords: default_mutating_keywords(),
            request_timeout_ms: 0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: ServerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `path`, falling back to defaults when the file
    /// does not exist
    pub fn load_or_default(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::info!("No configuration at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.api.bind_address.is_empty() {
            return Err(crate::Error::Config("api.bind_address cannot be empty".into()));
        }

        if self.api.secret.is_empty() {
            return Err(crate::Error::Config("api.secret cannot be empty".into()));
        }

        if self.database.pool_size == 0 {
            return Err(crate::Error::Config("database.pool_size must be at least 1".into()));
        }

        if self.replication.mutating_keywords.iter().all(|k| k.trim().is_empty()) {
            return Err(crate::Error::Config(
                "replication.mutating_keywords needs at least one keyword".into(),
            ));
        }

        if self.node.role == NodeRole::Follower
            && self.node.leader_address.as_deref().map_or(true, str::is_empty)
        {
            return Err(crate::Error::Config(
                "node.leader_address is required when node.role = \"follower\"".into(),
            ));
        }

        Ok(())
    }

    /// Replace the port of the API bind address (the `PORT` environment override)
    pub fn override_port(&mut self, port: &str) {
        let port = port.trim();
        if port.is_empty() {
            return;
        }
        let host = match self.api.bind_address.rsplit_once(':') {
            Some((host, _)) => host,
            None => self.api.bind_address.as_str(),
        };
        self.api.bind_address = format!("{}:{}", host, port);
    }

    /// Apply environment overrides
    pub fn apply_env(&mut self) {
        if let Ok(port) = std::env::var("PORT") {
            self.override_port(&port);
        }
    }

    /// Port part of the API bind address
    pub fn listen_port(&self) -> &str {
        self.api
            .bind_address
            .rsplit_once(':')
            .map(|(_, port)| port)
            .unwrap_or("")
    }

    /// Port half of the registration key, in `":<port>"` form
    pub fn registration_port(&self) -> String {
        format!(":{}", self.listen_port())
    }

    /// Endpoint this node announces when registering as a follower
    pub fn follower_endpoint(&self) -> FollowerEndpoint {
        FollowerEndpoint {
            address: self.node.advertise_address.clone(),
            port: self.registration_port(),
        }
    }

    /// Whether this node fans statements out to followers
    pub fn replicates(&self) -> bool {
        self.node.role == NodeRole::Leader && self.replication.enabled
    }

    /// Follower request timeout, if one is configured
    pub fn request_timeout(&self) -> Option<Duration> {
        match self.replication.request_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}
