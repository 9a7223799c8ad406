//! Configuration file support for agentboard
//!
//! Reads from `~/.agentic-project-board/config.toml` (or `AGENTBOARD_CONFIG`).
//! Every section is optional; missing keys fall back to defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::db::{self, EdgePolicy};
use crate::graph::LayoutConfig;
use crate::watch::WatchOptions;

/// Env var pointing at an explicit config file
pub const CONFIG_PATH_ENV: &str = "AGENTBOARD_CONFIG";

/// Configuration structure
#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq)]
pub struct Config {
    /// State file settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Change notification settings
    #[serde(default)]
    pub watch: WatchOptions,

    /// Dependency graph layout settings
    #[serde(default)]
    pub graph: LayoutConfig,

    /// Dependency edge validation
    #[serde(default)]
    pub dependencies: DependencyConfig,

    /// Tool gateway defaults
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Where the state file lives and how long a writer waits for the lock
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct StoreConfig {
    /// Explicit state file path. `AGENTBOARD_DB_PATH` still wins when set.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// How long a blocked writer retries before failing
    /// Default: 5000
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

/// Dependency edge settings
#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq)]
pub struct DependencyConfig {
    /// Reject self-loops, cross-project edges and cycles on insert
    /// Default: false (edges are advisory)
    #[serde(default)]
    pub strict: bool,
}

/// Defaults applied by the tool gateway
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct GatewayConfig {
    /// Project used when a tool call omits `project_id`
    #[serde(default = "default_project_id")]
    pub default_project_id: i32,

    /// Number of dialogue entries in `get_project_status`
    #[serde(default = "default_recent_activity_limit")]
    pub recent_activity_limit: i64,
}

fn default_project_id() -> i32 {
    1
}

fn default_recent_activity_limit() -> i64 {
    10
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            default_project_id: default_project_id(),
            recent_activity_limit: default_recent_activity_limit(),
        }
    }
}

impl Config {
    /// Load config from the per-user config file.
    /// Returns default config if the file doesn't exist or can't be parsed.
    pub fn load() -> Self {
        let path = Self::config_path();
        let Ok(contents) = std::fs::read_to_string(&path) else {
            return Self::default();
        };
        match toml::from_str(&contents) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring invalid config file");
                Self::default()
            }
        }
    }

    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return PathBuf::from(path);
        }
        db::data_dir().join("config.toml")
    }

    /// Resolve the state file: env var, then config, then the per-user default
    pub fn db_path(&self) -> PathBuf {
        if std::env::var_os(db::DB_PATH_ENV).is_some() {
            return db::Database::db_path();
        }
        match &self.store.path {
            Some(path) => path.clone(),
            None => db::Database::db_path(),
        }
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.store.busy_timeout_ms)
    }

    pub fn edge_policy(&self) -> EdgePolicy {
        if self.dependencies.strict {
            EdgePolicy::Strict
        } else {
            EdgePolicy::Permissive
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watch::WatchBackend;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.store.busy_timeout_ms, 5000);
        assert_eq!(config.watch.debounce_ms, 300);
        assert_eq!(config.watch.poll_interval_ms, 2000);
        assert_eq!(config.gateway.default_project_id, 1);
        assert_eq!(config.edge_policy(), EdgePolicy::Permissive);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[watch]
backend = "poll"
poll_interval_ms = 500

[dependencies]
strict = true

[graph]
rank_sep = 40.0
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.watch.backend, WatchBackend::Poll);
        assert_eq!(config.watch.poll_interval_ms, 500);
        assert_eq!(config.watch.debounce_ms, 300);
        assert_eq!(config.edge_policy(), EdgePolicy::Strict);
        assert_eq!(config.graph.rank_sep, 40.0);
        assert_eq!(config.graph.node_width, 200.0);
    }

    #[test]
    fn test_store_path_from_config() {
        let toml = r#"
[store]
path = "/tmp/board-test.db"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.store.path, Some(PathBuf::from("/tmp/board-test.db")));
    }
}
