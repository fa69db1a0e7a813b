use crate::{
    environment::{DiscoverySettings, HOSTNAME_ENV},
    error::{CoreError, Result},
    harvest::{Harvester, DEFAULT_QUEUE_CAPACITY},
    ups::nut::DEFAULT_PORT,
};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::warn;

/// Exporter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the HTTP endpoint binds to
    pub listen_address: String,

    /// Host probed for external round-trip time
    pub ping_target: String,

    /// `host:port` of the UPS daemon
    pub ups_address: String,

    /// Connect/read timeout for the UPS daemon in milliseconds
    pub ups_timeout_ms: u64,

    /// Fixed hostname; skips discovery when set. A non-empty `HOSTNAME` in the
    /// environment still wins and is re-read on every rediscovery.
    pub hostname: Option<String>,

    /// Seconds between environment rediscoveries
    pub env_validity_secs: u64,

    /// Seconds between volume list refreshes
    pub volume_validity_secs: u64,

    /// Deadline for all sources of one scrape in milliseconds; 0 waits forever
    pub source_timeout_ms: u64,

    /// Capacity of the harvest delivery queue
    pub queue_capacity: usize,

    pub net_dir: PathBuf,
    pub dev_dir: PathBuf,
    pub flashcache_stats_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0:9094".to_string(),
            ping_target: "1.1.1.1".to_string(),
            ups_address: format!("localhost:{}", DEFAULT_PORT),
            ups_timeout_ms: 2000,
            hostname: None,
            env_validity_secs: 5 * 60,
            volume_validity_secs: 60,
            source_timeout_ms: 10_000,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            net_dir: PathBuf::from("/sys/class/net"),
            dev_dir: PathBuf::from("/dev"),
            flashcache_stats_path: PathBuf::from("/proc/flashcache/CG0/flashcache_stats"),
        }
    }
}

impl Config {
    /// Load configuration from multiple sources in order of preference:
    /// 1. CLI arguments override everything
    /// 2. JSON config file if specified, else the first default location found
    /// 3. Built-in defaults
    pub fn load(cli_config: Option<&CliConfig>, json_path: Option<&Path>) -> Result<Self> {
        let mut config = match json_path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::load_default_config()?.unwrap_or_default(),
        };

        if let Some(cli) = cli_config {
            config.apply_cli_overrides(cli);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific JSON file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| CoreError::config(format!("Failed to read config file {}: {}", path.display(), e)))?;

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| CoreError::config(format!("Failed to parse config file {}: {}", path.display(), e)))?;

        Ok(config)
    }

    /// Load configuration from default locations
    fn load_default_config() -> Result<Option<Self>> {
        for path in Self::default_config_paths() {
            if path.exists() {
                match Self::load_from_file(&path) {
                    Ok(config) => return Ok(Some(config)),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Failed to load config");
                        continue;
                    }
                }
            }
        }

        Ok(None)
    }

    /// Get default configuration file search paths
    fn default_config_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("qnapexporter").join("config.json"));
        }

        if let Some(home_dir) = dirs::home_dir() {
            paths.push(home_dir.join(".qnapexporter.json"));
        }

        paths.push(PathBuf::from("qnapexporter.json"));

        paths
    }

    /// Apply CLI argument overrides
    fn apply_cli_overrides(&mut self, cli: &CliConfig) {
        if let Some(listen) = &cli.listen_address {
            self.listen_address = listen.clone();
        }
        if let Some(target) = &cli.ping_target {
            self.ping_target = target.clone();
        }
        if let Some(ups) = &cli.ups_address {
            self.ups_address = ups.clone();
        }
        if let Some(timeout) = cli.source_timeout_ms {
            self.source_timeout_ms = timeout;
        }
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        self.listen_address.parse::<SocketAddr>().map_err(|e| {
            CoreError::config(format!("Invalid listen address {:?}: {}", self.listen_address, e))
        })?;

        if self.ping_target.trim().is_empty() {
            return Err(CoreError::config("Ping target must not be empty"));
        }

        if self.queue_capacity == 0 {
            return Err(CoreError::config("Queue capacity must be at least 1"));
        }

        if self.env_validity_secs == 0 || self.volume_validity_secs == 0 {
            return Err(CoreError::config("Cache validity must be at least 1 second"));
        }

        Ok(())
    }

    pub fn source_timeout(&self) -> Option<Duration> {
        (self.source_timeout_ms > 0).then(|| Duration::from_millis(self.source_timeout_ms))
    }

    pub fn ups_timeout(&self) -> Duration {
        Duration::from_millis(self.ups_timeout_ms)
    }

    pub fn discovery_settings(&self) -> DiscoverySettings {
        DiscoverySettings {
            hostname_env: Some(HOSTNAME_ENV.to_string()),
            hostname_override: self.hostname.clone(),
            search_path: None,
            net_dir: self.net_dir.clone(),
            dev_dir: self.dev_dir.clone(),
            validity: Duration::from_secs(self.env_validity_secs),
            volume_validity: Duration::from_secs(self.volume_validity_secs),
        }
    }

    pub fn harvester(&self) -> Harvester {
        Harvester::new(self.queue_capacity, self.source_timeout())
    }
}

/// CLI configuration (temporary struct for CLI parsing)
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub listen_address: Option<String>,
    pub ping_target: Option<String>,
    pub ups_address: Option<String>,
    pub source_timeout_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"ping_target": "8.8.8.8", "queue_capacity": 8}}"#).unwrap();

        let config = Config::load_from_file(file.path()).unwrap();
        assert_eq!(config.ping_target, "8.8.8.8");
        assert_eq!(config.queue_capacity, 8);
        assert_eq!(config.env_validity_secs, 300);
    }

    #[test]
    fn test_malformed_file_is_a_config_error() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        assert!(matches!(Config::load_from_file(file.path()), Err(CoreError::Config(_))));
    }

    #[test]
    fn test_overrides() {
        let mut config = Config {
            hostname: Some("nas-file".to_string()),
            ..Config::default()
        };
        config.apply_cli_overrides(&CliConfig {
            ping_target: Some("example.org".to_string()),
            source_timeout_ms: Some(0),
            ..CliConfig::default()
        });

        assert_eq!(config.ping_target, "example.org");
        assert_eq!(config.source_timeout(), None);

        let settings = config.discovery_settings();
        assert_eq!(settings.hostname_override.as_deref(), Some("nas-file"));
        assert_eq!(settings.hostname_env.as_deref(), Some(HOSTNAME_ENV));
    }

    #[test]
    fn test_validation() {
        assert!(Config::default().validate().is_ok());

        let bad_listen = Config {
            listen_address: "nowhere".to_string(),
            ..Config::default()
        };
        assert!(bad_listen.validate().is_err());

        let no_queue = Config {
            queue_capacity: 0,
            ..Config::default()
        };
        assert!(no_queue.validate().is_err());
    }
}
