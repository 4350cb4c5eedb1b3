use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config, Environment, File as ConfigFile};
use serde::Deserialize;

pub const ENV_PREFIX: &str = "PEERHTTP";

const LOG_FORMATS: [&str; 2] = ["pretty", "json"];

/// Announce tiers appended to every tracked session.
pub fn default_peer_hints() -> Vec<Vec<String>> {
    [
        vec![
            "udp://opentor.org:2710",
            "https://bt.t-ru.org/ann?magnet",
            "http://bt.t-ru.org/ann?magnet",
        ],
        vec!["udp://tracker.coppersurfer.tk:6969/announce"],
        vec!["http://retracker.local/announce"],
    ]
    .into_iter()
    .map(|tier| tier.into_iter().map(str::to_string).collect())
    .collect()
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 80,
            request_timeout_secs: 60,
            cors_origins: vec!["*".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Work directory. Unset means a temporary directory removed at shutdown.
    pub data_dir: Option<PathBuf>,
    pub open_timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            open_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub library_dir: Option<PathBuf>,
    pub peer_hints: Vec<Vec<String>>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            library_dir: None,
            peer_hints: default_peer_hints(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub listen: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: "127.0.0.1:9100".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub engine: EngineConfig,
    pub log: LogConfig,
    pub metrics: MetricsConfig,
}

impl AppConfig {
    /// Defaults, then the optional file, then `PEERHTTP_*` variables
    /// (`PEERHTTP_SERVER__PORT=8080`).
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = config_path {
            if !path.exists() {
                anyhow::bail!(
                    "Configuration file {} not found (specified via --config)",
                    path.display()
                );
            }
            builder = builder.add_source(ConfigFile::from(path));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("server.cors_origins")
                .try_parsing(true),
        );

        builder
            .build()
            .context("failed to read configuration")?
            .try_deserialize()
            .context("invalid configuration")
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.host.trim().is_empty() {
            anyhow::bail!("server.host must not be empty");
        }
        if self.server.port == 0 {
            anyhow::bail!("server.port must be greater than zero");
        }
        if self.server.request_timeout_secs == 0 {
            anyhow::bail!("server.request_timeout_secs must be greater than zero");
        }
        if self.storage.open_timeout_secs == 0 {
            anyhow::bail!("storage.open_timeout_secs must be greater than zero");
        }
        if !LOG_FORMATS.contains(&self.log.format.as_str()) {
            anyhow::bail!(
                "log.format must be one of {:?}, got '{}'",
                LOG_FORMATS,
                self.log.format
            );
        }
        if self.metrics.enabled && self.metrics.listen.parse::<std::net::SocketAddr>().is_err() {
            anyhow::bail!("metrics.listen '{}' is not a socket address", self.metrics.listen);
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn apply_overrides(&mut self, matches: &clap::ArgMatches) {
        if let Some(host) = matches.get_one::<String>("host") {
            self.server.host = host.clone();
        }
        if let Some(port) = matches.get_one::<u16>("port") {
            self.server.port = *port;
        }
        if let Some(timeout) = matches.get_one::<u64>("request-timeout-secs") {
            self.server.request_timeout_secs = *timeout;
        }
        if let Some(data_dir) = matches.get_one::<String>("data-dir") {
            self.storage.data_dir = Some(PathBuf::from(data_dir));
        }
        if let Some(library_dir) = matches.get_one::<String>("library-dir") {
            self.engine.library_dir = Some(PathBuf::from(library_dir));
        }
        if let Some(log_level) = matches.get_one::<String>("log-level") {
            self.log.level = log_level.clone();
        }
        if let Some(log_format) = matches.get_one::<String>("log-format") {
            self.log.format = log_format.clone();
        }
        if matches.get_flag("disable-metrics") {
            self.metrics.enabled = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.bind_addr(), "0.0.0.0:80");
        assert_eq!(config.engine.peer_hints.len(), 3);
        assert_eq!(config.storage.open_timeout_secs, 5);
        assert!(config.storage.data_dir.is_none());
    }

    #[test]
    fn file_values_override_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 8080
cors_origins = ["http://a.test"]

[storage]
data_dir = "/var/lib/peerhttp"

[engine]
peer_hints = [["udp://only.test:80"]]

[log]
format = "json"
"#
        )
        .unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.cors_origins, vec!["http://a.test"]);
        assert_eq!(
            config.storage.data_dir.as_deref(),
            Some(Path::new("/var/lib/peerhttp"))
        );
        assert_eq!(config.engine.peer_hints, vec![vec!["udp://only.test:80".to_string()]]);
        assert_eq!(config.log.format, "json");
        config.validate().unwrap();
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = AppConfig::load(Some(Path::new("/nonexistent/peerhttp.toml"))).unwrap_err();
        assert!(err.to_string().contains("not found"), "unexpected error: {err}");
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().unwrap_err().to_string().contains("port"));

        let mut config = AppConfig::default();
        config.server.request_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.log.format = "xml".to_string();
        assert!(config.validate().unwrap_err().to_string().contains("log.format"));

        let mut config = AppConfig::default();
        config.metrics.enabled = true;
        config.metrics.listen = "nowhere".to_string();
        assert!(config.validate().is_err());
    }
}
