//! Optional configuration file
//!
//! ```toml
//! [client]
//! host = "192.168.1.10"
//! port = 69
//! timeout = "2s"
//! max_retry = 3
//!
//! [server]
//! bind = "0.0.0.0"
//! port = 6969
//! path = "/srv/tftp"
//! timeout = "3s"
//! ```
//!
//! Every key is optional; command line flags take precedence.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub client: ClientSection,
    #[serde(default)]
    pub server: ServerSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientSection {
    pub host: Option<String>,
    pub port: Option<u16>,
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
    pub max_retry: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    pub bind: Option<String>,
    pub port: Option<u16>,
    pub path: Option<PathBuf>,
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
    pub max_retry: Option<u32>,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load `path` when given, defaults otherwise
    pub fn load_optional(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_sections() {
        let config = AppConfig::parse(
            r#"
            [client]
            host = "10.0.0.2"
            timeout = "1500ms"

            [server]
            bind = "0.0.0.0"
            port = 6969
            path = "/srv/tftp"
            timeout = "2s"
            max_retry = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.client.host.as_deref(), Some("10.0.0.2"));
        assert_eq!(config.client.timeout, Some(Duration::from_millis(1500)));
        assert_eq!(config.client.port, None);
        assert_eq!(config.server.port, Some(6969));
        assert_eq!(config.server.path, Some(PathBuf::from("/srv/tftp")));
        assert_eq!(config.server.timeout, Some(Duration::from_secs(2)));
        assert_eq!(config.server.max_retry, Some(5));
    }

    #[test]
    fn empty_file_is_all_defaults() {
        let config = AppConfig::parse("").unwrap();
        assert!(config.client.host.is_none());
        assert!(config.server.timeout.is_none());
    }

    #[test]
    fn rejects_unknown_keys_and_bad_durations() {
        assert!(AppConfig::parse("[client]\nblksize = 1024\n").is_err());
        assert!(AppConfig::parse("[server]\ntimeout = \"soon\"\n").is_err());
    }

    #[test]
    fn loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tftp-lite.toml");
        std::fs::write(&path, "[server]\nport = 1069\n").unwrap();

        let config = AppConfig::load_optional(Some(&path)).unwrap();
        assert_eq!(config.server.port, Some(1069));
        assert!(AppConfig::load(&dir.path().join("missing.toml")).is_err());
    }
}
