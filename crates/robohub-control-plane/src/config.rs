use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};
use tracing::info;

pub const IN_MEMORY_DB: &str = ":memory:";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub robot_defaults: RobotDefaults,
    pub robots: BTreeMap<String, RobotEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub db_path: PathBuf,
    pub event_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8800,
            db_path: PathBuf::from("./var/robohub-control-plane.db"),
            event_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RobotDefaults {
    pub request_timeout_ms: u64,
    pub secret_header: String,
}

impl Default for RobotDefaults {
    fn default() -> Self {
        Self { request_timeout_ms: 5_000, secret_header: "X-Secret".to_string() }
    }
}

/// One physical robot, keyed by serial number in `[robots.<serial>]`.
#[derive(Debug, Clone, Deserialize)]
pub struct RobotEntry {
    pub base_url: String,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl Config {
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("robohub").join("control-plane.toml"))
    }

    /// An explicit path must exist; the default path is optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::read(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::read(&path),
            _ => Ok(Self::default()),
        }
    }

    fn read(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config = Self::from_toml_str(&raw)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        info!(path = %path.display(), robots = config.robots.len(), "loaded config");
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        let mut config: Self = toml::from_str(raw)?;
        for entry in config.robots.values_mut() {
            entry.base_url = entry.base_url.trim_end_matches('/').to_string();
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_yields_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.server.port, 8800);
        assert_eq!(config.server.event_capacity, 64);
        assert_eq!(config.robot_defaults.request_timeout_ms, 5_000);
        assert!(config.robots.is_empty());
    }

    #[test]
    fn robots_are_keyed_by_serial_and_trimmed() {
        let config = Config::from_toml_str(
            r#"
            [server]
            port = 9100
            db_path = ":memory:"

            [robots.L382502104987ir]
            base_url = "http://10.0.0.12:8090/"
            secret = "s3cret"
            name = "Laundry 1"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.db_path, PathBuf::from(IN_MEMORY_DB));
        let robot = &config.robots["L382502104987ir"];
        assert_eq!(robot.base_url, "http://10.0.0.12:8090");
        assert_eq!(robot.secret.as_deref(), Some("s3cret"));
    }

    #[test]
    fn explicit_path_is_read_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[robot_defaults]\nrequest_timeout_ms = 750").unwrap();
        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.robot_defaults.request_timeout_ms, 750);
        assert_eq!(config.robot_defaults.secret_header, "X-Secret");
    }

    #[test]
    fn missing_explicit_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load(Some(&dir.path().join("nope.toml"))).is_err());
    }
}
