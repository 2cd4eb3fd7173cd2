//! Loading `PcallConfig` from disk and the environment

use crate::components::{ClientConfig, ServerConfig};
use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Top-level configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PcallConfig {
    pub server: ServerConfig,
    pub client: ClientConfig,
}

/// Default config file location: `<config dir>/pcall/config.toml`
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join("pcall")
        .join("config.toml")
}

impl PcallConfig {
    /// Load from a TOML or JSON file, chosen by extension.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config: PcallConfig = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&contents)?,
            Some("toml") | None => toml::from_str(&contents)?,
            Some(other) => return Err(ConfigError::UnsupportedFormat(other.to_string())),
        };

        config.validate()?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Load from `path`, or the default path, falling back to defaults when the
    /// file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(default_config_path);

        if path.exists() {
            Self::load_from_file(&path)
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Apply `PCALL_HOST`, `PCALL_PORT` and `PCALL_URL` from the process
    /// environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("PCALL_HOST") {
            debug!(%host, "Overriding server host from environment");
            self.server.host = host;
        }

        if let Some(port) = lookup("PCALL_PORT") {
            match port.parse::<u16>() {
                Ok(port) => self.server.port = port,
                Err(_) => {
                    warn!(%port, "Invalid PCALL_PORT");
                    return Err(ConfigError::Invalid(format!("PCALL_PORT={}", port)));
                }
            }
        }

        if let Some(url) = lookup("PCALL_URL") {
            self.client.url = url;
        }

        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.client.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{BatchConfig, LinkMode};
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_toml() {
        let tmp = TempDir::new().unwrap();
        let path = write(
            &tmp,
            "config.toml",
            r#"
            [server]
            port = 9100
            prune_empty_channels = true

            [client]
            url = "http://localhost:9100/rpc"
            link = { mode = "batch", max = 5, timeout_ms = 50 }
            "#,
        );

        let config = PcallConfig::load_from_file(&path).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.endpoint, "/rpc");
        assert!(config.server.prune_empty_channels);
        assert_eq!(
            config.client.link,
            LinkMode::Batch(BatchConfig {
                max: 5,
                timeout_ms: 50
            })
        );
    }

    #[test]
    fn test_load_json() {
        let tmp = TempDir::new().unwrap();
        let path = write(
            &tmp,
            "config.json",
            r#"{ "server": { "host": "0.0.0.0" } }"#,
        );

        let config = PcallConfig::load_from_file(&path).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.client, ClientConfig::default());
    }

    #[test]
    fn test_unsupported_extension() {
        let tmp = TempDir::new().unwrap();
        let path = write(&tmp, "config.ini", "port=1");
        assert!(matches!(
            PcallConfig::load_from_file(&path),
            Err(ConfigError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_invalid_file_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = write(&tmp, "config.toml", "[server]\nendpoint = \"rpc\"\n");
        assert!(matches!(
            PcallConfig::load_from_file(&path),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = PcallConfig::load_or_default(Some(&tmp.path().join("absent.toml"))).unwrap();
        assert_eq!(config, PcallConfig::default());
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("PCALL_HOST", "0.0.0.0"),
            ("PCALL_PORT", "7000"),
            ("PCALL_URL", "http://example.test/rpc"),
        ]
        .into_iter()
        .collect();

        let mut config = PcallConfig::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.server.bind_address(), "0.0.0.0:7000");
        assert_eq!(config.client.url, "http://example.test/rpc");
    }

    #[test]
    fn test_bad_port_override() {
        let mut config = PcallConfig::default();
        let result = config.apply_overrides(|key| (key == "PCALL_PORT").then(|| "http".to_string()));
        assert!(result.is_err());
        assert_eq!(config.server.port, 8000);
    }

    #[test]
    fn test_default_path() {
        let path = default_config_path();
        assert!(path.ends_with("pcall/config.toml"));
    }
}
