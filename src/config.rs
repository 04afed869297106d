//! Server configuration: an optional TOML file, defaulted for zero-config
//! startup. Mirrors the pack's config-loading idiom (`serde` + `toml`, no
//! bespoke parser).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_bind() -> String {
    "127.0.0.1:2424".to_string()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("userstore.db")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the HTTP server listens on.
    pub bind: String,
    /// Path to the single-file database.
    pub db_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind: default_bind(),
            db_path: default_db_path(),
        }
    }
}

impl Config {
    /// Load configuration from `path`, if it exists; otherwise return
    /// defaults. Fields absent from the file fall back to their defaults.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Config::default());
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("error while reading config file {path:?}: {e}"))?;
        let config: Config = toml::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("error while parsing config file {path:?}: {e}"))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let config = Config::load("/nonexistent/path/config.toml").unwrap();
        assert_eq!(config.bind, default_bind());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "bind = \"0.0.0.0:9000\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.bind, "0.0.0.0:9000");
        assert_eq!(config.db_path, default_db_path());
    }
}
