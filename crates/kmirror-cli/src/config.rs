//! `kmirror.yaml` loading with environment and flag overrides.
//!
//! Precedence, highest first: command-line flag, environment variable,
//! config file, built-in default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use kmirror_core::{KmError, Result};
use kmirror_search::{CoordinatorConfig, TaskTimeouts};

pub const DEFAULT_CONFIG_FILE: &str = "kmirror.yaml";
pub const DEFAULT_DATABASE: &str = "kmirror.db";

pub const ENV_DATABASE: &str = "KMIRROR_DB";
pub const ENV_SEARCH_HOST: &str = "KMIRROR_SEARCH_HOST";
pub const ENV_SEARCH_API_KEY: &str = "KMIRROR_SEARCH_API_KEY";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub database: Option<PathBuf>,
    pub search: SearchConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchConfig {
    pub host: Option<String>,
    pub api_key: Option<String>,
    pub poll_interval_ms: u64,
    pub timeouts: TaskTimeouts,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            host: None,
            api_key: None,
            poll_interval_ms: 100,
            timeouts: TaskTimeouts::default(),
        }
    }
}

/// Host and key for a search command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchCredentials {
    pub host: String,
    pub api_key: String,
}

impl Config {
    /// Load `path`, or `kmirror.yaml` in the working directory when no path
    /// is given, then apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`KmError::Config`] if an explicit file is missing or any
    /// file fails to parse.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.is_file() {
                    Self::from_file(default)?
                } else {
                    Self::default()
                }
            }
        };
        Ok(config.with_env(|key| std::env::var(key).ok()))
    }

    fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| KmError::Config(format!("read {}: {e}", path.display())))?;
        Self::parse(&text).map_err(|e| KmError::Config(format!("{}: {e}", path.display())))
    }

    /// # Errors
    ///
    /// Returns [`KmError::Config`] on malformed YAML or unknown keys.
    pub fn parse(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).map_err(|e| KmError::Config(e.to_string()))
    }

    /// Override values from `lookup` (normally the process environment).
    /// Empty values are ignored.
    #[must_use]
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        if let Some(db) = get(ENV_DATABASE) {
            self.database = Some(PathBuf::from(db));
        }
        if let Some(host) = get(ENV_SEARCH_HOST) {
            self.search.host = Some(host);
        }
        if let Some(key) = get(ENV_SEARCH_API_KEY) {
            self.search.api_key = Some(key);
        }
        self
    }

    #[must_use]
    pub fn database_path(&self, flag: Option<&Path>) -> PathBuf {
        flag.map(Path::to_path_buf)
            .or_else(|| self.database.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE))
    }

    /// # Errors
    ///
    /// Returns [`KmError::Config`] naming whichever of host or key is unset.
    pub fn search_credentials(&self) -> Result<SearchCredentials> {
        let host = self
            .search
            .host
            .clone()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| missing("search.host", ENV_SEARCH_HOST))?;
        let api_key = self
            .search
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| missing("search.api_key", ENV_SEARCH_API_KEY))?;
        Ok(SearchCredentials { host, api_key })
    }

    #[must_use]
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig::new(
            Duration::from_millis(self.search.poll_interval_ms),
            self.search.timeouts,
        )
    }
}

fn missing(key: &str, env: &str) -> KmError {
    KmError::Config(format!("{key} is not set (config file or {env})"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn parses_full_file() {
        let config = Config::parse(
            "database: /var/lib/kmirror.db\n\
             search:\n  host: http://localhost:7700\n  api_key: masterKey\n  \
             poll_interval_ms: 250\n  timeouts:\n    add_documents: 300\n",
        )
        .unwrap();

        assert_eq!(config.database, Some(PathBuf::from("/var/lib/kmirror.db")));
        assert_eq!(config.search.poll_interval_ms, 250);
        assert_eq!(config.search.timeouts.add_documents, 300);
        assert_eq!(config.search.timeouts.create_index, 30);
        assert_eq!(
            config.coordinator_config().poll_interval(),
            Duration::from_millis(250)
        );
    }

    #[test]
    fn empty_file_is_default() {
        assert_eq!(Config::parse("").unwrap(), Config::default());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = Config::parse("databse: x.db\n").unwrap_err();
        assert!(matches!(err, KmError::Config(_)));
    }

    #[test]
    fn poll_interval_is_clamped() {
        let config = Config::parse("search:\n  poll_interval_ms: 10\n").unwrap();
        assert_eq!(
            config.coordinator_config().poll_interval(),
            Duration::from_millis(100)
        );
    }

    #[test]
    fn env_overrides_file_and_flag_overrides_env() {
        let env: HashMap<&str, &str> = [
            (ENV_DATABASE, "env.db"),
            (ENV_SEARCH_HOST, "http://search:7700"),
            (ENV_SEARCH_API_KEY, ""),
        ]
        .into_iter()
        .collect();
        let config = Config::parse("database: file.db\nsearch:\n  api_key: k\n")
            .unwrap()
            .with_env(|key| env.get(key).map(ToString::to_string));

        assert_eq!(config.database_path(None), PathBuf::from("env.db"));
        assert_eq!(
            config.database_path(Some(Path::new("flag.db"))),
            PathBuf::from("flag.db")
        );
        let creds = config.search_credentials().unwrap();
        assert_eq!(creds.host, "http://search:7700");
        assert_eq!(creds.api_key, "k");
    }

    #[test]
    fn missing_credentials_are_config_errors() {
        let err = Config::default().search_credentials().unwrap_err();
        assert!(err.to_string().contains("search.host"));

        let config = Config::parse("search:\n  host: http://h\n").unwrap();
        let err = config.search_credentials().unwrap_err();
        assert!(err.to_string().contains(ENV_SEARCH_API_KEY));
        assert_eq!(Config::default().database_path(None), PathBuf::from(DEFAULT_DATABASE));
    }
}
