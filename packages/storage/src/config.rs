//! Store configuration, populated from environment variables.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Deployment environment. Selects which tiers each chain gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    Production,
    #[default]
    Development,
    Test,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Environment::Production => "production",
            Environment::Development => "development",
            Environment::Test => "test",
        })
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "development" | "dev" => Ok(Environment::Development),
            "test" => Ok(Environment::Test),
            _ => Err(ConfigError::UnknownEnvironment(s.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown ENVIRONMENT {0:?} (expected production, development or test)")]
    UnknownEnvironment(String),

    #[error("{name} must be {expected}, got {value:?}")]
    InvalidValue {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Runtime configuration for the tiered store.
///
/// | Variable | Default | Description |
/// |----------|---------|-------------|
/// | `ENVIRONMENT` | `development` | `production`, `development` or `test` |
/// | `CARLEDGER_REMOTE_URL` | (absent = unconfigured) | Base URL of the remote database API |
/// | `CARLEDGER_REMOTE_KEY` | (absent) | API key for the remote database |
/// | `CARLEDGER_REMOTE_TIMEOUT_SECS` | `10` | Per-request timeout for the remote tier |
/// | `CARLEDGER_LOCAL_DB` | `carledger.db` | SQLite file for the local tier |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub environment: Environment,

    /// `None` leaves the remote tier in the chain but unconfigured, so
    /// every call to it reports unavailable.
    pub remote_url: Option<String>,

    pub remote_key: Option<String>,

    pub remote_timeout: Duration,

    /// Path to the SQLite database file for the local tier.
    pub local_db: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            remote_url: None,
            remote_key: None,
            remote_timeout: Duration::from_secs(10),
            local_db: "carledger.db".into(),
        }
    }
}

impl StoreConfig {
    /// Populate config from the process environment, applying defaults
    /// where absent.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Populate config from an arbitrary variable source.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        // Blank values count as unset.
        let var = |name: &str| var(name).filter(|v| !v.trim().is_empty());

        let environment = match var("ENVIRONMENT") {
            Some(v) => v.parse()?,
            None => defaults.environment,
        };

        let remote_timeout = match var("CARLEDGER_REMOTE_TIMEOUT_SECS") {
            Some(v) => v
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .ok_or(ConfigError::InvalidValue {
                    name: "CARLEDGER_REMOTE_TIMEOUT_SECS",
                    expected: "a positive number of seconds",
                    value: v,
                })?,
            None => defaults.remote_timeout,
        };

        Ok(Self {
            environment,
            remote_url: var("CARLEDGER_REMOTE_URL").map(|u| u.trim_end_matches('/').to_string()),
            remote_key: var("CARLEDGER_REMOTE_KEY"),
            remote_timeout,
            local_db: var("CARLEDGER_LOCAL_DB").unwrap_or(defaults.local_db),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<StoreConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        StoreConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults() {
        assert_eq!(config(&[]).unwrap(), StoreConfig::default());
    }

    #[test]
    fn reads_every_variable() {
        let cfg = config(&[
            ("ENVIRONMENT", "Production"),
            ("CARLEDGER_REMOTE_URL", "https://db.example.com/rest/v1/"),
            ("CARLEDGER_REMOTE_KEY", "secret"),
            ("CARLEDGER_REMOTE_TIMEOUT_SECS", "3"),
            ("CARLEDGER_LOCAL_DB", "/tmp/x.db"),
        ])
        .unwrap();
        assert_eq!(cfg.environment, Environment::Production);
        assert_eq!(cfg.remote_url.as_deref(), Some("https://db.example.com/rest/v1"));
        assert_eq!(cfg.remote_key.as_deref(), Some("secret"));
        assert_eq!(cfg.remote_timeout, Duration::from_secs(3));
        assert_eq!(cfg.local_db, "/tmp/x.db");
    }

    #[test]
    fn blank_values_are_unset() {
        let cfg = config(&[("ENVIRONMENT", " "), ("CARLEDGER_REMOTE_URL", "")]).unwrap();
        assert_eq!(cfg.environment, Environment::Development);
        assert!(cfg.remote_url.is_none());
    }

    #[test]
    fn rejects_unknown_environment() {
        assert_eq!(
            config(&[("ENVIRONMENT", "staging")]).unwrap_err(),
            ConfigError::UnknownEnvironment("staging".into())
        );
    }

    #[test]
    fn rejects_bad_timeout() {
        for bad in ["0", "ten", "-1"] {
            let err = config(&[("CARLEDGER_REMOTE_TIMEOUT_SECS", bad)]).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidValue { .. }), "{bad}");
        }
    }
}
