use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::Deserialize;
use anyhow::{Context, Result};
use shared::protocol::{DEFAULT_DOMAIN, DEFAULT_SERVICE_TYPE};

const CONFIG_FILE: &str = "zeroconf_lookup.toml";
const TIMEOUT_ENV: &str = "ZEROCONF_LOOKUP_TIMEOUT";

/// Deadline for a single `resolve` call. Not configurable.
pub const RESOLVE_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Config {
    /// Length of the browse window in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_service_type")]
    pub service_type: String,
    #[serde(default = "default_domain")]
    pub domain: String,
}

fn default_timeout() -> u64 {
    2
}

fn default_service_type() -> String {
    DEFAULT_SERVICE_TYPE.to_string()
}

fn default_domain() -> String {
    DEFAULT_DOMAIN.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            service_type: default_service_type(),
            domain: default_domain(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Resolve the effective configuration.
    ///
    /// An explicit path must exist. Otherwise the system file, then the
    /// per-user file, is used if present. `ZEROCONF_LOOKUP_TIMEOUT` and the
    /// `wait` override are applied on top, in that order.
    pub fn resolve(explicit: Option<&Path>, wait: Option<u64>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load(path)?,
            None => match default_locations().into_iter().find(|p| p.is_file()) {
                Some(path) => {
                    tracing::debug!("Using config file {}", path.display());
                    Self::load(&path)?
                }
                None => Self::default(),
            },
        };

        if let Ok(value) = std::env::var(TIMEOUT_ENV) {
            config.timeout_secs = value
                .trim()
                .parse()
                .with_context(|| format!("Invalid {}: {:?}", TIMEOUT_ENV, value))?;
        }
        if let Some(secs) = wait {
            config.timeout_secs = secs;
        }

        if config.timeout_secs == 0 {
            tracing::warn!("Browse timeout of 0s is not usable, using 1s");
            config.timeout_secs = 1;
        }

        Ok(config)
    }

    pub fn browse_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_locations() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("/etc/zeroconf_lookup").join(CONFIG_FILE)];
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".zeroconf_lookup").join(CONFIG_FILE));
    }
    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "timeout_secs = 5").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.timeout_secs, 5);
        assert_eq!(config.service_type, "_http._tcp");
        assert_eq!(config.domain, "local");
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "timeout_secs = \"soon\"").unwrap();

        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(Config::resolve(Some(&missing), None).is_err());
    }

    #[test]
    fn test_wait_override_and_zero_clamp() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "timeout_secs = 7\nservice_type = \"_ipp._tcp\"").unwrap();

        let config = Config::resolve(Some(file.path()), Some(3)).unwrap();
        assert_eq!(config.timeout_secs, 3);
        assert_eq!(config.service_type, "_ipp._tcp");

        let config = Config::resolve(Some(file.path()), Some(0)).unwrap();
        assert_eq!(config.browse_timeout(), Duration::from_secs(1));
    }
}
