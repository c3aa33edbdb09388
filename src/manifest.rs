//! Configuration file parsing for banwatch
//!
//! Parses `banwatch.toml` configuration files using serde

use crate::error::{Error, Result};
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

/// Default configuration file name
pub const DEFAULT_CONFIG: &str = "banwatch.toml";

/// Upper bound for the poll interval and the command timeout (one day)
pub const MAX_SECONDS: u64 = 86_400;

/// Load configuration from a file
///
/// A missing file is only tolerated when `required` is false, in which
/// case the built-in defaults are used.
pub fn load(path: &Path, required: bool) -> Result<BanwatchConfig> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound && !required => {
            tracing::debug!("no config at {}, using defaults", path.display());
            return Ok(BanwatchConfig::default());
        }
        Err(e) => {
            return Err(Error::ConfigRead {
                path: path.to_path_buf(),
                source: e,
            });
        }
    };

    let config: BanwatchConfig = toml::from_str(&content)?;
    config.validate()?;

    Ok(config)
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BanwatchConfig {
    /// What to watch and how often
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// How to reach the control interface
    #[serde(default)]
    pub client: ClientConfig,
}

impl BanwatchConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let jail = &self.monitor.jail;
        if jail.is_empty() {
            return Err(Error::ConfigValidation("Jail name must not be empty".into()));
        }
        if jail.chars().any(char::is_whitespace) {
            return Err(Error::ConfigValidation(format!(
                "Jail name '{}' contains whitespace",
                jail
            )));
        }

        if self.monitor.interval == 0 {
            return Err(Error::ConfigValidation(
                "Poll interval must be at least 1 second".into(),
            ));
        }
        if self.monitor.interval > MAX_SECONDS {
            return Err(Error::ConfigValidation(format!(
                "Poll interval must be at most {} seconds",
                MAX_SECONDS
            )));
        }

        if self.client.program.trim().is_empty() {
            return Err(Error::ConfigValidation(
                "Client program must not be empty".into(),
            ));
        }

        if self.client.timeout == 0 {
            return Err(Error::ConfigValidation(
                "Client timeout must be at least 1 second".into(),
            ));
        }
        if self.client.timeout > MAX_SECONDS {
            return Err(Error::ConfigValidation(format!(
                "Client timeout must be at most {} seconds",
                MAX_SECONDS
            )));
        }

        Ok(())
    }

    /// Apply command-line overrides, then re-validate
    pub fn with_overrides(mut self, jail: Option<String>, interval: Option<u64>) -> Result<Self> {
        if let Some(jail) = jail {
            self.monitor.jail = jail;
        }
        if let Some(interval) = interval {
            self.monitor.interval = interval;
        }
        self.validate()?;
        Ok(self)
    }
}

/// Monitor settings
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Jail to observe
    #[serde(default = "default_jail")]
    pub jail: String,

    /// Seconds between polls
    #[serde(default = "default_interval")]
    pub interval: u64,
}

impl MonitorConfig {
    /// Poll interval as a duration
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            jail: default_jail(),
            interval: default_interval(),
        }
    }
}

/// Control interface settings
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// fail2ban control binary
    #[serde(default = "default_program")]
    pub program: String,

    /// Privilege elevation prefix, empty to run the program directly
    #[serde(default = "default_elevate")]
    pub elevate: Vec<String>,

    /// Seconds to wait for one invocation before killing it
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            elevate: default_elevate(),
            timeout: default_timeout(),
        }
    }
}

fn default_jail() -> String {
    "sshd".to_string()
}

fn default_interval() -> u64 {
    3
}

fn default_program() -> String {
    "fail2ban-client".to_string()
}

fn default_elevate() -> Vec<String> {
    vec!["sudo".to_string(), "-n".to_string()]
}

fn default_timeout() -> u64 {
    10
}
