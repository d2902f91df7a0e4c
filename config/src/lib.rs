//! rallyd configuration.
//!
//! Loaded from `~/.rallyd/config.toml` (or `$RALLYD_CONFIG`). Every section and
//! every key is optional:
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:8001"
//! workdir = "/tmp"
//! log_file = "/var/log/rallyd.log"
//!
//! [rally]
//! binary = "rally"
//! manage_binary = "rally-manage"
//! config_file = "${HOME}/rally.conf"
//! command_timeout_secs = 600
//!
//! [client]
//! endpoint = "http://127.0.0.1:8001"
//! ```

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_BIND: &str = "0.0.0.0:8001";
pub const DEFAULT_WORKDIR: &str = "/tmp";
pub const DEFAULT_LOG_FILE_NAME: &str = "rallyd.log";
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8001";
pub const DEFAULT_RALLY_BINARY: &str = "rally";
pub const DEFAULT_MANAGE_BINARY: &str = "rally-manage";
const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 600;
const DEFAULT_UUID_WAIT_SECS: u64 = 60;
const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 5;
const DEFAULT_CLIENT_TIMEOUT_SECS: u64 = 300;

pub const ENV_CONFIG: &str = "RALLYD_CONFIG";
pub const ENV_BIND: &str = "RALLYD_BIND";
pub const ENV_WORKDIR: &str = "RALLYD_WORKDIR";
pub const ENV_ENDPOINT: &str = "RALLYD_ENDPOINT";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RallydConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub rally: RallyConfig,
    #[serde(default)]
    pub client: ClientConfig,
}

#[derive(Debug, Default, Deserialize)]
pub struct ServerConfig {
    pub bind: Option<String>,
    pub workdir: Option<String>,
    /// Absolute, or relative to the workdir.
    pub log_file: Option<String>,
    pub shutdown_grace_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RallyConfig {
    pub binary: Option<String>,
    pub manage_binary: Option<String>,
    /// Interpreter that runs both binaries, e.g. a virtualenv's python.
    pub launcher: Option<String>,
    /// Passed to every toolkit invocation as `--config-file`.
    pub config_file: Option<String>,
    /// Directory holding per-deployment tempest checkouts.
    pub tempest_root: Option<String>,
    pub command_timeout_secs: Option<u64>,
    /// How long to wait for the toolkit to print a task or verification UUID.
    pub uuid_wait_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ClientConfig {
    pub endpoint: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// Expand `${VAR}` references from the process environment.
///
/// Unset variables expand to nothing. An unclosed `${` is kept literally.
#[must_use]
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(pos) = rest.find("${") {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 2..];
        match after.find('}') {
            Some(end) if end > 0 => {
                out.push_str(&env::var(&after[..end]).unwrap_or_default());
                rest = &after[end + 1..];
            }
            _ => {
                out.push_str("${");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn expand_opt(value: Option<&String>) -> Option<String> {
    value
        .map(|v| expand_env_vars(v))
        .filter(|v| !v.trim().is_empty())
}

fn env_nonempty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl RallydConfig {
    /// Load the config file. A missing file is not an error.
    pub fn load() -> Result<Self, ConfigError> {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| {
            tracing::warn!("Failed to read config at {}: {source}", path.display());
            ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }
        })?;

        Self::parse(&content).map_err(|source| {
            tracing::warn!("Failed to parse config at {}: {source}", path.display());
            ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            }
        })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Address the server binds to. `RALLYD_BIND` wins over the file.
    #[must_use]
    pub fn bind(&self) -> String {
        env_nonempty(ENV_BIND)
            .or_else(|| expand_opt(self.server.bind.as_ref()))
            .unwrap_or_else(|| DEFAULT_BIND.to_string())
    }

    #[must_use]
    pub fn workdir(&self) -> PathBuf {
        env_nonempty(ENV_WORKDIR)
            .or_else(|| expand_opt(self.server.workdir.as_ref()))
            .map_or_else(|| PathBuf::from(DEFAULT_WORKDIR), PathBuf::from)
    }

    #[must_use]
    pub fn log_file(&self) -> PathBuf {
        let workdir = self.workdir();
        match expand_opt(self.server.log_file.as_ref()) {
            Some(file) => workdir.join(file),
            None => workdir.join(DEFAULT_LOG_FILE_NAME),
        }
    }

    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(
            self.server
                .shutdown_grace_secs
                .unwrap_or(DEFAULT_SHUTDOWN_GRACE_SECS),
        )
    }

    #[must_use]
    pub fn rally_binary(&self) -> String {
        expand_opt(self.rally.binary.as_ref()).unwrap_or_else(|| DEFAULT_RALLY_BINARY.to_string())
    }

    #[must_use]
    pub fn manage_binary(&self) -> String {
        expand_opt(self.rally.manage_binary.as_ref())
            .unwrap_or_else(|| DEFAULT_MANAGE_BINARY.to_string())
    }

    #[must_use]
    pub fn rally_launcher(&self) -> Option<PathBuf> {
        expand_opt(self.rally.launcher.as_ref()).map(PathBuf::from)
    }

    #[must_use]
    pub fn rally_config_file(&self) -> Option<PathBuf> {
        expand_opt(self.rally.config_file.as_ref()).map(PathBuf::from)
    }

    /// Defaults to `~/.rally/tempest`, where the toolkit installs verifiers.
    #[must_use]
    pub fn tempest_root(&self) -> PathBuf {
        expand_opt(self.rally.tempest_root.as_ref())
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|home| home.join(".rally").join("tempest")))
            .unwrap_or_else(|| PathBuf::from(".rally").join("tempest"))
    }

    #[must_use]
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(
            self.rally
                .command_timeout_secs
                .filter(|secs| *secs > 0)
                .unwrap_or(DEFAULT_COMMAND_TIMEOUT_SECS),
        )
    }

    #[must_use]
    pub fn uuid_wait(&self) -> Duration {
        Duration::from_secs(
            self.rally
                .uuid_wait_secs
                .filter(|secs| *secs > 0)
                .unwrap_or(DEFAULT_UUID_WAIT_SECS),
        )
    }

    #[must_use]
    pub fn endpoint(&self) -> String {
        env_nonempty(ENV_ENDPOINT)
            .or_else(|| expand_opt(self.client.endpoint.as_ref()))
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string())
    }

    #[must_use]
    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(
            self.client
                .timeout_secs
                .filter(|secs| *secs > 0)
                .unwrap_or(DEFAULT_CLIENT_TIMEOUT_SECS),
        )
    }
}

/// `$RALLYD_CONFIG`, else `~/.rallyd/config.toml`.
#[must_use]
pub fn config_path() -> Option<PathBuf> {
    if let Some(path) = env_nonempty(ENV_CONFIG) {
        return Some(PathBuf::from(path));
    }
    dirs::home_dir().map(|home| home.join(".rallyd").join("config.toml"))
}
