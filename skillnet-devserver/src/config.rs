//! Configuration system for the dev server.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/skillnet-devserver/config.toml`)
//! 4. Compiled defaults

use std::path::PathBuf;
use std::time::Duration;

/// Errors that can occur when loading dev server configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct DevConfigFile {
    server: ServerFileConfig,
}

/// `[server]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    bind_addr: Option<String>,
    token_secret: Option<String>,
    access_ttl_secs: Option<u64>,
    refresh_ttl_secs: Option<u64>,
}

/// CLI arguments for the dev server.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "SkillNet in-memory development server")]
pub struct DevCliArgs {
    /// Address to bind the server to.
    #[arg(short, long, env = "SKILLNET_DEV_ADDR")]
    pub bind: Option<String>,

    /// Secret used to sign tokens.
    #[arg(long, env = "SKILLNET_DEV_SECRET", hide_env_values = true)]
    pub token_secret: Option<String>,

    /// Path to config file (default: `~/.config/skillnet-devserver/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "SKILLNET_DEV_LOG")]
    pub log_level: String,
}

/// Fully resolved dev server configuration.
#[derive(Debug, Clone)]
pub struct DevConfig {
    /// Address the server binds to.
    pub bind_addr: String,
    /// Secret used to sign tokens.
    pub token_secret: String,
    /// Access token lifetime.
    pub access_ttl: Duration,
    /// Refresh token lifetime.
    pub refresh_ttl: Duration,
    /// Log level filter string.
    pub log_level: String,
}

impl Default for DevConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8000".to_string(),
            token_secret: "skillnet-dev-secret".to_string(),
            access_ttl: Duration::from_secs(5 * 60),
            refresh_ttl: Duration::from_secs(24 * 60 * 60),
            log_level: "info".to_string(),
        }
    }
}

impl DevConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed.
    pub fn load(cli: &DevCliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        let defaults = Self::default();
        Ok(Self {
            bind_addr: cli
                .bind
                .clone()
                .or_else(|| file.server.bind_addr.clone())
                .unwrap_or(defaults.bind_addr),
            token_secret: cli
                .token_secret
                .clone()
                .or_else(|| file.server.token_secret.clone())
                .unwrap_or(defaults.token_secret),
            access_ttl: file
                .server
                .access_ttl_secs
                .map_or(defaults.access_ttl, Duration::from_secs),
            refresh_ttl: file
                .server
                .refresh_ttl_secs
                .map_or(defaults.refresh_ttl, Duration::from_secs),
            log_level: cli.log_level.clone(),
        })
    }
}

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<DevConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(DevConfigFile::default());
        };
        config_dir.join("skillnet-devserver").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(DevConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
