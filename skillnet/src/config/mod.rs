//! Configuration system for the `SkillNet` client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/skillnet/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

/// Errors that can occur when loading configuration.
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

    /// A URL field could not be parsed.
    #[error("invalid {field} URL {value}: {source}")]
    InvalidUrl {
        /// Which config field held the value.
        field: &'static str,
        /// The offending value.
        value: String,
        /// Underlying parse error.
        source: url::ParseError,
    },
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    server: ServerFileConfig,
    chat: ChatFileConfig,
    tracking: TrackingFileConfig,
}

/// `[server]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    api_url: Option<String>,
    ws_url: Option<String>,
    connect_timeout_secs: Option<u64>,
    request_timeout_secs: Option<u64>,
}

/// `[chat]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ChatFileConfig {
    reconnect_delay_secs: Option<u64>,
    event_buffer: Option<usize>,
}

/// `[tracking]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct TrackingFileConfig {
    impression_window_secs: Option<u64>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // -- Server --
    /// Base URL of the REST API.
    pub api_base: Url,
    /// Base URL of the WebSocket endpoint. Derived from `api_base` (scheme
    /// swapped to `ws`/`wss`) unless set explicitly.
    pub ws_base: Url,
    /// Timeout for establishing HTTP connections.
    pub connect_timeout: Duration,
    /// Overall timeout for a single HTTP request.
    pub request_timeout: Duration,

    // -- Chat --
    /// Fixed delay between WebSocket reconnection attempts.
    pub reconnect_delay: Duration,
    /// Buffer size for session event channels.
    pub event_buffer: usize,

    // -- Tracking --
    /// Dedup window for gig impressions.
    pub impression_window: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            // Infallible: literal URLs.
            api_base: default_api_base(),
            ws_base: default_ws_base(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            reconnect_delay: Duration::from_secs(3),
            event_buffer: 64,
            impression_window: Duration::from_secs(10 * 60),
        }
    }
}

fn default_api_base() -> Url {
    let Ok(url) = Url::parse("http://127.0.0.1:8000/") else {
        unreachable!("default API URL is valid")
    };
    url
}

fn default_ws_base() -> Url {
    let Ok(url) = Url::parse("ws://127.0.0.1:8000/") else {
        unreachable!("default WS URL is valid")
    };
    url
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// CLI args and env vars are parsed via `clap`. If `--config` is given
    /// and the file does not exist, returns an error. If no `--config` is
    /// given, the default path (`~/.config/skillnet/config.toml`) is tried
    /// and silently ignored if missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed, or if a URL field is malformed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Self::resolve(cli, &file)
    }

    /// Build a config pointed at a specific server, keeping every other
    /// field at its default. The WebSocket base is derived from `api_base`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidUrl`] if the URL cannot be parsed.
    pub fn for_server(api_url: &str) -> Result<Self, ConfigError> {
        let api_base = parse_url("api_url", api_url)?;
        let ws_base = derive_ws_base(&api_base)?;
        Ok(Self {
            api_base,
            ws_base,
            ..Self::default()
        })
    }

    /// Resolve a `ClientConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default. Separated from `load()` to enable
    /// unit testing without CLI parsing.
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let api_base = match cli.api_url.as_deref().or(file.server.api_url.as_deref()) {
            Some(raw) => parse_url("api_url", raw)?,
            None => defaults.api_base,
        };
        let ws_base = match cli.ws_url.as_deref().or(file.server.ws_url.as_deref()) {
            Some(raw) => parse_url("ws_url", raw)?,
            None => derive_ws_base(&api_base)?,
        };

        Ok(Self {
            api_base,
            ws_base,
            connect_timeout: file
                .server
                .connect_timeout_secs
                .map_or(defaults.connect_timeout, Duration::from_secs),
            request_timeout: file
                .server
                .request_timeout_secs
                .map_or(defaults.request_timeout, Duration::from_secs),
            reconnect_delay: file
                .chat
                .reconnect_delay_secs
                .map_or(defaults.reconnect_delay, Duration::from_secs),
            event_buffer: file.chat.event_buffer.unwrap_or(defaults.event_buffer),
            impression_window: file
                .tracking
                .impression_window_secs
                .map_or(defaults.impression_window, Duration::from_secs),
        })
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "SkillNet skill-exchange marketplace client")]
pub struct CliArgs {
    /// Base URL of the SkillNet API server.
    #[arg(long, env = "SKILLNET_API_URL")]
    pub api_url: Option<String>,

    /// Base URL of the WebSocket endpoint (default: derived from the API
    /// URL).
    #[arg(long, env = "SKILLNET_WS_URL")]
    pub ws_url: Option<String>,

    /// Account email for login.
    #[arg(long, env = "SKILLNET_EMAIL")]
    pub email: Option<String>,

    /// Account password for login.
    #[arg(long, env = "SKILLNET_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Path to config file (default: `~/.config/skillnet/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "SKILLNET_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/skillnet.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Username to open a conversation with after login.
    #[arg(long)]
    pub chat_with: Option<String>,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn parse_url(field: &'static str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|source| ConfigError::InvalidUrl {
        field,
        value: raw.to_string(),
        source,
    })
}

/// Swap the API base's scheme to its WebSocket counterpart.
fn derive_ws_base(api_base: &Url) -> Result<Url, ConfigError> {
    let scheme = if api_base.scheme() == "https" {
        "wss"
    } else {
        "ws"
    };
    let raw = format!(
        "{scheme}{}",
        api_base
            .as_str()
            .trim_start_matches("https")
            .trim_start_matches("http")
    );
    parse_url("ws_url", &raw)
}

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            // No config dir available — use defaults.
            return Ok(ConfigFile::default());
        };
        config_dir.join("skillnet").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
