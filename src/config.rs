//! Bridge configuration.
//!
//! Configuration is layered, lowest priority first:
//! 1. Built-in defaults
//! 2. TOML file (`scene-bridge.toml`, or the path passed to [`BridgeConfig::load`])
//! 3. Environment variables with the `SCENE_BRIDGE_` prefix
//! 4. Command-line flags (applied by the binary)
//!
//! # Example TOML Configuration
//!
//! ```toml
//! [bridge]
//! host = "0.0.0.0"
//! port = 8001
//! transport = "http"
//! output_dir = "/var/lib/scene-bridge"
//! tick_interval_ms = 300
//! script_timeout_secs = 120
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "scene-bridge.toml";

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "SCENE_BRIDGE_";

/// Largest preview edge in pixels.
pub const MAX_PREVIEW_SIZE: u32 = 800;

/// Which transport the binary serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// JSON-RPC over `POST /rpc`.
    #[default]
    Http,
    /// Newline-delimited JSON-RPC on stdin/stdout.
    Stdio,
}

impl FromStr for Transport {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "stdio" => Ok(Self::Stdio),
            other => Err(ConfigError::Invalid(format!("unknown transport '{other}'"))),
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http => f.write_str("http"),
            Self::Stdio => f.write_str("stdio"),
        }
    }
}

/// Main bridge configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Address the HTTP transport binds to.
    pub host: String,

    /// Port the HTTP transport binds to.
    pub port: u16,

    /// Transport served by the binary.
    pub transport: Transport,

    /// Directory previews and exports are written into.
    pub output_dir: PathBuf,

    /// Executor tick period.
    pub tick_interval_ms: u64,

    /// How often a waiting gateway call checks for its response.
    pub poll_interval_ms: u64,

    /// Deadline for `process_operations`.
    pub batch_timeout_secs: u64,

    /// Deadline for `process_script`.
    pub script_timeout_secs: u64,

    /// Preview edge length in pixels, capped at [`MAX_PREVIEW_SIZE`].
    pub preview_size: u32,

    /// Strip Markdown code fences from script text before validation.
    pub strip_code_fences: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8001,
            transport: Transport::Http,
            output_dir: PathBuf::from("./output"),
            tick_interval_ms: 300,
            poll_interval_ms: 50,
            batch_timeout_secs: 60,
            script_timeout_secs: 300,
            preview_size: 512,
            strip_code_fences: true,
        }
    }
}

impl BridgeConfig {
    /// Load configuration from file and environment.
    ///
    /// With `path` the file must exist. Without it, [`DEFAULT_CONFIG_FILE`]
    /// is read when present and defaults are used otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::from_file(DEFAULT_CONFIG_FILE)?
            },
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path, without env overrides.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents)
    }

    /// Parse the `[bridge]` table of a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        #[derive(Deserialize)]
        struct FullConfig {
            #[serde(default)]
            bridge: BridgeConfig,
        }

        let full: FullConfig =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(full.bridge)
    }

    /// Apply `SCENE_BRIDGE_*` overrides read through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(host) = var("HOST") {
            self.host = host;
        }
        if let Some(v) = var("PORT") {
            self.port = parse_env("PORT", &v)?;
        }
        if let Some(v) = var("TRANSPORT") {
            self.transport = v.parse()?;
        }
        if let Some(dir) = var("OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(v) = var("TICK_INTERVAL_MS") {
            self.tick_interval_ms = parse_env("TICK_INTERVAL_MS", &v)?;
        }
        if let Some(v) = var("POLL_INTERVAL_MS") {
            self.poll_interval_ms = parse_env("POLL_INTERVAL_MS", &v)?;
        }
        if let Some(v) = var("BATCH_TIMEOUT_SECS") {
            self.batch_timeout_secs = parse_env("BATCH_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = var("SCRIPT_TIMEOUT_SECS") {
            self.script_timeout_secs = parse_env("SCRIPT_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = var("PREVIEW_SIZE") {
            self.preview_size = parse_env("PREVIEW_SIZE", &v)?;
        }
        if let Some(v) = var("STRIP_CODE_FENCES") {
            self.strip_code_fences = parse_env("STRIP_CODE_FENCES", &v)?;
        }
        Ok(())
    }

    /// Reject settings the bridge cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid("host must not be empty".into()));
        }
        for (name, value) in [
            ("tick_interval_ms", self.tick_interval_ms),
            ("poll_interval_ms", self.poll_interval_ms),
            ("batch_timeout_secs", self.batch_timeout_secs),
            ("script_timeout_secs", self.script_timeout_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be greater than zero")));
            }
        }
        if self.preview_size == 0 {
            return Err(ConfigError::Invalid("preview_size must be greater than zero".into()));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_secs(self.batch_timeout_secs)
    }

    pub fn script_timeout(&self) -> Duration {
        Duration::from_secs(self.script_timeout_secs)
    }

    /// Preview edge length after applying the cap.
    pub fn preview_size(&self) -> u32 {
        self.preview_size.min(MAX_PREVIEW_SIZE)
    }

    /// `host:port` for the HTTP listener.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_env<T: FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| {
        ConfigError::Invalid(format!("{ENV_PREFIX}{name}: cannot parse '{value}'"))
    })
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for this schema.
    #[error("failed to parse config: {0}")]
    Parse(String),

    /// A value is out of range or malformed.
    #[error("invalid config: {0}")]
    Invalid(String),
}
