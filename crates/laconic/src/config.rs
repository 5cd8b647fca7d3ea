//! Framework configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Optional
//! - `LACONIC_DEBUG` - Verbose errors and stdout debug logging (default: false)
//! - `LACONIC_LOG_FILENAME` - Log file used outside debug mode (default: laconic.log)
//! - `LACONIC_HTTP_AUTO_OPTIONS_RESPONSE` - Answer `OPTIONS` automatically (default: true)
//! - `LACONIC_HOST` - Bind address (default: 127.0.0.1)
//! - `LACONIC_PORT` - Listen port (default: 8080)
//! - `LACONIC_MAX_BODY_BYTES` - Request body limit (default: 2 MiB)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//!
//! Any other `LACONIC_*` variable is kept, prefix stripped, and available
//! through [`LaconicConfig::get`].

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use thiserror::Error;

const PREFIX: &str = "LACONIC_";

const DEBUG: &str = "LACONIC_DEBUG";
const LOG_FILENAME: &str = "LACONIC_LOG_FILENAME";
const AUTO_OPTIONS: &str = "LACONIC_HTTP_AUTO_OPTIONS_RESPONSE";
const HOST: &str = "LACONIC_HOST";
const PORT: &str = "LACONIC_PORT";
const MAX_BODY_BYTES: &str = "LACONIC_MAX_BODY_BYTES";
const SENTRY_DSN: &str = "SENTRY_DSN";

const KNOWN_KEYS: &[&str] = &[
    DEBUG,
    LOG_FILENAME,
    AUTO_OPTIONS,
    HOST,
    PORT,
    MAX_BODY_BYTES,
];

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Laconic application configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaconicConfig {
    /// Verbose error bodies and debug logging to stdout
    pub debug: bool,
    /// Log file used when not in debug mode
    pub log_filename: PathBuf,
    /// Register `OPTIONS` on every route and answer it with an `Allow` header
    pub auto_options_response: bool,
    /// IP address to bind the development server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Maximum accepted request body size
    pub max_body_bytes: usize,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Application-defined settings
    pub extra: HashMap<String, String>,
}

impl Default for LaconicConfig {
    fn default() -> Self {
        Self {
            debug: false,
            log_filename: PathBuf::from("laconic.log"),
            auto_options_response: true,
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            sentry_dsn: None,
            extra: HashMap::new(),
        }
    }
}

impl LaconicConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_vars(std::env::vars())
    }

    /// Build configuration from an explicit set of variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a known variable cannot be parsed.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let defaults = Self::default();

        let debug = parse_or(&vars, DEBUG, defaults.debug, parse_bool)?;
        let auto_options_response =
            parse_or(&vars, AUTO_OPTIONS, defaults.auto_options_response, parse_bool)?;
        let host = parse_or(&vars, HOST, defaults.host, |s| {
            s.parse::<IpAddr>().map_err(|e| e.to_string())
        })?;
        let port = parse_or(&vars, PORT, defaults.port, |s| {
            s.parse::<u16>().map_err(|e| e.to_string())
        })?;
        let max_body_bytes = parse_or(&vars, MAX_BODY_BYTES, defaults.max_body_bytes, |s| {
            s.parse::<usize>().map_err(|e| e.to_string())
        })?;
        let log_filename = vars
            .get(LOG_FILENAME)
            .map_or(defaults.log_filename, PathBuf::from);
        let sentry_dsn = vars.get(SENTRY_DSN).filter(|v| !v.is_empty()).cloned();

        let extra = vars
            .iter()
            .filter(|(k, _)| !KNOWN_KEYS.contains(&k.as_str()))
            .filter_map(|(k, v)| k.strip_prefix(PREFIX).map(|key| (key.to_string(), v.clone())))
            .collect();

        Ok(Self {
            debug,
            log_filename,
            auto_options_response,
            host,
            port,
            max_body_bytes,
            sentry_dsn,
            extra,
        })
    }

    /// Application-defined setting, `None` if unset.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.extra.get(key).map(String::as_str)
    }

    /// Set an application-defined setting.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Parse a variable if present, otherwise use the default.
fn parse_or<T>(
    vars: &HashMap<String, String>,
    key: &str,
    default: T,
    parse: impl FnOnce(&str) -> Result<T, String>,
) -> Result<T, ConfigError> {
    match vars.get(key) {
        Some(raw) => parse(raw.trim()).map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e)),
        None => Ok(default),
    }
}

/// Parse a boolean flag.
fn parse_bool(s: &str) -> Result<bool, String> {
    match s.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(format!("expected a boolean, got '{other}'")),
    }
}
