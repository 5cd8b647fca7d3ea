//! `laconic serve` - run the demo API.

use std::net::IpAddr;

use laconic::logging::{LoggingError, init_sentry, init_tracing};
use laconic::{ConfigError, DefinitionError, LaconicConfig, ServerError};
use thiserror::Error;

use crate::demo;

/// Errors that can occur while serving.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Logging setup failed: {0}")]
    Logging(#[from] LoggingError),

    #[error("Invalid API definition: {0}")]
    Definition(#[from] DefinitionError),

    #[error(transparent)]
    Server(#[from] ServerError),
}

/// Command-line settings that take precedence over the environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct Overrides {
    pub host: Option<IpAddr>,
    pub port: Option<u16>,
    pub debug: bool,
}

impl Overrides {
    /// Apply to a configuration loaded from the environment.
    #[must_use]
    pub fn apply(self, mut config: LaconicConfig) -> LaconicConfig {
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        config.debug |= self.debug;
        config
    }
}

/// Serve the demo API until interrupted.
///
/// # Errors
///
/// Returns `ServeError` if configuration, logging or the server fails.
pub async fn run(overrides: Overrides) -> Result<(), ServeError> {
    let config = overrides.apply(LaconicConfig::from_env()?);
    init_tracing(&config)?;
    let _sentry = init_sentry(&config, concat!("laconic-demo@", env!("CARGO_PKG_VERSION")));

    tracing::info!(
        addr = %config.socket_addr(),
        debug = config.debug,
        "Starting development server"
    );
    demo::build(config)?.run().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    #[test]
    fn test_overrides_take_precedence() {
        let config = LaconicConfig {
            port: 8080,
            ..LaconicConfig::default()
        };
        let overrides = Overrides {
            host: Some(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
            port: Some(9000),
            debug: true,
        };

        let config = overrides.apply(config);
        assert_eq!(config.host, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert_eq!(config.port, 9000);
        assert!(config.debug);
    }

    #[test]
    fn test_no_overrides_keeps_environment() {
        let config = LaconicConfig {
            debug: true,
            port: 8123,
            ..LaconicConfig::default()
        };
        let config = Overrides::default().apply(config);
        assert_eq!(config.port, 8123);
        assert!(config.debug);
    }
}
