//! Structured logging setup.

use crate::config::{Config, ConfigTrait};

/// Configures structured logging based on configuration.
///
/// JSON in prod, pretty console otherwise. `RUST_LOG` wins over the configured
/// level. Returns false when the host application already installed a global
/// subscriber, which is then left untouched.
pub fn configure_logger(cfg: &Config) -> bool {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let log_level = cfg
        .logs()
        .and_then(|logs| logs.level.as_ref())
        .map(|s| s.as_str())
        .unwrap_or("info");

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let installed = if cfg.is_prod() {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().pretty())
            .try_init()
    };

    installed.is_ok()
}

#[cfg(test)]
mod tests {
    use super::configure_logger;
    use crate::config::new_test_config;

    /// Test that a second install leaves the first subscriber in place.
    #[test]
    fn test_configure_logger_once() {
        let cfg = new_test_config();
        configure_logger(&cfg);
        assert!(!configure_logger(&cfg));
    }
}
