//! Logging system setup and configuration
//!
//! Initializes the tracing subscriber used throughout the server.

use anyhow::Result;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingSettings;

/// Initialize the logging system
///
/// `RUST_LOG` takes precedence over the configured level when set.
///
/// # Errors
/// * Returns error if a global subscriber is already installed
pub fn setup_logging(settings: &LoggingSettings) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.level));

    if settings.json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(false))
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false))
            .try_init()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_setup_only_installs_once() {
        let settings = LoggingSettings::default();
        let _ = setup_logging(&settings);
        assert!(setup_logging(&settings).is_err());
    }
}
