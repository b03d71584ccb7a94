//! Log subscriber setup.

use custodex_types::{CustodexError, LoggingConfig, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Install the global subscriber. `RUST_LOG` overrides `config.filter`.
///
/// Fails if the filter does not parse or a subscriber is already set.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .map_err(|e| CustodexError::Configuration(format!("log filter {:?}: {e}", config.filter)))?;
    let registry = tracing_subscriber::registry().with(filter);
    let installed = if config.json {
        registry
            .with(fmt::layer().json().with_target(true))
            .try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };
    installed.map_err(|e| CustodexError::Configuration(format!("log subscriber: {e}")))?;
    tracing::debug!(filter = %config.filter, json = config.json, "logging initialised");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_install_is_rejected() {
        let config = LoggingConfig {
            filter: "custodex=debug".into(),
            json: true,
        };
        init_logging(&config).unwrap();
        assert!(matches!(
            init_logging(&config),
            Err(CustodexError::Configuration(_))
        ));
    }
}
