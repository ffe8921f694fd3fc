//! Structured logging setup

use tracing_subscriber::EnvFilter;

use crate::{
    config::Config,
    error::{Error, Result},
};

/// Install a JSON `tracing` subscriber filtered by `service.log_level`
///
/// An unparsable level falls back to `info`. Installing twice returns
/// [`Error::Configuration`].
pub fn init_tracing(config: &Config) -> Result<()> {
    let log_level = config.service.log_level.clone();

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::try_new(&log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init()
        .map_err(|e| Error::Configuration(format!("tracing subscriber already installed: {e}")))?;

    tracing::info!("Tracing initialized for service: {}", config.service.name);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_an_error() {
        let mut config = Config::default();
        config.service.log_level = "not a [valid filter".to_string();

        // another test may have installed a subscriber first
        let _ = init_tracing(&config);
        assert!(matches!(init_tracing(&config), Err(Error::Configuration(_))));
    }
}
