//! Bootstrap step 1: install the tracing subscriber.

use crate::config::{EnvSource, LoggerOptions};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
///
/// Without explicit options the settings come from the process environment,
/// so a subscriber exists before any other bootstrap step can log.
/// Only one subscriber can exist per process. When one is already installed
/// (a second service in tests, or a host application that set its own) the
/// existing subscriber is kept.
pub(crate) fn init(options: Option<&LoggerOptions>) {
    let fallback;
    let options = match options {
        Some(options) => options,
        None => {
            fallback = LoggerOptions::from_env(&EnvSource::from_process());
            &fallback
        }
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&options.level));

    let installed = if options.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init()
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).try_init()
    };

    match installed {
        Ok(()) => tracing::debug!(
            "Logger configured for environment {:?} (level {}, json {})",
            options.environment,
            options.level,
            options.json
        ),
        Err(e) => tracing::debug!("Logger already installed, keeping it: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscriber_installed_without_options() {
        init(None);
        assert!(tracing::dispatcher::has_been_set());

        // A second install keeps the first subscriber and does not panic.
        init(Some(&LoggerOptions::from_env(&EnvSource::from_pairs([(
            "ENV", "production",
        )]))));
        assert!(tracing::dispatcher::has_been_set());
    }
}
