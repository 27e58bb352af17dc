use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::{LogFormat, LoggingSection};
use crate::error::SessionError;

/// Installs the global `tracing` subscriber described by `section`.
///
/// `RUST_LOG` takes precedence over the configured level. Fails if a global
/// subscriber is already set.
pub fn init(section: &LoggingSection) -> crate::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&section.level))
        .map_err(|e| SessionError::Config(format!("invalid log level {}: {}", section.level, e)))?;

    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    let result = match section.format {
        LogFormat::Pretty => builder
            .with_file(true)
            .with_line_number(true)
            .pretty()
            .try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Full => builder.try_init(),
    };
    result.map_err(|e| SessionError::Config(format!("failed to install subscriber: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;

    #[test]
    fn test_invalid_level_is_rejected() {
        std::env::remove_var("RUST_LOG");
        let mut section = ClientConfig::new_for_test().unwrap().logging;
        section.level = "ws_sessions=loud".to_string();
        assert!(matches!(init(&section), Err(SessionError::Config(_))));
    }
}
