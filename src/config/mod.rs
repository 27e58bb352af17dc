use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::operators::LoggingOption;

#[derive(Debug, Deserialize, Clone)]
pub struct TransportSection {
    pub worker_threads: usize,
    pub shutdown_grace_ms: u64,
    pub handshake_timeout_ms: u64,
    pub max_message_size: usize,
    pub max_frame_size: usize,
    pub write_buffer_size: usize,
    pub accept_unmasked_frames: bool,
    pub disable_nagle: bool,
}

impl TransportSection {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Compact,
    Full,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSection {
    pub level: String,
    pub format: LogFormat,
    pub option: LoggingOption,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClientConfig {
    pub environment: String,
    pub transport: TransportSection,
    pub logging: LoggingSection,
}

impl ClientConfig {
    pub fn new() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = with_defaults(Config::builder(), "development")?
            // Add in settings from the config file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // E.g., `WS_SESSIONS_TRANSPORT__WORKER_THREADS=2` sets `transport.worker_threads`
            .add_source(
                Environment::with_prefix("ws_sessions")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        s.try_deserialize()
    }

    pub fn new_for_test() -> Result<Self, ConfigError> {
        with_defaults(Config::builder(), "test")?
            .set_override("transport.worker_threads", 2)?
            .set_override("transport.shutdown_grace_ms", 50)?
            .set_override("transport.handshake_timeout_ms", 2_000)?
            .build()?
            .try_deserialize()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            transport: TransportSection {
                worker_threads: num_cpus::get(),
                shutdown_grace_ms: 500,
                handshake_timeout_ms: 10_000,
                max_message_size: 64 << 20,
                max_frame_size: 16 << 20,
                write_buffer_size: 128 * 1024,
                accept_unmasked_frames: false,
                disable_nagle: true,
            },
            logging: LoggingSection {
                level: "info".to_string(),
                format: LogFormat::Compact,
                option: LoggingOption::Default,
            },
        }
    }
}

fn with_defaults(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
    environment: &str,
) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
    let defaults = ClientConfig::default();
    builder
        .set_default("environment", environment)?
        .set_default("transport.worker_threads", defaults.transport.worker_threads as i64)?
        .set_default("transport.shutdown_grace_ms", defaults.transport.shutdown_grace_ms as i64)?
        .set_default("transport.handshake_timeout_ms", defaults.transport.handshake_timeout_ms as i64)?
        .set_default("transport.max_message_size", defaults.transport.max_message_size as i64)?
        .set_default("transport.max_frame_size", defaults.transport.max_frame_size as i64)?
        .set_default("transport.write_buffer_size", defaults.transport.write_buffer_size as i64)?
        .set_default("transport.accept_unmasked_frames", false)?
        .set_default("transport.disable_nagle", defaults.transport.disable_nagle)?
        .set_default("logging.level", defaults.logging.level)?
        .set_default("logging.format", "compact")?
        .set_default("logging.option", "default")
}
