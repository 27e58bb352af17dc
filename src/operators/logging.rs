use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::session::{ConnectionId, ConnectionStatus, Frame};

pub const FRAME_LABEL: &str = "frame";
pub const CONNECTION_LABEL: &str = "connection";

/// How much timing detail a session attaches to its log entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingOption {
    #[default]
    Default,
    Timed,
}

#[derive(Debug, Clone, Copy)]
pub struct Timing {
    pub at: DateTime<Utc>,
    pub elapsed: Duration,
}

pub struct LogEntry<'a> {
    pub label: &'static str,
    pub connection: Option<&'a ConnectionId>,
    pub timing: Option<Timing>,
    pub event: &'a dyn fmt::Debug,
}

/// Sink for structured stream dumps. Injected into the session manager and
/// the logging operators instead of being looked up globally.
pub trait EventLogger: Send + Sync {
    fn log(&self, entry: LogEntry<'_>);
}

/// Default [`EventLogger`] writing through `tracing` at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl EventLogger for TracingLogger {
    fn log(&self, entry: LogEntry<'_>) {
        let connection = entry.connection.map(ConnectionId::as_str).unwrap_or("-");
        match entry.timing {
            Some(timing) => debug!(
                label = entry.label,
                connection,
                at = %timing.at.to_rfc3339(),
                elapsed_ms = timing.elapsed.as_millis() as u64,
                event = ?entry.event,
                "stream event"
            ),
            None => debug!(
                label = entry.label,
                connection,
                event = ?entry.event,
                "stream event"
            ),
        }
    }
}

/// Per-session logger bound to a connection id and its [`LoggingOption`].
#[derive(Clone)]
pub struct SessionLogger {
    id: ConnectionId,
    option: LoggingOption,
    opened_at: Instant,
    sink: Arc<dyn EventLogger>,
}

impl SessionLogger {
    pub fn new(id: ConnectionId, option: LoggingOption, sink: Arc<dyn EventLogger>) -> Self {
        Self {
            id,
            option,
            opened_at: Instant::now(),
            sink,
        }
    }

    pub fn frame(&self, frame: &Frame) {
        self.emit(FRAME_LABEL, frame);
    }

    pub fn status(&self, status: &ConnectionStatus) {
        self.emit(CONNECTION_LABEL, status);
    }

    fn emit(&self, label: &'static str, event: &dyn fmt::Debug) {
        let timing = match self.option {
            LoggingOption::Default => None,
            LoggingOption::Timed => Some(Timing {
                at: Utc::now(),
                elapsed: self.opened_at.elapsed(),
            }),
        };
        self.sink.log(LogEntry {
            label,
            connection: Some(&self.id),
            timing,
            event,
        });
    }
}

impl fmt::Debug for SessionLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionLogger")
            .field("id", &self.id)
            .field("option", &self.option)
            .finish()
    }
}
