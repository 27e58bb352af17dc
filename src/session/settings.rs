use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use url::Url;
use uuid::Uuid;

use crate::error::SessionError;
use crate::operators::LoggingOption;
use crate::transport::TransportConfig;

/// Caller-chosen token identifying one session in a registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A fresh v4 UUID token.
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ConnectionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<Uuid> for ConnectionId {
    fn from(id: Uuid) -> Self {
        Self(id.to_string())
    }
}

/// Everything needed to open one session. Built once through
/// [`SettingsBuilder`] and read-only afterwards.
#[derive(Debug, Clone)]
pub struct Settings {
    id: ConnectionId,
    url: String,
    port: Option<u16>,
    headers: Vec<(String, String)>,
    transport: Option<TransportConfig>,
    ping_interval: Option<Duration>,
    logging: LoggingOption,
}

impl Settings {
    pub fn builder(id: impl Into<ConnectionId>, url: impl Into<String>) -> SettingsBuilder {
        SettingsBuilder {
            settings: Settings {
                id: id.into(),
                url: url.into(),
                port: None,
                headers: Vec::new(),
                transport: None,
                ping_interval: None,
                logging: LoggingOption::Default,
            },
        }
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Per-session engine settings; the manager's configured defaults apply
    /// when unset.
    pub fn transport(&self) -> Option<&TransportConfig> {
        self.transport.as_ref()
    }

    pub fn ping_interval(&self) -> Option<Duration> {
        self.ping_interval
    }

    pub fn logging(&self) -> LoggingOption {
        self.logging
    }

    /// Validates the target address and headers and resolves the URL the
    /// handshake is sent to. The explicit port, when set, replaces the one in
    /// the URL.
    pub fn target_url(&self) -> crate::Result<Url> {
        let raw = self.url.trim();
        if raw.is_empty() {
            return Err(SessionError::EmptyUrlField);
        }

        let lowered = raw.to_ascii_lowercase();
        if !lowered.starts_with("ws://") && !lowered.starts_with("wss://") {
            return Err(SessionError::InvalidWebSocketUrlFormat(raw.to_string()));
        }

        let mut url = Url::parse(raw)
            .map_err(|e| SessionError::InvalidWebSocketUrlFormat(format!("{}: {}", raw, e)))?;
        if url.host_str().map_or(true, str::is_empty) {
            return Err(SessionError::InvalidWebSocketUrlFormat(raw.to_string()));
        }
        if let Some(port) = self.port {
            url.set_port(Some(port))
                .map_err(|_| SessionError::InvalidWebSocketUrlFormat(raw.to_string()))?;
        }

        for (name, value) in &self.headers {
            HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| SessionError::InvalidHeader(format!("{}: {}", name, e)))?;
            HeaderValue::from_str(value)
                .map_err(|e| SessionError::InvalidHeader(format!("{}: {}", name, e)))?;
        }

        Ok(url)
    }
}

pub struct SettingsBuilder {
    settings: Settings,
}

impl SettingsBuilder {
    pub fn port(mut self, port: u16) -> Self {
        self.settings.port = Some(port);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.headers.push((name.into(), value.into()));
        self
    }

    pub fn transport(mut self, transport: TransportConfig) -> Self {
        self.settings.transport = Some(transport);
        self
    }

    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.settings.ping_interval = Some(interval);
        self
    }

    pub fn logging(mut self, option: LoggingOption) -> Self {
        self.settings.logging = option;
        self
    }

    pub fn build(self) -> Settings {
        self.settings
    }
}
