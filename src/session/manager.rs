use std::sync::{Arc, Weak};
use tokio::task::{AbortHandle, JoinError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::frame::{CloseCode, Frame};
use super::registry::{Registry, Termination};
use super::settings::{ConnectionId, Settings};
use super::streams::{FrameStream, StatusStream};
use crate::config::{ClientConfig, TransportSection};
use crate::error::{SessionError, TransportError};
use crate::operators::{EventLogger, SessionLogger, TracingLogger};
use crate::transport::{
    ConnectRequest, EventSink, Transport, TransportConfig, TransportRuntime, TungsteniteTransport,
};

/// Entry point for opening, driving and closing WebSocket sessions.
///
/// Cheap to clone; clones share one registry, transport and shutdown token.
#[derive(Clone)]
pub struct SessionManager {
    registry: Arc<Registry>,
    transport: Arc<dyn Transport>,
    runtime_config: TransportSection,
    logger: Arc<dyn EventLogger>,
    cancel: CancellationToken,
}

/// A reserved session whose handshake has not been dispatched yet.
struct Prepared {
    id: ConnectionId,
    epoch: u64,
    runtime: Arc<TransportRuntime>,
    request: ConnectRequest,
    events: EventSink,
    status: Option<StatusStream>,
}

impl SessionManager {
    pub fn new(config: &ClientConfig) -> Self {
        Self::with_transport(config, Arc::new(TungsteniteTransport))
    }

    pub fn with_transport(config: &ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            registry: Arc::new(Registry::new()),
            transport,
            runtime_config: config.transport.clone(),
            logger: Arc::new(TracingLogger),
            cancel: CancellationToken::new(),
        }
    }

    /// Replaces the sink every session logger writes to.
    pub fn with_logger(mut self, logger: Arc<dyn EventLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Registers the session and starts its handshake in the background.
    ///
    /// The returned stream starts with `Connecting`; the handshake outcome
    /// arrives as `Connected` or `DidFail`. Dropping the stream closes the
    /// session.
    pub fn open(&self, settings: Settings) -> crate::Result<StatusStream> {
        let prepared = self.prepare(&settings, true)?;
        let status = prepared.status.ok_or(SessionError::ConnectionClosed)?;

        let handshake = handshake(
            Arc::downgrade(&self.registry),
            self.transport.clone(),
            prepared.request,
            prepared.events,
            prepared.epoch,
            self.cancel.clone(),
        );
        let id = prepared.id;
        prepared.runtime.spawn(async move {
            if let Err(e) = handshake.await {
                debug!("Background handshake for connection {} ended: {}", id, e);
            }
        });

        Ok(status)
    }

    /// Registers the session and waits for its handshake.
    ///
    /// Dropping the returned future before it resolves abandons the
    /// handshake and releases the id.
    pub async fn connect(&self, settings: Settings) -> crate::Result<()> {
        let prepared = self.prepare(&settings, false)?;

        let task = prepared.runtime.spawn(handshake(
            Arc::downgrade(&self.registry),
            self.transport.clone(),
            prepared.request,
            prepared.events,
            prepared.epoch,
            self.cancel.clone(),
        ));
        let mut guard = ReservationGuard::new(
            Arc::downgrade(&self.registry),
            prepared.id,
            prepared.epoch,
            task.abort_handle(),
        );
        drop(prepared.runtime);

        let result = task.await;
        guard.complete();
        result.map_err(join_error)?
    }

    /// Subscribes to the inbound frames of `id`.
    pub fn receive(&self, id: &ConnectionId) -> crate::Result<FrameStream> {
        self.registry.subscribe(id)
    }

    /// Writes `frame` to the session. A close frame also ends the session.
    pub fn send(&self, id: &ConnectionId, frame: Frame) -> crate::Result<()> {
        if let Frame::Close(code) = frame {
            return self.close(id, code);
        }

        let handle = self.registry.handle(id)?;
        self.registry.log_outbound(id, &frame);
        handle.send(frame).map_err(|e| {
            debug!("Write on connection {} rejected: {}", id, e);
            SessionError::ConnectionClosed
        })
    }

    /// Starts the close handshake with `code` and removes the session.
    pub fn close(&self, id: &ConnectionId, code: CloseCode) -> crate::Result<()> {
        if self.registry.remove(id, None, Termination::LocalClose(code)) {
            Ok(())
        } else {
            Err(SessionError::ConnectionClosed)
        }
    }

    pub fn is_connected(&self, id: &ConnectionId) -> bool {
        self.registry
            .handle(id)
            .map(|handle| !handle.is_closed())
            .unwrap_or(false)
    }

    pub fn session_count(&self) -> usize {
        self.registry.count()
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.registry.contains(id)
    }

    /// Closes every session with `CloseCode::Away`. Later opens fail with
    /// `TaskCancelled`.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        let closed = self.registry.close_all(CloseCode::Away);
        self.registry.release_runtime_if_idle();
        info!("Session manager shut down, closed {} connections", closed);
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn ensure_running(&self) -> crate::Result<()> {
        if self.cancel.is_cancelled() {
            return Err(SessionError::TaskCancelled);
        }
        Ok(())
    }

    fn prepare(&self, settings: &Settings, with_status: bool) -> crate::Result<Prepared> {
        self.prepare_with(settings, with_status, || {
            TransportRuntime::new(&self.runtime_config)
        })
    }

    fn prepare_with<F>(
        &self,
        settings: &Settings,
        with_status: bool,
        create_runtime: F,
    ) -> crate::Result<Prepared>
    where
        F: FnOnce() -> Result<TransportRuntime, TransportError>,
    {
        self.ensure_running()?;
        let url = settings.target_url()?;

        let runtime = self.registry.acquire_runtime(create_runtime)?;
        if let Err(e) = self.ensure_running() {
            drop(runtime);
            self.registry.release_runtime_if_idle();
            return Err(e);
        }

        let id = settings.id().clone();
        let logger = SessionLogger::new(id.clone(), settings.logging(), self.logger.clone());
        let (epoch, status) = self
            .registry
            .reserve(&id, logger, with_status, Some(&runtime))?;

        let config = settings
            .transport()
            .cloned()
            .unwrap_or_else(|| TransportConfig::from(&self.runtime_config));
        let request = ConnectRequest {
            id: id.clone(),
            url,
            headers: settings.headers().to_vec(),
            config,
            ping_interval: settings.ping_interval(),
        };
        let events = EventSink::new(Arc::downgrade(&self.registry), id.clone(), epoch);

        Ok(Prepared {
            id,
            epoch,
            runtime,
            request,
            events,
            status,
        })
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("registry", &self.registry)
            .field("shut_down", &self.cancel.is_cancelled())
            .finish()
    }
}

/// Runs one handshake and records its outcome in the registry.
///
/// The transport starts delivering events before `connect` returns. If the
/// peer closes or the connection fails in that window, the record is removed
/// with that termination before the handle is attached: the status stream
/// ends `Connecting`, `DidClose`/`DidFail` without `Connected`, and the
/// handshake itself resolves to `ConnectionClosed`.
async fn handshake(
    registry: Weak<Registry>,
    transport: Arc<dyn Transport>,
    request: ConnectRequest,
    events: EventSink,
    epoch: u64,
    cancel: CancellationToken,
) -> crate::Result<()> {
    let id = request.id.clone();
    debug!("Starting handshake for connection {} with {}", id, request.url);

    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            if let Some(registry) = registry.upgrade() {
                registry.remove(&id, Some(epoch), Termination::Cancelled);
            }
            return Err(SessionError::TaskCancelled);
        }
        result = transport.connect(request, events) => result,
    };

    let registry = match registry.upgrade() {
        Some(registry) => registry,
        None => {
            if let Ok(handle) = result {
                let _ = handle.send(Frame::Close(CloseCode::Away));
            }
            return Err(SessionError::ConnectionClosed);
        }
    };

    match result {
        Ok(handle) => {
            if let Err(e) = registry.attach(&id, epoch, handle.clone()) {
                info!("Connection {} was closed during its handshake", id);
                if let Err(e) = handle.send(Frame::Close(CloseCode::Away)) {
                    debug!("Failed to close orphaned connection {}: {}", id, e);
                }
                return Err(e);
            }
            Ok(())
        }
        Err(e) => {
            warn!("Handshake failed for connection {}: {}", id, e);
            registry.remove(&id, Some(epoch), Termination::Failed(e.clone()));
            Err(e.into())
        }
    }
}

fn join_error(err: JoinError) -> SessionError {
    if err.is_cancelled() {
        SessionError::TaskCancelled
    } else {
        SessionError::Transport(TransportError::Runtime(err.to_string()))
    }
}

/// Releases a reservation whose `connect` future was dropped before the
/// handshake finished.
struct ReservationGuard {
    registry: Weak<Registry>,
    id: ConnectionId,
    epoch: u64,
    task: AbortHandle,
    completed: bool,
}

impl ReservationGuard {
    fn new(registry: Weak<Registry>, id: ConnectionId, epoch: u64, task: AbortHandle) -> Self {
        Self {
            registry,
            id,
            epoch,
            task,
            completed: false,
        }
    }

    fn complete(&mut self) {
        self.completed = true;
    }
}

impl Drop for ReservationGuard {
    fn drop(&mut self) {
        if self.completed {
            return;
        }

        self.task.abort();
        if let Some(registry) = self.registry.upgrade() {
            if registry.remove(&self.id, Some(self.epoch), Termination::Cancelled) {
                debug!("Released reservation of abandoned connection {}", self.id);
            }
        }
    }
}
