use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

use super::frame::{CloseCode, ConnectionStatus, Frame};
use super::settings::ConnectionId;
use super::streams::{FrameChannel, FrameStream, StatusChannel, StatusStream, TerminationHook};
use crate::error::{SessionError, TransportError};
use crate::operators::SessionLogger;
use crate::transport::{TransportHandle, TransportRuntime};

/// Why a record leaves the registry. Decides the terminal elements each
/// stream receives and whether a close handshake is started.
#[derive(Debug, Clone)]
pub(crate) enum Termination {
    /// Close frame sent by this side (explicit close or shutdown).
    LocalClose(CloseCode),
    /// Close frame received from the peer.
    PeerClose(CloseCode),
    /// Transport-level failure, including a failed handshake.
    Failed(TransportError),
    /// Every frame stream consumer went away.
    FramesDropped,
    /// The status stream consumer went away.
    StatusDropped,
    /// The task that was opening the session stopped waiting for it.
    Cancelled,
}

pub(crate) struct ConnectionRecord {
    epoch: u64,
    handle: Option<Arc<dyn TransportHandle>>,
    frames: Option<FrameChannel>,
    status: Option<StatusChannel>,
    logger: SessionLogger,
}

impl ConnectionRecord {
    fn push_status(&self, status: ConnectionStatus) {
        if let Some(channel) = &self.status {
            channel.push(status);
        }
    }

    fn publish_status(&self, status: ConnectionStatus) {
        self.logger.status(&status);
        self.push_status(status);
    }

    /// Emits the terminal elements for `termination` and drops both stream
    /// senders, which ends every outstanding stream.
    fn finish(mut self, id: &ConnectionId, termination: &Termination) {
        if let Some(handle) = &self.handle {
            let close = match termination {
                Termination::LocalClose(code) => Some(*code),
                Termination::FramesDropped | Termination::StatusDropped | Termination::Cancelled
                    if !handle.is_closed() =>
                {
                    Some(CloseCode::Normal)
                }
                _ => None,
            };
            if let Some(code) = close {
                if let Err(e) = handle.send(Frame::Close(code)) {
                    warn!("Failed to send close frame for connection {}: {}", id, e);
                }
            }
        }

        let (frame, status) = match termination {
            Termination::LocalClose(code) | Termination::PeerClose(code) => (
                Some(Frame::Close(*code)),
                Some(ConnectionStatus::DidClose(*code)),
            ),
            Termination::Failed(error) => (None, Some(ConnectionStatus::DidFail(error.clone()))),
            Termination::FramesDropped => (None, Some(ConnectionStatus::Disconnected)),
            Termination::StatusDropped | Termination::Cancelled => (None, None),
        };

        if let (Some(frame), Some(channel)) = (frame, self.frames.as_mut()) {
            self.logger.frame(&frame);
            channel.push(frame);
        }
        if let Some(status) = status {
            self.publish_status(status);
        }
    }
}

struct RegistryState {
    records: HashMap<ConnectionId, ConnectionRecord>,
    next_epoch: u64,
    runtime: Option<Arc<TransportRuntime>>,
}

/// Sole owner of the id → session map and of the shared transport runtime.
///
/// Every read and write goes through one mutex; no critical section awaits or
/// performs I/O. Teardown work (close frames, terminal stream elements,
/// runtime release) happens after the lock is released.
pub struct Registry {
    state: Mutex<RegistryState>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState {
                records: HashMap::new(),
                next_epoch: 1,
                runtime: None,
            }),
        }
    }

    pub fn count(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.state.lock().records.contains_key(id)
    }

    pub fn ids(&self) -> Vec<ConnectionId> {
        self.state.lock().records.keys().cloned().collect()
    }

    /// Returns the shared runtime, creating it with `create` on first use.
    pub(crate) fn acquire_runtime<F>(&self, create: F) -> Result<Arc<TransportRuntime>, TransportError>
    where
        F: FnOnce() -> Result<TransportRuntime, TransportError>,
    {
        let mut state = self.state.lock();
        if let Some(runtime) = &state.runtime {
            return Ok(runtime.clone());
        }
        let runtime = Arc::new(create()?);
        info!("Started transport runtime");
        state.runtime = Some(runtime.clone());
        Ok(runtime)
    }

    pub(crate) fn has_runtime(&self) -> bool {
        self.state.lock().runtime.is_some()
    }

    /// Releases the shared runtime when no record uses it any more.
    pub(crate) fn release_runtime_if_idle(&self) {
        let runtime = {
            let mut state = self.state.lock();
            if state.records.is_empty() {
                state.runtime.take()
            } else {
                None
            }
        };
        if let Some(runtime) = runtime {
            info!("Releasing idle transport runtime");
            TransportRuntime::release(runtime);
        }
    }

    /// Claims `id`, returning the epoch of the new record and, when asked
    /// for, the session's status stream (already carrying `Connecting`).
    ///
    /// `runtime` is reinstated as the shared runtime if the registry released
    /// it after the caller acquired it.
    pub(crate) fn reserve(
        self: &Arc<Self>,
        id: &ConnectionId,
        logger: SessionLogger,
        with_status: bool,
        runtime: Option<&Arc<TransportRuntime>>,
    ) -> crate::Result<(u64, Option<StatusStream>)> {
        // The logger is user code; it only runs once the lock is released.
        let session_logger = logger.clone();
        let mut state = self.state.lock();
        if state.records.contains_key(id) {
            return Err(SessionError::AlreadyOpened(id.clone()));
        }
        if state.runtime.is_none() {
            state.runtime = runtime.cloned();
        }

        let epoch = state.next_epoch;
        state.next_epoch += 1;

        let (status, stream) = if with_status {
            let registry = Arc::downgrade(self);
            let hook_id = id.clone();
            let hook = TerminationHook::new(move || {
                terminate(&registry, &hook_id, epoch, Termination::StatusDropped)
            });
            let (channel, stream) = StatusChannel::open(id, hook);
            (Some(channel), Some(stream))
        } else {
            (None, None)
        };

        let record = ConnectionRecord {
            epoch,
            handle: None,
            frames: None,
            status,
            logger,
        };
        record.push_status(ConnectionStatus::Connecting);
        state.records.insert(id.clone(), record);
        drop(state);

        info!("Reserved connection {} (epoch {})", id, epoch);
        session_logger.status(&ConnectionStatus::Connecting);
        Ok((epoch, stream))
    }

    /// Stores the transport handle of a completed handshake.
    pub(crate) fn attach(
        &self,
        id: &ConnectionId,
        epoch: u64,
        handle: Arc<dyn TransportHandle>,
    ) -> crate::Result<()> {
        let logger = {
            let mut state = self.state.lock();
            let record = match state.records.get_mut(id) {
                Some(record) if record.epoch == epoch => record,
                _ => return Err(SessionError::ConnectionClosed),
            };
            record.handle = Some(handle);
            record.push_status(ConnectionStatus::Connected);
            record.logger.clone()
        };
        info!("Connection {} established", id);
        logger.status(&ConnectionStatus::Connected);
        Ok(())
    }

    pub(crate) fn handle(&self, id: &ConnectionId) -> crate::Result<Arc<dyn TransportHandle>> {
        let state = self.state.lock();
        state
            .records
            .get(id)
            .and_then(|record| record.handle.clone())
            .ok_or(SessionError::ConnectionClosed)
    }

    pub(crate) fn log_outbound(&self, id: &ConnectionId, frame: &Frame) {
        let logger = self
            .state
            .lock()
            .records
            .get(id)
            .map(|record| record.logger.clone());
        if let Some(logger) = logger {
            logger.frame(frame);
        }
    }

    /// Subscribes to the frames of `id`, creating the session's frame channel
    /// if no frame has arrived and nobody subscribed yet.
    pub(crate) fn subscribe(self: &Arc<Self>, id: &ConnectionId) -> crate::Result<FrameStream> {
        let mut state = self.state.lock();
        let record = state
            .records
            .get_mut(id)
            .ok_or(SessionError::ConnectionClosed)?;

        let epoch = record.epoch;
        let registry = Arc::downgrade(self);
        let channel = record.frames.get_or_insert_with(FrameChannel::new);
        let stream = channel.subscribe(id, || {
            let id = id.clone();
            TerminationHook::new(move || {
                terminate(&registry, &id, epoch, Termination::FramesDropped)
            })
        });
        debug!(
            "New frame subscriber for connection {} ({} active)",
            id,
            channel.subscriber_count()
        );
        Ok(stream)
    }

    /// Delivers an inbound frame. Returns false when the record is gone or
    /// belongs to a newer session.
    pub(crate) fn dispatch_frame(&self, id: &ConnectionId, epoch: u64, frame: Frame) -> bool {
        let logger = {
            let mut state = self.state.lock();
            match state.records.get_mut(id) {
                Some(record) if record.epoch == epoch => {
                    record
                        .frames
                        .get_or_insert_with(FrameChannel::new)
                        .push(frame.clone());
                    record.logger.clone()
                }
                _ => return false,
            }
        };
        logger.frame(&frame);
        true
    }

    /// Removes the record of `id`. With an `epoch`, only that generation of
    /// the id is removed. Returns whether a record was removed.
    pub(crate) fn remove(
        &self,
        id: &ConnectionId,
        epoch: Option<u64>,
        termination: Termination,
    ) -> bool {
        let (record, runtime) = {
            let mut state = self.state.lock();
            let matches = state
                .records
                .get(id)
                .map_or(false, |record| epoch.map_or(true, |e| record.epoch == e));
            if !matches {
                return false;
            }
            let record = state.records.remove(id);
            let runtime = if state.records.is_empty() {
                state.runtime.take()
            } else {
                None
            };
            (record, runtime)
        };

        if let Some(record) = record {
            info!("Removed connection {} ({:?})", id, termination);
            record.finish(id, &termination);
        }
        if let Some(runtime) = runtime {
            info!("Last connection closed, releasing transport runtime");
            TransportRuntime::release(runtime);
        }
        true
    }

    /// Removes every record with a local close of `code`.
    pub(crate) fn close_all(&self, code: CloseCode) -> usize {
        let ids = self.ids();
        ids.iter()
            .filter(|id| self.remove(id, None, Termination::LocalClose(code)))
            .count()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Registry")
            .field("connections", &state.records.len())
            .field("runtime", &state.runtime.is_some())
            .finish()
    }
}

/// Termination hook body shared by both stream kinds. A record that is
/// already gone, or was replaced by a newer session, is left alone.
fn terminate(registry: &Weak<Registry>, id: &ConnectionId, epoch: u64, termination: Termination) {
    if let Some(registry) = registry.upgrade() {
        if registry.remove(id, Some(epoch), termination) {
            debug!("Stream consumer closed connection {}", id);
        }
    }
}
