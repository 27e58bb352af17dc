//! Per-session frame and status streams.
//!
//! Both stream types are thin wrappers over an unbounded channel receiver that
//! carry a [`TerminationHook`]. Dropping the last consumer of a stream fires
//! its hook, which asks the registry to tear the session down.

use futures::stream::FusedStream;
use futures::Stream;
use parking_lot::Mutex;
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use tokio::sync::mpsc;

use super::frame::{ConnectionStatus, Frame};
use super::settings::ConnectionId;

type HookAction = Box<dyn FnOnce() + Send>;

/// Cleanup bound to a stream at creation time. Runs at most once, either on
/// an explicit [`fire`](Self::fire) or when the hook is dropped.
pub(crate) struct TerminationHook {
    fired: AtomicBool,
    action: Mutex<Option<HookAction>>,
}

impl TerminationHook {
    pub(crate) fn new(action: impl FnOnce() + Send + 'static) -> Self {
        Self {
            fired: AtomicBool::new(false),
            action: Mutex::new(Some(Box::new(action))),
        }
    }

    pub(crate) fn fire(&self) {
        if self
            .fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        let action = self.action.lock().take();
        if let Some(action) = action {
            action();
        }
    }

    pub(crate) fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}

impl Drop for TerminationHook {
    fn drop(&mut self) {
        self.fire();
    }
}

/// Fan-out point behind every [`FrameStream`] of one session.
///
/// The channel keeps every frame of the session. A new subscriber first
/// receives that history, then every later frame, so all subscribers observe
/// the same sequence regardless of when they subscribed.
pub(crate) struct FrameChannel {
    subscribers: Vec<mpsc::UnboundedSender<Frame>>,
    history: Vec<Frame>,
    hook: Weak<TerminationHook>,
}

impl FrameChannel {
    pub(crate) fn new() -> Self {
        Self {
            subscribers: Vec::new(),
            history: Vec::new(),
            hook: Weak::new(),
        }
    }

    pub(crate) fn push(&mut self, frame: Frame) {
        self.subscribers.retain(|tx| !tx.is_closed());
        for tx in &self.subscribers {
            let _ = tx.send(frame.clone());
        }
        self.history.push(frame);
    }

    /// Adds a subscriber. All subscribers of one channel share a single hook,
    /// built by `make_hook` the first time and fired once the last of them is
    /// dropped.
    pub(crate) fn subscribe<F>(&mut self, id: &ConnectionId, make_hook: F) -> FrameStream
    where
        F: FnOnce() -> TerminationHook,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        for frame in &self.history {
            let _ = tx.send(frame.clone());
        }
        self.subscribers.push(tx);

        let hook = match self.hook.upgrade() {
            Some(hook) => hook,
            None => {
                let hook = Arc::new(make_hook());
                self.hook = Arc::downgrade(&hook);
                hook
            }
        };

        FrameStream {
            id: id.clone(),
            rx,
            hook,
            terminated: false,
        }
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers.iter().filter(|tx| !tx.is_closed()).count()
    }
}

/// Sender half of a session's status stream.
pub(crate) struct StatusChannel {
    tx: mpsc::UnboundedSender<ConnectionStatus>,
}

impl StatusChannel {
    pub(crate) fn open(id: &ConnectionId, hook: TerminationHook) -> (Self, StatusStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        let stream = StatusStream {
            id: id.clone(),
            rx,
            hook,
            terminated: false,
        };
        (Self { tx }, stream)
    }

    pub(crate) fn push(&self, status: ConnectionStatus) {
        let _ = self.tx.send(status);
    }
}

/// Inbound frames of one session, in the order the transport raised them.
///
/// Ends after the session is removed from the registry. Dropping every
/// `FrameStream` of a live session closes that session.
pub struct FrameStream {
    id: ConnectionId,
    rx: mpsc::UnboundedReceiver<Frame>,
    hook: Arc<TerminationHook>,
    terminated: bool,
}

impl FrameStream {
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }
}

impl Stream for FrameStream {
    type Item = Frame;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Frame>> {
        if self.terminated {
            return Poll::Ready(None);
        }
        let next = self.rx.poll_recv(cx);
        if let Poll::Ready(None) = next {
            self.terminated = true;
        }
        next
    }
}

impl FusedStream for FrameStream {
    fn is_terminated(&self) -> bool {
        self.terminated
    }
}

impl fmt::Debug for FrameStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameStream")
            .field("id", &self.id)
            .field("terminated", &self.terminated)
            .field("hook_fired", &self.hook.has_fired())
            .finish()
    }
}

/// Lifecycle events of one session. The last element is terminal
/// (`DidClose`, `DidFail` or `Disconnected`) unless the stream itself was the
/// cause of the teardown.
///
/// Dropping the `StatusStream` of a live session closes that session.
pub struct StatusStream {
    id: ConnectionId,
    rx: mpsc::UnboundedReceiver<ConnectionStatus>,
    hook: TerminationHook,
    terminated: bool,
}

impl StatusStream {
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }
}

impl Stream for StatusStream {
    type Item = ConnectionStatus;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<ConnectionStatus>> {
        if self.terminated {
            return Poll::Ready(None);
        }
        let next = self.rx.poll_recv(cx);
        if let Poll::Ready(None) = next {
            self.terminated = true;
        }
        next
    }
}

impl FusedStream for StatusStream {
    fn is_terminated(&self) -> bool {
        self.terminated
    }
}

impl fmt::Debug for StatusStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusStream")
            .field("id", &self.id)
            .field("terminated", &self.terminated)
            .field("hook_fired", &self.hook.has_fired())
            .finish()
    }
}
