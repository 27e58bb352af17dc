use std::future::Future;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::TransportSection;
use crate::error::TransportError;

/// Execution context shared by every session's transport tasks.
///
/// Created lazily by the first open and released by the registry once no
/// session is left. Dropping it shuts the worker pool down without blocking,
/// so the last owner may be an async task, even one running on this pool.
pub struct TransportRuntime {
    runtime: Option<Runtime>,
    handle: Handle,
    shutdown_grace: Duration,
}

impl TransportRuntime {
    pub fn new(section: &TransportSection) -> Result<Self, TransportError> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(section.worker_threads.max(1))
            .thread_name("ws-sessions-transport")
            .enable_all()
            .build()
            .map_err(|e| TransportError::Runtime(e.to_string()))?;
        let handle = runtime.handle().clone();
        debug!(
            "Built transport runtime with {} worker threads",
            section.worker_threads.max(1)
        );

        Ok(Self {
            runtime: Some(runtime),
            handle,
            shutdown_grace: section.shutdown_grace(),
        })
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(future)
    }

    /// Gives in-flight writes (close frames in particular) the grace period
    /// before the pool is torn down.
    pub(crate) fn release(runtime: Arc<Self>) {
        let grace = runtime.shutdown_grace;
        let spawned = thread::Builder::new()
            .name("ws-sessions-release".to_string())
            .spawn(move || {
                thread::sleep(grace);
                drop(runtime);
            });
        if let Err(e) = spawned {
            warn!("Failed to spawn transport release thread: {}", e);
        }
    }
}

impl Drop for TransportRuntime {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
            debug!("Transport runtime shut down");
        }
    }
}

impl std::fmt::Debug for TransportRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportRuntime")
            .field("shutdown_grace", &self.shutdown_grace)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;

    #[tokio::test]
    async fn test_spawn_runs_on_transport_pool() {
        let config = ClientConfig::new_for_test().unwrap();
        let runtime = TransportRuntime::new(&config.transport).unwrap();

        let name = runtime
            .spawn(async { thread::current().name().map(str::to_string) })
            .await
            .unwrap();
        assert_eq!(name.as_deref(), Some("ws-sessions-transport"));

        // Dropping inside an async context must not panic.
        drop(runtime);
    }

    #[tokio::test]
    async fn test_release_stops_pool() {
        let config = ClientConfig::new_for_test().unwrap();
        let runtime = Arc::new(TransportRuntime::new(&config.transport).unwrap());
        let handle = runtime.handle().clone();

        TransportRuntime::release(runtime);
        tokio::time::sleep(config.transport.shutdown_grace() * 6).await;

        let join = handle.spawn(async { 1 });
        assert!(join.await.is_err());
    }
}
