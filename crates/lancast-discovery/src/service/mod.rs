//! The public discovery instance.
//!
//! A [`Discovery`] owns the device registry, the correlation table, and the
//! handler registry; `start` binds the transport and spawns the receive
//! loops, the announcer, and the sweeper. All state lives on the instance,
//! so several independent instances can coexist in one process.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::info;
use uuid::Uuid;

use crate::config::DiscoveryConfig;
use crate::correlation::CorrelationTable;
use crate::dispatcher::{CommandHandler, Dispatcher, HandlerRegistry};
use crate::envelope::{AnnouncePayload, Envelope, Intent};
use crate::error::{DiscoveryError, DiscoveryResult};
use crate::registry::{Device, DeviceRegistry};
use crate::scheduler;
use crate::transport::Transport;

/// Live state of a started instance.
struct RuntimeState {
    transport: Arc<Transport>,
    shutdown: watch::Sender<bool>,
    local: AnnouncePayload,
}

/// A peer-discovery and message-correlation node.
pub struct Discovery {
    id: String,
    name: String,
    version: String,
    config: DiscoveryConfig,
    registry: Arc<DeviceRegistry>,
    correlations: Arc<CorrelationTable>,
    handlers: Arc<HandlerRegistry>,
    runtime: Mutex<Option<RuntimeState>>,
}

impl Discovery {
    /// Create a stopped instance. Mints the node id; performs no I/O.
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>, config: DiscoveryConfig) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            version: version.into(),
            config,
            registry: Arc::new(DeviceRegistry::new()),
            correlations: Arc::new(CorrelationTable::new()),
            handlers: Arc::new(HandlerRegistry::new()),
            runtime: Mutex::new(None),
        }
    }

    /// Bind sockets and spawn the background tasks.
    ///
    /// Fails with [`DiscoveryError::NoInterfaces`] when no multicast-capable
    /// interface is usable, and [`DiscoveryError::AlreadyStarted`] on a
    /// running instance.
    pub async fn start(&self) -> DiscoveryResult<()> {
        {
            let runtime = self.runtime.lock();
            if runtime.is_some() {
                return Err(DiscoveryError::AlreadyStarted);
            }
        }
        let transport = Arc::new(Transport::bind(self.id.clone(), &self.config).await?);
        self.start_with(transport)
    }

    /// Wire up a bound transport: receive loops, announcer, sweeper.
    pub(crate) fn start_with(&self, transport: Arc<Transport>) -> DiscoveryResult<()> {
        let local = AnnouncePayload {
            id: self.id.clone(),
            name: self.name.clone(),
            ip: transport.local_ip().to_string(),
            port: transport.local_port()?,
            version: self.version.clone(),
        };
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let dispatcher = Arc::new(Dispatcher::new(
            self.registry.clone(),
            self.correlations.clone(),
            self.handlers.clone(),
        ));
        transport.spawn_receive_loops(dispatcher, shutdown_rx.clone());
        scheduler::spawn_announcer(
            transport.clone(),
            local.clone(),
            self.config.announce_interval,
            shutdown_rx.clone(),
        );
        scheduler::spawn_sweeper(self.registry.clone(), self.config.device_ttl, shutdown_rx);

        let mut runtime = self.runtime.lock();
        if runtime.is_some() {
            // Lost a start race: tear down what was just spawned.
            let _ = shutdown_tx.send(true);
            return Err(DiscoveryError::AlreadyStarted);
        }
        *runtime = Some(RuntimeState {
            transport,
            shutdown: shutdown_tx,
            local,
        });
        drop(runtime);

        info!(id = %self.id, name = %self.name, "discovery started");
        Ok(())
    }

    /// Stop every background task and release the sockets. Idempotent.
    pub fn stop(&self) {
        let state = self.runtime.lock().take();
        if let Some(state) = state {
            let _ = state.shutdown.send(true);
            info!(id = %self.id, "discovery stopped");
        }
    }

    /// Install or replace the handler for `command`. Last registration wins;
    /// callable before or after `start`.
    pub fn register_handler(&self, command: impl Into<String>, handler: Arc<dyn CommandHandler>) {
        self.handlers.register(command, handler);
    }

    /// Stamp the local node id and route the envelope: `announce` goes to
    /// the multicast fan-out, `directed` and `response` to the unicast
    /// socket.
    pub async fn send(&self, mut envelope: Envelope) -> DiscoveryResult<()> {
        envelope.from_id = self.id.clone();
        let transport = self
            .runtime
            .lock()
            .as_ref()
            .map(|state| state.transport.clone())
            .ok_or(DiscoveryError::NotStarted)?;
        match envelope.intent {
            Intent::Announce => transport.send_announce(&envelope).await,
            Intent::Directed | Intent::Response => transport.send_directed(&envelope).await,
        }
    }

    /// Send a directed request and await its correlated response.
    ///
    /// Assigns a fresh task id when the envelope carries none, registers it,
    /// sends, then waits. On deadline expiry the registration is cancelled
    /// and [`DiscoveryError::RequestTimeout`] carries the task id. The sole
    /// blocking public operation.
    pub async fn request_response(
        &self,
        mut envelope: Envelope,
        timeout: Duration,
    ) -> DiscoveryResult<Envelope> {
        if envelope.task_id.is_empty() {
            envelope.task_id = Uuid::new_v4().to_string();
        }
        let task_id = envelope.task_id.clone();
        let waiter = self.correlations.register(task_id.clone());

        if let Err(err) = self.send(envelope).await {
            self.correlations.cancel(&task_id);
            return Err(err);
        }

        match tokio::time::timeout(timeout, waiter).await {
            Ok(Ok(response)) => Ok(response),
            // Elapsed, or the table itself went away mid-wait: either way the
            // caller gets a timeout and the slot is gone.
            Ok(Err(_)) | Err(_) => {
                self.correlations.cancel(&task_id);
                Err(DiscoveryError::RequestTimeout { task_id })
            }
        }
    }

    /// Point-in-time copy of the known peers.
    #[must_use]
    pub fn devices(&self) -> Vec<Device> {
        self.registry.snapshot()
    }

    /// The node id stamped on outgoing envelopes.
    #[must_use]
    pub fn local_id(&self) -> &str {
        &self.id
    }

    /// The node's human-readable name.
    #[must_use]
    pub fn local_name(&self) -> &str {
        &self.name
    }

    /// The advertised `ip:port` of the unicast socket, once started.
    #[must_use]
    pub fn local_addr(&self) -> Option<String> {
        self.runtime
            .lock()
            .as_ref()
            .map(|state| state.local.addr())
    }
}

impl Drop for Discovery {
    fn drop(&mut self) {
        self.stop();
    }
}
