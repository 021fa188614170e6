//! Inbound pipeline: classify every received envelope.
//!
//! Announcements update the device registry (and still reach a registered
//! `"announce"` handler, so collaborators can observe them); responses
//! resolve the correlation table; everything else goes to the command
//! handler registered for it, invoked on its own task so a slow handler
//! cannot stall a receive loop.

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{error, info, warn};

use crate::correlation::CorrelationTable;
use crate::envelope::{AnnouncePayload, Envelope, ANNOUNCE_COMMAND};
use crate::registry::DeviceRegistry;

/// Business logic plugged in for one command name.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Handle one envelope. `source` is the address the datagram arrived
    /// from, which is the right destination for an [`Envelope::reply`].
    async fn handle(&self, source: SocketAddr, envelope: Envelope);
}

struct FnCommandHandler<F> {
    func: F,
}

#[async_trait]
impl<F, Fut> CommandHandler for FnCommandHandler<F>
where
    F: Fn(SocketAddr, Envelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn handle(&self, source: SocketAddr, envelope: Envelope) {
        (self.func)(source, envelope).await;
    }
}

/// Adapt an async closure into a [`CommandHandler`].
pub fn handler_fn<F, Fut>(func: F) -> Arc<dyn CommandHandler>
where
    F: Fn(SocketAddr, Envelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(FnCommandHandler { func })
}

/// Command name → handler table. Last registration for a name wins.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn CommandHandler>>>,
}

impl HandlerRegistry {
    /// Create an empty handler table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or replace the handler for `command`.
    pub fn register(&self, command: impl Into<String>, handler: Arc<dyn CommandHandler>) {
        self.handlers.write().insert(command.into(), handler);
    }

    /// Look up the handler for `command`.
    #[must_use]
    pub fn get(&self, command: &str) -> Option<Arc<dyn CommandHandler>> {
        self.handlers.read().get(command).cloned()
    }
}

/// The received-message pipeline shared by every receive loop.
pub struct Dispatcher {
    registry: Arc<DeviceRegistry>,
    correlations: Arc<CorrelationTable>,
    handlers: Arc<HandlerRegistry>,
}

impl Dispatcher {
    /// Wire the pipeline to its tables.
    pub fn new(
        registry: Arc<DeviceRegistry>,
        correlations: Arc<CorrelationTable>,
        handlers: Arc<HandlerRegistry>,
    ) -> Self {
        Self {
            registry,
            correlations,
            handlers,
        }
    }

    /// Process one decoded inbound envelope. Must run inside a tokio
    /// runtime: handler invocations are spawned as independent tasks.
    pub fn dispatch(&self, source: SocketAddr, envelope: Envelope) {
        if envelope.command == ANNOUNCE_COMMAND {
            match AnnouncePayload::from_envelope(&envelope) {
                Ok(info) => self.registry.upsert(&info),
                Err(err) => {
                    warn!(%source, error = %err, "announce payload parse failed");
                    return;
                }
            }
            // Fall through: an "announce" handler, if registered, still runs.
        }

        if self.correlations.resolve(&envelope.task_id, envelope.clone()) {
            return;
        }

        let Some(handler) = self.handlers.get(&envelope.command) else {
            if envelope.command != ANNOUNCE_COMMAND {
                info!(command = %envelope.command, %source, "unregistered command");
            }
            return;
        };

        let command = envelope.command.clone();
        let invocation = tokio::spawn(async move { handler.handle(source, envelope).await });
        // Watch the handler task so a panic is logged instead of vanishing;
        // the receive loop itself is never unwound.
        tokio::spawn(async move {
            if let Err(err) = invocation.await {
                if err.is_panic() {
                    error!(command = %command, "command handler panicked");
                }
            }
        });
    }
}
