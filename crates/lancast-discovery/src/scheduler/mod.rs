//! Periodic tasks: presence announcer and registry sweeper.
//!
//! Both run until the shared shutdown signal flips. The first announce goes
//! out immediately on start; subsequent ticks follow the configured
//! interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::envelope::{AnnouncePayload, Envelope};
use crate::registry::DeviceRegistry;
use crate::transport::Transport;

/// Broadcast the local identity on every tick. Send failures are logged and
/// the task keeps running; discovery degrades, it does not die.
pub(crate) fn spawn_announcer(
    transport: Arc<Transport>,
    local: AnnouncePayload,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    debug!("announcer stopped");
                    return;
                }
                _ = ticker.tick() => {
                    let envelope = Envelope::announce(&local);
                    if let Err(err) = transport.send_announce(&envelope).await {
                        error!(error = %err, "announce broadcast failed");
                    }
                }
            }
        }
    })
}

/// Evict silent devices on every TTL tick.
pub(crate) fn spawn_sweeper(
    registry: Arc<DeviceRegistry>,
    ttl: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(ttl);
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    debug!("sweeper stopped");
                    return;
                }
                _ = ticker.tick() => {
                    let removed = registry.sweep(ttl);
                    if removed > 0 {
                        debug!(removed, "registry sweep evicted devices");
                    }
                }
            }
        }
    })
}
