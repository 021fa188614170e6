//! Device registry: the table of live peers.
//!
//! Populated by the dispatcher on announce receipt, read by callers via
//! snapshots, and pruned by the scheduler's sweep. Readers always get copies;
//! entries never leave the registry by reference.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::envelope::AnnouncePayload;

/// A remembered remote node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    /// Stable node identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// IPv4 address the node announced.
    pub ip: String,
    /// Unicast port for directed envelopes.
    pub port: u16,
    /// Software version string.
    pub version: String,
    /// When the last announcement from this node arrived.
    pub last_seen: Instant,
}

impl Device {
    /// `ip:port` string usable as an envelope destination.
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

/// Concurrent table of known peers keyed by node id.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: RwLock<HashMap<String, Device>>,
}

impl DeviceRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or refresh a peer from its announcement, stamping `last_seen`
    /// with the current time.
    pub fn upsert(&self, announce: &AnnouncePayload) {
        let device = Device {
            id: announce.id.clone(),
            name: announce.name.clone(),
            ip: announce.ip.clone(),
            port: announce.port,
            version: announce.version.clone(),
            last_seen: Instant::now(),
        };
        let previous = self.devices.write().insert(device.id.clone(), device);
        if previous.is_none() {
            info!(
                id = %announce.id,
                name = %announce.name,
                ip = %announce.ip,
                port = announce.port,
                "device discovered"
            );
        } else {
            debug!(id = %announce.id, "device refreshed");
        }
    }

    /// Look up one peer by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Device> {
        self.devices.read().get(id).cloned()
    }

    /// Point-in-time copy of every known peer. Safe to call concurrently
    /// with `upsert` and `sweep`.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Device> {
        self.devices.read().values().cloned().collect()
    }

    /// Number of known peers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.read().len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.read().is_empty()
    }

    /// Remove every peer silent for longer than `ttl` as of `now`; returns
    /// the eviction count. `now` is explicit so expiry is deterministic
    /// under test.
    pub fn sweep_at(&self, now: Instant, ttl: Duration) -> usize {
        let mut devices = self.devices.write();
        let expired: Vec<String> = devices
            .values()
            .filter(|device| now.duration_since(device.last_seen) > ttl)
            .map(|device| device.id.clone())
            .collect();
        for id in &expired {
            devices.remove(id);
            info!(id = %id, "device expired");
        }
        expired.len()
    }

    /// Sweep against the current time.
    pub fn sweep(&self, ttl: Duration) -> usize {
        self.sweep_at(Instant::now(), ttl)
    }
}
