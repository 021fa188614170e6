//! Discovery configuration.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

/// Default multicast group for the discovery channel.
pub const DEFAULT_MULTICAST_GROUP: SocketAddrV4 =
    SocketAddrV4::new(Ipv4Addr::new(239, 0, 0, 1), 9999);

/// Default interval between presence announcements.
pub const DEFAULT_ANNOUNCE_INTERVAL: Duration = Duration::from_secs(15);

/// Default silence window after which a device is considered gone.
///
/// Must exceed [`DEFAULT_ANNOUNCE_INTERVAL`] by a safety margin so that one
/// lost announcement does not evict a live peer.
pub const DEFAULT_DEVICE_TTL: Duration = Duration::from_secs(25);

/// Tunables for a [`Discovery`](crate::Discovery) instance.
///
/// `device_ttl` must be kept larger than `announce_interval`; the defaults
/// leave a 10 second margin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// Multicast group address and port for the discovery channel.
    pub multicast_group: SocketAddrV4,
    /// Interval between announce broadcasts.
    pub announce_interval: Duration,
    /// Maximum silence before a device is swept from the registry.
    pub device_ttl: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            multicast_group: DEFAULT_MULTICAST_GROUP,
            announce_interval: DEFAULT_ANNOUNCE_INTERVAL,
            device_ttl: DEFAULT_DEVICE_TTL,
        }
    }
}
