//! UDP transport: multicast discovery channel plus unicast directed channel.
//!
//! One multicast socket is bound per eligible interface so announcements
//! reach every attached LAN segment; one unicast socket carries directed
//! envelopes. Receive loops decode datagrams, suppress the node's own
//! traffic, and hand everything else to the dispatcher. A bad datagram or a
//! transient read error never terminates a loop.

pub mod interfaces;

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{debug, error, warn};

use crate::config::DiscoveryConfig;
use crate::dispatcher::Dispatcher;
use crate::envelope::{Envelope, MAX_DATAGRAM_LEN};
use crate::error::{DiscoveryError, DiscoveryResult};
use interfaces::MulticastCandidate;

/// Bound sockets for one discovery instance.
pub struct Transport {
    local_id: String,
    group: SocketAddrV4,
    local_ip: Ipv4Addr,
    multicast: Vec<(MulticastCandidate, Arc<UdpSocket>)>,
    unicast: Arc<UdpSocket>,
}

impl Transport {
    /// Discover eligible interfaces and bind every socket.
    ///
    /// A bind or group-join failure on one interface is logged and that
    /// interface skipped; zero usable interfaces is fatal
    /// ([`DiscoveryError::NoInterfaces`]).
    pub async fn bind(local_id: String, config: &DiscoveryConfig) -> DiscoveryResult<Self> {
        let candidates = interfaces::multicast_candidates()
            .map_err(|source| DiscoveryError::Bind { source })?;
        let local_ip = interfaces::resolve_local_ip(&candidates);

        let group = config.multicast_group;
        let mut multicast = Vec::new();
        for candidate in candidates {
            match bind_multicast(candidate.addr, group) {
                Ok(socket) => {
                    debug!(
                        interface = %candidate.name,
                        addr = %candidate.addr,
                        group = %group,
                        "multicast socket bound"
                    );
                    multicast.push((candidate, Arc::new(socket)));
                }
                Err(err) => {
                    warn!(
                        interface = %candidate.name,
                        error = %err,
                        "multicast bind failed, skipping interface"
                    );
                }
            }
        }
        if multicast.is_empty() {
            return Err(DiscoveryError::NoInterfaces);
        }

        let unicast = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
            .await
            .map_err(|source| DiscoveryError::Bind { source })?;

        Ok(Self {
            local_id,
            group,
            local_ip,
            multicast,
            unicast: Arc::new(unicast),
        })
    }

    /// Loopback-only transport with no multicast sockets, for exercising the
    /// unicast path deterministically.
    #[cfg(test)]
    pub(crate) async fn bind_unicast_only(local_id: String) -> std::io::Result<Self> {
        let unicast = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await?;
        Ok(Self {
            local_id,
            group: crate::config::DEFAULT_MULTICAST_GROUP,
            local_ip: Ipv4Addr::LOCALHOST,
            multicast: Vec::new(),
            unicast: Arc::new(unicast),
        })
    }

    /// The node's resolved IPv4 address (announced to peers).
    #[must_use]
    pub fn local_ip(&self) -> Ipv4Addr {
        self.local_ip
    }

    /// The unicast socket's port (announced to peers).
    pub fn local_port(&self) -> DiscoveryResult<u16> {
        self.unicast
            .local_addr()
            .map(|addr| addr.port())
            .map_err(|source| DiscoveryError::Bind { source })
    }

    /// Serialize once and write to every multicast socket. Per-socket
    /// failures are logged; after all sends were attempted the last failure
    /// is returned, so partial fan-out failure does not abort the rest.
    pub async fn send_announce(&self, envelope: &Envelope) -> DiscoveryResult<()> {
        let data = envelope.encode()?;
        let group = SocketAddr::V4(self.group);
        let mut last_error = None;
        for (candidate, socket) in &self.multicast {
            if let Err(err) = socket.send_to(&data, group).await {
                error!(
                    interface = %candidate.name,
                    error = %err,
                    "multicast send failed"
                );
                last_error = Some(DiscoveryError::Send {
                    reason: format!("multicast send on {} failed: {err}", candidate.name),
                });
            }
        }
        match last_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Resolve the envelope's destination and write via the unicast socket.
    pub async fn send_directed(&self, envelope: &Envelope) -> DiscoveryResult<()> {
        let destination = envelope
            .destination
            .as_deref()
            .ok_or(DiscoveryError::MissingDestination)?;
        let data = envelope.encode()?;
        let target = tokio::net::lookup_host(destination)
            .await
            .map_err(|err| DiscoveryError::Send {
                reason: format!("resolve {destination} failed: {err}"),
            })?
            .next()
            .ok_or_else(|| DiscoveryError::Send {
                reason: format!("{destination} resolved to no address"),
            })?;
        self.unicast
            .send_to(&data, target)
            .await
            .map_err(|err| DiscoveryError::Send {
                reason: format!("unicast send to {destination} failed: {err}"),
            })?;
        Ok(())
    }

    /// Spawn one receive loop per bound socket. Every loop exits when the
    /// shutdown signal flips.
    pub fn spawn_receive_loops(
        &self,
        dispatcher: Arc<Dispatcher>,
        shutdown: watch::Receiver<bool>,
    ) {
        for (candidate, socket) in &self.multicast {
            tokio::spawn(receive_loop(
                format!("multicast:{}", candidate.name),
                socket.clone(),
                self.local_id.clone(),
                dispatcher.clone(),
                shutdown.clone(),
            ));
        }
        tokio::spawn(receive_loop(
            "unicast".to_string(),
            self.unicast.clone(),
            self.local_id.clone(),
            dispatcher,
            shutdown,
        ));
    }
}

/// Build one multicast socket bound to the group port on `interface_addr`.
///
/// `SO_REUSEADDR` lets several sockets (and several processes on the same
/// host) share the group port.
fn bind_multicast(interface_addr: Ipv4Addr, group: SocketAddrV4) -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    let bind_addr = SocketAddr::from(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, group.port()));
    socket.bind(&bind_addr.into())?;
    socket.join_multicast_v4(group.ip(), &interface_addr)?;
    socket.set_multicast_if_v4(&interface_addr)?;
    socket.set_multicast_loop_v4(true)?;
    UdpSocket::from_std(socket.into())
}

/// Read datagrams until shutdown. Timeout-free: the async read is cancelled
/// directly by the `select!` arm observing the shutdown signal. Decode
/// failures and transient I/O errors are logged and skipped.
async fn receive_loop(
    label: String,
    socket: Arc<UdpSocket>,
    local_id: String,
    dispatcher: Arc<Dispatcher>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM_LEN];
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                debug!(socket = %label, "receive loop stopped");
                return;
            }
            received = socket.recv_from(&mut buf) => {
                let (len, source) = match received {
                    Ok(pair) => pair,
                    Err(err) => {
                        error!(socket = %label, error = %err, "datagram read failed");
                        continue;
                    }
                };
                let envelope = match Envelope::decode(&buf[..len]) {
                    Ok(envelope) => envelope,
                    Err(err) => {
                        warn!(
                            socket = %label,
                            %source,
                            error = %err,
                            "dropping malformed datagram"
                        );
                        continue;
                    }
                };
                if envelope.from_id == local_id {
                    continue;
                }
                dispatcher.dispatch(source, envelope);
            }
        }
    }
}

#[cfg(test)]
mod tests;
