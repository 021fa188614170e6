//! Network interface discovery for multicast binding.

use std::io;
use std::net::Ipv4Addr;

use if_addrs::IfAddr;

/// An interface eligible for a multicast socket: up (it holds an address),
/// non-loopback, with an IPv4 address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MulticastCandidate {
    /// Interface name, e.g. `eth0`.
    pub name: String,
    /// The interface's IPv4 address, used for the group join and as the
    /// egress selector.
    pub addr: Ipv4Addr,
}

/// Enumerate the host's eligible interfaces.
pub fn multicast_candidates() -> io::Result<Vec<MulticastCandidate>> {
    let interfaces = if_addrs::get_if_addrs()?.into_iter().map(|iface| {
        let loopback = iface.is_loopback();
        let addr = match iface.addr {
            IfAddr::V4(v4) => Some(v4.ip),
            IfAddr::V6(_) => None,
        };
        (iface.name, addr, loopback)
    });
    Ok(filter_candidates(interfaces))
}

/// Pure filtering over `(name, ipv4_addr, is_loopback)` triples: drops
/// loopback and address-less entries and keeps one candidate per interface
/// name (an interface with several IPv4 addresses joins the group once).
pub(crate) fn filter_candidates(
    interfaces: impl IntoIterator<Item = (String, Option<Ipv4Addr>, bool)>,
) -> Vec<MulticastCandidate> {
    let mut candidates: Vec<MulticastCandidate> = Vec::new();
    for (name, addr, loopback) in interfaces {
        if loopback {
            continue;
        }
        let Some(addr) = addr else { continue };
        if addr.is_loopback() {
            continue;
        }
        if candidates.iter().any(|candidate| candidate.name == name) {
            continue;
        }
        candidates.push(MulticastCandidate { name, addr });
    }
    candidates
}

/// Best-effort local IPv4 resolution: a UDP route probe (`connect` chooses a
/// source address without sending any packet), falling back to the first
/// eligible interface, then to loopback.
pub(crate) fn resolve_local_ip(candidates: &[MulticastCandidate]) -> Ipv4Addr {
    if let Some(ip) = route_probe() {
        return ip;
    }
    candidates
        .first()
        .map(|candidate| candidate.addr)
        .unwrap_or(Ipv4Addr::LOCALHOST)
}

fn route_probe() -> Option<Ipv4Addr> {
    let socket = std::net::UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect(("8.8.8.8", 80)).ok()?;
    match socket.local_addr().ok()?.ip() {
        std::net::IpAddr::V4(ip) => Some(ip),
        std::net::IpAddr::V6(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triple(name: &str, addr: Option<&str>, loopback: bool) -> (String, Option<Ipv4Addr>, bool) {
        (
            name.to_string(),
            addr.map(|a| a.parse().unwrap()),
            loopback,
        )
    }

    #[test]
    fn test_filter_drops_loopback_and_ipv6_only() {
        let candidates = filter_candidates([
            triple("lo", Some("127.0.0.1"), true),
            triple("eth0", Some("192.168.1.10"), false),
            triple("wg0", None, false),
        ]);
        assert_eq!(
            candidates,
            vec![MulticastCandidate {
                name: "eth0".to_string(),
                addr: "192.168.1.10".parse().unwrap(),
            }]
        );
    }

    #[test]
    fn test_filter_drops_loopback_address_on_unflagged_interface() {
        let candidates = filter_candidates([triple("weird0", Some("127.0.0.2"), false)]);
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_filter_keeps_one_candidate_per_interface() {
        let candidates = filter_candidates([
            triple("eth0", Some("192.168.1.10"), false),
            triple("eth0", Some("10.0.0.10"), false),
            triple("eth1", Some("172.16.0.2"), false),
        ]);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].addr, "192.168.1.10".parse::<Ipv4Addr>().unwrap());
        assert_eq!(candidates[1].name, "eth1");
    }

    #[test]
    fn test_filter_empty_input() {
        let no_interfaces: Vec<(String, Option<Ipv4Addr>, bool)> = Vec::new();
        assert!(filter_candidates(no_interfaces).is_empty());
    }

    #[test]
    fn test_resolve_local_ip_falls_back_to_first_candidate() {
        // The route probe may or may not succeed in a sandbox; either way
        // the function must return a usable IPv4 address.
        let candidates = vec![MulticastCandidate {
            name: "eth0".to_string(),
            addr: "192.168.1.10".parse().unwrap(),
        }];
        let ip = resolve_local_ip(&candidates);
        assert!(!ip.is_unspecified());
    }

    #[test]
    fn test_resolve_local_ip_with_no_candidates_is_loopback_at_worst() {
        let ip = resolve_local_ip(&[]);
        assert!(!ip.is_unspecified());
    }
}
