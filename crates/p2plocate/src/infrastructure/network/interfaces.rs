//! Local interface enumeration and subnet broadcast computation.
//!
//! The discovery server needs one thing from this module: an IPv4 address to
//! send Discover datagrams to.  That is the *subnet broadcast address* of a
//! local interface, e.g. `192.168.1.255` for a host at `192.168.1.20/24`.
//!
//! # Computing a broadcast address (for beginners)
//!
//! An IPv4 address is 32 bits.  The subnet mask marks which of those bits name
//! the network (1s) and which name the host (0s).  Setting every host bit to 1
//! gives the address that reaches every host on the subnet:
//!
//! ```text
//! address   192.168.001.020   11000000.10101000.00000001.00010100
//! !mask     000.000.000.255   00000000.00000000.00000000.11111111
//! address | !mask           = 192.168.1.255
//! ```
//!
//! # Enumeration
//!
//! - Linux: parses `ip -4 addr show`, which includes each prefix length.
//! - Elsewhere, or when `ip` is unavailable (e.g. minimal containers): the
//!   `local_ip_address` crate, which reports addresses without masks.  Those
//!   addresses get no subnet broadcast and the caller falls back to the
//!   limited broadcast address `255.255.255.255`.

use std::net::{IpAddr, Ipv4Addr};

use tracing::debug;

/// Supplies local addressing information to the discovery server.
#[cfg_attr(test, mockall::automock)]
pub trait NetworkInfoProvider: Send + Sync {
    /// Returns every non-loopback IPv4 address of every local interface.
    fn local_ipv4_addresses(&self) -> Vec<Ipv4Addr>;

    /// Returns the subnet broadcast address for the local address `ip`, or
    /// `None` if `ip` is not local or its mask is unknown.
    fn broadcast_address_for(&self, ip: Ipv4Addr) -> Option<Ipv4Addr>;

    /// Picks the broadcast address Discover datagrams are sent to.
    ///
    /// Uses the first local address with a known subnet, falling back to
    /// `255.255.255.255`.
    fn local_broadcast_address(&self) -> Ipv4Addr {
        self.local_ipv4_addresses()
            .into_iter()
            .find_map(|ip| self.broadcast_address_for(ip))
            .unwrap_or(Ipv4Addr::BROADCAST)
    }
}

/// A local IPv4 address and, when known, its prefix length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceAddr {
    pub addr: Ipv4Addr,
    pub prefix_len: Option<u8>,
}

/// Converts a prefix length (`/24`) into a subnet mask (`255.255.255.0`).
///
/// Lengths above 32 are clamped to 32.
pub fn prefix_to_mask(prefix_len: u8) -> Ipv4Addr {
    let bits = u32::from(prefix_len.min(32));
    let mask = if bits == 0 { 0 } else { u32::MAX << (32 - bits) };
    Ipv4Addr::from(mask)
}

/// Returns `ip | !mask`: `ip` with every host bit set.
pub fn subnet_broadcast(ip: Ipv4Addr, mask: Ipv4Addr) -> Ipv4Addr {
    Ipv4Addr::from(u32::from(ip) | !u32::from(mask))
}

/// [`NetworkInfoProvider`] backed by the host's real interfaces.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemNetworkInfo;

impl SystemNetworkInfo {
    /// Enumerates non-loopback IPv4 interface addresses.
    pub fn interfaces(&self) -> Vec<InterfaceAddr> {
        interfaces_platform()
    }
}

impl NetworkInfoProvider for SystemNetworkInfo {
    fn local_ipv4_addresses(&self) -> Vec<Ipv4Addr> {
        self.interfaces().into_iter().map(|i| i.addr).collect()
    }

    fn broadcast_address_for(&self, ip: Ipv4Addr) -> Option<Ipv4Addr> {
        self.interfaces()
            .into_iter()
            .find(|i| i.addr == ip)
            .and_then(|i| i.prefix_len)
            .map(|prefix| subnet_broadcast(ip, prefix_to_mask(prefix)))
    }

    fn local_broadcast_address(&self) -> Ipv4Addr {
        // One enumeration instead of one per candidate address.
        let broadcast = self
            .interfaces()
            .into_iter()
            .find_map(|i| {
                i.prefix_len
                    .map(|prefix| subnet_broadcast(i.addr, prefix_to_mask(prefix)))
            })
            .unwrap_or(Ipv4Addr::BROADCAST);
        debug!("resolved local broadcast address {broadcast}");
        broadcast
    }
}

/// Fixed, in-memory [`NetworkInfoProvider`] for tests and for hosts where the
/// caller already knows its addressing.
#[derive(Debug, Clone, Default)]
pub struct FixedNetworkInfo {
    interfaces: Vec<InterfaceAddr>,
}

impl FixedNetworkInfo {
    /// Creates a provider from `(address, prefix_len)` pairs.
    pub fn new(interfaces: impl IntoIterator<Item = (Ipv4Addr, u8)>) -> Self {
        Self {
            interfaces: interfaces
                .into_iter()
                .map(|(addr, prefix)| InterfaceAddr {
                    addr,
                    prefix_len: Some(prefix),
                })
                .collect(),
        }
    }
}

impl NetworkInfoProvider for FixedNetworkInfo {
    fn local_ipv4_addresses(&self) -> Vec<Ipv4Addr> {
        self.interfaces.iter().map(|i| i.addr).collect()
    }

    fn broadcast_address_for(&self, ip: Ipv4Addr) -> Option<Ipv4Addr> {
        self.interfaces
            .iter()
            .find(|i| i.addr == ip)
            .and_then(|i| i.prefix_len)
            .map(|prefix| subnet_broadcast(ip, prefix_to_mask(prefix)))
    }
}

// ── Platform enumeration ──────────────────────────────────────────────────────

#[cfg(target_os = "linux")]
fn interfaces_platform() -> Vec<InterfaceAddr> {
    use std::process::Command;

    match Command::new("ip").args(["-4", "addr", "show"]).output() {
        Ok(output) if output.status.success() => {
            let parsed = parse_ip_addr_output(&String::from_utf8_lossy(&output.stdout));
            if parsed.is_empty() {
                interfaces_portable()
            } else {
                parsed
            }
        }
        _ => {
            debug!("'ip' command unavailable, using local_ip_address crate");
            interfaces_portable()
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn interfaces_platform() -> Vec<InterfaceAddr> {
    interfaces_portable()
}

/// Portable enumeration via the `local_ip_address` crate.  Masks are unknown.
fn interfaces_portable() -> Vec<InterfaceAddr> {
    let interfaces = match local_ip_address::list_afinet_netifas() {
        Ok(ifs) => ifs,
        Err(e) => {
            debug!("failed to list network interfaces: {e}");
            return Vec::new();
        }
    };

    interfaces
        .into_iter()
        .filter_map(|(_name, ip)| match ip {
            IpAddr::V4(v4) if !v4.is_loopback() => Some(InterfaceAddr {
                addr: v4,
                prefix_len: None,
            }),
            _ => None,
        })
        .collect()
}

/// Extracts `inet a.b.c.d/nn` entries from `ip -4 addr show` output,
/// skipping loopback addresses.
pub(crate) fn parse_ip_addr_output(stdout: &str) -> Vec<InterfaceAddr> {
    stdout
        .lines()
        .filter_map(|line| line.trim().strip_prefix("inet "))
        .filter_map(|rest| rest.split_whitespace().next())
        .filter_map(|cidr| {
            let (addr, prefix) = match cidr.split_once('/') {
                Some((addr, prefix)) => (addr, prefix.parse::<u8>().ok()),
                None => (cidr, None),
            };
            let addr = addr.parse::<Ipv4Addr>().ok()?;
            (!addr.is_loopback()).then_some(InterfaceAddr {
                addr,
                prefix_len: prefix,
            })
        })
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const IP_ADDR_SAMPLE: &str = "\
1: lo: <LOOPBACK,UP,LOWER_UP> mtu 65536 qdisc noqueue state UNKNOWN group default qlen 1000
    inet 127.0.0.1/8 scope host lo
       valid_lft forever preferred_lft forever
2: eth0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 qdisc fq_codel state UP group default qlen 1000
    inet 192.168.1.20/24 brd 192.168.1.255 scope global dynamic eth0
       valid_lft 86012sec preferred_lft 86012sec
3: docker0: <NO-CARRIER,BROADCAST,MULTICAST,UP> mtu 1500 qdisc noqueue state DOWN group default
    inet 172.17.0.1/16 brd 172.17.255.255 scope global docker0
       valid_lft forever preferred_lft forever
";

    #[test]
    fn test_prefix_to_mask_common_lengths() {
        assert_eq!(prefix_to_mask(24), Ipv4Addr::new(255, 255, 255, 0));
        assert_eq!(prefix_to_mask(16), Ipv4Addr::new(255, 255, 0, 0));
        assert_eq!(prefix_to_mask(20), Ipv4Addr::new(255, 255, 240, 0));
        assert_eq!(prefix_to_mask(32), Ipv4Addr::new(255, 255, 255, 255));
        assert_eq!(prefix_to_mask(0), Ipv4Addr::new(0, 0, 0, 0));
    }

    #[test]
    fn test_prefix_to_mask_clamps_oversized_prefix() {
        assert_eq!(prefix_to_mask(40), Ipv4Addr::new(255, 255, 255, 255));
    }

    #[test]
    fn test_subnet_broadcast_sets_host_bits() {
        // Arrange
        let ip = Ipv4Addr::new(192, 168, 1, 1);

        // Act / Assert
        assert_eq!(
            subnet_broadcast(ip, prefix_to_mask(24)),
            Ipv4Addr::new(192, 168, 1, 255)
        );
        assert_eq!(
            subnet_broadcast(Ipv4Addr::new(10, 1, 2, 3), prefix_to_mask(8)),
            Ipv4Addr::new(10, 255, 255, 255)
        );
        assert_eq!(
            subnet_broadcast(Ipv4Addr::new(172, 16, 5, 9), prefix_to_mask(20)),
            Ipv4Addr::new(172, 16, 15, 255)
        );
    }

    #[test]
    fn test_parse_ip_addr_output_skips_loopback_and_keeps_prefixes() {
        // Act
        let parsed = parse_ip_addr_output(IP_ADDR_SAMPLE);

        // Assert
        assert_eq!(
            parsed,
            vec![
                InterfaceAddr {
                    addr: Ipv4Addr::new(192, 168, 1, 20),
                    prefix_len: Some(24)
                },
                InterfaceAddr {
                    addr: Ipv4Addr::new(172, 17, 0, 1),
                    prefix_len: Some(16)
                },
            ]
        );
    }

    #[test]
    fn test_parse_ip_addr_output_ignores_garbage() {
        assert!(parse_ip_addr_output("inet not-an-address/24\nrandom line\n").is_empty());
    }

    #[test]
    fn test_fixed_provider_computes_broadcast_for_known_address() {
        // Arrange
        let info = FixedNetworkInfo::new([(Ipv4Addr::new(192, 168, 1, 20), 24)]);

        // Act / Assert
        assert_eq!(
            info.broadcast_address_for(Ipv4Addr::new(192, 168, 1, 20)),
            Some(Ipv4Addr::new(192, 168, 1, 255))
        );
        assert_eq!(info.broadcast_address_for(Ipv4Addr::new(10, 0, 0, 1)), None);
    }

    #[test]
    fn test_local_broadcast_address_uses_first_interface() {
        let info = FixedNetworkInfo::new([
            (Ipv4Addr::new(10, 0, 0, 7), 8),
            (Ipv4Addr::new(192, 168, 1, 20), 24),
        ]);
        assert_eq!(info.local_broadcast_address(), Ipv4Addr::new(10, 255, 255, 255));
    }

    #[test]
    fn test_local_broadcast_address_falls_back_to_limited_broadcast() {
        let info = FixedNetworkInfo::default();
        assert_eq!(info.local_broadcast_address(), Ipv4Addr::BROADCAST);
    }

    #[test]
    fn test_system_provider_reports_no_loopback_addresses() {
        // The host's interfaces vary; only the loopback exclusion is portable.
        let addrs = SystemNetworkInfo.local_ipv4_addresses();
        assert!(addrs.iter().all(|a| !a.is_loopback()));
    }
}
