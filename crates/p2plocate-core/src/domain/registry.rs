//! Device registry: the node's in-memory view of every peer it has heard from.
//!
//! Each entry is a [`Device`] keyed by its peer identifier.  Entries are never
//! removed; a repeat announcement from a known peer overwrites its functions,
//! source address and last-seen time in place.
//!
//! # Ordering
//!
//! Queries return devices in the order their peers were first seen.  The
//! registry keeps a `Vec` for that order plus a `HashMap` index for O(1)
//! lookup by peer id.
//!
//! # Thread safety
//!
//! `DeviceRegistry` has no internal locking.  The discovery server keeps it
//! behind a mutex and holds that mutex only for the duration of one call.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::SystemTime;

/// A remote peer as last reported on the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    /// The peer's identifier (the `ClientID` it sends).
    pub peer_id: String,
    /// Functions from the peer's most recent announcement.
    pub functions: Vec<String>,
    /// Source endpoint of the most recent datagram.
    ///
    /// The port is the ephemeral port of the peer's send socket, not the
    /// discovery port the peer listens on.
    pub address: SocketAddr,
    /// When the most recent datagram was received.
    pub last_seen: SystemTime,
}

impl Device {
    /// Returns `true` if `function` is one of the advertised function names.
    ///
    /// Tokens are compared exactly; `"Function1"` does not match `"Function12"`.
    pub fn has_function(&self, function: &str) -> bool {
        self.functions.iter().any(|f| f == function)
    }
}

/// What [`DeviceRegistry::observe`] did with an announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// First announcement from this peer; a new entry was inserted.
    Added,
    /// The peer was already known; its entry was refreshed.
    Updated,
}

/// Insertion-ordered map from peer id to [`Device`].
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: Vec<Device>,
    index: HashMap<String, usize>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an announcement from `peer_id`.
    pub fn observe(
        &mut self,
        peer_id: &str,
        functions: Vec<String>,
        address: SocketAddr,
        seen: SystemTime,
    ) -> Observation {
        if let Some(&slot) = self.index.get(peer_id) {
            let device = &mut self.devices[slot];
            device.functions = functions;
            device.address = address;
            device.last_seen = seen;
            return Observation::Updated;
        }

        self.index.insert(peer_id.to_string(), self.devices.len());
        self.devices.push(Device {
            peer_id: peer_id.to_string(),
            functions,
            address,
            last_seen: seen,
        });
        Observation::Added
    }

    /// Returns the device registered under `peer_id`.
    pub fn get(&self, peer_id: &str) -> Option<&Device> {
        self.index.get(peer_id).map(|&slot| &self.devices[slot])
    }

    /// Returns every device advertising `function`, in first-seen order.
    pub fn devices_with_function(&self, function: &str) -> Vec<Device> {
        self.devices
            .iter()
            .filter(|d| d.has_function(function))
            .cloned()
            .collect()
    }

    /// Returns a snapshot of all devices in first-seen order.
    pub fn all(&self) -> Vec<Device> {
        self.devices.clone()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([192, 168, 1, 20], port))
    }

    fn funcs(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_registry_starts_empty() {
        let registry = DeviceRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.all().is_empty());
    }

    #[test]
    fn test_observe_new_peer_returns_added() {
        // Arrange
        let mut registry = DeviceRegistry::new();

        // Act
        let outcome = registry.observe("a", funcs(&["print"]), addr(5000), SystemTime::now());

        // Assert
        assert_eq!(outcome, Observation::Added);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("a").unwrap().functions, funcs(&["print"]));
    }

    #[test]
    fn test_observe_known_peer_overwrites_in_place() {
        // Arrange
        let mut registry = DeviceRegistry::new();
        let first = SystemTime::UNIX_EPOCH + Duration::from_secs(10);
        let second = first + Duration::from_secs(5);
        registry.observe("a", funcs(&["print"]), addr(5000), first);
        registry.observe("b", funcs(&["scan"]), addr(5001), first);

        // Act
        let outcome = registry.observe("a", funcs(&["print", "fax"]), addr(6000), second);

        // Assert
        assert_eq!(outcome, Observation::Updated);
        assert_eq!(registry.len(), 2);
        let device = registry.get("a").unwrap();
        assert_eq!(device.functions, funcs(&["print", "fax"]));
        assert_eq!(device.address, addr(6000));
        assert_eq!(device.last_seen, second);
        // Position is unchanged by the update.
        assert_eq!(registry.all()[0].peer_id, "a");
    }

    #[test]
    fn test_get_unknown_peer_returns_none() {
        let registry = DeviceRegistry::new();
        assert!(registry.get("nobody").is_none());
    }

    #[test]
    fn test_devices_with_function_matches_exact_tokens_only() {
        // Arrange
        let mut registry = DeviceRegistry::new();
        let now = SystemTime::now();
        registry.observe("exact", funcs(&["Function1", "Function2"]), addr(1), now);
        registry.observe("prefix", funcs(&["Function12"]), addr(2), now);
        registry.observe("other", funcs(&["Function2"]), addr(3), now);

        // Act
        let found = registry.devices_with_function("Function1");

        // Assert
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].peer_id, "exact");
    }

    #[test]
    fn test_devices_with_function_keeps_insertion_order() {
        // Arrange
        let mut registry = DeviceRegistry::new();
        let now = SystemTime::now();
        for id in ["z", "m", "a"] {
            registry.observe(id, funcs(&["shared"]), addr(1), now);
        }

        // Act
        let ids: Vec<String> = registry
            .devices_with_function("shared")
            .into_iter()
            .map(|d| d.peer_id)
            .collect();

        // Assert
        assert_eq!(ids, vec!["z", "m", "a"]);
    }

    #[test]
    fn test_has_function_with_duplicates() {
        let device = Device {
            peer_id: "d".to_string(),
            functions: funcs(&["x", "x"]),
            address: addr(1),
            last_seen: SystemTime::now(),
        };
        assert!(device.has_function("x"));
        assert!(!device.has_function("X"));
    }
}
