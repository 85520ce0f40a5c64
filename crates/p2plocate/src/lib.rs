//! p2plocate library entry point.
//!
//! Finds peers on the local network over UDP broadcast and tracks the
//! functions each one advertises.  The binary in `main.rs` and the
//! integration tests in `tests/` share this module tree.
//!
//! Most callers need only [`DiscoveryServer`] and [`ServerConfig`]; the
//! wire format and registry live in the `p2plocate_core` crate and are
//! re-exported here.

pub mod infrastructure;

pub use infrastructure::identity::{FileIdentityProvider, IdentityProvider};
pub use infrastructure::network::interfaces::{
    FixedNetworkInfo, NetworkInfoProvider, SystemNetworkInfo,
};
pub use infrastructure::network::server::{
    DiscoverCallback, DiscoveryServer, ServerConfig, ServerError, ServerState,
    DEFAULT_ANNOUNCE_DELAY, DEFAULT_DEBOUNCE_WINDOW, DEFAULT_DISCOVERY_PORT,
};
pub use p2plocate_core::{Device, Message, MessageKind};
