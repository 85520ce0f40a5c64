//! Network infrastructure for the discovery node.
//!
//! # Sub-modules
//!
//! - **`server`** – The UDP discovery server: binds the discovery port,
//!   receives Discover datagrams, maintains the device registry, and
//!   broadcasts this node's own Discover message.
//!
//! - **`interfaces`** – Enumerates local IPv4 interfaces and computes the
//!   subnet broadcast address Discover datagrams are sent to.
//!
//! - **`debounce`** – The settle timer that turns a burst of new peers into a
//!   single re-broadcast and callback.

pub(crate) mod debounce;
pub mod interfaces;
pub mod server;
