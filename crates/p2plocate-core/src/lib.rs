//! # p2plocate-core
//!
//! Shared library for p2plocate containing the wire protocol and the device
//! registry.
//!
//! It has no dependencies on sockets, timers or async runtimes, so the rules
//! for decoding datagrams and recording peers can be tested in isolation.
//!
//! # Architecture overview (for beginners)
//!
//! p2plocate lets programs on the same LAN find each other without a central
//! server.  Every node broadcasts a small "Discover" datagram naming itself and
//! the functions (services) it offers.  Every node listening on the same UDP
//! port hears it and records the sender.
//!
//! - **`protocol`** – What a datagram contains and how it is turned into JSON
//!   text and back.
//!
//! - **`domain`** – The `DeviceRegistry`: who has been heard from, from which
//!   address, and what they can do.

pub mod domain;
pub mod protocol;

pub use domain::registry::{Device, DeviceRegistry, Observation};
pub use protocol::codec::{decode_message, encode_message, CodecError};
pub use protocol::messages::{Message, MessageKind};
