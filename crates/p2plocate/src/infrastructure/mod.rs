//! Infrastructure layer for the discovery node.
//!
//! Contains OS-facing adapters: the client id file, network sockets and
//! interface enumeration, and configuration file storage.
//!
//! **Dependency rule**: this layer may depend on `p2plocate_core`, but the
//! core crate MUST NOT depend on anything here.

pub mod identity;
pub mod network;
pub mod storage;
