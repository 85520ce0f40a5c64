//! Domain entities for p2plocate.
//!
//! Pure bookkeeping with no sockets, timers or locks: the server layer owns
//! those and calls into this module to record what it hears.

/// Known peers and the functions they advertise.
///
/// See [`registry::DeviceRegistry`] for the main type.
pub mod registry;
