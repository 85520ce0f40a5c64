//! p2plocate protocol message types.
//!
//! There is exactly one record on the wire: [`Message`].  Its `kind` selects
//! how the receiver treats it; today only [`MessageKind::Discover`] exists.
//!
//! # Forward compatibility
//!
//! The message carries no version field.  A peer running a newer build that
//! introduces a new kind will have its datagrams decoded as
//! [`MessageKind::Unknown`] and logged by the receiver, and any extra JSON
//! fields it adds are ignored.  Nothing stronger than that is guaranteed.

use std::fmt;

// ── Wire constants ────────────────────────────────────────────────────────────

/// Wire name of the Discover kind.
pub const DISCOVER_KIND: &str = "Discover";

/// Receive buffer size for one datagram.
///
/// 65 507 bytes is the largest IPv4 UDP payload, so a datagram is never
/// truncated no matter how many functions a peer advertises.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

// ── Message kind ──────────────────────────────────────────────────────────────

/// The type tag of a [`Message`] (`MsgType` on the wire).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Broadcast announcement carrying the sender's identity and functions.
    Discover,
    /// Any tag this build does not understand.  The raw tag is kept for logging.
    Unknown(String),
}

impl MessageKind {
    /// Maps a wire tag to a kind.  Matching is case-sensitive.
    pub fn from_wire(tag: &str) -> Self {
        match tag {
            DISCOVER_KIND => MessageKind::Discover,
            other => MessageKind::Unknown(other.to_string()),
        }
    }

    /// Returns the tag written to the wire.
    pub fn as_wire(&self) -> &str {
        match self {
            MessageKind::Discover => DISCOVER_KIND,
            MessageKind::Unknown(tag) => tag,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

// ── Message ───────────────────────────────────────────────────────────────────

/// One datagram's worth of protocol data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// What the receiver should do with this message.
    pub kind: MessageKind,
    /// Stable identifier of the sending node (`ClientID` on the wire).
    pub sender_id: String,
    /// Capability names in the order the sender listed them.  Duplicates are kept.
    pub functions: Vec<String>,
    /// Opaque payload reserved for future kinds (`Data` on the wire).
    pub payload: String,
}

impl Message {
    /// Builds a Discover message with an empty payload.
    pub fn discover(sender_id: impl Into<String>, functions: Vec<String>) -> Self {
        Self {
            kind: MessageKind::Discover,
            sender_id: sender_id.into(),
            functions,
            payload: String::new(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_wire_recognises_discover() {
        assert_eq!(MessageKind::from_wire("Discover"), MessageKind::Discover);
    }

    #[test]
    fn test_from_wire_is_case_sensitive() {
        assert_eq!(
            MessageKind::from_wire("discover"),
            MessageKind::Unknown("discover".to_string())
        );
    }

    #[test]
    fn test_unknown_kind_keeps_its_tag_on_the_wire() {
        // Arrange
        let kind = MessageKind::from_wire("Goodbye");

        // Act / Assert
        assert_eq!(kind.as_wire(), "Goodbye");
        assert_eq!(kind.to_string(), "Goodbye");
    }

    #[test]
    fn test_discover_constructor_sets_kind_and_empty_payload() {
        // Arrange / Act
        let msg = Message::discover("node-a", vec!["print".to_string()]);

        // Assert
        assert_eq!(msg.kind, MessageKind::Discover);
        assert_eq!(msg.sender_id, "node-a");
        assert_eq!(msg.functions, vec!["print".to_string()]);
        assert!(msg.payload.is_empty());
    }
}
