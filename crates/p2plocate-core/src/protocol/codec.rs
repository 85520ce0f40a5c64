//! JSON codec for p2plocate protocol messages.
//!
//! Wire format (one UTF-8 JSON object per datagram):
//! ```text
//! {"MsgType":"Discover","ClientID":"<id>","Functions":["a","b"],"Data":""}
//! ```
//!
//! Decoding is lenient: missing fields take their empty value, a `null`
//! `Functions` array decodes as an empty list, and unknown fields are ignored.

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::protocol::messages::{Message, MessageKind};

/// Errors that can occur during message encoding or decoding.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The datagram is not a JSON object of the expected shape.
    #[error("malformed message: {0}")]
    Decode(#[source] serde_json::Error),

    /// The message could not be serialized.
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Field layout as it appears on the wire.
#[derive(Debug, Default, Serialize, Deserialize)]
struct WireMessage {
    #[serde(rename = "MsgType", default)]
    msg_type: String,
    #[serde(rename = "ClientID", default)]
    client_id: String,
    #[serde(rename = "Functions", default, deserialize_with = "null_as_empty")]
    functions: Vec<String>,
    #[serde(rename = "Data", default)]
    data: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl From<&Message> for WireMessage {
    fn from(msg: &Message) -> Self {
        Self {
            msg_type: msg.kind.as_wire().to_string(),
            client_id: msg.sender_id.clone(),
            functions: msg.functions.clone(),
            data: msg.payload.clone(),
        }
    }
}

impl From<WireMessage> for Message {
    fn from(wire: WireMessage) -> Self {
        Self {
            kind: MessageKind::from_wire(&wire.msg_type),
            sender_id: wire.client_id,
            functions: wire.functions,
            payload: wire.data,
        }
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a [`Message`] into the bytes of one datagram.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if serialization fails.
///
/// # Examples
///
/// ```rust
/// use p2plocate_core::protocol::{decode_message, encode_message, Message};
///
/// let msg = Message::discover("node-1", vec!["Function1".to_string()]);
/// let bytes = encode_message(&msg).unwrap();
/// assert_eq!(decode_message(&bytes).unwrap(), msg);
/// ```
pub fn encode_message(msg: &Message) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(&WireMessage::from(msg)).map_err(CodecError::Encode)
}

/// Decodes one [`Message`] from the bytes of a datagram.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] if the bytes are not a JSON object or a
/// field has the wrong JSON type.
pub fn decode_message(bytes: &[u8]) -> Result<Message, CodecError> {
    let wire: WireMessage = serde_json::from_slice(bytes).map_err(CodecError::Decode)?;
    Ok(wire.into())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
