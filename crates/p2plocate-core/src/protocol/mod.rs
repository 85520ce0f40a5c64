//! Protocol module containing the message type and the JSON codec.

pub mod codec;
pub mod messages;

pub use codec::{decode_message, encode_message, CodecError};
pub use messages::*;
