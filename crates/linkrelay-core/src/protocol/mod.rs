//! Protocol module containing the JSON message types and the frame codec.

pub mod codec;
pub mod messages;

pub use codec::{decode_inbound, encode_outbound, DecodeError};
pub use messages::*;
