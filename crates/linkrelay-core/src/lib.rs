//! # linkrelay-core
//!
//! Shared library for linkrelay containing the JSON wire protocol and the
//! domain primitives used by the pairing server.
//!
//! This crate has zero dependencies on sockets, async runtimes, or databases.
//!
//! # Architecture overview
//!
//! linkrelay pairs a *controller* device (the app that drives a session) with
//! a *companion* device (a second screen that mirrors and reports selections).
//! Both keep a WebSocket open to the server; the server relays messages
//! between whichever pair is currently linked.
//!
//! - **`protocol`** – The JSON frames that travel over the WebSocket: the
//!   `type` discriminators, the validated inbound message shape, and the
//!   outbound envelopes the server emits.
//!
//! - **`domain`** – Device identities, the controller/companion role, and the
//!   short linking codes companions display so a controller can redeem them.

pub mod domain;
pub mod protocol;

pub use domain::device::{DeviceId, DeviceKey, Role};
pub use domain::linking_code::LinkingCode;
pub use protocol::codec::{decode_inbound, encode_outbound, DecodeError};
pub use protocol::messages::{
    DeviceMessage, DeviceRequest, InboundMessage, MessageType, OutboundMessage, RelayKind,
};
