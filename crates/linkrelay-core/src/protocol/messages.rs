//! JSON message types for the device-facing WebSocket protocol.
//!
//! Every frame is a JSON object with a `"type"` field naming the message in
//! `SCREAMING_SNAKE_CASE`.  Devices additionally send their `deviceId`, a role
//! flag (`isCompanion` or `isController`), and per-message fields such as
//! `accessToken`, `linkedClientId` or `data`:
//!
//! ```json
//! {"type":"REQUEST_LINK","deviceId":"K1","isController":true,
//!  "linkedClientId":"123456","accessToken":"7|secret"}
//! ```
//!
//! # Why separate inbound and outbound types?
//!
//! The two directions carry different information.  Inbound frames are
//! loosely shaped and must be validated (see [`crate::protocol::codec`]);
//! once validated they become an [`InboundMessage`], which the server can
//! match on exhaustively.  Outbound frames are produced only by the server and
//! are modelled as the serde-tagged [`OutboundMessage`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::device::{DeviceId, Role};

// ── Wire type names ───────────────────────────────────────────────────────────

/// Every `type` discriminator that appears on the wire, in either direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    RequestLinkingCode,
    RegisterController,
    RequestLink,
    RequestUnlink,
    LinkingCode,
    LinkSuccess,
    LinkConnected,
    LinkDisconnected,
    LinkingError,
    UnlinkSuccess,
    SelectDepartment,
    SelectMenu,
    ChildSelected,
    CloseDrawer,
    CompanionChangedDepartment,
    FoodData,
    RequestFoodData,
    Ping,
    Pong,
}

impl MessageType {
    /// The exact string used in the `type` field.
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::RequestLinkingCode => "REQUEST_LINKING_CODE",
            MessageType::RegisterController => "REGISTER_CONTROLLER",
            MessageType::RequestLink => "REQUEST_LINK",
            MessageType::RequestUnlink => "REQUEST_UNLINK",
            MessageType::LinkingCode => "LINKING_CODE",
            MessageType::LinkSuccess => "LINK_SUCCESS",
            MessageType::LinkConnected => "LINK_CONNECTED",
            MessageType::LinkDisconnected => "LINK_DISCONNECTED",
            MessageType::LinkingError => "LINKING_ERROR",
            MessageType::UnlinkSuccess => "UNLINK_SUCCESS",
            MessageType::SelectDepartment => "SELECT_DEPARTMENT",
            MessageType::SelectMenu => "SELECT_MENU",
            MessageType::ChildSelected => "CHILD_SELECTED",
            MessageType::CloseDrawer => "CLOSE_DRAWER",
            MessageType::CompanionChangedDepartment => "COMPANION_CHANGED_DEPARTMENT",
            MessageType::FoodData => "FOOD_DATA",
            MessageType::RequestFoodData => "REQUEST_FOOD_DATA",
            MessageType::Ping => "PING",
            MessageType::Pong => "PONG",
        }
    }

    /// Parses a `type` field value.  Matching is exact (case-sensitive).
    pub fn from_wire(value: &str) -> Option<Self> {
        let ty = match value {
            "REQUEST_LINKING_CODE" => MessageType::RequestLinkingCode,
            "REGISTER_CONTROLLER" => MessageType::RegisterController,
            "REQUEST_LINK" => MessageType::RequestLink,
            "REQUEST_UNLINK" => MessageType::RequestUnlink,
            "LINKING_CODE" => MessageType::LinkingCode,
            "LINK_SUCCESS" => MessageType::LinkSuccess,
            "LINK_CONNECTED" => MessageType::LinkConnected,
            "LINK_DISCONNECTED" => MessageType::LinkDisconnected,
            "LINKING_ERROR" => MessageType::LinkingError,
            "UNLINK_SUCCESS" => MessageType::UnlinkSuccess,
            "SELECT_DEPARTMENT" => MessageType::SelectDepartment,
            "SELECT_MENU" => MessageType::SelectMenu,
            "CHILD_SELECTED" => MessageType::ChildSelected,
            "CLOSE_DRAWER" => MessageType::CloseDrawer,
            "COMPANION_CHANGED_DEPARTMENT" => MessageType::CompanionChangedDepartment,
            "FOOD_DATA" => MessageType::FoodData,
            "REQUEST_FOOD_DATA" => MessageType::RequestFoodData,
            "PING" => MessageType::Ping,
            "PONG" => MessageType::Pong,
            _ => return None,
        };
        Some(ty)
    }
}

// ── Relay kinds ───────────────────────────────────────────────────────────────

/// Application messages the server forwards unchanged in intent to the
/// sender's linked peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelayKind {
    /// Controller switched the active department.
    SelectDepartment,
    /// Controller switched the active menu.
    SelectMenu,
    /// Companion selected a child/item.
    ChildSelected,
    /// A drawer was closed on one side.
    CloseDrawer,
    /// Companion switched department locally.
    CompanionChangedDepartment,
    /// Bulk application data snapshot.
    FoodData,
    /// Ask the peer to (re)send its latest application data.
    RequestFoodData,
}

impl RelayKind {
    pub fn message_type(self) -> MessageType {
        match self {
            RelayKind::SelectDepartment => MessageType::SelectDepartment,
            RelayKind::SelectMenu => MessageType::SelectMenu,
            RelayKind::ChildSelected => MessageType::ChildSelected,
            RelayKind::CloseDrawer => MessageType::CloseDrawer,
            RelayKind::CompanionChangedDepartment => MessageType::CompanionChangedDepartment,
            RelayKind::FoodData => MessageType::FoodData,
            RelayKind::RequestFoodData => MessageType::RequestFoodData,
        }
    }

    /// Whether the relay re-transmits the original frame text instead of a
    /// reconstructed envelope.
    ///
    /// `FOOD_DATA` snapshots can be large and deeply nested; forwarding the
    /// received bytes keeps them byte-for-byte identical and skips a
    /// re-serialization.
    pub fn is_verbatim(self) -> bool {
        matches!(self, RelayKind::FoodData)
    }

    fn from_message_type(ty: MessageType) -> Option<Self> {
        let kind = match ty {
            MessageType::SelectDepartment => RelayKind::SelectDepartment,
            MessageType::SelectMenu => RelayKind::SelectMenu,
            MessageType::ChildSelected => RelayKind::ChildSelected,
            MessageType::CloseDrawer => RelayKind::CloseDrawer,
            MessageType::CompanionChangedDepartment => RelayKind::CompanionChangedDepartment,
            MessageType::FoodData => RelayKind::FoodData,
            MessageType::RequestFoodData => RelayKind::RequestFoodData,
            _ => return None,
        };
        Some(kind)
    }
}

impl TryFrom<MessageType> for RelayKind {
    type Error = MessageType;

    fn try_from(ty: MessageType) -> Result<Self, Self::Error> {
        RelayKind::from_message_type(ty).ok_or(ty)
    }
}

// ── Inbound (device → server) ─────────────────────────────────────────────────

/// A validated frame received from a device.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Keepalive probe; answered with `PONG`.  Needs no role or device id.
    Ping,
    /// Answer to a server-initiated `PING`.
    Pong,
    /// Any message sent on behalf of a role-identified device.
    Device(DeviceMessage),
}

/// A message from a device that identified both its role and its id.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceMessage {
    pub role: Role,
    pub device_id: DeviceId,
    pub request: DeviceRequest,
}

/// What a device asks the server to do.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceRequest {
    /// Companion asks for its linking code (and implicitly registers).
    RequestLinkingCode,
    /// Controller announces itself.
    RegisterController,
    /// Controller redeems a companion's linking code.
    RequestLink {
        /// The code from `linkedClientId`, as typed by the user.
        linking_code: Option<String>,
        /// Bearer credential `"<id>|<secret>"`.
        access_token: Option<String>,
    },
    /// Either side tears the current link down.
    RequestUnlink,
    /// Application message for the linked peer.
    Relay {
        kind: RelayKind,
        data: Option<Value>,
    },
}

impl DeviceRequest {
    /// Returns the wire type name for log messages.
    ///
    /// Used instead of `Debug` so credentials never end up in the log.
    pub fn type_name(&self) -> &'static str {
        match self {
            DeviceRequest::RequestLinkingCode => MessageType::RequestLinkingCode.as_str(),
            DeviceRequest::RegisterController => MessageType::RegisterController.as_str(),
            DeviceRequest::RequestLink { .. } => MessageType::RequestLink.as_str(),
            DeviceRequest::RequestUnlink => MessageType::RequestUnlink.as_str(),
            DeviceRequest::Relay { kind, .. } => kind.message_type().as_str(),
        }
    }
}

// ── Outbound (server → device) ────────────────────────────────────────────────

/// All frames the server sends to devices.
///
/// # Serde representation
///
/// ```json
/// {"type":"LINKING_CODE","code":"042917"}
/// {"type":"LINK_SUCCESS","deviceId":"C1","accessToken":"7|secret"}
/// {"type":"LINK_CONNECTED"}
/// {"type":"LINKING_ERROR","message":"Invalid access token"}
/// {"type":"SELECT_MENU","data":{"menuId":3}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboundMessage {
    /// The companion's linking code.
    LinkingCode { code: String },

    /// A link was formed; `deviceId` names the peer.
    LinkSuccess {
        #[serde(rename = "deviceId")]
        device_id: String,
        /// The controller's credential, handed to the companion so it can
        /// talk to the same backend.
        #[serde(rename = "accessToken", default, skip_serializing_if = "Option::is_none")]
        access_token: Option<String>,
    },

    /// The peer is linked and reachable.
    LinkConnected,

    /// The peer went away; the link is suspended until it returns.
    LinkDisconnected,

    /// A link request failed.
    LinkingError { message: String },

    /// The link was torn down on request.
    UnlinkSuccess,

    /// Server keepalive probe.
    Ping,

    /// Answer to a device `PING`.
    Pong,

    SelectDepartment {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    SelectMenu {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    ChildSelected {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    CloseDrawer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    CompanionChangedDepartment {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    FoodData {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    RequestFoodData,
}

impl OutboundMessage {
    /// Builds the envelope forwarded to a peer for a relayed message.
    ///
    /// `REQUEST_FOOD_DATA` never carries data; any supplied payload is dropped.
    pub fn relay(kind: RelayKind, data: Option<Value>) -> Self {
        match kind {
            RelayKind::SelectDepartment => OutboundMessage::SelectDepartment { data },
            RelayKind::SelectMenu => OutboundMessage::SelectMenu { data },
            RelayKind::ChildSelected => OutboundMessage::ChildSelected { data },
            RelayKind::CloseDrawer => OutboundMessage::CloseDrawer { data },
            RelayKind::CompanionChangedDepartment => {
                OutboundMessage::CompanionChangedDepartment { data }
            }
            RelayKind::FoodData => OutboundMessage::FoodData { data },
            RelayKind::RequestFoodData => OutboundMessage::RequestFoodData,
        }
    }

    pub fn linking_error(message: impl Into<String>) -> Self {
        OutboundMessage::LinkingError {
            message: message.into(),
        }
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            OutboundMessage::LinkingCode { .. } => MessageType::LinkingCode,
            OutboundMessage::LinkSuccess { .. } => MessageType::LinkSuccess,
            OutboundMessage::LinkConnected => MessageType::LinkConnected,
            OutboundMessage::LinkDisconnected => MessageType::LinkDisconnected,
            OutboundMessage::LinkingError { .. } => MessageType::LinkingError,
            OutboundMessage::UnlinkSuccess => MessageType::UnlinkSuccess,
            OutboundMessage::Ping => MessageType::Ping,
            OutboundMessage::Pong => MessageType::Pong,
            OutboundMessage::SelectDepartment { .. } => MessageType::SelectDepartment,
            OutboundMessage::SelectMenu { .. } => MessageType::SelectMenu,
            OutboundMessage::ChildSelected { .. } => MessageType::ChildSelected,
            OutboundMessage::CloseDrawer { .. } => MessageType::CloseDrawer,
            OutboundMessage::CompanionChangedDepartment { .. } => {
                MessageType::CompanionChangedDepartment
            }
            OutboundMessage::FoodData { .. } => MessageType::FoodData,
            OutboundMessage::RequestFoodData => MessageType::RequestFoodData,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
