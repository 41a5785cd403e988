//! Frame codec: validates raw JSON text into [`InboundMessage`] and encodes
//! [`OutboundMessage`] values to text.
//!
//! Inbound frames are parsed field by field rather than through a derived
//! `Deserialize` so that each rejection carries a precise [`DecodeError`]
//! and unknown extra fields are ignored.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::device::{DeviceId, Role};
use crate::protocol::messages::{
    DeviceMessage, DeviceRequest, InboundMessage, MessageType, OutboundMessage, RelayKind,
};

/// Errors that can occur while decoding an inbound frame.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("frame is not valid JSON: {0}")]
    NotJson(String),

    #[error("frame is not a JSON object")]
    NotObject,

    #[error("frame has no `type` field")]
    MissingType,

    #[error("unknown message type `{0}`")]
    UnknownType(String),

    #[error("message type `{0}` is only sent by the server")]
    ServerOnlyType(&'static str),

    #[error("{kind} frame does not identify as companion or controller")]
    MissingRole { kind: &'static str },

    #[error("{kind} frame has no `deviceId`")]
    MissingDeviceId { kind: &'static str },

    #[error("field `{field}` must be a string")]
    InvalidField { field: &'static str },
}

/// Parses one text frame from a device.
///
/// `PING` and `PONG` are accepted without a role or device id.  Every other
/// client message must carry a non-empty `deviceId` and one of the role flags
/// `isCompanion` / `isController` (`isChecklist` is accepted as a legacy alias
/// for `isController`).  When both flags are set the device is treated as a
/// companion.
pub fn decode_inbound(raw: &str) -> Result<InboundMessage, DecodeError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| DecodeError::NotJson(e.to_string()))?;
    let obj = value.as_object().ok_or(DecodeError::NotObject)?;

    let type_name = string_field(obj, "type")?.ok_or(DecodeError::MissingType)?;
    let ty = MessageType::from_wire(type_name)
        .ok_or_else(|| DecodeError::UnknownType(type_name.to_string()))?;

    match ty {
        MessageType::Ping => return Ok(InboundMessage::Ping),
        MessageType::Pong => return Ok(InboundMessage::Pong),
        _ => {}
    }

    let request = match ty {
        MessageType::RequestLinkingCode => DeviceRequest::RequestLinkingCode,
        MessageType::RegisterController => DeviceRequest::RegisterController,
        MessageType::RequestLink => DeviceRequest::RequestLink {
            linking_code: code_field(obj, "linkedClientId"),
            access_token: string_field(obj, "accessToken")?.map(str::to_string),
        },
        MessageType::RequestUnlink => DeviceRequest::RequestUnlink,
        other => match RelayKind::try_from(other) {
            Ok(kind) => DeviceRequest::Relay {
                kind,
                data: obj.get("data").filter(|v| !v.is_null()).cloned(),
            },
            Err(server_only) => return Err(DecodeError::ServerOnlyType(server_only.as_str())),
        },
    };

    let kind = ty.as_str();
    let role = role_of(obj).ok_or(DecodeError::MissingRole { kind })?;
    let device_id = string_field(obj, "deviceId")?
        .filter(|id| !id.is_empty())
        .ok_or(DecodeError::MissingDeviceId { kind })?;

    Ok(InboundMessage::Device(DeviceMessage {
        role,
        device_id: DeviceId::new(device_id),
        request,
    }))
}

/// Serializes a server message to frame text.
pub fn encode_outbound(msg: &OutboundMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(msg)
}

/// Returns the string value of `field`, `None` when absent or `null`.
fn string_field<'a>(
    obj: &'a Map<String, Value>,
    field: &'static str,
) -> Result<Option<&'a str>, DecodeError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(DecodeError::InvalidField { field }),
    }
}

/// Reads a linking code.  Codes are digits, so a JSON number is accepted and
/// rendered as text; any other non-string value counts as absent, which the
/// linking engine answers with `LINKING_ERROR`.
fn code_field(obj: &Map<String, Value>, field: &str) -> Option<String> {
    match obj.get(field) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

fn flag(obj: &Map<String, Value>, field: &str) -> bool {
    matches!(obj.get(field), Some(Value::Bool(true)))
}

fn role_of(obj: &Map<String, Value>) -> Option<Role> {
    if flag(obj, "isCompanion") {
        Some(Role::Companion)
    } else if flag(obj, "isController") || flag(obj, "isChecklist") {
        Some(Role::Controller)
    } else {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
