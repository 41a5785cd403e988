//! Integration tests for the linkrelay-core frame codec.
//!
//! These tests drive the public API with frames shaped the way the mobile
//! apps actually send them, including extra fields the server ignores.

use linkrelay_core::{
    decode_inbound, encode_outbound, DecodeError, DeviceMessage, DeviceRequest, InboundMessage,
    OutboundMessage, RelayKind, Role,
};
use serde_json::{json, Value};

fn decode_device(raw: &str) -> DeviceMessage {
    match decode_inbound(raw).expect("decode must succeed") {
        InboundMessage::Device(msg) => msg,
        other => panic!("expected a device message, got {other:?}"),
    }
}

#[test]
fn test_every_relay_type_decodes_for_either_role() {
    let cases = [
        ("SELECT_DEPARTMENT", RelayKind::SelectDepartment),
        ("SELECT_MENU", RelayKind::SelectMenu),
        ("CHILD_SELECTED", RelayKind::ChildSelected),
        ("CLOSE_DRAWER", RelayKind::CloseDrawer),
        ("COMPANION_CHANGED_DEPARTMENT", RelayKind::CompanionChangedDepartment),
        ("FOOD_DATA", RelayKind::FoodData),
        ("REQUEST_FOOD_DATA", RelayKind::RequestFoodData),
    ];

    for (wire, kind) in cases {
        for (flag, role) in [("isCompanion", Role::Companion), ("isController", Role::Controller)] {
            // Arrange
            let raw = json!({"type": wire, "deviceId": "D1", flag: true}).to_string();

            // Act
            let msg = decode_device(&raw);

            // Assert
            assert_eq!(msg.role, role, "{wire} with {flag}");
            assert!(
                matches!(msg.request, DeviceRequest::Relay { kind: k, .. } if k == kind),
                "{wire} must decode as relay kind {kind:?}"
            );
        }
    }
}

#[test]
fn test_unrecognised_fields_are_ignored() {
    let msg = decode_device(
        r#"{"type":"REGISTER_CONTROLLER","deviceId":"K1","isController":true,
            "appVersion":"3.2.1","platform":"ios"}"#,
    );
    assert_eq!(msg.request, DeviceRequest::RegisterController);
}

#[test]
fn test_request_link_without_code_still_decodes() {
    // The missing code is reported to the device by the server, not dropped here.
    let msg = decode_device(r#"{"type":"REQUEST_LINK","deviceId":"K1","isController":true}"#);
    assert_eq!(
        msg.request,
        DeviceRequest::RequestLink {
            linking_code: None,
            access_token: None,
        }
    );
}

#[test]
fn test_false_role_flags_do_not_identify_a_role() {
    let err = decode_inbound(
        r#"{"type":"REQUEST_LINKING_CODE","deviceId":"C1","isCompanion":false,"isController":false}"#,
    )
    .unwrap_err();
    assert_eq!(
        err,
        DecodeError::MissingRole {
            kind: "REQUEST_LINKING_CODE"
        }
    );
}

#[test]
fn test_null_data_is_treated_as_absent() {
    let msg = decode_device(r#"{"type":"CLOSE_DRAWER","deviceId":"C1","isCompanion":true,"data":null}"#);
    assert_eq!(
        msg.request,
        DeviceRequest::Relay {
            kind: RelayKind::CloseDrawer,
            data: None,
        }
    );
}

#[test]
fn test_missing_type_is_rejected() {
    assert_eq!(
        decode_inbound(r#"{"deviceId":"C1","isCompanion":true}"#),
        Err(DecodeError::MissingType)
    );
}

#[test]
fn test_encoded_linking_error_carries_message_text() {
    let text = encode_outbound(&OutboundMessage::linking_error(
        "No companion found with that linking code",
    ))
    .expect("encode must succeed");
    let value: Value = serde_json::from_str(&text).expect("valid JSON");
    assert_eq!(
        value,
        json!({"type": "LINKING_ERROR", "message": "No companion found with that linking code"})
    );
}
