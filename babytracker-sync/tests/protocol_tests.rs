use babytracker_sync::{
    Rejection, Response, SyncError, SyncLimits, SyncMessage, REASON_APPROVAL_REQUIRED,
};
use babytracker_types::{DeviceId, Event, SubType, SyncId, Timestamp, Tombstone};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

fn sample_message() -> SyncMessage {
    let event = Event::feeding(SubType::Bottle, Some(120))
        .at(Timestamp::from_millis(1_000))
        .updated(Timestamp::from_millis(2_000))
        .with_note("warm");
    let tombstone = Tombstone::new(SyncId::from("gone"), Timestamp::from_millis(500));
    SyncMessage::snapshot(DeviceId::from("dev-a"), "Phone A", "Ada", &[event], &[tombstone])
}

// ── Encoding ────────────────────────────────────────────────────

#[test]
fn encodes_camel_case_fields() {
    let value = serde_json::to_value(sample_message()).unwrap();
    assert_eq!(value["deviceId"], "dev-a");
    assert_eq!(value["deviceName"], "Phone A");
    assert_eq!(value["babyName"], "Ada");

    let event = &value["events"][0];
    assert_eq!(event["eventType"], "FEEDING");
    assert_eq!(event["subType"], "BOTTLE");
    assert_eq!(event["timestamp"], 1_000);
    assert_eq!(event["updatedAt"], 2_000);
    assert_eq!(event["milliliters"], 120);
    assert_eq!(event["note"], "warm");
    assert!(event.get("localId").is_none());

    assert_eq!(value["tombstones"][0], json!({"syncId": "gone", "deletedAt": 500}));
}

#[test]
fn omits_empty_optional_fields() {
    let event = Event::diaper(SubType::Pee);
    let message = SyncMessage::snapshot(DeviceId::from("dev"), "", "", &[event], &[]);
    let value = serde_json::to_value(&message).unwrap();

    assert!(value.get("deviceName").is_none());
    assert!(value.get("babyName").is_none());
    assert!(value["events"][0].get("milliliters").is_none());
    assert!(value["events"][0].get("note").is_none());
    assert_eq!(value["tombstones"], json!([]));
}

// ── Decoding ────────────────────────────────────────────────────

#[test]
fn decodes_minimal_message() {
    let line = r#"{"deviceId":"dev-b","events":[]}"#;
    let message = SyncMessage::from_line(line).unwrap();
    assert_eq!(message.device_id, DeviceId::from("dev-b"));
    assert_eq!(message.device_name, "");
    assert_eq!(message.baby_name, "");
    assert!(message.events.is_empty());
    assert!(message.tombstones.is_empty());
}

#[test]
fn missing_updated_at_falls_back_to_timestamp() {
    let line = r#"{"deviceId":"d","events":[{"syncId":"s1","eventType":"SPIT_UP","subType":"SPIT_UP","timestamp":777}]}"#;
    let message = SyncMessage::from_line(line).unwrap();
    let wire = &message.events[0];
    assert!(wire.updated_at.is_none());
    assert_eq!(wire.updated_at(), Timestamp::from_millis(777));

    let event = wire.clone().into_event();
    assert_eq!(event.local_id, 0);
    assert_eq!(event.updated_at, Timestamp::from_millis(777));
}

#[test]
fn unknown_vocabulary_still_decodes() {
    let line = r#"{"deviceId":"d","events":[{"syncId":"s1","eventType":"SLEEP","subType":"NAP","timestamp":1,"updatedAt":1}]}"#;
    let message = SyncMessage::from_line(line).unwrap();
    assert_eq!(message.events[0].event_type, "SLEEP");
}

#[test]
fn missing_device_id_is_an_error() {
    assert!(SyncMessage::from_line(r#"{"events":[]}"#).is_err());
}

#[test]
fn missing_events_is_an_error() {
    assert!(SyncMessage::from_line(r#"{"deviceId":"d"}"#).is_err());
}

#[test]
fn malformed_json_is_serialization_error() {
    let err = SyncMessage::from_line("{not json").unwrap_err();
    assert!(matches!(err, SyncError::Serialization(_)));
}

#[test]
fn snapshot_survives_encode_and_decode() {
    let message = sample_message();
    let line = serde_json::to_string(&message).unwrap();
    assert_eq!(SyncMessage::from_line(&line).unwrap(), message);
}

// ── Responses ───────────────────────────────────────────────────

#[test]
fn rejection_wire_shape() {
    let value = serde_json::to_value(Rejection::approval_required("Kitchen")).unwrap();
    assert_eq!(
        value,
        json!({"approved": false, "reason": REASON_APPROVAL_REQUIRED, "deviceName": "Kitchen"})
    );
}

#[test]
fn response_recognises_approval_rejection() {
    let line = r#"{"approved":false,"reason":"approval_required"}"#;
    match Response::from_line(line).unwrap() {
        Response::ApprovalRequired(rejection) => {
            assert!(rejection.is_approval_required());
            assert_eq!(rejection.device_name, "");
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[test]
fn response_decodes_data() {
    let line = serde_json::to_string(&sample_message()).unwrap();
    assert_eq!(
        Response::from_line(&line).unwrap(),
        Response::Data(sample_message())
    );
}

#[test]
fn other_rejection_reason_is_protocol_error() {
    let line = r#"{"approved":false,"reason":"busy"}"#;
    let err = Response::from_line(line).unwrap_err();
    assert!(matches!(err, SyncError::Protocol(_)));
}

#[test]
fn approved_flag_alone_does_not_make_a_rejection() {
    let mut value: Value = serde_json::to_value(sample_message()).unwrap();
    value["approved"] = json!(true);
    let response = Response::from_line(&value.to_string()).unwrap();
    assert!(matches!(response, Response::Data(_)));
}

// ── Limits ──────────────────────────────────────────────────────

#[test]
fn check_limits_counts_records() {
    let limits = SyncLimits {
        max_events: 1,
        max_tombstones: 1,
        ..SyncLimits::default()
    };
    let message = sample_message();
    assert!(message.check_limits(&limits).is_ok());

    let mut too_many_events = message.clone();
    too_many_events.events.push(too_many_events.events[0].clone());
    let err = too_many_events.check_limits(&limits).unwrap_err();
    assert!(matches!(err, SyncError::LimitExceeded { what: "events", count: 2, limit: 1 }));

    let mut too_many_tombstones = message;
    too_many_tombstones
        .tombstones
        .push(too_many_tombstones.tombstones[0].clone());
    let err = too_many_tombstones.check_limits(&limits).unwrap_err();
    assert!(matches!(err, SyncError::LimitExceeded { what: "tombstones", .. }));
}
