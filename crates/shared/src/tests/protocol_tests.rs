use super::*;
use crate::error::ErrorCode;

#[test]
fn snapshot_event_uses_tagged_wire_shape() {
    let event = StoreEvent::Snapshot { messages: vec![] };
    let json = serde_json::to_value(&event).expect("serialize");
    assert_eq!(json["type"], "snapshot");
    assert!(json["payload"]["messages"].as_array().expect("array").is_empty());
}

#[test]
fn error_event_round_trips() {
    let event = StoreEvent::Error(ApiError::new(ErrorCode::Unauthorized, "expired token"));
    let json = serde_json::to_string(&event).expect("serialize");
    let back: StoreEvent = serde_json::from_str(&json).expect("deserialize");
    match back {
        StoreEvent::Error(err) => {
            assert_eq!(err.code, ErrorCode::Unauthorized);
            assert_eq!(err.message, "expired token");
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[test]
fn new_message_record_keeps_empty_attachment_fields() {
    let record = NewMessageRecord {
        text: "hello".to_string(),
        attachment_url: String::new(),
        attachment_path: String::new(),
        author_id: UserId::from("u1"),
        author_email: "one@example.com".to_string(),
    };
    let json = serde_json::to_value(&record).expect("serialize");
    assert_eq!(json["attachment_url"], "");
    assert_eq!(json["attachment_path"], "");
}
