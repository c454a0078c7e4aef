//! Bot API payload decoding and message normalization.

use chatbridge::adapters::telegram::{normalize, photo_text, relay_text, send_message_params, Update};
use chatbridge::relay::{Network, SendOptions};

fn update(json: &str) -> Update {
    serde_json::from_str(json).expect("update decodes")
}

#[test]
fn group_text_message_normalizes_with_origin() {
    let update = update(
        r#"{
            "update_id": 10,
            "message": {
                "message_id": 5,
                "from": {"id": 42, "is_bot": false, "first_name": "Alice", "username": "alice"},
                "chat": {"id": -100200, "type": "supergroup", "title": "Bridge"},
                "date": 1700000000,
                "text": "hello"
            }
        }"#,
    );
    let message = update.message.expect("has message");
    let msg = normalize(&message, "hello".to_owned()).expect("has sender");

    assert_eq!(msg.source, Network::Telegram);
    assert_eq!(msg.author, "alice");
    let origin = msg.telegram.expect("origin attached");
    assert_eq!(origin.chat_id, -100_200);
    assert!(origin.is_group);
    assert_eq!(origin.sender_id, 42);
    assert_eq!(origin.sender_username.as_deref(), Some("alice"));
}

#[test]
fn author_falls_back_to_first_name() {
    let update = update(
        r#"{
            "update_id": 11,
            "message": {
                "message_id": 6,
                "from": {"id": 7, "is_bot": false, "first_name": "Bob"},
                "chat": {"id": 7, "type": "private", "first_name": "Bob"},
                "date": 1700000000,
                "text": "hi"
            }
        }"#,
    );
    let message = update.message.expect("has message");
    let msg = normalize(&message, "hi".to_owned()).expect("has sender");
    assert_eq!(msg.author, "Bob");
    let origin = msg.telegram.expect("origin attached");
    assert!(!origin.is_group);
    assert_eq!(origin.sender_username, None);
}

#[test]
fn photo_sizes_keep_order_and_caption() {
    let update = update(
        r#"{
            "update_id": 12,
            "message": {
                "message_id": 7,
                "from": {"id": 1, "is_bot": false, "first_name": "C"},
                "chat": {"id": -5, "type": "group"},
                "date": 1700000000,
                "caption": "sunset",
                "photo": [
                    {"file_id": "small", "file_unique_id": "a", "width": 90, "height": 60},
                    {"file_id": "large", "file_unique_id": "b", "width": 1280, "height": 853}
                ]
            }
        }"#,
    );
    let message = update.message.expect("has message");
    assert_eq!(message.text, None);
    assert_eq!(message.caption.as_deref(), Some("sunset"));
    assert_eq!(message.photo.last().map(|p| p.file_id.as_str()), Some("large"));
}

#[test]
fn update_without_message_decodes() {
    let update = update(r#"{"update_id": 13, "edited_message": {"message_id": 1}}"#);
    assert!(update.message.is_none());
}

#[test]
fn channel_post_without_sender_is_not_normalized() {
    let update = update(
        r#"{
            "update_id": 14,
            "message": {
                "message_id": 8,
                "chat": {"id": -9, "type": "channel"},
                "date": 1700000000,
                "text": "announcement"
            }
        }"#,
    );
    let message = update.message.expect("has message");
    assert!(normalize(&message, "announcement".to_owned()).is_none());
}

#[test]
fn photo_text_joins_caption_and_link() {
    assert_eq!(
        photo_text(Some("sunset"), "https://i.imgur.com/a.jpg"),
        "sunset https://i.imgur.com/a.jpg"
    );
}

#[test]
fn plain_send_has_no_quiet_flags() {
    let params = send_message_params(-5, "<a> b", SendOptions::default());
    assert_eq!(params["chat_id"], -5);
    assert_eq!(params["text"], "<a> b");
    assert!(params.get("link_preview_options").is_none());
}

#[test]
fn uploaded_photo_relays_caption_and_link() {
    assert_eq!(
        relay_text(None, Some("sunset"), Some("https://i.imgur.com/a.jpg")).as_deref(),
        Some("sunset https://i.imgur.com/a.jpg")
    );
    assert_eq!(
        relay_text(None, None, Some("https://i.imgur.com/a.jpg")).as_deref(),
        Some("https://i.imgur.com/a.jpg")
    );
}

#[test]
fn failed_or_disabled_upload_falls_back_to_caption() {
    assert_eq!(relay_text(None, Some("sunset"), None).as_deref(), Some("sunset"));
    assert_eq!(relay_text(Some(""), Some("sunset"), None).as_deref(), Some("sunset"));
}

#[test]
fn photo_without_caption_or_link_is_skipped() {
    assert_eq!(relay_text(None, None, None), None);
    assert_eq!(relay_text(None, Some("   "), None), None);
}

#[test]
fn message_text_wins_over_photo() {
    assert_eq!(
        relay_text(Some("hello"), Some("ignored"), Some("https://i.imgur.com/a.jpg")).as_deref(),
        Some("hello")
    );
}
