//! imgur upload response handling.

use chatbridge::adapters::imgur::{parse_upload_response, UploadError};

#[test]
fn successful_upload_yields_link_and_deletion_page() {
    let image = parse_upload_response(
        r#"{"data":{"id":"abc","deletehash":"xyz","link":"https://i.imgur.com/abc.jpg"},"success":true,"status":200}"#,
    )
    .expect("upload succeeded");
    assert_eq!(image.link, "https://i.imgur.com/abc.jpg");
    assert_eq!(image.deletion_link(), "https://imgur.com/delete/xyz");
}

#[test]
fn negative_response_is_rejected() {
    let err = parse_upload_response(
        r#"{"data":{"error":"Invalid client_id","request":"/3/image","method":"POST"},"success":false,"status":403}"#,
    )
    .expect_err("upload rejected");
    assert!(matches!(err, UploadError::Rejected(403)));
}

#[test]
fn malformed_body_is_a_parse_error() {
    let err = parse_upload_response("<html>").expect_err("not json");
    assert!(matches!(err, UploadError::Parse(_)));
}
