mod common;

use std::time::Duration;

use smokewatch::{NotificationSink, TelegramConfig, TelegramSink};

fn sink(api_base: &str) -> TelegramSink {
    TelegramSink::new(TelegramConfig {
        bot_token: "123:SECRET".to_string(),
        api_base: api_base.to_string(),
        timeout: Duration::from_secs(2),
    })
    .expect("telegram sink")
}

#[test]
fn send_text_posts_json_to_send_message() {
    let (base, server) = common::serve_once(
        200,
        "application/json",
        br#"{"ok":true,"result":{}}"#.to_vec(),
    );

    sink(&base)
        .send_text("-1001", "Smoke detected! confidence 0.87")
        .expect("send text");

    let request = server.join().expect("server");
    assert!(request
        .request_line
        .starts_with("POST /bot123:SECRET/sendMessage "));
    let body: serde_json::Value = serde_json::from_slice(&request.body).expect("json body");
    assert_eq!(body["chat_id"], "-1001");
    assert_eq!(body["text"], "Smoke detected! confidence 0.87");
}

#[test]
fn send_photo_uploads_multipart_jpeg() {
    let (base, server) = common::serve_once(
        200,
        "application/json",
        br#"{"ok":true,"result":{}}"#.to_vec(),
    );
    let jpeg = common::sample_jpeg(8, 8);

    sink(&base)
        .send_photo("-1001", &jpeg, "Smoke: 0.87")
        .expect("send photo");

    let request = server.join().expect("server");
    assert!(request
        .request_line
        .starts_with("POST /bot123:SECRET/sendPhoto "));
    let content_type = request.header("content-type").expect("content type");
    assert!(content_type.starts_with("multipart/form-data; boundary="));

    let text = String::from_utf8_lossy(&request.body);
    assert!(text.contains("name=\"chat_id\""));
    assert!(text.contains("-1001"));
    assert!(text.contains("name=\"caption\""));
    assert!(text.contains("Smoke: 0.87"));
    assert!(text.contains("filename=\"smoke_detected.jpg\""));
    assert!(text.to_lowercase().contains("content-type: image/jpeg"));
    assert!(request
        .body
        .windows(jpeg.len())
        .any(|window| window == jpeg.as_slice()));
}

#[test]
fn api_rejection_is_an_error_without_the_token() {
    let (base, server) = common::serve_once(
        401,
        "application/json",
        br#"{"ok":false,"error_code":401,"description":"Unauthorized"}"#.to_vec(),
    );

    let err = sink(&base).send_text("-1001", "hello").unwrap_err();
    let message = format!("{:#}", err);
    assert!(message.contains("Unauthorized"));
    assert!(!message.contains("SECRET"));
    server.join().expect("server");
}

#[test]
fn ok_false_in_success_response_is_an_error() {
    let (base, server) = common::serve_once(
        200,
        "application/json",
        br#"{"ok":false,"error_code":400,"description":"Bad Request: chat not found"}"#.to_vec(),
    );

    let err = sink(&base).send_text("-1001", "hello").unwrap_err();
    assert!(err.to_string().contains("chat not found"));
    server.join().expect("server");
}
