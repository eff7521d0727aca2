// Bot API client tests against a mock server

use esybot::config::TransportConfig;
use esybot::{MessageRef, Messenger, OutboundMessage};
use esybot_cli::telegram::TelegramClient;
use mockito::Matcher;
use secrecy::SecretString;
use serde_json::json;

fn client(url: String) -> TelegramClient {
    let config = TransportConfig {
        api_url: url,
        ..Default::default()
    };
    TelegramClient::new(SecretString::new(Box::from("42:test")), &config).unwrap()
}

#[tokio::test]
async fn test_get_me() {
    let mut server = mockito::Server::new_async().await;
    let _m = server
        .mock("POST", "/bot42:test/getMe")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"ok": true, "result": {"id": 42, "first_name": "Counter", "username": "counter_bot"}}"#)
        .create_async()
        .await;

    let me = client(server.url()).get_me().await.unwrap();
    assert_eq!(me.id, 42);
    assert_eq!(me.username.as_deref(), Some("counter_bot"));
}

#[tokio::test]
async fn test_send_message_body() {
    let mut server = mockito::Server::new_async().await;
    let m = server
        .mock("POST", "/bot42:test/sendMessage")
        .match_body(Matcher::PartialJson(json!({
            "chat_id": 7,
            "text": "Count: 1",
            "reply_to_message_id": 3
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"ok": true, "result": {"message_id": 99, "chat": {"id": 7}}}"#)
        .create_async()
        .await;

    let id = client(server.url())
        .reply_message(7, 3, OutboundMessage::text("Count: 1"))
        .await
        .unwrap();
    assert_eq!(id, 99);
    m.assert_async().await;
}

#[tokio::test]
async fn test_edit_and_answer() {
    let mut server = mockito::Server::new_async().await;
    let edit = server
        .mock("POST", "/bot42:test/editMessageText")
        .match_body(Matcher::PartialJson(json!({"chat_id": 7, "message_id": 5})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"ok": true, "result": true}"#)
        .create_async()
        .await;
    let answer = server
        .mock("POST", "/bot42:test/answerCallbackQuery")
        .match_body(Matcher::PartialJson(json!({
            "callback_query_id": "q1",
            "text": "Added",
            "show_alert": false
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"ok": true, "result": true}"#)
        .create_async()
        .await;

    let client = client(server.url());
    let target = MessageRef {
        chat_id: 7,
        message_id: 5,
    };
    client
        .edit_message(target, OutboundMessage::text("Pressed"))
        .await
        .unwrap();
    client
        .answer_callback("q1", Some("Added".to_string()), false)
        .await
        .unwrap();
    edit.assert_async().await;
    answer.assert_async().await;
}

#[tokio::test]
async fn test_api_error() {
    let mut server = mockito::Server::new_async().await;
    let _m = server
        .mock("POST", "/bot42:test/sendMessage")
        .with_status(403)
        .with_header("content-type", "application/json")
        .with_body(r#"{"ok": false, "error_code": 403, "description": "Forbidden: bot was blocked by the user"}"#)
        .create_async()
        .await;

    let err = client(server.url())
        .send_message(7, OutboundMessage::text("hi"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "Rejected");
    assert!(err.to_string().contains("blocked"));
}
