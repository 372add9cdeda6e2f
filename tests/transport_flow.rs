//! Transport-facing handling against the mock provider: addressing, mention
//! stripping, reply formatting and the typing indicator.

mod common;

use std::sync::Mutex;

use serde_json::json;

use bartender::comms::{FAILURE_NOTICE, IncomingMessage, TypingIndicator, handle_incoming};
use common::MockProvider;

#[derive(Default)]
struct RecordingIndicator {
    events: Mutex<Vec<(String, bool)>>,
}

impl TypingIndicator for RecordingIndicator {
    fn set_typing(&self, conversation_id: &str, typing: bool) {
        self.events.lock().unwrap().push((conversation_id.to_string(), typing));
    }
}

fn room_message(text: &str, was_addressed: bool) -> IncomingMessage {
    IncomingMessage {
        conversation_id: "room-1".into(),
        is_direct: false,
        was_addressed,
        text: text.into(),
        sender_name: "alice".into(),
        sender_id: "u-1".into(),
    }
}

#[tokio::test]
async fn addressed_message_gets_mentioned_reply() {
    let (mock, base) = common::start().await;
    mock.reply_completion("hi there");

    let dispatcher = common::stateless_dispatcher(&base, None);
    let indicator = RecordingIndicator::default();
    let reply = handle_incoming(&dispatcher, &indicator, &room_message("@bartender hello", true), "bartender")
        .await;

    assert_eq!(reply.as_deref(), Some("@alice hi there"));
    assert_eq!(
        mock.completion_bodies.lock().unwrap()[0]["messages"],
        json!([{ "role": "user", "content": "hello" }])
    );
    assert_eq!(
        *indicator.events.lock().unwrap(),
        vec![("room-1".to_string(), true), ("room-1".to_string(), false)]
    );
}

#[tokio::test]
async fn unaddressed_room_message_never_reaches_provider() {
    let (mock, base) = common::start().await;

    let dispatcher = common::stateless_dispatcher(&base, None);
    let indicator = RecordingIndicator::default();
    let reply = handle_incoming(&dispatcher, &indicator, &room_message("just chatting", false), "bartender")
        .await;

    assert!(reply.is_none());
    assert_eq!(MockProvider::count(&mock.counters.completions), 0);
    assert!(indicator.events.lock().unwrap().is_empty());
}

#[tokio::test]
async fn provider_rejection_becomes_notice() {
    let (mock, base) = common::start().await;
    mock.reply_completion_raw(
        axum::http::StatusCode::UNAUTHORIZED,
        json!({ "error": { "message": "bad key", "type": "invalid_request_error", "code": "invalid_api_key" }}),
    );

    let dispatcher = common::stateless_dispatcher(&base, None);
    let indicator = RecordingIndicator::default();
    let reply = handle_incoming(&dispatcher, &indicator, &room_message("@bartender hello", true), "bartender")
        .await
        .unwrap();

    assert_eq!(reply, format!("@alice {FAILURE_NOTICE}"));
    assert_eq!(indicator.events.lock().unwrap().len(), 2);
}
