//! Transport-facing side of the bot.
//!
//! A chat transport turns whatever it receives into an [`IncomingMessage`]
//! and hands it to [`handle_incoming`], which decides whether the bot should
//! answer, keeps the typing indicator up for the duration of the provider
//! call, and formats the reply (or a generic failure notice) for delivery.
//! Delivery itself stays with the transport.

pub mod pty;

use tracing::{debug, error, info};
use uuid::Uuid;

use crate::conversation::Dispatcher;

/// Shown to the sender when a reply could not be produced. Details go to the log.
pub const FAILURE_NOTICE: &str = ":x: Sorry, something went wrong while processing your request. \
    Please try again later. :x:";

/// A message as received from the chat transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    /// Stable room / direct-message identifier.
    pub conversation_id: String,
    pub is_direct: bool,
    /// The bot was @-mentioned.
    pub was_addressed: bool,
    pub text: String,
    pub sender_name: String,
    pub sender_id: String,
}

impl IncomingMessage {
    /// Direct messages and messages that mention the bot get a reply.
    pub fn wants_reply(&self) -> bool {
        self.is_direct || self.was_addressed
    }
}

/// Transport capability for showing that the bot is composing a reply.
pub trait TypingIndicator: Send + Sync {
    fn set_typing(&self, conversation_id: &str, typing: bool);
}

/// Raises the typing indicator on creation and clears it on drop, so every
/// exit path (reply, provider error, early return, panic) clears it.
pub struct TypingGuard<'a> {
    indicator: &'a dyn TypingIndicator,
    conversation_id: &'a str,
}

impl<'a> TypingGuard<'a> {
    pub fn start(indicator: &'a dyn TypingIndicator, conversation_id: &'a str) -> Self {
        indicator.set_typing(conversation_id, true);
        Self { indicator, conversation_id }
    }
}

impl Drop for TypingGuard<'_> {
    fn drop(&mut self) {
        self.indicator.set_typing(self.conversation_id, false);
    }
}

/// Remove a leading `@bot_name` address from `text`.
pub fn strip_address<'t>(text: &'t str, bot_name: &str) -> &'t str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix('@') else { return trimmed };
    let Some(head) = rest.get(..bot_name.len()) else { return trimmed };
    if !head.eq_ignore_ascii_case(bot_name) {
        return trimmed;
    }
    let tail = &rest[bot_name.len()..];
    match tail.chars().next() {
        None => "",
        Some(c) if c.is_whitespace() || c == ':' || c == ',' => {
            tail.trim_start_matches([':', ',']).trim()
        }
        // `@bot_nameXYZ` is somebody else.
        Some(_) => trimmed,
    }
}

/// Handle one incoming message end to end.
///
/// Returns the text to deliver, already prefixed with an @-mention of the
/// sender, or `None` when the bot should stay silent.
pub async fn handle_incoming(
    dispatcher: &Dispatcher,
    typing: &dyn TypingIndicator,
    msg: &IncomingMessage,
    bot_name: &str,
) -> Option<String> {
    if !msg.wants_reply() {
        return None;
    }

    let text = strip_address(&msg.text, bot_name);
    if text.is_empty() {
        debug!(conversation_id = %msg.conversation_id, "addressed with empty text, ignoring");
        return None;
    }

    let request_id = Uuid::new_v4();
    info!(%request_id, conversation_id = %msg.conversation_id, sender = %msg.sender_name, "incoming message");

    let result = {
        let _typing = TypingGuard::start(typing, &msg.conversation_id);
        dispatcher
            .respond(&msg.conversation_id, text, Some(msg.sender_id.as_str()))
            .await
    };

    match result {
        Ok(reply) => {
            debug!(%request_id, reply_len = reply.len(), "reply ready");
            Some(format!("@{} {}", msg.sender_name, reply))
        }
        Err(e) => {
            error!(%request_id, conversation_id = %msg.conversation_id, error = %e, "provider request failed");
            Some(format!("@{} {}", msg.sender_name, FAILURE_NOTICE))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::conversation::DispatcherSettings;
    use crate::llm::ModelParams;
    use crate::llm::client::{ClientSettings, ProviderClient};

    #[derive(Default)]
    struct RecordingIndicator {
        events: Mutex<Vec<bool>>,
    }

    impl TypingIndicator for RecordingIndicator {
        fn set_typing(&self, _conversation_id: &str, typing: bool) {
            self.events.lock().unwrap().push(typing);
        }
    }

    fn unreachable_dispatcher() -> Dispatcher {
        let client = ProviderClient::new(ClientSettings {
            api_base_url: "http://127.0.0.1:1/v1".into(),
            completion_path: "/chat/completions".into(),
            model: "test-model".into(),
            params: ModelParams::default(),
            timeout_seconds: 1,
            api_key: None,
        })
        .unwrap();
        Dispatcher::new(client, DispatcherSettings::default(), CancellationToken::new())
    }

    fn message(text: &str, is_direct: bool, was_addressed: bool) -> IncomingMessage {
        IncomingMessage {
            conversation_id: "room-1".into(),
            is_direct,
            was_addressed,
            text: text.into(),
            sender_name: "alice".into(),
            sender_id: "u-1".into(),
        }
    }

    #[test]
    fn strip_address_removes_bot_mention() {
        assert_eq!(strip_address("@bartender hello there", "bartender"), "hello there");
        assert_eq!(strip_address("@Bartender: hi", "bartender"), "hi");
        assert_eq!(strip_address("  plain text ", "bartender"), "plain text");
        assert_eq!(strip_address("@bartender", "bartender"), "");
    }

    #[test]
    fn strip_address_keeps_other_mentions() {
        assert_eq!(strip_address("@bartenders hi", "bartender"), "@bartenders hi");
        assert_eq!(strip_address("@bob hi", "bartender"), "@bob hi");
        assert_eq!(strip_address("@b", "bartender"), "@b");
    }

    #[test]
    fn typing_guard_clears_on_drop() {
        let indicator = RecordingIndicator::default();
        {
            let _g = TypingGuard::start(&indicator, "room-1");
            assert_eq!(*indicator.events.lock().unwrap(), vec![true]);
        }
        assert_eq!(*indicator.events.lock().unwrap(), vec![true, false]);
    }

    #[tokio::test]
    async fn unaddressed_room_message_is_ignored() {
        let dispatcher = unreachable_dispatcher();
        let indicator = RecordingIndicator::default();
        let reply = handle_incoming(&dispatcher, &indicator, &message("hi", false, false), "bartender").await;
        assert!(reply.is_none());
        assert!(indicator.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn provider_failure_yields_notice_and_clears_typing() {
        let dispatcher = unreachable_dispatcher();
        let indicator = RecordingIndicator::default();
        let reply = handle_incoming(&dispatcher, &indicator, &message("hi", true, false), "bartender")
            .await
            .unwrap();
        assert!(reply.starts_with("@alice :x:"));
        assert_eq!(*indicator.events.lock().unwrap(), vec![true, false]);
        // Failed turns are not recorded.
        assert!(dispatcher.history().unwrap().read("room-1").is_empty());
    }
}
