//! Completion style: the whole transcript is replayed on every call.

use tracing::{debug, warn};

use super::history::HistoryStore;
use crate::llm::client::ProviderClient;
use crate::llm::{ConversationTurn, ProviderError};

#[derive(Debug)]
pub struct StatelessResponder {
    client: ProviderClient,
    history: HistoryStore,
    /// System turn prepended to every transcript; never stored in history.
    pre_prompt: Option<String>,
    /// Forward the sender id as the completion `user` field.
    send_user_id: bool,
}

impl StatelessResponder {
    pub fn new(
        client: ProviderClient,
        history: HistoryStore,
        pre_prompt: Option<String>,
        send_user_id: bool,
    ) -> Self {
        let pre_prompt = pre_prompt
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());
        Self { client, history, pre_prompt, send_user_id }
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// `[pre-prompt]? + history + [user turn]`.
    pub fn transcript(&self, conversation_id: &str, user_turn: &ConversationTurn) -> Vec<ConversationTurn> {
        let mut transcript = Vec::new();
        if let Some(p) = &self.pre_prompt {
            transcript.push(ConversationTurn::system(p.as_str()));
        }
        transcript.extend(self.history.read(conversation_id));
        transcript.push(user_turn.clone());
        transcript
    }

    pub async fn respond(
        &self,
        conversation_id: &str,
        text: &str,
        sender_tag: Option<&str>,
    ) -> Result<String, ProviderError> {
        let user_turn = ConversationTurn::user(text);
        let transcript = self.transcript(conversation_id, &user_turn);
        let user_tag = if self.send_user_id { sender_tag } else { None };

        debug!(conversation_id, turns = transcript.len(), "completion transcript built");

        let reply = match self.client.completion(&transcript, user_tag).await {
            Ok(reply) => reply,
            Err(ProviderError::ContextLengthExceeded(message)) => {
                self.history.clear(conversation_id);
                warn!(conversation_id, "context length exceeded, history cleared");
                return Err(ProviderError::ContextLengthExceeded(message));
            }
            Err(e) => return Err(e),
        };

        self.history
            .append_exchange(conversation_id, user_turn, ConversationTurn::assistant(reply.as_str()));
        Ok(reply)
    }
}
