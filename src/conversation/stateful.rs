//! Assistant style: one provider thread per conversation, one run per turn.

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::threads::ThreadRegistry;
use crate::llm::client::ProviderClient;
use crate::llm::run::RunPoller;
use crate::llm::{ConversationTurn, ProviderError};

#[derive(Debug)]
pub struct StatefulResponder {
    client: ProviderClient,
    threads: ThreadRegistry,
    assistant_id: String,
    poller: RunPoller,
    shutdown: CancellationToken,
}

impl StatefulResponder {
    pub fn new(
        client: ProviderClient,
        assistant_id: String,
        poller: RunPoller,
        shutdown: CancellationToken,
    ) -> Self {
        Self { client, threads: ThreadRegistry::new(), assistant_id, poller, shutdown }
    }

    pub fn threads(&self) -> &ThreadRegistry {
        &self.threads
    }

    pub async fn respond(&self, conversation_id: &str, text: &str) -> Result<String, ProviderError> {
        let thread = self
            .threads
            .get_or_create(conversation_id, || self.client.create_thread())
            .await?;

        self.client.add_message(&thread, &ConversationTurn::user(text)).await?;

        let (run, initial) = self.client.create_run(&thread, &self.assistant_id).await?;
        let polls = self
            .poller
            .await_run(initial, || self.client.fetch_run_status(&thread, &run), &self.shutdown)
            .await?;
        debug!(conversation_id, %thread, %run, polls, "run finished");

        let messages = self.client.fetch_messages(&thread).await?;
        messages
            .into_iter()
            .next()
            .map(|m| m.content)
            .ok_or(ProviderError::NoMessages)
    }
}
