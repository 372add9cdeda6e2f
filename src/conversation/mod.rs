//! Conversation dispatcher: one `respond` entry point over both provider
//! interaction styles.
//!
//! The style is chosen once at construction: a configured assistant id
//! selects the thread/run style ([`stateful`]), otherwise the completion
//! style with local history ([`stateless`]) is used.
//!
//! Calls for the same conversation are serialised through
//! [`ConversationLocks`]; different conversations run fully in parallel.

pub mod history;
pub mod stateful;
pub mod stateless;
pub mod threads;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::llm::ProviderError;
use crate::llm::client::ProviderClient;
use crate::llm::run::RunPoller;

use history::HistoryStore;
use stateful::StatefulResponder;
use stateless::StatelessResponder;
use threads::ThreadRegistry;

// ── Settings ──────────────────────────────────────────────────────────────────

/// Static configuration consumed by [`Dispatcher::new`].
#[derive(Debug, Clone, Default)]
pub struct DispatcherSettings {
    /// Non-empty selects the assistant (thread/run) style.
    pub assistant_id: Option<String>,
    pub pre_prompt: Option<String>,
    pub send_user_id: bool,
    pub poller: RunPoller,
    /// Turn cap per conversation history; `None` is unbounded.
    pub transcript_cap: Option<usize>,
}

// ── Responder ─────────────────────────────────────────────────────────────────

/// The two interaction styles. Enum dispatch, no trait objects.
#[derive(Debug)]
pub enum Responder {
    Stateless(StatelessResponder),
    Stateful(StatefulResponder),
}

impl Responder {
    pub fn style(&self) -> &'static str {
        match self {
            Responder::Stateless(_) => "completion",
            Responder::Stateful(_) => "assistant",
        }
    }
}

// ── Per-conversation locks ────────────────────────────────────────────────────

/// One async mutex per conversation id. An entry lives only while some turn
/// holds or waits for it.
#[derive(Debug, Default)]
pub struct ConversationLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl ConversationLocks {
    /// Wait for exclusive access to `conversation_id`. Held until the guard drops.
    pub async fn acquire(&self, conversation_id: &str) -> TurnGuard<'_> {
        let lock = {
            let mut locks = self.map();
            locks.entry(conversation_id.to_string()).or_default().clone()
        };
        TurnGuard {
            locks: self,
            conversation_id: conversation_id.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Conversations with a turn in progress or queued.
    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn map(&self) -> MutexGuard<'_, HashMap<String, Arc<AsyncMutex<()>>>> {
        self.locks.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Exclusive turn in one conversation. Dropping it releases the turn and
/// removes the lock entry when no other caller holds a handle to it.
#[derive(Debug)]
pub struct TurnGuard<'a> {
    locks: &'a ConversationLocks,
    conversation_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Handles are only cloned under the map lock, so the count is stable here.
        let mut locks = self.locks.map();
        if locks
            .get(&self.conversation_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.conversation_id);
        }
    }
}

// ── Dispatcher ────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct Dispatcher {
    responder: Responder,
    locks: ConversationLocks,
}

impl Dispatcher {
    /// Select the interaction style from `settings` and build it.
    ///
    /// `shutdown` aborts in-flight run waits of the assistant style.
    pub fn new(
        client: ProviderClient,
        settings: DispatcherSettings,
        shutdown: CancellationToken,
    ) -> Self {
        let assistant_id = settings.assistant_id.filter(|id| !id.trim().is_empty());
        let responder = match assistant_id {
            Some(id) => Responder::Stateful(StatefulResponder::new(
                client,
                id,
                settings.poller,
                shutdown,
            )),
            None => Responder::Stateless(StatelessResponder::new(
                client,
                HistoryStore::new(settings.transcript_cap),
                settings.pre_prompt,
                settings.send_user_id,
            )),
        };
        info!(style = responder.style(), "conversation dispatcher ready");
        Self { responder, locks: ConversationLocks::default() }
    }

    pub fn responder(&self) -> &Responder {
        &self.responder
    }

    /// Completion-style history, if that style is active.
    pub fn history(&self) -> Option<&HistoryStore> {
        match &self.responder {
            Responder::Stateless(r) => Some(r.history()),
            Responder::Stateful(_) => None,
        }
    }

    /// Assistant-style thread registry, if that style is active.
    pub fn threads(&self) -> Option<&ThreadRegistry> {
        match &self.responder {
            Responder::Stateful(r) => Some(r.threads()),
            Responder::Stateless(_) => None,
        }
    }

    /// Produce the reply to `text` in `conversation_id`.
    ///
    /// `sender_tag` identifies the human sender; the completion style
    /// forwards it to the provider only when configured to.
    pub async fn respond(
        &self,
        conversation_id: &str,
        text: &str,
        sender_tag: Option<&str>,
    ) -> Result<String, ProviderError> {
        let _turn = self.locks.acquire(conversation_id).await;
        debug!(conversation_id, style = self.responder.style(), "dispatching message");

        match &self.responder {
            Responder::Stateless(r) => r.respond(conversation_id, text, sender_tag).await,
            Responder::Stateful(r) => r.respond(conversation_id, text).await,
        }
    }
}
