//! In-memory per-conversation transcript for the completion style.
//!
//! Each conversation owns its own lock; the outer map lock is held only to
//! find or insert an entry. Transcripts are capped by turn count (FIFO,
//! oldest turns dropped first) and never persisted. A transcript always
//! starts with a user turn, so eviction never leaves an orphaned reply.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::llm::{ConversationTurn, Role};

/// Default maximum number of turns kept per conversation.
pub const DEFAULT_TRANSCRIPT_CAP: usize = 50;

type Transcript = Arc<Mutex<VecDeque<ConversationTurn>>>;

#[derive(Debug)]
pub struct HistoryStore {
    /// Maximum turns per conversation; `None` keeps everything.
    cap: Option<usize>,
    conversations: Mutex<HashMap<String, Transcript>>,
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new(Some(DEFAULT_TRANSCRIPT_CAP))
    }
}

impl HistoryStore {
    pub fn new(cap: Option<usize>) -> Self {
        Self { cap, conversations: Mutex::new(HashMap::new()) }
    }

    /// Stored transcript in insertion order; empty for unknown conversations.
    pub fn read(&self, conversation_id: &str) -> Vec<ConversationTurn> {
        match self.existing(conversation_id) {
            Some(transcript) => lock(&transcript).iter().cloned().collect(),
            None => Vec::new(),
        }
    }

    pub fn append(&self, conversation_id: &str, turn: ConversationTurn) {
        let transcript = self.entry(conversation_id);
        let mut turns = lock(&transcript);
        turns.push_back(turn);
        self.enforce_cap(conversation_id, &mut turns);
    }

    /// Append a user turn and its reply under one lock so no other writer
    /// can land between them.
    pub fn append_exchange(
        &self,
        conversation_id: &str,
        user: ConversationTurn,
        assistant: ConversationTurn,
    ) {
        let transcript = self.entry(conversation_id);
        let mut turns = lock(&transcript);
        turns.push_back(user);
        turns.push_back(assistant);
        self.enforce_cap(conversation_id, &mut turns);
    }

    /// Empty the transcript; the conversation entry itself is kept.
    pub fn clear(&self, conversation_id: &str) {
        if let Some(transcript) = self.existing(conversation_id) {
            lock(&transcript).clear();
            debug!(conversation_id, "history cleared");
        }
    }

    pub fn len(&self, conversation_id: &str) -> usize {
        self.existing(conversation_id).map_or(0, |t| lock(&t).len())
    }

    fn enforce_cap(&self, conversation_id: &str, turns: &mut VecDeque<ConversationTurn>) {
        let Some(cap) = self.cap else { return };
        if turns.len() <= cap {
            return;
        }
        let mut dropped = 0;
        while turns.len() > cap || turns.front().is_some_and(|t| t.role != Role::User) {
            turns.pop_front();
            dropped += 1;
        }
        if dropped > 0 {
            debug!(conversation_id, dropped, cap, "history trimmed");
        }
    }

    fn existing(&self, conversation_id: &str) -> Option<Transcript> {
        let map = lock(&self.conversations);
        map.get(conversation_id).cloned()
    }

    fn entry(&self, conversation_id: &str) -> Transcript {
        let mut map = lock(&self.conversations);
        map.entry(conversation_id.to_string()).or_default().clone()
    }
}

/// Lock a std mutex, recovering the data if a previous holder panicked.
fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}
