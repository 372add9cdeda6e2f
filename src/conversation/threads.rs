//! Conversation → provider thread registry.
//!
//! Each conversation gets a `OnceCell` slot. The outer map lock is only held
//! long enough to find or insert the slot; thread creation itself runs inside
//! the cell, so concurrent first use of one conversation creates exactly one
//! thread while other conversations proceed untouched.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::llm::{ProviderError, ThreadId};

#[derive(Debug, Default)]
pub struct ThreadRegistry {
    slots: Mutex<HashMap<String, Arc<OnceCell<ThreadId>>>>,
}

impl ThreadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the thread bound to `conversation_id`, creating it with
    /// `create` on first use.
    ///
    /// A failed creation leaves the slot empty so the next call retries.
    pub async fn get_or_create<F, Fut>(
        &self,
        conversation_id: &str,
        create: F,
    ) -> Result<ThreadId, ProviderError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ThreadId, ProviderError>>,
    {
        let slot = self.slot(conversation_id);
        let mut created = false;
        let thread = slot
            .get_or_try_init(|| {
                created = true;
                create()
            })
            .await?
            .clone();

        if created {
            info!(conversation_id, %thread, "bound new thread to conversation");
        } else {
            debug!(conversation_id, %thread, "reusing thread");
        }
        Ok(thread)
    }

    /// The thread bound to `conversation_id`, if one has been created.
    pub fn lookup(&self, conversation_id: &str) -> Option<ThreadId> {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.get(conversation_id).and_then(|cell| cell.get().cloned())
    }

    /// Number of conversations with a bound thread.
    pub fn len(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.values().filter(|cell| cell.initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, conversation_id: &str) -> Arc<OnceCell<ThreadId>> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.entry(conversation_id.to_string()).or_default().clone()
    }
}
