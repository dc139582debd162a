//! Conversation Store.
//!
//! Volatile, per-conversation turn history. Each conversation id maps to its
//! own async mutex; a turn holds the conversation's [`ConversationLease`]
//! from history load until its final append, so turns on one conversation
//! run in the order they were accepted while other conversations proceed
//! independently. Tokio's mutex is FIFO-fair, which gives the ordering.

use std::collections::HashMap;
use std::sync::Arc;

use fleetchat_core::domain::decision::Turn;
use fleetchat_core::errors::TurnError;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::warn;

#[derive(Debug, Default)]
struct ConversationEntry {
    turns: Vec<Turn>,
    /// Set by `clear`; a lease that finds its entry retired looks it up again.
    retired: bool,
}

type SharedEntry = Arc<Mutex<ConversationEntry>>;

pub struct ConversationStore {
    conversations: RwLock<HashMap<String, SharedEntry>>,
    retention_turns: usize,
    context_turns: usize,
}

impl ConversationStore {
    pub fn new(retention_turns: usize, context_turns: usize) -> Self {
        Self {
            conversations: RwLock::new(HashMap::new()),
            retention_turns: retention_turns.max(1),
            context_turns: context_turns.max(1),
        }
    }

    pub fn retention_turns(&self) -> usize {
        self.retention_turns
    }

    pub fn context_turns(&self) -> usize {
        self.context_turns
    }

    /// Exclusive access to one conversation, created on first use.
    pub async fn lease(&self, conversation_id: &str) -> ConversationLease {
        loop {
            let entry = self.entry(conversation_id).await;
            let guard = entry.lock_owned().await;
            if !guard.retired {
                return ConversationLease {
                    conversation_id: conversation_id.to_string(),
                    guard,
                    retention_turns: self.retention_turns,
                    context_turns: self.context_turns,
                };
            }
        }
    }

    /// Oracle-facing history: at most `context_turns` most recent turns.
    pub async fn load(&self, conversation_id: &str) -> Result<Vec<Turn>, TurnError> {
        self.lease(conversation_id).await.load()
    }

    pub async fn append(&self, conversation_id: &str, turns: Vec<Turn>) {
        self.lease(conversation_id).await.append(turns);
    }

    /// True iff the conversation existed.
    pub async fn clear(&self, conversation_id: &str) -> bool {
        let removed = self.conversations.write().await.remove(conversation_id);
        match removed {
            Some(entry) => {
                let mut guard = entry.lock().await;
                guard.turns.clear();
                guard.retired = true;
                true
            }
            None => false,
        }
    }

    /// Full retained history, for inspection.
    pub async fn history(&self, conversation_id: &str) -> Vec<Turn> {
        let entry = self.conversations.read().await.get(conversation_id).cloned();
        match entry {
            Some(entry) => entry.lock().await.turns.clone(),
            None => Vec::new(),
        }
    }

    pub async fn len(&self) -> usize {
        self.conversations.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.conversations.read().await.is_empty()
    }

    async fn entry(&self, conversation_id: &str) -> SharedEntry {
        if let Some(entry) = self.conversations.read().await.get(conversation_id) {
            return entry.clone();
        }
        self.conversations
            .write()
            .await
            .entry(conversation_id.to_string())
            .or_default()
            .clone()
    }
}

pub struct ConversationLease {
    conversation_id: String,
    guard: OwnedMutexGuard<ConversationEntry>,
    retention_turns: usize,
    context_turns: usize,
}

impl ConversationLease {
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Recent context. An inconsistent history is reset to empty and reported
    /// as a store fault.
    pub fn load(&mut self) -> Result<Vec<Turn>, TurnError> {
        if let Some(reason) = inconsistency(&self.guard.turns, self.retention_turns) {
            warn!(
                event_name = "agent.conversation.reset",
                conversation_id = %self.conversation_id,
                reason = %reason,
                "conversation history was inconsistent and has been reset"
            );
            self.guard.turns.clear();
            return Err(TurnError::ConversationStoreFault {
                conversation_id: self.conversation_id.clone(),
                reason,
            });
        }

        let start = self.guard.turns.len().saturating_sub(self.context_turns);
        Ok(self.guard.turns[start..].to_vec())
    }

    /// Appends in order, then evicts oldest turns beyond the retention window.
    pub fn append(&mut self, turns: impl IntoIterator<Item = Turn>) {
        self.guard.turns.extend(turns);
        let overflow = self.guard.turns.len().saturating_sub(self.retention_turns);
        if overflow > 0 {
            self.guard.turns.drain(..overflow);
        }
    }

    pub fn len(&self) -> usize {
        self.guard.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard.turns.is_empty()
    }

    #[cfg(test)]
    fn corrupt(&mut self, turns: Vec<Turn>) {
        self.guard.turns = turns;
    }
}

fn inconsistency(turns: &[Turn], retention_turns: usize) -> Option<String> {
    if turns.len() > retention_turns {
        return Some(format!("{} turns exceed retention of {retention_turns}", turns.len()));
    }
    turns
        .windows(2)
        .position(|pair| pair[0].role == pair[1].role)
        .map(|index| format!("consecutive {} turns at position {index}", turns[index].role.as_str()))
}
