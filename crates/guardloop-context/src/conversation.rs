//! Multi-turn conversation state.
//!
//! In-memory map keyed by conversation id, persisted per-message through
//! the conversation repository. A conversation is hydrated from the store
//! the first time its id is referenced. Different conversations progress in
//! parallel; per-conversation ordering comes from the dense turn numbers.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, info, warn};

use guardloop_core::{estimate_tokens, ConversationId, Role};
use guardloop_store::repos::ConversationRepository;
use guardloop_store::Store;

/// One in-memory conversation turn.
#[derive(Clone, Debug)]
pub struct Message {
    /// Speaker role.
    pub role: Role,
    /// Turn content.
    pub content: String,
    /// Estimated tokens.
    pub tokens_used: usize,
    /// Turn time.
    pub timestamp: DateTime<Utc>,
}

/// Aggregate view of one conversation.
#[derive(Clone, Debug, Serialize)]
pub struct ConversationSummary {
    /// Conversation id.
    pub conversation_id: String,
    /// Total turns (system included).
    pub total_turns: usize,
    /// User turns.
    pub user_messages: usize,
    /// Assistant turns.
    pub assistant_messages: usize,
    /// Sum of token estimates.
    pub total_tokens: usize,
    /// First turn time.
    pub started_at: Option<DateTime<Utc>>,
    /// Latest turn time.
    pub last_activity: Option<DateTime<Utc>>,
}

/// Manages conversation history under token and turn limits.
pub struct ConversationManager {
    store: Store,
    conversations: DashMap<String, Vec<Message>>,
    max_context_tokens: usize,
    max_turns: usize,
}

impl std::fmt::Debug for ConversationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationManager")
            .field("active", &self.conversations.len())
            .field("max_context_tokens", &self.max_context_tokens)
            .field("max_turns", &self.max_turns)
            .finish()
    }
}

impl ConversationManager {
    /// Manager with the default limits (8000 tokens, 20 turns).
    #[must_use]
    pub fn new(store: Store) -> Self {
        Self::with_limits(store, 8_000, 20)
    }

    /// Manager with explicit limits.
    #[must_use]
    pub fn with_limits(store: Store, max_context_tokens: usize, max_turns: usize) -> Self {
        Self {
            store,
            conversations: DashMap::new(),
            max_context_tokens,
            max_turns,
        }
    }

    /// Start a conversation, generating an id when none is supplied.
    pub fn start_conversation(&self, id: Option<ConversationId>) -> ConversationId {
        let id = id.unwrap_or_default();
        let _ = self.conversations.insert(id.to_string(), Vec::new());
        info!(conversation_id = %id, "conversation started");
        id
    }

    /// Append a message, estimating tokens when the caller has none.
    ///
    /// The in-memory view is updated first; the store write is best-effort
    /// and an unreachable store does not lose the in-flight turn.
    pub fn add_message(
        &self,
        conversation_id: &ConversationId,
        role: Role,
        content: &str,
        tokens_used: Option<usize>,
    ) {
        let tokens = tokens_used.unwrap_or_else(|| estimate_tokens(content));
        self.hydrate_if_missing(conversation_id);

        let mut entry = self
            .conversations
            .entry(conversation_id.to_string())
            .or_default();
        entry.push(Message {
            role,
            content: content.to_string(),
            tokens_used: tokens,
            timestamp: Utc::now(),
        });
        let turn = entry.len() - 1;
        drop(entry);

        match self.store.conn().and_then(|conn| {
            ConversationRepository::append_turn(
                &conn,
                conversation_id.as_str(),
                role,
                content,
                i64::try_from(tokens).unwrap_or(i64::MAX),
            )
        }) {
            Ok(_) => debug!(conversation_id = %conversation_id, role = %role, turn, "message added"),
            Err(e) => warn!(conversation_id = %conversation_id, error = %e, "turn persistence failed"),
        }
    }

    /// Conversation history, system turns excluded unless requested.
    #[must_use]
    pub fn history(&self, conversation_id: &ConversationId, include_system: bool) -> Vec<Message> {
        self.hydrate_if_missing(conversation_id);
        let messages = self
            .conversations
            .get(conversation_id.as_str())
            .map(|m| m.value().clone())
            .unwrap_or_default();
        if include_system {
            messages
        } else {
            messages
                .into_iter()
                .filter(|m| m.role != Role::System)
                .collect()
        }
    }

    /// Render history plus the current prompt for the LLM.
    ///
    /// History is pruned oldest-first until both the turn and token limits
    /// hold; an empty history returns the prompt unchanged.
    #[must_use]
    pub fn build_context(&self, conversation_id: &ConversationId, current_prompt: &str) -> String {
        let history = self.prune(self.history(conversation_id, false));
        if history.is_empty() {
            return current_prompt.to_string();
        }

        let mut lines = vec!["# Conversation History\n".to_string()];
        for message in &history {
            let prefix = if message.role == Role::User {
                "User:"
            } else {
                "Assistant:"
            };
            lines.push(format!("{prefix} {}\n", message.content));
        }
        lines.push(format!("\n# Current Request\nUser: {current_prompt}"));

        let context = lines.join("\n");
        debug!(
            conversation_id = %conversation_id,
            history_turns = history.len(),
            total_length = context.len(),
            "conversation context built"
        );
        context
    }

    /// Forget a conversation's in-memory state.
    pub fn clear(&self, conversation_id: &ConversationId) {
        let _ = self.conversations.remove(conversation_id.as_str());
        info!(conversation_id = %conversation_id, "conversation cleared");
    }

    /// Ids of conversations currently hydrated.
    #[must_use]
    pub fn active_conversations(&self) -> Vec<String> {
        self.conversations.iter().map(|e| e.key().clone()).collect()
    }

    /// Aggregate view of one conversation.
    #[must_use]
    pub fn summary(&self, conversation_id: &ConversationId) -> ConversationSummary {
        let history = self.history(conversation_id, true);
        ConversationSummary {
            conversation_id: conversation_id.to_string(),
            total_turns: history.len(),
            user_messages: history.iter().filter(|m| m.role == Role::User).count(),
            assistant_messages: history.iter().filter(|m| m.role == Role::Assistant).count(),
            total_tokens: history.iter().map(|m| m.tokens_used).sum(),
            started_at: history.first().map(|m| m.timestamp),
            last_activity: history.last().map(|m| m.timestamp),
        }
    }

    fn hydrate_if_missing(&self, conversation_id: &ConversationId) {
        if self.conversations.contains_key(conversation_id.as_str()) {
            return;
        }
        let Ok(conn) = self.store.conn() else {
            return;
        };
        match ConversationRepository::turns(&conn, conversation_id.as_str()) {
            Ok(rows) => {
                let messages: Vec<Message> = rows
                    .into_iter()
                    .map(|row| Message {
                        role: row.role,
                        content: row.content,
                        tokens_used: usize::try_from(row.tokens_used).unwrap_or(0),
                        timestamp: row
                            .timestamp
                            .parse::<DateTime<Utc>>()
                            .unwrap_or_else(|_| Utc::now()),
                    })
                    .collect();
                debug!(
                    conversation_id = %conversation_id,
                    messages = messages.len(),
                    "conversation loaded from store"
                );
                let _ = self
                    .conversations
                    .insert(conversation_id.to_string(), messages);
            }
            Err(e) => warn!(conversation_id = %conversation_id, error = %e, "hydration failed"),
        }
    }

    /// Drop oldest messages until both limits hold.
    fn prune(&self, mut messages: Vec<Message>) -> Vec<Message> {
        if messages.len() > self.max_turns {
            messages.drain(..messages.len() - self.max_turns);
        }
        let mut total_tokens: usize = messages.iter().map(|m| m.tokens_used).sum();
        while !messages.is_empty() && total_tokens > self.max_context_tokens {
            let removed = messages.remove(0);
            total_tokens -= removed.tokens_used;
        }
        messages
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> (tempfile::TempDir, ConversationManager) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("test.db")).unwrap();
        (dir, ConversationManager::new(store))
    }

    #[test]
    fn context_without_history_is_the_prompt() {
        let (_dir, manager) = manager();
        let id = manager.start_conversation(None);
        assert_eq!(manager.build_context(&id, "just this"), "just this");
    }

    #[test]
    fn context_renders_history_then_current_request() {
        let (_dir, manager) = manager();
        let id = manager.start_conversation(None);
        manager.add_message(&id, Role::User, "first question", None);
        manager.add_message(&id, Role::Assistant, "first answer", None);

        let context = manager.build_context(&id, "follow-up");
        assert!(context.starts_with("# Conversation History\n"));
        assert!(context.contains("User: first question"));
        assert!(context.contains("Assistant: first answer"));
        assert!(context.ends_with("# Current Request\nUser: follow-up"));
    }

    #[test]
    fn system_messages_are_excluded_from_context() {
        let (_dir, manager) = manager();
        let id = manager.start_conversation(None);
        manager.add_message(&id, Role::System, "internal note", None);
        manager.add_message(&id, Role::User, "hello", None);

        let context = manager.build_context(&id, "next");
        assert!(!context.contains("internal note"));
        assert_eq!(manager.history(&id, true).len(), 2);
        assert_eq!(manager.history(&id, false).len(), 1);
    }

    #[test]
    fn turn_limit_prunes_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("test.db")).unwrap();
        let manager = ConversationManager::with_limits(store, 100_000, 3);
        let id = manager.start_conversation(None);
        for i in 0..5 {
            manager.add_message(&id, Role::User, &format!("message {i}"), Some(1));
        }

        let context = manager.build_context(&id, "now");
        assert!(!context.contains("message 0"));
        assert!(!context.contains("message 1"));
        assert!(context.contains("message 4"));
    }

    #[test]
    fn token_limit_prunes_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("test.db")).unwrap();
        let manager = ConversationManager::with_limits(store, 10, 100);
        let id = manager.start_conversation(None);
        manager.add_message(&id, Role::User, "old", Some(8));
        manager.add_message(&id, Role::User, "new", Some(8));

        let context = manager.build_context(&id, "now");
        assert!(!context.contains("User: old"));
        assert!(context.contains("User: new"));
    }

    #[test]
    fn tokens_default_to_chars_over_four() {
        let (_dir, manager) = manager();
        let id = manager.start_conversation(None);
        manager.add_message(&id, Role::User, &"x".repeat(40), None);
        assert_eq!(manager.summary(&id).total_tokens, 10);
    }

    #[test]
    fn hydration_restores_persisted_turns() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("test.db")).unwrap();

        let id = ConversationId::from("conv-1");
        {
            let manager = ConversationManager::new(store.clone());
            let _ = manager.start_conversation(Some(id.clone()));
            manager.add_message(&id, Role::User, "persisted question", None);
        }

        // A fresh manager over the same store sees the old turns.
        let manager = ConversationManager::new(store);
        let context = manager.build_context(&id, "continue");
        assert!(context.contains("persisted question"));
    }

    #[test]
    fn summary_counts_roles() {
        let (_dir, manager) = manager();
        let id = manager.start_conversation(None);
        manager.add_message(&id, Role::User, "q1", Some(1));
        manager.add_message(&id, Role::Assistant, "a1", Some(2));
        manager.add_message(&id, Role::User, "q2", Some(1));

        let summary = manager.summary(&id);
        assert_eq!(summary.total_turns, 3);
        assert_eq!(summary.user_messages, 2);
        assert_eq!(summary.assistant_messages, 1);
        assert_eq!(summary.total_tokens, 4);
    }

    #[test]
    fn clear_forgets_in_memory_state() {
        let (_dir, manager) = manager();
        let id = manager.start_conversation(None);
        manager.add_message(&id, Role::User, "hello", None);
        manager.clear(&id);
        // Hydration restores from the store on next access.
        assert_eq!(manager.history(&id, true).len(), 1);
    }
}
