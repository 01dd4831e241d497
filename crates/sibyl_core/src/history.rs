//! Conversation history store.
//!
//! The canonical history records the raw question and the final answer only.
//! The synthesized context block sent to the model is never committed, so
//! the history stays replayable without bloating on injected file contents.

use async_trait::async_trait;
use tokio::sync::Mutex;

use sibyl_common::{ConversationMessage, Role};

#[async_trait]
pub trait ConversationHistory: Send + Sync {
    /// A copy of the ordered history.
    async fn history(&self) -> Vec<ConversationMessage>;

    /// Append one message. Append-only during a session.
    async fn add_message(&self, role: Role, content: String);
}

/// In-process history, for hosts without their own store and for tests.
#[derive(Default)]
pub struct InMemoryHistory {
    messages: Mutex<Vec<ConversationMessage>>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationHistory for InMemoryHistory {
    async fn history(&self) -> Vec<ConversationMessage> {
        self.messages.lock().await.clone()
    }

    async fn add_message(&self, role: Role, content: String) {
        self.messages.lock().await.push(ConversationMessage { role, content });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn history_appends_in_order() {
        let history = InMemoryHistory::new();
        history.add_message(Role::User, "q1".into()).await;
        history.add_message(Role::Assistant, "a1".into()).await;

        let messages = history.history().await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].content, "a1");
    }

    #[tokio::test]
    async fn history_returns_a_copy() {
        let history = InMemoryHistory::new();
        history.add_message(Role::User, "q".into()).await;
        let mut copy = history.history().await;
        copy.push(ConversationMessage::assistant("local only"));
        assert_eq!(history.history().await.len(), 1);
    }
}
