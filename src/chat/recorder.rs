//! Conversation and message persistence for chat turns.

use crate::database::{Database, Message, MessageRole, NewMessage, StoreError};

const TITLE_CHARS: usize = 50;
const DEFAULT_TITLE: &str = "New Conversation";

/// Title for a new conversation: the first 50 characters of `seed`.
pub fn title_from(seed: &str) -> String {
    let title: String = seed.chars().take(TITLE_CHARS).collect();
    if title.is_empty() {
        DEFAULT_TITLE.to_string()
    } else {
        title
    }
}

#[derive(Clone)]
pub struct ConversationRecorder {
    db: Database,
}

impl ConversationRecorder {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Returns `id` unchanged when given, otherwise creates a conversation
    /// owned by `owner` and returns its id.
    ///
    /// A given id is not checked here; if it does not exist the next
    /// [`record_message`](Self::record_message) fails.
    pub async fn ensure_conversation(
        &self,
        id: Option<&str>,
        owner: &str,
        seed_title: &str,
    ) -> Result<String, StoreError> {
        if let Some(id) = id.filter(|id| !id.is_empty()) {
            return Ok(id.to_owned());
        }
        let conversation = self
            .db
            .create_conversation(owner, &title_from(seed_title))
            .await?;
        Ok(conversation.id)
    }

    pub async fn record_message(
        &self,
        conversation_id: &str,
        role: MessageRole,
        content: &str,
        model_used: Option<&str>,
    ) -> Result<Message, StoreError> {
        self.db
            .insert_message(NewMessage::new(
                conversation_id,
                role,
                content,
                model_used.map(str::to_owned),
            ))
            .await
    }
}
