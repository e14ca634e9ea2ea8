//! Rows returned by the store, serialised in the camelCase shape the web
//! client expects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A catalog entry naming a provider model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub id: String,
    /// Provider-side model string, also recorded as `Message::model_used`.
    pub name: String,
    /// Provider tag, e.g. `Groq`.
    pub provider: String,
    #[serde(rename = "type")]
    pub model_type: String,
    pub is_enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl ModelInfo {
    pub fn new(name: impl Into<String>, provider: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: name.clone(),
            name,
            provider: provider.into(),
            model_type: "chat".to_string(),
            is_enabled: true,
            created_at: Utc::now(),
        }
    }

    /// Used when the catalog has no enabled entry.
    pub fn builtin_default() -> Self {
        Self {
            id: "default".to_string(),
            name: "llama-3.3-70b-versatile".to_string(),
            provider: "Groq".to_string(),
            model_type: "chat".to_string(),
            is_enabled: true,
            created_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A conversation together with its messages, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationDetail {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }

    pub(crate) fn parse(raw: &str) -> Option<Self> {
        match raw {
            "user" => Some(MessageRole::User),
            "assistant" => Some(MessageRole::Assistant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub content: String,
    pub role: MessageRole,
    pub conversation_id: String,
    pub model_used: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A message about to be appended.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: String,
    pub role: MessageRole,
    pub content: String,
    pub model_used: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NewMessage {
    /// A message stamped with the current time.
    pub fn new(
        conversation_id: impl Into<String>,
        role: MessageRole,
        content: impl Into<String>,
        model_used: Option<String>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            role,
            content: content.into(),
            model_used,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}
