//! Conversations and their messages.
//!
//! Every read and delete is scoped to the owning user; a conversation owned
//! by someone else looks exactly like one that does not exist.

use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{OptionalExtension, Row, params};

use super::{
    Conversation, ConversationDetail, Database, Message, MessageRole, NewMessage, StoreError,
    format_timestamp, new_id, timestamp_column,
};

fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get(0)?,
        title: row.get(1)?,
        user_id: row.get(2)?,
        created_at: timestamp_column(row, 3)?,
        updated_at: timestamp_column(row, 4)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    let role: String = row.get(2)?;
    let role = MessageRole::parse(&role).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(2, Type::Text, format!("unknown role {role:?}").into())
    })?;
    Ok(Message {
        id: row.get(0)?,
        content: row.get(1)?,
        role,
        conversation_id: row.get(3)?,
        model_used: row.get(4)?,
        created_at: timestamp_column(row, 5)?,
    })
}

impl Database {
    pub async fn create_conversation(
        &self,
        user_id: &str,
        title: &str,
    ) -> Result<Conversation, StoreError> {
        let now = Utc::now();
        let conversation = Conversation {
            id: new_id(),
            title: title.to_owned(),
            user_id: user_id.to_owned(),
            created_at: now,
            updated_at: now,
        };
        self.call(move |conn| {
            let stamp = format_timestamp(&now);
            conn.execute(
                "INSERT INTO conversations (id, title, user_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![conversation.id, conversation.title, conversation.user_id, stamp],
            )?;
            Ok(conversation)
        })
        .await
    }

    /// The user's conversations, most recently active first.
    pub async fn list_conversations(&self, user_id: &str) -> Result<Vec<Conversation>, StoreError> {
        let user_id = user_id.to_owned();
        self.call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, title, user_id, created_at, updated_at
                 FROM conversations
                 WHERE user_id = ?1
                 ORDER BY updated_at DESC, rowid DESC",
            )?;
            let conversations = stmt
                .query_map(params![user_id], conversation_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(conversations)
        })
        .await
    }

    /// The conversation and its messages in chronological order, or `None`
    /// when it does not exist or belongs to another user.
    pub async fn conversation_with_messages(
        &self,
        id: &str,
        user_id: &str,
    ) -> Result<Option<ConversationDetail>, StoreError> {
        let (id, user_id) = (id.to_owned(), user_id.to_owned());
        self.call(move |conn| {
            let conversation = conn
                .query_row(
                    "SELECT id, title, user_id, created_at, updated_at
                     FROM conversations WHERE id = ?1 AND user_id = ?2",
                    params![id, user_id],
                    conversation_from_row,
                )
                .optional()?;
            let Some(conversation) = conversation else {
                return Ok(None);
            };

            let mut stmt = conn.prepare(
                "SELECT id, content, role, conversation_id, model_used, created_at
                 FROM messages
                 WHERE conversation_id = ?1
                 ORDER BY created_at ASC, rowid ASC",
            )?;
            let messages = stmt
                .query_map(params![conversation.id], message_from_row)?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(Some(ConversationDetail {
                conversation,
                messages,
            }))
        })
        .await
    }

    /// Deletes the conversation and, by cascade, its messages. Returns
    /// `false` when nothing owned by `user_id` matched.
    pub async fn delete_conversation(&self, id: &str, user_id: &str) -> Result<bool, StoreError> {
        let (id, user_id) = (id.to_owned(), user_id.to_owned());
        self.call(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM conversations WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
            )?;
            Ok(deleted > 0)
        })
        .await
    }

    /// Appends a message and bumps the conversation's `updated_at`.
    ///
    /// Fails with a foreign-key error if the conversation does not exist.
    pub async fn insert_message(&self, message: NewMessage) -> Result<Message, StoreError> {
        self.call(move |conn| {
            let stored = Message {
                id: new_id(),
                content: message.content,
                role: message.role,
                conversation_id: message.conversation_id,
                model_used: message.model_used,
                created_at: message.created_at,
            };
            let stamp = format_timestamp(&stored.created_at);

            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO messages (id, content, role, conversation_id, model_used, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    stored.id,
                    stored.content,
                    stored.role.as_str(),
                    stored.conversation_id,
                    stored.model_used,
                    stamp,
                ],
            )?;
            tx.execute(
                "UPDATE conversations SET updated_at = max(updated_at, ?2) WHERE id = ?1",
                params![stored.conversation_id, stamp],
            )?;
            tx.commit()?;
            Ok(stored)
        })
        .await
    }

    pub async fn message_count(&self, conversation_id: &str) -> Result<usize, StoreError> {
        let conversation_id = conversation_id.to_owned();
        self.call(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1",
                params![conversation_id],
                |row| row.get(0),
            )?;
            Ok(usize::try_from(count).unwrap_or_default())
        })
        .await
    }
}
