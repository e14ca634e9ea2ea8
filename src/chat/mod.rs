//! Chat turn orchestration.
//!
//! A turn moves through [`TurnState`]:
//!
//! ```text
//! Received → ConversationEnsured → UserMessageSaved → Streaming → Completed
//!                                                              ↘ PersistFailed
//!                                                              ↘ Aborted
//! ```
//!
//! `Completed` means the reply is stored. `PersistFailed` means the stream
//! drained but the reply could not be written.
//!
//! Everything up to `Streaming` happens before the caller gets a stream
//! back; a failure there is returned as a [`ChatError`] and nothing is
//! streamed. The assistant reply is written by a spawned continuation once
//! the [`CompletionStream`] has been drained to the end. If the stream is
//! dropped early or the provider fails mid-way, the turn is aborted and only
//! the user message remains.

use std::fmt;

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

mod completion;
mod recorder;
mod resolver;

pub use completion::CompletionStream;
pub use recorder::{ConversationRecorder, title_from};
pub use resolver::{ModelResolver, select};

use crate::background::deferred;
use crate::database::{Database, Message, MessageRole, ModelInfo, StoreError};
use crate::llm::prompts::{PROMPT_ENGINEER_PROMPT, generator_model};
use crate::llm::{
    ChatMessage, CompletionRequest, Domain, ProviderError, ProviderKind, ProviderRegistry, Role,
    TokenStream,
};
use crate::security::Caller;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("messages must not be empty")]
    EmptyConversation,

    #[error("last message must come from the user")]
    LastMessageNotUser,

    #[error("prompt must not be empty")]
    EmptyPrompt,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Progress of one chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Received,
    ConversationEnsured,
    UserMessageSaved,
    Streaming,
    Completed,
    PersistFailed,
    Aborted,
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TurnState::Received => "RECEIVED",
            TurnState::ConversationEnsured => "CONVERSATION_ENSURED",
            TurnState::UserMessageSaved => "USER_MSG_SAVED",
            TurnState::Streaming => "STREAMING",
            TurnState::Completed => "COMPLETED",
            TurnState::PersistFailed => "PERSIST_FAILED",
            TurnState::Aborted => "ABORTED",
        };
        f.write_str(name)
    }
}

/// How a turn ended, once its stream is gone.
#[derive(Debug)]
pub enum TurnOutcome {
    /// The stream completed and the reply was stored.
    Completed(Message),
    /// The stream was dropped or failed before completing. Nothing stored.
    Aborted,
    /// The stream completed but storing the reply failed.
    PersistFailed(StoreError),
}

impl TurnOutcome {
    pub fn state(&self) -> TurnState {
        match self {
            TurnOutcome::Completed(_) => TurnState::Completed,
            TurnOutcome::PersistFailed(_) => TurnState::PersistFailed,
            TurnOutcome::Aborted => TurnState::Aborted,
        }
    }
}

/// Handle to the continuation that stores the assistant reply.
pub struct TurnHandle {
    task: JoinHandle<TurnOutcome>,
}

impl TurnHandle {
    /// Waits for the turn to settle.
    pub async fn outcome(self) -> TurnOutcome {
        self.task.await.unwrap_or(TurnOutcome::Aborted)
    }
}

/// Input to [`ChatGateway::start_turn`].
#[derive(Debug, Clone, Default)]
pub struct ChatInput {
    /// Full history; the last entry is the new user message.
    pub messages: Vec<ChatMessage>,
    pub model_id: Option<String>,
    pub conversation_id: Option<String>,
    pub domain: Option<String>,
}

/// A turn whose reply is streaming.
pub struct ChatTurn {
    pub conversation_id: String,
    pub model: ModelInfo,
    pub stream: CompletionStream,
    pub completion: TurnHandle,
}

/// Resolves models, records turns and starts provider streams.
#[derive(Clone)]
pub struct ChatGateway {
    db: Database,
    resolver: ModelResolver,
    recorder: ConversationRecorder,
    providers: ProviderRegistry,
}

impl ChatGateway {
    pub fn new(db: Database, providers: ProviderRegistry) -> Self {
        Self {
            resolver: ModelResolver::new(db.clone()),
            recorder: ConversationRecorder::new(db.clone()),
            db,
            providers,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Runs a turn up to the point where tokens start flowing.
    ///
    /// On success the user message is stored and the returned stream is
    /// live. The assistant reply is stored when, and only if, that stream is
    /// drained to its natural end.
    pub async fn start_turn(&self, caller: &Caller, input: ChatInput) -> Result<ChatTurn, ChatError> {
        let mut state = TurnState::Received;
        let last = match input.messages.last() {
            None => return Err(ChatError::EmptyConversation),
            Some(m) if m.role != Role::User => return Err(ChatError::LastMessageNotUser),
            Some(m) => m.content.clone(),
        };

        self.db.ensure_user(&caller.id, &caller.email).await?;
        let model = self.resolver.resolve(input.model_id.as_deref()).await?;

        let conversation_id = self
            .recorder
            .ensure_conversation(input.conversation_id.as_deref(), &caller.id, &last)
            .await?;
        advance(&mut state, TurnState::ConversationEnsured, &conversation_id);

        self.recorder
            .record_message(&conversation_id, MessageRole::User, &last, Some(&model.name))
            .await?;
        advance(&mut state, TurnState::UserMessageSaved, &conversation_id);

        let provider = self.providers.resolve(&model.provider)?;
        let domain = Domain::from_tag(input.domain.as_deref());
        let request = CompletionRequest {
            model: model.name.clone(),
            system: domain.system_prompt().to_string(),
            messages: input.messages,
        };
        let tokens = provider.stream_chat(request).await.inspect_err(|e| {
            warn!(conversation = %conversation_id, error = %e, "provider refused the turn");
        })?;
        advance(&mut state, TurnState::Streaming, &conversation_id);
        info!(
            conversation = %conversation_id,
            model = %model.name,
            provider = %provider.kind(),
            domain = domain.as_str(),
            "streaming reply"
        );

        let (trigger, finished) = deferred::<String>();
        let recorder = self.recorder.clone();
        let task_conversation = conversation_id.clone();
        let model_name = model.name.clone();
        let task = tokio::spawn(async move {
            let Some(text) = finished.await else {
                debug!(conversation = %task_conversation, state = %TurnState::Aborted, "turn state");
                info!(conversation = %task_conversation, "reply not stored, stream ended early");
                return TurnOutcome::Aborted;
            };
            let outcome = match recorder
                .record_message(&task_conversation, MessageRole::Assistant, &text, Some(&model_name))
                .await
            {
                Ok(message) => TurnOutcome::Completed(message),
                Err(e) => {
                    error!(conversation = %task_conversation, error = %e, "failed to store reply");
                    TurnOutcome::PersistFailed(e)
                }
            };
            debug!(conversation = %task_conversation, state = %outcome.state(), "turn state");
            outcome
        });

        Ok(ChatTurn {
            conversation_id,
            model,
            stream: CompletionStream::new(tokens, trigger),
            completion: TurnHandle { task },
        })
    }

    /// Streams an expanded prompt for `prompt`. Nothing is stored.
    ///
    /// `provider_tag` selects Groq when it names it; anything else uses
    /// HuggingFace.
    pub async fn generate_prompt(
        &self,
        prompt: &str,
        provider_tag: Option<&str>,
    ) -> Result<TokenStream, ChatError> {
        if prompt.trim().is_empty() {
            return Err(ChatError::EmptyPrompt);
        }
        let kind = match provider_tag.and_then(ProviderKind::from_tag) {
            Some(ProviderKind::Groq) => ProviderKind::Groq,
            _ => ProviderKind::HuggingFace,
        };
        let provider = self.providers.get(kind)?;
        let request = CompletionRequest {
            model: generator_model(kind).to_string(),
            system: PROMPT_ENGINEER_PROMPT.to_string(),
            messages: vec![ChatMessage::user(prompt)],
        };
        Ok(provider.stream_chat(request).await?)
    }
}

fn advance(state: &mut TurnState, next: TurnState, conversation_id: &str) {
    debug!(conversation = conversation_id, from = %state, to = %next, "turn state");
    *state = next;
}
