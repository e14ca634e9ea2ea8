use serde_json::json;
use tracing::error;

use crate::chat::ChatError;
use crate::http::{Response, StatusCode};
use crate::llm::ProviderError;

/// An error answered as `{"error": message}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BadRequest, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NotFound, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::InternalServerError, message)
    }

    pub fn conversation_not_found() -> Self {
        Self::not_found("Conversation not found")
    }
}

impl From<ApiError> for Response {
    fn from(err: ApiError) -> Self {
        Response::json(err.status, &json!({ "error": err.message }))
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::bad_request(format!("Invalid JSON body: {err}"))
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        let message = err.to_string();
        match err {
            ChatError::EmptyConversation | ChatError::LastMessageNotUser | ChatError::EmptyPrompt => {
                ApiError::bad_request(message)
            }
            ChatError::Store(e) => {
                error!(error = %e, "store failure while starting chat turn");
                ApiError::internal("Failed to process chat")
            }
            ChatError::Provider(e) => {
                let status = match e {
                    ProviderError::NotRegistered { .. } | ProviderError::Client { .. } => {
                        StatusCode::InternalServerError
                    }
                    _ => StatusCode::BadGateway,
                };
                ApiError::new(status, message)
            }
        }
    }
}
