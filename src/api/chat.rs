//! `POST /chat` and `POST /generate`.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Deserialize;

use super::ApiError;
use crate::chat::{ChatGateway, ChatInput};
use crate::context::Context;
use crate::http::{BodyError, Response, StatusCode};
use crate::llm::{ChatMessage, ProviderError};

pub const CONVERSATION_HEADER: &str = "x-conversation-id";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatBody {
    messages: Vec<ChatMessage>,
    #[serde(default)]
    model_id: Option<String>,
    #[serde(default)]
    conversation_id: Option<String>,
    #[serde(default)]
    domain: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateBody {
    #[serde(default)]
    prompt: String,
    #[serde(default)]
    provider: Option<String>,
}

pub(super) async fn chat(gateway: &ChatGateway, ctx: Context) -> Result<Response, ApiError> {
    let caller = super::caller(&ctx)?;
    let body: ChatBody = ctx.json()?;
    let input = ChatInput {
        messages: body.messages,
        model_id: body.model_id,
        conversation_id: body.conversation_id,
        domain: body.domain,
    };

    // The completion handle is dropped; its task keeps running detached.
    let turn = gateway.start_turn(&caller, input).await?;
    Ok(text_stream(turn.stream).header(CONVERSATION_HEADER, turn.conversation_id))
}

pub(super) async fn generate(gateway: &ChatGateway, ctx: Context) -> Result<Response, ApiError> {
    super::caller(&ctx)?;
    let body: GenerateBody = ctx.json()?;
    let tokens = gateway
        .generate_prompt(&body.prompt, body.provider.as_deref())
        .await?;
    Ok(text_stream(tokens))
}

fn text_stream<S>(tokens: S) -> Response
where
    S: Stream<Item = Result<String, ProviderError>> + Send + 'static,
{
    let body = tokens.map(|item| item.map(Bytes::from).map_err(|e| Box::new(e) as BodyError));
    Response::stream(StatusCode::Ok, body)
        .header("Content-Type", "text/plain; charset=utf-8")
        .header("Cache-Control", "no-cache")
}
