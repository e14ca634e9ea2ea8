//! Conversation history and catalog endpoints.

use serde_json::json;
use tracing::error;

use super::ApiError;
use crate::context::Context;
use crate::database::Database;
use crate::http::{Response, StatusCode};

fn path_id(ctx: &Context) -> Result<String, ApiError> {
    ctx.params()
        .get("id")
        .map(str::to_owned)
        .ok_or_else(ApiError::conversation_not_found)
}

pub(super) async fn list(db: &Database, ctx: Context) -> Result<Response, ApiError> {
    let caller = super::caller(&ctx)?;
    let conversations = db.list_conversations(&caller.id).await.map_err(|e| {
        error!(error = %e, "listing conversations failed");
        ApiError::internal("Failed to fetch conversations")
    })?;
    Ok(Response::json(StatusCode::Ok, &conversations))
}

pub(super) async fn get(db: &Database, ctx: Context) -> Result<Response, ApiError> {
    let caller = super::caller(&ctx)?;
    let id = path_id(&ctx)?;
    let detail = db
        .conversation_with_messages(&id, &caller.id)
        .await
        .map_err(|e| {
            error!(conversation = %id, error = %e, "loading conversation failed");
            ApiError::internal("Failed to fetch conversation")
        })?
        .ok_or_else(ApiError::conversation_not_found)?;
    Ok(Response::json(StatusCode::Ok, &detail))
}

pub(super) async fn delete(db: &Database, ctx: Context) -> Result<Response, ApiError> {
    let caller = super::caller(&ctx)?;
    let id = path_id(&ctx)?;
    let deleted = db.delete_conversation(&id, &caller.id).await.map_err(|e| {
        error!(conversation = %id, error = %e, "deleting conversation failed");
        ApiError::internal("Failed to delete conversation")
    })?;
    if !deleted {
        return Err(ApiError::conversation_not_found());
    }
    Ok(Response::json(StatusCode::Ok, &json!({ "success": true })))
}

pub(super) async fn models(db: &Database, _ctx: Context) -> Result<Response, ApiError> {
    let models = db.enabled_models().await.map_err(|e| {
        error!(error = %e, "loading catalog failed");
        ApiError::internal("Failed to fetch models")
    })?;
    Ok(Response::json(StatusCode::Ok, &models))
}
