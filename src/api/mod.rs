//! HTTP surface of the gateway.
//!
//! | Method | Path                  | Handler                    |
//! |--------|-----------------------|----------------------------|
//! | POST   | `/chat`               | streamed assistant reply   |
//! | POST   | `/generate`           | streamed generated prompt  |
//! | GET    | `/conversations`      | caller's conversations     |
//! | GET    | `/conversations/:id`  | one conversation, messages |
//! | DELETE | `/conversations/:id`  | delete with messages       |
//! | GET    | `/models`             | enabled catalog entries    |

use std::sync::Arc;

mod chat;
mod conversations;
mod error;

pub use chat::CONVERSATION_HEADER;
pub use error::ApiError;

use crate::chat::ChatGateway;
use crate::context::Context;
use crate::http::{Response, StatusCode};
use crate::middleware::{LoggerMiddleware, Pipeline};
use crate::router::Router;
use crate::security::{Caller, CorsMiddleware, GuestIdentity, IdentityMiddleware};

/// Registers every endpoint on a fresh router.
pub fn router(gateway: Arc<ChatGateway>) -> Router {
    let mut router = Router::new();

    let gw = Arc::clone(&gateway);
    router.post("/chat", move |ctx: Context| {
        let gw = Arc::clone(&gw);
        async move { respond(chat::chat(&gw, ctx).await) }
    });

    let gw = Arc::clone(&gateway);
    router.post("/generate", move |ctx: Context| {
        let gw = Arc::clone(&gw);
        async move { respond(chat::generate(&gw, ctx).await) }
    });

    let gw = Arc::clone(&gateway);
    router.get("/conversations", move |ctx: Context| {
        let gw = Arc::clone(&gw);
        async move { respond(conversations::list(gw.database(), ctx).await) }
    });

    let gw = Arc::clone(&gateway);
    router.get("/conversations/:id", move |ctx: Context| {
        let gw = Arc::clone(&gw);
        async move { respond(conversations::get(gw.database(), ctx).await) }
    });

    let gw = Arc::clone(&gateway);
    router.delete("/conversations/:id", move |ctx: Context| {
        let gw = Arc::clone(&gw);
        async move { respond(conversations::delete(gw.database(), ctx).await) }
    });

    let gw = gateway;
    router.get("/models", move |ctx: Context| {
        let gw = Arc::clone(&gw);
        async move { respond(conversations::models(gw.database(), ctx).await) }
    });

    router
}

/// The full application: request logging, CORS, guest identity, then routes.
pub fn app(gateway: Arc<ChatGateway>, cors: CorsMiddleware) -> Pipeline {
    Pipeline::new(router(gateway))
        .layer(LoggerMiddleware)
        .layer(cors)
        .layer(IdentityMiddleware::new(GuestIdentity))
        .build()
}

fn respond(result: Result<Response, ApiError>) -> Response {
    result.unwrap_or_else(Response::from)
}

fn caller(ctx: &Context) -> Result<Caller, ApiError> {
    ctx.extensions()
        .get::<Caller>()
        .cloned()
        .ok_or_else(|| ApiError::new(StatusCode::Unauthorized, "Unauthorized"))
}
