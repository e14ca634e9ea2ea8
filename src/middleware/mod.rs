//! Middleware pipeline: composable before/after request handler logic.
//!
//! ## Core types
//!
//! - [`Middleware`]: trait implemented by all middleware.
//! - [`Next`]: cursor into the remaining chain; call [`Next::run`] to advance.
//! - [`MiddlewareHandler`]: type-erased, cheaply-cloneable middleware function.
//! - [`Pipeline`]: an ordered middleware stack terminated by a [`Router`].
//! - [`LoggerMiddleware`]: request/response logger.

use std::{future::Future, pin::Pin, sync::Arc};

use tokio::time::Instant;

use crate::context::Context;
use crate::http::{Request, Response, StatusCode};
use crate::router::Router;

/// A cursor into the remaining middleware chain for a single request.
///
/// `Next` is consumed by [`run`](Self::run), so each middleware can forward
/// at most once.
pub struct Next {
    middlewares: Arc<[MiddlewareHandler]>,
    index: usize,
}

/// A type-erased, reference-counted middleware function.
pub type MiddlewareHandler = Arc<
    dyn Fn(Context, Next) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static,
>;

/// Converts a [`Middleware`] implementation into a [`MiddlewareHandler`].
pub fn from_middleware<M>(middleware: Arc<M>) -> MiddlewareHandler
where
    M: Middleware + 'static,
{
    Arc::new(move |ctx: Context, next: Next| middleware.handle(ctx, next))
}

impl Next {
    pub fn new(middlewares: impl Into<Arc<[MiddlewareHandler]>>) -> Self {
        Self {
            middlewares: middlewares.into(),
            index: 0,
        }
    }

    /// Invokes the next middleware in the chain and returns its response.
    ///
    /// An exhausted chain yields `500 Internal Server Error`.
    pub async fn run(mut self, ctx: Context) -> Response {
        match self.middlewares.get(self.index).cloned() {
            Some(handler) => {
                self.index += 1;
                handler(ctx, self).await
            }
            None => Response::new(StatusCode::InternalServerError)
                .body("No response generated by middleware pipeline"),
        }
    }
}

/// The core trait for all middleware.
///
/// Implementors may pass through (`next.run(ctx).await`), short-circuit by
/// returning a [`Response`] directly, or decorate the downstream response.
pub trait Middleware: Send + Sync {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

/// Ordered middleware stack with a [`Router`] as the innermost layer.
///
/// Layers run in the order they were added; the first added sees the
/// request first and the response last.
pub struct Pipeline {
    chain: Arc<[MiddlewareHandler]>,
}

impl Pipeline {
    pub fn new(router: Router) -> PipelineBuilder {
        PipelineBuilder {
            layers: Vec::new(),
            router,
        }
    }

    /// Runs `request` through every layer and the router.
    pub async fn handle(&self, request: Request) -> Response {
        Next::new(Arc::clone(&self.chain))
            .run(Context::new(request))
            .await
    }
}

pub struct PipelineBuilder {
    layers: Vec<MiddlewareHandler>,
    router: Router,
}

impl PipelineBuilder {
    #[must_use]
    pub fn layer<M>(mut self, middleware: M) -> Self
    where
        M: Middleware + 'static,
    {
        self.layers.push(from_middleware(Arc::new(middleware)));
        self
    }

    pub fn build(self) -> Pipeline {
        let router = Arc::new(self.router);
        let terminal: MiddlewareHandler = Arc::new(move |ctx: Context, _next: Next| {
            let router = Arc::clone(&router);
            Box::pin(async move { router.dispatch(ctx).await })
        });

        let mut chain = self.layers;
        chain.push(terminal);
        Pipeline {
            chain: chain.into(),
        }
    }
}

/// Logs method, path, status and time-to-head of every request.
///
/// For streamed responses the elapsed time covers the handler only; the body
/// is still flowing when the line is emitted.
pub struct LoggerMiddleware;

impl Middleware for LoggerMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin(async move {
            let start = Instant::now();
            let method = ctx.request().method().to_string();
            let path = ctx.request().path().to_string();

            let response = next.run(ctx).await;

            tracing::info!(
                %method,
                %path,
                status = response.status().as_u16(),
                streaming = response.is_streaming(),
                elapsed = ?start.elapsed(),
                "request handled"
            );

            response
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Tag(&'static str);

    impl Middleware for Tag {
        fn handle(
            &self,
            ctx: Context,
            next: Next,
        ) -> Pin<Box<dyn Future<Output = Response> + Send>> {
            let tag = self.0;
            Box::pin(async move {
                let mut response = next.run(ctx).await;
                let seen = response
                    .headers()
                    .get("x-trail")
                    .map(|t| format!("{t},{tag}"))
                    .unwrap_or_else(|| tag.to_string());
                response.set_header("x-trail", seen);
                response
            })
        }
    }

    struct Reject;

    impl Middleware for Reject {
        fn handle(
            &self,
            _ctx: Context,
            _next: Next,
        ) -> Pin<Box<dyn Future<Output = Response> + Send>> {
            Box::pin(async { Response::new(StatusCode::Unauthorized) })
        }
    }

    fn request(path: &str) -> Request {
        let raw = format!("GET {path} HTTP/1.1\r\n\r\n");
        Request::parse(raw.as_bytes()).unwrap().0
    }

    fn router() -> Router {
        let mut router = Router::new();
        router.get("/models", |_ctx: Context| async { Response::new(StatusCode::Ok) });
        router
    }

    #[tokio::test]
    async fn layers_unwind_inside_out() {
        let pipeline = Pipeline::new(router())
            .layer(Tag("outer"))
            .layer(Tag("inner"))
            .build();
        let res = pipeline.handle(request("/models")).await;
        assert_eq!(res.status(), StatusCode::Ok);
        assert_eq!(res.headers().get("x-trail"), Some("inner,outer"));
    }

    #[tokio::test]
    async fn short_circuit_skips_router() {
        let pipeline = Pipeline::new(router()).layer(Reject).build();
        let res = pipeline.handle(request("/models")).await;
        assert_eq!(res.status(), StatusCode::Unauthorized);
    }

    #[tokio::test]
    async fn logger_passes_response_through() {
        let pipeline = Pipeline::new(router()).layer(LoggerMiddleware).build();
        assert_eq!(
            pipeline.handle(request("/missing")).await.status(),
            StatusCode::NotFound
        );
    }

    #[tokio::test]
    async fn exhausted_chain_is_500() {
        let empty: Vec<MiddlewareHandler> = Vec::new();
        let res = Next::new(empty).run(Context::new(request("/"))).await;
        assert_eq!(res.status(), StatusCode::InternalServerError);
    }
}
