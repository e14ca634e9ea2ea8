use std::pin::Pin;
use std::sync::Arc;

use crate::context::Context;
use crate::http::{Method, Response, StatusCode};
use crate::middleware::{Middleware, Next};

/// CORS middleware: validates `Origin`, answers preflight requests and adds
/// `Access-Control-*` headers to actual responses.
///
/// # Behavior
///
/// - Requests without an `Origin`, or from an origin not in the allow-list,
///   pass through unmodified.
/// - `OPTIONS` preflights are answered with `204 No Content`; the router is
///   not called.
/// - Other responses get `Access-Control-Allow-Origin` and
///   `Access-Control-Expose-Headers`, so a browser can read
///   `x-conversation-id` off a streamed chat reply.
/// - `Vary: Origin` is added when a specific origin is echoed back.
///
/// # Examples
///
/// ```rust
/// use cloudspark::security::CorsMiddleware;
///
/// let cors = CorsMiddleware::new()
///     .allow_origin("https://chat.example.com")
///     .expose_header("x-request-id");
/// ```
#[derive(Clone)]
pub struct CorsMiddleware {
    policy: Arc<CorsPolicy>,
}

struct CorsPolicy {
    origins: Vec<String>,
    methods: Vec<String>,
    headers: Vec<String>,
    exposed: Vec<String>,
}

impl Default for CorsMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl CorsMiddleware {
    /// Creates a policy with no allowed origins, the methods this API serves,
    /// `Content-Type` as allowed request header, and `x-conversation-id`
    /// exposed.
    pub fn new() -> Self {
        Self {
            policy: Arc::new(CorsPolicy {
                origins: Vec::new(),
                methods: ["GET", "POST", "DELETE", "OPTIONS"].map(String::from).to_vec(),
                headers: vec!["Content-Type".to_string()],
                exposed: vec!["x-conversation-id".to_string()],
            }),
        }
    }

    /// Adds an allowed origin. `"*"` permits every origin.
    #[must_use]
    pub fn allow_origin(self, origin: impl Into<String>) -> Self {
        self.edit(|p| p.origins.push(origin.into()))
    }

    #[must_use]
    pub fn allow_header(self, header: impl Into<String>) -> Self {
        self.edit(|p| p.headers.push(header.into()))
    }

    #[must_use]
    pub fn expose_header(self, header: impl Into<String>) -> Self {
        self.edit(|p| p.exposed.push(header.into()))
    }

    fn edit(mut self, f: impl FnOnce(&mut CorsPolicy)) -> Self {
        match Arc::get_mut(&mut self.policy) {
            Some(policy) => f(policy),
            None => {
                let mut policy = CorsPolicy {
                    origins: self.policy.origins.clone(),
                    methods: self.policy.methods.clone(),
                    headers: self.policy.headers.clone(),
                    exposed: self.policy.exposed.clone(),
                };
                f(&mut policy);
                self.policy = Arc::new(policy);
            }
        }
        self
    }
}

impl CorsPolicy {
    /// The value for `Access-Control-Allow-Origin`, if `origin` is allowed.
    fn allow(&self, origin: &str) -> Option<String> {
        if self.origins.iter().any(|o| o == "*") {
            Some("*".to_string())
        } else if self.origins.iter().any(|o| o == origin) {
            Some(origin.to_string())
        } else {
            None
        }
    }
}

impl Middleware for CorsMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        let policy = Arc::clone(&self.policy);

        Box::pin(async move {
            let allowed = ctx
                .request()
                .headers()
                .get("origin")
                .and_then(|origin| policy.allow(origin));
            let Some(allow_origin) = allowed else {
                return next.run(ctx).await;
            };
            let vary = allow_origin != "*";

            let mut resp = if ctx.request().method() == &Method::Options {
                let mut resp = Response::new(StatusCode::NoContent);
                resp.set_header("Access-Control-Allow-Methods", policy.methods.join(", "));
                resp.set_header("Access-Control-Allow-Headers", policy.headers.join(", "));
                resp.set_header("Access-Control-Max-Age", "3600");
                resp
            } else {
                let mut resp = next.run(ctx).await;
                resp.set_header("Access-Control-Expose-Headers", policy.exposed.join(", "));
                resp
            };

            resp.set_header("Access-Control-Allow-Origin", allow_origin);
            if vary {
                resp.set_header("Vary", "Origin");
            }
            resp
        })
    }
}
