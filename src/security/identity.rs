use std::pin::Pin;
use std::sync::Arc;

use crate::context::Context;
use crate::http::{Request, Response, StatusCode};
use crate::middleware::{Middleware, Next};

/// Id of the implicit single user.
pub const GUEST_USER_ID: &str = "cloudspark-guest";
pub const GUEST_EMAIL: &str = "guest@cloudspark.tech";

/// The user on whose behalf a request runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub id: String,
    pub email: String,
}

impl Caller {
    pub fn guest() -> Self {
        Self {
            id: GUEST_USER_ID.to_string(),
            email: GUEST_EMAIL.to_string(),
        }
    }
}

/// Supplies the [`Caller`] for a request, or `None` when it cannot be identified.
pub trait IdentityProvider: Send + Sync {
    fn identify(&self, request: &Request) -> Option<Caller>;
}

/// Every request runs as the shared guest account.
#[derive(Debug, Default, Clone, Copy)]
pub struct GuestIdentity;

impl IdentityProvider for GuestIdentity {
    fn identify(&self, _request: &Request) -> Option<Caller> {
        Some(Caller::guest())
    }
}

/// Stores the identified [`Caller`] in the context extensions.
///
/// Unidentified requests are rejected with `401` before they reach a handler.
pub struct IdentityMiddleware {
    provider: Arc<dyn IdentityProvider>,
}

impl IdentityMiddleware {
    pub fn new(provider: impl IdentityProvider + 'static) -> Self {
        Self {
            provider: Arc::new(provider),
        }
    }
}

impl Middleware for IdentityMiddleware {
    fn handle(&self, mut ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        let caller = self.provider.identify(ctx.request());

        Box::pin(async move {
            match caller {
                Some(caller) => {
                    ctx.extensions_mut().insert(caller);
                    next.run(ctx).await
                }
                None => Response::json(
                    StatusCode::Unauthorized,
                    &serde_json::json!({ "error": "Unauthorized" }),
                ),
            }
        })
    }
}
