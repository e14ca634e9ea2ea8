//! Security middleware: CORS for the browser client and caller identity.
//!
//! - [`CorsMiddleware`]: `Access-Control-*` headers and preflight handling.
//! - [`IdentityProvider`] / [`IdentityMiddleware`]: resolves the [`Caller`]
//!   for each request and stores it in the request extensions.
//!
//! The only identity source today is [`GuestIdentity`], a single shared
//! guest account. Real authentication slots in as another
//! [`IdentityProvider`] without touching the handlers.

mod cors;
mod identity;

pub use cors::CorsMiddleware;
pub use identity::{Caller, GUEST_EMAIL, GUEST_USER_ID, GuestIdentity, IdentityMiddleware, IdentityProvider};
