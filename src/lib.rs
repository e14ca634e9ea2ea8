//! # cloudspark
//!
//! A streaming chat gateway. Requests name a catalog model; the gateway
//! resolves it to a hosted provider, streams the reply back over chunked
//! HTTP/1.1, and records the exchange in SQLite. The assistant's reply is
//! stored only when the stream reaches its end.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use cloudspark::api;
//! use cloudspark::chat::ChatGateway;
//! use cloudspark::database::Database;
//! use cloudspark::llm::{ProviderRegistry, ProviderSettings};
//! use cloudspark::security::CorsMiddleware;
//! use cloudspark::server::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::open("cloudspark.db")?;
//!     let providers = ProviderRegistry::from_settings(ProviderSettings::defaults_for)?;
//!     let gateway = Arc::new(ChatGateway::new(db, providers));
//!     let app = Arc::new(api::app(gateway, CorsMiddleware::new().allow_origin("*")));
//!
//!     let server = Server::bind("127.0.0.1:3000").await?;
//!     server
//!         .run(move |req| {
//!             let app = Arc::clone(&app);
//!             async move { app.handle(req).await }
//!         })
//!         .await?;
//!     Ok(())
//! }
//! ```

// ── Transport ───────────────────────────────────────────────────────────────
pub mod context;
pub mod http;
pub mod middleware;
pub mod router;
pub mod security;
pub mod server;

// ── Gateway ─────────────────────────────────────────────────────────────────
pub mod api;
pub mod background;
pub mod chat;
pub mod config;
pub mod database;
pub mod llm;

// ── Convenience re-exports ──────────────────────────────────────────────────
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use server::{Server, ServerError};
