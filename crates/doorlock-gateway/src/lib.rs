//! `doorlock-gateway` – Unlock Request Listener
//!
//! A deliberately small HTTP/1.1 front end (default port `8080`).  It reads
//! one request head per connection, passes the query string and
//! `Content-Type` header to the [`DeviceContext`], and answers with the
//! resulting status line.  The reason phrase doubles as a `text/plain` body.
//!
//! Only `POST` is accepted; other methods get `405 Method-Not-Allowed`.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use doorlock_gateway::GatewayServer;
//! # async fn run(ctx: Arc<doorlock_runtime::DeviceContext>) {
//! GatewayServer::new(ctx)
//!     .with_port(8080)
//!     .run()
//!     .await
//!     .expect("gateway failed");
//! # }
//! ```
//!
//! [`DeviceContext`]: doorlock_runtime::DeviceContext

pub mod server;

pub use server::{DEFAULT_PORT, GatewayServer};
