//! Gemini Relay
//!
//! A small HTTP front end that forwards user queries to the Google Gemini
//! API while keeping a short rolling conversation per user.
//!
//! # Architecture
//!
//! - **Server**: Axum routes for `/ask` and `/ping`
//! - **LLM**: Model client trait with a Gemini `generateContent` driver
//! - **Sessions**: Per-user conversation handle and bounded recent history
//! - **Keep-alive**: Background self-ping so the host does not idle the process
//!
//! # Modules
//!
//! - [`config`]: Layered configuration (defaults, file, env, CLI)
//! - [`error`]: HTTP and startup error types
//! - [`keepalive`]: Liveness prober
//! - [`llm`]: Model client trait and Gemini driver
//! - [`server`]: Router and request handlers
//! - [`session`]: Session store and bounded history
//! - [`telemetry`]: Tracing subscriber setup

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]

pub mod config;
pub mod error;
pub mod keepalive;
pub mod llm;
pub mod server;
pub mod session;
pub mod telemetry;

use llm::ChatModel;
use session::SessionStore;
use std::sync::Arc;

/// Application state shared across all handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Upstream model client.
    pub model: Arc<dyn ChatModel>,
    /// Session store for per-user conversations.
    pub sessions: SessionStore,
}
