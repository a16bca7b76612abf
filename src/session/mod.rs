//! Per-user session management.
//!
//! This module keeps in-memory state for every user that has sent a query.
//! Sessions are keyed by the caller-supplied user id. Each one pairs the
//! upstream conversation handle with a short log of recent messages.
//!
//! # Architecture
//!
//! - [`Session`]: One user's conversation, locked for the duration of a turn
//! - [`SessionStore`]: Thread-safe map of all sessions
//! - [`BoundedHistory`]: Fixed-capacity recent-message log
//!
//! # Example
//!
//! ```rust
//! use gemini_relay::session::SessionStore;
//!
//! # tokio_test_block_on(async {
//! let store = SessionStore::new();
//! let session = store.get_or_create("user-1");
//! session.lock().await.record_turn("Hello!", "Hi!");
//!
//! assert_eq!(session.history().await.len(), 2);
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

mod history;
mod thread;

pub use history::{BoundedHistory, DEFAULT_HISTORY_CAPACITY};
pub use thread::{Session, SessionState, SessionStore};
