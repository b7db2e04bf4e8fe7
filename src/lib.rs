//! Offline-tolerant client core for a remote AI coding assistant.
//!
//! [`Core`] ties together connectivity tracking, a durable response cache, a replaying
//! mutation queue, the HTTP client and the task poller.

pub mod api;
pub mod cache;
pub mod client;
pub mod config;
pub mod connectivity;
pub mod context;
pub mod events;
pub mod logging;
pub mod queue;
pub mod store;
pub mod tasks;

pub use config::Config;
pub use context::Core;
