//! Notifier - asynchronous event notification dispatch
//!
//! Lifecycle events published on a topic are fanned out to the provider
//! handlers subscribed to it. Each handler renders the event for its
//! provider (generic webhook, Slack, Microsoft Teams, email relay) and queues
//! a delivery job; the in-process job engine performs the HTTP delivery with
//! bounded retries and per-provider concurrency limits.

pub mod app;
pub mod cli;
pub mod config;
pub mod core;
pub mod dispatcher;
pub mod formatting;
pub mod job;
pub mod notification;
pub mod task_manager;
pub mod topic;
pub mod types;

// Re-export core types for convenience
pub use crate::core::*;
pub use crate::dispatcher::{Dispatcher, HandlerFailure, PublishReport};
pub use crate::topic::{TopicRegistry, TopicRegistryBuilder};
