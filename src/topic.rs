//! Topic to handler routing.
//!
//! The registry is assembled once at startup through [`TopicRegistryBuilder`]
//! and frozen by [`TopicRegistryBuilder::build`]. After that it is shared
//! across tasks and read without locks.

use crate::job::JobSubmitter;
use crate::notification::{EmailHandler, HttpHandler, MsTeamsHandler, SlackHandler};
use crate::types::SharedHandler;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

pub const WEBHOOK_TOPIC: &str = "http";
pub const SLACK_TOPIC: &str = "slack";
pub const MSTEAMS_TOPIC: &str = "teams";
pub const EMAIL_TOPIC: &str = "email";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopicError {
    #[error("invalid topic {0:?}")]
    InvalidTopic(String),
}

/// Collects subscriptions before the registry is frozen.
#[derive(Default)]
pub struct TopicRegistryBuilder {
    handlers: HashMap<String, Vec<SharedHandler>>,
}

impl TopicRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `handler` to the topic's list. Repeated subscriptions of the
    /// same handler are kept, so it will be invoked once per subscription.
    pub fn subscribe(
        &mut self,
        topic: &str,
        handler: SharedHandler,
    ) -> Result<&mut Self, TopicError> {
        if topic.trim().is_empty() {
            return Err(TopicError::InvalidTopic(topic.to_string()));
        }
        self.handlers
            .entry(topic.to_string())
            .or_default()
            .push(handler);
        Ok(self)
    }

    pub fn build(self) -> TopicRegistry {
        TopicRegistry {
            handlers: Arc::new(self.handlers),
        }
    }
}

/// Frozen mapping from topic to its ordered handlers.
#[derive(Clone, Default)]
pub struct TopicRegistry {
    handlers: Arc<HashMap<String, Vec<SharedHandler>>>,
}

impl TopicRegistry {
    pub fn builder() -> TopicRegistryBuilder {
        TopicRegistryBuilder::new()
    }

    /// Handlers subscribed to `topic`, in subscription order. Unknown topics
    /// have none.
    pub fn handlers_for(&self, topic: &str) -> &[SharedHandler] {
        self.handlers
            .get(topic)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for TopicRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (topic, handlers) in self.handlers.iter() {
            let names: Vec<&str> = handlers.iter().map(|h| h.name()).collect();
            map.entry(topic, &names);
        }
        map.finish()
    }
}

/// Registers the four built-in provider handlers on their topics.
pub fn default_registry(submitter: Arc<dyn JobSubmitter>) -> TopicRegistry {
    let subscriptions: [(&str, SharedHandler); 4] = [
        (WEBHOOK_TOPIC, Arc::new(HttpHandler::new(submitter.clone()))),
        (SLACK_TOPIC, Arc::new(SlackHandler::new(submitter.clone()))),
        (MSTEAMS_TOPIC, Arc::new(MsTeamsHandler::new(submitter.clone()))),
        (EMAIL_TOPIC, Arc::new(EmailHandler::new(submitter))),
    ];

    let mut builder = TopicRegistry::builder();
    for (topic, handler) in subscriptions {
        let name = handler.name().to_string();
        match builder.subscribe(topic, handler) {
            Ok(_) => debug!(topic, handler = %name, "Topic subscribed"),
            Err(e) => error!(topic, handler = %name, error = %e, "Failed to subscribe topic"),
        }
    }
    builder.build()
}
