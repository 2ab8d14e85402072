//! Fan-out of published events to the handlers of a topic.

use crate::core::Event;
use crate::topic::TopicRegistry;
use crate::types::SharedHandler;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, instrument, warn};

/// A handler that failed during one publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFailure {
    pub handler: String,
    pub error: String,
}

/// Summary of one publish, for logging and tests. Producers are not expected
/// to act on it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PublishReport {
    pub topic: String,
    pub delivered: usize,
    pub failures: Vec<HandlerFailure>,
}

impl PublishReport {
    pub fn handler_count(&self) -> usize {
        self.delivered + self.failures.len()
    }
}

type SubjectLocks = HashMap<(String, String), Arc<tokio::sync::Mutex<()>>>;

/// Routes events through a frozen [`TopicRegistry`].
#[derive(Clone)]
pub struct Dispatcher {
    registry: TopicRegistry,
    subject_locks: Arc<Mutex<SubjectLocks>>,
}

impl Dispatcher {
    pub fn new(registry: TopicRegistry) -> Self {
        Self {
            registry,
            subject_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn registry(&self) -> &TopicRegistry {
        &self.registry
    }

    /// Invokes every handler subscribed to `topic` exactly once.
    ///
    /// Handler errors are logged and collected in the report; they never stop
    /// the remaining handlers. Publishing to a topic without subscribers is a
    /// no-op.
    #[instrument(skip_all, fields(topic = %topic, event_type = %event.event_type))]
    pub async fn publish(&self, topic: &str, event: &Event) -> PublishReport {
        let handlers = self.registry.handlers_for(topic);
        if handlers.is_empty() {
            debug!("No handlers subscribed to topic");
            return PublishReport {
                topic: topic.to_string(),
                ..Default::default()
            };
        }
        metrics::counter!("notifications_published_total", "topic" => topic.to_string())
            .increment(1);

        let outcomes = join_all(handlers.iter().map(|h| self.invoke(h, event))).await;

        let mut report = PublishReport {
            topic: topic.to_string(),
            ..Default::default()
        };
        for (handler, outcome) in handlers.iter().zip(outcomes) {
            match outcome {
                Ok(()) => report.delivered += 1,
                Err(error) => {
                    warn!(handler = handler.name(), %error, "Notification handler failed");
                    metrics::counter!("handler_failures_total", "handler" => handler.name().to_string())
                        .increment(1);
                    report.failures.push(HandlerFailure {
                        handler: handler.name().to_string(),
                        error: error.to_string(),
                    });
                }
            }
        }
        report
    }

    async fn invoke(
        &self,
        handler: &SharedHandler,
        event: &Event,
    ) -> Result<(), crate::notification::HandlerError> {
        if !handler.is_stateful() {
            return handler.handle(event).await;
        }
        let lock = self.subject_lock(handler.name(), &event.target.address);
        let _guard = lock.lock().await;
        handler.handle(event).await
    }

    fn subject_lock(&self, handler: &str, address: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .subject_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks
            .entry((handler.to_string(), address.to_string()))
            .or_default()
            .clone()
    }
}
