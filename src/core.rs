//! Core domain types and service traits for the notifier
//!
//! This module defines the event record handed over by producers and the
//! trait contract every provider handler implements.

use crate::notification::HandlerError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A lifecycle event to be delivered to an external endpoint.
///
/// Created by the producer when the triggering action completes and never
/// mutated downstream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    /// Event category, e.g. `PUSH_ARTIFACT`
    #[serde(rename = "type")]
    pub event_type: String,
    /// When the triggering action completed (Unix seconds on the wire)
    #[serde(with = "chrono::serde::ts_seconds")]
    pub occur_at: DateTime<Utc>,
    /// Identity of the actor that triggered the event
    #[serde(default)]
    pub operator: String,
    /// Provider-agnostic payload
    #[serde(default)]
    pub event_data: Value,
    /// Where the notification goes
    pub target: Target,
}

/// Delivery destination of an event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Target {
    /// HTTP(S) URL of the receiving endpoint
    pub address: String,
    /// Accept any certificate presented by the endpoint
    #[serde(default)]
    pub skip_cert_verify: bool,
    /// Value for the `Authorization` header, if the endpoint wants one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_header: Option<String>,
}

impl Event {
    /// Checks the fields every handler relies on.
    pub fn validate(&self) -> Result<(), HandlerError> {
        if self.event_type.trim().is_empty() {
            return Err(HandlerError::InvalidInput("event type is empty".to_string()));
        }
        if self.target.address.trim().is_empty() {
            return Err(HandlerError::InvalidInput(
                "target address is empty".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Service Traits
// =============================================================================

/// Translates a generic event into a provider-specific delivery job.
#[async_trait]
pub trait NotificationHandler: Send + Sync {
    /// Stable identifier used in logs and metrics.
    fn name(&self) -> &str;

    /// Whether events for one subject must be handled in order.
    ///
    /// When `true` the dispatcher serializes deliveries per target address.
    fn is_stateful(&self) -> bool {
        false
    }

    /// Formats the event and submits exactly one delivery job for it.
    ///
    /// # Returns
    /// * `Ok(())` once the job has been handed to the job engine
    /// * `Err` for malformed events, formatting failures or a rejected submission
    async fn handle(&self, event: &Event) -> Result<(), HandlerError>;
}
