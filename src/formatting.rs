// src/formatting.rs

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

/// Errors raised while rendering an event into a provider payload.
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("failed to serialize event data: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A trait for rendering an event into the wire body of one provider.
///
/// Implementations must be pure: the same input always yields the same body.
pub trait PayloadFormatter: Send + Sync {
    fn format(
        &self,
        event_type: &str,
        occur_at: DateTime<Utc>,
        operator: &str,
        event_data: &Value,
    ) -> Result<String, FormatError>;
}

/// Plain JSON body for generic webhook receivers.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpFormatter;

#[derive(Serialize)]
struct HttpBody<'a> {
    #[serde(rename = "type")]
    event_type: &'a str,
    occur_at: i64,
    operator: &'a str,
    event_data: &'a Value,
}

impl PayloadFormatter for HttpFormatter {
    fn format(
        &self,
        event_type: &str,
        occur_at: DateTime<Utc>,
        operator: &str,
        event_data: &Value,
    ) -> Result<String, FormatError> {
        let body = HttpBody {
            event_type,
            occur_at: occur_at.timestamp(),
            operator,
            event_data,
        };
        Ok(serde_json::to_string(&body)?)
    }
}

/// Slack Block Kit message for incoming webhooks.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlackFormatter;

impl PayloadFormatter for SlackFormatter {
    fn format(
        &self,
        event_type: &str,
        occur_at: DateTime<Utc>,
        operator: &str,
        event_data: &Value,
    ) -> Result<String, FormatError> {
        // Slack renders the date token in the reader's timezone and falls back
        // to the text after the pipe.
        let date = format!(
            "<!date^{}^{{date}} at {{time}}|{}>",
            occur_at.timestamp(),
            occur_at.to_rfc2822()
        );
        let data_block = fenced_json(event_data)?;
        let body = json!({
            "blocks": [
                {
                    "type": "section",
                    "text": { "type": "mrkdwn", "text": "*Event notification*" }
                },
                {
                    "type": "section",
                    "fields": [
                        { "type": "mrkdwn", "text": format!("*event_type:* {}", event_type) },
                        { "type": "mrkdwn", "text": format!("*occur_at:* {}", date) },
                        { "type": "mrkdwn", "text": format!("*operator:* {}", operator) }
                    ]
                },
                {
                    "type": "section",
                    "text": {
                        "type": "mrkdwn",
                        "text": format!("*event_data:*\n{}", data_block)
                    }
                }
            ]
        });
        Ok(serde_json::to_string(&body)?)
    }
}

/// Office 365 connector `MessageCard` for Microsoft Teams incoming webhooks.
#[derive(Debug, Clone, Copy, Default)]
pub struct MsTeamsFormatter;

impl MsTeamsFormatter {
    const THEME_COLOR: &'static str = "0078D7";

    /// One fact per scalar top-level field of the event data.
    fn facts(event_data: &Value) -> Vec<Value> {
        let Some(fields) = event_data.as_object() else {
            return Vec::new();
        };
        fields
            .iter()
            .filter_map(|(name, value)| {
                let value = match value {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    _ => return None,
                };
                Some(json!({ "name": format!("{}:", name), "value": value }))
            })
            .collect()
    }
}

impl PayloadFormatter for MsTeamsFormatter {
    fn format(
        &self,
        event_type: &str,
        occur_at: DateTime<Utc>,
        operator: &str,
        event_data: &Value,
    ) -> Result<String, FormatError> {
        let data_block = fenced_json(event_data)?;
        let body = json!({
            "@type": "MessageCard",
            "@context": "https://schema.org/extensions",
            "summary": format!("{} notification", event_type),
            "themeColor": Self::THEME_COLOR,
            "title": event_type,
            "sections": [
                {
                    "activityTitle": format!("Triggered by {}", operator),
                    "activitySubtitle": occur_at.to_rfc3339(),
                    "startGroup": true,
                    "facts": Self::facts(event_data),
                    "text": data_block
                }
            ]
        });
        Ok(serde_json::to_string(&body)?)
    }
}

/// Subject and plain-text body for an HTTP email relay.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmailFormatter;

impl PayloadFormatter for EmailFormatter {
    fn format(
        &self,
        event_type: &str,
        occur_at: DateTime<Utc>,
        operator: &str,
        event_data: &Value,
    ) -> Result<String, FormatError> {
        let text = format!(
            "Event: {}\nOccurred at: {}\nOperator: {}\n\n{}",
            event_type,
            occur_at.to_rfc3339(),
            operator,
            serde_json::to_string_pretty(event_data)?
        );
        let body = json!({
            "subject": format!("[{}] event notification", event_type),
            "text": text,
        });
        Ok(serde_json::to_string(&body)?)
    }
}

fn fenced_json(value: &Value) -> Result<String, FormatError> {
    Ok(format!("```\n{}\n```", serde_json::to_string_pretty(value)?))
}
