//! The provider handlers: one formatter and one job name each.

use super::HandlerError;
use crate::core::{Event, NotificationHandler};
use crate::formatting::{
    EmailFormatter, HttpFormatter, MsTeamsFormatter, PayloadFormatter, SlackFormatter,
};
use crate::job::{DeliveryParams, JobDescription, JobName, JobSubmitter};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Formats events for one provider and submits them as delivery jobs.
pub struct ProviderHandler<F> {
    name: &'static str,
    job_name: JobName,
    formatter: F,
    submitter: Arc<dyn JobSubmitter>,
}

pub type HttpHandler = ProviderHandler<HttpFormatter>;
pub type SlackHandler = ProviderHandler<SlackFormatter>;
pub type MsTeamsHandler = ProviderHandler<MsTeamsFormatter>;
pub type EmailHandler = ProviderHandler<EmailFormatter>;

impl<F: PayloadFormatter> ProviderHandler<F> {
    pub fn with_formatter(
        name: &'static str,
        job_name: JobName,
        formatter: F,
        submitter: Arc<dyn JobSubmitter>,
    ) -> Self {
        Self {
            name,
            job_name,
            formatter,
            submitter,
        }
    }

    pub fn job_name(&self) -> JobName {
        self.job_name
    }
}

impl HttpHandler {
    pub fn new(submitter: Arc<dyn JobSubmitter>) -> Self {
        Self::with_formatter("HTTP", JobName::Webhook, HttpFormatter, submitter)
    }
}

impl SlackHandler {
    pub fn new(submitter: Arc<dyn JobSubmitter>) -> Self {
        Self::with_formatter("Slack", JobName::Slack, SlackFormatter, submitter)
    }
}

impl MsTeamsHandler {
    pub fn new(submitter: Arc<dyn JobSubmitter>) -> Self {
        Self::with_formatter("MSTeams", JobName::MsTeams, MsTeamsFormatter, submitter)
    }
}

impl EmailHandler {
    pub fn new(submitter: Arc<dyn JobSubmitter>) -> Self {
        Self::with_formatter("Email", JobName::Email, EmailFormatter, submitter)
    }
}

#[async_trait]
impl<F: PayloadFormatter> NotificationHandler for ProviderHandler<F> {
    fn name(&self) -> &str {
        self.name
    }

    #[instrument(skip_all, fields(handler = self.name, event_type = %event.event_type))]
    async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        event.validate()?;

        let payload = self
            .formatter
            .format(
                &event.event_type,
                event.occur_at,
                &event.operator,
                &event.event_data,
            )
            .map_err(|source| HandlerError::Format {
                handler: self.name.to_string(),
                source,
            })?;

        let params = DeliveryParams::new(
            payload,
            &event.target.address,
            event.target.skip_cert_verify,
            event.target.auth_header.clone(),
        )
        .map_err(|e| HandlerError::InvalidInput(e.to_string()))?;

        let job_id = self
            .submitter
            .submit(JobDescription::generic(self.job_name, params))
            .map_err(|source| HandlerError::Submission {
                job: self.job_name,
                source,
            })?;
        debug!(job_id, job = %self.job_name, "Delivery job submitted");
        Ok(())
    }
}
