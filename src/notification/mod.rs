//! Provider handlers turning events into delivery jobs.
//!
//! Each handler renders an event with its provider's formatter and submits
//! one job to the engine. Handlers never retry; retry policy belongs to the
//! delivery job.
pub mod handler;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

use crate::formatting::FormatError;
use crate::job::{JobName, SubmitError};
use thiserror::Error;

pub use handler::{EmailHandler, HttpHandler, MsTeamsHandler, ProviderHandler, SlackHandler};

/// Errors returned by [`crate::core::NotificationHandler::handle`].
#[derive(Error, Debug)]
pub enum HandlerError {
    /// The event is missing data every handler needs. Not retried.
    #[error("invalid notification event: {0}")]
    InvalidInput(String),

    /// The event cannot be rendered for this provider. Not retried.
    #[error("convert payload to {handler} body failed: {source}")]
    Format {
        handler: String,
        #[source]
        source: FormatError,
    },

    /// The job engine refused the job.
    #[error("failed to submit {job} job: {source}")]
    Submission {
        job: JobName,
        #[source]
        source: SubmitError,
    },
}
