//! The shared pair of HTTP clients used by delivery jobs.

use crate::config::HttpConfig;
use std::time::Duration;

/// Secure and certificate-skipping clients, built once and shared.
///
/// `reqwest::Client` pools connections internally and is cheap to clone.
#[derive(Debug, Clone)]
pub struct HttpClients {
    secure: reqwest::Client,
    insecure: reqwest::Client,
}

impl HttpClients {
    /// Builds both clients from the HTTP configuration.
    pub fn new(config: &HttpConfig) -> Result<Self, reqwest::Error> {
        let timeout = Duration::from_secs(config.timeout_seconds);
        let secure = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(&config.user_agent)
            .build()?;
        let insecure = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(&config.user_agent)
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self { secure, insecure })
    }

    /// Returns the client matching the target's certificate policy.
    pub fn get(&self, skip_cert_verify: bool) -> &reqwest::Client {
        if skip_cert_verify {
            &self.insecure
        } else {
            &self.secure
        }
    }
}
