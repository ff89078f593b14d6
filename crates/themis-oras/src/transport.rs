//! The long-lived HTTP transport pair.
//!
//! Two clients are built once at store construction and shared by every
//! repository client: one verifying TLS, one skipping verification for
//! registries listed as insecure. TLS settings are baked into a client,
//! so selecting per registry requires two static clients rather than
//! per-call configuration, keeping connection pooling effective.

use std::time::Duration;
use themis_core::StoreError;

const MAX_IDLE_CONNS_PER_HOST: usize = 100;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// The TLS-verifying and TLS-skipping client pair.
#[derive(Debug, Clone)]
pub struct TransportPair {
    secure: reqwest::Client,
    insecure: reqwest::Client,
}

impl TransportPair {
    /// Builds both clients with shared pool tuning.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] when a client cannot be
    /// constructed.
    pub fn new() -> Result<Self, StoreError> {
        let build_error = |e: reqwest::Error| StoreError::Config {
            reason: format!("failed to build HTTP client: {e}"),
        };

        let secure = reqwest::Client::builder()
            .pool_max_idle_per_host(MAX_IDLE_CONNS_PER_HOST)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(build_error)?;

        let insecure = reqwest::Client::builder()
            .pool_max_idle_per_host(MAX_IDLE_CONNS_PER_HOST)
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(build_error)?;

        Ok(Self { secure, insecure })
    }

    /// Selects the client for a registry; `insecure` skips TLS
    /// verification.
    #[must_use]
    pub const fn select(&self, insecure: bool) -> &reqwest::Client {
        if insecure {
            &self.insecure
        } else {
            &self.secure
        }
    }
}
