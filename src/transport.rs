use std::time::Duration;

use crate::{HttpClientError, Result};

/// Defaults used when no transport or client is supplied.
pub mod defaults {
    use std::time::Duration;

    pub const MAX_IDLE_CONNS_PER_HOST: usize = 10;
    pub const IDLE_CONN_TIMEOUT: Duration = Duration::from_secs(10);
    /// TCP dial budget.
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
    pub const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
    /// Overall per-call timeout applied to clients this crate builds.
    pub const CALL_TIMEOUT: Duration = Duration::from_secs(2);
}

/// Connection-level settings used to build the underlying `reqwest` client.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TransportConfig {
    /// Maximum idle pooled connections kept per host.
    pub max_idle_per_host: usize,
    /// How long an idle pooled connection is kept.
    pub idle_timeout: Duration,
    /// Deadline for the TCP dial.
    pub connect_timeout: Duration,
    /// Deadline for the TLS handshake on `https` connections.
    pub tls_handshake_timeout: Duration,
    /// Skips TLS certificate verification. Off by default.
    pub insecure_skip_verify: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_idle_per_host: defaults::MAX_IDLE_CONNS_PER_HOST,
            idle_timeout: defaults::IDLE_CONN_TIMEOUT,
            connect_timeout: defaults::CONNECT_TIMEOUT,
            tls_handshake_timeout: defaults::TLS_HANDSHAKE_TIMEOUT,
            insecure_skip_verify: false,
        }
    }
}

impl TransportConfig {
    /// Deadline reqwest applies to establishing a connection.
    ///
    /// reqwest has a single connect deadline covering the dial and the TLS
    /// handshake together, so it gets the sum of both budgets. The overall
    /// call timeout still bounds the whole request.
    pub fn connect_deadline(&self) -> Duration {
        self.connect_timeout.saturating_add(self.tls_handshake_timeout)
    }

    /// Builds a pooled client. A zero `timeout` leaves calls without an overall deadline.
    pub(crate) fn build_client(&self, timeout: Duration) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder()
            .pool_max_idle_per_host(self.max_idle_per_host)
            .pool_idle_timeout(self.idle_timeout)
            .connect_timeout(self.connect_deadline())
            .danger_accept_invalid_certs(self.insecure_skip_verify);
        if !timeout.is_zero() {
            builder = builder.timeout(timeout);
        }
        builder.build().map_err(HttpClientError::Build)
    }
}
