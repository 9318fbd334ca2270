//! Envoy retry policies and their header encoding.
//!
//! The crate never retries on its own. A policy is validated and turned into
//! `x-envoy-*` request headers which the upstream Envoy proxy interprets.

use std::fmt;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::{strings::join, HttpClientError, Result};

/// Request header names understood by Envoy's router filter.
pub mod headers {
    pub const MAX_RETRIES: &str = "x-envoy-max-retries";
    pub const TOTAL_TIMEOUT_MS: &str = "x-envoy-upstream-rq-timeout-ms";
    pub const PER_TRY_TIMEOUT_MS: &str = "x-envoy-upstream-rq-per-try-timeout-ms";
    pub const RETRIABLE_STATUS_CODES: &str = "x-envoy-retriable-status-codes";
    pub const RETRIABLE_HEADERS: &str = "x-envoy-retriable-headers";
    pub const RETRY_ON: &str = "x-envoy-retry-on";
}

/// A named `x-envoy-retry-on` condition.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum RetryOn {
    FiveXx,
    GatewayError,
    Reset,
    ConnectFailure,
    EnvoyRateLimited,
    Retriable4xx,
    RefusedStream,
    Http3PostConnectFailure,
    /// Retry on the codes listed in [`EnvoyRetryPolicy::retriable_status_codes`].
    RetriableStatusCodes,
    /// Retry when a response carries one of [`EnvoyRetryPolicy::retriable_headers`].
    RetriableHeaders,
}

impl RetryOn {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FiveXx => "5xx",
            Self::GatewayError => "gateway-error",
            Self::Reset => "reset",
            Self::ConnectFailure => "connect-failure",
            Self::EnvoyRateLimited => "envoy-ratelimited",
            Self::Retriable4xx => "retriable-4xx",
            Self::RefusedStream => "refused-stream",
            Self::Http3PostConnectFailure => "http3-post-connect-failure",
            Self::RetriableStatusCodes => "retriable-status-codes",
            Self::RetriableHeaders => "retriable-headers",
        }
    }
}

impl fmt::Display for RetryOn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declarative retry policy executed by the Envoy proxy in front of the upstream.
///
/// `Default` is the empty policy (zero retries, no timeouts, no conditions).
/// [`EnvoyRetryPolicy::standard`] is the recommended starting point.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct EnvoyRetryPolicy {
    /// Retries after the initial attempt. Zero is still sent on the wire.
    pub max_retries: u16,
    /// Overall upstream deadline across all attempts.
    pub total_timeout: Duration,
    /// Deadline of each individual attempt.
    pub per_try_timeout: Duration,
    /// Conditions, sent verbatim and in order.
    pub retry_on: Vec<RetryOn>,
    /// Explicit retriable status codes, each in `100..=599`.
    pub retriable_status_codes: Vec<u16>,
    /// Response header names that make a response retriable.
    pub retriable_headers: Vec<String>,
}

impl EnvoyRetryPolicy {
    /// Three retries of at most 10s each within 31s, on connection failures,
    /// rate limiting, refused streams and `429`/`502`/`503`.
    pub fn standard() -> Self {
        Self {
            max_retries: 3,
            total_timeout: Duration::from_secs(31),
            per_try_timeout: Duration::from_secs(10),
            retry_on: vec![
                RetryOn::ConnectFailure,
                RetryOn::EnvoyRateLimited,
                RetryOn::Retriable4xx,
                RetryOn::RefusedStream,
                RetryOn::RetriableStatusCodes,
            ],
            retriable_status_codes: vec![429, 502, 503],
            retriable_headers: Vec::new(),
        }
    }

    /// Checks the timeout budget and the explicit code and header lists.
    ///
    /// With `max_retries > 0` both timeouts are required, and the total must
    /// cover every attempt: `total >= (per_try + 1ns) * max_retries`.
    pub fn validate(&self) -> Result<()> {
        let total = self.total_timeout;
        let per_try = self.per_try_timeout;

        if self.max_retries > 0 && (total.is_zero() || per_try.is_zero()) {
            return Err(HttpClientError::Validation(format!(
                "max_retries is set but total_timeout({total:?}) or per_try_timeout({per_try:?}) is not set"
            )));
        }
        if total < per_try {
            return Err(HttpClientError::Validation(format!(
                "total_timeout({total:?}) is less than per_try_timeout({per_try:?})"
            )));
        }
        let budget = (per_try + Duration::from_nanos(1)).checked_mul(u32::from(self.max_retries));
        if budget.map_or(true, |budget| total < budget) {
            return Err(HttpClientError::Validation(format!(
                "total_timeout({total:?}) is less than (per_try_timeout({per_try:?}) + 1ns) * max_retries({})",
                self.max_retries
            )));
        }

        if let Some(code) = self
            .retriable_status_codes
            .iter()
            .find(|code| !(100..=599).contains(*code))
        {
            return Err(HttpClientError::Validation(format!(
                "invalid status code {code} passed in retriable_status_codes"
            )));
        }
        if self.retriable_headers.iter().any(String::is_empty) {
            return Err(HttpClientError::Validation(
                "empty header passed in retriable_headers".to_owned(),
            ));
        }
        Ok(())
    }

    /// Validates the policy and encodes it as Envoy request headers.
    pub fn to_headers(&self) -> Result<HeaderMap> {
        self.validate()?;

        let mut encoded = HeaderMap::new();
        insert(&mut encoded, headers::MAX_RETRIES, self.max_retries.to_string())?;
        if !self.total_timeout.is_zero() {
            insert(
                &mut encoded,
                headers::TOTAL_TIMEOUT_MS,
                self.total_timeout.as_millis().to_string(),
            )?;
        }
        if !self.per_try_timeout.is_zero() {
            insert(
                &mut encoded,
                headers::PER_TRY_TIMEOUT_MS,
                self.per_try_timeout.as_millis().to_string(),
            )?;
        }
        if !self.retriable_status_codes.is_empty() {
            insert(
                &mut encoded,
                headers::RETRIABLE_STATUS_CODES,
                join(&self.retriable_status_codes, ","),
            )?;
        }
        if !self.retriable_headers.is_empty() {
            insert(
                &mut encoded,
                headers::RETRIABLE_HEADERS,
                join(&self.retriable_headers, ","),
            )?;
        }
        if !self.retry_on.is_empty() {
            insert(&mut encoded, headers::RETRY_ON, join(&self.retry_on, ","))?;
        }
        Ok(encoded)
    }
}

fn insert(map: &mut HeaderMap, name: &'static str, value: String) -> Result<()> {
    let value = HeaderValue::try_from(value).map_err(|err| {
        HttpClientError::Validation(format!("invalid value for header '{name}': {err}"))
    })?;
    map.insert(HeaderName::from_static(name), value);
    Ok(())
}
