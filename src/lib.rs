//! `layered-http-client` builds outbound HTTP requests from three tiers of
//! configuration:
//! - client options ([`ClientOption`]): transport, prebuilt client, timeouts
//! - static options ([`StaticOption`]): scheme, host, headers and the Envoy
//!   retry policy of one endpoint, fixed when the client is built
//! - runtime options ([`RuntimeOption`]): method, path, query, body and the
//!   response destination of a single call
//!
//! Retries are never performed locally. An [`EnvoyRetryPolicy`] is encoded as
//! `x-envoy-*` request headers for the upstream proxy to act on.

mod client;
mod config;
mod error;
mod options;
mod response;
mod transport;
mod url_builder;
mod validate;

pub mod retry;
pub mod strings;

pub use client::HttpClient;
pub use config::{
    Backend, ClientConfig, Config, ConfigOptions, RuntimeRequestConfig, StaticRequestConfig,
    TIMEOUT_MS_ENV, URL_ENV,
};
pub use error::HttpClientError;
pub use options::{fold, Apply, ClientOption, RuntimeOption, StaticOption};
pub use response::ResponseTarget;
pub use retry::{EnvoyRetryPolicy, RetryOn};
pub use transport::{defaults, TransportConfig};
pub use validate::MAX_VALID_CONNECT_PORT;

pub use reqwest::Method;

pub type Result<T> = std::result::Result<T, HttpClientError>;
