//! Options for the three configuration tiers.
//!
//! Every option is a named transformation of its tier value. A list of
//! options is applied with [`fold`]: left to right, each option receiving the
//! value produced by the previous one, stopping at the first error. Options
//! take the tier value by ownership, so on failure the partially applied
//! value is dropped and only the error reaches the caller.

use std::time::Duration;

use reqwest::{
    header::{self, HeaderValue},
    Method, Url,
};
use serde::Serialize;

use crate::{
    config::{Backend, ClientConfig, RuntimeRequestConfig, StaticRequestConfig},
    retry::EnvoyRetryPolicy,
    transport::TransportConfig,
    validate::{
        header_entry, header_pair, validate_host_header, validate_host_port, validate_query_param,
        validate_scheme,
    },
    HttpClientError, ResponseTarget, Result,
};

/// A transformation of a configuration tier value.
pub trait Apply<C> {
    fn apply(self, config: C) -> Result<C>;
}

/// Applies `options` to `initial` in order, aborting on the first failure.
pub fn fold<C, I>(initial: C, options: I) -> Result<C>
where
    I: IntoIterator,
    I::Item: Apply<C>,
{
    options
        .into_iter()
        .try_fold(initial, |config, option| option.apply(config))
}

/// Connection-level option.
#[derive(Clone, Debug)]
pub enum ClientOption {
    /// Builds the client from custom transport settings.
    Transport(TransportConfig),
    /// Uses a prebuilt client. Cannot be combined with [`ClientOption::Transport`].
    Client(reqwest::Client),
    /// Overall call timeout for clients built by this crate.
    Timeout(Duration),
    /// Toggles TLS certificate verification on the configured transport.
    /// A transport must already be set.
    InsecureSkipVerify(bool),
}

impl Apply<ClientConfig> for ClientOption {
    fn apply(self, mut config: ClientConfig) -> Result<ClientConfig> {
        match self {
            Self::Transport(transport) => {
                if matches!(config.backend, Backend::Client(_)) {
                    return Err(HttpClientError::Conflict(
                        "cannot set both client and transport".to_owned(),
                    ));
                }
                config.backend = Backend::Transport(transport);
            }
            Self::Client(client) => {
                if matches!(config.backend, Backend::Transport(_)) {
                    return Err(HttpClientError::Conflict(
                        "cannot set both client and transport".to_owned(),
                    ));
                }
                config.backend = Backend::Client(client);
            }
            Self::Timeout(timeout) => config.timeout = timeout,
            Self::InsecureSkipVerify(skip) => match &mut config.backend {
                Backend::Transport(transport) => transport.insecure_skip_verify = skip,
                _ => {
                    return Err(HttpClientError::Validation(
                        "transport is not set".to_owned(),
                    ))
                }
            },
        }
        Ok(config)
    }
}

/// Per-endpoint option, applied once when the client is built.
#[derive(Clone, Debug)]
pub enum StaticOption {
    /// `http` or `https`.
    Scheme(String),
    /// `host:port` with a mandatory port in `1..=49152`.
    HostPort(String),
    /// Overrides the `Host` header sent on the wire.
    HostHeader(String),
    /// Sets every pair, replacing existing values of the same name. Empty
    /// values are allowed here, unlike [`Self::Header`].
    Headers(Vec<(String, String)>),
    Header(String, String),
    /// Userinfo placed in the URL.
    BasicAuth {
        user: String,
        password: Option<String>,
    },
    /// Shorthand for scheme, host:port and userinfo taken from a base URL.
    /// The URL must not carry a path, query or fragment.
    Url(String),
    /// Encodes the policy as Envoy retry headers.
    RetryPolicy(EnvoyRetryPolicy),
}

impl StaticOption {
    pub fn headers<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::Headers(
            pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }

    pub fn default_retry_policy() -> Self {
        Self::RetryPolicy(EnvoyRetryPolicy::standard())
    }
}

impl Apply<StaticRequestConfig> for StaticOption {
    fn apply(self, mut config: StaticRequestConfig) -> Result<StaticRequestConfig> {
        match self {
            Self::Scheme(scheme) => {
                validate_scheme(&scheme)?;
                config.scheme = scheme;
            }
            Self::HostPort(host_port) => {
                validate_host_port(&host_port)?;
                config.host = host_port;
            }
            Self::HostHeader(host) => {
                let value = validate_host_header(&host)?;
                config.headers.insert(header::HOST, value);
            }
            Self::Headers(pairs) => {
                let pairs = pairs
                    .iter()
                    .map(|(key, value)| header_entry(key, value))
                    .collect::<Result<Vec<_>>>()?;
                for (name, value) in pairs {
                    config.headers.insert(name, value);
                }
            }
            Self::Header(key, value) => {
                let (name, value) = header_pair(&key, &value)?;
                config.headers.insert(name, value);
            }
            Self::BasicAuth { user, password } => {
                if user.is_empty() {
                    return Err(HttpClientError::Validation("user is empty".to_owned()));
                }
                config.user = Some(user);
                config.password = password.filter(|password| !password.is_empty());
            }
            Self::Url(url) => return fold(config, url_options(&url)?),
            Self::RetryPolicy(policy) => config.headers.extend(policy.to_headers()?),
        }
        Ok(config)
    }
}

fn url_options(raw: &str) -> Result<Vec<StaticOption>> {
    let url = Url::parse(raw)
        .map_err(|err| HttpClientError::Validation(format!("invalid url '{raw}': {err}")))?;

    if !matches!(url.path(), "" | "/") {
        return Err(HttpClientError::Validation(format!(
            "url '{raw}' must not carry a path"
        )));
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(HttpClientError::Validation(format!(
            "url '{raw}' must not carry a query or fragment"
        )));
    }

    let mut options = vec![StaticOption::Scheme(url.scheme().to_owned())];
    if let Some(host) = url.host_str() {
        let port = url.port_or_known_default().ok_or_else(|| {
            HttpClientError::Validation(format!("url '{raw}' has no port"))
        })?;
        options.push(StaticOption::HostPort(format!("{host}:{port}")));
    }
    if !url.username().is_empty() {
        options.push(StaticOption::BasicAuth {
            user: url.username().to_owned(),
            password: url.password().map(str::to_owned),
        });
    }
    Ok(options)
}

/// Per-call option, also used for the baseline every call starts from.
#[derive(Debug)]
pub enum RuntimeOption<'a> {
    /// Sets every pair, replacing existing values of the same name. Empty
    /// values are allowed here, unlike [`Self::Header`].
    Headers(Vec<(String, String)>),
    Header(String, String),
    /// Serialized JSON body, also sets `Content-Type: application/json`.
    /// Build it with [`RuntimeOption::request_json`].
    JsonBody(Vec<u8>),
    /// Raw body bytes.
    Body(Vec<u8>),
    Method(Method),
    Path(String),
    QueryParam(String, String),
    /// Adds every pair as is, empty values included.
    QueryParams(Vec<(String, String)>),
    /// Where the response body goes. Only one target per call.
    Response(ResponseTarget<'a>),
    /// Deadline for this call, covering the request and the body read.
    Timeout(Duration),
}

impl<'a> RuntimeOption<'a> {
    /// Serializes `body` as the JSON request body.
    pub fn request_json<T: Serialize + ?Sized>(body: &T) -> Result<Self> {
        serde_json::to_vec(body)
            .map(Self::JsonBody)
            .map_err(|err| HttpClientError::Encode(format!("invalid request JSON: {err}")))
    }

    /// Decodes a `200` response body into `destination`.
    pub fn response_json<T>(destination: &'a mut T) -> Self
    where
        T: serde::de::DeserializeOwned + Send + Sync,
    {
        Self::Response(ResponseTarget::json(destination))
    }

    /// Copies a `200` response body into `sink`.
    pub fn response_body<W>(sink: &'a mut W) -> Self
    where
        W: std::io::Write + Send + Sync,
    {
        Self::Response(ResponseTarget::body(sink))
    }

    pub fn headers<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::Headers(
            pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }

    pub fn query_params<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::QueryParams(
            pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

impl<'a> Apply<RuntimeRequestConfig<'a>> for RuntimeOption<'a> {
    fn apply(self, mut config: RuntimeRequestConfig<'a>) -> Result<RuntimeRequestConfig<'a>> {
        match self {
            Self::Headers(pairs) => {
                let pairs = pairs
                    .iter()
                    .map(|(key, value)| header_entry(key, value))
                    .collect::<Result<Vec<_>>>()?;
                for (name, value) in pairs {
                    config.headers.insert(name, value);
                }
            }
            Self::Header(key, value) => {
                let (name, value) = header_pair(&key, &value)?;
                config.headers.insert(name, value);
            }
            Self::JsonBody(body) => {
                config.body = Some(body);
                config.headers.insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json"),
                );
            }
            Self::Body(body) => config.body = Some(body),
            Self::Method(method) => config.method = method,
            Self::Path(path) => config.path = path,
            Self::QueryParam(key, value) => {
                validate_query_param(&key, &value)?;
                config.query.insert(key, value);
            }
            Self::QueryParams(pairs) => config.query.extend(pairs),
            Self::Response(target) => {
                if let Some(existing) = &config.response {
                    return Err(HttpClientError::Conflict(format!(
                        "cannot set both {} and {}",
                        existing.kind(),
                        target.kind()
                    )));
                }
                config.response = Some(target);
            }
            Self::Timeout(timeout) => config.timeout = Some(timeout),
        }
        Ok(config)
    }
}
