use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use reqwest::{header::HeaderMap, Method};

use crate::{
    options::{fold, ClientOption, RuntimeOption, StaticOption},
    transport::{defaults, TransportConfig},
    HttpClientError, ResponseTarget, Result,
};

/// Environment variable holding the endpoint URL read by [`ConfigOptions::from_env`].
pub const URL_ENV: &str = "HTTPCLIENT_URL";
/// Environment variable holding the optional call timeout in milliseconds.
pub const TIMEOUT_MS_ENV: &str = "HTTPCLIENT_TIMEOUT_MS";

/// Where requests are executed. Exactly one backend is active.
#[derive(Clone, Debug, Default)]
pub enum Backend {
    /// A pooled client built from [`TransportConfig::default`].
    #[default]
    Default,
    /// A pooled client built from custom transport settings.
    Transport(TransportConfig),
    /// A caller-built client, used as is.
    Client(reqwest::Client),
}

/// Connection-level configuration.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub backend: Backend,
    /// Overall call timeout. Ignored for [`Backend::Client`], zero disables it.
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Default,
            timeout: defaults::CALL_TIMEOUT,
        }
    }
}

impl ClientConfig {
    pub(crate) fn build_client(&self) -> Result<reqwest::Client> {
        match &self.backend {
            Backend::Default => TransportConfig::default().build_client(self.timeout),
            Backend::Transport(transport) => transport.build_client(self.timeout),
            Backend::Client(client) => Ok(client.clone()),
        }
    }
}

/// Per-endpoint configuration fixed when the client is built.
#[derive(Clone, Default)]
pub struct StaticRequestConfig {
    pub scheme: String,
    pub user: Option<String>,
    pub password: Option<String>,
    /// `host:port`, the port is always explicit.
    pub host: String,
    pub headers: HeaderMap,
}

impl fmt::Debug for StaticRequestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticRequestConfig")
            .field("scheme", &self.scheme)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("host", &self.host)
            .field("headers", &self.headers)
            .finish()
    }
}

/// Per-call configuration.
///
/// The client keeps a baseline copy that seeds every call; call options are
/// folded onto a fresh copy of it.
#[derive(Debug)]
pub struct RuntimeRequestConfig<'a> {
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
    pub response: Option<ResponseTarget<'a>>,
    pub method: Method,
    pub path: String,
    /// Query parameters, encoded in key order.
    pub query: BTreeMap<String, String>,
    /// Per-call deadline on top of the client timeout.
    pub timeout: Option<Duration>,
}

impl Default for RuntimeRequestConfig<'_> {
    fn default() -> Self {
        Self {
            headers: HeaderMap::new(),
            body: None,
            response: None,
            method: Method::GET,
            path: String::new(),
            query: BTreeMap::new(),
            timeout: None,
        }
    }
}

impl RuntimeRequestConfig<'_> {
    /// Copies everything except the response target, which belongs to a single call.
    pub(crate) fn fork<'b>(&self) -> RuntimeRequestConfig<'b> {
        RuntimeRequestConfig {
            headers: self.headers.clone(),
            body: self.body.clone(),
            response: None,
            method: self.method.clone(),
            path: self.path.clone(),
            query: self.query.clone(),
            timeout: self.timeout,
        }
    }
}

/// All three configuration tiers, as produced by [`Config::from_options`].
#[derive(Debug, Default)]
pub struct Config {
    pub client: ClientConfig,
    pub static_request: StaticRequestConfig,
    pub runtime: RuntimeRequestConfig<'static>,
}

impl Config {
    /// Applies client, static and runtime options in that order, each tier
    /// starting from its default. The first failing option aborts.
    pub fn from_options(options: ConfigOptions) -> Result<Self> {
        Ok(Self {
            client: fold(ClientConfig::default(), options.client)?,
            static_request: fold(StaticRequestConfig::default(), options.static_request)?,
            runtime: fold(RuntimeRequestConfig::default(), options.runtime)?,
        })
    }
}

/// Options for each tier, applied left to right.
#[derive(Debug, Default)]
pub struct ConfigOptions {
    pub client: Vec<ClientOption>,
    pub static_request: Vec<StaticOption>,
    pub runtime: Vec<RuntimeOption<'static>>,
}

impl ConfigOptions {
    /// Reads the endpoint from the environment.
    ///
    /// Reads:
    /// - `HTTPCLIENT_URL` — base URL such as `https://api.internal:8443`
    /// - `HTTPCLIENT_TIMEOUT_MS` — optional call timeout in milliseconds
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let url = lookup(URL_ENV)
            .ok_or_else(|| HttpClientError::Validation(format!("missing {URL_ENV} environment variable")))?;
        if url.trim().is_empty() {
            return Err(HttpClientError::Validation(format!("{URL_ENV} is set but empty")));
        }

        let mut options = Self {
            static_request: vec![StaticOption::Url(url.trim().to_owned())],
            ..Self::default()
        };
        if let Some(raw) = lookup(TIMEOUT_MS_ENV) {
            let millis = raw.trim().parse::<u64>().map_err(|err| {
                HttpClientError::Validation(format!("{TIMEOUT_MS_ENV} '{raw}' is not a number: {err}"))
            })?;
            options
                .client
                .push(ClientOption::Timeout(Duration::from_millis(millis)));
        }
        Ok(options)
    }
}
