use std::fmt;
use std::sync::Arc;

use reqwest::StatusCode;

#[cfg(feature = "tracing")]
use crate::config::Backend;
use crate::{
    config::{Config, ConfigOptions, RuntimeRequestConfig, StaticRequestConfig},
    options::{fold, RuntimeOption},
    url_builder::build_url,
    HttpClientError, Result,
};

/// HTTP client bound to one endpoint.
///
/// Built once from client and static options; every [`HttpClient::send`]
/// starts from the baseline runtime configuration captured at construction
/// and layers the call's own options on a fresh copy of it. The client is
/// cheap to clone and can be shared between tasks.
#[derive(Clone)]
pub struct HttpClient {
    http: reqwest::Client,
    static_config: StaticRequestConfig,
    runtime: Arc<RuntimeRequestConfig<'static>>,
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("static_config", &self.static_config)
            .field("runtime", &self.runtime)
            .finish()
    }
}

impl HttpClient {
    /// Applies `options` and builds the client.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use layered_http_client::{ConfigOptions, HttpClient, StaticOption};
    ///
    /// let client = HttpClient::new(ConfigOptions {
    ///     static_request: vec![
    ///         StaticOption::Url("http://localhost:8080".to_owned()),
    ///         StaticOption::default_retry_policy(),
    ///     ],
    ///     ..ConfigOptions::default()
    /// })
    /// .expect("valid configuration");
    /// ```
    pub fn new(options: ConfigOptions) -> Result<Self> {
        Self::from_config(Config::from_options(options)?)
    }

    /// Builds the client from an already folded [`Config`].
    ///
    /// Response targets are per call; a baseline carrying one is rejected.
    pub fn from_config(config: Config) -> Result<Self> {
        if config.runtime.response.is_some() {
            return Err(HttpClientError::Conflict(
                "response destination must be given per call, not in the baseline".to_owned(),
            ));
        }

        let http = config.client.build_client()?;

        #[cfg(feature = "tracing")]
        {
            let backend = match &config.client.backend {
                Backend::Default => "default",
                Backend::Transport(_) => "transport",
                Backend::Client(_) => "client",
            };
            tracing::debug!(backend, host = %config.static_request.host, "built http client");
        }

        Ok(Self {
            http,
            static_config: config.static_request,
            runtime: Arc::new(config.runtime),
        })
    }

    /// Sends one request and delivers a `200` body to the call's response target.
    ///
    /// `options` are folded onto a copy of the baseline runtime configuration.
    /// Exactly one response target must be among the merged options. Any other
    /// status than `200 OK` fails with [`HttpClientError::Status`]. Dropping
    /// the returned future cancels the request.
    pub async fn send<'a, I>(&self, options: I) -> Result<()>
    where
        I: IntoIterator<Item = RuntimeOption<'a>>,
    {
        let mut request = fold(self.runtime.fork(), options)?;
        let target = request
            .response
            .take()
            .ok_or(HttpClientError::NoResponseTarget)?;
        let url = build_url(&self.static_config, &request)?;
        let RuntimeRequestConfig {
            headers: runtime_headers,
            body,
            method,
            timeout,
            ..
        } = request;

        let mut headers = self.static_config.headers.clone();
        headers.extend(runtime_headers);

        #[cfg(feature = "tracing")]
        tracing::debug!(
            method = %method,
            host = url.host_str().unwrap_or_default(),
            path = url.path(),
            "sending request"
        );

        let mut builder = self.http.request(method, url).headers(headers);
        if let Some(body) = body {
            builder = builder.body(body);
        }
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(HttpClientError::Transport)?;
        let status = response.status();
        // Reading the whole body hands the connection back to the pool.
        let body = response.bytes().await.map_err(HttpClientError::Transport)?;

        if status != StatusCode::OK {
            #[cfg(feature = "tracing")]
            tracing::warn!(status = status.as_u16(), "request failed with non-200 status");

            return Err(HttpClientError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        target.deliver(&body)
    }
}
