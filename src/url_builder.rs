use reqwest::Url;

use crate::{
    config::{RuntimeRequestConfig, StaticRequestConfig},
    validate::validate_host_port,
    HttpClientError, Result,
};

/// Builds `scheme://[user[:password]@]host:port/path?query`.
///
/// The password is only used together with a user. Query parameters are
/// form-urlencoded in key order.
pub(crate) fn build_url(
    static_config: &StaticRequestConfig,
    runtime: &RuntimeRequestConfig<'_>,
) -> Result<Url> {
    if static_config.scheme.is_empty() {
        return Err(HttpClientError::Validation("scheme is not set".to_owned()));
    }
    if static_config.host.is_empty() {
        return Err(HttpClientError::Validation("host is not set".to_owned()));
    }

    let port = validate_host_port(&static_config.host)?;
    let base = format!("{}://{}", static_config.scheme, static_config.host);
    let mut url = Url::parse(&base)
        .map_err(|err| HttpClientError::Validation(format!("invalid url '{base}': {err}")))?;
    // The parsed URL must hold nothing but the validated authority.
    if url.port_or_known_default() != Some(port)
        || !url.username().is_empty()
        || url.password().is_some()
        || url.path() != "/"
        || url.query().is_some()
        || url.fragment().is_some()
    {
        return Err(HttpClientError::Validation(format!(
            "'{}' does not form a plain authority",
            static_config.host
        )));
    }

    if let Some(user) = static_config.user.as_deref().filter(|user| !user.is_empty()) {
        url.set_username(user)
            .map_err(|()| HttpClientError::Validation("url cannot carry a user".to_owned()))?;
        if let Some(password) = static_config.password.as_deref() {
            url.set_password(Some(password)).map_err(|()| {
                HttpClientError::Validation("url cannot carry a password".to_owned())
            })?;
        }
    }

    if !runtime.path.is_empty() {
        url.set_path(&runtime.path);
    }
    if !runtime.query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in &runtime.query {
            pairs.append_pair(key, value);
        }
    }
    Ok(url)
}
