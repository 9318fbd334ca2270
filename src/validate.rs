use std::net::Ipv6Addr;

use reqwest::header::{HeaderName, HeaderValue};

use crate::{HttpClientError, Result};

/// Highest port accepted by [`validate_host_port`], the top of the registered range.
pub const MAX_VALID_CONNECT_PORT: u32 = 49_152;

pub(crate) fn validate_scheme(scheme: &str) -> Result<()> {
    if scheme.is_empty() {
        return Err(HttpClientError::Validation("scheme is empty".to_owned()));
    }
    if scheme != "http" && scheme != "https" {
        return Err(HttpClientError::Validation(format!(
            "scheme '{scheme}' is not http or https"
        )));
    }
    Ok(())
}

/// Validates a `host:port` pair and returns the port. The port is mandatory
/// and never defaulted.
///
/// A host is either a bracketed IPv6 address or a name made of ASCII letters,
/// digits, `-`, `.` and `_`. Anything else could be read as URL syntax.
pub(crate) fn validate_host_port(host_port: &str) -> Result<u16> {
    let (host, port) = split_host_port(host_port)?;
    if host.is_empty() {
        return Err(HttpClientError::Validation("host is empty".to_owned()));
    }
    if host_port.starts_with('[') {
        host.parse::<Ipv6Addr>().map_err(|err| {
            HttpClientError::Validation(format!("'{host}' is not an IPv6 address: {err}"))
        })?;
    } else if let Some(bad) = host
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_')))
    {
        return Err(HttpClientError::Validation(format!(
            "host '{host}' contains invalid character '{bad}'"
        )));
    }
    validate_port(port)
}

fn split_host_port(host_port: &str) -> Result<(&str, &str)> {
    let invalid = |reason: &str| {
        HttpClientError::Validation(format!(
            "'{host_port}' is not a valid host:port: {reason}"
        ))
    };

    if let Some(rest) = host_port.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| invalid("missing ']' in address"))?;
        let port = tail
            .strip_prefix(':')
            .ok_or_else(|| invalid("missing port in address"))?;
        return Ok((host, port));
    }

    let (host, port) = host_port
        .rsplit_once(':')
        .ok_or_else(|| invalid("missing port in address"))?;
    if host.contains(':') {
        return Err(invalid("too many colons in address"));
    }
    Ok((host, port))
}

fn validate_port(port: &str) -> Result<u16> {
    let parsed = if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) {
        port.parse::<u16>().ok()
    } else {
        None
    };
    let port = parsed.ok_or_else(|| {
        HttpClientError::Validation(format!("port '{port}' is not a valid unsigned integer"))
    })?;
    if port == 0 || u32::from(port) > MAX_VALID_CONNECT_PORT {
        return Err(HttpClientError::Validation(format!(
            "port {port} is not in range 1-{MAX_VALID_CONNECT_PORT}"
        )));
    }
    Ok(port)
}

/// Validates and converts one header pair. Empty keys and values are rejected.
pub(crate) fn header_pair(key: &str, value: &str) -> Result<(HeaderName, HeaderValue)> {
    if key.is_empty() || value.is_empty() {
        return Err(HttpClientError::Validation(
            "header key or value is empty".to_owned(),
        ));
    }
    header_entry(key, value)
}

/// Converts one header pair without the emptiness check; the name must still
/// be a valid header name. Values are marked sensitive so they never show up
/// in `Debug` output.
pub(crate) fn header_entry(key: &str, value: &str) -> Result<(HeaderName, HeaderValue)> {
    let name = HeaderName::from_bytes(key.as_bytes()).map_err(|err| {
        HttpClientError::Validation(format!("invalid header name '{key}': {err}"))
    })?;
    let mut value = HeaderValue::from_str(value).map_err(|err| {
        HttpClientError::Validation(format!("invalid value for header '{key}': {err}"))
    })?;
    value.set_sensitive(true);
    Ok((name, value))
}

pub(crate) fn validate_host_header(host: &str) -> Result<HeaderValue> {
    if host.is_empty() {
        return Err(HttpClientError::Validation("host header is empty".to_owned()));
    }
    HeaderValue::from_str(host)
        .map_err(|err| HttpClientError::Validation(format!("invalid host header: {err}")))
}

pub(crate) fn validate_query_param(key: &str, value: &str) -> Result<()> {
    if key.is_empty() || value.is_empty() {
        return Err(HttpClientError::Validation(
            "query key or value is empty".to_owned(),
        ));
    }
    Ok(())
}
