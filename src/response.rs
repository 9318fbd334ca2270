use std::fmt;
use std::io::Write;

use serde::de::DeserializeOwned;

use crate::{HttpClientError, Result};

type JsonDecoder<'a> = Box<dyn FnOnce(&[u8]) -> serde_json::Result<()> + Send + Sync + 'a>;

/// Where a successful response body is delivered.
///
/// A call has exactly one target: either a value decoded from JSON or a raw
/// byte sink.
pub enum ResponseTarget<'a> {
    /// Decodes the body as JSON into a caller-owned value.
    Json(JsonDecoder<'a>),
    /// Copies the body verbatim into a writer.
    Body(&'a mut (dyn Write + Send + Sync)),
}

impl<'a> ResponseTarget<'a> {
    /// Decodes the response body into `destination`.
    pub fn json<T>(destination: &'a mut T) -> Self
    where
        T: DeserializeOwned + Send + Sync,
    {
        Self::Json(Box::new(move |body: &[u8]| {
            *destination = serde_json::from_slice(body)?;
            Ok(())
        }))
    }

    /// Writes the raw response body into `sink`.
    pub fn body<W>(sink: &'a mut W) -> Self
    where
        W: Write + Send + Sync,
    {
        Self::Body(sink)
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::Json(_) => "response json",
            Self::Body(_) => "response body",
        }
    }

    pub(crate) fn deliver(self, body: &[u8]) -> Result<()> {
        match self {
            Self::Json(decode) => decode(body).map_err(|err| {
                HttpClientError::Decode(format!(
                    "invalid response JSON: {err}; body: {}",
                    String::from_utf8_lossy(body)
                ))
            }),
            Self::Body(sink) => {
                sink.write_all(body).map_err(HttpClientError::Sink)?;
                sink.flush().map_err(HttpClientError::Sink)
            }
        }
    }
}

impl fmt::Debug for ResponseTarget<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json(_) => "ResponseTarget::Json",
            Self::Body(_) => "ResponseTarget::Body",
        })
    }
}
