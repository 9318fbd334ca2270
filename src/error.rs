/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum HttpClientError {
    /// Two mutually exclusive settings were both supplied.
    #[error("configuration conflict: {0}")]
    Conflict(String),
    /// A scheme, host, port, header, query parameter or retry policy was rejected.
    #[error("invalid configuration: {0}")]
    Validation(String),
    /// The underlying `reqwest` client could not be built.
    #[error("client build error: {0}")]
    Build(reqwest::Error),
    /// Network or request execution error from `reqwest`.
    #[error("transport error: {0}")]
    Transport(reqwest::Error),
    /// Any status other than `200 OK`, with the raw response body.
    #[error("http error {status}: {body}")]
    Status { status: u16, body: String },
    /// Request body serialization error.
    #[error("encode error: {0}")]
    Encode(String),
    /// Response body could not be decoded into the JSON destination.
    #[error("decode error: {0}")]
    Decode(String),
    /// Neither a JSON destination nor a raw body sink was supplied for the call.
    #[error("no response destination given")]
    NoResponseTarget,
    /// Writing the response body into the raw sink failed.
    #[error("response sink error: {0}")]
    Sink(std::io::Error),
}
