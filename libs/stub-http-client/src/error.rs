use thiserror::Error;

/// Boxed error type carried by transport and TLS failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Classification of URL validation failures.
///
/// Provides programmatic matching for different failure modes without
/// relying on unstable error message strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvalidUriKind {
    /// URL could not be parsed (malformed syntax)
    ParseError,
    /// URL is missing required host/authority component
    MissingAuthority,
    /// URL cannot serve as a base for relative paths (e.g. `mailto:`)
    NotABase,
}

/// Coarse error taxonomy used by callers to decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or missing configuration; raised at client construction.
    Configuration,
    /// Transport, pool or TLS setup failure; raised at client construction.
    Construction,
    /// Transport failure, timeout or non-success status while calling.
    Request,
    /// Body was received but could not be converted to the requested type.
    Decode,
}

/// HTTP client error types
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpError {
    /// A configuration field holds an unusable value
    #[error("Invalid configuration for '{field}': {reason}")]
    InvalidConfig {
        /// Name of the offending field, as written in config files
        field: &'static str,
        /// Human readable explanation
        reason: String,
    },

    /// Invalid URL (failed to parse)
    ///
    /// Use the `kind` field for programmatic matching. The `reason` field is
    /// a diagnostic message intended for logging only.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUri {
        /// The URL that failed to parse
        url: String,
        /// Structured failure classification for programmatic matching
        kind: InvalidUriKind,
        /// Diagnostic message (unstable format, for logging only)
        reason: String,
    },

    /// Only `http` and `https` base URLs are supported
    #[error("URL scheme '{scheme}' not allowed: only http:// and https:// are supported")]
    InvalidScheme {
        /// The URL scheme that was rejected
        scheme: String,
    },

    /// TLS setup error
    #[error("TLS error: {0}")]
    Tls(#[source] BoxError),

    /// Client could not be assembled (no runtime, etc)
    #[error("Failed to construct client: {0}")]
    Construction(String),

    /// Request building failed
    #[error("Failed to build request: {0}")]
    RequestBuild(#[from] http::Error),

    /// Invalid header name
    #[error("Invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    /// Invalid header value
    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    /// Request body could not be serialized
    #[error("Failed to serialize request body: {0}")]
    Serialize(#[source] serde_json::Error),

    /// Connect, read or write timeout elapsed
    #[error("Request timed out: {0}")]
    Timeout(#[source] BoxError),

    /// Transport error (network, connection, etc)
    #[error("Transport error: {0}")]
    Transport(#[source] BoxError),

    /// Response body exceeded size limit
    #[error("Response body too large: limit {limit} bytes, got {actual} bytes")]
    BodyTooLarge { limit: usize, actual: usize },

    /// HTTP non-2xx status
    #[error("HTTP {status}: {body_preview}")]
    HttpStatus {
        status: http::StatusCode,
        body_preview: String,
        content_type: Option<String>,
    },

    /// Response body could not be decoded into the requested type
    #[error("Failed to decode response body: {source}")]
    Decode {
        #[source]
        source: serde_json::Error,
        body_preview: String,
    },

    /// Internal service failure (buffer worker died, channel closed)
    #[error("Service unavailable: internal failure")]
    ServiceClosed,
}

impl HttpError {
    /// Map the error onto the caller-facing taxonomy.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidConfig { .. } | Self::InvalidUri { .. } | Self::InvalidScheme { .. } => {
                ErrorKind::Configuration
            }
            Self::Tls(_) | Self::Construction(_) => ErrorKind::Construction,
            Self::Decode { .. } => ErrorKind::Decode,
            Self::RequestBuild(_)
            | Self::InvalidHeaderName(_)
            | Self::InvalidHeaderValue(_)
            | Self::Serialize(_)
            | Self::Timeout(_)
            | Self::Transport(_)
            | Self::BodyTooLarge { .. }
            | Self::HttpStatus { .. }
            | Self::ServiceClosed => ErrorKind::Request,
        }
    }

    /// Returns the HTTP status for `HttpStatus` errors.
    #[must_use]
    pub fn status(&self) -> Option<http::StatusCode> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Wrap a transport-layer failure, promoting it to `Timeout` when any
    /// error in the source chain is an I/O `TimedOut`.
    pub(crate) fn from_transport(err: BoxError) -> Self {
        if is_timeout(err.as_ref()) {
            Self::Timeout(err)
        } else {
            Self::Transport(err)
        }
    }
}

fn is_timeout(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<std::io::Error>()
            && io.kind() == std::io::ErrorKind::TimedOut
        {
            return true;
        }
        current = e.source();
    }
    false
}

impl From<hyper::Error> for HttpError {
    fn from(err: hyper::Error) -> Self {
        HttpError::from_transport(Box::new(err))
    }
}

impl From<hyper_util::client::legacy::Error> for HttpError {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        HttpError::from_transport(Box::new(err))
    }
}
