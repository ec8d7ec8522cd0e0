use std::{fmt, path::PathBuf};

/// An error that occurred while obtaining an identity or credentials.
///
/// The variants follow where in the flow the failure happened. None of them are retried
/// internally; retrying an authentication attempt is up to the caller.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The configuration is invalid (bad URL, missing field, conflicting options).
    #[error("invalid configuration: {0}")]
    Config(String),

    /// An HTTP request to the identity provider could not be completed.
    #[error("{stage} error: {source}")]
    Transport {
        /// The step of the flow that failed.
        stage: &'static str,
        /// The underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// The identity provider answered with an HTTP status that the step does not accept.
    #[error("{stage} error: http status {status}")]
    Status {
        /// The step of the flow that failed.
        stage: &'static str,
        /// The status that was returned.
        status: reqwest::StatusCode,
    },

    /// The identity provider answered with something other than what the protocol expects.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The AWS STS API returned an error.
    ///
    /// This could be due to invalid configuration caught by the server, or a network issue. The
    /// error message should be sufficient to aid end-user debugging.
    #[error("API error when obtaining credentials: {0}")]
    Api(String),

    /// Interactive input of a username, password or MFA code failed.
    #[error("input error: {0}")]
    Input(#[from] InputError),

    /// The client does not support the requested operation.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    /// The operation was cancelled between round trips.
    #[error("operation cancelled")]
    Cancelled,

    /// A local file (a token file or a cache file) could not be read or removed.
    #[error("failed to access {}: {source}", path.display())]
    Io {
        /// The file in question.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn transport(stage: &'static str) -> impl FnOnce(reqwest::Error) -> Self {
        move |source| Self::Transport { stage, source }
    }
}

/// An error raised by an interactive input provider.
///
/// Errors are propagated verbatim; no fallback values are invented.
pub struct InputError(Box<dyn std::error::Error + Send + Sync + 'static>);

impl InputError {
    /// Wrap any error raised while reading input.
    pub fn new(error: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>) -> Self {
        Self(error.into())
    }
}

impl fmt::Debug for InputError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for InputError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl From<std::io::Error> for InputError {
    fn from(error: std::io::Error) -> Self {
        Self::new(error)
    }
}
