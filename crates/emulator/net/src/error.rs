//! Error type for the network services

use std::time::Duration;

/// Result alias for network operations
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised by the network services
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Socket I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP exchange with the controller failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Controller address could not be turned into a URL
    #[error("Invalid controller address: {0}")]
    Url(#[from] url::ParseError),

    /// An operation did not finish in time
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// The request head is not valid HTTP
    #[error("Malformed request: {0}")]
    MalformedRequest(&'static str),

    /// The request head exceeds the allowed size
    #[error("Request head larger than {limit} bytes")]
    HeadTooLarge {
        /// Allowed size
        limit: usize,
    },

    /// `Content-Length` exceeds the allowed body size
    #[error("Body of {length} bytes exceeds limit of {limit}")]
    BodyTooLarge {
        /// Announced length
        length: usize,
        /// Allowed size
        limit: usize,
    },

    /// The peer closed the connection before the request was complete
    #[error("Connection closed before the request was complete")]
    UnexpectedEof,

    /// Error with additional context
    #[error("{context}: {source}")]
    Context {
        /// Context message
        context: String,
        /// Underlying error
        #[source]
        source: Box<Self>,
    },
}

impl Error {
    /// Add context to an error
    pub fn with_context<S: Into<String>>(self, context: S) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Extension for adding context to results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context<S: Into<String>>(self, context: S) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context<S: Into<String>>(self, context: S) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }
}
