//! Error type for APDU handling
//!
//! All failures while decoding commands, hex strings or AIDs are reported
//! through the single [`Error`] type so callers can bubble them up unchanged.

/// Errors raised while decoding APDU data
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    /// The command does not fit the ISO 7816-4 short APDU layout
    #[error("Invalid command length: {0}")]
    InvalidCommandLength(usize),

    /// The text is not valid hexadecimal
    #[error("Invalid hex string {input:?}: {reason}")]
    InvalidHex {
        /// Text that failed to decode
        input: String,
        /// Why decoding failed
        reason: &'static str,
    },

    /// The text is not a valid application identifier
    #[error("Invalid AID {0:?}: expected 10-32 hex characters of even length")]
    InvalidAid(String),

    /// A response needs at least the two status bytes
    #[error("Response too short: {0} bytes")]
    ResponseTooShort(usize),

    /// Context error with message and source error
    #[error("{context}: {source}")]
    Context {
        /// Contextual message
        context: String,
        /// Source error
        source: Box<Self>,
    },
}

impl Error {
    /// Create a new error with context information
    pub fn with_context<S: Into<String>>(self, context: S) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create a new hex decoding error
    pub fn invalid_hex<S: Into<String>>(input: S, reason: &'static str) -> Self {
        Self::InvalidHex {
            input: input.into(),
            reason,
        }
    }
}

/// Extension trait for Result with APDU Errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context<S: Into<String>>(self, context: S) -> Result<T, Error>;
}

impl<T> ResultExt<T> for Result<T, Error> {
    fn context<S: Into<String>>(self, context: S) -> Self {
        self.map_err(|e| e.with_context(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_wraps_source() {
        let err: Result<(), Error> = Err(Error::InvalidAid("A0".into()));
        let err = err.context("registering AID").unwrap_err();
        assert_eq!(
            err.to_string(),
            "registering AID: Invalid AID \"A0\": expected 10-32 hex characters of even length"
        );
    }
}
