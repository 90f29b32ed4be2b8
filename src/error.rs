use std::io;
use thiserror::Error;

/// Boxed error produced by an inner response body.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Invalid middleware configuration, reported when the layer is built.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An exclude-path pattern is not a valid regular expression.
    #[error("invalid exclude path pattern: {source}")]
    InvalidExcludePath {
        /// The underlying regex error.
        #[from]
        source: regex::Error,
    },
}

/// Errors that abort a response while it is being compressed.
#[derive(Debug, Error)]
pub enum Error {
    /// A body message arrived before the response head.
    #[error("response body arrived before the response head")]
    MissingHead,

    /// The response head was sent more than once.
    #[error("response head received more than once")]
    DuplicateHead,

    /// A chunk arrived for a stream whose encoder was already finished.
    #[error("encoder used after the stream finished")]
    EncoderFinished,

    /// The encoder failed; the compressed stream cannot be recovered.
    #[error("compression failed: {source}")]
    Codec {
        /// The underlying codec error.
        #[from]
        source: io::Error,
    },

    /// The wrapped response body failed.
    #[error("inner body error: {source}")]
    Body {
        /// The error reported by the inner body.
        source: BoxError,
    },
}

impl Error {
    pub(crate) fn body<E: Into<BoxError>>(e: E) -> Self {
        Self::Body { source: e.into() }
    }
}
