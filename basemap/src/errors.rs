use std::borrow::Cow;

use thiserror::Error;

/// Failure to turn a raw payload into a decoded tree.
///
/// Every decode entry point returns this instead of panicking, so callers that
/// process several payloads (the diff engine, batch syncs) can keep going and
/// report which side failed.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The container or blob was not valid base64.
    #[error("base64 decode failed: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Gzip decompression failed (truncated or not gzip at all).
    #[error("gzip decompression failed: {0}")]
    Gzip(#[source] std::io::Error),

    /// The decompressed bytes were not UTF-8 text.
    #[error("decompressed payload is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// The (protected) text did not parse as JSON.
    #[error("json parse failed: {0}")]
    Json(#[from] serde_json::Error),

    /// A required blob was absent from the container.
    #[error("payload has no {0} blob")]
    MissingBlob(&'static str),

    /// The JSON parsed but did not have the expected top-level shape.
    #[error("unexpected payload shape: {message}")]
    Shape { message: Cow<'static, str> },
}

impl DecodeError {
    pub fn shape(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Shape {
            message: message.into(),
        }
    }
}

/// Errors raised by the version store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store i/o error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("stored version {path} is unreadable: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// Project ids become directory names, so they are restricted.
    #[error("invalid project id '{0}'")]
    InvalidProject(String),
}

impl StoreError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }

    pub(crate) fn json(path: &std::path::Path, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.display().to_string(),
            source,
        }
    }
}

pub type DecodeResult<T> = Result<T, DecodeError>;
