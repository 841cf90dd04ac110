//! Error types for gz-splice

use std::io;

/// Result type for gz-splice operations
pub type Result<T> = std::result::Result<T, GzSpliceError>;

/// Error types that can occur while building a spliced gzip stream
#[derive(Debug)]
pub enum GzSpliceError {
    /// Constructor saw a compression level outside `[HuffmanOnly, BestCompression]`
    InvalidLevel(i32),
    /// A spliced blob failed header/trailer validation
    InvalidBlob(&'static str),
    /// A header name/comment contained a codepoint outside `(0, 0xFF]`
    NonLatin1Header,
    /// The extra field exceeded the 65535-byte length prefix
    HeaderExtraTooLarge,
    /// A header-field setter was called after the header had already been written
    HeaderAlreadyWritten,
    /// I/O error from the destination sink
    Io(io::Error),
}

impl std::fmt::Display for GzSpliceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GzSpliceError::InvalidLevel(level) => {
                write!(f, "invalid compression level: {}", level)
            }
            GzSpliceError::InvalidBlob(reason) => write!(f, "invalid gzip blob: {}", reason),
            GzSpliceError::NonLatin1Header => {
                write!(f, "header name/comment contains a non-Latin-1 codepoint")
            }
            GzSpliceError::HeaderExtraTooLarge => {
                write!(f, "extra field exceeds 65535 bytes")
            }
            GzSpliceError::HeaderAlreadyWritten => {
                write!(f, "header field set after the header was already written")
            }
            GzSpliceError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for GzSpliceError {}

impl From<io::Error> for GzSpliceError {
    fn from(err: io::Error) -> Self {
        GzSpliceError::Io(err)
    }
}

impl GzSpliceError {
    /// Builds an equivalent copy of this error for replay through the latch.
    ///
    /// `io::Error` is not `Clone`, so a latched I/O error is replayed as a
    /// same-kind error carrying the original's message rather than the
    /// original value itself.
    pub(crate) fn latch_copy(&self) -> GzSpliceError {
        match self {
            GzSpliceError::InvalidLevel(l) => GzSpliceError::InvalidLevel(*l),
            GzSpliceError::InvalidBlob(r) => GzSpliceError::InvalidBlob(r),
            GzSpliceError::NonLatin1Header => GzSpliceError::NonLatin1Header,
            GzSpliceError::HeaderExtraTooLarge => GzSpliceError::HeaderExtraTooLarge,
            GzSpliceError::HeaderAlreadyWritten => GzSpliceError::HeaderAlreadyWritten,
            GzSpliceError::Io(e) => GzSpliceError::Io(io::Error::new(e.kind(), e.to_string())),
        }
    }
}
