//! Error types for message construction.

/// Result type alias for message construction.
pub type Result<T> = std::result::Result<T, Error>;

/// Message construction errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Header name or value would break the header block.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// Address cannot be placed in a header.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// The multipart boundary is unusable.
    #[error("Invalid boundary: {0}")]
    InvalidBoundary(String),
}
