use thiserror::Error;

/// Error type for all index operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad caller input: empty document text, a query that is not exactly
    /// one non-stopword word, a duplicate document id.
    #[error("invalid input: {0}")]
    Validation(String),

    /// A posting key field out of range, or an id space exhausted.
    #[error("out of range: {0}")]
    Range(String),

    /// Transaction misuse: a second concurrent write transaction, or an
    /// operation that needs a transaction when none is open.
    #[error("invalid state: {0}")]
    State(String),

    /// Underlying store failure.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// A stored key or value that no longer decodes.
    #[error("corrupt index data: {0}")]
    Corrupt(String),
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Corrupt(err.to_string())
    }
}

/// Result type for all index operations.
pub type Result<T> = std::result::Result<T, Error>;
