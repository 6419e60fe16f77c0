use thiserror::Error;

/// Errors reported by index construction, data sources, and search.
#[derive(Debug, Error)]
pub enum KnnError {
    /// A configuration or call argument is out of range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The query batch is empty.
    #[error("query batch is empty")]
    EmptyQuery,

    /// A query batch does not divide into vectors of the index dimension.
    #[error("query batch of {values} values does not divide into vectors of dimension {dim}")]
    DimensionMismatch { values: usize, dim: usize },

    /// The search worker pool could not be created.
    #[error("thread pool: {0}")]
    ThreadPool(String),

    /// I/O error while opening or reading a point source.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for index operations.
pub type Result<T> = std::result::Result<T, KnnError>;
