use thiserror::Error;

/// Boxed error raised by a database client implementation.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Unified error type for Tundra crates.
#[derive(Debug, Error)]
pub enum Error {
    /// An operator/value pair has no rendering in the query dialect.
    #[error("Query compilation error: {0}")]
    Compilation(String),
    /// Raised by the database client; passed through unchanged.
    #[error("Client error: {0}")]
    Client(#[from] BoxError),
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Unexpected query result: {0}")]
    UnexpectedResult(String),
    #[error("Table {0} already exists")]
    TableExists(String),
    #[error("Failed to load configuration: {0}")]
    Config(#[from] ::config::ConfigError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Wraps any client-side failure without altering it.
    pub fn client<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        Error::Client(err.into())
    }
}
