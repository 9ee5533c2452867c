use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored song id could not be parsed back into a UUID.
    #[error("invalid song id {value:?}: {source}")]
    InvalidId {
        value: String,
        #[source]
        source: uuid::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
