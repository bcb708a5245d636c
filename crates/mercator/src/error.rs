use thiserror::Error;

#[derive(Error, Debug)]
pub enum MercatorError {
    #[error("Search error: {0}")]
    SearchError(#[from] crate::search::SearchError),
    #[error("Storage error: {0}")]
    StorageError(#[from] crate::connection::StorageError),
    #[error("Data error: {0}")]
    DataError(#[from] mercator_data::DataError),
    #[error("Usage error: {0}")]
    UsageError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Init Logging error: {0}")]
    InitLoggingError(#[from] tracing_subscriber::filter::ParseError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MercatorError {
    pub fn usage(msg: impl Into<String>) -> Self {
        Self::UsageError(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, MercatorError>;
