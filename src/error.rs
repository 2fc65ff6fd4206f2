use thiserror::Error;

/// Engine-wide error taxonomy.
///
/// `Config` errors are raised at binding time, before any computation.
/// `Data` and `Computation` errors are caught at the per-symbol boundary by
/// the seeker; `Persistence` errors roll back the whole commit.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("data error for '{symbol}': {message}")]
    Data { symbol: String, message: String },

    #[error("price data unavailable for '{0}'")]
    DataUnavailable(String),

    #[error("computation error: {0}")]
    Computation(String),

    #[error("persistence error: {0}")]
    Persistence(String),
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn data(symbol: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Data {
            symbol: symbol.into(),
            message: message.into(),
        }
    }

    pub fn computation(message: impl Into<String>) -> Self {
        Self::Computation(message.into())
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence(message.into())
    }
}

impl From<polars::prelude::PolarsError> for Error {
    fn from(e: polars::prelude::PolarsError) -> Self {
        Self::Computation(e.to_string())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Self::Persistence(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Persistence(format!("serialization: {e}"))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
