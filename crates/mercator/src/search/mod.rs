//! Forward search.
//!
//! A free-text or structured query goes through four stages: the [`analyzer`] turns it
//! into a token graph ([`query`]), the [`token_assignment`] enumerator proposes
//! interpretations, the [`builder`] turns every interpretation into abstract
//! [`searches`], and the [`geocoder`] executes them in order of penalty and ranks the
//! results.

pub use error::SearchError;
pub mod analyzer;
pub mod builder;
pub mod fields;
pub mod geocoder;
pub mod query;
pub mod searches;
pub mod token_assignment;

pub use analyzer::{QueryAnalyzer, WordTableAnalyzer};
pub use builder::SearchBuilder;
pub use geocoder::ForwardGeocoder;
pub use searches::AbstractSearch;

mod error {
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum SearchError {
        #[error("Storage error: {0}")]
        Storage(#[from] crate::connection::StorageError),
        #[error("Query analysis failed: {0}")]
        Analyzer(String),
        #[error(transparent)]
        Other(#[from] anyhow::Error),
    }
    pub type Result<T> = std::result::Result<T, SearchError>;
}

pub use error::Result;
