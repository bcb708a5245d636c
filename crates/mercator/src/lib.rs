//! Mercator - query planning, ranking and reverse lookup for an address geocoder
//!
//! Mercator turns free-text or structured address queries into ranked places, and
//! coordinates into the closest address. It works against any storage that implements
//! [`SearchConnection`]; [`MemoryConnection`] serves the in-memory tables of
//! [`mercator_data`].
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use mercator::{Geocoder, ReverseDetails, SearchDetailsBuilder};
//! use mercator_data::{Point, TestDataConfig, create_test_database};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let geocoder = Geocoder::from_database(Arc::new(create_test_database(
//!     &TestDataConfig::sample(),
//! )?));
//!
//! // Forward search, phrases separated by commas
//! let details = SearchDetailsBuilder::new()
//!     .max_results(5)
//!     .details()
//!     .address_details(true)
//!     .done()
//!     .build()?;
//! let results = geocoder.search("Downing Street, London", &details).await?;
//! if let Some(best) = results.first() {
//!     println!("{}", best.base.label());
//! }
//!
//! // Reverse lookup
//! let closest = geocoder
//!     .reverse(Point::new(-0.1276, 51.5034), &ReverseDetails::default())
//!     .await?;
//! assert!(closest.is_some());
//! # Ok::<(), mercator::error::MercatorError>(())
//! # }).unwrap();
//! ```
//!
//! # How a search runs
//!
//! - **Analysis**: the query is split into words and matched against the word table,
//!   giving a graph of token candidates
//! - **Interpretation**: every consistent assignment of tokens to name, address,
//!   house number, postcode, country and category is enumerated with a penalty
//! - **Search building**: each assignment becomes one or more abstract searches
//! - **Execution**: searches run cheapest first until they get too expensive compared
//!   to the best result, under a hard cap and an optional deadline
//! - **Ranking**: results are deduplicated, reranked against the query and cut

use once_cell::sync::OnceCell;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};

pub mod config;
pub mod connection;
mod core;
pub mod error;
pub mod localization;
pub mod lookup;
pub mod results;
pub mod reverse;
pub mod search;
pub mod trace;
pub mod types;

pub use crate::core::{Geocoder, StructuredQuery};

pub use config::{
    GeocoderConfig, GeocoderConfigBuilder, LookupDetailsBuilder, ReverseDetailsBuilder,
    SearchDetailsBuilder,
};
pub use connection::{MemoryConnection, SearchConnection};
pub use localization::Locales;
pub use mercator_data as data;
pub use results::{AddressLine, BaseResult, DetailedResult, ReverseResult, SearchResult, SourceTable};
pub use reverse::ReverseGeocoder;
pub use search::{
    ForwardGeocoder, QueryAnalyzer, WordTableAnalyzer,
    query::{Phrase, PhraseType},
};
pub use trace::{NoopTrace, SearchTrace, TextTrace, TracingTrace};
pub use types::{
    DataLayer, FromParam, LookupDetails, PlaceRef, ReverseDetails, SearchDetails,
    parse_countries, parse_excluded,
};

static LOGGER_INIT: OnceCell<()> = OnceCell::new();

/// Initialize logging for the mercator library.
///
/// `RUST_LOG` takes precedence; without it events at `level` and above are shown.
/// Spans are reported when they close, with their duration. Calling this more than
/// once is harmless.
///
/// # Examples
///
/// ```rust
/// use mercator::init_logging;
/// use tracing::Level;
///
/// init_logging(Level::INFO)?;
/// # Ok::<(), mercator::error::MercatorError>(())
/// ```
pub fn init_logging(level: impl Into<LevelFilter>) -> error::Result<&'static ()> {
    LOGGER_INIT.get_or_try_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(level.into().to_string()))?;

        tracing_subscriber::fmt::fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .init();
        Ok(())
    })
}
