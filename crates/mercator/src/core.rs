//! The request-level geocoding interface.
//!
//! [`Geocoder`] bundles a storage connection, a query analyzer and the service
//! configuration, and exposes the operations of a geocoding service: free-text and
//! structured search, category search, reverse lookup and lookup by id.
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use mercator::{Geocoder, SearchDetails};
//! use mercator_data::{TestDataConfig, create_test_database};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let db = create_test_database(&TestDataConfig::minimal())?;
//! let geocoder = Geocoder::from_database(Arc::new(db));
//!
//! let results = geocoder
//!     .search("Downing Street, London", &SearchDetails::default())
//!     .await?;
//! assert!(!results.is_empty());
//! # Ok::<(), mercator::error::MercatorError>(())
//! # }).unwrap();
//! ```

use std::{fmt, sync::Arc};

use mercator_data::{Category, PlaceDatabase, Point};
use tracing::{info, instrument};

use crate::{
    config::GeocoderConfig,
    connection::{MemoryConnection, SearchConnection},
    error::{MercatorError, Result},
    lookup::{get_detailed_place, get_places},
    results::{DetailedResult, ReverseResult, SearchResult},
    reverse::ReverseGeocoder,
    search::{
        ForwardGeocoder, QueryAnalyzer, WordTableAnalyzer,
        query::{Phrase, PhraseType},
    },
    trace::{NoopTrace, SearchTrace},
    types::{DataLayer, LookupDetails, PlaceRef, ReverseDetails, SearchDetails},
};

/// An address split into its parts. Every part is optional but at least one must be set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StructuredQuery {
    pub amenity: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub county: Option<String>,
    pub state: Option<String>,
    pub postalcode: Option<String>,
    pub country: Option<String>,
}

impl StructuredQuery {
    /// Non-empty parts as typed phrases, from the most to the least specific.
    pub fn phrases(&self) -> Vec<Phrase> {
        [
            (PhraseType::Amenity, &self.amenity),
            (PhraseType::Street, &self.street),
            (PhraseType::City, &self.city),
            (PhraseType::County, &self.county),
            (PhraseType::State, &self.state),
            (PhraseType::Postcode, &self.postalcode),
            (PhraseType::Country, &self.country),
        ]
        .into_iter()
        .filter_map(|(ptype, text)| {
            text.as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(|t| Phrase::new(ptype, t))
        })
        .collect()
    }

    /// Address ranks a result may have given the most specific part that is set.
    pub fn rank_window(&self) -> (u8, u8) {
        let set = |part: &Option<String>| part.as_deref().is_some_and(|p| !p.trim().is_empty());
        if set(&self.amenity) || set(&self.street) {
            (26, 30)
        } else if set(&self.city) {
            (13, 25)
        } else if set(&self.county) {
            (10, 12)
        } else if set(&self.state) {
            (5, 9)
        } else if set(&self.postalcode) {
            (5, 11)
        } else {
            (4, 4)
        }
    }
}

/// Split free text at commas into phrases.
fn split_query(query: &str) -> Vec<Phrase> {
    query
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(Phrase::free)
        .collect()
}

/// The main geocoding interface.
///
/// Cheap to clone; the connection and the analyzer are shared.
pub struct Geocoder<C: SearchConnection + ?Sized = MemoryConnection> {
    conn: Arc<C>,
    analyzer: Arc<dyn QueryAnalyzer>,
    config: GeocoderConfig,
    trace: Arc<dyn SearchTrace>,
}

impl<C: SearchConnection + ?Sized> Clone for Geocoder<C> {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
            analyzer: self.analyzer.clone(),
            config: self.config.clone(),
            trace: self.trace.clone(),
        }
    }
}

impl<C: SearchConnection + ?Sized> fmt::Debug for Geocoder<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Geocoder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Geocoder<MemoryConnection> {
    /// Create a geocoder over an in-memory place database with the default configuration.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::sync::Arc;
    ///
    /// use mercator::Geocoder;
    /// use mercator_data::{TestDataConfig, create_test_database};
    ///
    /// let db = create_test_database(&TestDataConfig::sample())?;
    /// let geocoder = Geocoder::from_database(Arc::new(db));
    /// # Ok::<(), mercator_data::DataError>(())
    /// ```
    #[instrument(name = "Create Geocoder from database", level = "info", skip_all)]
    pub fn from_database(db: Arc<PlaceDatabase>) -> Self {
        Self::from_connection(Arc::new(MemoryConnection::new(db)))
    }
}

impl<C: SearchConnection + ?Sized + 'static> Geocoder<C> {
    /// Create a geocoder that analyzes queries with the connection's word table.
    pub fn from_connection(conn: Arc<C>) -> Self {
        let analyzer: Arc<dyn QueryAnalyzer> = Arc::new(WordTableAnalyzer::new(conn.clone()));
        Self::new(conn, analyzer, GeocoderConfig::default())
    }
}

impl<C: SearchConnection + ?Sized> Geocoder<C> {
    /// Create a geocoder from its parts.
    pub fn new(conn: Arc<C>, analyzer: Arc<dyn QueryAnalyzer>, config: GeocoderConfig) -> Self {
        Self {
            conn,
            analyzer,
            config,
            trace: Arc::new(NoopTrace),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: GeocoderConfig) -> Self {
        self.config = config;
        self
    }

    /// Report the intermediate steps of every request to `trace`.
    #[must_use]
    pub fn with_trace(mut self, trace: Arc<dyn SearchTrace>) -> Self {
        self.trace = trace;
        self
    }

    pub fn config(&self) -> &GeocoderConfig {
        &self.config
    }

    pub fn connection(&self) -> &C {
        &self.conn
    }

    fn forward<'a>(&'a self, details: &'a SearchDetails) -> ForwardGeocoder<'a, C> {
        ForwardGeocoder::new(
            &*self.conn,
            &*self.analyzer,
            details,
            self.config.request_timeout,
        )
        .with_trace(&*self.trace)
    }

    fn check_query_length(&self, text: &str) -> Result<()> {
        if text.chars().count() > self.config.max_query_length {
            return Err(MercatorError::usage(format!(
                "Query longer than {} characters.",
                self.config.max_query_length
            )));
        }
        Ok(())
    }

    /// Search for places matching a free-text query. Commas separate phrases.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::sync::Arc;
    ///
    /// use mercator::{Geocoder, SearchDetails, error::MercatorError};
    /// use mercator_data::{TestDataConfig, create_test_database};
    ///
    /// # tokio::runtime::Runtime::new().unwrap().block_on(async {
    /// let geocoder = Geocoder::from_database(Arc::new(create_test_database(
    ///     &TestDataConfig::minimal(),
    /// )?));
    /// let details = SearchDetails::default();
    ///
    /// assert!(matches!(
    ///     geocoder.search("  ", &details).await,
    ///     Err(MercatorError::UsageError(_))
    /// ));
    /// let results = geocoder.search("Whitehall", &details).await?;
    /// assert!(results.iter().any(|r| r.base.place_id == Some(5)));
    /// # Ok::<(), MercatorError>(())
    /// # }).unwrap();
    /// ```
    #[instrument(name = "Search", level = "info", skip(self, details))]
    pub async fn search(&self, query: &str, details: &SearchDetails) -> Result<Vec<SearchResult>> {
        self.check_query_length(query)?;
        let phrases = split_query(query);
        if phrases.is_empty() {
            return Err(MercatorError::usage("Nothing to search for."));
        }
        Ok(self.forward(details).lookup(&phrases).await?)
    }

    /// Search for an address given in parts.
    ///
    /// The rank window is narrowed to the most specific part. Without an explicit layer
    /// selection only addresses are returned, plus POIs when an amenity is given.
    #[instrument(name = "Structured search", level = "info", skip_all)]
    pub async fn search_address(
        &self,
        query: &StructuredQuery,
        details: &SearchDetails,
    ) -> Result<Vec<SearchResult>> {
        let phrases = query.phrases();
        if phrases.is_empty() {
            return Err(MercatorError::usage("Nothing to search for."));
        }
        for phrase in &phrases {
            self.check_query_length(&phrase.text)?;
        }
        let (min_rank, max_rank) = query.rank_window();
        let mut details = details.restricted_to_ranks(min_rank, max_rank);
        if details.layers.is_none() {
            let mut layers = DataLayer::ADDRESS;
            if query.amenity.is_some() {
                layers = layers | DataLayer::POI;
            }
            details.layers = Some(layers);
        }
        Ok(self.forward(&details).lookup(&phrases).await?)
    }

    /// Search for places of the given categories, optionally near the places matching
    /// `near_query`. Without a query the search needs a `near` point or a bounded viewbox.
    #[instrument(name = "Category search", level = "info", skip(self, details))]
    pub async fn search_category(
        &self,
        categories: &[Category],
        near_query: Option<&str>,
        details: &SearchDetails,
    ) -> Result<Vec<SearchResult>> {
        if categories.is_empty() {
            return Ok(Vec::new());
        }
        let phrases = match near_query {
            Some(text) => {
                self.check_query_length(text)?;
                split_query(text)
            }
            None => Vec::new(),
        };
        Ok(self.forward(details).lookup_pois(categories, &phrases).await?)
    }

    /// The place closest to `point`, or `None` if there is nothing within reach.
    pub async fn reverse(&self, point: Point, details: &ReverseDetails) -> Result<Option<ReverseResult>> {
        Ok(ReverseGeocoder::new(&*self.conn, details)
            .with_country_restriction(self.config.reverse_restrict_to_country_area)
            .with_trace(&*self.trace)
            .lookup(point)
            .await?)
    }

    /// A single place with all requested details.
    pub async fn details(&self, place: &PlaceRef, details: &LookupDetails) -> Result<Option<DetailedResult>> {
        Ok(get_detailed_place(&*self.conn, place, details, &*self.trace).await?)
    }

    /// Several places by id. Places that cannot be found are left out.
    pub async fn lookup(&self, places: &[PlaceRef], details: &LookupDetails) -> Result<Vec<SearchResult>> {
        let results = get_places(&*self.conn, places, details, &*self.trace).await?;
        info!(requested = places.len(), found = results.len(), "Lookup done");
        Ok(results)
    }
}
