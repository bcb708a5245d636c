use std::time::Duration;

use mercator_data::{Bbox, Category, PlaceId, Point};

use crate::{
    error::{MercatorError, Result},
    localization::Locales,
    types::{DataLayer, LookupDetails, ReverseDetails, SearchDetails},
};

const MAX_RANK: u8 = 30;

/// Settings of a [`crate::Geocoder`] that apply to every request.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocoderConfig {
    /// Forward searches stop starting new searches after this time.
    pub request_timeout: Option<Duration>,
    /// Reverse lookups return nothing for points outside of any country.
    pub reverse_restrict_to_country_area: bool,
    /// Longest accepted free-text query, in characters.
    pub max_query_length: usize,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            request_timeout: None,
            reverse_restrict_to_country_area: false,
            max_query_length: 1000,
        }
    }
}

/// Builder for [`GeocoderConfig`]
#[derive(Debug, Clone, Default)]
pub struct GeocoderConfigBuilder {
    config: GeocoderConfig,
}

impl GeocoderConfigBuilder {
    /// Create a new builder with the defaults: no timeout, no country restriction
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder for public-facing services: short timeout, short queries,
    /// reverse lookups restricted to land covered by a country
    pub fn strict() -> Self {
        Self::new()
            .request_timeout(Duration::from_secs(10))
            .reverse_restrict_to_country_area(true)
            .max_query_length(200)
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = Some(timeout);
        self
    }

    pub fn without_timeout(mut self) -> Self {
        self.config.request_timeout = None;
        self
    }

    pub fn reverse_restrict_to_country_area(mut self, enabled: bool) -> Self {
        self.config.reverse_restrict_to_country_area = enabled;
        self
    }

    pub fn max_query_length(mut self, length: usize) -> Self {
        self.config.max_query_length = length;
        self
    }

    /// Build the final configuration
    pub fn build(self) -> Result<GeocoderConfig> {
        if self.config.max_query_length == 0 {
            return Err(MercatorError::ConfigError(
                "max_query_length must be positive".into(),
            ));
        }
        Ok(self.config)
    }
}

/// Builders that carry a [`LookupDetails`] which can be edited with
/// [`LookupDetailsBuilder`].
pub trait WithLookupDetails: Sized {
    fn lookup_details_mut(&mut self) -> &mut LookupDetails;
}

/// Sub-builder for the result details, returns to its parent with `done()`
pub struct LookupDetailsBuilder<P: WithLookupDetails> {
    parent: P,
}

impl<P: WithLookupDetails> LookupDetailsBuilder<P> {
    fn new(parent: P) -> Self {
        Self { parent }
    }

    /// Add the places that make up the address
    pub fn address_details(mut self, enabled: bool) -> Self {
        self.parent.lookup_details_mut().address_details = enabled;
        self
    }

    pub fn linked_places(mut self, enabled: bool) -> Self {
        self.parent.lookup_details_mut().linked_places = enabled;
        self
    }

    pub fn parented_places(mut self, enabled: bool) -> Self {
        self.parent.lookup_details_mut().parented_places = enabled;
        self
    }

    pub fn keywords(mut self, enabled: bool) -> Self {
        self.parent.lookup_details_mut().keywords = enabled;
        self
    }

    /// Languages for the result names, from an HTTP `Accept-Language` header
    pub fn accept_languages(mut self, header: &str) -> Self {
        self.parent.lookup_details_mut().locales = Locales::from_accept_languages(header);
        self
    }

    pub fn locales(mut self, locales: Locales) -> Self {
        self.parent.lookup_details_mut().locales = locales;
        self
    }

    /// Return to the main builder
    pub fn done(self) -> P {
        self.parent
    }
}

/// Builder for [`SearchDetails`] with validation of the spatial parameters
#[derive(Debug, Clone, Default)]
pub struct SearchDetailsBuilder {
    details: SearchDetails,
}

impl WithLookupDetails for SearchDetailsBuilder {
    fn lookup_details_mut(&mut self) -> &mut LookupDetails {
        &mut self.details.lookup
    }
}

impl SearchDetailsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only addressable places
    pub fn addresses() -> Self {
        Self::new().layers(DataLayer::ADDRESS)
    }

    /// Only points of interest, with their address
    pub fn pois() -> Self {
        Self::new()
            .layers(DataLayer::POI)
            .min_rank(26)
            .details()
            .address_details(true)
            .done()
    }

    pub fn max_results(mut self, max_results: usize) -> Self {
        self.details.max_results = max_results.max(1);
        self
    }

    pub fn min_rank(mut self, rank: u8) -> Self {
        self.details.min_rank = rank.min(MAX_RANK);
        self
    }

    pub fn max_rank(mut self, rank: u8) -> Self {
        self.details.max_rank = rank.min(MAX_RANK);
        self
    }

    pub fn layers(mut self, layers: DataLayer) -> Self {
        self.details.layers = Some(layers);
        self
    }

    pub fn all_layers(mut self) -> Self {
        self.details.layers = None;
        self
    }

    /// Restrict to countries. Codes are lower-cased, anything not two letters long is dropped.
    pub fn countries<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.details.countries = codes
            .into_iter()
            .map(|cc| cc.as_ref().trim().to_lowercase())
            .filter(|cc| cc.len() == 2 && cc.chars().all(|c| c.is_ascii_alphabetic()))
            .collect();
        self
    }

    pub fn excluded(mut self, place_ids: impl IntoIterator<Item = PlaceId>) -> Self {
        self.details.excluded = place_ids.into_iter().collect();
        self
    }

    pub fn viewbox(mut self, viewbox: Bbox) -> Self {
        self.details.viewbox = Some(viewbox);
        self
    }

    /// Only return results inside the viewbox
    pub fn bounded_viewbox(mut self, bounded: bool) -> Self {
        self.details.bounded_viewbox = bounded;
        self
    }

    pub fn near(mut self, point: Point) -> Self {
        self.details.near = Some(point);
        self
    }

    /// Radius around the `near` point in degrees
    pub fn near_radius(mut self, radius: f64) -> Self {
        self.details.near_radius = Some(radius);
        self
    }

    pub fn categories(mut self, categories: impl IntoIterator<Item = Category>) -> Self {
        self.details.categories = categories.into_iter().collect();
        self
    }

    /// Configure what is attached to the results
    pub fn details(self) -> LookupDetailsBuilder<Self> {
        LookupDetailsBuilder::new(self)
    }

    /// Build the final parameters
    pub fn build(self) -> Result<SearchDetails> {
        let details = self.details;
        if let Some(viewbox) = details.viewbox {
            let coords = [viewbox.minx, viewbox.miny, viewbox.maxx, viewbox.maxy];
            if coords.iter().any(|c| !c.is_finite()) {
                return Err(MercatorError::usage("Viewbox coordinates must be numbers."));
            }
            if viewbox.minx == viewbox.maxx || viewbox.miny == viewbox.maxy {
                return Err(MercatorError::usage("Viewbox must not be degenerate."));
            }
        } else if details.bounded_viewbox {
            return Err(MercatorError::usage("Bounded search needs a viewbox."));
        }
        if let Some(near) = details.near
            && (!near.x.is_finite()
                || !near.y.is_finite()
                || near.x.abs() > 180.0
                || near.y.abs() > 90.0)
        {
            return Err(MercatorError::usage("Near point coordinates invalid."));
        }
        if let Some(radius) = details.near_radius {
            if details.near.is_none() {
                return Err(MercatorError::usage("Near radius given without near point."));
            }
            if !radius.is_finite() || radius < 0.0 {
                return Err(MercatorError::usage("Near radius must be a positive number."));
            }
        }
        Ok(details)
    }
}

/// Builder for [`ReverseDetails`]
#[derive(Debug, Clone, Default)]
pub struct ReverseDetailsBuilder {
    details: ReverseDetails,
}

impl WithLookupDetails for ReverseDetailsBuilder {
    fn lookup_details_mut(&mut self) -> &mut LookupDetails {
        &mut self.details.lookup
    }
}

impl ReverseDetailsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Coarsest address rank that may be returned, 30 for house level
    pub fn max_rank(mut self, rank: u8) -> Self {
        self.details.max_rank = rank.min(MAX_RANK);
        self
    }

    /// Zoom level of a map, translated to the matching address rank
    pub fn zoom(self, zoom: u8) -> Self {
        let rank = match zoom {
            0..=4 => 4,
            5..=7 => 8,
            8 => 12,
            9..=10 => 16,
            11..=12 => 18,
            13 => 19,
            14..=15 => 22,
            16 => 26,
            17 => 27,
            _ => 30,
        };
        self.max_rank(rank)
    }

    pub fn layers(mut self, layers: DataLayer) -> Self {
        self.details.layers = layers;
        self
    }

    pub fn details(self) -> LookupDetailsBuilder<Self> {
        LookupDetailsBuilder::new(self)
    }

    pub fn build(self) -> ReverseDetails {
        self.details
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_geocoder_config() {
        let config = GeocoderConfigBuilder::new().build().unwrap();
        assert_eq!(config, GeocoderConfig::default());
        assert!(config.request_timeout.is_none());
        assert!(!config.reverse_restrict_to_country_area);
    }

    #[test]
    fn test_strict_preset() {
        let config = GeocoderConfigBuilder::strict().build().unwrap();
        assert_eq!(config.request_timeout, Some(Duration::from_secs(10)));
        assert!(config.reverse_restrict_to_country_area);
        assert_eq!(config.max_query_length, 200);

        let relaxed = GeocoderConfigBuilder::strict().without_timeout().build().unwrap();
        assert!(relaxed.request_timeout.is_none());
        assert!(relaxed.reverse_restrict_to_country_area);
    }

    #[test]
    fn test_geocoder_config_rejects_zero_query_length() {
        assert!(matches!(
            GeocoderConfigBuilder::new().max_query_length(0).build(),
            Err(MercatorError::ConfigError(_))
        ));
    }

    #[test]
    fn test_search_details_method_chaining() {
        let details = SearchDetailsBuilder::new()
            .max_results(5)
            .min_rank(10)
            .max_rank(50)
            .countries(["DE", " gb ", "usa", "x1"])
            .excluded([3, 4])
            .details()
            .address_details(true)
            .keywords(true)
            .done()
            .build()
            .unwrap();

        assert_eq!(details.max_results, 5);
        assert_eq!((details.min_rank, details.max_rank), (10, 30));
        assert_eq!(details.countries, vec!["de", "gb"]);
        assert_eq!(details.excluded, vec![3, 4]);
        assert!(details.lookup.address_details);
        assert!(details.lookup.keywords);
        assert!(!details.lookup.linked_places);
    }

    #[test]
    fn test_search_details_presets() {
        let addresses = SearchDetailsBuilder::addresses().build().unwrap();
        assert_eq!(addresses.layers, Some(DataLayer::ADDRESS));

        let pois = SearchDetailsBuilder::pois().build().unwrap();
        assert_eq!(pois.layers, Some(DataLayer::POI));
        assert_eq!(pois.min_rank, 26);
        assert!(pois.lookup.address_details);
    }

    #[test]
    fn test_search_details_validation() {
        assert!(
            SearchDetailsBuilder::new()
                .viewbox(Bbox::new(1.0, 1.0, 1.0, 2.0))
                .build()
                .is_err()
        );
        assert!(SearchDetailsBuilder::new().bounded_viewbox(true).build().is_err());
        assert!(SearchDetailsBuilder::new().near_radius(0.1).build().is_err());
        assert!(
            SearchDetailsBuilder::new()
                .near(Point::new(0.0, 0.0))
                .near_radius(-1.0)
                .build()
                .is_err()
        );
        assert!(
            SearchDetailsBuilder::new()
                .near(Point::new(200.0, 0.0))
                .build()
                .is_err()
        );
        let ok = SearchDetailsBuilder::new()
            .viewbox(Bbox::new(0.0, 0.0, 1.0, 1.0))
            .bounded_viewbox(true)
            .near(Point::new(2.0, 2.0))
            .near_radius(0.5)
            .build()
            .unwrap();
        assert!(ok.has_bounded_viewbox());
        assert_eq!(ok.near_radius, Some(0.5));
    }

    #[test]
    fn test_max_results_at_least_one() {
        let details = SearchDetailsBuilder::new().max_results(0).build().unwrap();
        assert_eq!(details.max_results, 1);
    }

    #[test]
    fn test_reverse_details_builder() {
        let details = ReverseDetailsBuilder::new()
            .zoom(16)
            .layers(DataLayer::ADDRESS | DataLayer::NATURAL)
            .details()
            .accept_languages("de,en;q=0.5")
            .done()
            .build();
        assert_eq!(details.max_rank, 26);
        assert!(details.layer_enabled(DataLayer::NATURAL));
        assert!(!details.layer_enabled(DataLayer::POI));
        assert!(!details.lookup.locales.is_empty());

        assert_eq!(ReverseDetailsBuilder::new().max_rank(99).build().max_rank, 30);
        assert_eq!(ReverseDetailsBuilder::new().zoom(3).build().max_rank, 4);
    }
}
