//! Storage contract of the geocoder.
//!
//! Searches describe what they need as plain data ([`PlaceFilter`], [`LineFilter`],
//! [`PostcodeFilter`] and the [`FieldLookup`]s of a search) and hand it to a
//! [`SearchConnection`]. The `accepts()` predicates of the filters define the semantics; a
//! backend is free to use whatever indexes it has as long as it returns the same rows.

mod memory;

use std::{cmp::Ordering, sync::Arc};

use async_trait::async_trait;
use mercator_data::{
    AddressLineRow, Bbox, Category, CountryNameRow, DataError, Geometry, InterpolationRow, OsmType,
    PlaceId, PlaceRow, Point, PostcodeRow, SearchNameRow, TokenId, WordRow, normalize_postcode,
};
use thiserror::Error;

pub use memory::MemoryConnection;

use crate::{search::fields::FieldLookup, types::DataLayer};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Data error: {0}")]
    DataError(#[from] DataError),
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Classes that make up the natural layer.
pub const NATURAL_CLASSES: &[&str] = &["natural", "water", "waterway"];

/// A place row together with the search vectors it was found through.
#[derive(Debug, Clone)]
pub struct NameMatch {
    pub place: Arc<PlaceRow>,
    pub search: Arc<SearchNameRow>,
}

/// Row access needed by forward search, reverse lookup and place details.
#[async_trait]
pub trait SearchConnection: Send + Sync {
    /// Word table entries for the given normalized word tokens.
    async fn lookup_words(&self, word_tokens: &[String]) -> Result<Vec<WordRow>>;

    /// Word table entries by id.
    async fn words_by_id(&self, word_ids: &[TokenId]) -> Result<Vec<WordRow>>;

    /// Places whose search vectors satisfy all `lookups` and that pass `filter`.
    async fn search_names(
        &self,
        lookups: &[FieldLookup],
        filter: &PlaceFilter,
    ) -> Result<Vec<NameMatch>>;

    async fn places(&self, filter: &PlaceFilter) -> Result<Vec<Arc<PlaceRow>>>;

    async fn interpolations(&self, filter: &LineFilter) -> Result<Vec<Arc<InterpolationRow>>>;

    async fn tiger(&self, filter: &LineFilter) -> Result<Vec<Arc<InterpolationRow>>>;

    async fn postcodes(&self, filter: &PostcodeFilter) -> Result<Vec<Arc<PostcodeRow>>>;

    /// Fallback country names for the given codes.
    async fn country_names(&self, country_codes: &[String]) -> Result<Vec<Arc<CountryNameRow>>>;

    /// Codes of all country grid cells containing `point`.
    async fn country_grid_codes(&self, point: Point) -> Result<Vec<String>>;

    /// Envelope of all grid cells of a country.
    async fn country_grid_envelope(&self, country_code: &str) -> Result<Option<Bbox>>;

    /// Address hierarchy of a place, nearest rank first.
    async fn address_lines(&self, place_id: PlaceId) -> Result<Vec<AddressLineRow>>;

    async fn search_vectors(&self, place_id: PlaceId) -> Result<Option<Arc<SearchNameRow>>>;
}

/// Whether `row` belongs to one of the selected layers.
pub fn layer_accepts(row: &PlaceRow, layers: DataLayer) -> bool {
    let address = layers.contains(DataLayer::ADDRESS);
    let poi = layers.contains(DataLayer::POI);
    let in_address_or_poi = match (address, poi) {
        (true, true) => (1..=30).contains(&row.rank_address),
        (true, false) => (1..=29).contains(&row.rank_address) || row.is_address_point(),
        (false, true) => row.rank_address == 30 && !is_place_or_building(row),
        (false, false) => false,
    };
    in_address_or_poi || (row.rank_address == 0 && feature_layer_accepts(row, layers))
}

/// Class filter of the railway, natural and man-made layers. Man-made takes everything
/// that is not explicitly railway or natural unless those are selected as well.
pub fn feature_layer_accepts(row: &PlaceRow, layers: DataLayer) -> bool {
    let class = row.category.class.as_str();
    let is_railway = class == "railway";
    let is_natural = NATURAL_CLASSES.contains(&class);
    if layers.contains(DataLayer::MANMADE) {
        (!is_railway || layers.contains(DataLayer::RAILWAY))
            && (!is_natural || layers.contains(DataLayer::NATURAL))
    } else {
        (is_railway && layers.contains(DataLayer::RAILWAY))
            || (is_natural && layers.contains(DataLayer::NATURAL))
    }
}

fn is_place_or_building(row: &PlaceRow) -> bool {
    row.has_class("place") || row.has_class("building")
}

/// Whether one of the `;`-separated house numbers of `value` equals one of `wanted`,
/// ignoring case.
pub fn housenumber_matches(value: &str, wanted: &[String]) -> bool {
    value
        .split(';')
        .map(str::trim)
        .any(|hnr| wanted.iter().any(|w| w.eq_ignore_ascii_case(hnr)))
}

/// A single predicate on a place row.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaceCondition {
    RankAddress(u8, u8),
    RankSearch(u8, u8),
    /// Address or search rank at least `min` and address or search rank at most `max`.
    RankWindow { min: u8, max: u8 },
    Categories(Vec<Category>),
    ClassIn(Vec<String>),
    ClassNotIn(Vec<String>),
    TypeNot(String),
    Layers(DataLayer),
    FeatureLayers(DataLayer),
    Countries(Vec<String>),
    Excluded(Vec<PlaceId>),
    Ids(Vec<PlaceId>),
    Parents(Vec<PlaceId>),
    LinkedTo(PlaceId),
    Osm { osm_type: OsmType, osm_id: i64 },
    Housenumbers(Vec<String>),
    AddressPoint,
    Named,
    Unlinked,
    Area,
    LineLike,
    /// Geometry within `distance` of the point.
    WithinDistance { point: Point, distance: f64 },
    CentroidWithinDistance { point: Point, distance: f64 },
    ContainsPoint(Point),
    /// Geometry fully inside the given geometry's area, approximated by its centroid.
    InsideGeometry(Geometry),
    CentroidInBox(Bbox),
    IntersectsBox(Bbox),
    Not(Box<PlaceCondition>),
    Any(Vec<PlaceCondition>),
    All(Vec<PlaceCondition>),
}

impl PlaceCondition {
    pub fn accepts(&self, row: &PlaceRow) -> bool {
        match self {
            Self::RankAddress(min, max) => (*min..=*max).contains(&row.rank_address),
            Self::RankSearch(min, max) => (*min..=*max).contains(&row.rank_search),
            Self::RankWindow { min, max } => {
                (row.rank_address >= *min || row.rank_search >= *min)
                    && (row.rank_address <= *max || row.rank_search <= *max)
            }
            Self::Categories(categories) => categories.contains(&row.category),
            Self::ClassIn(classes) => classes.iter().any(|c| row.has_class(c)),
            Self::ClassNotIn(classes) => !classes.iter().any(|c| row.has_class(c)),
            Self::TypeNot(kind) => row.category.kind != *kind,
            Self::Layers(layers) => layer_accepts(row, *layers),
            Self::FeatureLayers(layers) => feature_layer_accepts(row, *layers),
            Self::Countries(codes) => row
                .country_code
                .as_ref()
                .is_some_and(|cc| codes.contains(cc)),
            Self::Excluded(ids) => !ids.contains(&row.place_id),
            Self::Ids(ids) => ids.contains(&row.place_id),
            Self::Parents(ids) => row.parent_place_id.is_some_and(|p| ids.contains(&p)),
            Self::LinkedTo(id) => row.linked_place_id == Some(*id),
            Self::Osm { osm_type, osm_id } => row.osm_type == *osm_type && row.osm_id == *osm_id,
            Self::Housenumbers(wanted) => row
                .housenumber
                .as_deref()
                .is_some_and(|h| housenumber_matches(h, wanted)),
            Self::AddressPoint => row.is_address_point(),
            Self::Named => row.is_named(),
            Self::Unlinked => !row.is_linked(),
            Self::Area => row.geometry.is_area(),
            Self::LineLike => row.geometry.is_line(),
            Self::WithinDistance { point, distance } => row.geometry.distance_to(point) <= *distance,
            Self::CentroidWithinDistance { point, distance } => {
                row.centroid().distance(point) <= *distance
            }
            Self::ContainsPoint(point) => row.geometry.contains(point),
            Self::InsideGeometry(area) => area.contains(&row.centroid()),
            Self::CentroidInBox(bbox) => bbox.contains(&row.centroid()),
            Self::IntersectsBox(bbox) => row.geometry.intersects_bbox(bbox),
            Self::Not(inner) => !inner.accepts(row),
            Self::Any(options) => options.iter().any(|c| c.accepts(row)),
            Self::All(conditions) => conditions.iter().all(|c| c.accepts(row)),
        }
    }

    /// Area the matching rows must intersect, if the condition implies one.
    fn envelope(&self) -> Option<Bbox> {
        match self {
            Self::WithinDistance { point, distance }
            | Self::CentroidWithinDistance { point, distance } => Some(point.to_bbox(*distance)),
            Self::ContainsPoint(point) => Some(point.to_bbox(0.0)),
            Self::InsideGeometry(area) => Some(area.bbox()),
            Self::CentroidInBox(bbox) | Self::IntersectsBox(bbox) => Some(*bbox),
            _ => None,
        }
    }
}

/// Result order of a place query.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum PlaceOrder {
    #[default]
    Unordered,
    /// Geometry distance to the point, closest first.
    Distance(Point),
    /// Centroid distance to the point, closest first.
    CentroidDistance(Point),
    /// Highest search rank first, then geometry distance.
    RankSearchDesc(Point),
}

impl PlaceOrder {
    pub fn compare(self, a: &PlaceRow, b: &PlaceRow) -> Ordering {
        match self {
            Self::Unordered => Ordering::Equal,
            Self::Distance(point) => a
                .geometry
                .distance_to(&point)
                .total_cmp(&b.geometry.distance_to(&point)),
            Self::CentroidDistance(point) => a
                .centroid()
                .distance(&point)
                .total_cmp(&b.centroid().distance(&point)),
            Self::RankSearchDesc(point) => b
                .rank_search
                .cmp(&a.rank_search)
                .then_with(|| Self::Distance(point).compare(a, b)),
        }
    }
}

/// Conjunction of [`PlaceCondition`]s with an order and an optional limit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaceFilter {
    pub conditions: Vec<PlaceCondition>,
    pub order: PlaceOrder,
    pub limit: Option<usize>,
}

impl PlaceFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, condition: PlaceCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_if(self, enabled: bool, condition: impl FnOnce() -> PlaceCondition) -> Self {
        if enabled { self.with(condition()) } else { self }
    }

    pub const fn order_by(mut self, order: PlaceOrder) -> Self {
        self.order = order;
        self
    }

    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn accepts(&self, row: &PlaceRow) -> bool {
        self.conditions.iter().all(|c| c.accepts(row))
    }

    /// Smallest box implied by the spatial conditions.
    pub fn envelope(&self) -> Option<Bbox> {
        self.conditions
            .iter()
            .filter_map(PlaceCondition::envelope)
            .reduce(|a, b| {
                Bbox::new(
                    a.minx.max(b.minx),
                    a.miny.max(b.miny),
                    a.maxx.min(b.maxx).max(a.minx.max(b.minx)),
                    a.maxy.min(b.maxy).max(a.miny.max(b.miny)),
                )
            })
    }

    /// Explicit place ids, if the filter restricts to them.
    pub fn ids(&self) -> Option<&[PlaceId]> {
        self.conditions.iter().find_map(|c| match c {
            PlaceCondition::Ids(ids) => Some(ids.as_slice()),
            _ => None,
        })
    }

    /// Order and truncate accepted rows. `place` projects an item to its place row.
    pub fn finish<T>(&self, mut rows: Vec<T>, place: impl Fn(&T) -> &PlaceRow) -> Vec<T> {
        if self.order != PlaceOrder::Unordered {
            rows.sort_by(|a, b| self.order.compare(place(a), place(b)));
        }
        if let Some(limit) = self.limit {
            rows.truncate(limit);
        }
        rows
    }
}

/// Query on address interpolation lines (OSM or TIGER).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineFilter {
    pub ids: Vec<PlaceId>,
    /// OSM way ids of the lines.
    pub osm_ids: Vec<i64>,
    pub parents: Vec<PlaceId>,
    /// Lines that cover at least one of the numbers.
    pub numbers: Vec<u32>,
    pub excluded: Vec<PlaceId>,
    pub near: Option<(Point, f64)>,
    pub limit: Option<usize>,
}

impl LineFilter {
    pub fn accepts(&self, row: &InterpolationRow) -> bool {
        (self.ids.is_empty() || self.ids.contains(&row.place_id))
            && (self.osm_ids.is_empty() || self.osm_ids.contains(&row.osm_id))
            && (self.parents.is_empty()
                || row.parent_place_id.is_some_and(|p| self.parents.contains(&p)))
            && (self.numbers.is_empty() || self.numbers.iter().any(|n| row.covers(*n)))
            && !self.excluded.contains(&row.place_id)
            && self
                .near
                .is_none_or(|(point, distance)| row.linegeo.distance_to(&point) <= distance)
    }

    /// Order by distance when a point is given and truncate.
    pub fn finish(&self, mut rows: Vec<Arc<InterpolationRow>>) -> Vec<Arc<InterpolationRow>> {
        if let Some((point, _)) = self.near {
            rows.sort_by(|a, b| {
                a.linegeo
                    .distance_to(&point)
                    .total_cmp(&b.linegeo.distance_to(&point))
            });
        }
        if let Some(limit) = self.limit {
            rows.truncate(limit);
        }
        rows
    }
}

/// Query on the postcode table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostcodeFilter {
    /// Accepted postcodes in any spelling; empty accepts all.
    pub postcodes: Vec<String>,
    pub ids: Vec<PlaceId>,
    pub countries: Vec<String>,
    pub excluded: Vec<PlaceId>,
    pub intersects: Option<Bbox>,
    pub near: Option<(Point, f64)>,
    /// Sort by distance to this point.
    pub order_near: Option<Point>,
    pub limit: Option<usize>,
}

impl PostcodeFilter {
    pub fn accepts(&self, row: &PostcodeRow) -> bool {
        let value = normalize_postcode(&row.postcode);
        (self.postcodes.is_empty() || self.postcodes.iter().any(|p| normalize_postcode(p) == value))
            && (self.ids.is_empty() || self.ids.contains(&row.place_id))
            && (self.countries.is_empty() || self.countries.contains(&row.country_code))
            && !self.excluded.contains(&row.place_id)
            && self
                .intersects
                .is_none_or(|bbox| row.geometry.intersects_bbox(&bbox))
            && self
                .near
                .is_none_or(|(point, distance)| row.geometry.distance_to(&point) <= distance)
    }

    pub fn finish(&self, mut rows: Vec<Arc<PostcodeRow>>) -> Vec<Arc<PostcodeRow>> {
        if let Some(point) = self.order_near {
            rows.sort_by(|a, b| {
                a.geometry
                    .distance_to(&point)
                    .total_cmp(&b.geometry.distance_to(&point))
            });
        }
        if let Some(limit) = self.limit {
            rows.truncate(limit);
        }
        rows
    }
}
