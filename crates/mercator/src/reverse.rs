//! Reverse geocoding: find the place closest to a coordinate.
//!
//! The lookup cascades from fine to coarse. Streets, house numbers and POIs near the
//! point are tried first, then the areas containing it, and finally the country.

use std::{sync::Arc, time::Instant};

use mercator_data::{Bbox, CountryNameRow, InterpolationRow, OsmType, PlaceId, PlaceRow, Point};
use tracing::{debug, info, instrument};

use crate::{
    connection::{LineFilter, PlaceCondition, PlaceFilter, PlaceOrder, Result, SearchConnection},
    results::{BaseResult, ReverseResult, add_result_details},
    trace::{NOOP_TRACE, SearchTrace},
    types::{DataLayer, ReverseDetails},
};

/// Search radius for streets and POIs, in degrees.
const STREET_DISTANCE: f64 = 0.006;
/// Search radius for house numbers around an already found street.
const HOUSENUMBER_DISTANCE: f64 = 0.001;
/// Margin around the point for feature areas.
const FEATURE_AREA_MARGIN: f64 = 0.007;
const MAX_AREA_CANDIDATES: usize = 50;
/// Stand-in distance for a branch without result.
const NO_RESULT_DISTANCE: f64 = 1000.0;

/// Radius in degrees in which a place node of the given search rank is still
/// considered to cover the point.
pub fn reverse_place_diameter(rank_search: u8) -> f64 {
    14.0 * (-0.2 * f64::from(rank_search)).exp() - 0.03
}

fn is_valid_coordinate(point: &Point) -> bool {
    point.x.is_finite() && point.y.is_finite() && point.x.abs() <= 180.0 && point.y.abs() <= 90.0
}

/// An intermediate reverse result, before it is turned into a [`ReverseResult`].
#[derive(Debug, Clone)]
enum Candidate {
    Place {
        row: Arc<PlaceRow>,
        centroid: Point,
        distance: f64,
    },
    Interpolation {
        row: Arc<InterpolationRow>,
        housenumber: u32,
        distance: f64,
    },
    Tiger {
        row: Arc<InterpolationRow>,
        housenumber: u32,
        distance: f64,
        street_osm: (OsmType, i64),
    },
    Country {
        row: Arc<CountryNameRow>,
        envelope: Option<Bbox>,
    },
}

impl Candidate {
    fn place(row: Arc<PlaceRow>, point: &Point) -> Self {
        let distance = row.geometry.distance_to(point);
        let centroid = if row.geometry.is_line() {
            row.geometry
                .closest_point(point)
                .unwrap_or_else(|| row.centroid())
        } else {
            row.centroid()
        };
        Self::Place {
            row,
            centroid,
            distance,
        }
    }

    const fn distance(&self) -> f64 {
        match self {
            Self::Place { distance, .. }
            | Self::Interpolation { distance, .. }
            | Self::Tiger { distance, .. } => *distance,
            Self::Country { .. } => 0.0,
        }
    }

    fn into_result(self) -> ReverseResult {
        let distance = self.distance();
        let (base, bbox) = match self {
            Self::Place { row, centroid, .. } => {
                let mut base = BaseResult::from_place(&row);
                base.centroid = centroid;
                (base, Some(row.geometry.bbox()))
            }
            Self::Interpolation {
                row, housenumber, ..
            } => (
                BaseResult::from_interpolation(&row, Some(housenumber), row.house_position(housenumber)),
                None,
            ),
            Self::Tiger {
                row,
                housenumber,
                street_osm,
                ..
            } => (
                BaseResult::from_tiger(
                    &row,
                    Some(housenumber),
                    row.house_position(housenumber),
                    Some(street_osm),
                ),
                None,
            ),
            Self::Country { row, envelope } => {
                let centroid = envelope.map_or(Point::new(0.0, 0.0), |b| b.center());
                (BaseResult::from_country(&row, centroid), envelope)
            }
        };
        ReverseResult {
            base,
            distance,
            bbox,
        }
    }
}

/// The closer of two candidates. On equal distance the first one wins.
fn closest(first: Option<Candidate>, second: Option<Candidate>) -> Option<Candidate> {
    let d1 = first.as_ref().map_or(NO_RESULT_DISTANCE, Candidate::distance);
    let d2 = second.as_ref().map_or(NO_RESULT_DISTANCE, Candidate::distance);
    if d2 < d1 { second } else { first.or(second) }
}

/// House number on an interpolation line closest to the point.
fn interpolated_housenumber(row: &InterpolationRow, point: &Point) -> u32 {
    if row.endnumber <= row.startnumber {
        return row.startnumber;
    }
    let span = f64::from(row.endnumber - row.startnumber);
    let step = f64::from(row.step.max(1));
    let position = row.linegeo.line_locate_point(point).unwrap_or(0.0);
    let steps = (span * position / step).round();
    (f64::from(row.startnumber) + steps * step).min(f64::from(row.endnumber)) as u32
}

/// Reverse lookup of a single coordinate.
pub struct ReverseGeocoder<'a, C: SearchConnection + ?Sized> {
    conn: &'a C,
    details: &'a ReverseDetails,
    restrict_to_country_areas: bool,
    trace: &'a dyn SearchTrace,
}

impl<'a, C: SearchConnection + ?Sized> ReverseGeocoder<'a, C> {
    pub fn new(conn: &'a C, details: &'a ReverseDetails) -> Self {
        Self {
            conn,
            details,
            restrict_to_country_areas: false,
            trace: &NOOP_TRACE,
        }
    }

    /// Return nothing for points outside of any country.
    #[must_use]
    pub const fn with_country_restriction(mut self, restrict: bool) -> Self {
        self.restrict_to_country_areas = restrict;
        self
    }

    #[must_use]
    pub fn with_trace(mut self, trace: &'a dyn SearchTrace) -> Self {
        self.trace = trace;
        self
    }

    fn max_rank(&self) -> u8 {
        self.details.max_rank.min(30)
    }

    fn has_feature_layers(&self) -> bool {
        self.details
            .layer_enabled(DataLayer::RAILWAY | DataLayer::NATURAL | DataLayer::MANMADE)
    }

    #[instrument(
        name = "Reverse lookup",
        level = "info",
        skip_all,
        fields(x = point.x, y = point.y, max_rank = self.details.max_rank)
    )]
    pub async fn lookup(&self, point: Point) -> Result<Option<ReverseResult>> {
        if !is_valid_coordinate(&point) {
            debug!("Invalid coordinate, nothing to look up");
            return Ok(None);
        }
        let t = Instant::now();
        let max_rank = self.max_rank();

        let mut found = None;
        if max_rank >= 26 {
            found = self.lookup_street_poi(point).await?;
        }

        let mut grid_codes = None;
        if found.is_none() && self.restrict_to_country_areas {
            let codes = self.conn.country_grid_codes(point).await?;
            if codes.is_empty() {
                debug!("Point outside of all countries");
                return Ok(None);
            }
            grid_codes = Some(codes);
        }

        if found.is_none() && max_rank > 4 {
            found = self.lookup_area(point).await?;
        }

        if found.is_none() && self.details.layer_enabled(DataLayer::ADDRESS) {
            let codes = match grid_codes {
                Some(codes) => codes,
                None => self.conn.country_grid_codes(point).await?,
            };
            found = self.lookup_country(point, codes).await?;
        }

        let Some(candidate) = found else {
            info!(elapsed_ms = ?t.elapsed(), "No reverse result");
            return Ok(None);
        };
        let mut results = [candidate.into_result()];
        add_result_details(self.conn, &mut results, &self.details.lookup, self.trace).await?;
        let [result] = results;
        info!(
            elapsed_ms = ?t.elapsed(),
            distance = result.distance,
            rank_address = result.base.rank_address,
            "Reverse lookup finished"
        );
        if self.trace.is_enabled() {
            self.trace
                .result_dump("Reverse result", &[(result.distance, result.base.label())]);
        }
        Ok(Some(result))
    }

    /// Conditions for the objects that may be returned on street level.
    fn street_poi_options(&self) -> Vec<PlaceCondition> {
        let max_rank = self.max_rank();
        let mut options = Vec::new();
        if self.details.layer_enabled(DataLayer::ADDRESS) {
            options.push(PlaceCondition::RankAddress(26, max_rank.min(29)));
            if max_rank == 30 {
                options.push(PlaceCondition::AddressPoint);
            }
        }
        if self.details.layer_enabled(DataLayer::POI) && max_rank == 30 {
            options.push(PlaceCondition::All(vec![
                PlaceCondition::RankSearch(30, 30),
                PlaceCondition::ClassNotIn(vec!["place".into(), "building".into()]),
                PlaceCondition::Not(Box::new(PlaceCondition::LineLike)),
            ]));
        }
        if self.has_feature_layers() {
            options.push(PlaceCondition::All(vec![
                PlaceCondition::RankSearch(26, max_rank),
                PlaceCondition::RankAddress(0, 0),
                PlaceCondition::FeatureLayers(self.details.layers),
            ]));
        }
        options
    }

    #[instrument(name = "Street level", level = "debug", skip_all)]
    async fn lookup_street_poi(&self, point: Point) -> Result<Option<Candidate>> {
        let options = self.street_poi_options();
        if options.is_empty() {
            return Ok(None);
        }
        let filter = PlaceFilter::new()
            .with(PlaceCondition::WithinDistance {
                point,
                distance: STREET_DISTANCE,
            })
            .with(PlaceCondition::Unlinked)
            .with(PlaceCondition::Any(vec![
                PlaceCondition::Not(Box::new(PlaceCondition::Area)),
                PlaceCondition::CentroidWithinDistance {
                    point,
                    distance: STREET_DISTANCE,
                },
            ]))
            .with(PlaceCondition::Any(options))
            .order_by(PlaceOrder::Distance(point))
            .limit(1);
        let address_wanted =
            self.details.layer_enabled(DataLayer::ADDRESS) && self.max_rank() > 27;
        let mut best = None;
        let mut parent_street = None;
        // Radius for the interpolation search, narrowed by what was found so far.
        let mut distance = STREET_DISTANCE;

        if let Some(row) = self.conn.places(&filter).await?.into_iter().next() {
            debug!(place_id = row.place_id, rank_address = row.rank_address, "Closest object");
            let closest = Candidate::place(row.clone(), &point);
            if address_wanted && row.rank_address <= 27 {
                parent_street = Some(row.place_id);
                distance = HOUSENUMBER_DISTANCE;
                if let Some(house) = self.lookup_housenumber(point, row.place_id).await? {
                    distance = house.distance();
                    best = Some(house);
                } else if row.country_code.as_deref() == Some("us") {
                    best = self.lookup_tiger(point, &row).await?;
                }
            } else {
                distance = closest.distance();
            }
            best = best.or(Some(closest));
        }

        if address_wanted && distance > 0.0 {
            debug!(distance, "Looking for an interpolation");
            if let Some(interpolation) = self
                .lookup_interpolation(point, parent_street, distance)
                .await?
            {
                return Ok(Some(interpolation));
            }
        }
        Ok(best)
    }

    async fn lookup_housenumber(&self, point: Point, street: PlaceId) -> Result<Option<Candidate>> {
        let filter = PlaceFilter::new()
            .with(PlaceCondition::Parents(vec![street]))
            .with(PlaceCondition::AddressPoint)
            .with(PlaceCondition::Unlinked)
            .with(PlaceCondition::WithinDistance {
                point,
                distance: HOUSENUMBER_DISTANCE,
            })
            .order_by(PlaceOrder::Distance(point))
            .limit(1);
        Ok(self
            .conn
            .places(&filter)
            .await?
            .into_iter()
            .next()
            .map(|row| Candidate::place(row, &point)))
    }

    async fn lookup_tiger(&self, point: Point, street: &PlaceRow) -> Result<Option<Candidate>> {
        let filter = LineFilter {
            parents: vec![street.place_id],
            near: Some((point, HOUSENUMBER_DISTANCE)),
            limit: Some(1),
            ..LineFilter::default()
        };
        Ok(self.conn.tiger(&filter).await?.into_iter().next().map(|row| {
            let housenumber = interpolated_housenumber(&row, &point);
            Candidate::Tiger {
                distance: row.linegeo.distance_to(&point),
                housenumber,
                street_osm: (street.osm_type, street.osm_id),
                row,
            }
        }))
    }

    async fn lookup_interpolation(
        &self,
        point: Point,
        parent_street: Option<PlaceId>,
        distance: f64,
    ) -> Result<Option<Candidate>> {
        let filter = LineFilter {
            parents: parent_street.into_iter().collect(),
            near: Some((point, distance)),
            limit: Some(1),
            ..LineFilter::default()
        };
        Ok(self
            .conn
            .interpolations(&filter)
            .await?
            .into_iter()
            .next()
            .map(|row| {
                let housenumber = interpolated_housenumber(&row, &point);
                Candidate::Interpolation {
                    distance: row.linegeo.distance_to(&point),
                    housenumber,
                    row,
                }
            }))
    }

    #[instrument(name = "Area level", level = "debug", skip_all)]
    async fn lookup_area(&self, point: Point) -> Result<Option<Candidate>> {
        let address = async {
            if self.details.layer_enabled(DataLayer::ADDRESS) {
                self.lookup_address_area(point).await
            } else {
                Ok(None)
            }
        };
        let others = async {
            if self.has_feature_layers() {
                self.lookup_feature_area(point).await
            } else {
                Ok(None)
            }
        };
        let (address, others) = futures::join!(address, others);
        Ok(closest(address?, others?))
    }

    async fn lookup_address_area(&self, point: Point) -> Result<Option<Candidate>> {
        let max_rank = self.max_rank();
        let filter = PlaceFilter::new()
            .with(PlaceCondition::RankSearch(5, max_rank))
            .with(PlaceCondition::Area)
            .with(PlaceCondition::RankAddress(4, 25))
            .with(PlaceCondition::TypeNot("postcode".into()))
            .with(PlaceCondition::Named)
            .with(PlaceCondition::Unlinked)
            .with(PlaceCondition::ContainsPoint(point))
            .order_by(PlaceOrder::RankSearchDesc(point))
            .limit(MAX_AREA_CANDIDATES);
        let Some(area) = self.conn.places(&filter).await?.into_iter().next() else {
            return Ok(None);
        };
        debug!(place_id = area.place_id, rank_search = area.rank_search, "Containing area");

        if area.rank_search < max_rank
            && let Some(node) = self
                .lookup_place_node(
                    point,
                    area.rank_search + 1,
                    PlaceCondition::InsideGeometry(area.geometry.clone()),
                )
                .await?
        {
            return Ok(Some(node));
        }
        Ok(Some(Candidate::place(area, &point)))
    }

    /// Highest ranked place node with search rank at least `min_rank` whose influence
    /// radius covers the point.
    async fn lookup_place_node(
        &self,
        point: Point,
        min_rank: u8,
        within: PlaceCondition,
    ) -> Result<Option<Candidate>> {
        let filter = PlaceFilter::new()
            .with(PlaceCondition::RankSearch(min_rank, self.max_rank()))
            .with(PlaceCondition::RankAddress(4, 25))
            .with(PlaceCondition::Named)
            .with(PlaceCondition::Unlinked)
            .with(within)
            .with(PlaceCondition::WithinDistance {
                point,
                distance: reverse_place_diameter(min_rank),
            })
            .order_by(PlaceOrder::RankSearchDesc(point))
            .limit(MAX_AREA_CANDIDATES);
        Ok(self
            .conn
            .places(&filter)
            .await?
            .into_iter()
            .find(|row| {
                row.osm_type == OsmType::Node
                    && row.geometry.distance_to(&point) < reverse_place_diameter(row.rank_search)
            })
            .map(|row| Candidate::place(row, &point)))
    }

    async fn lookup_feature_area(&self, point: Point) -> Result<Option<Candidate>> {
        let filter = PlaceFilter::new()
            .with(PlaceCondition::RankAddress(0, 0))
            .with(PlaceCondition::RankSearch(5, self.max_rank()))
            .with(PlaceCondition::Named)
            .with(PlaceCondition::Unlinked)
            .with(PlaceCondition::FeatureLayers(self.details.layers))
            .with(PlaceCondition::IntersectsBox(
                point.to_bbox(FEATURE_AREA_MARGIN),
            ))
            .with(PlaceCondition::Any(vec![
                PlaceCondition::Not(Box::new(PlaceCondition::Area)),
                PlaceCondition::ContainsPoint(point),
            ]))
            .order_by(PlaceOrder::RankSearchDesc(point))
            .limit(1);
        Ok(self
            .conn
            .places(&filter)
            .await?
            .into_iter()
            .next()
            .map(|row| Candidate::place(row, &point)))
    }

    #[instrument(name = "Country level", level = "debug", skip_all, fields(countries = ?codes))]
    async fn lookup_country(&self, point: Point, codes: Vec<String>) -> Result<Option<Candidate>> {
        if codes.is_empty() {
            return Ok(None);
        }
        if self.max_rank() > 4
            && let Some(node) = self
                .lookup_place_node(point, 5, PlaceCondition::Countries(codes.clone()))
                .await?
        {
            return Ok(Some(node));
        }

        let filter = PlaceFilter::new()
            .with(PlaceCondition::Countries(codes.clone()))
            .with(PlaceCondition::RankAddress(4, 4))
            .with(PlaceCondition::RankSearch(4, 4))
            .with(PlaceCondition::Unlinked)
            .order_by(PlaceOrder::Distance(point))
            .limit(1);
        if let Some(row) = self.conn.places(&filter).await?.into_iter().next() {
            return Ok(Some(Candidate::place(row, &point)));
        }

        let mut names = self.conn.country_names(&codes).await?;
        names.sort_by(|a, b| a.country_code.cmp(&b.country_code));
        let Some(row) = names.into_iter().next() else {
            return Ok(None);
        };
        let envelope = self.conn.country_grid_envelope(&row.country_code).await?;
        Ok(Some(Candidate::Country { row, envelope }))
    }
}

#[cfg(test)]
mod tests {
    use mercator_data::{Category, TestDataConfig, create_test_database};

    use super::*;
    use crate::{connection::MemoryConnection, results::SourceTable};

    fn connection() -> MemoryConnection {
        MemoryConnection::new(Arc::new(
            create_test_database(&TestDataConfig::sample()).unwrap(),
        ))
    }

    fn details(max_rank: u8, layers: DataLayer) -> ReverseDetails {
        ReverseDetails {
            max_rank,
            layers,
            ..ReverseDetails::default()
        }
    }

    async fn reverse(conn: &MemoryConnection, point: Point, details: &ReverseDetails) -> Option<ReverseResult> {
        ReverseGeocoder::new(conn, details).lookup(point).await.unwrap()
    }

    fn candidate_at(distance: f64) -> Candidate {
        let db = create_test_database(&TestDataConfig::minimal()).unwrap();
        let row = db.place(3).unwrap().clone();
        Candidate::Place {
            row,
            centroid: Point::new(0.0, 0.0),
            distance,
        }
    }

    #[test]
    fn test_closest_candidate_prefers_smaller_distance() {
        let picked = closest(Some(candidate_at(0.002)), Some(candidate_at(0.01))).unwrap();
        assert_eq!(picked.distance(), 0.002);
        let picked = closest(Some(candidate_at(0.01)), Some(candidate_at(0.002))).unwrap();
        assert_eq!(picked.distance(), 0.002);
        let picked = closest(None, Some(candidate_at(0.01))).unwrap();
        assert_eq!(picked.distance(), 0.01);
        assert!(closest(None, None).is_none());
    }

    #[test]
    fn test_reverse_place_diameter_shrinks_with_rank() {
        assert!(reverse_place_diameter(5) > reverse_place_diameter(16));
        assert!(reverse_place_diameter(16) > reverse_place_diameter(25));
        assert!((reverse_place_diameter(20) - (14.0 * (-4.0f64).exp() - 0.03)).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_reverse_invalid_coordinates() {
        let conn = connection();
        let details = ReverseDetails::default();
        assert!(reverse(&conn, Point::new(f64::NAN, 10.0), &details).await.is_none());
        assert!(reverse(&conn, Point::new(181.0, 10.0), &details).await.is_none());
        assert!(reverse(&conn, Point::new(10.0, -90.5), &details).await.is_none());
    }

    #[tokio::test]
    async fn test_reverse_street_level() {
        let conn = connection();
        let result = reverse(&conn, Point::new(-0.1285, 51.5034), &details(26, DataLayer::ADDRESS))
            .await
            .unwrap();
        assert_eq!(result.base.place_id, Some(3));
        assert!(result.distance < STREET_DISTANCE);
        assert!(result.base.display_name.is_some());
    }

    #[tokio::test]
    async fn test_reverse_finds_house_number() {
        let conn = connection();
        let result = reverse(&conn, Point::new(-0.12758, 51.50345), &ReverseDetails::default())
            .await
            .unwrap();
        assert_eq!(result.base.place_id, Some(4));
        assert_eq!(result.base.housenumber.as_deref(), Some("10"));
    }

    #[tokio::test]
    async fn test_reverse_interpolation_next_to_street() {
        let conn = connection();
        let result = reverse(&conn, Point::new(-0.12636, 51.5045), &ReverseDetails::default())
            .await
            .unwrap();
        assert_eq!(result.base.source_table, SourceTable::Osmline);
        assert_eq!(result.base.housenumber.as_deref(), Some("11"));
    }

    #[tokio::test]
    async fn test_reverse_interpolation_without_street_in_reach() {
        let conn = connection();
        let result = reverse(&conn, Point::new(13.385, 52.5003), &ReverseDetails::default())
            .await
            .unwrap();
        assert_eq!(result.base.source_table, SourceTable::Osmline);
        assert_eq!(result.base.place_id, Some(111));
        assert_eq!(result.base.housenumber.as_deref(), Some("21"));
        assert!((result.distance - 0.0003).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_reverse_closer_house_beats_interpolation() {
        let conn = connection();
        // On Unter den Linden: house 5 is 0.0001 north, interpolation 110 0.0009 south.
        let result = reverse(&conn, Point::new(13.388, 52.516824), &ReverseDetails::default())
            .await
            .unwrap();
        assert_eq!(result.base.source_table, SourceTable::Placex);
        assert_eq!(result.base.place_id, Some(13));
        assert_eq!(result.base.housenumber.as_deref(), Some("5"));
    }

    #[tokio::test]
    async fn test_reverse_closer_interpolation_beats_house() {
        let conn = connection();
        let result = reverse(&conn, Point::new(13.3878, 52.5164), &ReverseDetails::default())
            .await
            .unwrap();
        assert_eq!(result.base.place_id, Some(110));
        assert_eq!(result.base.parent_place_id, Some(12));
    }

    #[tokio::test]
    async fn test_reverse_tiger_house_number_references_street() {
        let conn = connection();
        let result = reverse(&conn, Point::new(-89.65, 39.80005), &ReverseDetails::default())
            .await
            .unwrap();
        assert_eq!(result.base.source_table, SourceTable::Tiger);
        assert_eq!(result.base.parent_place_id, Some(22));
        assert!(result.base.housenumber.is_some());
    }

    #[tokio::test]
    async fn test_reverse_place_node_inside_city_area() {
        let conn = connection();
        let result = reverse(&conn, Point::new(-0.3, 51.6), &ReverseDetails::default())
            .await
            .unwrap();
        assert_eq!(result.base.place_id, Some(9));
        assert_eq!(result.base.category, Category::new("place", "suburb"));
    }

    #[tokio::test]
    async fn test_reverse_natural_feature_area() {
        let conn = connection();
        let result = reverse(&conn, Point::new(-0.17, 51.505), &details(30, DataLayer::NATURAL))
            .await
            .unwrap();
        assert_eq!(result.base.place_id, Some(7));
        assert_eq!(result.distance, 0.0);
    }

    #[tokio::test]
    async fn test_reverse_feature_without_address_rank_next_to_addresses() {
        let conn = connection();
        let layers = DataLayer::ADDRESS | DataLayer::RAILWAY;
        let result = reverse(&conn, Point::new(-0.17, 51.5292), &details(30, layers))
            .await
            .unwrap();
        assert_eq!(result.base.place_id, Some(8));
        assert_eq!(result.base.source_table, SourceTable::Placex);
        assert!(result.base.housenumber.is_none());
    }

    #[tokio::test]
    async fn test_reverse_country_level_only() {
        let conn = connection();
        let result = reverse(&conn, Point::new(10.0, 50.0), &details(4, DataLayer::ADDRESS))
            .await
            .unwrap();
        assert_eq!(result.base.category, Category::new("place", "country"));
        assert_eq!(result.base.rank_address, 4);
        assert_eq!(result.base.country_code.as_deref(), Some("de"));
    }

    #[tokio::test]
    async fn test_reverse_outside_countries_with_restriction() {
        let conn = connection();
        let details = ReverseDetails::default();
        let result = ReverseGeocoder::new(&conn, &details)
            .with_country_restriction(true)
            .lookup(Point::new(-30.0, 0.0))
            .await
            .unwrap();
        assert!(result.is_none());
    }
}
