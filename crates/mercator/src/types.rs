//! Request parameters shared by forward, reverse and id lookups.

use std::ops::{BitAnd, BitOr};

use mercator_data::{Bbox, Category, OsmType, PlaceId, Point};

use crate::{
    error::{MercatorError, Result},
    localization::Locales,
};

/// Selectable kinds of places.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DataLayer(u8);

impl DataLayer {
    /// Addressable places: houses, streets, settlements and admin areas.
    pub const ADDRESS: Self = Self(1);
    /// Points of interest such as shops or pubs.
    pub const POI: Self = Self(2);
    pub const RAILWAY: Self = Self(4);
    /// Rivers, lakes, mountains.
    pub const NATURAL: Self = Self(8);
    /// Everything else that is neither address nor one of the other layers.
    pub const MANMADE: Self = Self(16);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn all() -> Self {
        Self(31)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }
}

impl Default for DataLayer {
    fn default() -> Self {
        Self::ADDRESS | Self::POI
    }
}

impl BitOr for DataLayer {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitAnd for DataLayer {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

/// Reference to a place, either by internal id or by OSM id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaceRef {
    PlaceId(PlaceId),
    Osm {
        osm_type: OsmType,
        osm_id: i64,
        /// Main class to pick one of several objects with the same OSM id. For
        /// interpolation lines a number selects the house number.
        class: Option<String>,
    },
}

impl PlaceRef {
    pub const fn place_id(place_id: PlaceId) -> Self {
        Self::PlaceId(place_id)
    }

    pub const fn osm(osm_type: OsmType, osm_id: i64) -> Self {
        Self::Osm {
            osm_type,
            osm_id,
            class: None,
        }
    }

    pub fn class_as_housenumber(&self) -> Option<u32> {
        match self {
            Self::Osm {
                class: Some(class), ..
            } if !class.is_empty() && class.chars().all(|c| c.is_ascii_digit()) => class.parse().ok(),
            _ => None,
        }
    }
}

/// What to attach to a result besides the place itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LookupDetails {
    /// Places that make up the address.
    pub address_details: bool,
    /// Places linked to the result.
    pub linked_places: bool,
    /// Places that use the result as their parent.
    pub parented_places: bool,
    /// Search terms of the place.
    pub keywords: bool,
    pub locales: Locales,
}

/// Parameters of a forward search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchDetails {
    pub lookup: LookupDetails,
    pub max_results: usize,
    pub min_rank: u8,
    pub max_rank: u8,
    /// `None` disables layer filtering.
    pub layers: Option<DataLayer>,
    /// Lower-case two-letter codes; empty disables the filter.
    pub countries: Vec<String>,
    pub excluded: Vec<PlaceId>,
    pub viewbox: Option<Bbox>,
    pub bounded_viewbox: bool,
    pub near: Option<Point>,
    /// Radius around `near` in degrees.
    pub near_radius: Option<f64>,
    pub categories: Vec<Category>,
}

impl Default for SearchDetails {
    fn default() -> Self {
        Self {
            lookup: LookupDetails::default(),
            max_results: 10,
            min_rank: 0,
            max_rank: 30,
            layers: None,
            countries: Vec::new(),
            excluded: Vec::new(),
            viewbox: None,
            bounded_viewbox: false,
            near: None,
            near_radius: None,
            categories: Vec::new(),
        }
    }
}

impl SearchDetails {
    /// The viewbox grown by half its size in every direction.
    pub fn viewbox_x2(&self) -> Option<Bbox> {
        self.viewbox.map(|vb| vb.scaled_by_two())
    }

    /// Narrow the rank window to `new_min..=new_max`.
    pub fn restricted_to_ranks(&self, new_min: u8, new_max: u8) -> Self {
        Self {
            min_rank: self.min_rank.max(new_min),
            max_rank: self.max_rank.min(new_max),
            ..self.clone()
        }
    }

    /// Whether the parameters contradict each other so that nothing can be found.
    pub fn is_impossible(&self) -> bool {
        self.min_rank > self.max_rank
            || (self.bounded_viewbox
                && matches!((self.viewbox, self.near), (Some(vb), Some(near)) if vb.contains(&near)))
            || self.layers.is_some_and(DataLayer::is_empty)
            || (self.max_rank <= 4
                && self
                    .layers
                    .is_some_and(|l| !l.intersects(DataLayer::ADDRESS)))
    }

    /// True when `layer` is selected or no layer filter is set.
    pub fn layer_enabled(&self, layer: DataLayer) -> bool {
        self.layers.is_none_or(|l| l.intersects(layer))
    }

    pub fn has_bounded_viewbox(&self) -> bool {
        self.bounded_viewbox && self.viewbox.is_some()
    }
}

/// Parameters of a reverse lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct ReverseDetails {
    pub lookup: LookupDetails,
    pub max_rank: u8,
    pub layers: DataLayer,
}

impl Default for ReverseDetails {
    fn default() -> Self {
        Self {
            lookup: LookupDetails::default(),
            max_rank: 30,
            layers: DataLayer::default(),
        }
    }
}

impl ReverseDetails {
    pub fn layer_enabled(&self, layer: DataLayer) -> bool {
        self.layers.intersects(layer)
    }
}

/// Parsing of request parameters given as strings.
pub trait FromParam: Sized {
    fn from_param(param: &str) -> Result<Self>;
}

fn parse_coordinates<const N: usize>(param: &str, what: &str) -> Result<[f64; N]> {
    let parts: Vec<&str> = param.split(',').collect();
    if parts.len() != N {
        return Err(MercatorError::usage(format!(
            "{what} parameter needs {} coordinates.",
            N
        )));
    }
    let mut out = [0.0; N];
    for (slot, part) in out.iter_mut().zip(parts) {
        *slot = part
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| MercatorError::usage(format!("{what} parameter needs to be numbers.")))?;
    }
    Ok(out)
}

impl FromParam for Point {
    /// Parse `"x,y"`.
    fn from_param(param: &str) -> Result<Self> {
        let [x, y] = parse_coordinates::<2>(param, "Point")?;
        if !(-180.0..=180.0).contains(&x) || !(-90.0..=90.0).contains(&y) {
            return Err(MercatorError::usage("Point coordinates invalid."));
        }
        Ok(Self::new(x, y))
    }
}

impl FromParam for Bbox {
    /// Parse `"x1,y1,x2,y2"`, clamping to the valid coordinate range.
    fn from_param(param: &str) -> Result<Self> {
        let [x1, y1, x2, y2] = parse_coordinates::<4>(param, "Bounding box")?;
        let (x1, x2) = (x1.clamp(-180.0, 180.0), x2.clamp(-180.0, 180.0));
        let (y1, y2) = (y1.clamp(-90.0, 90.0), y2.clamp(-90.0, 90.0));
        if x1 == x2 || y1 == y2 {
            return Err(MercatorError::usage("Bounding box with invalid parameters."));
        }
        Ok(Self::new(x1, y1, x2, y2))
    }
}

/// Comma-separated country codes. Anything that is not two letters is dropped.
pub fn parse_countries(param: &str) -> Vec<String> {
    param
        .split(',')
        .map(str::trim)
        .filter(|cc| cc.chars().count() == 2)
        .map(str::to_lowercase)
        .collect()
}

/// Comma-separated place ids; empty entries are ignored.
pub fn parse_excluded(param: &str) -> Result<Vec<PlaceId>> {
    let ids = param
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            if s.chars().all(|c| c.is_ascii_digit()) {
                s.parse::<PlaceId>()
                    .map_err(|_| MercatorError::usage("Parameter 'excluded' only takes place IDs."))
            } else {
                Err(MercatorError::usage("Parameter 'excluded' only takes place IDs."))
            }
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(if ids.is_empty() { vec![0] } else { ids })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layers() {
        let layers = DataLayer::ADDRESS | DataLayer::NATURAL;
        assert!(layers.intersects(DataLayer::NATURAL));
        assert!(!layers.intersects(DataLayer::POI));
        assert!((layers & DataLayer::POI).is_empty());
        assert!(DataLayer::all().contains(layers));
    }

    #[test]
    fn test_is_impossible() {
        let details = SearchDetails::default();
        assert!(!details.is_impossible());
        assert!(
            SearchDetails {
                min_rank: 20,
                max_rank: 10,
                ..SearchDetails::default()
            }
            .is_impossible()
        );
        assert!(
            SearchDetails {
                layers: Some(DataLayer::empty()),
                ..SearchDetails::default()
            }
            .is_impossible()
        );
        assert!(
            SearchDetails {
                max_rank: 4,
                layers: Some(DataLayer::POI),
                ..SearchDetails::default()
            }
            .is_impossible()
        );
        assert!(
            SearchDetails {
                viewbox: Some(Bbox::new(0.0, 0.0, 1.0, 1.0)),
                bounded_viewbox: true,
                near: Some(Point::new(0.5, 0.5)),
                ..SearchDetails::default()
            }
            .is_impossible()
        );
    }

    #[test]
    fn test_rank_restriction() {
        let details = SearchDetails {
            min_rank: 10,
            ..SearchDetails::default()
        }
        .restricted_to_ranks(4, 25);
        assert_eq!((details.min_rank, details.max_rank), (10, 25));
    }

    #[test]
    fn test_point_from_param() {
        let p = Point::from_param("13.4, 52.5").unwrap();
        assert_eq!(p, Point::new(13.4, 52.5));
        assert!(Point::from_param("13.4").is_err());
        assert!(Point::from_param("abc,1").is_err());
        assert!(Point::from_param("200,1").is_err());
        assert!(Point::from_param("inf,1").is_err());
    }

    #[test]
    fn test_bbox_from_param() {
        let b = Bbox::from_param("1,2,-190,0").unwrap();
        assert_eq!(b, Bbox::new(-180.0, 0.0, 1.0, 2.0));
        assert!(Bbox::from_param("1,1,1,2").is_err());
        assert!(Bbox::from_param("1,2,3").is_err());
    }

    #[test]
    fn test_parse_countries_and_excluded() {
        assert_eq!(parse_countries("DE, gb,usa,,f"), vec!["de", "gb"]);
        assert_eq!(parse_excluded("1, 2,,3").unwrap(), vec![1, 2, 3]);
        assert_eq!(parse_excluded("").unwrap(), vec![0]);
        assert!(matches!(
            parse_excluded("1,x"),
            Err(MercatorError::UsageError(_))
        ));
    }

    #[test]
    fn test_place_ref_housenumber() {
        let r = PlaceRef::Osm {
            osm_type: OsmType::Way,
            osm_id: 1,
            class: Some("12".into()),
        };
        assert_eq!(r.class_as_housenumber(), Some(12));
        assert_eq!(PlaceRef::osm(OsmType::Way, 1).class_as_housenumber(), None);
    }
}
