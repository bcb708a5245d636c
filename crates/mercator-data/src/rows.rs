//! Row types of the place tables.
//!
//! These mirror what an import pipeline writes: the main place table, address
//! interpolation lines (OSM and TIGER), postcodes, country names and the country grid,
//! the word table and the precomputed address hierarchy.

use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geometry::{Geometry, Point};

pub type PlaceId = i64;
pub type TokenId = i64;
pub type Tags = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OsmType {
    #[serde(rename = "N")]
    Node,
    #[serde(rename = "W")]
    Way,
    #[serde(rename = "R")]
    Relation,
}

impl OsmType {
    pub const fn as_char(self) -> char {
        match self {
            Self::Node => 'N',
            Self::Way => 'W',
            Self::Relation => 'R',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'N' => Some(Self::Node),
            'W' => Some(Self::Way),
            'R' => Some(Self::Relation),
            _ => None,
        }
    }
}

impl fmt::Display for OsmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Main OSM key/value classification of a place, e.g. `amenity=pub`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Category {
    pub class: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl Category {
    pub fn new(class: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            kind: kind.into(),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.class, self.kind)
    }
}

const fn default_admin_level() -> u8 {
    15
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceRow {
    pub place_id: PlaceId,
    #[serde(default)]
    pub parent_place_id: Option<PlaceId>,
    #[serde(default)]
    pub linked_place_id: Option<PlaceId>,
    pub osm_type: OsmType,
    pub osm_id: i64,
    pub category: Category,
    #[serde(default = "default_admin_level")]
    pub admin_level: u8,
    #[serde(default)]
    pub name: Tags,
    #[serde(default)]
    pub address: Tags,
    #[serde(default)]
    pub extratags: Tags,
    #[serde(default)]
    pub housenumber: Option<String>,
    #[serde(default)]
    pub postcode: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
    pub rank_search: u8,
    pub rank_address: u8,
    #[serde(default)]
    pub importance: Option<f64>,
    #[serde(default)]
    pub wikipedia: Option<String>,
    #[serde(default)]
    pub indexed_date: Option<DateTime<Utc>>,
    pub geometry: Geometry,
    #[serde(default)]
    pub centroid: Option<Point>,
}

impl PlaceRow {
    pub fn centroid(&self) -> Point {
        self.centroid.unwrap_or_else(|| self.geometry.centroid())
    }

    pub fn is_named(&self) -> bool {
        !self.name.is_empty()
    }

    pub const fn is_linked(&self) -> bool {
        self.linked_place_id.is_some()
    }

    /// A rank-30 object that carries a house number or house name.
    pub fn is_address_point(&self) -> bool {
        self.rank_address == 30
            && (self.housenumber.is_some() || self.name.contains_key("addr:housename"))
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.category.class == class
    }
}

/// An address interpolation line. The same shape serves OSM interpolations and TIGER
/// house number ranges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterpolationRow {
    pub place_id: PlaceId,
    #[serde(default)]
    pub parent_place_id: Option<PlaceId>,
    #[serde(default)]
    pub osm_id: i64,
    pub startnumber: u32,
    pub endnumber: u32,
    pub step: u32,
    #[serde(default)]
    pub address: Tags,
    #[serde(default)]
    pub postcode: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
    pub linegeo: Geometry,
}

impl InterpolationRow {
    /// Whether `number` lies on the range and on its step grid.
    pub fn covers(&self, number: u32) -> bool {
        number >= self.startnumber
            && number <= self.endnumber
            && (number - self.startnumber) % self.step.max(1) == 0
    }

    /// Position of house `number` along the line.
    pub fn house_position(&self, number: u32) -> Point {
        if self.endnumber == self.startnumber {
            return self.linegeo.centroid();
        }
        let fraction = (f64::from(number) - f64::from(self.startnumber))
            / (f64::from(self.endnumber) - f64::from(self.startnumber));
        self.linegeo
            .line_interpolate_point(fraction)
            .unwrap_or_else(|| self.linegeo.centroid())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostcodeRow {
    pub place_id: PlaceId,
    #[serde(default)]
    pub parent_place_id: Option<PlaceId>,
    pub postcode: String,
    pub country_code: String,
    pub rank_search: u8,
    #[serde(default)]
    pub rank_address: u8,
    pub geometry: Geometry,
}

impl PostcodeRow {
    pub fn centroid(&self) -> Point {
        self.geometry.centroid()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountryNameRow {
    pub country_code: String,
    #[serde(default)]
    pub name: Tags,
    #[serde(default)]
    pub derived_name: Tags,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountryGridRow {
    pub country_code: String,
    pub geometry: Geometry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WordKind {
    #[serde(rename = "W")]
    FullWord,
    #[serde(rename = "w")]
    PartialWord,
    #[serde(rename = "H")]
    HouseNumber,
    #[serde(rename = "P")]
    Postcode,
    #[serde(rename = "C")]
    Country,
    #[serde(rename = "S")]
    Special,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WordInfo {
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub addr_count: Option<u64>,
    #[serde(default)]
    pub lookup: Option<String>,
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub op: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordRow {
    pub word_id: TokenId,
    pub word_token: String,
    #[serde(rename = "type")]
    pub kind: WordKind,
    #[serde(default)]
    pub word: Option<String>,
    #[serde(default)]
    pub info: WordInfo,
}

/// Precomputed token vectors of a searchable place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchNameRow {
    pub place_id: PlaceId,
    pub name_vector: Vec<TokenId>,
    pub nameaddress_vector: Vec<TokenId>,
}

impl SearchNameRow {
    pub fn name_contains_all(&self, tokens: &[TokenId]) -> bool {
        tokens.iter().all(|t| self.name_vector.contains(t))
    }

    pub fn address_contains_all(&self, tokens: &[TokenId]) -> bool {
        tokens.iter().all(|t| self.nameaddress_vector.contains(t))
    }
}

/// One entry of the address hierarchy of a place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressLineRow {
    pub place_id: PlaceId,
    pub address_place_id: PlaceId,
    pub isaddress: bool,
    pub distance: f64,
    pub fromarea: bool,
    pub cached_rank_address: u8,
}
