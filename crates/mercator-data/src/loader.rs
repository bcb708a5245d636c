//! Load a place database from a JSON dump.
//!
//! The dump is one JSON object holding the raw tables. Geometries are GeoJSON geometry
//! objects; derived tables (words, search vectors, address lines) are rebuilt on load.

use std::path::Path;

use serde::Deserialize;
use tracing::{info, instrument};

use crate::{
    database::{DatabaseBuilder, PlaceDatabase},
    error::Result,
    rows::{Category, CountryGridRow, CountryNameRow, InterpolationRow, PlaceRow, PostcodeRow},
};

#[derive(Debug, Deserialize)]
struct SpecialPhraseEntry {
    label: String,
    class: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default = "default_operator")]
    op: String,
}

fn default_operator() -> String {
    "-".to_owned()
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PlaceDump {
    places: Vec<PlaceRow>,
    interpolations: Vec<InterpolationRow>,
    tiger: Vec<InterpolationRow>,
    postcodes: Vec<PostcodeRow>,
    country_names: Vec<CountryNameRow>,
    country_grid: Vec<CountryGridRow>,
    special_phrases: Vec<SpecialPhraseEntry>,
}

impl PlaceDump {
    fn into_builder(self) -> DatabaseBuilder {
        let builder = self
            .places
            .into_iter()
            .fold(DatabaseBuilder::new(), DatabaseBuilder::place);
        let builder = self
            .interpolations
            .into_iter()
            .fold(builder, DatabaseBuilder::interpolation);
        let builder = self.tiger.into_iter().fold(builder, DatabaseBuilder::tiger);
        let builder = self
            .postcodes
            .into_iter()
            .fold(builder, DatabaseBuilder::postcode);
        let builder = self
            .country_names
            .into_iter()
            .fold(builder, DatabaseBuilder::country_name);
        let builder = self
            .country_grid
            .into_iter()
            .fold(builder, DatabaseBuilder::country_grid);
        self.special_phrases.into_iter().fold(builder, |b, p| {
            b.special_phrase(&p.label, Category::new(p.class, p.kind), &p.op)
        })
    }
}

/// Parse a JSON dump and build the database.
pub fn load_from_str(json: &str) -> Result<PlaceDatabase> {
    let dump: PlaceDump = serde_json::from_str(json)?;
    info!(places = dump.places.len(), "Parsed place dump");
    dump.into_builder().build()
}

/// Read a JSON dump from disk and build the database.
#[instrument(name = "Load place dump", level = "info", skip_all, fields(path = ?path.as_ref()))]
pub async fn load_from_path(path: impl AsRef<Path>) -> Result<PlaceDatabase> {
    let json = tokio::fs::read_to_string(path.as_ref()).await?;
    load_from_str(&json)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;
    use crate::{error::DataError, rows::WordKind};

    const DUMP: &str = r#"{
        "places": [
            {"place_id": 1, "osm_type": "R", "osm_id": 7,
             "category": {"class": "place", "type": "country"},
             "name": {"name": "Freedonia"}, "country_code": "fd",
             "rank_search": 4, "rank_address": 4,
             "geometry": {"type": "Polygon", "coordinates": [[[0,0],[10,0],[10,10],[0,10],[0,0]]]}},
            {"place_id": 2, "parent_place_id": 1, "osm_type": "N", "osm_id": 8,
             "category": {"class": "place", "type": "town"},
             "name": {"name": "Marxville"}, "country_code": "fd",
             "rank_search": 18, "rank_address": 16,
             "geometry": {"type": "Point", "coordinates": [5, 5]}}
        ],
        "country_names": [{"country_code": "fd", "name": {"name": "Freedonia"}}],
        "country_grid": [{"country_code": "fd",
            "geometry": {"type": "Polygon", "coordinates": [[[0,0],[10,0],[10,10],[0,10],[0,0]]]}}],
        "special_phrases": [{"label": "town", "class": "place", "type": "town"}]
    }"#;

    #[test]
    fn test_load_from_str() {
        let db = load_from_str(DUMP).unwrap();
        assert_eq!(db.places().len(), 2);
        assert!(db.words_by_token("marxville").any(|w| w.kind == WordKind::FullWord));
        assert!(db.words_by_token("freedonia").any(|w| w.kind == WordKind::Country));
        assert!(db.words_by_token("town").any(|w| w.kind == WordKind::Special));
        assert_eq!(db.address_lines(2).len(), 1);
    }

    #[test]
    fn test_unknown_parent_is_rejected() {
        let broken = DUMP.replace("\"parent_place_id\": 1", "\"parent_place_id\": 99");
        assert!(matches!(
            load_from_str(&broken),
            Err(DataError::UnknownParent {
                place_id: 2,
                parent_place_id: 99
            })
        ));
    }

    #[tokio::test]
    async fn test_load_from_path() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(DUMP.as_bytes()).unwrap();
        file.flush().unwrap();
        let db = load_from_path(file.path()).await.unwrap();
        assert!(db.place(2).is_some());
        assert!(load_from_path("/nonexistent/dump.json").await.is_err());
    }
}
