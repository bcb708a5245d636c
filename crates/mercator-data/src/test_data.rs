use chrono::DateTime;
use tracing::info;

use super::error::Result;
use crate::{
    database::{DatabaseBuilder, PlaceDatabase},
    geometry::{Bbox, Geometry, Point},
    rows::{
        Category, CountryGridRow, CountryNameRow, InterpolationRow, OsmType, PlaceId, PlaceRow,
        PostcodeRow, Tags,
    },
};

/// Configuration for fixture database generation
#[derive(Debug, Clone)]
pub struct TestDataConfig {
    /// Countries to include, any of `gb`, `de`, `us`
    pub countries: Vec<&'static str>,
    /// Whether address interpolation lines and TIGER ranges are added
    pub interpolations: bool,
    /// Whether the special phrases for pubs are registered
    pub special_phrases: bool,
}

impl Default for TestDataConfig {
    fn default() -> Self {
        Self::sample()
    }
}

impl TestDataConfig {
    /// London only, for unit tests
    pub fn minimal() -> Self {
        Self {
            countries: vec!["gb"],
            interpolations: true,
            special_phrases: true,
        }
    }

    /// London, Berlin and Springfield (US), for integration tests
    pub fn sample() -> Self {
        Self {
            countries: vec!["gb", "de", "us"],
            interpolations: true,
            special_phrases: true,
        }
    }
}

fn tags(pairs: &[(&str, &str)]) -> Tags {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect()
}

struct PlaceSpec<'a> {
    place_id: PlaceId,
    parent: Option<PlaceId>,
    osm: (OsmType, i64),
    category: (&'a str, &'a str),
    ranks: (u8, u8),
    names: &'a [(&'a str, &'a str)],
    country_code: &'a str,
    geometry: Geometry,
}

fn place(spec: PlaceSpec<'_>) -> PlaceRow {
    PlaceRow {
        place_id: spec.place_id,
        parent_place_id: spec.parent,
        linked_place_id: None,
        osm_type: spec.osm.0,
        osm_id: spec.osm.1,
        category: Category::new(spec.category.0, spec.category.1),
        admin_level: 15,
        name: tags(spec.names),
        address: Tags::new(),
        extratags: Tags::new(),
        housenumber: None,
        postcode: None,
        country_code: Some(spec.country_code.to_owned()),
        rank_search: spec.ranks.0,
        rank_address: spec.ranks.1,
        importance: None,
        wikipedia: None,
        indexed_date: DateTime::from_timestamp(1_704_067_200, 0),
        geometry: spec.geometry,
        centroid: None,
    }
}

fn country(
    place_id: PlaceId,
    osm_id: i64,
    code: &str,
    names: &[(&str, &str)],
    area: Bbox,
) -> (PlaceRow, CountryNameRow, CountryGridRow) {
    let mut row = place(PlaceSpec {
        place_id,
        parent: None,
        osm: (OsmType::Relation, osm_id),
        category: ("place", "country"),
        ranks: (4, 4),
        names,
        country_code: code,
        geometry: Geometry::rect(area),
    });
    row.admin_level = 2;
    row.importance = Some(0.9);
    (
        row,
        CountryNameRow {
            country_code: code.to_owned(),
            name: tags(names),
            derived_name: Tags::new(),
        },
        CountryGridRow {
            country_code: code.to_owned(),
            geometry: Geometry::rect(area),
        },
    )
}

fn add_country(
    builder: DatabaseBuilder,
    (row, name, grid): (PlaceRow, CountryNameRow, CountryGridRow),
) -> DatabaseBuilder {
    builder.place(row).country_name(name).country_grid(grid)
}

fn add_great_britain(mut builder: DatabaseBuilder, config: &TestDataConfig) -> Result<DatabaseBuilder> {
    builder = add_country(
        builder,
        country(
            1,
            62149,
            "gb",
            &[("name", "United Kingdom"), ("name:de", "Vereinigtes Königreich")],
            Bbox::new(-8.0, 49.9, 1.8, 58.7),
        ),
    );

    let mut london = place(PlaceSpec {
        place_id: 2,
        parent: Some(1),
        osm: (OsmType::Relation, 65606),
        category: ("boundary", "administrative"),
        ranks: (16, 16),
        names: &[("name", "London"), ("name:de", "London")],
        country_code: "gb",
        geometry: Geometry::rect(Bbox::new(-0.5, 51.3, 0.3, 51.7)),
    });
    london.admin_level = 6;
    london.importance = Some(0.75);
    london.wikipedia = Some("en:London".into());
    london.extratags = tags(&[("wikidata", "Q84")]);

    let downing = place(PlaceSpec {
        place_id: 3,
        parent: Some(2),
        osm: (OsmType::Way, 4244999),
        category: ("highway", "residential"),
        ranks: (26, 26),
        names: &[("name", "Downing Street")],
        country_code: "gb",
        geometry: Geometry::line(&[(-0.1290, 51.5032), (-0.1262, 51.5036)])?,
    });

    let mut number_ten = place(PlaceSpec {
        place_id: 4,
        parent: Some(3),
        osm: (OsmType::Way, 1879842),
        category: ("building", "yes"),
        ranks: (30, 30),
        names: &[],
        country_code: "gb",
        geometry: Geometry::point(Point::new(-0.12757, 51.50344)),
    });
    number_ten.housenumber = Some("10".into());
    number_ten.postcode = Some("SW1A 2AA".into());
    number_ten.address = tags(&[("housenumber", "10"), ("street", "Downing Street")]);

    let whitehall = place(PlaceSpec {
        place_id: 5,
        parent: Some(2),
        osm: (OsmType::Way, 4253208),
        category: ("highway", "primary"),
        ranks: (26, 26),
        names: &[("name", "Whitehall")],
        country_code: "gb",
        geometry: Geometry::line(&[(-0.1264, 51.5030), (-0.1262, 51.5060)])?,
    });

    let red_lion = place(PlaceSpec {
        place_id: 6,
        parent: Some(5),
        osm: (OsmType::Node, 25386012),
        category: ("amenity", "pub"),
        ranks: (30, 30),
        names: &[("name", "Red Lion")],
        country_code: "gb",
        geometry: Geometry::point(Point::new(-0.1250, 51.5050)),
    });

    let serpentine = place(PlaceSpec {
        place_id: 7,
        parent: Some(2),
        osm: (OsmType::Way, 2866001),
        category: ("natural", "water"),
        ranks: (22, 0),
        names: &[("name", "The Serpentine")],
        country_code: "gb",
        geometry: Geometry::rect(Bbox::new(-0.1760, 51.5030, -0.1610, 51.5070)),
    });

    let railway = place(PlaceSpec {
        place_id: 8,
        parent: Some(2),
        osm: (OsmType::Way, 5001),
        category: ("railway", "rail"),
        ranks: (26, 0),
        names: &[("name", "West Coast Main Line")],
        country_code: "gb",
        geometry: Geometry::line(&[(-0.2000, 51.5300), (-0.1400, 51.5280)])?,
    });

    let westminster = place(PlaceSpec {
        place_id: 9,
        parent: Some(2),
        osm: (OsmType::Node, 2011),
        category: ("place", "suburb"),
        ranks: (20, 20),
        names: &[("name", "Westminster")],
        country_code: "gb",
        geometry: Geometry::point(Point::new(-0.1357, 51.4975)),
    });

    builder = builder
        .place(london)
        .place(downing)
        .place(number_ten)
        .place(whitehall)
        .place(red_lion)
        .place(serpentine)
        .place(railway)
        .place(westminster)
        .postcode(PostcodeRow {
            place_id: 200,
            parent_place_id: Some(3),
            postcode: "SW1A 2AA".into(),
            country_code: "gb".into(),
            rank_search: 25,
            rank_address: 25,
            geometry: Geometry::point(Point::new(-0.1276, 51.5034)),
        });

    if config.interpolations {
        builder = builder.interpolation(InterpolationRow {
            place_id: 100,
            parent_place_id: Some(5),
            osm_id: 9001,
            startnumber: 1,
            endnumber: 21,
            step: 2,
            address: Tags::new(),
            postcode: Some("SW1A 2NP".into()),
            country_code: Some("gb".into()),
            linegeo: Geometry::line(&[(-0.12645, 51.5031), (-0.12625, 51.5059)])?,
        });
    }
    Ok(builder)
}

fn add_germany(mut builder: DatabaseBuilder, config: &TestDataConfig) -> Result<DatabaseBuilder> {
    builder = add_country(
        builder,
        country(
            10,
            51477,
            "de",
            &[("name", "Deutschland"), ("name:en", "Germany")],
            Bbox::new(5.9, 47.3, 15.0, 55.1),
        ),
    );
    let mut berlin = place(PlaceSpec {
        place_id: 11,
        parent: Some(10),
        osm: (OsmType::Relation, 62422),
        category: ("boundary", "administrative"),
        ranks: (16, 16),
        names: &[("name", "Berlin")],
        country_code: "de",
        geometry: Geometry::rect(Bbox::new(13.08, 52.33, 13.76, 52.68)),
    });
    berlin.importance = Some(0.75);
    berlin.admin_level = 4;

    let linden = place(PlaceSpec {
        place_id: 12,
        parent: Some(11),
        osm: (OsmType::Way, 4062078),
        category: ("highway", "primary"),
        ranks: (26, 26),
        names: &[("name", "Unter den Linden")],
        country_code: "de",
        geometry: Geometry::line(&[(13.3770, 52.5163), (13.3980, 52.5173)])?,
    });

    // Right next to Unter den Linden, with an interpolation a little further south.
    let mut house = place(PlaceSpec {
        place_id: 13,
        parent: Some(12),
        osm: (OsmType::Node, 4062101),
        category: ("building", "yes"),
        ranks: (30, 30),
        names: &[],
        country_code: "de",
        geometry: Geometry::point(Point::new(13.3880, 52.516924)),
    });
    house.housenumber = Some("5".into());
    house.address = tags(&[("housenumber", "5"), ("street", "Unter den Linden")]);

    builder = builder
        .place(berlin)
        .place(linden)
        .place(house)
        .postcode(PostcodeRow {
            place_id: 201,
            parent_place_id: Some(11),
            postcode: "10117".into(),
            country_code: "de".into(),
            rank_search: 21,
            rank_address: 21,
            geometry: Geometry::point(Point::new(13.3900, 52.5170)),
        });

    if config.interpolations {
        builder = builder
            .interpolation(InterpolationRow {
                place_id: 110,
                parent_place_id: Some(12),
                osm_id: 9101,
                startnumber: 2,
                endnumber: 20,
                step: 2,
                address: Tags::new(),
                postcode: Some("10117".into()),
                country_code: Some("de".into()),
                linegeo: Geometry::line(&[(13.3875, 52.51592), (13.3885, 52.51592)])?,
            })
            // More than a street search radius away from any street.
            .interpolation(InterpolationRow {
                place_id: 111,
                parent_place_id: Some(12),
                osm_id: 9102,
                startnumber: 1,
                endnumber: 41,
                step: 2,
                address: Tags::new(),
                postcode: Some("10117".into()),
                country_code: Some("de".into()),
                linegeo: Geometry::line(&[(13.3800, 52.5000), (13.3900, 52.5000)])?,
            });
    }
    Ok(builder)
}

fn add_united_states(mut builder: DatabaseBuilder, config: &TestDataConfig) -> Result<DatabaseBuilder> {
    builder = add_country(
        builder,
        country(
            20,
            148838,
            "us",
            &[("name", "United States"), ("short_name", "USA")],
            Bbox::new(-125.0, 24.0, -66.0, 49.5),
        ),
    );
    let mut springfield = place(PlaceSpec {
        place_id: 21,
        parent: Some(20),
        osm: (OsmType::Relation, 123534),
        category: ("boundary", "administrative"),
        ranks: (16, 16),
        names: &[("name", "Springfield")],
        country_code: "us",
        geometry: Geometry::rect(Bbox::new(-89.75, 39.7, -89.55, 39.9)),
    });
    springfield.importance = Some(0.4);

    let main_street = place(PlaceSpec {
        place_id: 22,
        parent: Some(21),
        osm: (OsmType::Way, 15001),
        category: ("highway", "residential"),
        ranks: (26, 26),
        names: &[("name", "Main Street")],
        country_code: "us",
        geometry: Geometry::line(&[(-89.66, 39.80), (-89.64, 39.80)])?,
    });

    let chatham = place(PlaceSpec {
        place_id: 23,
        parent: Some(20),
        osm: (OsmType::Node, 151234),
        category: ("place", "village"),
        ranks: (19, 19),
        names: &[("name", "Chatham")],
        country_code: "us",
        geometry: Geometry::point(Point::new(-89.70, 39.67)),
    });

    builder = builder.place(springfield).place(main_street).place(chatham);
    if config.interpolations {
        builder = builder.tiger(InterpolationRow {
            place_id: 300,
            parent_place_id: Some(22),
            osm_id: 0,
            startnumber: 100,
            endnumber: 198,
            step: 2,
            address: Tags::new(),
            postcode: Some("62701".into()),
            country_code: Some("us".into()),
            linegeo: Geometry::line(&[(-89.6599, 39.8001), (-89.6401, 39.8001)])?,
        });
    }
    Ok(builder)
}

/// Build a fixture database according to `config`.
pub fn create_test_database(config: &TestDataConfig) -> Result<PlaceDatabase> {
    info!("Creating test database with config: {:?}", config);

    let mut builder = DatabaseBuilder::new();
    for code in &config.countries {
        builder = match *code {
            "gb" => add_great_britain(builder, config)?,
            "de" => add_germany(builder, config)?,
            "us" => add_united_states(builder, config)?,
            _ => builder,
        };
    }
    if config.special_phrases {
        let pub_category = Category::new("amenity", "pub");
        builder = builder
            .special_phrase("pub", pub_category.clone(), "-")
            .special_phrase("pubs", pub_category.clone(), "-")
            .special_phrase("pubs near", pub_category.clone(), "near")
            .special_phrase("pub in", pub_category, "in");
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_has_only_britain() {
        let db = create_test_database(&TestDataConfig::minimal()).unwrap();
        assert!(db.country_name("gb").is_some());
        assert!(db.country_name("de").is_none());
        assert!(!db.interpolations().is_empty());
        assert!(db.tiger().is_empty());
    }

    #[test]
    fn test_sample_has_all_countries() {
        let db = create_test_database(&TestDataConfig::sample()).unwrap();
        for code in ["gb", "de", "us"] {
            assert!(db.country_name(code).is_some(), "missing {code}");
        }
        assert_eq!(db.tiger().len(), 1);
        assert!(db.words_by_token("pubs near").count() == 1);
    }
}
