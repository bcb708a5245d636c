//! Result types shared by forward search, reverse lookup and place lookup, and the
//! enrichment step that attaches address, linked places, keywords and localized names.

use std::{collections::BTreeMap, fmt, sync::Arc};

use chrono::{DateTime, Utc};
use itertools::Itertools;
use mercator_data::{
    AddressLineRow, Bbox, Category, CountryNameRow, InterpolationRow, OsmType, PlaceId, PlaceRow,
    Point, PostcodeRow, Tags, WordRow,
};
use tracing::{debug, instrument};

use crate::{
    connection::{PlaceCondition, PlaceFilter, Result, SearchConnection},
    localization::Locales,
    trace::SearchTrace,
    types::LookupDetails,
};

/// Table a result was taken from.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceTable {
    Placex,
    Osmline,
    Tiger,
    Postcode,
    Country,
}

impl fmt::Display for SourceTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Placex => "placex",
            Self::Osmline => "osmline",
            Self::Tiger => "tiger",
            Self::Postcode => "postcode",
            Self::Country => "country",
        };
        f.write_str(name)
    }
}

/// One line of an address, or a linked or child place.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct AddressLine {
    pub place_id: Option<PlaceId>,
    pub osm_object: Option<(OsmType, i64)>,
    pub category: Category,
    pub names: Tags,
    pub extratags: Tags,
    pub admin_level: u8,
    /// The place contains the result's location.
    pub fromarea: bool,
    /// The line is part of the displayed address.
    pub isaddress: bool,
    pub rank_address: u8,
    pub distance: f64,
    pub local_name: Option<String>,
}

impl AddressLine {
    fn from_place(row: &PlaceRow, isaddress: bool) -> Self {
        Self {
            place_id: Some(row.place_id),
            osm_object: Some((row.osm_type, row.osm_id)),
            category: row.category.clone(),
            names: row.name.clone(),
            extratags: row.extratags.clone(),
            admin_level: row.admin_level,
            fromarea: row.geometry.is_area(),
            isaddress,
            rank_address: row.rank_address,
            distance: 0.0,
            local_name: None,
        }
    }

    fn from_line_row(line: &AddressLineRow, row: &PlaceRow) -> Self {
        Self {
            fromarea: line.fromarea,
            rank_address: line.cached_rank_address,
            distance: line.distance,
            ..Self::from_place(row, line.isaddress)
        }
    }

    fn synthetic(category: Category, names: Tags, rank_address: u8) -> Self {
        Self {
            place_id: None,
            osm_object: None,
            category,
            names,
            extratags: Tags::new(),
            admin_level: 15,
            fromarea: false,
            isaddress: true,
            rank_address,
            distance: 0.0,
            local_name: None,
        }
    }
}

fn single_tag(key: &str, value: &str) -> Tags {
    BTreeMap::from([(key.to_owned(), value.to_owned())])
}

/// Data common to all kinds of results.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct BaseResult {
    pub source_table: SourceTable,
    pub category: Category,
    pub centroid: Point,
    pub place_id: Option<PlaceId>,
    pub parent_place_id: Option<PlaceId>,
    pub linked_place_id: Option<PlaceId>,
    pub osm_object: Option<(OsmType, i64)>,
    pub admin_level: u8,
    pub locale_name: Option<String>,
    pub display_name: Option<String>,
    pub names: Tags,
    pub address: Tags,
    pub extratags: Tags,
    pub housenumber: Option<String>,
    pub postcode: Option<String>,
    pub wikipedia: Option<String>,
    pub rank_address: u8,
    pub rank_search: u8,
    pub importance: Option<f64>,
    pub country_code: Option<String>,
    pub indexed_date: Option<DateTime<Utc>>,
    pub address_rows: Option<Vec<AddressLine>>,
    pub linked_rows: Option<Vec<AddressLine>>,
    pub parented_rows: Option<Vec<AddressLine>>,
    pub name_keywords: Option<Vec<WordRow>>,
    pub address_keywords: Option<Vec<WordRow>>,
}

impl BaseResult {
    fn empty(source_table: SourceTable, category: Category, centroid: Point) -> Self {
        Self {
            source_table,
            category,
            centroid,
            place_id: None,
            parent_place_id: None,
            linked_place_id: None,
            osm_object: None,
            admin_level: 15,
            locale_name: None,
            display_name: None,
            names: Tags::new(),
            address: Tags::new(),
            extratags: Tags::new(),
            housenumber: None,
            postcode: None,
            wikipedia: None,
            rank_address: 30,
            rank_search: 30,
            importance: None,
            country_code: None,
            indexed_date: None,
            address_rows: None,
            linked_rows: None,
            parented_rows: None,
            name_keywords: None,
            address_keywords: None,
        }
    }

    pub fn from_place(row: &PlaceRow) -> Self {
        Self {
            place_id: Some(row.place_id),
            parent_place_id: row.parent_place_id,
            linked_place_id: row.linked_place_id,
            osm_object: Some((row.osm_type, row.osm_id)),
            admin_level: row.admin_level,
            names: row.name.clone(),
            address: row.address.clone(),
            extratags: row.extratags.clone(),
            housenumber: row.housenumber.clone(),
            postcode: row.postcode.clone(),
            wikipedia: row.wikipedia.clone(),
            rank_address: row.rank_address,
            rank_search: row.rank_search,
            importance: row.importance,
            country_code: row.country_code.clone(),
            indexed_date: row.indexed_date,
            ..Self::empty(SourceTable::Placex, row.category.clone(), row.centroid())
        }
    }

    /// A house on an interpolation line, or the whole line when `housenumber` is `None`.
    fn from_line(
        source_table: SourceTable,
        row: &InterpolationRow,
        housenumber: Option<u32>,
        centroid: Point,
    ) -> Self {
        let (category, extratags) = match housenumber {
            Some(_) => (Category::new("place", "house"), Tags::new()),
            None => (
                Category::new("place", "houses"),
                BTreeMap::from([
                    ("startnumber".to_owned(), row.startnumber.to_string()),
                    ("endnumber".to_owned(), row.endnumber.to_string()),
                    ("step".to_owned(), row.step.to_string()),
                ]),
            ),
        };
        Self {
            place_id: Some(row.place_id),
            parent_place_id: row.parent_place_id,
            address: row.address.clone(),
            extratags,
            housenumber: housenumber.map(|n| n.to_string()),
            postcode: row.postcode.clone(),
            country_code: row.country_code.clone(),
            ..Self::empty(source_table, category, centroid)
        }
    }

    pub fn from_interpolation(row: &InterpolationRow, housenumber: Option<u32>, centroid: Point) -> Self {
        Self {
            osm_object: Some((OsmType::Way, row.osm_id)),
            ..Self::from_line(SourceTable::Osmline, row, housenumber, centroid)
        }
    }

    /// A TIGER house. TIGER lines have no OSM id of their own, the street's is used.
    pub fn from_tiger(
        row: &InterpolationRow,
        housenumber: Option<u32>,
        centroid: Point,
        street_osm: Option<(OsmType, i64)>,
    ) -> Self {
        Self {
            osm_object: street_osm,
            country_code: Some("us".to_owned()),
            ..Self::from_line(SourceTable::Tiger, row, housenumber, centroid)
        }
    }

    pub fn from_postcode(row: &PostcodeRow) -> Self {
        Self {
            place_id: Some(row.place_id),
            parent_place_id: row.parent_place_id,
            names: single_tag("ref", &row.postcode),
            postcode: Some(row.postcode.clone()),
            rank_search: row.rank_search,
            rank_address: row.rank_address,
            country_code: Some(row.country_code.clone()),
            ..Self::empty(
                SourceTable::Postcode,
                Category::new("place", "postcode"),
                row.centroid(),
            )
        }
    }

    /// Country without a place record, from the country name table.
    pub fn from_country(row: &CountryNameRow, centroid: Point) -> Self {
        let mut names = row.derived_name.clone();
        names.extend(row.name.clone());
        Self {
            names,
            rank_search: 4,
            rank_address: 4,
            country_code: Some(row.country_code.clone()),
            ..Self::empty(
                SourceTable::Country,
                Category::new("place", "country"),
                centroid,
            )
        }
    }

    /// Importance of the place, estimated from the search rank when unknown. Searches
    /// around a point store the negated distance here.
    pub fn calculated_importance(&self) -> f64 {
        self.importance
            .filter(|i| *i != 0.0)
            .unwrap_or(0.7500001 - f64::from(self.rank_search) / 40.0)
    }

    /// Short description for traces and logs.
    pub fn label(&self) -> String {
        let name = self
            .display_name
            .as_deref()
            .or(self.locale_name.as_deref())
            .or_else(|| self.names.values().next().map(String::as_str))
            .unwrap_or("");
        format!(
            "{} {}({}) {} {}",
            self.source_table,
            self.place_id.unwrap_or_default(),
            self.category,
            name,
            self.housenumber.as_deref().unwrap_or("")
        )
    }

    /// Fill `locale_name`, the local names of the address lines and `display_name`.
    pub fn localize(&mut self, locales: &Locales) {
        let locale_name = locales.display_name(&self.names);
        self.locale_name = (!locale_name.is_empty()).then_some(locale_name);

        if let Some(rows) = &mut self.address_rows {
            for line in rows.iter_mut() {
                let name = locales.display_name(&line.names);
                line.local_name = (!name.is_empty()).then_some(name);
            }
            let parts: Vec<&str> = rows
                .iter()
                .filter(|line| line.isaddress)
                .filter_map(|line| line.local_name.as_deref())
                .dedup()
                .collect();
            if !parts.is_empty() {
                self.display_name = Some(parts.join(", "));
                return;
            }
        }
        self.display_name = self.locale_name.clone();
    }
}

/// Access to the common part of a result.
pub trait PlaceResult {
    fn base(&self) -> &BaseResult;
    fn base_mut(&mut self) -> &mut BaseResult;
}

/// A forward search result.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub base: BaseResult,
    /// Penalty of the match, lower is better.
    pub accuracy: f64,
    pub bbox: Option<Bbox>,
}

impl SearchResult {
    pub fn new(base: BaseResult, accuracy: f64) -> Self {
        Self {
            base,
            accuracy,
            bbox: None,
        }
    }

    /// Final sort key: accuracy adjusted by importance.
    pub fn ranking(&self) -> f64 {
        self.accuracy - self.base.calculated_importance()
    }

    /// Key under which duplicate results are merged.
    pub fn dedup_key(&self) -> (SourceTable, Option<PlaceId>, Option<String>, Option<String>) {
        (
            self.base.source_table,
            self.base.place_id,
            self.base.housenumber.clone(),
            self.base.country_code.clone(),
        )
    }
}

impl PlaceResult for SearchResult {
    fn base(&self) -> &BaseResult {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseResult {
        &mut self.base
    }
}

/// A reverse lookup result.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct ReverseResult {
    pub base: BaseResult,
    /// Distance of the object to the query point in degrees.
    pub distance: f64,
    pub bbox: Option<Bbox>,
}

impl PlaceResult for ReverseResult {
    fn base(&self) -> &BaseResult {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseResult {
        &mut self.base
    }
}

/// Result of a details lookup.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct DetailedResult {
    pub base: BaseResult,
    pub bbox: Option<Bbox>,
}

impl DetailedResult {
    pub fn parent_place_id(&self) -> Option<PlaceId> {
        self.base.parent_place_id
    }

    pub fn linked_place_id(&self) -> Option<PlaceId> {
        self.base.linked_place_id
    }

    pub fn admin_level(&self) -> u8 {
        self.base.admin_level
    }

    pub fn indexed_date(&self) -> Option<DateTime<Utc>> {
        self.base.indexed_date
    }
}

impl PlaceResult for DetailedResult {
    fn base(&self) -> &BaseResult {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseResult {
        &mut self.base
    }
}

/// Attach the details requested in `details` to every result and localize it.
#[instrument(name = "Add result details", level = "debug", skip_all, fields(results = results.len()))]
pub async fn add_result_details<C, T>(
    conn: &C,
    results: &mut [T],
    details: &LookupDetails,
    trace: &dyn SearchTrace,
) -> Result<()>
where
    C: SearchConnection + ?Sized,
    T: PlaceResult + Send,
{
    if results.is_empty() {
        return Ok(());
    }
    trace.section("Query details for results");
    for result in results.iter_mut() {
        let base = result.base_mut();
        if details.address_details {
            base.address_rows = Some(complete_address(conn, base).await?);
        }
        if let Some(place_id) = base.place_id.filter(|_| base.source_table == SourceTable::Placex) {
            if details.linked_places {
                base.linked_rows = Some(
                    related_places(conn, PlaceFilter::new().with(PlaceCondition::LinkedTo(place_id)))
                        .await?,
                );
            }
            if details.parented_places {
                base.parented_rows = Some(
                    related_places(
                        conn,
                        PlaceFilter::new()
                            .with(PlaceCondition::Parents(vec![place_id]))
                            .with(PlaceCondition::RankSearch(30, 30)),
                    )
                    .await?,
                );
            }
            if details.keywords
                && let Some(vectors) = conn.search_vectors(place_id).await?
            {
                base.name_keywords = Some(conn.words_by_id(&vectors.name_vector).await?);
                base.address_keywords = Some(conn.words_by_id(&vectors.nameaddress_vector).await?);
            }
        }
        base.localize(&details.locales);
        debug!(result = %base.label(), "Details added");
    }
    Ok(())
}

async fn related_places<C>(conn: &C, filter: PlaceFilter) -> Result<Vec<AddressLine>>
where
    C: SearchConnection + ?Sized,
{
    Ok(conn
        .places(&filter)
        .await?
        .iter()
        .map(|row| AddressLine::from_place(row, false))
        .collect())
}

/// Address of a result, the result itself first, then by falling address rank.
async fn complete_address<C>(conn: &C, base: &BaseResult) -> Result<Vec<AddressLine>>
where
    C: SearchConnection + ?Sized,
{
    let mut own_names = base.names.clone();
    if own_names.is_empty()
        && let Some(hnr) = &base.housenumber
    {
        own_names = single_tag("ref", hnr);
    }
    let mut lines = vec![AddressLine {
        place_id: base.place_id,
        osm_object: base.osm_object,
        extratags: base.extratags.clone(),
        admin_level: base.admin_level,
        ..AddressLine::synthetic(base.category.clone(), own_names, base.rank_address)
    }];

    // Results outside the place table hang their address off the parent place.
    let anchor = match base.source_table {
        SourceTable::Placex => base.place_id,
        SourceTable::Country => None,
        _ => {
            if let Some(parent_id) = base.parent_place_id {
                let parents = conn
                    .places(&PlaceFilter::new().with(PlaceCondition::Ids(vec![parent_id])))
                    .await?;
                if let Some(parent) = parents.first() {
                    lines.push(AddressLine::from_place(parent, parent.rank_address > 0));
                }
            }
            base.parent_place_id
        }
    };

    if let Some(anchor) = anchor {
        let address_lines = conn.address_lines(anchor).await?;
        let ids: Vec<PlaceId> = address_lines.iter().map(|l| l.address_place_id).collect();
        let places: BTreeMap<PlaceId, Arc<PlaceRow>> = if ids.is_empty() {
            BTreeMap::new()
        } else {
            conn.places(&PlaceFilter::new().with(PlaceCondition::Ids(ids)))
                .await?
                .into_iter()
                .map(|p| (p.place_id, p))
                .collect()
        };
        for line in &address_lines {
            if let Some(row) = places.get(&line.address_place_id)
                && lines.iter().all(|l| l.place_id != Some(row.place_id))
            {
                lines.push(AddressLine::from_line_row(line, row));
            }
        }
    }

    if let Some(postcode) = &base.postcode
        && base.source_table != SourceTable::Postcode
        && !lines.iter().any(|l| l.category.kind == "postcode")
    {
        lines.push(AddressLine::synthetic(
            Category::new("place", "postcode"),
            single_tag("ref", postcode),
            5,
        ));
    }

    lines[1..].sort_by(|a, b| {
        b.rank_address
            .cmp(&a.rank_address)
            .then_with(|| b.isaddress.cmp(&a.isaddress))
    });
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use mercator_data::{TestDataConfig, create_test_database};

    use super::*;
    use crate::{connection::MemoryConnection, trace::NoopTrace};

    fn connection() -> MemoryConnection {
        MemoryConnection::from(create_test_database(&TestDataConfig::minimal()).unwrap())
    }

    fn place(conn: &MemoryConnection, place_id: PlaceId) -> Arc<PlaceRow> {
        conn.database().place(place_id).cloned().unwrap()
    }

    #[test]
    fn test_calculated_importance() {
        let conn = connection();
        let street = BaseResult::from_place(&place(&conn, 3));
        assert!((street.calculated_importance() - (0.7500001 - 26.0 / 40.0)).abs() < 1e-9);

        let country = BaseResult::from_place(&place(&conn, 1));
        assert_eq!(country.calculated_importance(), 0.9);

        let result = SearchResult::new(country, 0.5);
        assert!((result.ranking() - (0.5 - 0.9)).abs() < 1e-9);
    }

    #[test]
    fn test_interpolation_result_without_housenumber() {
        let conn = connection();
        let line = conn.database().interpolations()[0].clone();
        let whole = BaseResult::from_interpolation(&line, None, line.linegeo.centroid());
        assert_eq!(whole.category, Category::new("place", "houses"));
        assert_eq!(whole.extratags["step"], "2");
        assert_eq!(whole.source_table, SourceTable::Osmline);

        let house = BaseResult::from_interpolation(&line, Some(7), line.linegeo.centroid());
        assert_eq!(house.housenumber.as_deref(), Some("7"));
        assert_eq!(house.category, Category::new("place", "house"));
    }

    #[test]
    fn test_localize_without_address() {
        let conn = connection();
        let mut london = BaseResult::from_place(&place(&conn, 2));
        london.localize(&Locales::default());
        assert_eq!(london.display_name.as_deref(), Some("London"));

        let mut country = BaseResult::from_place(&place(&conn, 1));
        country.localize(&Locales::new(["de"]));
        assert_eq!(country.locale_name.as_deref(), Some("Vereinigtes Königreich"));
    }

    #[tokio::test]
    async fn test_add_address_details() {
        let conn = connection();
        let mut results = vec![SearchResult::new(BaseResult::from_place(&place(&conn, 4)), 0.0)];
        let details = LookupDetails {
            address_details: true,
            ..LookupDetails::default()
        };
        add_result_details(&conn, &mut results, &details, &NoopTrace)
            .await
            .unwrap();

        let base = &results[0].base;
        let rows = base.address_rows.as_ref().unwrap();
        assert_eq!(rows[0].place_id, Some(4), "The place itself comes first");
        assert_eq!(
            base.display_name.as_deref(),
            Some("10, Downing Street, London, SW1A 2AA, United Kingdom")
        );
    }

    #[tokio::test]
    async fn test_add_parented_places_and_keywords() {
        let conn = connection();
        let mut results = vec![SearchResult::new(BaseResult::from_place(&place(&conn, 5)), 0.0)];
        let details = LookupDetails {
            parented_places: true,
            keywords: true,
            ..LookupDetails::default()
        };
        add_result_details(&conn, &mut results, &details, &NoopTrace)
            .await
            .unwrap();

        let base = &results[0].base;
        let children = base.parented_rows.as_ref().unwrap();
        assert!(children.iter().any(|c| c.names.get("name").map(String::as_str) == Some("Red Lion")));
        let keywords = base.name_keywords.as_ref().unwrap();
        assert!(keywords.iter().any(|w| w.word_token == "whitehall"));
        assert!(base.address_rows.is_none());
    }
}
