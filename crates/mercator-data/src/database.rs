//! In-memory place database.
//!
//! [`DatabaseBuilder`] collects raw place rows and derives everything an import would
//! normally precompute: the word table with frequency counts, the search token vectors
//! and the address hierarchy. The resulting [`PlaceDatabase`] is immutable and exposes
//! index lookups only; query semantics live with the caller.

use std::{collections::BTreeMap, sync::Arc};

use ahash::{AHashMap, AHashSet};
use itertools::Itertools;
use rayon::prelude::*;
use rstar::{AABB, RTree, RTreeObject};
use tracing::{debug, info, instrument, warn};

use crate::{
    error::{DataError, Result},
    geometry::{Bbox, Point},
    normalize::{normalize_postcode, normalize_text, split_words},
    rows::{
        AddressLineRow, Category, CountryGridRow, CountryNameRow, InterpolationRow, OsmType,
        PlaceId, PlaceRow, PostcodeRow, SearchNameRow, TokenId, WordInfo, WordKind, WordRow,
    },
};

const MAX_PARENT_DEPTH: usize = 30;
const ADDRESS_TAG_SKIP: &[&str] = &["housenumber", "postcode", "country", "housename"];

#[derive(Debug, Clone, Copy, PartialEq)]
struct IndexEntry {
    envelope: AABB<[f64; 2]>,
    slot: usize,
}

impl RTreeObject for IndexEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

fn aabb(bbox: &Bbox) -> AABB<[f64; 2]> {
    AABB::from_corners([bbox.minx, bbox.miny], [bbox.maxx, bbox.maxy])
}

/// R-tree over the envelopes of one table, returning row slots.
#[derive(Debug)]
struct SpatialIndex {
    tree: RTree<IndexEntry>,
}

impl SpatialIndex {
    fn build(envelopes: impl Iterator<Item = Bbox>) -> Self {
        let entries = envelopes
            .enumerate()
            .map(|(slot, bbox)| IndexEntry {
                envelope: aabb(&bbox),
                slot,
            })
            .collect();
        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    fn intersecting(&self, bbox: Bbox) -> impl Iterator<Item = usize> + '_ {
        self.tree
            .locate_in_envelope_intersecting(&aabb(&bbox))
            .map(|e| e.slot)
    }
}

#[derive(Debug)]
pub struct PlaceDatabase {
    places: Vec<Arc<PlaceRow>>,
    place_slots: AHashMap<PlaceId, usize>,
    osm_slots: AHashMap<(OsmType, i64), Vec<usize>>,
    child_slots: AHashMap<PlaceId, Vec<usize>>,
    place_tree: SpatialIndex,
    search_rows: AHashMap<PlaceId, Arc<SearchNameRow>>,
    name_index: AHashMap<TokenId, Vec<PlaceId>>,
    address_index: AHashMap<TokenId, Vec<PlaceId>>,
    interpolations: Vec<Arc<InterpolationRow>>,
    interpolation_tree: SpatialIndex,
    tiger: Vec<Arc<InterpolationRow>>,
    tiger_tree: SpatialIndex,
    postcodes: Vec<Arc<PostcodeRow>>,
    postcode_slots: AHashMap<String, Vec<usize>>,
    postcode_tree: SpatialIndex,
    country_names: AHashMap<String, Arc<CountryNameRow>>,
    country_grid: Vec<Arc<CountryGridRow>>,
    grid_tree: SpatialIndex,
    words: Vec<WordRow>,
    word_slots: AHashMap<String, Vec<usize>>,
    address_lines: AHashMap<PlaceId, Vec<AddressLineRow>>,
}

impl PlaceDatabase {
    pub fn builder() -> DatabaseBuilder {
        DatabaseBuilder::new()
    }

    pub fn place(&self, place_id: PlaceId) -> Option<&Arc<PlaceRow>> {
        self.place_slots.get(&place_id).map(move |&i| &self.places[i])
    }

    pub fn places(&self) -> &[Arc<PlaceRow>] {
        &self.places
    }

    pub fn places_by_osm(
        &self,
        osm_type: OsmType,
        osm_id: i64,
    ) -> impl Iterator<Item = &Arc<PlaceRow>> + '_ {
        self.osm_slots
            .get(&(osm_type, osm_id))
            .into_iter()
            .flatten()
            .map(move |&i| &self.places[i])
    }

    pub fn children(&self, parent: PlaceId) -> impl Iterator<Item = &Arc<PlaceRow>> + '_ {
        self.child_slots
            .get(&parent)
            .into_iter()
            .flatten()
            .map(move |&i| &self.places[i])
    }

    /// Places whose geometry envelope intersects `bbox`.
    pub fn places_in_bbox(&self, bbox: Bbox) -> impl Iterator<Item = &Arc<PlaceRow>> + '_ {
        self.place_tree
            .intersecting(bbox)
            .map(move |i| &self.places[i])
    }

    pub fn search_row(&self, place_id: PlaceId) -> Option<&Arc<SearchNameRow>> {
        self.search_rows.get(&place_id)
    }

    pub fn places_with_name_token(&self, token: TokenId) -> &[PlaceId] {
        self.name_index.get(&token).map_or(&[], Vec::as_slice)
    }

    pub fn places_with_address_token(&self, token: TokenId) -> &[PlaceId] {
        self.address_index.get(&token).map_or(&[], Vec::as_slice)
    }

    pub fn interpolations(&self) -> &[Arc<InterpolationRow>] {
        &self.interpolations
    }

    pub fn interpolations_in_bbox(
        &self,
        bbox: Bbox,
    ) -> impl Iterator<Item = &Arc<InterpolationRow>> + '_ {
        self.interpolation_tree
            .intersecting(bbox)
            .map(move |i| &self.interpolations[i])
    }

    pub fn tiger(&self) -> &[Arc<InterpolationRow>] {
        &self.tiger
    }

    pub fn tiger_in_bbox(&self, bbox: Bbox) -> impl Iterator<Item = &Arc<InterpolationRow>> + '_ {
        self.tiger_tree.intersecting(bbox).map(move |i| &self.tiger[i])
    }

    pub fn postcodes(&self) -> &[Arc<PostcodeRow>] {
        &self.postcodes
    }

    pub fn postcodes_by_value(&self, postcode: &str) -> impl Iterator<Item = &Arc<PostcodeRow>> + '_ {
        self.postcode_slots
            .get(&normalize_postcode(postcode))
            .into_iter()
            .flatten()
            .map(move |&i| &self.postcodes[i])
    }

    pub fn postcodes_in_bbox(&self, bbox: Bbox) -> impl Iterator<Item = &Arc<PostcodeRow>> + '_ {
        self.postcode_tree
            .intersecting(bbox)
            .map(move |i| &self.postcodes[i])
    }

    pub fn country_name(&self, country_code: &str) -> Option<&Arc<CountryNameRow>> {
        self.country_names.get(country_code)
    }

    /// Grid cells whose geometry contains `point`.
    pub fn country_grid_at(&self, point: Point) -> impl Iterator<Item = &Arc<CountryGridRow>> + '_ {
        self.grid_tree
            .intersecting(point.to_bbox(0.0))
            .map(move |i| &self.country_grid[i])
            .filter(move |cell| cell.geometry.contains(&point))
    }

    pub fn country_grid(&self, country_code: &str) -> impl Iterator<Item = &Arc<CountryGridRow>> + '_ {
        let country_code = country_code.to_owned();
        self.country_grid
            .iter()
            .filter(move |cell| cell.country_code == country_code)
    }

    pub fn words(&self) -> &[WordRow] {
        &self.words
    }

    pub fn words_by_token(&self, word_token: &str) -> impl Iterator<Item = &WordRow> + '_ {
        self.word_slots
            .get(word_token)
            .into_iter()
            .flatten()
            .map(move |&i| &self.words[i])
    }

    pub fn address_lines(&self, place_id: PlaceId) -> &[AddressLineRow] {
        self.address_lines.get(&place_id).map_or(&[], Vec::as_slice)
    }
}

#[derive(Debug, Clone)]
struct SpecialPhrase {
    label: String,
    category: Category,
    op: String,
}

/// Terms extracted from one place before token ids exist.
#[derive(Debug, Default)]
struct PlaceTerms {
    place_id: PlaceId,
    names_full: Vec<String>,
    names_partial: Vec<String>,
    housenumbers: Vec<String>,
    address_full: Vec<String>,
    address_partial: Vec<String>,
}

impl PlaceTerms {
    fn is_searchable(&self) -> bool {
        !self.names_full.is_empty() || !self.housenumbers.is_empty()
    }
}

#[derive(Debug, Default)]
struct WordStats {
    count: u64,
    addr_count: u64,
}

/// Collects raw rows and derives the search tables.
///
/// ```rust
/// use mercator_data::{Category, DatabaseBuilder, Geometry, OsmType, PlaceRow, Point};
///
/// let db = DatabaseBuilder::new()
///     .place(PlaceRow {
///         place_id: 1,
///         parent_place_id: None,
///         linked_place_id: None,
///         osm_type: OsmType::Node,
///         osm_id: 42,
///         category: Category::new("place", "city"),
///         admin_level: 15,
///         name: [("name".to_string(), "Springfield".to_string())].into(),
///         address: Default::default(),
///         extratags: Default::default(),
///         housenumber: None,
///         postcode: None,
///         country_code: Some("us".into()),
///         rank_search: 16,
///         rank_address: 16,
///         importance: None,
///         wikipedia: None,
///         indexed_date: None,
///         geometry: Geometry::point(Point::new(-89.65, 39.8)),
///         centroid: None,
///     })
///     .build()?;
/// assert_eq!(db.words_by_token("springfield").count(), 2);
/// # Ok::<(), mercator_data::DataError>(())
/// ```
#[derive(Debug, Default)]
pub struct DatabaseBuilder {
    places: Vec<PlaceRow>,
    interpolations: Vec<InterpolationRow>,
    tiger: Vec<InterpolationRow>,
    postcodes: Vec<PostcodeRow>,
    country_names: Vec<CountryNameRow>,
    country_grid: Vec<CountryGridRow>,
    special_phrases: Vec<SpecialPhrase>,
}

impl DatabaseBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn place(mut self, row: PlaceRow) -> Self {
        self.places.push(row);
        self
    }

    pub fn interpolation(mut self, row: InterpolationRow) -> Self {
        self.interpolations.push(row);
        self
    }

    pub fn tiger(mut self, row: InterpolationRow) -> Self {
        self.tiger.push(row);
        self
    }

    pub fn postcode(mut self, row: PostcodeRow) -> Self {
        self.postcodes.push(row);
        self
    }

    pub fn country_name(mut self, row: CountryNameRow) -> Self {
        self.country_names.push(row);
        self
    }

    pub fn country_grid(mut self, row: CountryGridRow) -> Self {
        self.country_grid.push(row);
        self
    }

    /// Register a special phrase such as `"pub"` or `"pubs near"`.
    ///
    /// `op` is `"-"` for a plain category word and `"in"`/`"near"` for phrases that
    /// only make sense at the start of a query.
    pub fn special_phrase(mut self, label: &str, category: Category, op: &str) -> Self {
        self.special_phrases.push(SpecialPhrase {
            label: label.to_owned(),
            category,
            op: op.to_owned(),
        });
        self
    }

    #[instrument(name = "Build place database", level = "info", skip_all, fields(places = self.places.len()))]
    pub fn build(self) -> Result<PlaceDatabase> {
        let t_build = std::time::Instant::now();

        let mut place_slots = AHashMap::with_capacity(self.places.len());
        for (slot, row) in self.places.iter().enumerate() {
            if place_slots.insert(row.place_id, slot).is_some() {
                return Err(DataError::DuplicatePlace(row.place_id));
            }
        }
        for row in &self.places {
            if let Some(parent) = row.parent_place_id
                && !place_slots.contains_key(&parent)
            {
                return Err(DataError::UnknownParent {
                    place_id: row.place_id,
                    parent_place_id: parent,
                });
            }
        }

        let places: Vec<Arc<PlaceRow>> = self
            .places
            .into_iter()
            .map(|mut row| {
                if row.centroid.is_none() {
                    row.centroid = Some(row.geometry.centroid());
                }
                Arc::new(row)
            })
            .collect();

        let lookup = |id: PlaceId| place_slots.get(&id).map(|&i| places[i].as_ref());
        let terms: Vec<PlaceTerms> = places
            .par_iter()
            .map(|row| collect_terms(row, &lookup))
            .filter(PlaceTerms::is_searchable)
            .collect();
        debug!(searchable = terms.len(), "Collected search terms");

        let (words, token_ids) = build_word_table(
            &terms,
            &self.postcodes,
            &places,
            &self.country_names,
            &self.special_phrases,
        );

        let mut search_rows = AHashMap::with_capacity(terms.len());
        let mut name_index: AHashMap<TokenId, Vec<PlaceId>> = AHashMap::new();
        let mut address_index: AHashMap<TokenId, Vec<PlaceId>> = AHashMap::new();
        for t in &terms {
            let name_vector = token_vector(
                &token_ids,
                [
                    (WordKind::FullWord, &t.names_full),
                    (WordKind::PartialWord, &t.names_partial),
                    (WordKind::HouseNumber, &t.housenumbers),
                ],
            );
            let nameaddress_vector = token_vector(
                &token_ids,
                [
                    (WordKind::FullWord, &t.address_full),
                    (WordKind::PartialWord, &t.address_partial),
                    (WordKind::HouseNumber, &Vec::new()),
                ],
            );
            for token in &name_vector {
                name_index.entry(*token).or_default().push(t.place_id);
            }
            for token in &nameaddress_vector {
                address_index.entry(*token).or_default().push(t.place_id);
            }
            search_rows.insert(
                t.place_id,
                Arc::new(SearchNameRow {
                    place_id: t.place_id,
                    name_vector,
                    nameaddress_vector,
                }),
            );
        }

        let address_lines = places
            .par_iter()
            .map(|row| (row.place_id, address_lines_for(row, &lookup, &places)))
            .collect::<Vec<_>>()
            .into_iter()
            .collect();

        let mut osm_slots: AHashMap<(OsmType, i64), Vec<usize>> = AHashMap::new();
        let mut child_slots: AHashMap<PlaceId, Vec<usize>> = AHashMap::new();
        for (slot, row) in places.iter().enumerate() {
            osm_slots
                .entry((row.osm_type, row.osm_id))
                .or_default()
                .push(slot);
            if let Some(parent) = row.parent_place_id {
                child_slots.entry(parent).or_default().push(slot);
            }
        }

        let mut postcode_slots: AHashMap<String, Vec<usize>> = AHashMap::new();
        for (slot, row) in self.postcodes.iter().enumerate() {
            postcode_slots
                .entry(normalize_postcode(&row.postcode))
                .or_default()
                .push(slot);
        }

        let mut word_slots: AHashMap<String, Vec<usize>> = AHashMap::new();
        for (slot, word) in words.iter().enumerate() {
            word_slots
                .entry(word.word_token.clone())
                .or_default()
                .push(slot);
        }

        let place_tree = SpatialIndex::build(places.iter().map(|p| p.geometry.bbox()));
        let interpolation_tree =
            SpatialIndex::build(self.interpolations.iter().map(|r| r.linegeo.bbox()));
        let tiger_tree = SpatialIndex::build(self.tiger.iter().map(|r| r.linegeo.bbox()));
        let postcode_tree = SpatialIndex::build(self.postcodes.iter().map(|r| r.geometry.bbox()));
        let grid_tree = SpatialIndex::build(self.country_grid.iter().map(|r| r.geometry.bbox()));

        let country_names = self
            .country_names
            .into_iter()
            .map(|row| (row.country_code.clone(), Arc::new(row)))
            .collect();

        if words.is_empty() {
            warn!("Place database has an empty word table");
        }
        info!(
            elapsed_seconds = ?t_build.elapsed(),
            places = places.len(),
            words = words.len(),
            "Place database built"
        );

        Ok(PlaceDatabase {
            place_slots,
            osm_slots,
            child_slots,
            place_tree,
            search_rows,
            name_index,
            address_index,
            interpolations: self.interpolations.into_iter().map(Arc::new).collect(),
            interpolation_tree,
            tiger: self.tiger.into_iter().map(Arc::new).collect(),
            tiger_tree,
            postcodes: self.postcodes.into_iter().map(Arc::new).collect(),
            postcode_slots,
            postcode_tree,
            country_names,
            country_grid: self.country_grid.into_iter().map(Arc::new).collect(),
            grid_tree,
            words,
            word_slots,
            address_lines,
            places,
        })
    }
}

/// Ancestors along the parent chain, nearest first.
fn ancestors<'a>(
    row: &PlaceRow,
    lookup: &impl Fn(PlaceId) -> Option<&'a PlaceRow>,
) -> Vec<&'a PlaceRow> {
    let mut chain = Vec::new();
    let mut next = row.parent_place_id;
    while let Some(id) = next {
        if chain.len() >= MAX_PARENT_DEPTH {
            break;
        }
        let Some(parent) = lookup(id) else { break };
        chain.push(parent);
        next = parent.parent_place_id;
    }
    chain
}

fn push_name_terms(names: impl Iterator<Item = String>, full: &mut Vec<String>, partial: &mut Vec<String>) {
    for name in names {
        let norm = normalize_text(&name);
        if norm.is_empty() {
            continue;
        }
        partial.extend(split_words(&norm));
        full.push(norm);
    }
}

fn collect_terms<'a>(
    row: &PlaceRow,
    lookup: &impl Fn(PlaceId) -> Option<&'a PlaceRow>,
) -> PlaceTerms {
    let mut terms = PlaceTerms {
        place_id: row.place_id,
        ..PlaceTerms::default()
    };
    if row.is_linked() {
        return terms;
    }
    push_name_terms(
        row.name.values().cloned(),
        &mut terms.names_full,
        &mut terms.names_partial,
    );
    if let Some(hnr) = &row.housenumber {
        terms.housenumbers = hnr
            .split(';')
            .map(normalize_text)
            .filter(|h| !h.is_empty())
            .collect();
    }

    let tag_values = row
        .address
        .iter()
        .filter(|(k, _)| !ADDRESS_TAG_SKIP.contains(&k.as_str()))
        .map(|(_, v)| v.clone());
    let ancestor_names = ancestors(row, lookup)
        .into_iter()
        .filter(|a| a.rank_address > 0)
        .flat_map(|a| a.name.values().cloned().collect_vec());
    push_name_terms(
        tag_values.chain(ancestor_names),
        &mut terms.address_full,
        &mut terms.address_partial,
    );

    for list in [
        &mut terms.names_full,
        &mut terms.names_partial,
        &mut terms.address_full,
        &mut terms.address_partial,
    ] {
        list.sort();
        list.dedup();
    }
    terms
}

type TokenKey = (WordKind, String);

fn kind_order(kind: WordKind) -> u8 {
    match kind {
        WordKind::FullWord => 0,
        WordKind::PartialWord => 1,
        WordKind::HouseNumber => 2,
        WordKind::Postcode => 3,
        WordKind::Country => 4,
        WordKind::Special => 5,
    }
}

fn build_word_table(
    terms: &[PlaceTerms],
    postcodes: &[PostcodeRow],
    places: &[Arc<PlaceRow>],
    country_names: &[CountryNameRow],
    special_phrases: &[SpecialPhrase],
) -> (Vec<WordRow>, AHashMap<TokenKey, TokenId>) {
    let mut stats: BTreeMap<(u8, String), (WordKind, WordStats)> = BTreeMap::new();
    let mut bump = |kind: WordKind, token: &str, in_address: bool| {
        let (_, entry) = stats
            .entry((kind_order(kind), token.to_owned()))
            .or_insert_with(|| (kind, WordStats::default()));
        if in_address {
            entry.addr_count += 1;
        } else {
            entry.count += 1;
        }
    };
    for t in terms {
        t.names_full.iter().for_each(|w| bump(WordKind::FullWord, w, false));
        t.names_partial.iter().for_each(|w| bump(WordKind::PartialWord, w, false));
        t.housenumbers.iter().for_each(|w| bump(WordKind::HouseNumber, w, false));
        t.address_full.iter().for_each(|w| bump(WordKind::FullWord, w, true));
        t.address_partial.iter().for_each(|w| bump(WordKind::PartialWord, w, true));
    }

    let mut token_ids = AHashMap::new();
    let mut words = Vec::new();
    let mut next_id: TokenId = 1;
    for ((_, token), (kind, counts)) in stats {
        token_ids.insert((kind, token.clone()), next_id);
        words.push(WordRow {
            word_id: next_id,
            word: (kind == WordKind::HouseNumber).then(|| token.clone()),
            word_token: token,
            kind,
            info: WordInfo {
                count: Some(counts.count),
                addr_count: Some(counts.addr_count),
                ..WordInfo::default()
            },
        });
        next_id += 1;
    }

    let postcode_values: AHashSet<String> = postcodes
        .iter()
        .map(|p| normalize_postcode(&p.postcode))
        .chain(places.iter().filter_map(|p| p.postcode.as_deref().map(normalize_postcode)))
        .collect();
    for postcode in postcode_values.into_iter().sorted() {
        words.push(WordRow {
            word_id: next_id,
            word_token: normalize_text(&postcode),
            kind: WordKind::Postcode,
            word: Some(postcode),
            info: WordInfo::default(),
        });
        next_id += 1;
    }

    let country_terms: AHashSet<(String, String)> = country_names
        .iter()
        .flat_map(|c| {
            c.name
                .values()
                .chain(c.derived_name.values())
                .map(|n| (normalize_text(n), c.country_code.to_lowercase()))
        })
        .filter(|(token, _)| !token.is_empty())
        .collect();
    for (token, code) in country_terms.into_iter().sorted() {
        words.push(WordRow {
            word_id: next_id,
            word_token: token,
            kind: WordKind::Country,
            word: Some(code),
            info: WordInfo::default(),
        });
        next_id += 1;
    }

    for phrase in special_phrases {
        words.push(WordRow {
            word_id: next_id,
            word_token: normalize_text(&phrase.label),
            kind: WordKind::Special,
            word: Some(phrase.label.clone()),
            info: WordInfo {
                class: Some(phrase.category.class.clone()),
                kind: Some(phrase.category.kind.clone()),
                op: Some(phrase.op.clone()),
                ..WordInfo::default()
            },
        });
        next_id += 1;
    }

    (words, token_ids)
}

fn token_vector<'a>(
    token_ids: &AHashMap<TokenKey, TokenId>,
    groups: [(WordKind, &'a Vec<String>); 3],
) -> Vec<TokenId> {
    groups
        .into_iter()
        .flat_map(|(kind, words)| {
            words
                .iter()
                .filter_map(move |w| token_ids.get(&(kind, w.clone())).copied())
        })
        .sorted()
        .dedup()
        .collect()
}

fn address_lines_for<'a>(
    row: &PlaceRow,
    lookup: &impl Fn(PlaceId) -> Option<&'a PlaceRow>,
    places: &[Arc<PlaceRow>],
) -> Vec<AddressLineRow> {
    let centroid = row.centroid();
    let mut seen_ranks = AHashSet::new();
    let mut lines: Vec<AddressLineRow> = ancestors(row, lookup)
        .into_iter()
        .map(|parent| AddressLineRow {
            place_id: row.place_id,
            address_place_id: parent.place_id,
            isaddress: parent.rank_address > 0
                && parent.rank_address < row.rank_address.max(1)
                && seen_ranks.insert(parent.rank_address),
            distance: parent.centroid().distance(&centroid),
            fromarea: parent.geometry.is_area(),
            cached_rank_address: parent.rank_address,
        })
        .collect();

    if row.rank_address > 4
        && let Some(cc) = &row.country_code
        && !lines.iter().any(|l| l.cached_rank_address == 4)
        && let Some(country) = places.iter().find(|p| {
            p.rank_address == 4 && p.country_code.as_deref() == Some(cc.as_str()) && !p.is_linked()
        })
    {
        lines.push(AddressLineRow {
            place_id: row.place_id,
            address_place_id: country.place_id,
            isaddress: true,
            distance: country.centroid().distance(&centroid),
            fromarea: country.geometry.is_area(),
            cached_rank_address: 4,
        });
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_data::{TestDataConfig, create_test_database};

    #[test]
    fn test_word_table_counts() {
        let db = create_test_database(&TestDataConfig::minimal()).unwrap();
        let downing: Vec<_> = db.words_by_token("downing").collect();
        assert_eq!(downing.len(), 1);
        assert_eq!(downing[0].kind, WordKind::PartialWord);
        assert!(downing[0].info.count.unwrap() >= 1);
        assert!(
            db.words_by_token("downing street")
                .any(|w| w.kind == WordKind::FullWord)
        );
        assert!(db.words_by_token("sw1a 2aa").any(|w| w.kind == WordKind::Postcode));
        assert!(
            db.words_by_token("united kingdom")
                .any(|w| w.kind == WordKind::Country && w.word.as_deref() == Some("gb"))
        );
    }

    #[test]
    fn test_search_vectors_include_ancestors() {
        let db = create_test_database(&TestDataConfig::minimal()).unwrap();
        let london_token = db
            .words_by_token("london")
            .find(|w| w.kind == WordKind::PartialWord)
            .unwrap()
            .word_id;
        let street = db
            .places()
            .iter()
            .find(|p| p.name.get("name").map(String::as_str) == Some("Downing Street"))
            .unwrap();
        let search = db.search_row(street.place_id).unwrap();
        assert!(search.nameaddress_vector.contains(&london_token));
        assert!(db.places_with_address_token(london_token).contains(&street.place_id));
    }

    #[test]
    fn test_address_lines_follow_parent_chain() {
        let db = create_test_database(&TestDataConfig::minimal()).unwrap();
        let house = db
            .places()
            .iter()
            .find(|p| p.housenumber.as_deref() == Some("10"))
            .unwrap();
        let lines = db.address_lines(house.place_id);
        assert!(lines.len() >= 3);
        assert!(lines.iter().any(|l| l.cached_rank_address == 4 && l.isaddress));
        assert!(lines.windows(2).all(|w| w[0].cached_rank_address >= w[1].cached_rank_address));
    }

    #[test]
    fn test_duplicate_place_is_rejected() {
        let db = create_test_database(&TestDataConfig::minimal()).unwrap();
        let row = db.places()[0].as_ref().clone();
        let err = DatabaseBuilder::new().place(row.clone()).place(row).build();
        assert!(matches!(err, Err(DataError::DuplicatePlace(_))));
    }

    #[test]
    fn test_spatial_lookups() {
        let db = create_test_database(&TestDataConfig::minimal()).unwrap();
        let in_london = Point::new(-0.1275, 51.5034);
        assert!(db.country_grid_at(in_london).any(|c| c.country_code == "gb"));
        assert!(db.places_in_bbox(in_london.to_bbox(0.001)).count() > 0);
        assert_eq!(db.country_grid_at(Point::new(-30.0, 0.0)).count(), 0);
    }
}
