use std::sync::Arc;

use ahash::AHashSet;
use async_trait::async_trait;
use itertools::Itertools;
use mercator_data::{
    AddressLineRow, Bbox, CountryNameRow, InterpolationRow, PlaceDatabase, PlaceId, PlaceRow,
    Point, PostcodeRow, SearchNameRow, TokenId, WordRow,
};
use tracing::trace;

use super::{
    LineFilter, NameMatch, PlaceCondition, PlaceFilter, PostcodeFilter, Result, SearchConnection,
};
use crate::search::fields::{FieldLookup, LookupKind, SearchColumn};

/// [`SearchConnection`] over an in-memory [`PlaceDatabase`].
#[derive(Debug, Clone)]
pub struct MemoryConnection {
    db: Arc<PlaceDatabase>,
}

impl MemoryConnection {
    pub fn new(db: Arc<PlaceDatabase>) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &PlaceDatabase {
        &self.db
    }

    fn token_postings(&self, column: SearchColumn, token: TokenId) -> &[PlaceId] {
        match column {
            SearchColumn::NameVector => self.db.places_with_name_token(token),
            SearchColumn::NameAddressVector => self.db.places_with_address_token(token),
        }
    }

    /// Candidate ids from the indexed lookups. `None` when no lookup uses the index.
    fn indexed_candidates(&self, lookups: &[FieldLookup]) -> Option<AHashSet<PlaceId>> {
        lookups
            .iter()
            .filter(|l| l.kind.uses_index())
            .map(|lookup| {
                let mut postings = lookup
                    .tokens
                    .iter()
                    .map(|t| self.token_postings(lookup.column, *t).iter().copied());
                match lookup.kind {
                    LookupKind::Any => postings.flatten().collect::<AHashSet<_>>(),
                    _ => {
                        let first: AHashSet<PlaceId> =
                            postings.next().map(Iterator::collect).unwrap_or_default();
                        postings.fold(first, |acc, ids| {
                            let ids: AHashSet<PlaceId> = ids.collect();
                            acc.intersection(&ids).copied().collect()
                        })
                    }
                }
            })
            .reduce(|acc, ids| acc.intersection(&ids).copied().collect())
    }

    /// Candidate places before the filter is applied, using the cheapest index the
    /// filter allows.
    fn place_candidates(&self, filter: &PlaceFilter) -> Vec<Arc<PlaceRow>> {
        if let Some(ids) = filter.ids() {
            return ids
                .iter()
                .filter_map(|id| self.db.place(*id))
                .cloned()
                .collect();
        }
        for condition in &filter.conditions {
            match condition {
                PlaceCondition::Parents(parents) => {
                    return parents
                        .iter()
                        .flat_map(|p| self.db.children(*p))
                        .cloned()
                        .collect();
                }
                PlaceCondition::Osm { osm_type, osm_id } => {
                    return self
                        .db
                        .places_by_osm(*osm_type, *osm_id)
                        .cloned()
                        .collect();
                }
                _ => {}
            }
        }
        match filter.envelope() {
            Some(bbox) => self.db.places_in_bbox(bbox).cloned().collect(),
            None => self.db.places().to_vec(),
        }
    }
}

impl From<PlaceDatabase> for MemoryConnection {
    fn from(db: PlaceDatabase) -> Self {
        Self::new(Arc::new(db))
    }
}

#[async_trait]
impl SearchConnection for MemoryConnection {
    async fn lookup_words(&self, word_tokens: &[String]) -> Result<Vec<WordRow>> {
        Ok(word_tokens
            .iter()
            .unique()
            .flat_map(|t| self.db.words_by_token(t))
            .cloned()
            .collect())
    }

    async fn words_by_id(&self, word_ids: &[TokenId]) -> Result<Vec<WordRow>> {
        Ok(self
            .db
            .words()
            .iter()
            .filter(|w| word_ids.contains(&w.word_id))
            .cloned()
            .collect())
    }

    async fn search_names(
        &self,
        lookups: &[FieldLookup],
        filter: &PlaceFilter,
    ) -> Result<Vec<NameMatch>> {
        let candidates: Vec<PlaceId> = match self.indexed_candidates(lookups) {
            Some(ids) => ids.into_iter().sorted().collect(),
            None => self.db.places().iter().map(|p| p.place_id).collect(),
        };
        trace!(candidates = candidates.len(), "Name lookup candidates");

        let matches = candidates
            .into_iter()
            .filter_map(|id| {
                let search = self.db.search_row(id)?;
                let place = self.db.place(id)?;
                (lookups.iter().all(|l| l.matches(search)) && filter.accepts(place)).then(|| {
                    NameMatch {
                        place: Arc::clone(place),
                        search: Arc::clone(search),
                    }
                })
            })
            .collect();
        Ok(filter.finish(matches, |m| m.place.as_ref()))
    }

    async fn places(&self, filter: &PlaceFilter) -> Result<Vec<Arc<PlaceRow>>> {
        let rows = self
            .place_candidates(filter)
            .into_iter()
            .filter(|p| filter.accepts(p))
            .collect();
        Ok(filter.finish(rows, |p| p.as_ref()))
    }

    async fn interpolations(&self, filter: &LineFilter) -> Result<Vec<Arc<InterpolationRow>>> {
        let rows = match filter.near {
            Some((point, distance)) => self
                .db
                .interpolations_in_bbox(point.to_bbox(distance))
                .filter(|r| filter.accepts(r))
                .cloned()
                .collect(),
            None => self
                .db
                .interpolations()
                .iter()
                .filter(|r| filter.accepts(r))
                .cloned()
                .collect(),
        };
        Ok(filter.finish(rows))
    }

    async fn tiger(&self, filter: &LineFilter) -> Result<Vec<Arc<InterpolationRow>>> {
        let rows = match filter.near {
            Some((point, distance)) => self
                .db
                .tiger_in_bbox(point.to_bbox(distance))
                .filter(|r| filter.accepts(r))
                .cloned()
                .collect(),
            None => self
                .db
                .tiger()
                .iter()
                .filter(|r| filter.accepts(r))
                .cloned()
                .collect(),
        };
        Ok(filter.finish(rows))
    }

    async fn postcodes(&self, filter: &PostcodeFilter) -> Result<Vec<Arc<PostcodeRow>>> {
        let candidates: Vec<&Arc<PostcodeRow>> = if !filter.postcodes.is_empty() {
            filter
                .postcodes
                .iter()
                .flat_map(|pc| self.db.postcodes_by_value(pc))
                .unique_by(|r| r.place_id)
                .collect()
        } else if let Some(bbox) = filter.intersects {
            self.db.postcodes_in_bbox(bbox).collect()
        } else if let Some((point, distance)) = filter.near {
            self.db.postcodes_in_bbox(point.to_bbox(distance)).collect()
        } else {
            self.db.postcodes().iter().collect()
        };
        let rows = candidates
            .into_iter()
            .filter(|r| filter.accepts(r))
            .cloned()
            .collect();
        Ok(filter.finish(rows))
    }

    async fn country_names(&self, country_codes: &[String]) -> Result<Vec<Arc<CountryNameRow>>> {
        Ok(country_codes
            .iter()
            .filter_map(|cc| self.db.country_name(cc))
            .cloned()
            .collect())
    }

    async fn country_grid_codes(&self, point: Point) -> Result<Vec<String>> {
        Ok(self
            .db
            .country_grid_at(point)
            .map(|cell| cell.country_code.clone())
            .unique()
            .collect())
    }

    async fn country_grid_envelope(&self, country_code: &str) -> Result<Option<Bbox>> {
        Ok(self
            .db
            .country_grid(country_code)
            .map(|cell| cell.geometry.bbox())
            .reduce(|a, b| {
                Bbox::new(
                    a.minx.min(b.minx),
                    a.miny.min(b.miny),
                    a.maxx.max(b.maxx),
                    a.maxy.max(b.maxy),
                )
            }))
    }

    async fn address_lines(&self, place_id: PlaceId) -> Result<Vec<AddressLineRow>> {
        Ok(self.db.address_lines(place_id).to_vec())
    }

    async fn search_vectors(&self, place_id: PlaceId) -> Result<Option<Arc<SearchNameRow>>> {
        Ok(self.db.search_row(place_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use mercator_data::{Category, TestDataConfig, WordKind, create_test_database};

    use super::*;
    use crate::connection::PlaceOrder;

    fn connection(config: &TestDataConfig) -> MemoryConnection {
        MemoryConnection::from(create_test_database(config).unwrap())
    }

    fn full_word(conn: &MemoryConnection, token: &str) -> TokenId {
        conn.database()
            .words_by_token(token)
            .find(|w| w.kind == WordKind::FullWord)
            .map(|w| w.word_id)
            .unwrap()
    }

    #[tokio::test]
    async fn test_lookup_words() {
        let conn = connection(&TestDataConfig::minimal());
        let words = conn
            .lookup_words(&["downing".into(), "downing".into(), "unknown".into()])
            .await
            .unwrap();
        assert!(!words.is_empty(), "Expected word rows for 'downing'");
        assert!(words.iter().all(|w| w.word_token == "downing"));

        let ids: Vec<TokenId> = words.iter().map(|w| w.word_id).collect();
        let again = conn.words_by_id(&ids).await.unwrap();
        assert_eq!(again.len(), words.len());
    }

    #[tokio::test]
    async fn test_search_names_uses_index_and_filter() {
        let conn = connection(&TestDataConfig::minimal());
        let token = full_word(&conn, "downing street");
        let lookups = vec![FieldLookup::new(
            SearchColumn::NameVector,
            vec![token],
            LookupKind::All,
        )];

        let found = conn
            .search_names(&lookups, &PlaceFilter::new())
            .await
            .unwrap();
        assert_eq!(found.len(), 1, "Expected exactly Downing Street");
        assert_eq!(found[0].place.name["name"], "Downing Street");

        let filtered = conn
            .search_names(
                &lookups,
                &PlaceFilter::new().with(PlaceCondition::RankAddress(27, 30)),
            )
            .await
            .unwrap();
        assert!(filtered.is_empty(), "Rank filter should remove the street");
    }

    #[tokio::test]
    async fn test_places_by_parent_and_distance() {
        let conn = connection(&TestDataConfig::minimal());
        let children = conn
            .places(&PlaceFilter::new().with(PlaceCondition::Parents(vec![3])))
            .await
            .unwrap();
        assert!(children.iter().any(|p| p.housenumber.as_deref() == Some("10")));

        let point = Point::new(-0.12757, 51.50344);
        let nearby = conn
            .places(
                &PlaceFilter::new()
                    .with(PlaceCondition::WithinDistance {
                        point,
                        distance: 0.006,
                    })
                    .order_by(PlaceOrder::Distance(point))
                    .limit(1),
            )
            .await
            .unwrap();
        assert_eq!(nearby.len(), 1);
        assert_eq!(nearby[0].housenumber.as_deref(), Some("10"));
    }

    #[tokio::test]
    async fn test_places_by_category() {
        let conn = connection(&TestDataConfig::minimal());
        let pubs = conn
            .places(
                &PlaceFilter::new()
                    .with(PlaceCondition::Categories(vec![Category::new("amenity", "pub")])),
            )
            .await
            .unwrap();
        assert_eq!(pubs.len(), 1);
        assert_eq!(pubs[0].name["name"], "Red Lion");
    }

    #[tokio::test]
    async fn test_interpolations_and_postcodes() {
        let conn = connection(&TestDataConfig::sample());
        let lines = conn
            .interpolations(&LineFilter {
                parents: vec![5],
                numbers: vec![7],
                ..LineFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(lines.len(), 1, "Interpolation 1-21 covers 7");

        let even = conn
            .interpolations(&LineFilter {
                parents: vec![5],
                numbers: vec![8],
                ..LineFilter::default()
            })
            .await
            .unwrap();
        assert!(even.is_empty(), "Odd-only interpolation must not cover 8");

        let tiger = conn
            .tiger(&LineFilter {
                parents: vec![22],
                numbers: vec![150],
                ..LineFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(tiger.len(), 1);

        let postcodes = conn
            .postcodes(&PostcodeFilter {
                postcodes: vec!["sw1a  2aa".into()],
                ..PostcodeFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(postcodes.len(), 1);
        assert_eq!(postcodes[0].country_code, "gb");
    }

    #[tokio::test]
    async fn test_country_grid() {
        let conn = connection(&TestDataConfig::sample());
        let codes = conn
            .country_grid_codes(Point::new(13.4, 52.5))
            .await
            .unwrap();
        assert_eq!(codes, vec!["de".to_owned()]);
        assert!(
            conn.country_grid_codes(Point::new(-30.0, 0.0))
                .await
                .unwrap()
                .is_empty()
        );

        let envelope = conn.country_grid_envelope("gb").await.unwrap().unwrap();
        assert!(envelope.contains(&Point::new(-0.1276, 51.5072)));
        assert!(conn.country_grid_envelope("fr").await.unwrap().is_none());

        let names = conn
            .country_names(&["us".into(), "fr".into()])
            .await
            .unwrap();
        assert_eq!(names.len(), 1);
    }
}
