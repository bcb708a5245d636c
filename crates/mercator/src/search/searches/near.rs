use ahash::AHashSet;
use mercator_data::Category;
use tracing::{debug, instrument};

use super::{AbstractSearch, place_result};
use crate::{
    connection::{PlaceCondition, PlaceFilter, Result, SearchConnection},
    results::{SearchResult, SourceTable},
    search::fields::WeightedCategories,
    types::SearchDetails,
};

/// Base results worse than the best one by more than this are not searched around.
const BASE_ACCURACY_WINDOW: f64 = 0.5;
/// Base results with a larger bounding box are too big to be near anything.
const MAX_BASE_AREA: f64 = 20.0;
const MAX_BASE_RESULTS: usize = 5;
/// Search radius around each base result, in degrees.
const NEAR_DISTANCE: f64 = 0.01;

/// Places of given categories close to the results of another search.
#[derive(Debug, Clone, PartialEq)]
pub struct NearSearch {
    pub penalty: f64,
    pub categories: WeightedCategories,
    pub search: Box<AbstractSearch>,
}

impl NearSearch {
    pub fn new(penalty: f64, categories: WeightedCategories, search: AbstractSearch) -> Self {
        Self {
            penalty,
            categories,
            search: Box::new(search),
        }
    }

    #[instrument(
        name = "Near search",
        level = "debug",
        skip_all,
        fields(penalty = self.penalty, inner = self.search.kind())
    )]
    pub async fn execute<C: SearchConnection + ?Sized>(
        &self,
        conn: &C,
        details: &SearchDetails,
    ) -> Result<Vec<SearchResult>> {
        let mut base = self.search.execute_simple(conn, details).await?;
        if base.is_empty() {
            return Ok(base);
        }
        base.sort_by(|a, b| {
            a.accuracy
                .total_cmp(&b.accuracy)
                .then(a.base.rank_search.cmp(&b.base.rank_search))
        });
        let max_accuracy = base[0].accuracy + BASE_ACCURACY_WINDOW;
        let anchors: Vec<&SearchResult> = base
            .iter()
            .filter(|r| {
                r.base.source_table == SourceTable::Placex
                    && r.accuracy <= max_accuracy
                    && r.bbox.is_some_and(|b| b.area() < MAX_BASE_AREA)
            })
            .take(MAX_BASE_RESULTS)
            .collect();
        debug!(anchors = anchors.len(), "Searching around base results");

        let mut results = Vec::new();
        for (category, penalty) in self.categories.iter() {
            self.lookup_category(conn, &anchors, category, penalty, details, &mut results)
                .await?;
            if results.len() >= details.max_results {
                break;
            }
        }
        Ok(results)
    }

    async fn lookup_category<C: SearchConnection + ?Sized>(
        &self,
        conn: &C,
        anchors: &[&SearchResult],
        category: &Category,
        penalty: f64,
        details: &SearchDetails,
        results: &mut Vec<SearchResult>,
    ) -> Result<()> {
        let mut found = Vec::new();
        for anchor in anchors {
            let point = anchor.base.centroid;
            let filter = PlaceFilter::new()
                .with(PlaceCondition::Categories(vec![category.clone()]))
                .with(PlaceCondition::WithinDistance {
                    point,
                    distance: NEAR_DISTANCE,
                })
                .with(PlaceCondition::RankAddress(details.min_rank, details.max_rank))
                .with_if(!details.countries.is_empty(), || {
                    PlaceCondition::Countries(details.countries.clone())
                })
                .with_if(!details.excluded.is_empty(), || {
                    PlaceCondition::Excluded(details.excluded.clone())
                })
                .with_if(details.layers.is_some(), || {
                    PlaceCondition::Layers(details.layers.unwrap_or_default())
                });
            for row in conn.places(&filter).await? {
                found.push((row.centroid().distance(&point), row));
            }
        }
        found.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut seen = AHashSet::new();
        results.extend(
            found
                .iter()
                .filter(|(_, row)| seen.insert(row.place_id))
                .take(details.max_results)
                .map(|(_, row)| place_result(row, self.penalty + penalty)),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use mercator_data::{TestDataConfig, WordKind, create_test_database};

    use super::*;
    use crate::{
        connection::MemoryConnection,
        search::{
            fields::{FieldLookup, LookupKind, SearchColumn, SearchData},
            searches::PlaceSearch,
        },
    };

    fn whitehall_search(conn: &MemoryConnection) -> AbstractSearch {
        let tok = conn
            .database()
            .words_by_token("whitehall")
            .find(|w| w.kind == WordKind::FullWord)
            .map(|w| w.word_id)
            .unwrap();
        let sdata = SearchData {
            lookups: vec![FieldLookup::new(
                SearchColumn::NameVector,
                vec![tok],
                LookupKind::Any,
            )],
            ..SearchData::default()
        };
        PlaceSearch::new(0.0, &sdata, 1.0).into()
    }

    #[tokio::test]
    async fn test_near_search_finds_pub_next_to_street() {
        let conn = MemoryConnection::new(Arc::new(
            create_test_database(&TestDataConfig::minimal()).unwrap(),
        ));
        let near = NearSearch::new(
            0.3,
            WeightedCategories::uniform([Category::new("amenity", "pub")]),
            whitehall_search(&conn),
        );
        let results = near.execute(&conn, &SearchDetails::default()).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].base.place_id, Some(6));
        assert!((results[0].accuracy - 0.3).abs() < 1e-9, "accuracy is the near search penalty");
    }

    #[tokio::test]
    async fn test_near_search_without_base_results() {
        let conn = MemoryConnection::new(Arc::new(
            create_test_database(&TestDataConfig::minimal()).unwrap(),
        ));
        let near = NearSearch::new(
            0.0,
            WeightedCategories::uniform([Category::new("amenity", "pub")]),
            PlaceSearch::new(
                0.0,
                &SearchData {
                    lookups: vec![FieldLookup::new(
                        SearchColumn::NameVector,
                        vec![-1],
                        LookupKind::All,
                    )],
                    ..SearchData::default()
                },
                1.0,
            )
            .into(),
        );
        assert!(near.execute(&conn, &SearchDetails::default()).await.unwrap().is_empty());
    }
}
