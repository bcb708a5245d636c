use mercator_data::normalize_postcode;
use tracing::instrument;

use super::viewbox_penalty;
use crate::{
    connection::{PostcodeFilter, Result, SearchConnection},
    results::{BaseResult, SearchResult},
    search::fields::{FieldLookup, FieldRanking, SearchData, WeightedStrings},
    types::SearchDetails,
};

/// Penalty of a postcode row whose value has no weight of its own.
const UNWEIGHTED_POSTCODE_PENALTY: f64 = 1.0;

/// Search for postcode areas, optionally restricted by the address of their parent.
#[derive(Debug, Clone, PartialEq)]
pub struct PostcodeSearch {
    pub penalty: f64,
    pub postcodes: WeightedStrings,
    pub countries: WeightedStrings,
    /// Restrictions on the search terms of the postcode's parent.
    pub lookups: Vec<FieldLookup>,
    pub rankings: Vec<FieldRanking>,
}

impl PostcodeSearch {
    pub fn new(extra_penalty: f64, sdata: &SearchData) -> Self {
        Self {
            penalty: sdata.penalty + extra_penalty,
            postcodes: sdata.postcodes.clone(),
            countries: sdata.countries.clone(),
            lookups: sdata.lookups.clone(),
            rankings: sdata.rankings.clone(),
        }
    }

    fn postcode_weight(&self, value: &str) -> f64 {
        let value = normalize_postcode(value);
        self.postcodes
            .iter()
            .find(|(pc, _)| normalize_postcode(pc) == value)
            .map_or(UNWEIGHTED_POSTCODE_PENALTY, |(_, p)| p)
    }

    #[instrument(name = "Postcode search", level = "debug", skip_all, fields(penalty = self.penalty))]
    pub async fn execute<C: SearchConnection + ?Sized>(
        &self,
        conn: &C,
        details: &SearchDetails,
    ) -> Result<Vec<SearchResult>> {
        let filter = PostcodeFilter {
            postcodes: self.postcodes.values().map(str::to_owned).collect(),
            countries: self.countries.values().map(str::to_owned).collect(),
            excluded: details.excluded.clone(),
            intersects: details.viewbox.filter(|_| details.bounded_viewbox),
            near: details.near.zip(details.near_radius),
            order_near: details.near,
            ..PostcodeFilter::default()
        };
        let rows = conn.postcodes(&filter).await?;
        let restricted = !self.lookups.is_empty() || !self.rankings.is_empty();

        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            let mut penalty = self.penalty + viewbox_penalty(&row.geometry, details);

            if restricted {
                let vectors = match row.parent_place_id {
                    Some(parent) => conn.search_vectors(parent).await?,
                    None => None,
                };
                match vectors {
                    Some(vectors) => {
                        let all_terms = |tokens: &[i64]| {
                            tokens.iter().all(|t| {
                                vectors.name_vector.contains(t)
                                    || vectors.nameaddress_vector.contains(t)
                            })
                        };
                        if !self.lookups.iter().all(|l| all_terms(&l.tokens)) {
                            continue;
                        }
                        penalty += self
                            .rankings
                            .iter()
                            .map(|r| r.penalty_for(&vectors))
                            .sum::<f64>();
                    }
                    None if !self.lookups.is_empty() => continue,
                    None => penalty += self.rankings.iter().map(|r| r.default).sum::<f64>(),
                }
            }

            penalty += self.postcode_weight(&row.postcode);
            results.push(SearchResult {
                bbox: Some(row.geometry.bbox()),
                ..SearchResult::new(BaseResult::from_postcode(&row), penalty)
            });
        }

        results.sort_by(|a, b| a.accuracy.total_cmp(&b.accuracy));
        results.truncate(details.max_results);
        Ok(results)
    }
}
