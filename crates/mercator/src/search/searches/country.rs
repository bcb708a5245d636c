use mercator_data::Geometry;
use tracing::{debug, instrument};

use super::place_result;
use crate::{
    connection::{PlaceCondition, PlaceFilter, Result, SearchConnection},
    results::{BaseResult, SearchResult},
    search::fields::{SearchData, WeightedStrings},
    types::SearchDetails,
};

/// Penalty of a country that has no weight in the search.
const UNWEIGHTED_COUNTRY_PENALTY: f64 = 5.0;

/// Search for countries by code.
#[derive(Debug, Clone, PartialEq)]
pub struct CountrySearch {
    pub penalty: f64,
    pub countries: WeightedStrings,
}

impl CountrySearch {
    pub fn new(penalty: f64, countries: WeightedStrings) -> Self {
        Self { penalty, countries }
    }

    pub fn from_data(sdata: &SearchData) -> Self {
        Self::new(sdata.penalty, sdata.countries.clone())
    }

    #[instrument(name = "Country search", level = "debug", skip_all, fields(penalty = self.penalty))]
    pub async fn execute<C: SearchConnection + ?Sized>(
        &self,
        conn: &C,
        details: &SearchDetails,
    ) -> Result<Vec<SearchResult>> {
        let codes: Vec<String> = self.countries.values().map(str::to_owned).collect();
        let mut filter = PlaceFilter::new()
            .with(PlaceCondition::Countries(codes.clone()))
            .with(PlaceCondition::RankAddress(4, 4))
            .with_if(!details.excluded.is_empty(), || {
                PlaceCondition::Excluded(details.excluded.clone())
            });
        if details.bounded_viewbox
            && let Some(viewbox) = details.viewbox
        {
            filter = filter.with(PlaceCondition::IntersectsBox(viewbox));
        }
        if let (Some(point), Some(distance)) = (details.near, details.near_radius) {
            filter = filter.with(PlaceCondition::WithinDistance { point, distance });
        }

        let rows = conn.places(&filter).await?;
        if rows.is_empty() {
            debug!("No country places, falling back to the country table");
            return self.lookup_in_country_table(conn, &codes, details).await;
        }
        Ok(rows
            .iter()
            .map(|row| {
                let cc = row.country_code.as_deref().unwrap_or_default();
                place_result(
                    row,
                    self.penalty + self.countries.get_penalty(cc, UNWEIGHTED_COUNTRY_PENALTY),
                )
            })
            .collect())
    }

    /// Countries without a place record, placed at the center of their grid.
    async fn lookup_in_country_table<C: SearchConnection + ?Sized>(
        &self,
        conn: &C,
        codes: &[String],
        details: &SearchDetails,
    ) -> Result<Vec<SearchResult>> {
        if !details.excluded.is_empty() {
            return Ok(Vec::new());
        }
        let names = conn.country_names(codes).await?;
        let mut results = Vec::new();
        for name in names.iter() {
            let Some(envelope) = conn.country_grid_envelope(&name.country_code).await? else {
                continue;
            };
            if details.bounded_viewbox
                && details.viewbox.is_some_and(|vb| !vb.intersects(&envelope))
            {
                continue;
            }
            if let (Some(point), Some(radius)) = (details.near, details.near_radius)
                && Geometry::rect(envelope).distance_to(&point) > radius
            {
                continue;
            }
            let accuracy = self.penalty
                + self
                    .countries
                    .get_penalty(&name.country_code, UNWEIGHTED_COUNTRY_PENALTY);
            results.push(SearchResult {
                bbox: Some(envelope),
                ..SearchResult::new(BaseResult::from_country(name, envelope.center()), accuracy)
            });
        }
        Ok(results)
    }
}
