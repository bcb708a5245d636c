use tracing::instrument;

use super::place_result;
use crate::{
    connection::{PlaceCondition, PlaceFilter, PlaceOrder, Result, SearchConnection},
    results::SearchResult,
    search::fields::{SearchData, WeightedCategories, WeightedStrings},
    types::SearchDetails,
};

/// Below this radius all categories are searched in one go around the point.
const SMALL_NEAR_RADIUS: f64 = 0.2;
const UNKNOWN_CATEGORY_PENALTY: f64 = 1000.0;

/// Search for places of a category without a name.
#[derive(Debug, Clone, PartialEq)]
pub struct PoiSearch {
    pub penalty: f64,
    pub qualifiers: WeightedCategories,
    pub countries: WeightedStrings,
}

impl PoiSearch {
    pub fn new(sdata: &SearchData) -> Self {
        Self {
            penalty: sdata.penalty,
            qualifiers: sdata.qualifiers.clone(),
            countries: sdata.countries.clone(),
        }
    }

    fn base_filter(&self, details: &SearchDetails) -> PlaceFilter {
        PlaceFilter::new()
            .with_if(!self.countries.is_empty(), || {
                PlaceCondition::Countries(self.countries.values().map(str::to_owned).collect())
            })
            .limit(details.max_results)
    }

    #[instrument(
        name = "POI search",
        level = "debug",
        skip_all,
        fields(penalty = self.penalty, categories = self.qualifiers.len())
    )]
    pub async fn execute<C: SearchConnection + ?Sized>(
        &self,
        conn: &C,
        details: &SearchDetails,
    ) -> Result<Vec<SearchResult>> {
        let bounded = details.viewbox.filter(|_| details.bounded_viewbox);
        let rows = match (details.near, details.near_radius) {
            (Some(point), Some(distance)) if distance < SMALL_NEAR_RADIUS => {
                let mut filter = self
                    .base_filter(details)
                    .with(PlaceCondition::Unlinked)
                    .with(PlaceCondition::WithinDistance { point, distance })
                    .with(PlaceCondition::Categories(
                        self.qualifiers.values().cloned().collect(),
                    ))
                    .order_by(PlaceOrder::CentroidDistance(point));
                if let Some(viewbox) = bounded {
                    filter = filter.with(PlaceCondition::IntersectsBox(viewbox));
                }
                conn.places(&filter).await?
            }
            _ => {
                let mut rows = Vec::new();
                for category in self.qualifiers.values() {
                    let mut filter = self
                        .base_filter(details)
                        .with(PlaceCondition::Categories(vec![category.clone()]));
                    if let Some(viewbox) = bounded {
                        filter = filter.with(PlaceCondition::CentroidInBox(viewbox));
                    }
                    if let Some(point) = details.near {
                        if let Some(distance) = details.near_radius {
                            filter = filter
                                .with(PlaceCondition::CentroidWithinDistance { point, distance });
                        }
                        filter = filter.order_by(PlaceOrder::CentroidDistance(point));
                    }
                    rows.extend(conn.places(&filter).await?);
                }
                rows
            }
        };

        Ok(rows
            .iter()
            .map(|row| {
                place_result(
                    row,
                    self.penalty
                        + self
                            .qualifiers
                            .get_penalty(&row.category, UNKNOWN_CATEGORY_PENALTY),
                )
            })
            .collect())
    }
}
