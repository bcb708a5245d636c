use std::{cmp::Ordering, sync::Arc};

use mercator_data::{
    Category, InterpolationRow, OsmType, PlaceRow, PostcodeRow, normalize_postcode,
};
use tracing::{debug, instrument};

use super::{place_result, viewbox_penalty};
use crate::{
    connection::{
        LineFilter, PlaceCondition, PlaceFilter, PostcodeFilter, Result, SearchConnection,
        housenumber_matches,
    },
    results::{BaseResult, SearchResult},
    search::fields::{
        FieldLookup, FieldRanking, SearchData, WeightedCategories, WeightedStrings,
    },
    types::SearchDetails,
};

/// Streets and places considered before their house numbers are looked up.
const HOUSENUMBER_CANDIDATES: usize = 10000;
/// With more expected matches than this, a postcode must lie close to the result.
const POSTCODE_RESTRICT_COUNT: f64 = 1000.0;
const POSTCODE_RESTRICT_DISTANCE: f64 = 0.12;
const MISSING_POSTCODE_PENALTY: f64 = 2.0;
/// Added to a street when one of its houses was asked for.
const MISSING_HOUSENUMBER_PENALTY: f64 = 1.0;
/// Added to a house that only shares the street with the requested number.
const WRONG_HOUSENUMBER_PENALTY: f64 = 0.6;
/// Above this expected count results are left in index order.
const LARGE_RESULT_COUNT: f64 = 10000.0;

/// Search for named places, optionally restricted by address, postcode, country,
/// category and house number.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceSearch {
    pub penalty: f64,
    pub lookups: Vec<FieldLookup>,
    pub rankings: Vec<FieldRanking>,
    pub housenumbers: WeightedStrings,
    pub postcodes: WeightedStrings,
    pub countries: WeightedStrings,
    pub qualifiers: WeightedCategories,
    /// Estimated number of rows the lookups return.
    pub expected_count: f64,
}

/// Where the houses of a street were found.
#[derive(Debug)]
enum Houses {
    Placex(Vec<Arc<PlaceRow>>),
    Interpolation(Vec<Arc<InterpolationRow>>),
    Tiger(Vec<Arc<InterpolationRow>>),
    None,
}

impl Houses {
    const fn sort_order(&self) -> u8 {
        match self {
            Self::Placex(_) => 1,
            Self::Interpolation(_) => 2,
            Self::Tiger(_) => 3,
            Self::None => 4,
        }
    }
}

#[derive(Debug)]
struct Candidate {
    place: Arc<PlaceRow>,
    accuracy: f64,
    /// Centroid distance to the `near` point.
    distance: Option<f64>,
    houses: Houses,
}

impl PlaceSearch {
    pub fn new(extra_penalty: f64, sdata: &SearchData, expected_count: f64) -> Self {
        Self {
            penalty: sdata.penalty + extra_penalty,
            lookups: sdata.lookups.clone(),
            rankings: sdata.rankings.clone(),
            housenumbers: sdata.housenumbers.clone(),
            postcodes: sdata.postcodes.clone(),
            countries: sdata.countries.clone(),
            qualifiers: sdata.qualifiers.clone(),
            expected_count,
        }
    }

    fn place_filter(&self, details: &SearchDetails) -> PlaceFilter {
        let hnrs: Vec<String> = self.housenumbers.values().map(str::to_owned).collect();
        let mut filter = PlaceFilter::new()
            .with_if(!self.countries.is_empty(), || {
                PlaceCondition::Countries(self.countries.values().map(str::to_owned).collect())
            })
            .with_if(!self.postcodes.is_empty(), || PlaceCondition::RankAddress(10, 30));

        if let Some(viewbox) = details.viewbox {
            if details.bounded_viewbox {
                filter = filter.with(PlaceCondition::CentroidInBox(viewbox));
            } else if self.expected_count >= LARGE_RESULT_COUNT {
                filter = filter.with(PlaceCondition::CentroidInBox(viewbox.scaled_by_two()));
            }
        }
        if let (Some(point), Some(distance)) = (details.near, details.near_radius) {
            filter = filter.with(PlaceCondition::CentroidWithinDistance { point, distance });
        }

        if hnrs.is_empty() {
            filter
                .with(PlaceCondition::Unlinked)
                .with_if(!self.qualifiers.is_empty(), || {
                    PlaceCondition::Categories(self.qualifiers.values().cloned().collect())
                })
                .with_if(!details.excluded.is_empty(), || {
                    PlaceCondition::Excluded(details.excluded.clone())
                })
                .with(PlaceCondition::RankWindow {
                    min: details.min_rank,
                    max: details.max_rank,
                })
                .with_if(details.layers.is_some(), || {
                    PlaceCondition::Layers(details.layers.unwrap_or_default())
                })
        } else {
            filter.with(PlaceCondition::RankAddress(16, 30)).with(PlaceCondition::Any(vec![
                PlaceCondition::RankAddress(16, 29),
                PlaceCondition::Housenumbers(hnrs),
            ]))
        }
    }

    /// Penalty for the postcode of the row, `None` when the row is too far away from
    /// every requested postcode.
    fn postcode_penalty(&self, row: &PlaceRow, postcodes: &[Arc<PostcodeRow>]) -> Option<f64> {
        let centroid = row.centroid();
        let closest = postcodes
            .iter()
            .map(|pc| pc.geometry.distance_to(&centroid))
            .reduce(f64::min);
        if self.expected_count > POSTCODE_RESTRICT_COUNT
            && !closest.is_some_and(|d| d <= POSTCODE_RESTRICT_DISTANCE)
        {
            return None;
        }
        let has_postcode = row.postcode.as_deref().is_some_and(|pc| {
            let pc = normalize_postcode(pc);
            self.postcodes.values().any(|v| normalize_postcode(v) == pc)
        });
        Some(if has_postcode {
            0.0
        } else {
            closest.unwrap_or(MISSING_POSTCODE_PENALTY)
        })
    }

    fn sort_candidates(&self, candidates: &mut [Candidate], details: &SearchDetails) {
        if details.near.is_some() {
            candidates.sort_by(|a, b| {
                a.distance
                    .unwrap_or(f64::INFINITY)
                    .total_cmp(&b.distance.unwrap_or(f64::INFINITY))
            });
            return;
        }
        let by_importance = self.expected_count < LARGE_RESULT_COUNT
            || details.viewbox.is_some_and(|vb| vb.area() < 0.5);
        let by_accuracy = self.expected_count < LARGE_RESULT_COUNT;
        if !by_importance && !by_accuracy {
            return;
        }
        candidates.sort_by(|a, b| {
            let primary = if by_importance {
                let rank = |c: &Candidate| c.accuracy - importance_of(&c.place);
                rank(a).total_cmp(&rank(b))
            } else {
                Ordering::Equal
            };
            primary.then_with(|| {
                if by_accuracy {
                    a.accuracy.total_cmp(&b.accuracy)
                } else {
                    Ordering::Equal
                }
            })
        });
    }

    /// Numeric house numbers usable on interpolation lines.
    fn numerals(&self) -> Vec<u32> {
        self.housenumbers
            .values()
            .filter(|n| !n.is_empty() && n.len() < 8 && n.chars().all(|c| c.is_ascii_digit()))
            .filter_map(|n| n.parse().ok())
            .collect()
    }

    async fn find_houses<C: SearchConnection + ?Sized>(
        &self,
        conn: &C,
        street: &PlaceRow,
        numerals: &[u32],
        details: &SearchDetails,
    ) -> Result<Houses> {
        let filter = PlaceFilter::new()
            .with(PlaceCondition::Parents(vec![street.place_id]))
            .with(PlaceCondition::Housenumbers(
                self.housenumbers.values().map(str::to_owned).collect(),
            ))
            .with(PlaceCondition::Unlinked)
            .with_if(!details.excluded.is_empty(), || {
                PlaceCondition::Excluded(details.excluded.clone())
            })
            .with_if(!self.qualifiers.is_empty(), || {
                PlaceCondition::Categories(self.qualifiers.values().cloned().collect())
            });
        let houses = conn.places(&filter).await?;
        if !houses.is_empty() {
            return Ok(Houses::Placex(houses));
        }

        if numerals.is_empty()
            || !(self.qualifiers.is_empty()
                || self.qualifiers.contains(&Category::new("place", "house")))
        {
            return Ok(Houses::None);
        }
        let line_filter = LineFilter {
            parents: vec![street.place_id],
            numbers: numerals.to_vec(),
            excluded: details.excluded.clone(),
            ..LineFilter::default()
        };
        let lines = conn.interpolations(&line_filter).await?;
        if !lines.is_empty() {
            return Ok(Houses::Interpolation(lines));
        }
        if street.country_code.as_deref() == Some("us") {
            let lines = conn.tiger(&line_filter).await?;
            if !lines.is_empty() {
                return Ok(Houses::Tiger(lines));
            }
        }
        Ok(Houses::None)
    }

    fn house_results(
        &self,
        street: &Candidate,
        numerals: &[u32],
        out: &mut Vec<SearchResult>,
    ) {
        let wanted: Vec<String> = self.housenumbers.values().map(str::to_owned).collect();
        let accuracy_for = |hnr: Option<&str>| {
            if hnr.is_some_and(|h| housenumber_matches(h, &wanted)) {
                street.accuracy
            } else {
                street.accuracy + WRONG_HOUSENUMBER_PENALTY
            }
        };
        match &street.houses {
            Houses::Placex(rows) => {
                for row in rows {
                    out.push(place_result(row, accuracy_for(row.housenumber.as_deref())));
                }
            }
            Houses::Interpolation(lines) | Houses::Tiger(lines) => {
                let tiger = matches!(street.houses, Houses::Tiger(_));
                for line in lines {
                    for &number in numerals.iter().filter(|n| line.covers(**n)) {
                        let centroid = line.house_position(number);
                        let base = if tiger {
                            BaseResult::from_tiger(
                                line,
                                Some(number),
                                centroid,
                                Some((OsmType::Way, street.place.osm_id)),
                            )
                        } else {
                            BaseResult::from_interpolation(line, Some(number), centroid)
                        };
                        let hnr = number.to_string();
                        out.push(SearchResult {
                            bbox: Some(line.linegeo.bbox()),
                            ..SearchResult::new(base, accuracy_for(Some(&hnr)))
                        });
                    }
                }
            }
            Houses::None => {}
        }
    }

    #[instrument(
        name = "Place search",
        level = "debug",
        skip_all,
        fields(penalty = self.penalty, expected = self.expected_count)
    )]
    pub async fn execute<C: SearchConnection + ?Sized>(
        &self,
        conn: &C,
        details: &SearchDetails,
    ) -> Result<Vec<SearchResult>> {
        let postcode_rows = if self.postcodes.is_empty() {
            Vec::new()
        } else {
            let filter = PostcodeFilter {
                postcodes: self.postcodes.values().map(str::to_owned).collect(),
                ..PostcodeFilter::default()
            };
            conn.postcodes(&filter).await?
        };

        let matches = conn
            .search_names(&self.lookups, &self.place_filter(details))
            .await?;
        debug!(matches = matches.len(), "Name lookup done");

        let unbounded_penalty =
            !details.bounded_viewbox && self.expected_count < LARGE_RESULT_COUNT;
        let mut candidates: Vec<Candidate> = matches
            .into_iter()
            .filter_map(|m| {
                let mut accuracy = self.penalty
                    + self
                        .rankings
                        .iter()
                        .map(|r| r.penalty_for(&m.search))
                        .sum::<f64>();
                if !self.postcodes.is_empty() {
                    accuracy += self.postcode_penalty(&m.place, &postcode_rows)?;
                }
                if unbounded_penalty {
                    accuracy += viewbox_penalty(&m.place.geometry, details);
                }
                let distance = details.near.map(|p| m.place.centroid().distance(&p));
                Some(Candidate {
                    place: m.place,
                    accuracy,
                    distance,
                    houses: Houses::None,
                })
            })
            .collect();
        self.sort_candidates(&mut candidates, details);

        let numerals = self.numerals();
        if !self.housenumbers.is_empty() {
            candidates.truncate(HOUSENUMBER_CANDIDATES);
            for candidate in &mut candidates {
                if candidate.place.rank_address < 30 {
                    candidate.houses = self
                        .find_houses(conn, &candidate.place, &numerals, details)
                        .await?;
                }
            }
            candidates.sort_by(|a, b| {
                a.houses
                    .sort_order()
                    .cmp(&b.houses.sort_order())
                    .then(a.accuracy.total_cmp(&b.accuracy))
            });
        }
        candidates.truncate(details.max_results);

        let mut results = Vec::new();
        for candidate in &candidates {
            let mut result = place_result(&candidate.place, candidate.accuracy);
            if let Some(distance) = candidate.distance {
                result.base.importance = Some(-distance);
            }
            let is_street = !self.housenumbers.is_empty() && candidate.place.rank_address < 30;
            if is_street {
                result.accuracy += MISSING_HOUSENUMBER_PENALTY;
            }
            if !details.excluded.contains(&candidate.place.place_id) {
                results.push(result);
            }
            if is_street {
                self.house_results(candidate, &numerals, &mut results);
            }
        }
        Ok(results)
    }
}

fn importance_of(row: &PlaceRow) -> f64 {
    row.importance
        .filter(|i| *i > 0.0)
        .unwrap_or(0.75001 - f64::from(row.rank_search) / 40.0)
}
