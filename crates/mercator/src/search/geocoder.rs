//! Forward geocoding: from phrases to a ranked list of results.

use std::time::{Duration, Instant};

use ahash::AHashMap;
use mercator_data::Category;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, instrument};

use super::{
    Result,
    analyzer::QueryAnalyzer,
    builder::{SearchBuilder, build_poi_search, wrap_near_search},
    query::{Phrase, QueryStruct},
    searches::AbstractSearch,
    token_assignment::TokenAssignments,
};
use crate::{
    connection::SearchConnection,
    results::{SearchResult, add_result_details},
    trace::{NOOP_TRACE, SearchTrace},
    types::SearchDetails,
};

/// Similarity of the character multisets of `a` and `b`: `2·M / (|a| + |b|)` where `M` is
/// the number of characters both have in common.
pub fn quick_ratio(a: &str, b: &str) -> f64 {
    let mut counts: AHashMap<char, usize> = AHashMap::new();
    for c in b.chars() {
        *counts.entry(c).or_default() += 1;
    }
    let mut matches = 0usize;
    for c in a.chars() {
        if let Some(n) = counts.get_mut(&c)
            && *n > 0
        {
            *n -= 1;
            matches += 1;
        }
    }
    let total = a.chars().count() + b.chars().count();
    if total == 0 {
        return 1.0;
    }
    2.0 * matches as f64 / total as f64
}

/// Upper bound of searches sent to storage per request.
pub const MAX_EXECUTED_SEARCHES: usize = 20;
/// Only this many of the cheapest searches are considered at all.
const MAX_CANDIDATE_SEARCHES: usize = 50;
/// Searches more expensive than the first one by this much are not run.
const PENALTY_WINDOW: f64 = 2.0;
const ACCURACY_FACTOR: f64 = 1.2;
/// Results worse than the best by this much are cut.
const RANKING_WINDOW: f64 = 0.5;
const RANK_SEARCH_WEIGHT: f64 = 0.05;

static QUERY_WORD_SPLIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[, ]+").expect("Failed to compile query word pattern"));

/// Runs a free-text or structured search against one connection.
pub struct ForwardGeocoder<'a, C: SearchConnection + ?Sized> {
    conn: &'a C,
    analyzer: &'a dyn QueryAnalyzer,
    details: &'a SearchDetails,
    timeout: Option<Duration>,
    trace: &'a dyn SearchTrace,
}

impl<'a, C: SearchConnection + ?Sized> ForwardGeocoder<'a, C> {
    pub fn new(
        conn: &'a C,
        analyzer: &'a dyn QueryAnalyzer,
        details: &'a SearchDetails,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            conn,
            analyzer,
            details,
            timeout,
            trace: &NOOP_TRACE,
        }
    }

    pub fn with_trace(mut self, trace: &'a dyn SearchTrace) -> Self {
        self.trace = trace;
        self
    }

    /// Analyze the phrases and turn every token assignment into searches, cheapest first.
    pub async fn build_searches(
        &self,
        phrases: &[Phrase],
    ) -> Result<(QueryStruct, Vec<AbstractSearch>)> {
        let query = self.analyzer.analyze_query(phrases).await?;
        if query.source.is_empty() {
            return Ok((query, Vec::new()));
        }

        self.trace.section("Compute abstract searches");
        let builder = SearchBuilder::new(&query, self.details).with_trace(self.trace);
        let mut searches: Vec<AbstractSearch> = TokenAssignments::new(&query)
            .with_trace(self.trace)
            .flat_map(|assignment| builder.build(&assignment))
            .collect();
        searches.sort_by(|a, b| a.penalty().total_cmp(&b.penalty()));
        debug!(searches = searches.len(), "Built searches");

        if self.trace.is_enabled() {
            let rows: Vec<Vec<String>> = searches
                .iter()
                .map(|s| vec![format!("{:.3}", s.penalty()), s.kind().to_owned()])
                .collect();
            self.trace.table_dump("Searches", &rows);
        }
        Ok((query, searches))
    }

    /// Run the searches cheapest first until the results are good enough, the search
    /// budget is used up or the deadline has passed. Duplicates keep their best accuracy.
    #[instrument(name = "Execute searches", level = "debug", skip_all, fields(searches = searches.len()))]
    pub async fn execute_searches(
        &self,
        query: &QueryStruct,
        searches: &[AbstractSearch],
    ) -> Result<Vec<SearchResult>> {
        let mut ordered: Vec<&AbstractSearch> = searches.iter().collect();
        ordered.sort_by(|a, b| a.penalty().total_cmp(&b.penalty()));
        let Some(first) = ordered.first() else {
            return Ok(Vec::new());
        };
        let deadline = self.timeout.map(|t| Instant::now() + t);
        let mut results: Vec<SearchResult> = Vec::new();
        let mut seen = AHashMap::new();
        let mut min_ranking = first.penalty() + PENALTY_WINDOW;
        let mut prev_penalty = 0.0;

        for (i, search) in ordered.into_iter().enumerate() {
            let penalty = search.penalty();
            if i >= MAX_EXECUTED_SEARCHES || (penalty > prev_penalty && penalty > min_ranking) {
                debug!(executed = i, "Stopping search execution");
                break;
            }
            if self.trace.is_enabled() {
                self.trace.var_dump(&format!("Search {i}"), search);
            }
            for result in search.execute(self.conn, self.details).await? {
                min_ranking = min_ranking.min(result.accuracy * ACCURACY_FACTOR);
                match seen.get(&result.dedup_key()) {
                    Some(&pos) => {
                        let existing: &mut SearchResult = &mut results[pos];
                        if result.accuracy < existing.accuracy {
                            *existing = result;
                        }
                    }
                    None => {
                        seen.insert(result.dedup_key(), results.len());
                        results.push(result);
                    }
                }
            }
            prev_penalty = penalty;
            if deadline.is_some_and(|d| Instant::now() >= d) {
                debug!(executed = i + 1, "Search deadline reached");
                break;
            }
        }

        if self.trace.is_enabled() {
            self.trace.comment(&format!("Query: {:?}", query.source));
            self.trace.result_dump(
                "Preliminary results",
                &results
                    .iter()
                    .map(|r| (r.accuracy, r.base.label()))
                    .collect::<Vec<_>>(),
            );
        }
        Ok(results)
    }

    /// Add a penalty for query words that do not show up in the display name.
    pub fn rerank_by_query(&self, query: &QueryStruct, results: &mut [SearchResult]) {
        let qwords: Vec<&str> = query
            .source
            .iter()
            .flat_map(|p| QUERY_WORD_SPLIT.split(&p.text))
            .filter(|w| !w.is_empty())
            .collect();
        let total_len: usize = qwords.iter().map(|w| w.chars().count()).sum();
        if total_len == 0 {
            return;
        }

        for result in results.iter_mut() {
            let Some(display_name) = &result.base.display_name else {
                continue;
            };
            if result.base.importance.is_some_and(|i| i < 0.0) {
                continue;
            }
            let norm = self.analyzer.normalize_text(&format!(
                "{} {}",
                display_name,
                result.base.country_code.as_deref().unwrap_or("")
            ));
            let words: Vec<&str> = norm.split(' ').filter(|w| !w.is_empty()).collect();
            if words.is_empty() {
                continue;
            }

            let mut distance = 0.0;
            for qword in &qwords {
                let len = qword.chars().count() as f64;
                let ratio = words
                    .iter()
                    .map(|w| quick_ratio(qword, w))
                    .fold(0.0, f64::max);
                distance += if ratio < 0.5 { len } else { (1.0 - ratio) * len };
            }
            // Country names carry no match penalty from the analyzer.
            if result.base.rank_address == 4 {
                distance *= 2.0;
            }
            result.accuracy += distance * 0.4 / total_len as f64;
        }
    }

    /// Sort by ranking and drop results that are clearly worse than the best one.
    /// Applying it twice gives the same list.
    pub fn sort_and_cut_results(&self, mut results: Vec<SearchResult>) -> Vec<SearchResult> {
        if results.is_empty() {
            return results;
        }
        results.sort_by(|a, b| {
            a.ranking().total_cmp(&b.ranking()).then_with(|| {
                let area = |r: &SearchResult| r.bbox.map_or(0.0, |b| -b.area());
                area(a).total_cmp(&area(b))
            })
        });
        let min_ranking = results[0].ranking();
        let mut min_rank = results[0].base.rank_search;

        let mut kept = Vec::with_capacity(results.len().min(self.details.max_results));
        for result in results {
            if kept.len() >= self.details.max_results {
                break;
            }
            if result.ranking() >= min_ranking + RANKING_WINDOW {
                continue;
            }
            let rank_diff = f64::from(result.base.rank_search) - f64::from(min_rank);
            if result.ranking() + RANK_SEARCH_WEIGHT * rank_diff < min_ranking + RANKING_WINDOW {
                min_rank = min_rank.min(result.base.rank_search);
                kept.push(result);
            }
        }
        kept
    }

    /// Search for places matching the phrases.
    #[instrument(name = "Forward lookup", level = "info", skip_all, fields(phrases = phrases.len()))]
    pub async fn lookup(&self, phrases: &[Phrase]) -> Result<Vec<SearchResult>> {
        if self.details.is_impossible() {
            debug!("Search parameters exclude every result");
            return Ok(Vec::new());
        }
        let t = Instant::now();
        let (query, mut searches) = self.build_searches(phrases).await?;
        searches.truncate(MAX_CANDIDATE_SEARCHES);
        if searches.is_empty() {
            return Ok(Vec::new());
        }

        let mut results = self.execute_searches(&query, &searches).await?;
        add_result_details(self.conn, &mut results, &self.details.lookup, self.trace).await?;
        self.rerank_by_query(&query, &mut results);
        let results = self.sort_and_cut_results(results);
        info!(elapsed_ms = ?t.elapsed(), results = results.len(), "Forward lookup done");
        Ok(results)
    }

    /// Search for places of the given categories, near the places matching the phrases
    /// when there are any.
    #[instrument(
        name = "Category lookup",
        level = "info",
        skip_all,
        fields(categories = categories.len(), phrases = phrases.len())
    )]
    pub async fn lookup_pois(
        &self,
        categories: &[Category],
        phrases: &[Phrase],
    ) -> Result<Vec<SearchResult>> {
        if self.details.is_impossible() {
            return Ok(Vec::new());
        }
        let t = Instant::now();
        let results = if phrases.is_empty() {
            if self.details.near.is_none() && !self.details.has_bounded_viewbox() {
                debug!("Category search without a location");
                return Ok(Vec::new());
            }
            let search = build_poi_search(categories.to_vec(), &self.details.countries);
            let mut results = search.execute(self.conn, self.details).await?;
            add_result_details(self.conn, &mut results, &self.details.lookup, self.trace)
                .await?;
            self.sort_and_cut_results(results)
        } else {
            let (query, searches) = self.build_searches(phrases).await?;
            if query.source.is_empty() {
                return Ok(Vec::new());
            }
            let searches: Vec<AbstractSearch> = searches
                .into_iter()
                .take(MAX_CANDIDATE_SEARCHES)
                .map(|s| wrap_near_search(categories.to_vec(), s))
                .collect();
            let mut results = self.execute_searches(&query, &searches).await?;
            add_result_details(self.conn, &mut results, &self.details.lookup, self.trace)
                .await?;
            self.sort_and_cut_results(results)
        };
        info!(elapsed_ms = ?t.elapsed(), results = results.len(), "Category lookup done");
        Ok(results)
    }
}
