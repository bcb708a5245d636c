//! Conversion of token assignments into abstract searches.
//!
//! For every [`TokenAssignment`] the builder collects the non-name fields into a
//! [`SearchData`], then picks the kind of search from the roles that are present and,
//! for name searches, one or more lookup strategies depending on how frequent the
//! terms are.

use std::{cmp::Reverse, collections::BinaryHeap};

use ahash::AHashMap;
use mercator_data::{Category, TokenId};

use super::{
    fields::{
        FieldLookup, FieldRanking, LookupKind, RankedTokens, SearchColumn, SearchData,
        WeightedCategories, WeightedStrings, lookup_by_any_name, lookup_by_names,
    },
    query::{QueryStruct, Token, TokenRange, TokenType},
    searches::{
        AbstractSearch, CountrySearch, NearSearch, PlaceSearch, PoiSearch, PostcodeSearch,
    },
    token_assignment::{TokenAssignment, penalty_tokenchange},
};
use crate::{
    trace::{NOOP_TRACE, SearchTrace},
    types::{DataLayer, SearchDetails},
};

/// Expected row count below which partial name terms are looked up directly.
const PARTIAL_LOOKUP_LIMIT: f64 = 8000.0;
/// Expected row count below which full names and the last-resort lookup are tried.
const FULL_LOOKUP_LIMIT: f64 = 10000.0;
/// More address variants than this are not ranked individually.
const MAX_ADDRESS_VARIANTS: usize = 10;

/// Wrap `search` into a search for places of the given categories close to its results.
pub fn wrap_near_search(categories: Vec<Category>, search: AbstractSearch) -> AbstractSearch {
    NearSearch::new(
        search.penalty(),
        WeightedCategories::uniform(categories),
        search,
    )
    .into()
}

/// Search for places of the given categories, optionally only in some countries.
pub fn build_poi_search(categories: Vec<Category>, countries: &[String]) -> AbstractSearch {
    let sdata = SearchData::default()
        .with_qualifiers(WeightedCategories::uniform(categories))
        .with_countries(WeightedStrings::uniform(countries.iter().cloned()));
    PoiSearch::new(&sdata).into()
}

fn halved(count: f64, times: usize) -> f64 {
    count / 2f64.powi(times as i32)
}

pub struct SearchBuilder<'a> {
    query: &'a QueryStruct,
    details: &'a SearchDetails,
    trace: &'a dyn SearchTrace,
}

impl<'a> SearchBuilder<'a> {
    pub fn new(query: &'a QueryStruct, details: &'a SearchDetails) -> Self {
        Self {
            query,
            details,
            trace: &NOOP_TRACE,
        }
    }

    pub fn with_trace(mut self, trace: &'a dyn SearchTrace) -> Self {
        self.trace = trace;
        self
    }

    /// Countries may appear in the results.
    pub fn configured_for_country(&self) -> bool {
        self.details.min_rank <= 4
            && self.details.max_rank >= 4
            && self.details.layer_enabled(DataLayer::ADDRESS)
    }

    /// Postcodes may appear in the results.
    pub fn configured_for_postcode(&self) -> bool {
        self.details.min_rank <= 5
            && self.details.max_rank >= 11
            && self.details.layer_enabled(DataLayer::ADDRESS)
    }

    /// Houses may appear in the results.
    pub fn configured_for_housenumbers(&self) -> bool {
        self.details.max_rank >= 30 && self.details.layer_enabled(DataLayer::ADDRESS)
    }

    /// All searches for the given assignment.
    pub fn build(&self, assignment: &TokenAssignment) -> Vec<AbstractSearch> {
        let Some(sdata) = self.get_search_data(assignment) else {
            return Vec::new();
        };
        let near_items = self.get_near_items(assignment);
        if near_items.as_ref().is_some_and(WeightedCategories::is_empty) {
            // Near items and the requested categories do not intersect.
            return Vec::new();
        }

        let (searches, near_items) = match assignment.name {
            None => match near_items {
                Some(items) if sdata.postcodes.is_empty() => {
                    (self.build_poi_search(&sdata.with_qualifiers(items)), None)
                }
                near_items => {
                    let searches = match assignment.housenumber {
                        Some(hnr) => self.build_housenumber_search(
                            &sdata,
                            self.query.get_tokens(hnr, TokenType::HouseNumber),
                            &assignment.address,
                        ),
                        None => self.build_special_search(
                            &sdata,
                            &assignment.address,
                            near_items.is_some(),
                        ),
                    };
                    (searches, near_items)
                }
            },
            Some(name) => (
                self.build_name_search(&sdata, name, &assignment.address, near_items.is_some()),
                near_items,
            ),
        };

        if let Some(items) = near_items {
            let (items, penalty) = items.rebased();
            searches
                .into_iter()
                .map(|mut search| {
                    let search_penalty = std::mem::take(search.penalty_mut());
                    NearSearch::new(
                        penalty + assignment.penalty + search_penalty,
                        items.clone(),
                        search,
                    )
                    .into()
                })
                .collect()
        } else {
            searches
                .into_iter()
                .map(|mut search| {
                    *search.penalty_mut() += assignment.penalty;
                    search
                })
                .collect()
        }
    }

    /// Category search without a name. Needs a bounded viewbox or a point to search
    /// around.
    fn build_poi_search(&self, sdata: &SearchData) -> Vec<AbstractSearch> {
        if sdata.housenumbers.is_empty()
            && (self.details.has_bounded_viewbox() || self.details.near.is_some())
        {
            vec![PoiSearch::new(sdata).into()]
        } else {
            Vec::new()
        }
    }

    /// Country and postcode searches.
    fn build_special_search(
        &self,
        sdata: &SearchData,
        address: &[TokenRange],
        is_category: bool,
    ) -> Vec<AbstractSearch> {
        if !sdata.qualifiers.is_empty() {
            return Vec::new();
        }
        let mut searches = Vec::new();
        if !sdata.countries.is_empty()
            && address.is_empty()
            && sdata.postcodes.is_empty()
            && self.configured_for_country()
        {
            searches.push(CountrySearch::from_data(sdata).into());
        }
        if !sdata.postcodes.is_empty() && (is_category || self.configured_for_postcode()) {
            let mut penalty = if sdata.countries.is_empty() { 0.1 } else { 0.0 };
            let sdata = if address.is_empty() {
                sdata.clone()
            } else {
                penalty += 0.2;
                sdata.with_lookups(vec![FieldLookup::new(
                    SearchColumn::NameAddressVector,
                    self.address_partials(address)
                        .iter()
                        .map(|t| t.token)
                        .collect(),
                    LookupKind::Restrict,
                )])
            };
            searches.push(PostcodeSearch::new(penalty, &sdata).into());
        }
        searches
    }

    /// Address search where the house number takes the place of the name.
    fn build_housenumber_search(
        &self,
        sdata: &SearchData,
        hnrs: &[Token],
        address: &[TokenRange],
    ) -> Vec<AbstractSearch> {
        let mut lookups = vec![FieldLookup::new(
            SearchColumn::NameVector,
            hnrs.iter().map(|t| t.token).collect(),
            LookupKind::Any,
        )];
        let expected_count = hnrs.iter().map(|t| t.count).sum::<u64>() as f64;

        let partials = self.address_partials(address);
        let partial_tokens: Vec<TokenId> = partials.iter().map(|t| t.token).collect();
        if expected_count < PARTIAL_LOOKUP_LIMIT {
            lookups.push(FieldLookup::new(
                SearchColumn::NameAddressVector,
                partial_tokens,
                LookupKind::Restrict,
            ));
        } else if partials.len() != 1 || (partials[0].count as f64) < FULL_LOOKUP_LIMIT {
            lookups.push(FieldLookup::new(
                SearchColumn::NameAddressVector,
                partial_tokens,
                LookupKind::All,
            ));
        } else {
            lookups.push(FieldLookup::new(
                SearchColumn::NameAddressVector,
                self.query
                    .get_tokens(address[0], TokenType::Word)
                    .iter()
                    .map(|t| t.token)
                    .collect(),
                LookupKind::Any,
            ));
        }
        lookups.retain(|l| !l.tokens.is_empty());

        let sdata = sdata.with_lookups(lookups).without_housenumbers();
        vec![PlaceSearch::new(0.05, &sdata, expected_count).into()]
    }

    /// Searches for a named place, one per lookup strategy.
    fn build_name_search(
        &self,
        sdata: &SearchData,
        name: TokenRange,
        address: &[TokenRange],
        is_category: bool,
    ) -> Vec<AbstractSearch> {
        if !(is_category || sdata.housenumbers.is_empty() || self.configured_for_housenumbers()) {
            return Vec::new();
        }
        let (ranking, name_penalty) = self.get_name_ranking(name).normalized();
        let sdata = if ranking.rankings.is_empty() {
            sdata.clone()
        } else {
            sdata.with_extra_ranking(ranking)
        };
        self.yield_lookups(name, address)
            .into_iter()
            .map(|(penalty, count, lookups)| {
                PlaceSearch::new(penalty + name_penalty, &sdata.with_lookups(lookups), count).into()
            })
            .collect()
    }

    fn address_partials(&self, address: &[TokenRange]) -> Vec<&'a Token> {
        address
            .iter()
            .flat_map(|r| self.query.get_partials_list(*r))
            .collect()
    }

    /// Lookup strategies for a name with address as `(penalty, expected count, lookups)`,
    /// most selective index use first.
    pub fn yield_lookups(
        &self,
        name: TokenRange,
        address: &[TokenRange],
    ) -> Vec<(f64, f64, Vec<FieldLookup>)> {
        let mut penalty = 0.0;
        let name_partials = self.query.get_partials_list(name);
        let name_tokens: Vec<TokenId> = name_partials.iter().map(|t| t.token).collect();
        let addr_partials = self.address_partials(address);
        let mut addr_tokens: Vec<TokenId> = addr_partials.iter().map(|t| t.token).collect();

        let name_indexed = name_partials.iter().all(|t| t.is_indexed);
        let partials_indexed = name_indexed && addr_partials.iter().all(|t| t.is_indexed);
        let Some(min_count) = name_partials.iter().map(|t| t.count).min() else {
            return Vec::new();
        };
        let exp_count = halved(min_count as f64, name_partials.len() - 1);

        if (name_partials.len() > 3 || exp_count < PARTIAL_LOOKUP_LIMIT) && partials_indexed {
            return vec![(penalty, exp_count, lookup_by_names(name_tokens, addr_tokens))];
        }

        let mut variants = Vec::new();
        // Partial terms are too frequent. Try rare full names first.
        let name_fulls = self.query.get_tokens(name, TokenType::Word);
        if !name_fulls.is_empty() {
            let fulls_count = name_fulls.iter().map(|t| t.count).sum::<u64>() as f64;
            if !partials_indexed {
                addr_tokens = addr_partials
                    .iter()
                    .filter(|t| t.is_indexed)
                    .map(|t| t.token)
                    .collect();
                penalty += 1.2
                    * addr_partials
                        .iter()
                        .filter(|t| !t.is_indexed)
                        .map(|t| t.penalty)
                        .sum::<f64>();
            }
            variants.push((
                penalty,
                halved(fulls_count, addr_partials.len()),
                lookup_by_any_name(
                    name_fulls.iter().map(|t| t.token).collect(),
                    addr_tokens.clone(),
                    fulls_count < FULL_LOOKUP_LIMIT,
                ),
            ));
        }

        // Catch the remaining results through name and address, if not too many.
        let exp_count = halved(exp_count, addr_partials.len());
        if exp_count < FULL_LOOKUP_LIMIT && name_indexed {
            let mut lookup = vec![FieldLookup::new(
                SearchColumn::NameVector,
                name_tokens.clone(),
                LookupKind::All,
            )];
            if !addr_tokens.is_empty() {
                lookup.push(FieldLookup::new(
                    SearchColumn::NameAddressVector,
                    addr_tokens.clone(),
                    LookupKind::All,
                ));
            }
            penalty += 0.35 * (5.0 - name_partials.len() as f64 - addr_tokens.len() as f64).max(0.0);
            variants.push((penalty, exp_count, lookup));
        }
        variants
    }

    /// Ranking of the full names of the range, with the partials as fallback.
    pub fn get_name_ranking(&self, trange: TokenRange) -> FieldRanking {
        let mut ranks: Vec<RankedTokens> = self
            .query
            .get_tokens(trange, TokenType::Word)
            .iter()
            .map(|t| RankedTokens::new(t.penalty, vec![t.token]))
            .collect();
        ranks.sort_by(|a, b| a.penalty.total_cmp(&b.penalty));
        let default = self
            .query
            .get_partials_list(trange)
            .iter()
            .map(|t| t.penalty)
            .sum::<f64>()
            + 0.2;
        FieldRanking::new(SearchColumn::NameVector, default, ranks)
    }

    /// Ranking of the ways an address range can be split into full and partial words.
    ///
    /// Variants are explored longest-prefix first. The variant with the fewest full
    /// words becomes the default, its penalty raised by 0.3.
    pub fn get_addr_ranking(&self, trange: TokenRange) -> FieldRanking {
        // Entries are (-len, position, slot into `states`); the slot breaks ties in
        // insertion order.
        let mut todo: BinaryHeap<Reverse<(i64, usize, usize)>> = BinaryHeap::new();
        let mut states = vec![RankedTokens::new(0.0, Vec::new())];
        todo.push(Reverse((0, trange.start, 0)));
        let mut ranks: Vec<RankedTokens> = Vec::new();

        'outer: while let Some(Reverse((neglen, pos, slot))) = todo.pop() {
            let rank = states[slot].clone();
            let Some(node) = self.query.nodes.get(pos) else {
                continue;
            };
            for tlist in &node.starting {
                if !matches!(tlist.ttype, TokenType::Partial | TokenType::Word) {
                    continue;
                }
                let max_penalty = tlist
                    .tokens
                    .iter()
                    .map(|t| t.penalty)
                    .fold(f64::NEG_INFINITY, f64::max);
                if tlist.end < trange.end {
                    let chgpenalty = penalty_tokenchange(self.query.nodes[tlist.end].btype);
                    if tlist.ttype == TokenType::Partial {
                        states.push(RankedTokens::new(
                            rank.penalty + chgpenalty + max_penalty,
                            rank.tokens.clone(),
                        ));
                        todo.push(Reverse((neglen - 1, tlist.end, states.len() - 1)));
                    } else {
                        for t in &tlist.tokens {
                            states.push(rank.with_token(t, chgpenalty));
                            todo.push(Reverse((neglen - 1, tlist.end, states.len() - 1)));
                        }
                    }
                } else if tlist.end == trange.end {
                    if tlist.ttype == TokenType::Partial {
                        ranks.push(RankedTokens::new(
                            rank.penalty + max_penalty,
                            rank.tokens.clone(),
                        ));
                    } else {
                        ranks.extend(tlist.tokens.iter().map(|t| rank.with_token(t, 0.0)));
                    }
                    if ranks.len() >= MAX_ADDRESS_VARIANTS {
                        // Too many variants: fall back to the sum of the partials.
                        let default = self
                            .query
                            .get_partials_list(trange)
                            .iter()
                            .map(|t| t.penalty)
                            .sum::<f64>()
                            + 0.2;
                        ranks.push(RankedTokens::new(rank.penalty + default, Vec::new()));
                        break 'outer;
                    }
                }
            }
        }

        if ranks.is_empty() {
            return FieldRanking::new(SearchColumn::NameAddressVector, 0.0, Vec::new());
        }
        ranks.sort_by_key(|r| r.tokens.len());
        let default = ranks.remove(0).penalty + 0.3;
        ranks.sort_by(|a, b| a.penalty.total_cmp(&b.penalty));
        FieldRanking::new(SearchColumn::NameAddressVector, default, ranks)
    }

    /// Fields of the assignment other than the name. `None` when the assignment cannot
    /// match under the requested countries or categories.
    pub fn get_search_data(&self, assignment: &TokenAssignment) -> Option<SearchData> {
        let mut sdata = SearchData::default();
        // The assignment penalty is counted here and again when the search is built.
        let mut penalty = assignment.penalty;

        if let Some(range) = assignment.country {
            let tokens: Vec<&Token> = self
                .query
                .get_tokens(range, TokenType::Country)
                .iter()
                .filter(|t| {
                    self.details.countries.is_empty()
                        || self.details.countries.contains(&t.lookup_word)
                })
                .collect();
            if tokens.is_empty() {
                return None;
            }
            let (next, delta) = sdata.with_country_tokens(&tokens);
            sdata = next;
            penalty += delta;
        } else if !self.details.countries.is_empty() {
            sdata = sdata.with_countries(WeightedStrings::uniform(
                self.details.countries.iter().cloned(),
            ));
        }

        if let Some(range) = assignment.housenumber {
            let (next, delta) =
                sdata.with_housenumbers(self.query.get_tokens(range, TokenType::HouseNumber));
            sdata = next;
            penalty += delta;
        }
        if let Some(range) = assignment.postcode {
            let (next, delta) =
                sdata.with_postcodes(self.query.get_tokens(range, TokenType::Postcode));
            sdata = next;
            penalty += delta;
        }

        if let Some(range) = assignment.qualifier {
            let tokens: Vec<&Token> = self
                .query
                .get_tokens(range, TokenType::Qualifier)
                .iter()
                .filter(|t| {
                    self.details.categories.is_empty()
                        || self.details.categories.contains(&t.get_category())
                })
                .collect();
            if tokens.is_empty() {
                return None;
            }
            let (next, delta) = sdata.with_qualifier_tokens(&tokens);
            sdata = next;
            penalty += delta;
        } else if !self.details.categories.is_empty() {
            sdata = sdata.with_qualifiers(WeightedCategories::uniform(
                self.details.categories.iter().cloned(),
            ));
        }

        if !assignment.address.is_empty() {
            let rankings = assignment
                .address
                .iter()
                .map(|r| self.get_addr_ranking(*r))
                .collect();
            let (next, delta) = sdata.with_rankings(rankings);
            sdata = next;
            penalty += delta;
        }

        if self.trace.is_enabled() {
            self.trace.var_dump("Search data penalty", &penalty);
        }
        Some(sdata.with_penalty(penalty))
    }

    /// Categories of the near item with their minimal penalty, restricted to the
    /// requested categories. `None` when the assignment has no near item.
    pub fn get_near_items(&self, assignment: &TokenAssignment) -> Option<WeightedCategories> {
        let range = assignment.near_item?;
        let mut best: AHashMap<Category, f64> = AHashMap::new();
        let mut order = Vec::new();
        for t in self
            .query
            .get_tokens(range, TokenType::NearItem)
            .iter()
            .chain(self.query.get_tokens(range, TokenType::Category))
        {
            let category = t.get_category();
            if !self.details.categories.is_empty() && !self.details.categories.contains(&category)
            {
                continue;
            }
            match best.get_mut(&category) {
                Some(p) if t.penalty < *p => *p = t.penalty,
                Some(_) => {}
                None => {
                    best.insert(category.clone(), t.penalty);
                    order.push(category);
                }
            }
        }
        Some(WeightedCategories::from_penalties(order.into_iter().map(|c| {
            let penalty = best[&c];
            (c, penalty)
        })))
    }
}

#[cfg(test)]
mod tests {
    use mercator_data::Point;

    use super::*;
    use crate::search::query::{BreakType, Phrase, PhraseType};

    fn query(words: usize) -> QueryStruct {
        let mut q = QueryStruct::new(vec![Phrase::free("")]);
        for _ in 1..words {
            q.add_node(BreakType::Word, PhraseType::None);
        }
        q.add_node(BreakType::End, PhraseType::None);
        q
    }

    fn partial(id: TokenId, penalty: f64, count: u64) -> Token {
        Token::new(id, format!("p{id}"), penalty, count)
    }

    fn assignment() -> TokenAssignment {
        TokenAssignment::default()
    }

    #[test]
    fn test_single_token_address_ranking() {
        let mut q = query(1);
        q.add_token(TokenRange::new(0, 1), TokenType::Partial, partial(1, 0.4, 10));
        let details = SearchDetails::default();
        let ranking = SearchBuilder::new(&q, &details).get_addr_ranking(TokenRange::new(0, 1));
        assert!((ranking.default - 0.7).abs() < 1e-9, "default is partial penalty + 0.3");
        assert!(ranking.rankings.is_empty());
    }

    #[test]
    fn test_address_ranking_with_full_word() {
        let mut q = query(2);
        q.add_token(TokenRange::new(0, 1), TokenType::Partial, partial(1, 0.1, 10));
        q.add_token(TokenRange::new(1, 2), TokenType::Partial, partial(2, 0.1, 10));
        q.add_token(TokenRange::new(0, 2), TokenType::Word, Token::new(3, "ab", 0.05, 5));
        let details = SearchDetails::default();
        let builder = SearchBuilder::new(&q, &details);
        let ranking = builder.get_addr_ranking(TokenRange::new(0, 2));
        assert_eq!(ranking.rankings.len(), 1);
        assert_eq!(ranking.rankings[0].tokens, vec![3]);
        // partial route: 0.1 + 0.1 (word change) + 0.1
        assert!((ranking.default - 0.6).abs() < 1e-9);

        let (sdata, delta) = SearchData::default().with_rankings(vec![ranking]);
        assert!((delta - 0.05).abs() < 1e-9);
        let kept = &sdata.rankings[0];
        assert!(kept.rankings.iter().all(|r| r.penalty >= 0.0));
        assert!(kept.default >= 0.0);
        assert!(kept.rankings.iter().any(|r| r.penalty == 0.0) || kept.default == 0.0);
    }

    #[test]
    fn test_address_ranking_caps_variants() {
        let words = 12;
        let mut q = query(words);
        let mut id = 0;
        for start in 0..words {
            id += 1;
            q.add_token(TokenRange::new(start, start + 1), TokenType::Partial, partial(id, 0.1, 10));
            id += 1;
            q.add_token(
                TokenRange::new(start, start + 1),
                TokenType::Word,
                Token::new(id, format!("w{id}"), 0.1, 10),
            );
        }
        let details = SearchDetails::default();
        let ranking =
            SearchBuilder::new(&q, &details).get_addr_ranking(TokenRange::new(0, words));
        assert!(ranking.rankings.len() <= MAX_ADDRESS_VARIANTS);
    }

    #[test]
    fn test_country_only_search() {
        let mut q = query(1);
        q.add_token(TokenRange::new(0, 1), TokenType::Country, Token::new(1, "de", 0.1, 1));
        let details = SearchDetails::default();
        let a = TokenAssignment {
            country: Some(TokenRange::new(0, 1)),
            penalty: 0.2,
            ..assignment()
        };
        let searches = SearchBuilder::new(&q, &details).build(&a);
        assert_eq!(searches.len(), 1);
        let AbstractSearch::Country(search) = &searches[0] else {
            panic!("expected a country search, got {:?}", searches[0]);
        };
        // token 0.1 + assignment 0.2 in the search data + assignment 0.2 on build
        assert!((search.penalty - 0.5).abs() < 1e-9);

        let other_country = SearchDetails {
            countries: vec!["gb".into()],
            ..SearchDetails::default()
        };
        assert!(SearchBuilder::new(&q, &other_country).build(&a).is_empty());
    }

    #[test]
    fn test_postcode_search_penalties() {
        let mut q = query(2);
        q.add_token(TokenRange::new(0, 1), TokenType::Postcode, Token::new(1, "10117", 0.0, 1));
        q.add_token(TokenRange::new(1, 2), TokenType::Partial, partial(2, 0.0, 10));
        let details = SearchDetails::default();
        let builder = SearchBuilder::new(&q, &details);

        let plain = builder.build(&TokenAssignment {
            postcode: Some(TokenRange::new(0, 1)),
            ..assignment()
        });
        assert!(matches!(&plain[..], [AbstractSearch::Postcode(s)] if (s.penalty - 0.1).abs() < 1e-9));

        let with_address = builder.build(&TokenAssignment {
            postcode: Some(TokenRange::new(0, 1)),
            address: vec![TokenRange::new(1, 2)],
            ..assignment()
        });
        let [AbstractSearch::Postcode(search)] = &with_address[..] else {
            panic!("expected one postcode search");
        };
        assert_eq!(search.lookups.len(), 1);
        assert_eq!(search.lookups[0].kind, LookupKind::Restrict);
        // 0.1 + 0.2 for the address + 0.3 dropped single-token address ranking
        assert!((search.penalty - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_poi_search_needs_geography() {
        let mut q = query(1);
        q.add_token(
            TokenRange::new(0, 1),
            TokenType::NearItem,
            Token::new(1, "pubs", 0.0, 1).with_category(Category::new("amenity", "pub")),
        );
        let a = TokenAssignment {
            near_item: Some(TokenRange::new(0, 1)),
            ..assignment()
        };
        let details = SearchDetails::default();
        assert!(SearchBuilder::new(&q, &details).build(&a).is_empty());

        let near = SearchDetails {
            near: Some(Point::new(-0.125, 51.505)),
            ..SearchDetails::default()
        };
        let searches = SearchBuilder::new(&q, &near).build(&a);
        assert!(matches!(&searches[..], [AbstractSearch::Poi(_)]));

        let disjoint = SearchDetails {
            near: Some(Point::new(-0.125, 51.505)),
            categories: vec![Category::new("amenity", "cafe")],
            ..SearchDetails::default()
        };
        assert!(SearchBuilder::new(&q, &disjoint).build(&a).is_empty());
    }

    #[test]
    fn test_name_search_wrapped_in_near_search() {
        let mut q = query(2);
        q.add_token(
            TokenRange::new(0, 1),
            TokenType::NearItem,
            Token::new(1, "pubs near", 0.2, 1).with_category(Category::new("amenity", "pub")),
        );
        q.add_token(TokenRange::new(1, 2), TokenType::Partial, partial(2, 0.0, 10));
        let a = TokenAssignment {
            near_item: Some(TokenRange::new(0, 1)),
            name: Some(TokenRange::new(1, 2)),
            penalty: 0.1,
            ..assignment()
        };
        let details = SearchDetails::default();
        let searches = SearchBuilder::new(&q, &details).build(&a);
        assert_eq!(searches.len(), 1);
        let AbstractSearch::Near(near) = &searches[0] else {
            panic!("expected a near search");
        };
        assert_eq!(near.search.penalty(), 0.0, "inner penalty moves to the wrapper");
        // near item 0.2 + assignment 0.1 twice + name fallback 0.2
        assert!((near.penalty - 0.6).abs() < 1e-9);
        assert_eq!(near.categories.get_penalty(&Category::new("amenity", "pub"), 1.0), 0.0);
    }

    #[test]
    fn test_yield_lookups_rare_partials() {
        let mut q = query(2);
        q.add_token(TokenRange::new(0, 1), TokenType::Partial, partial(1, 0.0, 100));
        q.add_token(TokenRange::new(1, 2), TokenType::Partial, partial(2, 0.0, 100));
        let details = SearchDetails::default();
        let lookups = SearchBuilder::new(&q, &details)
            .yield_lookups(TokenRange::new(0, 1), &[TokenRange::new(1, 2)]);
        assert_eq!(lookups.len(), 1);
        let (penalty, count, lookup) = &lookups[0];
        assert_eq!(*penalty, 0.0);
        assert_eq!(*count, 100.0);
        assert_eq!(lookup[0].kind, LookupKind::All);
        assert_eq!(lookup[1].kind, LookupKind::Restrict);
    }

    #[test]
    fn test_yield_lookups_frequent_partials() {
        let mut q = query(2);
        q.add_token(TokenRange::new(0, 1), TokenType::Partial, partial(1, 0.0, 50000));
        q.add_token(TokenRange::new(0, 1), TokenType::Word, Token::new(3, "main", 0.0, 500));
        q.add_token(TokenRange::new(1, 2), TokenType::Partial, partial(2, 0.0, 20));
        let details = SearchDetails::default();
        let lookups = SearchBuilder::new(&q, &details)
            .yield_lookups(TokenRange::new(0, 1), &[TokenRange::new(1, 2)]);
        assert_eq!(lookups.len(), 1, "the last resort estimate is still too large");
        let (_, count, lookup) = &lookups[0];
        assert_eq!(*count, 250.0);
        assert_eq!(lookup[0].kind, LookupKind::Any);
        assert_eq!(lookup[0].tokens, vec![3]);
        assert_eq!(lookup[1].kind, LookupKind::All, "rare full names use the address index");
    }

    #[test]
    fn test_yield_lookups_unindexed_address() {
        let mut q = query(2);
        q.add_token(TokenRange::new(0, 1), TokenType::Partial, partial(1, 0.0, 9000));
        q.add_token(TokenRange::new(0, 1), TokenType::Word, Token::new(3, "main", 0.0, 20000));
        q.add_token(
            TokenRange::new(1, 2),
            TokenType::Partial,
            partial(2, 0.5, 20).unindexed(),
        );
        let details = SearchDetails::default();
        let lookups = SearchBuilder::new(&q, &details)
            .yield_lookups(TokenRange::new(0, 1), &[TokenRange::new(1, 2)]);
        assert_eq!(lookups.len(), 2);
        let (penalty, _, full) = &lookups[0];
        assert!((penalty - 0.6).abs() < 1e-9, "1.2 times the dropped partial penalty");
        assert_eq!(full.len(), 1, "unindexed address partials are dropped");
        let (penalty, count, last) = &lookups[1];
        assert_eq!(*count, 4500.0);
        assert_eq!(last.len(), 1);
        // 0.6 carried over + 0.35 * (5 - 1 - 0)
        assert!((penalty - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_housenumber_search_without_name() {
        let mut q = query(2);
        q.add_token(TokenRange::new(0, 1), TokenType::HouseNumber, Token::new(1, "10", 0.0, 3));
        q.add_token(TokenRange::new(1, 2), TokenType::Partial, partial(2, 0.0, 10));
        let a = TokenAssignment {
            housenumber: Some(TokenRange::new(0, 1)),
            address: vec![TokenRange::new(1, 2)],
            ..assignment()
        };
        let details = SearchDetails::default();
        let searches = SearchBuilder::new(&q, &details).build(&a);
        let [AbstractSearch::Place(search)] = &searches[..] else {
            panic!("expected one place search");
        };
        assert!(search.housenumbers.is_empty());
        assert_eq!(search.lookups[0].column, SearchColumn::NameVector);
        assert_eq!(search.lookups[0].kind, LookupKind::Any);
        assert_eq!(search.lookups[1].tokens, vec![2]);
        assert_eq!(search.lookups[1].kind, LookupKind::Restrict);
        assert_eq!(search.expected_count, 3.0);
    }

    #[test]
    fn test_wrap_near_and_poi_helpers() {
        let poi = build_poi_search(vec![Category::new("amenity", "pub")], &["gb".to_owned()]);
        let AbstractSearch::Poi(inner) = &poi else {
            panic!("expected a poi search");
        };
        assert!(inner.countries.contains("gb"));
        let near = wrap_near_search(vec![Category::new("amenity", "bar")], poi.clone());
        assert!(matches!(near, AbstractSearch::Near(ref n) if n.categories.len() == 1));
    }
}
