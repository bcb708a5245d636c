//! Field descriptions of an abstract search.
//!
//! A [`SearchData`] collects everything a search needs apart from the name lookup
//! strategy: weighted value sets for housenumbers, postcodes, countries and categories,
//! the index lookups and the rankings used to score matched rows.

use mercator_data::{Category, SearchNameRow, TokenId};

use super::query::Token;

/// Column of the search vector table a lookup or ranking applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchColumn {
    NameVector,
    NameAddressVector,
}

impl SearchColumn {
    pub fn tokens(self, row: &SearchNameRow) -> &[TokenId] {
        match self {
            Self::NameVector => &row.name_vector,
            Self::NameAddressVector => &row.nameaddress_vector,
        }
    }
}

/// How the tokens of a [`FieldLookup`] have to match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LookupKind {
    /// All tokens must match, the index is used.
    All,
    /// At least one token must match, the index is used.
    Any,
    /// All tokens must match, checked on rows found otherwise.
    Restrict,
}

impl LookupKind {
    pub const fn uses_index(self) -> bool {
        matches!(self, Self::All | Self::Any)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldLookup {
    pub column: SearchColumn,
    pub tokens: Vec<TokenId>,
    pub kind: LookupKind,
}

impl FieldLookup {
    pub fn new(column: SearchColumn, tokens: Vec<TokenId>, kind: LookupKind) -> Self {
        Self {
            column,
            tokens,
            kind,
        }
    }

    pub fn matches(&self, row: &SearchNameRow) -> bool {
        let vector = self.column.tokens(row);
        match self.kind {
            LookupKind::All | LookupKind::Restrict => {
                self.tokens.iter().all(|t| vector.contains(t))
            }
            LookupKind::Any => self.tokens.iter().any(|t| vector.contains(t)),
        }
    }
}

/// Name tokens looked up by index, address tokens only restrict.
pub fn lookup_by_names(name_tokens: Vec<TokenId>, addr_tokens: Vec<TokenId>) -> Vec<FieldLookup> {
    let mut lookup = vec![FieldLookup::new(
        SearchColumn::NameVector,
        name_tokens,
        LookupKind::All,
    )];
    if !addr_tokens.is_empty() {
        lookup.push(FieldLookup::new(
            SearchColumn::NameAddressVector,
            addr_tokens,
            LookupKind::Restrict,
        ));
    }
    lookup
}

/// Any of the name tokens must match. Address tokens go through the index when
/// `use_index_for_addr` is set.
pub fn lookup_by_any_name(
    name_tokens: Vec<TokenId>,
    addr_tokens: Vec<TokenId>,
    use_index_for_addr: bool,
) -> Vec<FieldLookup> {
    let mut lookup = vec![FieldLookup::new(
        SearchColumn::NameVector,
        name_tokens,
        LookupKind::Any,
    )];
    if !addr_tokens.is_empty() {
        let kind = if use_index_for_addr {
            LookupKind::All
        } else {
            LookupKind::Restrict
        };
        lookup.push(FieldLookup::new(SearchColumn::NameAddressVector, addr_tokens, kind));
    }
    lookup
}

/// Token sequence together with the penalty of matching it.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedTokens {
    pub penalty: f64,
    pub tokens: Vec<TokenId>,
}

impl RankedTokens {
    pub fn new(penalty: f64, tokens: Vec<TokenId>) -> Self {
        Self { penalty, tokens }
    }

    /// Copy with `token` appended, adding its penalty and the transition penalty.
    pub fn with_token(&self, token: &Token, transition_penalty: f64) -> Self {
        let mut tokens = self.tokens.clone();
        tokens.push(token.token);
        Self {
            penalty: self.penalty + token.penalty + transition_penalty,
            tokens,
        }
    }
}

/// Rankings tried in order against a column until one matches; `default` applies when
/// none does.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRanking {
    pub column: SearchColumn,
    pub default: f64,
    pub rankings: Vec<RankedTokens>,
}

impl FieldRanking {
    pub fn new(column: SearchColumn, default: f64, rankings: Vec<RankedTokens>) -> Self {
        Self {
            column,
            default,
            rankings,
        }
    }

    /// Rebase so that the smallest penalty is zero. Returns the rebased ranking and the
    /// amount that was taken off.
    pub fn normalized(mut self) -> (Self, f64) {
        let min_penalty = self
            .rankings
            .iter()
            .map(|r| r.penalty)
            .fold(self.default, f64::min);
        if min_penalty > 0.0 {
            self.default -= min_penalty;
            for ranking in &mut self.rankings {
                ranking.penalty -= min_penalty;
            }
            (self, min_penalty)
        } else {
            (self, 0.0)
        }
    }

    /// Penalty of the first ranking fully contained in the row's column.
    pub fn penalty_for(&self, row: &SearchNameRow) -> f64 {
        let vector = self.column.tokens(row);
        self.rankings
            .iter()
            .find(|r| r.tokens.iter().all(|t| vector.contains(t)))
            .map_or(self.default, |r| r.penalty)
    }
}

/// Strings with a penalty each.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeightedStrings {
    entries: Vec<(String, f64)>,
}

impl WeightedStrings {
    /// All values at penalty zero.
    pub fn uniform(values: impl IntoIterator<Item = String>) -> Self {
        Self {
            entries: values.into_iter().map(|v| (v, 0.0)).collect(),
        }
    }

    /// Lookup words of the tokens, rebased to the cheapest one. Returns the set and the
    /// penalty of the cheapest token.
    pub fn from_tokens<'a>(tokens: impl IntoIterator<Item = &'a Token>) -> (Self, f64) {
        let tokens: Vec<&Token> = tokens.into_iter().collect();
        let Some(min_penalty) = tokens.iter().map(|t| t.penalty).reduce(f64::min) else {
            return (Self::default(), 0.0);
        };
        let entries = tokens
            .iter()
            .map(|t| (t.lookup_word.clone(), t.penalty - min_penalty))
            .collect();
        (Self { entries }, min_penalty)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.entries.iter().map(|(v, p)| (v.as_str(), *p))
    }

    pub fn values(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|(v, _)| v.as_str())
    }

    pub fn contains(&self, value: &str) -> bool {
        self.entries.iter().any(|(v, _)| v == value)
    }

    pub fn get_penalty(&self, value: &str, default: f64) -> f64 {
        self.entries
            .iter()
            .find(|(v, _)| v == value)
            .map_or(default, |(_, p)| *p)
    }
}

/// Categories with a penalty each.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeightedCategories {
    entries: Vec<(Category, f64)>,
}

impl WeightedCategories {
    pub fn uniform(values: impl IntoIterator<Item = Category>) -> Self {
        Self {
            entries: values.into_iter().map(|c| (c, 0.0)).collect(),
        }
    }

    /// Keep the minimal penalty per category, preserving first-seen order.
    pub fn from_penalties(items: impl IntoIterator<Item = (Category, f64)>) -> Self {
        let mut entries: Vec<(Category, f64)> = Vec::new();
        for (category, penalty) in items {
            match entries.iter_mut().find(|(c, _)| *c == category) {
                Some(entry) if penalty < entry.1 => entry.1 = penalty,
                Some(_) => {}
                None => entries.push((category, penalty)),
            }
        }
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Category, f64)> + '_ {
        self.entries.iter().map(|(c, p)| (c, *p))
    }

    pub fn values(&self) -> impl Iterator<Item = &Category> + '_ {
        self.entries.iter().map(|(c, _)| c)
    }

    pub fn contains(&self, category: &Category) -> bool {
        self.entries.iter().any(|(c, _)| c == category)
    }

    pub fn get_penalty(&self, category: &Category, default: f64) -> f64 {
        self.entries
            .iter()
            .find(|(c, _)| c == category)
            .map_or(default, |(_, p)| *p)
    }

    pub fn min_penalty(&self) -> Option<f64> {
        self.entries.iter().map(|(_, p)| *p).reduce(f64::min)
    }

    /// Rebase to the cheapest category. Returns the rebased set and the amount taken off.
    pub fn rebased(&self) -> (Self, f64) {
        let min_penalty = self.min_penalty().unwrap_or(0.0);
        let entries = self
            .entries
            .iter()
            .map(|(c, p)| (c.clone(), p - min_penalty))
            .collect();
        (Self { entries }, min_penalty)
    }
}

/// Search fields derived from a token assignment.
///
/// Every `with_*` step returns a new value together with the penalty it adds; the
/// receiver is left untouched. The caller accumulates the deltas into `penalty`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchData {
    pub penalty: f64,
    pub lookups: Vec<FieldLookup>,
    pub rankings: Vec<FieldRanking>,
    pub housenumbers: WeightedStrings,
    pub postcodes: WeightedStrings,
    pub countries: WeightedStrings,
    pub qualifiers: WeightedCategories,
}

impl SearchData {
    pub fn with_penalty(&self, penalty: f64) -> Self {
        Self {
            penalty,
            ..self.clone()
        }
    }

    pub fn with_housenumbers(&self, tokens: &[Token]) -> (Self, f64) {
        if tokens.is_empty() {
            return (self.clone(), 0.0);
        }
        let (housenumbers, delta) = WeightedStrings::from_tokens(tokens);
        (
            Self {
                housenumbers,
                ..self.clone()
            },
            delta,
        )
    }

    pub fn with_postcodes(&self, tokens: &[Token]) -> (Self, f64) {
        if tokens.is_empty() {
            return (self.clone(), 0.0);
        }
        let (postcodes, delta) = WeightedStrings::from_tokens(tokens);
        (
            Self {
                postcodes,
                ..self.clone()
            },
            delta,
        )
    }

    pub fn with_countries(&self, countries: WeightedStrings) -> Self {
        Self {
            countries,
            ..self.clone()
        }
    }

    pub fn with_country_tokens(&self, tokens: &[&Token]) -> (Self, f64) {
        if tokens.is_empty() {
            return (self.clone(), 0.0);
        }
        let (countries, delta) = WeightedStrings::from_tokens(tokens.iter().copied());
        (self.with_countries(countries), delta)
    }

    pub fn with_qualifiers(&self, qualifiers: WeightedCategories) -> Self {
        Self {
            qualifiers,
            ..self.clone()
        }
    }

    /// Qualifiers from tokens, rebased so the cheapest one is free. Its penalty is the delta.
    pub fn with_qualifier_tokens(&self, tokens: &[&Token]) -> (Self, f64) {
        if tokens.is_empty() {
            return (self.clone(), 0.0);
        }
        let (qualifiers, delta) =
            WeightedCategories::from_penalties(tokens.iter().map(|t| (t.get_category(), t.penalty)))
                .rebased();
        (self.with_qualifiers(qualifiers), delta)
    }

    /// Normalized rankings. Rankings without alternatives are dropped and contribute
    /// their default to the delta.
    pub fn with_rankings(&self, rankings: Vec<FieldRanking>) -> (Self, f64) {
        let mut delta = 0.0;
        let mut kept = Vec::with_capacity(rankings.len());
        for ranking in rankings {
            if ranking.rankings.is_empty() {
                delta += ranking.default;
            } else {
                let (ranking, min_penalty) = ranking.normalized();
                delta += min_penalty;
                kept.push(ranking);
            }
        }
        (
            Self {
                rankings: kept,
                ..self.clone()
            },
            delta,
        )
    }

    pub fn with_extra_ranking(&self, ranking: FieldRanking) -> Self {
        let mut rankings = self.rankings.clone();
        rankings.push(ranking);
        Self {
            rankings,
            ..self.clone()
        }
    }

    pub fn with_lookups(&self, lookups: Vec<FieldLookup>) -> Self {
        Self {
            lookups,
            ..self.clone()
        }
    }

    pub fn without_housenumbers(&self) -> Self {
        Self {
            housenumbers: WeightedStrings::default(),
            ..self.clone()
        }
    }

    /// Ranking penalty of a matched search row.
    pub fn ranking_penalty(&self, row: &SearchNameRow) -> f64 {
        self.rankings.iter().map(|r| r.penalty_for(row)).sum()
    }

    /// Whether a matched search row satisfies every lookup.
    pub fn lookups_match(&self, row: &SearchNameRow) -> bool {
        self.lookups.iter().all(|l| l.matches(row))
    }
}
