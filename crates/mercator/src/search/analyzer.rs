//! Turning phrases into a token graph.
//!
//! [`QueryAnalyzer`] is the seam to the tokenizer. [`WordTableAnalyzer`] is a reference
//! implementation that looks up every word sequence of the query in the word table of a
//! [`SearchConnection`].

use std::sync::Arc;

use ahash::AHashMap;
use async_trait::async_trait;
use mercator_data::{Category, WordKind, WordRow, normalize_text};
use rapidfuzz::distance::levenshtein;
use tracing::{debug, instrument};

use super::{
    Result,
    query::{BreakType, Phrase, QueryStruct, Token, TokenRange, TokenType},
};
use crate::connection::SearchConnection;

/// Longest word sequence looked up as one term.
const MAX_TERM_WORDS: usize = 20;
const SYNTHETIC_HOUSENUMBER_PENALTY: f64 = 0.5;
const POSTCODE_COMPETITION_PENALTY: f64 = 0.39;

#[async_trait]
pub trait QueryAnalyzer: Send + Sync {
    /// Normalize the phrases and build the token graph for them.
    async fn analyze_query(&self, phrases: &[Phrase]) -> Result<QueryStruct>;

    /// Normalized form of `text`. Anything dropped here is lost for the search.
    fn normalize_text(&self, text: &str) -> String;
}

/// One word of the normalized query.
#[derive(Debug, Clone)]
struct QueryPart {
    token: String,
}

/// Token for a row of the word table.
fn token_from_row(row: &WordRow) -> Token {
    let word_token = row.word_token.as_str();
    let penalty = match row.kind {
        WordKind::PartialWord => 0.3,
        WordKind::FullWord => {
            if word_token.chars().count() == 1 && row.word.as_deref() == Some(word_token) {
                if word_token.chars().all(|c| c.is_ascii_digit()) { 0.2 } else { 0.3 }
            } else {
                0.0
            }
        }
        WordKind::HouseNumber => {
            let mut penalty = 0.1
                * word_token
                    .chars()
                    .filter(|c| *c != ' ' && !c.is_ascii_digit())
                    .count() as f64;
            if !word_token.chars().any(|c| c.is_ascii_digit()) {
                penalty += 0.2 * (word_token.chars().count().saturating_sub(1)) as f64;
            }
            penalty
        }
        WordKind::Country if word_token.chars().count() == 1 => 0.3,
        WordKind::Country | WordKind::Postcode | WordKind::Special => 0.0,
    };

    let lookup_word = row
        .info
        .lookup
        .as_deref()
        .or(row.word.as_deref())
        .map(|w| w.split('@').next().unwrap_or(w))
        .filter(|w| !w.is_empty())
        .unwrap_or(word_token)
        .to_owned();

    let mut token = Token::new(
        row.word_id,
        lookup_word,
        penalty,
        row.info.count.unwrap_or(1).max(1),
    );
    token.addr_count = row.info.addr_count.unwrap_or(1).max(1);
    token.word_token = row.word_token.clone();
    if let (Some(class), Some(kind)) = (&row.info.class, &row.info.kind) {
        token = token.with_category(Category::new(class.as_str(), kind.as_str()));
    }
    token
}

/// Extra penalty for a token whose lookup word differs from the query text.
fn rematch_penalty(lookup_word: &str, norm: &str) -> f64 {
    let len = lookup_word.chars().count();
    if len == 0 {
        return 0.0;
    }
    let distance = levenshtein::distance(lookup_word.to_lowercase().chars(), norm.chars());
    distance as f64 / len as f64
}

/// Reference analyzer working on the word table of the storage backend.
pub struct WordTableAnalyzer<C: SearchConnection + ?Sized> {
    conn: Arc<C>,
}

impl<C: SearchConnection + ?Sized> WordTableAnalyzer<C> {
    pub fn new(conn: Arc<C>) -> Self {
        Self { conn }
    }

    /// Add the nodes for all words and collect the word sequences to look up together
    /// with the ranges they cover.
    fn split_query(query: &mut QueryStruct) -> (Vec<QueryPart>, AHashMap<String, Vec<TokenRange>>) {
        let mut parts: Vec<QueryPart> = Vec::new();
        let mut words: AHashMap<String, Vec<TokenRange>> = AHashMap::new();
        let phrases = query.source.clone();
        for phrase in &phrases {
            let phrase_start = parts.len();
            if let Some(last) = query.nodes.last_mut() {
                last.ptype = phrase.ptype;
            }
            for word in phrase.text.split(' ').filter(|w| !w.is_empty()) {
                parts.push(QueryPart {
                    token: word.to_owned(),
                });
                query.add_node(BreakType::Word, phrase.ptype);
            }
            if let Some(last) = query.nodes.last_mut() {
                last.btype = BreakType::Phrase;
            }

            for first in phrase_start..parts.len() {
                let mut term = parts[first].token.clone();
                words
                    .entry(term.clone())
                    .or_default()
                    .push(TokenRange::new(first, first + 1));
                for last in (first + 1)..parts.len().min(first + MAX_TERM_WORDS) {
                    term.push(' ');
                    term.push_str(&parts[last].token);
                    words
                        .entry(term.clone())
                        .or_default()
                        .push(TokenRange::new(first, last + 1));
                }
            }
        }
        if let Some(last) = query.nodes.last_mut() {
            last.btype = BreakType::End;
        }
        (parts, words)
    }

    fn add_row_tokens(query: &mut QueryStruct, row: &WordRow, ranges: &[TokenRange]) {
        let slots = query.num_token_slots();
        for trange in ranges {
            let token = token_from_row(row);
            let ttype = match row.kind {
                WordKind::FullWord => TokenType::Word,
                WordKind::PartialWord if trange.len() == 1 => TokenType::Partial,
                WordKind::PartialWord => continue,
                WordKind::HouseNumber => TokenType::HouseNumber,
                WordKind::Postcode => TokenType::Postcode,
                WordKind::Country => TokenType::Country,
                WordKind::Special => match row.info.op.as_deref() {
                    Some("in" | "near") if trange.start == 0 => TokenType::NearItem,
                    Some("in" | "near") => continue,
                    _ if trange.start == 0 && trange.end == slots => TokenType::Category,
                    _ if trange.start == 0 || trange.end == slots => TokenType::Qualifier,
                    _ => continue,
                },
            };
            query.add_token(*trange, ttype, token);
        }
    }

    /// Housenumber tokens for short numeric terms the word table does not know.
    fn add_extra_tokens(query: &mut QueryStruct, parts: &[QueryPart]) {
        for (i, part) in parts.iter().enumerate() {
            let short = part.token.chars().count() <= 4;
            let digit_led = part.token.chars().next().is_some_and(|c| c.is_ascii_digit());
            if short && digit_led && !query.nodes[i].has_tokens(i + 1, TokenType::HouseNumber) {
                query.add_token(
                    TokenRange::new(i, i + 1),
                    TokenType::HouseNumber,
                    Token::new(0, part.token.clone(), SYNTHETIC_HOUSENUMBER_PENALTY, 1),
                );
            }
        }
    }

    /// Penalties that depend on competing tokens over the same range.
    fn rerank_tokens(query: &mut QueryStruct, parts: &[QueryPart]) {
        // (node, end, type of the list to penalize, penalty)
        let mut adjustments: Vec<(usize, usize, TokenType, f64)> = Vec::new();
        let mut rematches: Vec<(usize, usize, TokenType, String)> = Vec::new();

        for (i, node, tlist) in query.iter_token_lists() {
            let Some(first) = tlist.tokens.first() else {
                continue;
            };
            match tlist.ttype {
                TokenType::Postcode => {
                    for repl in &node.starting {
                        if repl.end == tlist.end
                            && repl.ttype != TokenType::Postcode
                            && (repl.ttype != TokenType::HouseNumber
                                || first.lookup_word.chars().count() > 4)
                        {
                            adjustments.push((i, repl.end, repl.ttype, POSTCODE_COMPETITION_PENALTY));
                        }
                    }
                }
                TokenType::HouseNumber if first.lookup_word.chars().count() <= 3 => {
                    if first.lookup_word.chars().any(|c| c.is_ascii_digit()) {
                        for repl in &node.starting {
                            if repl.end == tlist.end && repl.ttype != TokenType::HouseNumber {
                                adjustments.push((
                                    i,
                                    repl.end,
                                    repl.ttype,
                                    SYNTHETIC_HOUSENUMBER_PENALTY - first.penalty,
                                ));
                            }
                        }
                    }
                }
                TokenType::Country | TokenType::Partial | TokenType::HouseNumber => {}
                ttype => {
                    let norm = parts[i..tlist.end]
                        .iter()
                        .map(|p| p.token.as_str())
                        .collect::<Vec<_>>()
                        .join(" ");
                    rematches.push((i, tlist.end, ttype, norm));
                }
            }
        }

        for (i, end, ttype, penalty) in adjustments {
            if let Some(tlist) = query.nodes[i]
                .starting
                .iter_mut()
                .find(|t| t.end == end && t.ttype == ttype)
            {
                tlist.add_penalty(penalty);
            }
        }
        for (i, end, ttype, norm) in rematches {
            if let Some(tlist) = query.nodes[i]
                .starting
                .iter_mut()
                .find(|t| t.end == end && t.ttype == ttype)
            {
                for token in &mut tlist.tokens {
                    token.penalty += rematch_penalty(&token.lookup_word, &norm);
                }
            }
        }
    }
}

#[async_trait]
impl<C: SearchConnection + ?Sized> QueryAnalyzer for WordTableAnalyzer<C> {
    #[instrument(name = "Analyze query", level = "debug", skip_all, fields(phrases = phrases.len()))]
    async fn analyze_query(&self, phrases: &[Phrase]) -> Result<QueryStruct> {
        let normalized: Vec<Phrase> = phrases
            .iter()
            .map(|p| Phrase::new(p.ptype, self.normalize_text(&p.text)))
            .filter(|p| !p.text.is_empty())
            .collect();
        let mut query = QueryStruct::new(normalized);
        if query.source.is_empty() {
            return Ok(query);
        }

        let (parts, words) = Self::split_query(&mut query);
        let terms: Vec<String> = words.keys().cloned().collect();
        let rows = self.conn.lookup_words(&terms).await?;
        debug!(terms = terms.len(), rows = rows.len(), "Looked up query terms");

        for row in &rows {
            if let Some(ranges) = words.get(&row.word_token) {
                Self::add_row_tokens(&mut query, row, ranges);
            }
        }

        Self::add_extra_tokens(&mut query, &parts);
        Self::rerank_tokens(&mut query, &parts);
        Ok(query)
    }

    fn normalize_text(&self, text: &str) -> String {
        normalize_text(text)
    }
}
