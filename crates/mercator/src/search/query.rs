//! The token graph of an analyzed query.
//!
//! A query is a sequence of nodes separated by breaks. Every node owns the token lists
//! that start at it; a token list covers the nodes up to its `end` and holds the
//! alternative tokens of one [`TokenType`] for that span.

use std::fmt;

use mercator_data::{Category, TokenId};

/// Strength of the separator in front of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BreakType {
    /// Beginning of the query
    Start,
    /// End of the query
    End,
    /// Hard break between two phrases
    Phrase,
    /// Break between phrases that may still belong together
    SoftPhrase,
    /// Break between two words of a phrase
    Word,
    /// Break inside a word, e.g. after a hyphen
    Part,
    /// Break introduced by the tokenizer inside a term
    Token,
}

impl BreakType {
    pub const fn as_char(self) -> char {
        match self {
            Self::Start => '<',
            Self::End => '>',
            Self::Phrase => ',',
            Self::SoftPhrase => ':',
            Self::Word => ' ',
            Self::Part => '-',
            Self::Token => '`',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TokenType {
    /// Full name of a place
    Word,
    /// Single word of a name
    Partial,
    HouseNumber,
    Postcode,
    Country,
    /// Category word usable anywhere a name can be restricted, e.g. `pub`
    Qualifier,
    /// Category covering the whole query, e.g. `pubs`
    Category,
    /// Category that searches near the rest of the query, e.g. `pubs near`
    NearItem,
}

impl TokenType {
    /// Near items and whole-query categories behave the same during enumeration.
    pub const fn is_near_like(self) -> bool {
        matches!(self, Self::NearItem | Self::Category)
    }
}

/// Expected role of a phrase in a structured query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PhraseType {
    /// Free text, no restriction
    #[default]
    None,
    Amenity,
    Street,
    City,
    County,
    State,
    Postcode,
    Country,
}

impl PhraseType {
    /// Whether a token of type `ttype` may appear in this phrase. `full_phrase` tells if
    /// the token covers the complete phrase.
    pub const fn compatible_with(self, ttype: TokenType, full_phrase: bool) -> bool {
        match self {
            Self::None => !full_phrase || !matches!(ttype, TokenType::Qualifier),
            Self::Amenity => match ttype {
                TokenType::Word | TokenType::Partial => true,
                TokenType::NearItem | TokenType::Category => full_phrase,
                TokenType::Qualifier => !full_phrase,
                _ => false,
            },
            Self::Street => matches!(
                ttype,
                TokenType::Word | TokenType::Partial | TokenType::HouseNumber
            ),
            Self::Postcode => matches!(ttype, TokenType::Postcode),
            Self::Country => matches!(ttype, TokenType::Country),
            Self::City | Self::County | Self::State => {
                matches!(ttype, TokenType::Word | TokenType::Partial)
            }
        }
    }
}

/// A single term interpretation from the word table.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub penalty: f64,
    pub token: TokenId,
    pub count: u64,
    pub addr_count: u64,
    pub lookup_word: String,
    pub is_indexed: bool,
    pub word_token: String,
    pub category: Option<Category>,
}

impl Token {
    pub fn new(token: TokenId, lookup_word: impl Into<String>, penalty: f64, count: u64) -> Self {
        let lookup_word = lookup_word.into();
        Self {
            penalty,
            token,
            count,
            addr_count: count,
            word_token: lookup_word.clone(),
            lookup_word,
            is_indexed: true,
            category: None,
        }
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn unindexed(mut self) -> Self {
        self.is_indexed = false;
        self
    }

    /// Category of a qualifier or near item token. Other tokens have an empty category.
    pub fn get_category(&self) -> Category {
        self.category
            .clone()
            .unwrap_or_else(|| Category::new("", ""))
    }
}

/// Half-open range `[start, end)` of node positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenRange {
    pub start: usize,
    pub end: usize,
}

impl TokenRange {
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub const fn len(&self) -> usize {
        self.end - self.start
    }

    pub const fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Completely in front of `other`.
    pub const fn is_before(&self, other: &Self) -> bool {
        self.end <= other.start
    }

    /// Completely behind `other`.
    pub const fn is_after(&self, other: &Self) -> bool {
        self.start >= other.end
    }

    pub const fn replace_start(&self, start: usize) -> Self {
        Self::new(start, self.end)
    }

    pub const fn replace_end(&self, end: usize) -> Self {
        Self::new(self.start, end)
    }

    /// Split into `[start, index)` and `[index, end)`.
    pub const fn split(&self, index: usize) -> (Self, Self) {
        (self.replace_end(index), self.replace_start(index))
    }
}

impl fmt::Display for TokenRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TokenList {
    pub end: usize,
    pub ttype: TokenType,
    pub tokens: Vec<Token>,
}

impl TokenList {
    pub fn add_penalty(&mut self, penalty: f64) {
        for token in &mut self.tokens {
            token.penalty += penalty;
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryNode {
    pub btype: BreakType,
    pub ptype: PhraseType,
    pub starting: Vec<TokenList>,
}

impl QueryNode {
    pub fn has_tokens(&self, end: usize, ttype: TokenType) -> bool {
        self.starting
            .iter()
            .any(|t| t.end == end && t.ttype == ttype)
    }

    pub fn get_tokens(&self, end: usize, ttype: TokenType) -> Option<&[Token]> {
        self.starting
            .iter()
            .find(|t| t.end == end && t.ttype == ttype)
            .map(|t| t.tokens.as_slice())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phrase {
    pub ptype: PhraseType,
    pub text: String,
}

impl Phrase {
    pub fn new(ptype: PhraseType, text: impl Into<String>) -> Self {
        Self {
            ptype,
            text: text.into(),
        }
    }

    pub fn free(text: impl Into<String>) -> Self {
        Self::new(PhraseType::None, text)
    }
}

/// Analyzed query: the phrases it came from and the token graph over them.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryStruct {
    pub source: Vec<Phrase>,
    pub nodes: Vec<QueryNode>,
}

impl QueryStruct {
    pub fn new(source: Vec<Phrase>) -> Self {
        let ptype = source.first().map_or(PhraseType::None, |p| p.ptype);
        Self {
            source,
            nodes: vec![QueryNode {
                btype: BreakType::Start,
                ptype,
                starting: Vec::new(),
            }],
        }
    }

    pub fn num_token_slots(&self) -> usize {
        self.nodes.len() - 1
    }

    pub fn add_node(&mut self, btype: BreakType, ptype: PhraseType) {
        self.nodes.push(QueryNode {
            btype,
            ptype,
            starting: Vec::new(),
        });
    }

    /// Add a token for the given range.
    ///
    /// Tokens whose type does not fit the phrase type of the start node are dropped
    /// silently.
    pub fn add_token(&mut self, trange: TokenRange, ttype: TokenType, token: Token) {
        if trange.is_empty() || trange.end >= self.nodes.len() {
            return;
        }
        let snode = &self.nodes[trange.start];
        let full_phrase = matches!(snode.btype, BreakType::Start | BreakType::Phrase)
            && matches!(
                self.nodes[trange.end].btype,
                BreakType::Phrase | BreakType::End
            );
        if !snode.ptype.compatible_with(ttype, full_phrase) {
            return;
        }
        let snode = &mut self.nodes[trange.start];
        if let Some(tlist) = snode
            .starting
            .iter_mut()
            .find(|t| t.end == trange.end && t.ttype == ttype)
        {
            tlist.tokens.push(token);
        } else {
            snode.starting.push(TokenList {
                end: trange.end,
                ttype,
                tokens: vec![token],
            });
        }
    }

    /// All tokens of `ttype` spanning exactly `trange`; empty when there are none.
    pub fn get_tokens(&self, trange: TokenRange, ttype: TokenType) -> &[Token] {
        self.nodes
            .get(trange.start)
            .and_then(|n| n.get_tokens(trange.end, ttype))
            .unwrap_or(&[])
    }

    /// The first partial token of every single step in the range.
    pub fn get_partials_list(&self, trange: TokenRange) -> Vec<&Token> {
        (trange.start..trange.end)
            .filter_map(|i| self.get_tokens(TokenRange::new(i, i + 1), TokenType::Partial).first())
            .collect()
    }

    /// Every token list together with its start position and node.
    pub fn iter_token_lists(&self) -> impl Iterator<Item = (usize, &QueryNode, &TokenList)> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .flat_map(|(i, node)| node.starting.iter().map(move |tlist| (i, node, tlist)))
    }

    /// Lookup word of the token with the given id. Debugging aid.
    pub fn find_lookup_word_by_id(&self, token: TokenId) -> String {
        self.iter_token_lists()
            .flat_map(|(_, _, tlist)| tlist.tokens.iter())
            .find(|t| t.token == token)
            .map_or_else(|| "None".to_owned(), |t| format!("[{}] {}", t.lookup_word, t.token))
    }
}
