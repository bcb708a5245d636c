//! Enumeration of token role assignments.
//!
//! The enumerator walks the token graph depth-first, building sequences of typed ranges
//! from the start of the query to its end. Every complete sequence is checked for
//! plausibility and then expanded into one or more [`TokenAssignment`]s, splitting the
//! free name terms into a name and address parts.

use std::collections::VecDeque;

use super::query::{BreakType, PhraseType, QueryStruct, TokenRange, TokenType};
use crate::trace::{NOOP_TRACE, SearchTrace};

/// Penalty for changing the token type across a break.
pub const fn penalty_tokenchange(btype: BreakType) -> f64 {
    match btype {
        BreakType::Start | BreakType::End | BreakType::Phrase | BreakType::SoftPhrase => 0.0,
        BreakType::Word => 0.1,
        BreakType::Part => 0.2,
        BreakType::Token => 0.4,
    }
}

/// Beyond this many address terms a query is not worth interpreting.
const MAX_ADDRESS_TOKENS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TypedRange {
    ttype: TokenType,
    trange: TokenRange,
}

/// One interpretation of the query.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TokenAssignment {
    pub penalty: f64,
    pub name: Option<TokenRange>,
    pub address: Vec<TokenRange>,
    pub housenumber: Option<TokenRange>,
    pub postcode: Option<TokenRange>,
    pub country: Option<TokenRange>,
    pub near_item: Option<TokenRange>,
    pub qualifier: Option<TokenRange>,
}

impl TokenAssignment {
    fn from_ranges(ranges: &[TypedRange]) -> Self {
        let mut out = Self::default();
        for r in ranges {
            match r.ttype {
                TokenType::Partial => out.address.push(r.trange),
                TokenType::HouseNumber => out.housenumber = Some(r.trange),
                TokenType::Postcode => out.postcode = Some(r.trange),
                TokenType::Country => out.country = Some(r.trange),
                TokenType::NearItem | TokenType::Category => out.near_item = Some(r.trange),
                TokenType::Qualifier => out.qualifier = Some(r.trange),
                TokenType::Word => {}
            }
        }
        out
    }

    fn with_penalty(&self, penalty: f64) -> Self {
        Self {
            penalty,
            ..self.clone()
        }
    }
}

/// Reading direction of a sequence: -1 right-to-left, 1 left-to-right, 0 undecided.
type Direction = i8;

#[derive(Debug, Clone)]
struct TokenSequence {
    seq: Vec<TypedRange>,
    direction: Direction,
    penalty: f64,
}

impl TokenSequence {
    fn end_pos(&self) -> usize {
        self.seq.last().map_or(0, |r| r.trange.end)
    }

    fn has_types(&self, ttypes: &[TokenType]) -> bool {
        self.seq.iter().any(|r| ttypes.contains(&r.ttype))
    }

    /// Country and near items end a left-to-right reading.
    fn is_final(&self) -> bool {
        self.seq.len() > 1
            && self
                .seq
                .last()
                .is_some_and(|r| matches!(r.ttype, TokenType::Country | TokenType::NearItem))
    }

    /// New direction after appending `ttype`, or `None` when it cannot be appended.
    fn appendable(&self, ttype: TokenType) -> Option<Direction> {
        use TokenType as T;

        if ttype == T::Word {
            return None;
        }
        let Some(first) = self.seq.first() else {
            return Some(match ttype {
                T::Country => -1,
                T::HouseNumber | T::Qualifier => 1,
                _ => self.direction,
            });
        };

        if ttype == T::Partial {
            // qualifiers must stay next to the phrase they belong to
            let before_last = &self.seq[..self.seq.len() - 1];
            if self.direction == -1 && before_last.iter().any(|r| r.ttype == T::Qualifier) {
                return None;
            }
            return Some(self.direction);
        }

        if self.has_types(&[ttype]) {
            return None;
        }

        match ttype {
            T::HouseNumber => {
                if self.direction == 1 {
                    if self.seq.len() == 1 && first.ttype == T::Qualifier {
                        return None;
                    }
                    if self.seq.len() > 2 || self.has_types(&[T::Postcode, T::Country]) {
                        return None;
                    }
                } else if self.direction == -1 || self.has_types(&[T::Postcode, T::Country]) {
                    return Some(-1);
                }
                Some(self.direction)
            }
            T::Postcode => match self.direction {
                -1 if self.has_types(&[T::HouseNumber, T::Qualifier]) => None,
                -1 => Some(-1),
                1 => (!self.has_types(&[T::Country])).then_some(1),
                _ if self.has_types(&[T::HouseNumber, T::Qualifier]) => Some(1),
                _ => Some(self.direction),
            },
            T::Country => (self.direction != -1).then_some(1),
            T::NearItem | T::Category => Some(self.direction),
            T::Qualifier => {
                if self.direction == 1 {
                    let after_near_only = (self.seq.len() == 1
                        && matches!(first.ttype, T::Partial | T::NearItem))
                        || (self.seq.len() == 2
                            && first.ttype == T::NearItem
                            && self.seq[1].ttype == T::Partial);
                    return after_near_only.then_some(1);
                }
                if self.direction == -1 {
                    return Some(-1);
                }
                let tempseq = if first.ttype == T::NearItem {
                    &self.seq[1..]
                } else {
                    &self.seq[..]
                };
                if tempseq.is_empty() {
                    Some(1)
                } else if tempseq.len() == 1 && first.ttype == T::HouseNumber {
                    None
                } else if tempseq.len() > 1 || self.has_types(&[T::Postcode, T::Country]) {
                    Some(-1)
                } else {
                    Some(0)
                }
            }
            T::Word | T::Partial => None,
        }
    }

    fn advance(&self, ttype: TokenType, end_pos: usize, btype: BreakType) -> Option<Self> {
        let ttype = if ttype.is_near_like() {
            TokenType::NearItem
        } else {
            ttype
        };
        let direction = self.appendable(ttype)?;

        let (seq, extra) = match self.seq.last() {
            None => (
                vec![TypedRange {
                    ttype,
                    trange: TokenRange::new(0, end_pos),
                }],
                0.0,
            ),
            Some(last) if btype != BreakType::Phrase && last.ttype == ttype => {
                let mut seq = self.seq.clone();
                let len = seq.len();
                seq[len - 1].trange = last.trange.replace_end(end_pos);
                (seq, 0.0)
            }
            Some(last) => {
                let mut seq = self.seq.clone();
                seq.push(TypedRange {
                    ttype,
                    trange: TokenRange::new(last.trange.end, end_pos),
                });
                (seq, penalty_tokenchange(btype))
            }
        };

        Some(Self {
            seq,
            direction,
            penalty: self.penalty + extra,
        })
    }

    fn adapt_penalty_from_priors(&mut self, priors: usize, new_dir: Direction) -> bool {
        if priors >= 2 {
            if self.direction == 0 {
                self.direction = new_dir;
            } else if priors == 2 {
                self.penalty += 0.8;
            } else {
                return false;
            }
        }
        true
    }

    /// Final checks that need the complete sequence. May adapt direction and penalty.
    fn recheck_sequence(&mut self) -> bool {
        // qualifiers must sit at the start or the end of the query
        if self.seq.len() > 2
            && self.seq[1..self.seq.len() - 1]
                .iter()
                .any(|r| r.ttype == TokenType::Qualifier)
        {
            return false;
        }
        let Some(hnrpos) = self
            .seq
            .iter()
            .position(|r| r.ttype == TokenType::HouseNumber)
        else {
            return true;
        };
        let count_partials = |ranges: &[TypedRange]| {
            ranges
                .iter()
                .filter(|r| r.ttype == TokenType::Partial)
                .count()
        };
        if self.direction != -1 {
            let priors = count_partials(&self.seq[..hnrpos]);
            if !self.adapt_penalty_from_priors(priors, -1) {
                return false;
            }
        }
        if self.direction != 1 {
            let priors = count_partials(&self.seq[hnrpos + 1..]);
            if !self.adapt_penalty_from_priors(priors, 1) {
                return false;
            }
        }
        if self.has_types(&[TokenType::NearItem]) {
            self.penalty += 1.0;
        }
        true
    }

    fn assignments_postcode(
        &mut self,
        base: &TokenAssignment,
        postcode: TokenRange,
        query_len: usize,
        out: &mut Vec<TokenAssignment>,
        trace: &dyn SearchTrace,
    ) {
        if (postcode.start == 0 && self.direction != -1)
            || (postcode.end == query_len && self.direction != 1)
        {
            trace.comment("postcode search");
            let penalty = if postcode.start == 0 {
                self.direction = -1;
                self.penalty
            } else {
                self.direction = 1;
                self.penalty + 0.1
            };
            out.push(base.with_penalty(penalty));
        }
    }

    fn assignments_address_forward(
        &self,
        base: &TokenAssignment,
        query: &QueryStruct,
        out: &mut Vec<TokenAssignment>,
        trace: &dyn SearchTrace,
    ) {
        let first = base.address[0];

        trace.comment("first word = name");
        out.push(TokenAssignment {
            penalty: self.penalty,
            name: Some(first),
            address: base.address[1..].to_vec(),
            ..base.clone()
        });

        if base.housenumber.is_some_and(|h| first.end < h.start)
            || base.qualifier.is_some_and(|q| q.is_after(&first))
            || query.nodes[first.start].ptype != PhraseType::None
        {
            return;
        }

        let mut penalty = self.penalty;
        if base.housenumber.is_some_and(|h| h.is_after(&first)) || query.source.len() > 1 {
            penalty += 0.25;
        }

        for i in first.start + 1..first.end {
            let (name, addr) = first.split(i);
            trace.comment(&format!("split first word = name ({})", i - first.start));
            let mut address = vec![addr];
            address.extend_from_slice(&base.address[1..]);
            out.push(TokenAssignment {
                penalty: penalty + penalty_tokenchange(query.nodes[i].btype),
                name: Some(name),
                address,
                ..base.clone()
            });
        }
    }

    fn assignments_address_backward(
        &self,
        base: &TokenAssignment,
        query: &QueryStruct,
        out: &mut Vec<TokenAssignment>,
        trace: &dyn SearchTrace,
    ) {
        let Some(&last) = base.address.last() else {
            return;
        };
        let rest = &base.address[..base.address.len() - 1];

        if self.direction == -1 || base.address.len() > 1 {
            trace.comment("last word = name");
            out.push(TokenAssignment {
                penalty: self.penalty,
                name: Some(last),
                address: rest.to_vec(),
                ..base.clone()
            });
        }

        if base.housenumber.is_some_and(|h| last.start > h.end)
            || base.qualifier.is_some_and(|q| q.is_before(&last))
            || query.nodes[last.start].ptype != PhraseType::None
        {
            return;
        }

        let mut penalty = self.penalty;
        if base.housenumber.is_some_and(|h| h.is_before(&last)) {
            penalty += 0.4;
        }
        if query.source.len() > 1 {
            penalty += 0.25;
        }

        for i in last.start + 1..last.end {
            let (addr, name) = last.split(i);
            trace.comment(&format!("split last word = name ({})", i - last.start));
            let mut address = rest.to_vec();
            address.push(addr);
            out.push(TokenAssignment {
                penalty: penalty + penalty_tokenchange(query.nodes[i].btype),
                name: Some(name),
                address,
                ..base.clone()
            });
        }
    }

    /// Expand a complete sequence into assignments, splitting name and address.
    fn get_assignments(mut self, query: &QueryStruct, trace: &dyn SearchTrace) -> Vec<TokenAssignment> {
        let base = TokenAssignment::from_ranges(&self.seq);
        let mut out = Vec::new();

        let num_addr_tokens: usize = base.address.iter().map(TokenRange::len).sum();
        if num_addr_tokens > MAX_ADDRESS_TOKENS {
            return out;
        }

        if let Some(postcode) = base.postcode
            && !base.address.is_empty()
        {
            self.assignments_postcode(&base, postcode, query.num_token_slots(), &mut out, trace);
        }

        if base.address.is_empty() {
            if base.housenumber.is_none()
                && (base.postcode.is_some() || base.country.is_some() || base.near_item.is_some())
            {
                trace.comment("postcode/country search");
                out.push(base.with_penalty(self.penalty));
            }
        } else {
            if base.postcode.is_some_and(|p| p.start == 0) {
                self.penalty += 0.1;
            }
            if self.direction != -1 {
                self.assignments_address_forward(&base, query, &mut out, trace);
            }
            if self.direction != 1 {
                self.assignments_address_backward(&base, query, &mut out, trace);
            }
            if base.housenumber.is_some() && base.qualifier.is_none() {
                out.push(base.with_penalty(self.penalty));
            }
        }
        out
    }

    fn describe(&self) -> String {
        let ranges: String = self
            .seq
            .iter()
            .map(|r| format!("[{} - {}: {:?}]", r.trange.start, r.trange.end, r.ttype))
            .collect();
        format!("{ranges} (dir: {}, penalty: {})", self.direction, self.penalty)
    }
}

/// Single-pass iterator over all plausible assignments of a query.
///
/// Sequences are explored depth-first; the assignments of a complete sequence are
/// handed out in the order they were derived. The iterator cannot be restarted.
pub struct TokenAssignments<'q> {
    query: &'q QueryStruct,
    todo: Vec<TokenSequence>,
    pending: VecDeque<TokenAssignment>,
    trace: &'q dyn SearchTrace,
}

impl<'q> TokenAssignments<'q> {
    pub fn new(query: &'q QueryStruct) -> Self {
        let todo = query
            .source
            .first()
            .map(|phrase| TokenSequence {
                seq: Vec::new(),
                direction: if phrase.ptype == PhraseType::None { 0 } else { 1 },
                penalty: 0.0,
            })
            .into_iter()
            .collect();
        Self {
            query,
            todo,
            pending: VecDeque::new(),
            trace: &NOOP_TRACE,
        }
    }

    pub fn with_trace(mut self, trace: &'q dyn SearchTrace) -> Self {
        self.trace = trace;
        self
    }
}

impl Iterator for TokenAssignments<'_> {
    type Item = TokenAssignment;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(assignment) = self.pending.pop_front() {
                return Some(assignment);
            }
            let state = self.todo.pop()?;
            let Some(node) = self.query.nodes.get(state.end_pos()) else {
                continue;
            };
            for tlist in &node.starting {
                let Some(mut newstate) = state.advance(tlist.ttype, tlist.end, node.btype) else {
                    continue;
                };
                if newstate.end_pos() == self.query.num_token_slots() {
                    if newstate.recheck_sequence() {
                        if self.trace.is_enabled() {
                            self.trace.var_dump("Assignment", &newstate.describe());
                        }
                        self.pending
                            .extend(newstate.get_assignments(self.query, self.trace));
                    }
                } else if !newstate.is_final() {
                    self.todo.push(newstate);
                }
            }
        }
    }
}

/// Shortcut for `TokenAssignments::new(query)`.
pub fn yield_token_assignments(query: &QueryStruct) -> TokenAssignments<'_> {
    TokenAssignments::new(query)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::query::{Phrase, Token};

    type NodeSpec = (BreakType, PhraseType, Vec<(usize, TokenType)>);

    fn make_query(spec: Vec<NodeSpec>) -> QueryStruct {
        let mut q = QueryStruct::new(vec![Phrase::new(spec[0].1, "")]);
        for (btype, ptype, _) in &spec[1..] {
            q.add_node(*btype, *ptype);
        }
        q.add_node(BreakType::End, PhraseType::None);
        for (start, (_, _, tlist)) in spec.iter().enumerate() {
            for (end, ttype) in tlist {
                q.add_token(
                    TokenRange::new(start, *end),
                    *ttype,
                    Token::new(100, "foo", 1.0, 1),
                );
            }
        }
        q
    }

    fn assignment(
        penalty: f64,
        build: impl FnOnce(&mut TokenAssignment),
    ) -> TokenAssignment {
        let mut a = TokenAssignment {
            penalty,
            ..TokenAssignment::default()
        };
        build(&mut a);
        a
    }

    fn check_assignments(actual: Vec<TokenAssignment>, expected: &[TokenAssignment]) {
        assert_eq!(actual.len(), expected.len(), "got {actual:#?}");
        for exp in expected {
            assert!(
                actual
                    .iter()
                    .any(|a| a.name == exp.name
                        && a.address == exp.address
                        && a.housenumber == exp.housenumber
                        && a.postcode == exp.postcode
                        && a.country == exp.country
                        && a.near_item == exp.near_item
                        && a.qualifier == exp.qualifier
                        && (a.penalty - exp.penalty).abs() < 1e-9),
                "missing {exp:?} in {actual:#?}"
            );
        }
    }

    const fn r(start: usize, end: usize) -> TokenRange {
        TokenRange::new(start, end)
    }

    #[test]
    fn test_query_with_missing_tokens() {
        let mut q = QueryStruct::new(vec![Phrase::free("")]);
        q.add_node(BreakType::End, PhraseType::None);
        assert_eq!(TokenAssignments::new(&q).count(), 0);
    }

    #[test]
    fn test_one_word_query() {
        let q = make_query(vec![(
            BreakType::Start,
            PhraseType::None,
            vec![(1, TokenType::Partial), (1, TokenType::Word), (1, TokenType::HouseNumber)],
        )]);
        let res: Vec<_> = TokenAssignments::new(&q).collect();
        check_assignments(res, &[assignment(0.0, |a| a.name = Some(r(0, 1)))]);
    }

    #[test]
    fn test_single_postcode() {
        let q = make_query(vec![(BreakType::Start, PhraseType::None, vec![(1, TokenType::Postcode)])]);
        let res: Vec<_> = TokenAssignments::new(&q).collect();
        check_assignments(res, &[assignment(0.0, |a| a.postcode = Some(r(0, 1)))]);
    }

    #[test]
    fn test_single_country_name() {
        let q = make_query(vec![(BreakType::Start, PhraseType::None, vec![(1, TokenType::Country)])]);
        let res: Vec<_> = TokenAssignments::new(&q).collect();
        check_assignments(res, &[assignment(0.0, |a| a.country = Some(r(0, 1)))]);
    }

    #[test]
    fn test_single_near_item_and_category() {
        for ttype in [TokenType::NearItem, TokenType::Category] {
            let q = make_query(vec![(BreakType::Start, PhraseType::None, vec![(1, ttype)])]);
            let res: Vec<_> = TokenAssignments::new(&q).collect();
            check_assignments(res, &[assignment(0.0, |a| a.near_item = Some(r(0, 1)))]);
        }
    }

    #[test]
    fn test_multiple_simple_words() {
        let q = make_query(vec![
            (BreakType::Start, PhraseType::None, vec![(1, TokenType::Partial)]),
            (BreakType::Word, PhraseType::None, vec![(2, TokenType::Partial)]),
            (BreakType::Word, PhraseType::None, vec![(3, TokenType::Partial)]),
        ]);
        let res: Vec<_> = TokenAssignments::new(&q).collect();
        let penalty = penalty_tokenchange(BreakType::Word);
        check_assignments(
            res,
            &[
                assignment(0.0, |a| a.name = Some(r(0, 3))),
                assignment(penalty, |a| {
                    a.name = Some(r(0, 2));
                    a.address = vec![r(2, 3)];
                }),
                assignment(penalty, |a| {
                    a.name = Some(r(0, 1));
                    a.address = vec![r(1, 3)];
                }),
                assignment(penalty, |a| {
                    a.name = Some(r(1, 3));
                    a.address = vec![r(0, 1)];
                }),
                assignment(penalty, |a| {
                    a.name = Some(r(2, 3));
                    a.address = vec![r(0, 2)];
                }),
            ],
        );
    }

    #[test]
    fn test_multiple_words_respect_phrase_break() {
        let mut q = QueryStruct::new(vec![Phrase::free("a"), Phrase::free("b")]);
        q.add_node(BreakType::Phrase, PhraseType::None);
        q.add_node(BreakType::End, PhraseType::None);
        q.add_token(r(0, 1), TokenType::Partial, Token::new(1, "a", 1.0, 1));
        q.add_token(r(1, 2), TokenType::Partial, Token::new(2, "b", 1.0, 1));
        let res: Vec<_> = TokenAssignments::new(&q).collect();
        check_assignments(
            res,
            &[
                assignment(0.0, |a| {
                    a.name = Some(r(0, 1));
                    a.address = vec![r(1, 2)];
                }),
                assignment(0.0, |a| {
                    a.name = Some(r(1, 2));
                    a.address = vec![r(0, 1)];
                }),
            ],
        );
    }

    #[test]
    fn test_housenumber_and_street() {
        let q = make_query(vec![
            (BreakType::Start, PhraseType::None, vec![(1, TokenType::HouseNumber)]),
            (BreakType::Phrase, PhraseType::None, vec![(2, TokenType::Partial)]),
        ]);
        let res: Vec<_> = TokenAssignments::new(&q).collect();
        check_assignments(
            res,
            &[
                assignment(0.0, |a| {
                    a.name = Some(r(1, 2));
                    a.housenumber = Some(r(0, 1));
                }),
                assignment(0.0, |a| {
                    a.address = vec![r(1, 2)];
                    a.housenumber = Some(r(0, 1));
                }),
            ],
        );
    }

    #[test]
    fn test_housenumber_between_long_address_parts_is_rejected() {
        let q = make_query(vec![
            (BreakType::Start, PhraseType::None, vec![(1, TokenType::Partial)]),
            (BreakType::Phrase, PhraseType::None, vec![(2, TokenType::Partial)]),
            (BreakType::Word, PhraseType::None, vec![(3, TokenType::HouseNumber)]),
            (BreakType::Phrase, PhraseType::None, vec![(4, TokenType::Partial)]),
            (BreakType::Phrase, PhraseType::None, vec![(5, TokenType::Partial)]),
            (BreakType::Phrase, PhraseType::None, vec![(6, TokenType::Partial)]),
        ]);
        assert_eq!(TokenAssignments::new(&q).count(), 0);
    }

    #[test]
    fn test_country_at_start_and_end() {
        let q = make_query(vec![
            (BreakType::Start, PhraseType::None, vec![(1, TokenType::Country)]),
            (BreakType::Phrase, PhraseType::None, vec![(2, TokenType::Partial)]),
        ]);
        let res: Vec<_> = TokenAssignments::new(&q).collect();
        check_assignments(
            res,
            &[assignment(0.0, |a| {
                a.name = Some(r(1, 2));
                a.country = Some(r(0, 1));
            })],
        );

        let q = make_query(vec![
            (BreakType::Start, PhraseType::None, vec![(1, TokenType::Partial)]),
            (BreakType::Phrase, PhraseType::None, vec![(2, TokenType::Country)]),
        ]);
        let res: Vec<_> = TokenAssignments::new(&q).collect();
        check_assignments(
            res,
            &[assignment(0.0, |a| {
                a.name = Some(r(0, 1));
                a.country = Some(r(1, 2));
            })],
        );
    }

    #[test]
    fn test_country_in_middle_is_rejected() {
        let q = make_query(vec![
            (BreakType::Start, PhraseType::None, vec![(1, TokenType::Partial)]),
            (BreakType::Phrase, PhraseType::None, vec![(2, TokenType::Country)]),
            (BreakType::Phrase, PhraseType::None, vec![(3, TokenType::Partial)]),
        ]);
        assert_eq!(TokenAssignments::new(&q).count(), 0);
    }

    #[test]
    fn test_qualifier_in_middle_is_rejected() {
        let q = make_query(vec![
            (BreakType::Start, PhraseType::None, vec![(1, TokenType::Partial)]),
            (BreakType::Word, PhraseType::None, vec![(2, TokenType::Qualifier)]),
            (BreakType::Word, PhraseType::None, vec![(3, TokenType::Partial)]),
        ]);
        assert_eq!(
            TokenAssignments::new(&q)
                .filter(|a| a.qualifier.is_some())
                .count(),
            0
        );
    }

    #[test]
    fn test_qualifier_at_end() {
        let q = make_query(vec![
            (BreakType::Start, PhraseType::None, vec![(1, TokenType::Partial)]),
            (BreakType::Word, PhraseType::None, vec![(2, TokenType::Qualifier)]),
        ]);
        let res: Vec<_> = TokenAssignments::new(&q).collect();
        assert!(!res.is_empty());
        assert!(res.iter().all(|a| a.qualifier == Some(r(1, 2))));
    }

    #[test]
    fn test_postcode_with_address() {
        let q = make_query(vec![
            (BreakType::Start, PhraseType::None, vec![(1, TokenType::Partial)]),
            (BreakType::Phrase, PhraseType::None, vec![(2, TokenType::Postcode)]),
        ]);
        let res: Vec<_> = TokenAssignments::new(&q).collect();
        check_assignments(
            res,
            &[
                assignment(0.1, |a| {
                    a.address = vec![r(0, 1)];
                    a.postcode = Some(r(1, 2));
                }),
                assignment(0.0, |a| {
                    a.name = Some(r(0, 1));
                    a.postcode = Some(r(1, 2));
                }),
            ],
        );
    }

    #[test]
    fn test_assignments_are_single_pass() {
        let q = make_query(vec![
            (BreakType::Start, PhraseType::None, vec![(1, TokenType::Partial)]),
            (BreakType::Word, PhraseType::None, vec![(2, TokenType::Partial)]),
        ]);
        let mut it = TokenAssignments::new(&q);
        let first: Vec<_> = it.by_ref().collect();
        assert!(!first.is_empty());
        assert!(it.next().is_none());
    }
}
