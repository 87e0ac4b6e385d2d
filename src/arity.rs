//! Arity matching over the `A`/`O`/`-` token pattern.
//!
//! Each [`ArityKind`] maps to a tiny grammar: a sequence of repeated symbol
//! classes. Grammars for several actions are concatenated and matched at the
//! start of a window with greedy, backtracking semantics, one capture length
//! per action.

use crate::action::{Action, ArityKind};
use crate::classify::Symbol;
use crate::parser::ParseError;
use std::collections::HashSet;
use std::fmt;

const ARG: &[Symbol] = &[Symbol::Arg];
const SEP: &[Symbol] = &[Symbol::Separator];
const ARG_OR_SEP: &[Symbol] = &[Symbol::Arg, Symbol::Separator];
const ANY: &[Symbol] = &[Symbol::Arg, Symbol::Opt, Symbol::Separator];
const ARG_OR_OPT: &[Symbol] = &[Symbol::Arg, Symbol::Opt];

/// One repeated symbol class, e.g. `A?` or `[A-]*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Piece {
    accepts: &'static [Symbol],
    min: usize,
    max: Option<usize>,
}

impl Piece {
    const fn one(accepts: &'static [Symbol]) -> Self {
        Self {
            accepts,
            min: 1,
            max: Some(1),
        }
    }

    const fn optional(accepts: &'static [Symbol]) -> Self {
        Self {
            accepts,
            min: 0,
            max: Some(1),
        }
    }

    const fn many(accepts: &'static [Symbol]) -> Self {
        Self {
            accepts,
            min: 0,
            max: None,
        }
    }
}

/// The grammar for one action: a captured sequence of pieces.
fn grammar(arity: ArityKind, optional: bool) -> Vec<Piece> {
    let dashes = Piece::many(SEP);
    let mut pieces = match arity {
        ArityKind::Exactly(n) => {
            let mut pieces = vec![dashes];
            for _ in 0..n {
                pieces.push(Piece::one(ARG));
                pieces.push(dashes);
            }
            pieces
        }
        ArityKind::ZeroOrOne => vec![dashes, Piece::optional(ARG), dashes],
        ArityKind::ZeroOrMore => vec![dashes, Piece::many(ARG_OR_SEP)],
        ArityKind::OneOrMore => vec![dashes, Piece::one(ARG), Piece::many(ARG_OR_SEP)],
        ArityKind::Remainder => vec![Piece::many(ANY)],
        ArityKind::ParserHandoff => vec![dashes, Piece::one(ARG), Piece::many(ANY)],
    };

    if optional {
        // An option's own arguments never include a standalone `--`.
        pieces.retain(|piece| piece.accepts != SEP);
        for piece in &mut pieces {
            piece.accepts = match piece.accepts {
                a if a == ARG_OR_SEP => ARG,
                a if a == ANY => ARG_OR_OPT,
                a => a,
            };
        }
    }
    pieces
}

/// What an action expected when its grammar could not match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expected {
    One,
    AtMostOne,
    AtLeastOne,
    Exactly(usize),
}

impl Expected {
    fn for_arity(arity: ArityKind) -> Self {
        match arity {
            ArityKind::Exactly(1) => Expected::One,
            ArityKind::Exactly(n) => Expected::Exactly(n),
            ArityKind::ZeroOrOne => Expected::AtMostOne,
            ArityKind::ZeroOrMore
            | ArityKind::OneOrMore
            | ArityKind::Remainder
            | ArityKind::ParserHandoff => Expected::AtLeastOne,
        }
    }
}

impl fmt::Display for Expected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expected::One => f.write_str("expected one argument"),
            Expected::AtMostOne => f.write_str("expected at most one argument"),
            Expected::AtLeastOne => f.write_str("expected at least one argument"),
            Expected::Exactly(n) => write!(f, "expected {} argument{}", n, if *n == 1 { "" } else { "s" }),
        }
    }
}

/// Backtracking matcher over a flattened list of `(group, piece)`.
struct Matcher<'a> {
    pieces: Vec<(usize, Piece)>,
    input: &'a [Symbol],
    /// `(piece, position)` states already known not to lead to a match.
    dead: HashSet<(usize, usize)>,
}

impl<'a> Matcher<'a> {
    fn new(groups: &[Vec<Piece>], input: &'a [Symbol]) -> Self {
        let pieces = groups
            .iter()
            .enumerate()
            .flat_map(|(group, pieces)| pieces.iter().map(move |piece| (group, *piece)))
            .collect();
        Self {
            pieces,
            input,
            dead: HashSet::new(),
        }
    }

    fn run(mut self, groups: usize) -> Option<Vec<usize>> {
        let mut lengths = vec![0; groups];
        self.step(0, 0, &mut lengths).then_some(lengths)
    }

    fn step(&mut self, index: usize, position: usize, lengths: &mut [usize]) -> bool {
        let Some(&(group, piece)) = self.pieces.get(index) else {
            return true;
        };
        if self.dead.contains(&(index, position)) {
            return false;
        }

        let available = self.input[position..]
            .iter()
            .take_while(|symbol| piece.accepts.contains(*symbol))
            .count();
        let longest = piece.max.map_or(available, |max| available.min(max));

        if longest >= piece.min {
            for take in (piece.min..=longest).rev() {
                lengths[group] += take;
                if self.step(index + 1, position + take, lengths) {
                    return true;
                }
                lengths[group] -= take;
            }
        }

        self.dead.insert((index, position));
        false
    }
}

/// How many tokens from the start of `window` belong to an option's action.
pub fn match_option(action: &Action, window: &[Symbol]) -> Result<usize, ParseError> {
    let arity = action.arity_kind();
    Matcher::new(&[grammar(arity, true)], window)
        .run(1)
        .map(|lengths| lengths[0])
        .ok_or_else(|| ParseError::ArityMismatch {
            argument: action.display_name(),
            expected: Expected::for_arity(arity),
        })
}

/// Match as many of the queued positionals as possible against `window`.
///
/// Tries every prefix of `actions`, longest first, and returns the per-action
/// counts of the first prefix whose combined grammar matches. An empty result
/// means not even the first positional could match.
pub fn match_partial(actions: &[&Action], window: &[Symbol]) -> Vec<usize> {
    let grammars: Vec<Vec<Piece>> = actions
        .iter()
        .map(|action| grammar(action.arity_kind(), false))
        .collect();

    (1..=grammars.len())
        .rev()
        .find_map(|count| Matcher::new(&grammars[..count], window).run(count))
        .unwrap_or_default()
}
