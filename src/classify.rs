//! Token classification into the `A`/`O`/`-` pattern the arity grammars run on.

use crate::parser::ParseError;
use crate::resolve::{OptionResolver, OptionTuple};
use std::collections::BTreeMap;
use std::fmt;

/// The literal that ends option recognition.
pub const SEPARATOR: &str = "--";

/// Classification of a single input token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Symbol {
    /// Argument-like (`A`).
    Arg,
    /// Option-like (`O`), resolved or not.
    Opt,
    /// The `--` separator (`-`).
    Separator,
}

impl Symbol {
    pub fn as_char(self) -> char {
        match self {
            Symbol::Arg => 'A',
            Symbol::Opt => 'O',
            Symbol::Separator => '-',
        }
    }
}

/// Per-token symbols plus the resolved tuple of every `O` token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenPattern {
    symbols: Vec<Symbol>,
    options: BTreeMap<usize, OptionTuple>,
}

impl TokenPattern {
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    /// Symbols from `start` to the end; empty when `start` is past the end.
    pub fn symbols_from(&self, start: usize) -> &[Symbol] {
        self.symbols.get(start..).unwrap_or(&[])
    }

    pub fn option_at(&self, index: usize) -> Option<&OptionTuple> {
        self.options.get(&index)
    }

    pub fn is_option(&self, index: usize) -> bool {
        self.options.contains_key(&index)
    }

    /// First option index at or after `start`.
    pub fn next_option(&self, start: usize) -> Option<usize> {
        self.options.range(start..).next().map(|(index, _)| *index)
    }

    pub fn max_option_index(&self) -> Option<usize> {
        self.options.keys().next_back().copied()
    }
}

impl fmt::Display for TokenPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.symbols
            .iter()
            .try_for_each(|symbol| write!(f, "{}", symbol.as_char()))
    }
}

/// Classify every token in one pass.
pub fn classify(tokens: &[String], resolver: &OptionResolver<'_>) -> Result<TokenPattern, ParseError> {
    let mut pattern = TokenPattern {
        symbols: Vec::with_capacity(tokens.len()),
        options: BTreeMap::new(),
    };

    let mut iter = tokens.iter().enumerate();
    while let Some((index, token)) = iter.next() {
        if token == SEPARATOR {
            pattern.symbols.push(Symbol::Separator);
            pattern.symbols.extend(iter.by_ref().map(|_| Symbol::Arg));
            break;
        }
        match resolver.resolve(token)? {
            Some(tuple) => {
                pattern.options.insert(index, tuple);
                pattern.symbols.push(Symbol::Opt);
            }
            None => pattern.symbols.push(Symbol::Arg),
        }
    }

    Ok(pattern)
}
