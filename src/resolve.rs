//! Option-string resolution: which action, if any, a token refers to.

use crate::parser::ParseError;
use std::collections::HashMap;

/// A token recognised as option-shaped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionTuple {
    /// Index of the matched action, or `None` for an unknown option.
    pub action: Option<usize>,
    /// The option string that matched (the token itself when unknown).
    pub option_string: String,
    /// Value attached with `=` or clustered after a short flag.
    pub explicit_arg: Option<String>,
}

impl OptionTuple {
    fn new(action: Option<usize>, option_string: &str, explicit_arg: Option<&str>) -> Self {
        Self {
            action,
            option_string: option_string.to_string(),
            explicit_arg: explicit_arg.map(str::to_string),
        }
    }
}

/// Resolves tokens against a parser's declared option strings.
#[derive(Debug, Clone, Copy)]
pub struct OptionResolver<'a> {
    pub(crate) prefix_chars: &'a [char],
    /// Option strings in declaration order.
    pub(crate) option_strings: &'a [(String, usize)],
    pub(crate) lookup: &'a HashMap<String, usize>,
    pub(crate) allow_abbrev: bool,
    pub(crate) negative_number_options: bool,
}

impl<'a> OptionResolver<'a> {
    pub fn is_prefix_char(&self, c: char) -> bool {
        self.prefix_chars.contains(&c)
    }

    /// Exact lookup of a declared option string.
    pub fn lookup(&self, option_string: &str) -> Option<usize> {
        self.lookup.get(option_string).copied()
    }

    /// Classify `token`.
    ///
    /// Returns `Ok(None)` for argument-like tokens, and an error only when an
    /// abbreviation matches more than one option string.
    pub fn resolve(&self, token: &str) -> Result<Option<OptionTuple>, ParseError> {
        let mut chars = token.chars();
        match chars.next() {
            Some(first) if self.is_prefix_char(first) => {}
            _ => return Ok(None),
        }

        if let Some(action) = self.lookup(token) {
            return Ok(Some(OptionTuple::new(Some(action), token, None)));
        }

        if chars.next().is_none() {
            return Ok(None);
        }

        if let Some((name, value)) = token.split_once('=') {
            if let Some(action) = self.lookup(name) {
                return Ok(Some(OptionTuple::new(Some(action), name, Some(value))));
            }
        }

        let mut candidates = self.candidates(token);
        if candidates.len() > 1 {
            return Err(ParseError::AmbiguousOption {
                option: token.to_string(),
                matches: candidates.into_iter().map(|c| c.option_string).collect(),
            });
        }
        if let Some(candidate) = candidates.pop() {
            return Ok(Some(candidate));
        }

        if looks_like_negative_number(token) && !self.negative_number_options {
            return Ok(None);
        }

        if token.contains(' ') {
            return Ok(None);
        }

        Ok(Some(OptionTuple::new(None, token, None)))
    }

    /// Abbreviation and short-cluster candidates for a token with no exact match.
    fn candidates(&self, token: &str) -> Vec<OptionTuple> {
        let mut chars = token.char_indices();
        let second = chars.nth(1);
        let Some((second_at, second)) = second else {
            return Vec::new();
        };
        let mut result = Vec::new();

        if self.is_prefix_char(second) {
            if !self.allow_abbrev {
                return result;
            }
            let (prefix, explicit) = match token.split_once('=') {
                Some((name, value)) => (name, Some(value)),
                None => (token, None),
            };
            for (option_string, action) in self.option_strings {
                if option_string.starts_with(prefix) {
                    result.push(OptionTuple::new(Some(*action), option_string, explicit));
                }
            }
        } else {
            let split = second_at + second.len_utf8();
            let (short, clustered) = token.split_at(split);
            for (option_string, action) in self.option_strings {
                if option_string == short {
                    result.push(OptionTuple::new(Some(*action), option_string, Some(clustered)));
                } else if self.allow_abbrev && option_string.starts_with(token) {
                    result.push(OptionTuple::new(Some(*action), option_string, None));
                }
            }
        }

        result
    }
}

/// `-12`, `-3.5`, `-.5`
pub(crate) fn looks_like_negative_number(token: &str) -> bool {
    let Some(rest) = token.strip_prefix('-') else {
        return false;
    };
    let (whole, fraction) = match rest.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (rest, None),
    };
    let digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    match fraction {
        None => !whole.is_empty() && digits(whole),
        Some(fraction) => digits(whole) && !fraction.is_empty() && digits(fraction),
    }
}
