//! Argument parsing: the consumption loop over classified tokens.

use crate::action::{Action, ActionKind, ArityKind, DefaultValue, MergePolicy, Subcommands};
use crate::arity::{self, Expected};
use crate::classify::{self, Symbol, TokenPattern};
use crate::config::ConfigError;
use crate::convert;
use crate::resolve::{looks_like_negative_number, OptionResolver, OptionTuple};
use crate::value::{Namespace, Value};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use thiserror::Error;
use tracing::{debug, trace};

/// Errors that can occur during argument parsing.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("unrecognized arguments: {}", .0.join(" "))]
    UnrecognizedArguments(Vec<String>),

    #[error("ambiguous option: {option} could match {}", .matches.join(", "))]
    AmbiguousOption { option: String, matches: Vec<String> },

    #[error("argument {argument}: {expected}")]
    ArityMismatch { argument: String, expected: Expected },

    #[error("argument {argument}: ignored explicit argument '{value}'")]
    InvalidExplicitArgument { argument: String, value: String },

    #[error("argument {argument}: invalid {type_name} value: '{value}' ({reason})")]
    TypeConversion {
        argument: String,
        type_name: String,
        value: String,
        reason: String,
    },

    #[error("argument {argument}: invalid choice: '{value}' (choose from {})", .choices.join(", "))]
    InvalidChoice {
        argument: String,
        value: String,
        choices: Vec<String>,
    },

    #[error("the following arguments are required: {}", .0.join(", "))]
    MissingRequired(Vec<String>),

    #[error("one of the arguments {} is required", .0.join(" "))]
    MissingOneOf(Vec<String>),

    #[error("too few arguments")]
    TooFewArguments,

    #[error("argument {argument}: not allowed with argument {other}")]
    ConflictingArguments { argument: String, other: String },
}

/// Result of a permissive parse: the namespace plus tokens nothing matched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Parsed {
    pub namespace: Namespace,
    pub extras: Vec<String>,
}

/// Symmetric "not allowed together" relation over action indices.
#[derive(Debug, Clone, Default)]
struct Exclusions {
    neighbours: Vec<BTreeSet<usize>>,
}

impl Exclusions {
    fn new(actions: usize) -> Self {
        Self {
            neighbours: vec![BTreeSet::new(); actions],
        }
    }

    fn add_group(&mut self, members: &[usize]) {
        for &a in members {
            for &b in members {
                if a != b {
                    self.neighbours[a].insert(b);
                    self.neighbours[b].insert(a);
                }
            }
        }
    }

    fn conflicts(&self, action: usize) -> impl Iterator<Item = usize> + '_ {
        self.neighbours[action].iter().copied()
    }

    fn excludes(&self, a: usize, b: usize) -> bool {
        self.neighbours[a].contains(&b) && self.neighbours[b].contains(&a)
    }
}

/// An immutable, validated argument schema that can parse token lists.
#[derive(Debug, Clone)]
pub struct Parser {
    prog: String,
    prefix_chars: Vec<char>,
    allow_abbrev: bool,
    actions: Vec<Action>,
    option_strings: Vec<(String, usize)>,
    lookup: HashMap<String, usize>,
    exclusions: Exclusions,
    required_groups: Vec<Vec<usize>>,
    negative_number_options: bool,
}

impl Parser {
    pub fn builder(prog: impl Into<String>) -> ParserBuilder {
        ParserBuilder::new(prog)
    }

    pub fn prog(&self) -> &str {
        &self.prog
    }

    pub fn prefix_chars(&self) -> &[char] {
        &self.prefix_chars
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn is_prefix_char(&self, c: char) -> bool {
        self.prefix_chars.contains(&c)
    }

    /// Whether the actions stored under `a` and `b` may not be used together.
    pub fn are_exclusive(&self, a: &str, b: &str) -> bool {
        match (self.index_of(a), self.index_of(b)) {
            (Some(a), Some(b)) => self.exclusions.excludes(a, b),
            _ => false,
        }
    }

    fn index_of(&self, dest: &str) -> Option<usize> {
        self.actions.iter().position(|action| action.dest == dest)
    }

    fn resolver(&self) -> OptionResolver<'_> {
        OptionResolver {
            prefix_chars: &self.prefix_chars,
            option_strings: &self.option_strings,
            lookup: &self.lookup,
            allow_abbrev: self.allow_abbrev,
            negative_number_options: self.negative_number_options,
        }
    }

    /// The namespace a parse starts from before any token is consumed.
    pub fn defaults(&self) -> Namespace {
        let mut namespace = Namespace::new();
        self.seed_defaults(&mut namespace);
        namespace
    }

    fn seed_defaults(&self, namespace: &mut Namespace) {
        for action in &self.actions {
            if namespace.contains(&action.dest) {
                continue;
            }
            if let DefaultValue::Value(default) = &action.default {
                namespace.set(action.dest.clone(), default.clone());
            }
        }
    }

    /// Parse `tokens`, leaving anything unmatched in [`Parsed::extras`].
    ///
    /// Values already present in `seed` take precedence over defaults.
    pub fn parse_known_args(&self, tokens: &[String], seed: Namespace) -> Result<Parsed, ParseError> {
        let mut namespace = seed;
        self.seed_defaults(&mut namespace);

        let pattern = classify::classify(tokens, &self.resolver())?;
        debug!(prog = %self.prog, pattern = %pattern, "classified tokens");

        let positionals = self
            .actions
            .iter()
            .enumerate()
            .filter(|(_, action)| !action.is_optional())
            .map(|(index, _)| index)
            .collect();

        ParseRun {
            parser: self,
            tokens,
            pattern,
            positionals,
            seen: HashSet::new(),
            seen_non_default: HashSet::new(),
            extras: Vec::new(),
            namespace,
        }
        .run()
    }

    /// Parse `tokens`, treating any unmatched token as an error.
    pub fn parse_args(&self, tokens: &[String]) -> Result<Namespace, ParseError> {
        let parsed = self.parse_known_args(tokens, Namespace::new())?;
        if !parsed.extras.is_empty() {
            return Err(ParseError::UnrecognizedArguments(parsed.extras));
        }
        Ok(parsed.namespace)
    }
}

/// State of one parse call.
struct ParseRun<'p> {
    parser: &'p Parser,
    tokens: &'p [String],
    pattern: TokenPattern,
    /// Positionals not yet satisfied, in declaration order.
    positionals: VecDeque<usize>,
    seen: HashSet<usize>,
    seen_non_default: HashSet<usize>,
    extras: Vec<String>,
    namespace: Namespace,
}

impl<'p> ParseRun<'p> {
    fn run(mut self) -> Result<Parsed, ParseError> {
        let tokens = self.tokens;
        let mut start = 0;

        if let Some(max_option) = self.pattern.max_option_index() {
            while start <= max_option {
                let Some(next_option) = self.pattern.next_option(start) else {
                    break;
                };

                if start != next_option {
                    let end = self.consume_positionals(start, true)?;
                    if end > start {
                        start = end;
                        continue;
                    }
                }

                if !self.pattern.is_option(start) {
                    trace!(start, next_option, "no positional matched before option");
                    self.extras.extend_from_slice(&tokens[start..next_option]);
                    start = next_option;
                }

                start = self.consume_optional(start)?;
            }
        }

        let stop = self.consume_positionals(start, false)?;
        self.extras.extend_from_slice(&tokens[stop..]);

        if !self.positionals.is_empty() {
            return Err(ParseError::TooFewArguments);
        }
        self.check_required()?;
        self.convert_unused_defaults()?;

        Ok(Parsed {
            namespace: self.namespace,
            extras: self.extras,
        })
    }

    /// Match as many queued positionals as possible starting at `start`.
    ///
    /// With `defer_empty`, trailing positionals that matched nothing wait for
    /// a later run, since an option still lies ahead.
    fn consume_positionals(&mut self, start: usize, defer_empty: bool) -> Result<usize, ParseError> {
        if self.positionals.is_empty() {
            return Ok(start);
        }
        let parser = self.parser;
        let queued: Vec<&Action> = self
            .positionals
            .iter()
            .map(|&index| &parser.actions[index])
            .collect();
        let mut counts = arity::match_partial(&queued, self.pattern.symbols_from(start));
        if defer_empty {
            while counts.last() == Some(&0) {
                counts.pop();
            }
        }
        debug!(start, ?counts, queued = queued.len(), "positional run");

        let mut index = start;
        for count in counts {
            let Some(action_index) = self.positionals.pop_front() else {
                break;
            };
            let end = index + count;
            let mut args = self.tokens[index..end].to_vec();
            let symbols = &self.pattern.symbols()[index..end];
            match parser.actions[action_index].arity_kind() {
                ArityKind::Remainder => {}
                ArityKind::ParserHandoff => {
                    if symbols.first() == Some(&Symbol::Separator) {
                        args.remove(0);
                    }
                }
                _ => {
                    if let Some(at) = symbols.iter().position(|s| *s == Symbol::Separator) {
                        args.remove(at);
                    }
                }
            }
            index = end;
            self.take_action(action_index, args)?;
        }
        Ok(index)
    }

    /// Consume the option at `start`, its arguments, and any flags clustered
    /// with it. Returns the index just past what was consumed.
    fn consume_optional(&mut self, start: usize) -> Result<usize, ParseError> {
        let parser = self.parser;
        let tokens = self.tokens;
        let Some(tuple) = self.pattern.option_at(start).cloned() else {
            self.extras.push(tokens[start].clone());
            return Ok(start + 1);
        };
        let OptionTuple {
            mut action,
            mut option_string,
            mut explicit_arg,
        } = tuple;

        let mut fired: Vec<(usize, Vec<String>)> = Vec::new();
        let stop = loop {
            let Some(index) = action else {
                debug!(token = %tokens[start], "unrecognized option");
                self.extras.push(tokens[start].clone());
                return Ok(start + 1);
            };
            let current = &parser.actions[index];

            let Some(explicit) = explicit_arg.take() else {
                let begin = start + 1;
                let count = arity::match_option(current, self.pattern.symbols_from(begin))?;
                fired.push((index, tokens[begin..begin + count].to_vec()));
                break begin + count;
            };

            let count = arity::match_option(current, &[Symbol::Arg])?;
            let clustered = option_string
                .chars()
                .nth(1)
                .is_some_and(|c| !parser.is_prefix_char(c));

            if count == 0 && clustered {
                fired.push((index, Vec::new()));
                let mut rest = explicit.chars();
                let next_flag = match (option_string.chars().next(), rest.next()) {
                    (Some(lead), Some(flag)) => format!("{}{}", lead, flag),
                    _ => {
                        return Err(ParseError::InvalidExplicitArgument {
                            argument: current.display_name(),
                            value: explicit.clone(),
                        })
                    }
                };
                let Some(next_index) = parser.lookup.get(&next_flag).copied() else {
                    return Err(ParseError::InvalidExplicitArgument {
                        argument: current.display_name(),
                        value: explicit.clone(),
                    });
                };
                let remaining: String = rest.collect();
                trace!(flag = %next_flag, "expanding clustered flag");
                action = Some(next_index);
                option_string = next_flag;
                explicit_arg = (!remaining.is_empty()).then_some(remaining);
            } else if count == 1 {
                fired.push((index, vec![explicit]));
                break start + 1;
            } else {
                return Err(ParseError::InvalidExplicitArgument {
                    argument: current.display_name(),
                    value: explicit,
                });
            }
        };

        for (index, args) in fired {
            self.take_action(index, args)?;
        }
        Ok(stop)
    }

    fn take_action(&mut self, index: usize, args: Vec<String>) -> Result<(), ParseError> {
        let parser = self.parser;
        let action = &parser.actions[index];
        self.seen.insert(index);

        let converted = convert::values(action, &args)?;
        trace!(dest = %action.dest, ?args, default = converted.is_default, "action fired");

        if !converted.is_default {
            if let Some(other) = parser
                .exclusions
                .conflicts(index)
                .find(|other| self.seen_non_default.contains(other))
            {
                return Err(ParseError::ConflictingArguments {
                    argument: action.display_name(),
                    other: parser.actions[other].display_name(),
                });
            }
            self.seen_non_default.insert(index);
        }

        match converted.value {
            Some(value) => self.apply(action, value, &args),
            None => Ok(()),
        }
    }

    fn apply(&mut self, action: &Action, value: Value, args: &[String]) -> Result<(), ParseError> {
        let dest = action.dest.clone();
        match &action.kind {
            ActionKind::Store => self.namespace.set(dest, value),
            ActionKind::StoreConst => {
                self.namespace
                    .set(dest, action.constant.clone().unwrap_or(Value::Null));
            }
            ActionKind::Append => {
                let mut items = self.existing_items(&dest);
                items.push(value);
                self.namespace.set(dest, Value::List(items));
            }
            ActionKind::AppendConst => {
                let mut items = self.existing_items(&dest);
                items.push(action.constant.clone().unwrap_or(Value::Null));
                self.namespace.set(dest, Value::List(items));
            }
            ActionKind::Count => {
                let count = match self.namespace.get(&dest) {
                    Some(Value::Int(n)) => *n,
                    _ => 0,
                };
                self.namespace.set(dest, Value::Int(count + 1));
            }
            ActionKind::Extend => {
                let mut items = self.existing_items(&dest);
                match value {
                    Value::List(values) => items.extend(values),
                    other => items.push(other),
                }
                self.namespace.set(dest, Value::List(items));
            }
            ActionKind::Subcommand(subcommands) => self.hand_off(action, subcommands, args)?,
        }
        Ok(())
    }

    /// Current list under `dest`, copied so defaults are never mutated.
    fn existing_items(&self, dest: &str) -> Vec<Value> {
        match self.namespace.get(dest) {
            Some(Value::List(items)) => items.clone(),
            Some(Value::Null) | None => Vec::new(),
            Some(other) => vec![other.clone()],
        }
    }

    fn hand_off(&mut self, action: &Action, subcommands: &Subcommands, args: &[String]) -> Result<(), ParseError> {
        let Some((name, rest)) = args.split_first() else {
            return Ok(());
        };
        self.namespace.set(action.dest.clone(), Value::Str(name.clone()));

        let Some(nested) = subcommands.get(name) else {
            return Err(ParseError::InvalidChoice {
                argument: action.display_name(),
                value: name.clone(),
                choices: subcommands.names().map(str::to_string).collect(),
            });
        };
        debug!(command = %name, tokens = rest.len(), "handing off to subcommand parser");

        let parsed = nested.parse_known_args(rest, Namespace::new())?;
        for (key, value) in parsed.namespace {
            match subcommands.merge {
                MergePolicy::Flatten => self.namespace.set(key, value),
                MergePolicy::Prefixed => self.namespace.set(format!("{}.{}", name, key), value),
            }
        }
        self.extras.extend(parsed.extras);
        Ok(())
    }

    fn check_required(&self) -> Result<(), ParseError> {
        let parser = self.parser;
        let missing: Vec<String> = parser
            .actions
            .iter()
            .enumerate()
            .filter(|(index, action)| action.required && !self.seen.contains(index))
            .map(|(_, action)| action.display_name())
            .collect();
        if !missing.is_empty() {
            return Err(ParseError::MissingRequired(missing));
        }

        for group in &parser.required_groups {
            if !group.iter().any(|index| self.seen_non_default.contains(index)) {
                return Err(ParseError::MissingOneOf(
                    group
                        .iter()
                        .map(|&index| parser.actions[index].display_name())
                        .collect(),
                ));
            }
        }
        Ok(())
    }

    /// String defaults of actions that never fired still go through the
    /// converter, as long as nothing replaced them.
    fn convert_unused_defaults(&mut self) -> Result<(), ParseError> {
        let parser = self.parser;
        for (index, action) in parser.actions.iter().enumerate() {
            if self.seen.contains(&index) {
                continue;
            }
            let DefaultValue::Value(Value::Str(raw)) = &action.default else {
                continue;
            };
            if self.namespace.get(&action.dest).and_then(Value::as_str) != Some(raw.as_str()) {
                continue;
            }
            let converted = convert::convert_default(action, raw)?;
            self.namespace.set(action.dest.clone(), converted);
        }
        Ok(())
    }
}

/// Collects actions and exclusive groups, then validates them into a [`Parser`].
#[derive(Debug, Clone)]
pub struct ParserBuilder {
    prog: String,
    prefix_chars: String,
    allow_abbrev: bool,
    actions: Vec<Action>,
    groups: Vec<(Vec<String>, bool)>,
}

impl ParserBuilder {
    pub fn new(prog: impl Into<String>) -> Self {
        Self {
            prog: prog.into(),
            prefix_chars: "-".to_string(),
            allow_abbrev: true,
            actions: Vec::new(),
            groups: Vec::new(),
        }
    }

    pub fn prefix_chars(mut self, chars: impl Into<String>) -> Self {
        self.prefix_chars = chars.into();
        self
    }

    pub fn allow_abbrev(mut self, allow: bool) -> Self {
        self.allow_abbrev = allow;
        self
    }

    pub fn argument(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    /// Declare that at most one of the actions stored under `dests` may be
    /// given; with `required`, exactly one must be.
    pub fn exclusive<I, S>(mut self, dests: I, required: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups
            .push((dests.into_iter().map(Into::into).collect(), required));
        self
    }

    pub fn build(self) -> Result<Parser, ConfigError> {
        let prefix_chars: Vec<char> = self.prefix_chars.chars().collect();
        if prefix_chars.is_empty() {
            return Err(ConfigError::EmptyPrefixChars);
        }

        let mut actions = Vec::with_capacity(self.actions.len());
        let mut option_strings = Vec::new();
        let mut lookup = HashMap::new();
        let mut dests = HashSet::new();

        for (index, mut action) in self.actions.into_iter().enumerate() {
            for name in &action.names {
                let prefixed = name.starts_with(|c: char| prefix_chars.contains(&c));
                if !prefixed || name.chars().count() < 2 {
                    return Err(ConfigError::InvalidOptionString(name.clone()));
                }
                if lookup.insert(name.clone(), index).is_some() {
                    return Err(ConfigError::DuplicateOption(name.clone()));
                }
                option_strings.push((name.clone(), index));
            }

            if action.dest.is_empty() {
                action.dest = derive_dest(&action.names, &prefix_chars);
            }
            if action.dest.is_empty() {
                return Err(ConfigError::MissingName);
            }
            if !dests.insert(action.dest.clone()) {
                return Err(ConfigError::DuplicateDest(action.dest.clone()));
            }

            validate_arity(&action)?;
            if !action.is_optional() {
                action.required = !matches!(
                    action.arity_kind(),
                    ArityKind::ZeroOrOne | ArityKind::ZeroOrMore
                );
            }

            if let ActionKind::Subcommand(subcommands) = &action.kind {
                if action.choices.is_none() {
                    action.choices = Some(subcommands.names().map(Value::from).collect());
                }
            }
            validate_choices(&action)?;

            actions.push(action);
        }

        let index_of = |dest: &str| actions.iter().position(|a: &Action| a.dest == dest);
        let mut exclusions = Exclusions::new(actions.len());
        let mut required_groups = Vec::new();
        for (dests, required) in &self.groups {
            let mut members = Vec::with_capacity(dests.len());
            for dest in dests {
                let index =
                    index_of(dest).ok_or_else(|| ConfigError::UnknownGroupMember(dest.clone()))?;
                if actions[index].required {
                    return Err(ConfigError::RequiredInExclusiveGroup(dest.clone()));
                }
                members.push(index);
            }
            exclusions.add_group(&members);
            if *required {
                required_groups.push(members);
            }
        }

        let negative_number_options = option_strings
            .iter()
            .any(|(name, _)| looks_like_negative_number(name));

        Ok(Parser {
            prog: self.prog,
            prefix_chars,
            allow_abbrev: self.allow_abbrev,
            actions,
            option_strings,
            lookup,
            exclusions,
            required_groups,
            negative_number_options,
        })
    }
}

/// Dest from the first long option (two prefix characters), else the first
/// option: prefix stripped, inner dashes turned into underscores.
fn derive_dest(names: &[String], prefix_chars: &[char]) -> String {
    let is_long = |name: &&String| {
        let mut chars = name.chars();
        matches!((chars.next(), chars.next()), (Some(a), Some(b)) if prefix_chars.contains(&a) && prefix_chars.contains(&b))
    };
    let Some(chosen) = names.iter().find(is_long).or_else(|| names.first()) else {
        return String::new();
    };
    chosen
        .trim_start_matches(|c: char| prefix_chars.contains(&c))
        .replace('-', "_")
}

fn validate_arity(action: &Action) -> Result<(), ConfigError> {
    let arity = action.arity_kind();
    let invalid = |reason: &str| ConfigError::InvalidArity {
        dest: action.dest.clone(),
        reason: format!("{} action: {}", action.kind.name(), reason),
    };

    if !action.is_optional() && arity == ArityKind::Exactly(0) {
        return Err(invalid("positional arguments must consume at least one token"));
    }
    if action.is_optional() && arity == ArityKind::ParserHandoff {
        return Err(invalid("parser handoff is only valid for positionals"));
    }
    match &action.kind {
        ActionKind::StoreConst | ActionKind::AppendConst | ActionKind::Count
            if arity != ArityKind::Exactly(0) =>
        {
            Err(invalid("constant and counting actions take no values"))
        }
        ActionKind::Store | ActionKind::Append | ActionKind::Extend
            if arity == ArityKind::Exactly(0) =>
        {
            Err(invalid("storing actions need at least one value; use a constant action for flags"))
        }
        ActionKind::Subcommand(_) if arity != ArityKind::ParserHandoff => {
            Err(invalid("subcommands always use parser handoff"))
        }
        _ => Ok(()),
    }
}

fn validate_choices(action: &Action) -> Result<(), ConfigError> {
    let Some(choices) = &action.choices else {
        return Ok(());
    };
    if choices.is_empty() {
        return Err(ConfigError::EmptyChoices(action.dest.clone()));
    }
    for (i, choice) in choices.iter().enumerate() {
        if choices[..i].iter().any(|earlier| earlier.same_value(choice)) {
            return Err(ConfigError::DuplicateChoice(
                action.dest.clone(),
                choice.to_string(),
            ));
        }
    }
    Ok(())
}
