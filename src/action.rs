//! Declared arguments: what each one matches and what it does when it fires.

use crate::convert::Converter;
use crate::parser::Parser;
use crate::value::Value;
use serde::Deserialize;

/// How many tokens an argument consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArityKind {
    /// A fixed number of tokens. `Exactly(0)` is a bare flag.
    Exactly(usize),
    /// `?`
    ZeroOrOne,
    /// `*`
    ZeroOrMore,
    /// `+`
    OneOrMore,
    /// Every remaining token, option-shaped or not.
    Remainder,
    /// One command token, then everything after it for a nested parser.
    ParserHandoff,
}

impl Default for ArityKind {
    fn default() -> Self {
        ArityKind::Exactly(1)
    }
}

/// What happens to the result namespace when an action fires.
#[derive(Debug, Clone, Default)]
pub enum ActionKind {
    /// Store the converted value.
    #[default]
    Store,
    /// Store the action's constant.
    StoreConst,
    /// Append the converted value to a list.
    Append,
    /// Append the action's constant to a list.
    AppendConst,
    /// Increment an integer each time the flag appears.
    Count,
    /// Extend a list with every converted value.
    Extend,
    /// Select a nested parser and hand it the remaining tokens.
    Subcommand(Subcommands),
}

impl ActionKind {
    /// Arity used when the schema does not give one.
    pub fn default_arity(&self) -> ArityKind {
        match self {
            ActionKind::Store | ActionKind::Append | ActionKind::Extend => ArityKind::Exactly(1),
            ActionKind::StoreConst | ActionKind::AppendConst | ActionKind::Count => {
                ArityKind::Exactly(0)
            }
            ActionKind::Subcommand(_) => ArityKind::ParserHandoff,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::Store => "store",
            ActionKind::StoreConst => "store_const",
            ActionKind::Append => "append",
            ActionKind::AppendConst => "append_const",
            ActionKind::Count => "count",
            ActionKind::Extend => "extend",
            ActionKind::Subcommand(_) => "subcommand",
        }
    }
}

/// How a nested parser's namespace is folded into the outer one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergePolicy {
    /// Nested keys are copied as-is, overwriting outer keys.
    #[default]
    Flatten,
    /// Nested keys are stored as `<command>.<key>`.
    Prefixed,
}

/// The nested parsers a subcommand action can dispatch to.
#[derive(Debug, Clone, Default)]
pub struct Subcommands {
    pub(crate) parsers: Vec<(String, Parser)>,
    pub(crate) merge: MergePolicy,
}

impl Subcommands {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn command(mut self, name: impl Into<String>, parser: Parser) -> Self {
        self.parsers.push((name.into(), parser));
        self
    }

    pub fn merge(mut self, merge: MergePolicy) -> Self {
        self.merge = merge;
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.parsers.iter().map(|(name, _)| name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&Parser> {
        self.parsers
            .iter()
            .find(|(candidate, _)| candidate == name)
            .map(|(_, parser)| parser)
    }
}

/// An argument's default.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    Value(Value),
    /// Leave the dest absent from the namespace entirely.
    Suppressed,
}

impl Default for DefaultValue {
    fn default() -> Self {
        DefaultValue::Value(Value::Null)
    }
}

/// One declared argument, positional or optional.
#[derive(Debug, Clone)]
pub struct Action {
    pub(crate) names: Vec<String>,
    pub(crate) dest: String,
    pub(crate) kind: ActionKind,
    pub(crate) arity: Option<ArityKind>,
    pub(crate) converter: Converter,
    pub(crate) default: DefaultValue,
    pub(crate) required: bool,
    pub(crate) choices: Option<Vec<Value>>,
    pub(crate) constant: Option<Value>,
}

impl Action {
    /// A positional argument stored under `dest`.
    pub fn positional(dest: impl Into<String>) -> Self {
        Self {
            names: Vec::new(),
            dest: dest.into(),
            kind: ActionKind::Store,
            arity: None,
            converter: Converter::string(),
            default: DefaultValue::default(),
            required: true,
            choices: None,
            constant: None,
        }
    }

    /// An optional argument with the given option strings.
    ///
    /// The dest is derived from the first long option (or the first option)
    /// when the parser is built, unless [`Action::dest`] sets it.
    pub fn option<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            dest: String::new(),
            kind: ActionKind::Store,
            arity: None,
            converter: Converter::string(),
            default: DefaultValue::default(),
            required: false,
            choices: None,
            constant: None,
        }
    }

    /// A boolean flag: `true` when present, `false` otherwise.
    pub fn flag<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::option(names)
            .kind(ActionKind::StoreConst)
            .constant(Value::Bool(true))
            .default(Value::Bool(false))
    }

    pub fn dest(mut self, dest: impl Into<String>) -> Self {
        self.dest = dest.into();
        self
    }

    pub fn kind(mut self, kind: ActionKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn arity(mut self, arity: ArityKind) -> Self {
        self.arity = Some(arity);
        self
    }

    pub fn converter(mut self, converter: Converter) -> Self {
        self.converter = converter;
        self
    }

    pub fn default(mut self, default: Value) -> Self {
        self.default = DefaultValue::Value(default);
        self
    }

    pub fn suppress_default(mut self) -> Self {
        self.default = DefaultValue::Suppressed;
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn choices<I, V>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.choices = Some(choices.into_iter().map(Into::into).collect());
        self
    }

    pub fn constant(mut self, constant: Value) -> Self {
        self.constant = Some(constant);
        self
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn dest_name(&self) -> &str {
        &self.dest
    }

    pub fn is_optional(&self) -> bool {
        !self.names.is_empty()
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    /// The effective arity, falling back to the kind's default.
    pub fn arity_kind(&self) -> ArityKind {
        self.arity.unwrap_or_else(|| self.kind.default_arity())
    }

    pub fn default_value(&self) -> &DefaultValue {
        &self.default
    }

    /// Name used in error messages: `-v/--verbose` or the positional dest.
    pub fn display_name(&self) -> String {
        if self.names.is_empty() {
            self.dest.clone()
        } else {
            self.names.join("/")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_arity_follows_kind() {
        assert_eq!(Action::option(["--out"]).arity_kind(), ArityKind::Exactly(1));
        assert_eq!(Action::flag(["-v"]).arity_kind(), ArityKind::Exactly(0));
        assert_eq!(
            Action::option(["-c"]).kind(ActionKind::Count).arity_kind(),
            ArityKind::Exactly(0)
        );
        assert_eq!(
            Action::positional("cmd")
                .kind(ActionKind::Subcommand(Subcommands::new()))
                .arity_kind(),
            ArityKind::ParserHandoff
        );
    }

    #[test]
    fn test_explicit_arity_overrides_kind() {
        let action = Action::option(["--files"]).arity(ArityKind::OneOrMore);
        assert_eq!(action.arity_kind(), ArityKind::OneOrMore);
        assert_eq!(ArityKind::default(), ArityKind::Exactly(1));
    }

    #[test]
    fn test_display_name() {
        assert_eq!(Action::flag(["-v", "--verbose"]).display_name(), "-v/--verbose");
        assert_eq!(Action::positional("input").display_name(), "input");
    }

    #[test]
    fn test_flag_defaults() {
        let flag = Action::flag(["-q"]);
        assert_eq!(flag.default_value(), &DefaultValue::Value(Value::Bool(false)));
        assert_eq!(flag.constant, Some(Value::Bool(true)));
        assert!(!flag.is_required());
        assert!(flag.is_optional());
    }
}
