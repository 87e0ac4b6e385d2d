//! JSON configuration parsing and types for argmatch.

use crate::action::{Action, ActionKind, ArityKind, MergePolicy, Subcommands};
use crate::convert::ConverterRegistry;
use crate::parser::{Parser, ParserBuilder};
use crate::value::Value;
use serde::Deserialize;
use std::collections::HashSet;
use thiserror::Error;

/// Prefix for exported shell variables when the config names none.
pub const DEFAULT_ENV_PREFIX: &str = "ARGMATCH_";

/// Program name used in messages when the config names none.
pub const DEFAULT_PROG: &str = "argmatch";

/// Errors that can occur during config parsing, validation, and schema building.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse JSON config: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("prefix_chars must contain at least one character")]
    EmptyPrefixChars,

    #[error("argument has neither a name nor flags")]
    MissingName,

    #[error("invalid option string '{0}': must start with a prefix character and be at least two characters long")]
    InvalidOptionString(String),

    #[error("duplicate option string: {0}")]
    DuplicateOption(String),

    #[error("duplicate dest: {0}")]
    DuplicateDest(String),

    #[error("invalid nargs '{0}': expected a number, '?', '*', '+' or '...'")]
    InvalidNargs(String),

    #[error("invalid arity on argument '{dest}': {reason}")]
    InvalidArity { dest: String, reason: String },

    #[error("unknown type '{type_name}' on argument '{dest}'")]
    UnknownType { dest: String, type_name: String },

    #[error("'{field}' cannot be used with action '{action}' on argument '{dest}'")]
    FieldNotAllowed {
        field: String,
        action: String,
        dest: String,
    },

    #[error("'choices' on argument '{0}' is empty: must have at least one valid value")]
    EmptyChoices(String),

    #[error("'choices' on argument '{0}' has duplicate value: {1}")]
    DuplicateChoice(String, String),

    #[error("exclusive group references unknown argument: {0}")]
    UnknownGroupMember(String),

    #[error("argument '{0}' is required and cannot be part of an exclusive group")]
    RequiredInExclusiveGroup(String),

    #[error("subcommands must define at least one command")]
    EmptySubcommands,

    #[error("duplicate subcommand name: {0}")]
    DuplicateSubcommandName(String),
}

/// What an argument does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ActionConfig {
    #[default]
    Store,
    StoreConst,
    StoreTrue,
    StoreFalse,
    Append,
    AppendConst,
    Count,
    Extend,
}

impl ActionConfig {
    fn as_str(self) -> &'static str {
        match self {
            ActionConfig::Store => "store",
            ActionConfig::StoreConst => "store_const",
            ActionConfig::StoreTrue => "store_true",
            ActionConfig::StoreFalse => "store_false",
            ActionConfig::Append => "append",
            ActionConfig::AppendConst => "append_const",
            ActionConfig::Count => "count",
            ActionConfig::Extend => "extend",
        }
    }

    /// Actions that never consume a value token.
    fn takes_no_values(self) -> bool {
        matches!(
            self,
            ActionConfig::StoreConst
                | ActionConfig::StoreTrue
                | ActionConfig::StoreFalse
                | ActionConfig::AppendConst
                | ActionConfig::Count
        )
    }
}

/// `nargs` as written in JSON: a number or one of `?`, `*`, `+`, `...`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum NargsConfig {
    Count(usize),
    Symbol(String),
}

impl NargsConfig {
    pub fn to_arity(&self) -> Result<ArityKind, ConfigError> {
        match self {
            NargsConfig::Count(n) => Ok(ArityKind::Exactly(*n)),
            NargsConfig::Symbol(symbol) => match symbol.trim() {
                "?" => Ok(ArityKind::ZeroOrOne),
                "*" => Ok(ArityKind::ZeroOrMore),
                "+" => Ok(ArityKind::OneOrMore),
                "..." => Ok(ArityKind::Remainder),
                other => other
                    .parse::<usize>()
                    .map(ArityKind::Exactly)
                    .map_err(|_| ConfigError::InvalidNargs(symbol.clone())),
            },
        }
    }
}

/// Configuration for a single argument.
#[derive(Debug, Clone, Deserialize)]
pub struct ArgConfig {
    /// Positional name, or the dest of an option when `dest` is absent
    pub name: Option<String>,
    /// Option strings (e.g. `["-v", "--verbose"]`); empty for positionals
    #[serde(default)]
    pub flags: Vec<String>,
    /// Namespace key (derived from the flags when absent)
    pub dest: Option<String>,
    #[serde(default)]
    pub action: ActionConfig,
    pub nargs: Option<NargsConfig>,
    /// Converter name (default: "string")
    #[serde(rename = "type")]
    pub value_type: Option<String>,
    pub default: Option<Value>,
    /// Leave the key out of the namespace unless the argument is given
    #[serde(default)]
    pub suppress_default: bool,
    #[serde(rename = "const")]
    pub constant: Option<Value>,
    #[serde(default)]
    pub required: bool,
    pub choices: Option<Vec<Value>>,
}

/// A group of arguments that may not be used together.
#[derive(Debug, Clone, Deserialize)]
pub struct ExclusiveConfig {
    /// Dests of the group members
    pub args: Vec<String>,
    /// Whether exactly one member must be given
    #[serde(default)]
    pub required: bool,
}

fn default_subcommand_dest() -> String {
    "command".to_string()
}

/// The subcommand positional and the commands it dispatches to.
#[derive(Debug, Clone, Deserialize)]
pub struct SubcommandsConfig {
    /// Namespace key that receives the chosen command name
    #[serde(default = "default_subcommand_dest")]
    pub dest: String,
    #[serde(default)]
    pub merge: MergePolicy,
    pub commands: Vec<SubcommandConfig>,
}

/// Configuration for one subcommand.
#[derive(Debug, Clone, Deserialize)]
pub struct SubcommandConfig {
    pub name: String,
    #[serde(default)]
    pub args: Vec<ArgConfig>,
    #[serde(default)]
    pub exclusive: Vec<ExclusiveConfig>,
    pub subcommands: Option<Box<SubcommandsConfig>>,
}

fn default_prefix_chars() -> String {
    "-".to_string()
}

fn default_allow_abbrev() -> bool {
    true
}

/// Top-level configuration for a script.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Program name used in error messages
    pub name: Option<String>,
    /// Prefix for exported shell variables (default: "ARGMATCH_")
    pub env_prefix: Option<String>,
    /// Characters that introduce an option (default: "-")
    #[serde(default = "default_prefix_chars")]
    pub prefix_chars: String,
    /// Accept unique prefixes of long options (default: true)
    #[serde(default = "default_allow_abbrev")]
    pub allow_abbrev: bool,
    #[serde(default)]
    pub args: Vec<ArgConfig>,
    #[serde(default)]
    pub exclusive: Vec<ExclusiveConfig>,
    pub subcommands: Option<SubcommandsConfig>,
}

impl Config {
    /// Parse a JSON string into a Config.
    pub fn from_json(json: &str) -> Result<Config, ConfigError> {
        let config: Config = serde_json::from_str(json)?;
        Ok(config)
    }

    /// Validate the shape of the configuration.
    ///
    /// Rules that depend on the assembled schema (duplicate options, dests,
    /// group membership) are checked when the parser is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.prefix_chars.is_empty() {
            return Err(ConfigError::EmptyPrefixChars);
        }
        for arg in &self.args {
            arg.validate()?;
        }
        if let Some(subcommands) = &self.subcommands {
            subcommands.validate()?;
        }
        Ok(())
    }

    /// Validate and build an immutable [`Parser`].
    pub fn build(&self, registry: &ConverterRegistry) -> Result<Parser, ConfigError> {
        self.validate()?;
        let layout = Layout {
            prefix_chars: &self.prefix_chars,
            allow_abbrev: self.allow_abbrev,
            registry,
        };
        layout.build(
            self.effective_name(),
            &self.args,
            &self.exclusive,
            self.subcommands.as_ref(),
        )
    }

    /// Get the effective program name, using the default if none is set.
    pub fn effective_name(&self) -> &str {
        self.name.as_deref().unwrap_or(DEFAULT_PROG)
    }

    /// Get the effective env prefix, using the default if none is set.
    pub fn effective_env_prefix(&self) -> &str {
        self.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX)
    }
}

impl SubcommandsConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.commands.is_empty() {
            return Err(ConfigError::EmptySubcommands);
        }
        let mut names = HashSet::new();
        for command in &self.commands {
            if !names.insert(command.name.as_str()) {
                return Err(ConfigError::DuplicateSubcommandName(command.name.clone()));
            }
            for arg in &command.args {
                arg.validate()?;
            }
            if let Some(nested) = &command.subcommands {
                nested.validate()?;
            }
        }
        Ok(())
    }
}

impl ArgConfig {
    /// A name for messages: dest, name, or first flag.
    pub fn label(&self) -> &str {
        self.dest
            .as_deref()
            .or(self.name.as_deref())
            .or(self.flags.first().map(String::as_str))
            .unwrap_or("")
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_none() && self.flags.is_empty() {
            return Err(ConfigError::MissingName);
        }
        if let Some(nargs) = &self.nargs {
            nargs.to_arity()?;
        }

        if self.action.takes_no_values() {
            for (field, present) in [
                ("nargs", self.nargs.is_some()),
                ("type", self.value_type.is_some()),
                ("choices", self.choices.is_some()),
            ] {
                if present {
                    return Err(self.not_allowed(field));
                }
            }
        }
        if matches!(
            self.action,
            ActionConfig::StoreTrue | ActionConfig::StoreFalse | ActionConfig::Count
        ) && self.constant.is_some()
        {
            return Err(self.not_allowed("const"));
        }
        if !self.action.takes_no_values()
            && self.constant.is_some()
            && self.nargs != Some(NargsConfig::Symbol("?".to_string()))
        {
            return Err(self.not_allowed("const"));
        }

        Ok(())
    }

    fn not_allowed(&self, field: &str) -> ConfigError {
        ConfigError::FieldNotAllowed {
            field: field.to_string(),
            action: self.action.as_str().to_string(),
            dest: self.label().to_string(),
        }
    }

    /// Translate into an [`Action`], resolving `type` against `registry`.
    pub fn to_action(&self, registry: &ConverterRegistry) -> Result<Action, ConfigError> {
        let mut action = if self.flags.is_empty() {
            Action::positional(self.name.clone().unwrap_or_default())
        } else {
            Action::option(self.flags.iter().cloned())
        };
        if let Some(dest) = self.dest.as_ref().or(self.name.as_ref()) {
            action = action.dest(dest.clone());
        }

        let (kind, constant, default) = match self.action {
            ActionConfig::Store => (ActionKind::Store, self.constant.clone(), self.default.clone()),
            ActionConfig::StoreConst => (
                ActionKind::StoreConst,
                self.constant.clone(),
                self.default.clone(),
            ),
            ActionConfig::StoreTrue => (
                ActionKind::StoreConst,
                Some(Value::Bool(true)),
                Some(self.default.clone().unwrap_or(Value::Bool(false))),
            ),
            ActionConfig::StoreFalse => (
                ActionKind::StoreConst,
                Some(Value::Bool(false)),
                Some(self.default.clone().unwrap_or(Value::Bool(true))),
            ),
            ActionConfig::Append => (ActionKind::Append, self.constant.clone(), self.default.clone()),
            ActionConfig::AppendConst => (
                ActionKind::AppendConst,
                self.constant.clone(),
                self.default.clone(),
            ),
            ActionConfig::Count => (ActionKind::Count, None, self.default.clone()),
            ActionConfig::Extend => (ActionKind::Extend, self.constant.clone(), self.default.clone()),
        };
        action = action.kind(kind);
        if let Some(constant) = constant {
            action = action.constant(constant);
        }
        if self.suppress_default {
            action = action.suppress_default();
        } else if let Some(default) = default {
            action = action.default(default);
        }

        if let Some(nargs) = &self.nargs {
            action = action.arity(nargs.to_arity()?);
        }

        let type_name = self.value_type.as_deref().unwrap_or("string");
        let converter = registry
            .get(type_name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownType {
                dest: self.label().to_string(),
                type_name: type_name.to_string(),
            })?;
        action = action.converter(converter).required(self.required);

        if let Some(choices) = &self.choices {
            action = action.choices(choices.iter().cloned());
        }
        Ok(action)
    }
}

/// Settings shared by a parser and every nested subcommand parser.
struct Layout<'a> {
    prefix_chars: &'a str,
    allow_abbrev: bool,
    registry: &'a ConverterRegistry,
}

impl Layout<'_> {
    fn build(
        &self,
        prog: &str,
        args: &[ArgConfig],
        exclusive: &[ExclusiveConfig],
        subcommands: Option<&SubcommandsConfig>,
    ) -> Result<Parser, ConfigError> {
        let mut builder = ParserBuilder::new(prog)
            .prefix_chars(self.prefix_chars)
            .allow_abbrev(self.allow_abbrev);

        for arg in args {
            builder = builder.argument(arg.to_action(self.registry)?);
        }
        for group in exclusive {
            builder = builder.exclusive(group.args.iter().cloned(), group.required);
        }

        if let Some(subcommands) = subcommands {
            let mut commands = Subcommands::new().merge(subcommands.merge);
            for command in &subcommands.commands {
                let nested = self.build(
                    &format!("{} {}", prog, command.name),
                    &command.args,
                    &command.exclusive,
                    command.subcommands.as_deref(),
                )?;
                commands = commands.command(command.name.clone(), nested);
            }
            builder = builder.argument(
                Action::positional(subcommands.dest.clone())
                    .kind(ActionKind::Subcommand(commands)),
            );
        }

        builder.build()
    }
}
