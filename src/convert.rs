//! Value conversion and validation for matched tokens.
//!
//! Converters are looked up by name once, when a schema is built, from a
//! [`ConverterRegistry`] owned by the caller. During a parse the converter
//! attached to each action is called directly.

use crate::action::{Action, ArityKind, DefaultValue};
use crate::parser::ParseError;
use crate::value::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Signature of a conversion function. The error string is a short reason.
pub type ConvertFn = dyn Fn(&str) -> Result<Value, String> + Send + Sync;

/// A named conversion from a raw token to a [`Value`].
#[derive(Clone)]
pub struct Converter {
    name: String,
    func: Arc<ConvertFn>,
}

impl Converter {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&str) -> Result<Value, String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    /// Identity conversion.
    pub fn string() -> Self {
        Self::new("string", |raw| Ok(Value::Str(raw.to_string())))
    }

    /// Signed 64-bit integer.
    pub fn int() -> Self {
        Self::new("int", |raw| {
            raw.trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|e| e.to_string())
        })
    }

    /// 64-bit float.
    pub fn float() -> Self {
        Self::new("float", |raw| {
            raw.trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|e| e.to_string())
        })
    }

    /// Strict `true`/`false`.
    pub fn bool() -> Self {
        Self::new("bool", |raw| match raw {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err("expected 'true' or 'false'".to_string()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn convert(&self, raw: &str) -> Result<Value, String> {
        (self.func)(raw)
    }
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Converter").field("name", &self.name).finish()
    }
}

/// Converters available to a schema, keyed by the name used in `type`.
#[derive(Debug, Clone)]
pub struct ConverterRegistry {
    converters: HashMap<String, Converter>,
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry
            .register(Converter::string())
            .register(Converter::int())
            .register(Converter::float())
            .register(Converter::bool());
        registry.alias("str", "string");
        registry
    }
}

impl ConverterRegistry {
    /// A registry with no converters at all.
    pub fn empty() -> Self {
        Self {
            converters: HashMap::new(),
        }
    }

    /// Add or replace a converter under its own name.
    pub fn register(&mut self, converter: Converter) -> &mut Self {
        self.converters
            .insert(converter.name().to_string(), converter);
        self
    }

    /// Make `alias` resolve to the converter currently registered as `target`.
    pub fn alias(&mut self, alias: &str, target: &str) -> &mut Self {
        if let Some(converter) = self.converters.get(target).cloned() {
            self.converters.insert(alias.to_string(), converter);
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&Converter> {
        self.converters.get(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.converters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Outcome of shaping an action's matched tokens.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Converted {
    /// `None` when the action's default is suppressed.
    pub value: Option<Value>,
    /// The value came from the action's default rather than the input.
    pub is_default: bool,
}

/// Convert and validate the raw tokens matched for `action`.
pub(crate) fn values(action: &Action, raw: &[String]) -> Result<Converted, ParseError> {
    match (raw, action.arity_kind()) {
        ([], ArityKind::ZeroOrOne) => {
            if action.is_optional() {
                let constant = action.constant.clone().unwrap_or(Value::Null);
                return Ok(Converted {
                    value: Some(convert_if_str(action, constant)?),
                    is_default: false,
                });
            }
            match &action.default {
                DefaultValue::Suppressed => Ok(Converted {
                    value: None,
                    is_default: true,
                }),
                DefaultValue::Value(default) => Ok(Converted {
                    value: Some(convert_if_str(action, default.clone())?),
                    is_default: true,
                }),
            }
        }
        ([], ArityKind::ZeroOrMore) => {
            let value = match &action.default {
                DefaultValue::Suppressed => {
                    return Ok(Converted {
                        value: None,
                        is_default: true,
                    })
                }
                DefaultValue::Value(default) if default.is_null() => Value::List(Vec::new()),
                DefaultValue::Value(default) => default.clone(),
            };
            match &value {
                Value::List(items) => {
                    for item in items {
                        check_choice(action, item, &item.to_string())?;
                    }
                }
                other => check_choice(action, other, &other.to_string())?,
            }
            Ok(Converted {
                value: Some(value),
                is_default: true,
            })
        }
        ([single], ArityKind::Exactly(1) | ArityKind::ZeroOrOne) => {
            let value = convert(action, single)?;
            check_choice(action, &value, single)?;
            Ok(Converted {
                value: Some(value),
                is_default: false,
            })
        }
        (_, ArityKind::Remainder | ArityKind::ParserHandoff) => {
            let values = raw
                .iter()
                .map(|token| convert(action, token))
                .collect::<Result<Vec<_>, _>>()?;
            if let (Some(first), Some(token)) = (values.first(), raw.first()) {
                check_choice(action, first, token)?;
            }
            Ok(Converted {
                value: Some(Value::List(values)),
                is_default: false,
            })
        }
        _ => {
            let mut values = Vec::with_capacity(raw.len());
            for token in raw {
                let value = convert(action, token)?;
                check_choice(action, &value, token)?;
                values.push(value);
            }
            Ok(Converted {
                value: Some(Value::List(values)),
                is_default: false,
            })
        }
    }
}

/// Run a string default or constant through the action's converter.
///
/// Non-string values were typed by the schema and are used unchanged.
pub(crate) fn convert_if_str(action: &Action, value: Value) -> Result<Value, ParseError> {
    match value {
        Value::Str(raw) => {
            let converted = convert(action, &raw)?;
            check_choice(action, &converted, &raw)?;
            Ok(converted)
        }
        other => Ok(other),
    }
}

/// Convert a string default that was never replaced. Defaults are not
/// checked against `choices`.
pub(crate) fn convert_default(action: &Action, raw: &str) -> Result<Value, ParseError> {
    convert(action, raw)
}

fn convert(action: &Action, raw: &str) -> Result<Value, ParseError> {
    action
        .converter
        .convert(raw)
        .map_err(|reason| ParseError::TypeConversion {
            argument: action.display_name(),
            type_name: action.converter.name().to_string(),
            value: raw.to_string(),
            reason,
        })
}

fn check_choice(action: &Action, value: &Value, raw: &str) -> Result<(), ParseError> {
    match &action.choices {
        Some(choices) if !choices.iter().any(|choice| choice.same_value(value)) => Err(ParseError::InvalidChoice {
            argument: action.display_name(),
            value: raw.to_string(),
            choices: choices.iter().map(Value::to_string).collect(),
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(s: &[&str]) -> Vec<String> {
        s.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_builtin_converters() {
        let registry = ConverterRegistry::default();
        assert_eq!(registry.get("int").unwrap().convert("42"), Ok(Value::Int(42)));
        assert_eq!(registry.get("float").unwrap().convert("0.5"), Ok(Value::Float(0.5)));
        assert_eq!(registry.get("bool").unwrap().convert("true"), Ok(Value::Bool(true)));
        assert!(registry.get("bool").unwrap().convert("yes").is_err());
        assert_eq!(
            registry.get("str").unwrap().convert("x"),
            Ok(Value::Str("x".to_string()))
        );
        assert!(registry.get("date").is_none());
        assert_eq!(registry.names(), vec!["bool", "float", "int", "str", "string"]);
    }

    #[test]
    fn test_custom_converter() {
        let mut registry = ConverterRegistry::empty();
        registry.register(Converter::new("upper", |raw| Ok(Value::Str(raw.to_uppercase()))));
        let upper = registry.get("upper").unwrap();
        assert_eq!(upper.name(), "upper");
        assert_eq!(upper.convert("abc"), Ok(Value::Str("ABC".to_string())));
    }

    #[test]
    fn test_single_token_converted_and_checked() {
        let action = Action::option(["--n"]).dest("n").converter(Converter::int());
        let converted = values(&action, &tokens(&["7"])).unwrap();
        assert_eq!(converted.value, Some(Value::Int(7)));
        assert!(!converted.is_default);

        let err = values(&action, &tokens(&["seven"])).unwrap_err();
        assert!(matches!(
            err,
            ParseError::TypeConversion { ref type_name, ref value, .. }
                if type_name == "int" && value == "seven"
        ));
    }

    #[test]
    fn test_zero_or_one_option_uses_constant() {
        let action = Action::option(["--color"])
            .dest("color")
            .arity(ArityKind::ZeroOrOne)
            .constant(Value::from("auto"))
            .default(Value::from("never"));
        let converted = values(&action, &[]).unwrap();
        assert_eq!(converted.value, Some(Value::from("auto")));
        assert!(!converted.is_default);
    }

    #[test]
    fn test_zero_or_one_positional_uses_converted_default() {
        let action = Action::positional("port")
            .arity(ArityKind::ZeroOrOne)
            .converter(Converter::int())
            .default(Value::from("8080"));
        let converted = values(&action, &[]).unwrap();
        assert_eq!(converted.value, Some(Value::Int(8080)));
        assert!(converted.is_default);
    }

    #[test]
    fn test_zero_or_more_without_default_is_empty_list() {
        let action = Action::positional("files").arity(ArityKind::ZeroOrMore);
        let converted = values(&action, &[]).unwrap();
        assert_eq!(converted.value, Some(Value::List(Vec::new())));
        assert!(converted.is_default);
    }

    #[test]
    fn test_zero_or_more_default_is_choice_checked() {
        let action = Action::positional("modes")
            .arity(ArityKind::ZeroOrMore)
            .choices(["a", "b"])
            .default(Value::from(vec!["a", "c"]));
        let err = values(&action, &[]).unwrap_err();
        assert!(matches!(err, ParseError::InvalidChoice { ref value, .. } if value == "c"));
    }

    #[test]
    fn test_suppressed_default_yields_no_value() {
        let action = Action::positional("maybe")
            .arity(ArityKind::ZeroOrOne)
            .suppress_default();
        let converted = values(&action, &[]).unwrap();
        assert_eq!(converted.value, None);
    }

    #[test]
    fn test_remainder_checks_only_first() {
        let action = Action::positional("cmd")
            .arity(ArityKind::Remainder)
            .choices(["run", "stop"]);
        let converted = values(&action, &tokens(&["run", "--fast", "x"])).unwrap();
        assert_eq!(
            converted.value,
            Some(Value::from(vec!["run", "--fast", "x"]))
        );

        let err = values(&action, &tokens(&["jump", "run"])).unwrap_err();
        assert!(matches!(err, ParseError::InvalidChoice { ref value, .. } if value == "jump"));
    }

    #[test]
    fn test_numeric_choices_match_across_int_and_float() {
        let action = Action::option(["--ratio"])
            .dest("ratio")
            .converter(Converter::float())
            .choices([Value::Int(1), Value::Int(2)]);
        let converted = values(&action, &tokens(&["1"])).unwrap();
        assert_eq!(converted.value, Some(Value::Float(1.0)));

        let err = values(&action, &tokens(&["1.5"])).unwrap_err();
        assert!(matches!(err, ParseError::InvalidChoice { ref value, .. } if value == "1.5"));
    }

    #[test]
    fn test_fixed_count_checks_every_token() {
        let action = Action::option(["--pair"])
            .dest("pair")
            .arity(ArityKind::Exactly(2))
            .choices(["x", "y"]);
        assert_eq!(
            values(&action, &tokens(&["x", "y"])).unwrap().value,
            Some(Value::from(vec!["x", "y"]))
        );
        let err = values(&action, &tokens(&["x", "z"])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "argument --pair: invalid choice: 'z' (choose from x, y)"
        );
    }
}
