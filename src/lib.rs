//! argmatch - grammar-driven command-line argument matching.
//!
//! Tokens are classified into an `A`/`O`/`-` pattern, each argument's arity
//! becomes a small grammar over that pattern, and a consumption loop assigns
//! tokens to declared actions. Schemas are built in Rust with
//! [`ParserBuilder`] or loaded from JSON with [`Config`]; results can be
//! rendered as sourceable shell scripts or JSON.

pub mod action;
pub mod arity;
pub mod classify;
pub mod config;
pub mod convert;
pub mod output;
pub mod parser;
pub mod resolve;
pub mod value;

pub use action::{Action, ActionKind, ArityKind, DefaultValue, MergePolicy, Subcommands};
pub use config::{ArgConfig, Config, ConfigError};
pub use convert::{Converter, ConverterRegistry};
pub use output::{generate_error_output, generate_json, generate_output, generate_output_string};
pub use parser::{ParseError, Parsed, Parser, ParserBuilder};
pub use value::{Namespace, Value};
