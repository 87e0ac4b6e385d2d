//! Rendering parse results: sourceable shell scripts and JSON.

use crate::parser::Parsed;
use crate::value::Value;
use anyhow::Result;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

/// Suffix of the array that receives unmatched tokens.
const EXTRAS_NAME: &str = "EXTRAS";

/// Escape a string for safe use in a shell double-quoted context.
///
/// Escapes: $, `, \, ", and !
fn escape_shell_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '$' => escaped.push_str("\\$"),
            '`' => escaped.push_str("\\`"),
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '!' => escaped.push_str("\\!"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Convert a dest to a valid shell variable name.
///
/// Uppercases, and maps the `-` and `.` of prefixed subcommand keys to `_`.
fn to_shell_var_name(name: &str) -> String {
    name.to_uppercase().replace(['-', '.'], "_")
}

/// Text of a single value; null is empty, nested lists are space-joined.
fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Str(s) => s.clone(),
        Value::List(items) => items
            .iter()
            .map(scalar_text)
            .collect::<Vec<_>>()
            .join(" "),
        other => other.to_string(),
    }
}

fn quoted(value: &Value) -> String {
    format!("\"{}\"", escape_shell_value(&scalar_text(value)))
}

/// One line binding `var_name`. Lists become bash arrays, which cannot be
/// exported, so they are plain assignments.
fn render_assignment(var_name: &str, value: &Value) -> String {
    match value.as_list() {
        Some(items) => {
            let items: Vec<String> = items.iter().map(quoted).collect();
            format!("{}=({})\n", var_name, items.join(" "))
        }
        None => format!("export {}={}\n", var_name, quoted(value)),
    }
}

/// Generate a temporary file with shell assignments for `parsed`.
///
/// Returns the path to the temporary file. The file will persist
/// until it is manually deleted.
pub fn generate_output(parsed: &Parsed, prefix: &str) -> Result<PathBuf> {
    write_temp_file(&generate_output_string(parsed, prefix))
}

/// Generate the shell script content as a string.
///
/// Keys come out sorted; the extras array is always present.
pub fn generate_output_string(parsed: &Parsed, prefix: &str) -> String {
    let mut output = String::new();

    for (name, value) in parsed.namespace.iter() {
        let var_name = format!("{}{}", prefix, to_shell_var_name(name));
        output.push_str(&render_assignment(&var_name, value));
    }

    let extras: Vec<Value> = parsed.extras.iter().cloned().map(Value::Str).collect();
    output.push_str(&render_assignment(
        &format!("{}{}", prefix, EXTRAS_NAME),
        &Value::List(extras),
    ));

    output
}

/// Generate an error output file.
///
/// When sourced, the file will print the error message to stderr and exit 1.
pub fn generate_error_output(prog: &str, message: &str) -> Result<PathBuf> {
    write_temp_file(&generate_error_string(prog, message))
}

/// Generate an error output as a string.
pub fn generate_error_string(prog: &str, message: &str) -> String {
    format!(
        "echo \"{}: error: {}\" >&2\nexit 1\n",
        escape_shell_value(prog),
        escape_shell_value(message)
    )
}

/// Render `parsed` as pretty JSON: `{"namespace": {...}, "extras": [...]}`.
pub fn generate_json(parsed: &Parsed) -> Result<String> {
    Ok(serde_json::to_string_pretty(parsed)?)
}

/// Write content to a temporary file and return its path.
fn write_temp_file(content: &str) -> Result<PathBuf> {
    let mut file = NamedTempFile::new()?;
    file.write_all(content.as_bytes())?;
    let path = file.into_temp_path().keep()?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Namespace;

    fn make_parsed(pairs: &[(&str, Value)], extras: &[&str]) -> Parsed {
        Parsed {
            namespace: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect::<Namespace>(),
            extras: extras.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_basic_output() {
        let parsed = make_parsed(
            &[("verbose", Value::Bool(true)), ("output", Value::from("file.txt"))],
            &[],
        );
        let output = generate_output_string(&parsed, "ARGMATCH_");

        assert!(output.contains("export ARGMATCH_OUTPUT=\"file.txt\"\n"));
        assert!(output.contains("export ARGMATCH_VERBOSE=\"true\"\n"));
        assert!(output.ends_with("ARGMATCH_EXTRAS=()\n"));
    }

    #[test]
    fn test_sorted_keys() {
        let parsed = make_parsed(&[("b", Value::Int(2)), ("a", Value::Int(1))], &[]);
        let output = generate_output_string(&parsed, "P_");
        assert_eq!(output, "export P_A=\"1\"\nexport P_B=\"2\"\nP_EXTRAS=()\n");
    }

    #[test]
    fn test_null_is_empty() {
        let parsed = make_parsed(&[("file", Value::Null)], &[]);
        let output = generate_output_string(&parsed, "P_");
        assert!(output.contains("export P_FILE=\"\"\n"));
    }

    #[test]
    fn test_list_becomes_array() {
        let parsed = make_parsed(&[("files", Value::from(vec!["a b", "$c"]))], &["--bogus"]);
        let output = generate_output_string(&parsed, "P_");
        assert!(output.contains("P_FILES=(\"a b\" \"\\$c\")\n"));
        assert!(output.contains("P_EXTRAS=(\"--bogus\")\n"));
    }

    #[test]
    fn test_nested_list_items_are_joined() {
        let pairs = Value::List(vec![Value::from(vec!["1", "2"]), Value::from(vec!["3", "4"])]);
        let parsed = make_parsed(&[("point", pairs)], &[]);
        let output = generate_output_string(&parsed, "P_");
        assert!(output.contains("P_POINT=(\"1 2\" \"3 4\")\n"));
    }

    #[test]
    fn test_prefixed_subcommand_key() {
        let parsed = make_parsed(&[("run.dry-run", Value::Bool(false))], &[]);
        let output = generate_output_string(&parsed, "P_");
        assert!(output.contains("export P_RUN_DRY_RUN=\"false\""));
    }

    #[test]
    fn test_complex_escaping() {
        let parsed = make_parsed(&[("complex", Value::from("$var \"quoted\" `cmd` \\path!"))], &[]);
        let output = generate_output_string(&parsed, "TEST_");

        assert!(
            output.contains("export TEST_COMPLEX=\"\\$var \\\"quoted\\\" \\`cmd\\` \\\\path\\!\"")
        );
    }

    #[test]
    fn test_escape_newline() {
        let parsed = make_parsed(&[("msg", Value::from("line1\nline2"))], &[]);
        let output = generate_output_string(&parsed, "P_");
        assert!(output.contains("export P_MSG=\"line1\\nline2\""));
    }

    #[test]
    fn test_generate_output_creates_file() {
        let parsed = make_parsed(&[("test", Value::from("value"))], &[]);
        let path = generate_output(&parsed, "ARGMATCH_").unwrap();

        assert!(path.exists());

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("export ARGMATCH_TEST=\"value\""));

        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_generate_error_string() {
        let output = generate_error_string("deploy", "argument --level: invalid choice: 'x'");
        assert_eq!(
            output,
            "echo \"deploy: error: argument --level: invalid choice: 'x'\" >&2\nexit 1\n"
        );
    }

    #[test]
    fn test_generate_error_string_escapes_special_chars() {
        let output = generate_error_string("p", "bad \"$x\"");
        assert!(output.contains("bad \\\"\\$x\\\""));
    }

    #[test]
    fn test_generate_error_output_creates_file() {
        let path = generate_error_output("deploy", "test error").unwrap();
        assert!(path.exists());

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("deploy: error: test error"));
        assert!(contents.contains("exit 1"));

        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_generate_json() {
        let parsed = make_parsed(
            &[("count", Value::Int(2)), ("files", Value::from(vec!["a"]))],
            &["x"],
        );
        let json: serde_json::Value = serde_json::from_str(&generate_json(&parsed).unwrap()).unwrap();
        assert_eq!(json["namespace"]["count"], 2);
        assert_eq!(json["namespace"]["files"][0], "a");
        assert_eq!(json["extras"][0], "x");
    }
}
