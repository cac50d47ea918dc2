//! Parsing of `KEY=VALUE` environment files.
//!
//! The format is the subset of POSIX shell that such files are usually
//! written in: comments, an optional `export` prefix, and shell quoting of
//! the value. Nothing is expanded; `$HOME` stays a literal string. A value
//! must be a single shell word, so spaces have to be quoted.

use anyhow::Result;
use camino::Utf8Path;

use crate::error::GenerateError;

/// Returns true if `key` is a valid shell variable name.
fn is_valid_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

/// Parse one line; `Ok(None)` for blank lines and comments.
fn parse_line(line: &str) -> std::result::Result<Option<(String, String)>, String> {
    let line = line.trim_start();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let line = match line.strip_prefix("export") {
        Some(rest) if rest.starts_with(char::is_whitespace) => rest.trim_start(),
        _ => line,
    };
    let Some((key, value)) = line.split_once('=') else {
        return Err("expected KEY=VALUE".into());
    };
    let key = key.trim_end();
    if !is_valid_key(key) {
        return Err(format!("invalid variable name {key:?}"));
    }
    let mut words = shlex::split(value)
        .ok_or_else(|| format!("unbalanced quoting in value of {key}"))?
        .into_iter();
    let value = words.next().unwrap_or_default();
    // A shell would run the remaining words as a command
    if words.next().is_some() {
        return Err(format!("value of {key} contains unquoted whitespace"));
    }
    Ok(Some((key.to_owned(), value)))
}

/// Parse the contents of an environment file, returning assignments in
/// file order. `path` is only used for error reporting.
pub(crate) fn parse(path: &Utf8Path, contents: &str) -> Result<Vec<(String, String)>> {
    let mut r = Vec::new();
    for (idx, line) in contents.lines().enumerate() {
        match parse_line(line) {
            Ok(Some(kv)) => r.push(kv),
            Ok(None) => {}
            Err(reason) => {
                return Err(GenerateError::EnvFile {
                    path: path.to_owned(),
                    line: idx + 1,
                    reason,
                }
                .into())
            }
        }
    }
    Ok(r)
}
