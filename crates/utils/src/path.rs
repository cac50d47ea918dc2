use std::fmt::Display;

use anyhow::{anyhow, Result};
use camino::{Utf8Path, Utf8PathBuf};

/// Helper to format a path so it can be pasted back into a shell.
#[derive(Debug)]
pub struct PathQuotedDisplay<'a> {
    path: &'a Utf8Path,
}

impl<'a> Display for PathQuotedDisplay<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = self.path.as_str();
        if s.chars()
            .all(|c| matches!(c, '/' | '.' | '-' | '_' | '~') || c.is_alphanumeric())
        {
            return f.write_str(s);
        }
        match shlex::try_quote(s) {
            Ok(quoted) => f.write_str(&quoted),
            // Only happens for embedded NUL bytes
            Err(_) => write!(f, "{s:?}"),
        }
    }
}

impl<'a> PathQuotedDisplay<'a> {
    /// Given a path, quote it in a way that it would be parsed by a default
    /// POSIX shell. If the path has no spaces or shell meta-characters,
    /// it will be exactly the same as the input.
    pub fn new<P: AsRef<Utf8Path> + ?Sized>(path: &'a P) -> PathQuotedDisplay<'a> {
        PathQuotedDisplay {
            path: path.as_ref(),
        }
    }
}

/// Expand a leading `~` in `path` to the provided home directory.
///
/// Only the bare `~` and `~/...` forms are handled; `~user` is returned
/// unchanged.
pub fn expand_home(path: &str, home: Option<&Utf8Path>) -> Result<Utf8PathBuf> {
    let rest = match path.strip_prefix('~') {
        Some("") => "",
        Some(rest) if rest.starts_with('/') => rest.trim_start_matches('/'),
        _ => return Ok(Utf8PathBuf::from(path)),
    };
    let home = home.ok_or_else(|| anyhow!("Cannot expand {path}: home directory is unknown"))?;
    if rest.is_empty() {
        Ok(home.to_owned())
    } else {
        Ok(home.join(rest))
    }
}
