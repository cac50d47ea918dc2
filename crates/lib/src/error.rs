//! Failure kinds surfaced to the operator.
//!
//! Library functions return [`anyhow::Result`]; the kinds below are the
//! root causes, recoverable with [`anyhow::Error::downcast_ref`].

use bootseed_utils::PathQuotedDisplay;
use camino::Utf8PathBuf;

/// A terminal failure of a generation run.
#[derive(thiserror::Error, Debug)]
pub enum GenerateError {
    /// The command line could not be parsed.
    #[error("{0}")]
    Usage(String),
    /// The destination directory does not exist.
    #[error("Destination directory {} does not exist", PathQuotedDisplay::new(.0))]
    DestMissing(Utf8PathBuf),
    /// A line of the environment file is malformed.
    #[error("{}:{line}: {reason}", PathQuotedDisplay::new(.path))]
    EnvFile {
        /// The environment file.
        path: Utf8PathBuf,
        /// 1-based line number.
        line: usize,
        /// What is wrong with it.
        reason: String,
    },
    /// One or more required variables are empty after resolution.
    #[error("Missing required variable(s): {}", .0.join(", "))]
    MissingVariable(Vec<&'static str>),
    /// A variable is present but unusable.
    #[error("Invalid value for {name}: {reason}")]
    InvalidVariable {
        /// The variable name.
        name: &'static str,
        /// What is wrong with it.
        reason: String,
    },
    /// None of the candidate key files exist.
    #[error("SSH public key not found (tried {})", display_paths(.0))]
    KeyNotFound(Vec<Utf8PathBuf>),
    /// The key content does not look like an OpenSSH public key.
    #[error("Invalid SSH public key from {origin}: {reason}")]
    InvalidKeyFormat {
        /// Where the key came from, a path or a variable name.
        origin: String,
        /// What is wrong with it.
        reason: String,
    },
    /// Reading a template or writing its rendered copy failed.
    #[error("Copying {}", PathQuotedDisplay::new(.path))]
    CopyFailed {
        /// The file or directory being copied.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The metadata document is absent.
    #[error("Metadata file {} not found", PathQuotedDisplay::new(.0))]
    FileNotFound(Utf8PathBuf),
}

fn display_paths(paths: &[Utf8PathBuf]) -> String {
    paths
        .iter()
        .map(|p| PathQuotedDisplay::new(p).to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
