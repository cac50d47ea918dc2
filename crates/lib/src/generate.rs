//! The generation pipeline: validate every input, then populate the
//! destination.

use anyhow::Result;
use bootseed_utils::PathQuotedDisplay;
use camino::Utf8PathBuf;
use fn_error_context::context;

use crate::metadata::update_planned_metadata;
use crate::render::{open_dest, RenderPlan};
use crate::ssh_key::{resolve_ssh_key, KeySource};
use crate::variables::{resolve_variables, VariableSource};

/// Inputs of one generation run.
#[derive(Debug, Clone)]
pub struct GenerateOpts {
    /// Directory to populate; must exist.
    pub dest: Utf8PathBuf,
    /// Directory holding the templates.
    pub templates: Utf8PathBuf,
    /// Environment file to read variables from.
    pub env_file: Utf8PathBuf,
    /// Fail if `env_file` does not exist.
    pub env_file_required: bool,
    /// The metadata document, relative to `templates` and `dest`.
    pub metadata_file: Utf8PathBuf,
    /// Home directory used to expand `~` in the key path.
    pub home: Option<Utf8PathBuf>,
    /// Validate and render without writing anything.
    pub dry_run: bool,
}

/// What a run did (or would have done).
#[derive(Debug)]
pub struct GenerateReport {
    /// The destination directory.
    pub dest: Utf8PathBuf,
    /// Files written, relative to `dest`.
    pub files: Vec<Utf8PathBuf>,
    /// Unrecognized tokens left in place, per file.
    pub unresolved: Vec<(Utf8PathBuf, String)>,
    /// The hostname written to the metadata document.
    pub hostname: String,
    /// Algorithm of the authorized key.
    pub key_algorithm: String,
    /// Nothing was written.
    pub dry_run: bool,
}

/// Run the whole pipeline. `env` is the process environment, whose
/// recognized variables override the environment file.
///
/// Every check happens before the first write: destination, environment
/// file, SSH key, variables, templates and the metadata document. The
/// metadata fields are rewritten in memory, so every destination file is
/// written once.
#[context("Generating boot configuration into {}", PathQuotedDisplay::new(&opts.dest))]
pub fn generate<I, K, V>(opts: &GenerateOpts, env: I) -> Result<GenerateReport>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<String>,
{
    let dest = open_dest(&opts.dest)?;
    let source = VariableSource::from_env_file(&opts.env_file, opts.env_file_required)?.overlay(env);
    let key = KeySource::from_variables(&source)
        .map(|s| resolve_ssh_key(&s, opts.home.as_deref()))
        .transpose()?;
    let vars = resolve_variables(&source, key.as_ref())?;

    let mut plan = RenderPlan::build(&opts.templates, &vars)?;
    // Each destination file is written exactly once, metadata included
    update_planned_metadata(&mut plan, &opts.metadata_file, vars.device_hostname())?;

    if opts.dry_run {
        tracing::debug!("Dry run, not writing");
    } else {
        plan.write_to(&dest)?;
        tracing::debug!("Populated {}", opts.dest);
    }

    let files = plan.files().iter().map(|f| f.path.clone()).collect();
    let unresolved = plan
        .files()
        .iter()
        .flat_map(|f| f.unresolved.iter().map(|t| (f.path.clone(), t.clone())))
        .collect();
    Ok(GenerateReport {
        dest: opts.dest.clone(),
        files,
        unresolved,
        hostname: vars.device_hostname().to_owned(),
        key_algorithm: key.map(|k| k.algorithm().to_owned()).unwrap_or_default(),
        dry_run: opts.dry_run,
    })
}
