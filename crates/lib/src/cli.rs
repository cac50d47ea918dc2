//! # Command line interface
//!
//! Parsing of the command line and reporting of results.

use std::ffi::OsString;
use std::io::Write;

use anyhow::Result;
use camino::Utf8PathBuf;
use clap::error::ErrorKind;
use clap::Parser;
use owo_colors::OwoColorize;

use crate::error::GenerateError;
use crate::generate::{generate, GenerateOpts, GenerateReport};
use crate::metadata::DEFAULT_METADATA_FILE;

/// Environment file read when `--env-file` is not given.
const DEFAULT_ENV_FILE: &str = ".env";

/// Render cloud-init templates onto a boot medium.
///
/// Variables are read from an environment file and the process
/// environment (which takes precedence): USER_NAME, DEVICE_HOSTNAME,
/// REPO_URL, CLOUDFLARE_TUNNEL_TOKEN and either SSH_PUBLIC_KEY_PATH or
/// SSH_PUBLIC_KEY_LINE.
#[derive(Debug, Parser, PartialEq, Eq)]
#[clap(name = "bootseed", version)]
pub(crate) struct Opt {
    /// Directory to populate, usually the mounted boot partition
    pub(crate) destination: Utf8PathBuf,

    /// Environment file with KEY=VALUE lines [default: .env, optional]
    #[clap(long, env = "BOOTSEED_ENV_FILE")]
    pub(crate) env_file: Option<Utf8PathBuf>,

    /// Directory holding the templates
    #[clap(long, env = "BOOTSEED_TEMPLATES", default_value = "cloud-init")]
    pub(crate) templates: Utf8PathBuf,

    /// The metadata document, relative to the template directory
    #[clap(long, default_value = DEFAULT_METADATA_FILE)]
    pub(crate) metadata_file: Utf8PathBuf,

    /// Check inputs and render in memory, but write nothing
    #[clap(long)]
    pub(crate) dry_run: bool,
}

impl Opt {
    fn into_generate_opts(self, home: Option<Utf8PathBuf>) -> GenerateOpts {
        let env_file_required = self.env_file.is_some();
        GenerateOpts {
            dest: self.destination,
            templates: self.templates,
            env_file: self
                .env_file
                .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_ENV_FILE)),
            env_file_required,
            metadata_file: self.metadata_file,
            home,
            dry_run: self.dry_run,
        }
    }
}

/// Parse `args`; help and version requests are printed and yield `None`.
fn parse_args<I, T>(args: I) -> Result<Option<Opt>>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    match Opt::try_parse_from(args) {
        Ok(opt) => Ok(Some(opt)),
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.print()?;
            Ok(None)
        }
        Err(e) => {
            let msg = e.render().to_string();
            let msg = msg.strip_prefix("error: ").unwrap_or(&msg).trim_end();
            Err(GenerateError::Usage(msg.to_owned()).into())
        }
    }
}

fn print_report(mut out: impl Write, report: &GenerateReport) -> Result<()> {
    for f in report.files.iter() {
        writeln!(out, "  {}", report.dest.join(f).bold())?;
    }
    for (f, token) in report.unresolved.iter() {
        let msg = format!("warning: {{{{{token}}}}} left unresolved in {f}");
        writeln!(out, "{}", msg.yellow())?;
    }
    let verb = if report.dry_run { "Would write" } else { "Wrote" };
    writeln!(
        out,
        "{} {} files for {} (key: {})",
        verb.green().bold(),
        report.files.len(),
        report.hostname,
        report.key_algorithm
    )?;
    Ok(())
}

/// Run with an explicit environment and home directory.
fn run_with_env<I, T, E>(
    args: I,
    env: E,
    home: Option<Utf8PathBuf>,
    out: impl Write,
) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
    E: IntoIterator<Item = (String, String)>,
{
    let Some(opt) = parse_args(args)? else {
        return Ok(());
    };
    tracing::debug!("{opt:?}");
    let opts = opt.into_generate_opts(home);
    let report = generate(&opts, env)?;
    print_report(out, &report)
}

/// Parse the provided arguments and execute, reading variables from the
/// process environment.
pub fn run_from_iter<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    // Non UTF-8 entries can't be any of our variables anyway
    let env = std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)));
    let home = std::env::var("HOME").ok().map(Utf8PathBuf::from);
    run_with_env(args, env, home, anstream::stdout().lock())
}
