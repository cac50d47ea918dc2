//! Copying the template tree into the destination with placeholders
//! substituted.
//!
//! Rendering happens in two steps: [`RenderPlan::build`] reads and
//! substitutes every template in memory, and [`RenderPlan::write_to`]
//! writes the results. Nothing in the destination is touched until the
//! whole template tree has been read successfully.

use anyhow::{anyhow, Context, Result};
use bootseed_utils::PathQuotedDisplay;
use camino::{Utf8Path, Utf8PathBuf};
use cap_std_ext::cap_std::{self, fs::Dir, fs::Permissions};
use cap_std_ext::dirext::CapStdExtDirExt;
use fn_error_context::context;

use crate::error::GenerateError;
use crate::template::render_bytes;
use crate::variables::VariableSet;

/// Open the destination directory, which must already exist.
#[context("Opening destination")]
pub fn open_dest(dest: &Utf8Path) -> Result<Dir> {
    if !dest.is_dir() {
        return Err(GenerateError::DestMissing(dest.to_owned()).into());
    }
    Dir::open_ambient_dir(dest, cap_std::ambient_authority())
        .with_context(|| format!("Opening {}", PathQuotedDisplay::new(dest)))
}

/// One file of the rendered tree.
#[derive(Debug)]
pub struct RenderedFile {
    /// Path relative to the template and destination roots.
    pub path: Utf8PathBuf,
    /// Unrecognized `{{NAME}}` tokens left in this file.
    pub unresolved: Vec<String>,
    contents: Vec<u8>,
    permissions: Permissions,
}

impl RenderedFile {
    /// The rendered bytes.
    pub fn contents(&self) -> &[u8] {
        &self.contents
    }
}

/// The complete rendered template tree, ordered by path.
#[derive(Debug)]
pub struct RenderPlan {
    files: Vec<RenderedFile>,
}

fn copy_failed(path: Utf8PathBuf) -> impl FnOnce(std::io::Error) -> GenerateError {
    move |source| GenerateError::CopyFailed { path, source }
}

/// `root` joined with `rel`, without a trailing separator for the root itself.
fn source_path(root: &Utf8Path, rel: &Utf8Path) -> Utf8PathBuf {
    if rel.as_str().is_empty() {
        root.to_owned()
    } else {
        root.join(rel)
    }
}

/// Walk `prefix` (relative to the template root `dir`) in path order.
fn collect(
    root: &Utf8Path,
    dir: &Dir,
    prefix: &Utf8Path,
    vars: &VariableSet,
    out: &mut Vec<RenderedFile>,
) -> Result<()> {
    let here = source_path(root, prefix);
    let entries = if prefix.as_str().is_empty() {
        dir.entries()
    } else {
        dir.read_dir(prefix)
    };
    let mut names = Vec::new();
    for entry in entries.map_err(copy_failed(here.clone()))? {
        let entry = entry.map_err(copy_failed(here.clone()))?;
        let name = entry
            .file_name()
            .into_string()
            .map_err(|n| anyhow!("Non UTF-8 filename {n:?} in {here}"))?;
        names.push(name);
    }
    names.sort();

    for name in names {
        let rel = prefix.join(&name);
        let src = source_path(root, &rel);
        let lmeta = dir.symlink_metadata(&rel).map_err(copy_failed(src.clone()))?;
        let is_symlink = lmeta.file_type().is_symlink();
        // Linked files are copied as regular files
        let meta = if is_symlink {
            dir.metadata(&rel).map_err(copy_failed(src.clone()))?
        } else {
            lmeta
        };
        if meta.is_dir() {
            if is_symlink {
                // May point back at an ancestor
                tracing::warn!("Skipping symbolic link to directory {src}");
            } else {
                collect(root, dir, &rel, vars, out)?;
            }
            continue;
        }
        if !meta.is_file() {
            tracing::warn!("Skipping special file {src}");
            continue;
        }
        let bytes = dir.read(&rel).map_err(copy_failed(src))?;
        let rendered = render_bytes(&bytes, vars);
        for token in rendered.unresolved.iter() {
            tracing::warn!("Unrecognized placeholder {{{{{token}}}}} left in {rel}");
        }
        tracing::trace!("Rendered {rel}");
        out.push(RenderedFile {
            path: rel,
            unresolved: rendered.unresolved,
            contents: rendered.contents,
            permissions: meta.permissions(),
        });
    }
    Ok(())
}

impl RenderPlan {
    /// Read every file under `template_dir` and substitute placeholders.
    ///
    /// Symbolic links to files are followed as long as they stay inside
    /// `template_dir`; symbolic links to directories are skipped with a
    /// warning.
    #[context("Rendering templates from {}", PathQuotedDisplay::new(template_dir))]
    pub fn build(template_dir: &Utf8Path, vars: &VariableSet) -> Result<Self> {
        let dir = Dir::open_ambient_dir(template_dir, cap_std::ambient_authority())
            .map_err(copy_failed(template_dir.to_owned()))?;
        let mut files = Vec::new();
        collect(template_dir, &dir, Utf8Path::new(""), vars, &mut files)?;
        tracing::debug!("Rendered {} files", files.len());
        Ok(Self { files })
    }

    /// The rendered files, ordered by path.
    pub fn files(&self) -> &[RenderedFile] {
        &self.files
    }

    /// Look up a rendered file by its relative path.
    pub fn get(&self, path: &Utf8Path) -> Option<&RenderedFile> {
        self.files.iter().find(|f| f.path.as_path() == path)
    }

    /// Replace the contents of the file at `path` with the result of `f`
    /// before anything is written. Returns `false` if there is no such file.
    pub fn rewrite_file<F>(&mut self, path: &Utf8Path, f: F) -> Result<bool>
    where
        F: FnOnce(&[u8]) -> Result<Vec<u8>>,
    {
        let Some(file) = self.files.iter_mut().find(|f| f.path.as_path() == path) else {
            return Ok(false);
        };
        file.contents = f(&file.contents)?;
        Ok(true)
    }

    /// Write every file into `dest`, creating parent directories. Each
    /// file is replaced atomically and gets the template's permissions.
    #[context("Writing rendered files")]
    pub fn write_to(&self, dest: &Dir) -> Result<()> {
        for f in self.files.iter() {
            if let Some(parent) = f.path.parent().filter(|p| !p.as_str().is_empty()) {
                dest.create_dir_all(parent)
                    .map_err(copy_failed(parent.to_owned()))?;
            }
            dest.atomic_write_with_perms(&f.path, &f.contents, f.permissions.clone())
                .map_err(copy_failed(f.path.clone()))?;
            tracing::trace!("Wrote {}", f.path);
        }
        Ok(())
    }
}
