//! Rewriting of the instance metadata document (`meta-data`).

use anyhow::{Context, Result};
use bootseed_utils::PathQuotedDisplay;
use camino::Utf8Path;
use cap_std_ext::cap_std::fs::Dir;
use cap_std_ext::dirext::CapStdExtDirExt;
use fn_error_context::context;

use crate::error::GenerateError;
use crate::render::RenderPlan;

/// Default name of the metadata document in the destination.
pub const DEFAULT_METADATA_FILE: &str = "meta-data";
const LOCAL_HOSTNAME: &str = "local-hostname:";
const INSTANCE_ID: &str = "instance-id:";

/// The instance id derived from a hostname.
pub fn instance_id(hostname: &str) -> String {
    format!("{hostname}-001")
}

/// Replace the `local-hostname:` and `instance-id:` lines of `input`.
///
/// All other lines, their order and line endings are preserved. A field
/// that does not occur is appended.
pub fn rewrite_metadata(input: &str, hostname: &str) -> String {
    let hostname_line = format!("{LOCAL_HOSTNAME} {hostname}");
    let instance_line = format!("{INSTANCE_ID} {}", instance_id(hostname));
    let mut seen_hostname = false;
    let mut seen_instance = false;
    let mut out = String::with_capacity(input.len() + 64);
    for segment in input.split_inclusive('\n') {
        let body = segment.trim_end_matches(['\r', '\n']);
        let ending = &segment[body.len()..];
        if body.starts_with(LOCAL_HOSTNAME) {
            seen_hostname = true;
            out.push_str(&hostname_line);
        } else if body.starts_with(INSTANCE_ID) {
            seen_instance = true;
            out.push_str(&instance_line);
        } else {
            out.push_str(body);
        }
        out.push_str(ending);
    }
    for (seen, line) in [(seen_instance, &instance_line), (seen_hostname, &hostname_line)] {
        if seen {
            continue;
        }
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}

fn rewrite_metadata_bytes(path: &Utf8Path, contents: &[u8], hostname: &str) -> Result<Vec<u8>> {
    let orig = std::str::from_utf8(contents)
        .with_context(|| format!("{} is not valid UTF-8", PathQuotedDisplay::new(path)))?;
    Ok(rewrite_metadata(orig, hostname).into_bytes())
}

/// Rewrite the metadata fields of the rendered file at `path` before the
/// plan is written.
#[context("Updating metadata fields in {}", PathQuotedDisplay::new(path))]
pub fn update_planned_metadata(
    plan: &mut RenderPlan,
    path: &Utf8Path,
    hostname: &str,
) -> Result<()> {
    let found = plan.rewrite_file(path, |c| rewrite_metadata_bytes(path, c, hostname))?;
    if !found {
        return Err(GenerateError::FileNotFound(path.to_owned()).into());
    }
    tracing::debug!("Set hostname {hostname} in {path}");
    Ok(())
}

/// Rewrite the metadata fields of `path` (relative to `dir`) in place.
#[context("Updating metadata fields in {}", PathQuotedDisplay::new(path))]
pub fn update_metadata_fields(dir: &Dir, path: &Utf8Path, hostname: &str) -> Result<()> {
    let Some(meta) = dir.metadata_optional(path)? else {
        return Err(GenerateError::FileNotFound(path.to_owned()).into());
    };
    let orig = dir.read(path).context("Reading")?;
    let updated = rewrite_metadata_bytes(path, &orig, hostname)?;
    if updated == orig {
        tracing::trace!("{path} already up to date");
        return Ok(());
    }
    dir.atomic_write_with_perms(path, updated, meta.permissions())
        .context("Writing")?;
    tracing::debug!("Set hostname {hostname} in {path}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use cap_std_ext::cap_std;
    use indoc::indoc;

    use super::*;
    use crate::ssh_key::SshPublicKey;
    use crate::variables::*;

    #[test]
    fn test_rewrite() {
        let input = indoc! { "
            # NoCloud metadata
            instance-id: old-000
            dsmode: local
            local-hostname: old
            public-keys: []
        " };
        let expected = indoc! { "
            # NoCloud metadata
            instance-id: pi1-001
            dsmode: local
            local-hostname: pi1
            public-keys: []
        " };
        similar_asserts::assert_eq!(rewrite_metadata(input, "pi1"), expected);
        // Idempotent
        similar_asserts::assert_eq!(rewrite_metadata(expected, "pi1"), expected);
    }

    #[test]
    fn test_rewrite_preserves_endings() {
        let input = "local-hostname: a\r\ninstance-id: a-001";
        assert_eq!(
            rewrite_metadata(input, "b"),
            "local-hostname: b\r\ninstance-id: b-001"
        );
    }

    #[test]
    fn test_rewrite_only_line_starts() {
        // Indented keys belong to some other mapping
        let input = "network:\n  local-hostname: x\n";
        assert_eq!(
            rewrite_metadata(input, "pi1"),
            "network:\n  local-hostname: x\ninstance-id: pi1-001\nlocal-hostname: pi1\n"
        );
    }

    #[test]
    fn test_rewrite_appends_missing() {
        assert_eq!(
            rewrite_metadata("", "pi1"),
            "instance-id: pi1-001\nlocal-hostname: pi1\n"
        );
        assert_eq!(
            rewrite_metadata("instance-id: x", "pi1"),
            "instance-id: pi1-001\nlocal-hostname: pi1\n"
        );
    }

    #[test]
    fn test_update_file() -> Result<()> {
        let td = cap_std_ext::cap_tempfile::tempdir(cap_std::ambient_authority())?;
        let p = Utf8Path::new("meta-data");
        let e = update_metadata_fields(&td, p, "pi1").unwrap_err();
        assert!(matches!(
            e.downcast_ref::<GenerateError>(),
            Some(GenerateError::FileNotFound(_))
        ));

        td.write(p, "instance-id: iid-local01\nlocal-hostname: cloudimg\n")?;
        update_metadata_fields(&td, p, "garage")?;
        assert_eq!(
            td.read_to_string(p)?,
            "instance-id: garage-001\nlocal-hostname: garage\n"
        );
        Ok(())
    }

    #[test]
    fn test_update_plan() -> Result<()> {
        let td = tempfile::tempdir()?;
        let root = Utf8Path::from_path(td.path()).unwrap();
        std::fs::write(
            root.join("meta-data"),
            "instance-id: iid-local01\nlocal-hostname: {{DEVICE_HOSTNAME}}\n",
        )?;
        std::fs::write(root.join("user-data"), b"\xff")?;
        let source: VariableSource = [
            (USER_NAME, "pi"),
            (DEVICE_HOSTNAME, "garage"),
            (REPO_URL, "https://example.com/infra.git"),
            (CLOUDFLARE_TUNNEL_TOKEN, "tok"),
        ]
        .into_iter()
        .collect();
        let key = SshPublicKey::parse("ssh-ed25519 AAAA pi@laptop", "test")?;
        let vars = resolve_variables(&source, Some(&key))?;
        let mut plan = RenderPlan::build(root, &vars)?;

        let p = Utf8Path::new("meta-data");
        update_planned_metadata(&mut plan, p, "garage")?;
        assert_eq!(
            plan.get(p).unwrap().contents(),
            b"instance-id: garage-001\nlocal-hostname: garage\n"
        );

        let absent = Utf8Path::new("absent");
        let e = update_planned_metadata(&mut plan, absent, "garage").unwrap_err();
        assert!(matches!(
            e.downcast_ref::<GenerateError>(),
            Some(GenerateError::FileNotFound(_))
        ));
        // Not text
        let binary = Utf8Path::new("user-data");
        assert!(update_planned_metadata(&mut plan, binary, "garage").is_err());
        Ok(())
    }
}
