//! Resolution of the variable set from an environment file and the
//! process environment.

use std::collections::BTreeMap;
use std::fmt::Debug;

use anyhow::{Context, Result};
use bootseed_utils::PathQuotedDisplay;
use camino::Utf8Path;
use fn_error_context::context;

use crate::error::GenerateError;
use crate::ssh_key::SshPublicKey;

/// Login name of the user created on first boot.
pub const USER_NAME: &str = "USER_NAME";
/// Hostname of the device; also drives the metadata fields.
pub const DEVICE_HOSTNAME: &str = "DEVICE_HOSTNAME";
/// Configuration repository cloned on first boot.
pub const REPO_URL: &str = "REPO_URL";
/// Token for the tunnel daemon.
pub const CLOUDFLARE_TUNNEL_TOKEN: &str = "CLOUDFLARE_TUNNEL_TOKEN";
/// The authorized public key line for the user.
pub const SSH_PUBLIC_KEY_LINE: &str = "SSH_PUBLIC_KEY_LINE";
/// Path to a public key file; when set, [`SSH_PUBLIC_KEY_LINE`] is derived from it.
pub const SSH_PUBLIC_KEY_PATH: &str = "SSH_PUBLIC_KEY_PATH";

/// The required variables, in the order they are reported.
pub const REQUIRED: [&str; 5] = [
    USER_NAME,
    DEVICE_HOSTNAME,
    REPO_URL,
    CLOUDFLARE_TUNNEL_TOKEN,
    SSH_PUBLIC_KEY_LINE,
];

/// Names taken from the process environment; anything else there is ignored.
const RECOGNIZED: [&str; 6] = [
    USER_NAME,
    DEVICE_HOSTNAME,
    REPO_URL,
    CLOUDFLARE_TUNNEL_TOKEN,
    SSH_PUBLIC_KEY_LINE,
    SSH_PUBLIC_KEY_PATH,
];

/// Raw values merged from the environment file and process overrides.
#[derive(Debug, Default, Clone)]
pub struct VariableSource {
    values: BTreeMap<String, String>,
}

impl VariableSource {
    /// Load the environment file at `path`.
    ///
    /// A missing file yields an empty source unless `required` is set.
    #[context("Loading environment file {}", PathQuotedDisplay::new(path))]
    pub fn from_env_file(path: &Utf8Path, required: bool) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => {
                tracing::debug!("No environment file at {path}");
                return Ok(Self::default());
            }
            Err(e) => return Err(e).context("Reading"),
        };
        let values = crate::env_file::parse(path, &contents)?
            .into_iter()
            .collect::<BTreeMap<_, _>>();
        tracing::debug!("Loaded {} assignments from {path}", values.len());
        Ok(Self { values })
    }

    /// Overlay process-environment values. Only recognized names that are
    /// set and non-empty take effect.
    pub fn overlay<I, K, V>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (k, v) in overrides {
            let k = k.as_ref();
            if !RECOGNIZED.contains(&k) {
                continue;
            }
            let v = v.into();
            if v.is_empty() {
                continue;
            }
            tracing::debug!("Environment overrides {k}");
            self.values.insert(k.to_owned(), v);
        }
        self
    }

    /// Look up a value; empty values are treated as unset.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .get(name)
            .map(|s| s.as_str())
            .filter(|s| !s.is_empty())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for VariableSource {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let values = iter
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self { values }
    }
}

/// The fully resolved, immutable set of values used for rendering.
#[derive(Clone, PartialEq, Eq)]
pub struct VariableSet {
    user_name: String,
    device_hostname: String,
    repo_url: String,
    cloudflare_tunnel_token: String,
    ssh_public_key_line: String,
}

impl Debug for VariableSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VariableSet")
            .field("user_name", &self.user_name)
            .field("device_hostname", &self.device_hostname)
            .field("repo_url", &self.repo_url)
            .field("cloudflare_tunnel_token", &"<redacted>")
            .field("ssh_public_key_line", &self.ssh_public_key_line)
            .finish()
    }
}

impl VariableSet {
    /// Look up a required variable by name.
    pub fn get(&self, name: &str) -> Option<&str> {
        let v = match name {
            USER_NAME => &self.user_name,
            DEVICE_HOSTNAME => &self.device_hostname,
            REPO_URL => &self.repo_url,
            CLOUDFLARE_TUNNEL_TOKEN => &self.cloudflare_tunnel_token,
            SSH_PUBLIC_KEY_LINE => &self.ssh_public_key_line,
            _ => return None,
        };
        Some(v.as_str())
    }

    /// The device hostname.
    pub fn device_hostname(&self) -> &str {
        &self.device_hostname
    }
}

/// Check that `name` is usable as a hostname: dot separated labels of
/// ASCII letters, digits and `-`.
fn validate_hostname(name: &str) -> std::result::Result<(), String> {
    if name.len() > 253 {
        return Err("longer than 253 characters".into());
    }
    for label in name.split('.') {
        if label.is_empty() || label.len() > 63 {
            return Err(format!("label {label:?} must be 1-63 characters"));
        }
        if !label.chars().all(|c| c == '-' || c.is_ascii_alphanumeric()) {
            return Err(format!(
                "label {label:?} may only contain ASCII letters, digits and '-'"
            ));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(format!("label {label:?} must not start or end with '-'"));
        }
    }
    Ok(())
}

/// Produce the variable set from `source`, taking the key line from
/// `ssh_key`.
///
/// Every empty variable is reported at once; a missing key counts as a
/// missing [`SSH_PUBLIC_KEY_LINE`].
#[context("Resolving variables")]
pub fn resolve_variables(
    source: &VariableSource,
    ssh_key: Option<&SshPublicKey>,
) -> Result<VariableSet> {
    let lookup = |name: &str| -> Option<String> {
        if name == SSH_PUBLIC_KEY_LINE {
            ssh_key.map(|k| k.as_str().to_owned())
        } else {
            source.get(name).map(ToOwned::to_owned)
        }
    };
    let missing = REQUIRED
        .iter()
        .copied()
        .filter(|name| lookup(name).is_none())
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        return Err(GenerateError::MissingVariable(missing).into());
    }
    let take = |name: &'static str| -> Result<String> {
        // Checked above
        let v = lookup(name).ok_or(GenerateError::MissingVariable(vec![name]))?;
        if v.contains(['\n', '\r']) {
            return Err(GenerateError::InvalidVariable {
                name,
                reason: "must be a single line".into(),
            }
            .into());
        }
        Ok(v)
    };
    let r = VariableSet {
        user_name: take(USER_NAME)?,
        device_hostname: take(DEVICE_HOSTNAME)?,
        repo_url: take(REPO_URL)?,
        cloudflare_tunnel_token: take(CLOUDFLARE_TUNNEL_TOKEN)?,
        ssh_public_key_line: take(SSH_PUBLIC_KEY_LINE)?,
    };
    validate_hostname(&r.device_hostname).map_err(|reason| GenerateError::InvalidVariable {
        name: DEVICE_HOSTNAME,
        reason,
    })?;
    tracing::debug!("Resolved {r:?}");
    Ok(r)
}
