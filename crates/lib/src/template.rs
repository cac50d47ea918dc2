//! Literal `{{NAME}}` placeholder substitution.
//!
//! This is not a template engine: there are no conditionals, loops or
//! escapes, and substituted values are never expanded again. Substitution
//! works on bytes, so templates need not be valid UTF-8.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::bytes::{Captures, Regex};

use crate::variables::{
    VariableSet, CLOUDFLARE_TUNNEL_TOKEN, DEVICE_HOSTNAME, REPO_URL, SSH_PUBLIC_KEY_LINE, USER_NAME,
};

/// Placeholder names recognized in templates, with the variable each one
/// is populated from.
pub const PLACEHOLDERS: &[(&str, &str)] = &[
    (USER_NAME, USER_NAME),
    (DEVICE_HOSTNAME, DEVICE_HOSTNAME),
    (REPO_URL, REPO_URL),
    (CLOUDFLARE_TUNNEL_TOKEN, CLOUDFLARE_TUNNEL_TOKEN),
    (SSH_PUBLIC_KEY_LINE, SSH_PUBLIC_KEY_LINE),
    // Downstream templates use the shorter name for the tunnel token.
    ("CLOUDFLARE_TOKEN", CLOUDFLARE_TUNNEL_TOKEN),
];

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{([A-Za-z0-9_]+)\}\}").expect("placeholder regex"))
}

/// The value for placeholder `name`, if it is a recognized placeholder.
pub fn placeholder_value<'v>(name: &str, vars: &'v VariableSet) -> Option<&'v str> {
    PLACEHOLDERS
        .iter()
        .find(|(placeholder, _)| *placeholder == name)
        .and_then(|(_, var)| vars.get(var))
}

/// The result of rendering one template.
#[derive(Debug, PartialEq, Eq)]
pub struct Rendered {
    /// The substituted contents.
    pub contents: Vec<u8>,
    /// Names of `{{NAME}}` tokens that are not recognized placeholders and
    /// were left in place, sorted and deduplicated.
    pub unresolved: Vec<String>,
}

/// Replace every recognized `{{NAME}}` token in `input`. Bytes outside
/// the tokens are copied unchanged.
pub fn render_bytes(input: &[u8], vars: &VariableSet) -> Rendered {
    let mut unresolved = BTreeSet::new();
    let contents = placeholder_regex()
        .replace_all(input, |caps: &Captures| {
            // The pattern only matches ASCII
            let name = String::from_utf8_lossy(&caps[1]);
            match placeholder_value(&name, vars) {
                Some(v) => v.as_bytes().to_vec(),
                None => {
                    unresolved.insert(name.into_owned());
                    caps[0].to_vec()
                }
            }
        })
        .into_owned();
    Rendered {
        contents,
        unresolved: unresolved.into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::ssh_key::SshPublicKey;
    use crate::variables::{resolve_variables, VariableSource};

    fn vars() -> VariableSet {
        let source: VariableSource = [
            (USER_NAME, "pi"),
            (DEVICE_HOSTNAME, "pi1"),
            (REPO_URL, "https://example.com/{{USER_NAME}}.git"),
            (CLOUDFLARE_TUNNEL_TOKEN, "eyJhIjoi"),
        ]
        .into_iter()
        .collect();
        let key = SshPublicKey::parse("ssh-ed25519 AAAAC3Nz pi@laptop", "test").unwrap();
        resolve_variables(&source, Some(&key)).unwrap()
    }

    #[test]
    fn test_render() {
        let input = indoc! { r#"
            #cloud-config
            hostname: {{DEVICE_HOSTNAME}}
            users:
              - name: {{USER_NAME}}
                ssh_authorized_keys:
                  - {{SSH_PUBLIC_KEY_LINE}}
            runcmd:
              - [ cloudflared, service, install, "{{CLOUDFLARE_TOKEN}}" ]
              - echo {{CLOUDFLARE_TUNNEL_TOKEN}}
        "# };
        let expected = indoc! { r#"
            #cloud-config
            hostname: pi1
            users:
              - name: pi
                ssh_authorized_keys:
                  - ssh-ed25519 AAAAC3Nz pi@laptop
            runcmd:
              - [ cloudflared, service, install, "eyJhIjoi" ]
              - echo eyJhIjoi
        "# };
        let r = render_bytes(input.as_bytes(), &vars());
        similar_asserts::assert_eq!(String::from_utf8(r.contents).unwrap(), expected);
        assert!(r.unresolved.is_empty());
    }

    #[test]
    fn test_values_are_not_reexpanded() {
        let r = render_bytes(b"url: {{REPO_URL}}", &vars());
        assert_eq!(r.contents, b"url: https://example.com/{{USER_NAME}}.git");
        assert!(r.unresolved.is_empty());
    }

    #[test]
    fn test_unknown_tokens_are_kept() {
        let input = "{{ USER_NAME }} {{OTHER}} {{USER_NAME}} {{OTHER}} {{A_B}} {USER_NAME}";
        let r = render_bytes(input.as_bytes(), &vars());
        assert_eq!(
            r.contents,
            b"{{ USER_NAME }} {{OTHER}} pi {{OTHER}} {{A_B}} {USER_NAME}"
        );
        assert_eq!(r.unresolved, vec!["A_B", "OTHER"]);
    }

    #[test]
    fn test_non_utf8_input() {
        let r = render_bytes(b"# caf\xe9\nname: {{USER_NAME}} {{\xe9}} {{NOPE}}\n", &vars());
        assert_eq!(r.contents, b"# caf\xe9\nname: pi {{\xe9}} {{NOPE}}\n");
        assert_eq!(r.unresolved, vec!["NOPE"]);
    }

    #[test]
    fn test_placeholder_value() {
        let v = vars();
        assert_eq!(placeholder_value("CLOUDFLARE_TOKEN", &v), Some("eyJhIjoi"));
        assert_eq!(placeholder_value("SSH_PUBLIC_KEY_PATH", &v), None);
    }
}
