use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// A recipe field that may be resolved to a literal value. Untagged so the
/// wire form matches the embedded schema's `payload_field` definition: a
/// bare string, or `{"content": ...}` / `{"url": ...}` / `{"path": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PayloadField {
    Inline(String),
    Content { content: String },
    Url { url: String },
    Path { path: String },
}

impl PayloadField {
    /// Returns the field's literal value, or an error if the field uses a
    /// representation this core does not resolve.
    pub fn resolve(&self) -> Result<&str, DomainError> {
        match self {
            PayloadField::Inline(v) => Ok(v.as_str()),
            PayloadField::Content { content } => Ok(content.as_str()),
            PayloadField::Url { .. } | PayloadField::Path { .. } => {
                Err(DomainError::ReservedPayloadField)
            }
        }
    }
}

/// A provisioning recipe: the validated, schema-checked instruction set a
/// job carries from admission through to the dispatcher on the target host.
///
/// Field names match the embedded JSON Schema's wire form directly via
/// `rename` — `target`/`disk` are the Rust-idiomatic names for the wire
/// `task_target`/`target_disk`. `user_data`/`unattend_xml`/`ks_cfg` become
/// output files on the target (dispatcher §4.7 step 7); `env` becomes
/// `recipe.env` lines (step 6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    #[serde(rename = "task_target")]
    pub target: String,
    #[serde(rename = "target_disk")]
    pub disk: String,
    #[serde(default)]
    pub schema_version: Option<String>,
    #[serde(default)]
    pub oci_url: Option<String>,
    #[serde(default)]
    pub firmware_url: Option<String>,
    #[serde(default)]
    pub wim_index: Option<u32>,
    #[serde(default)]
    pub partition_layout: Option<serde_json::Value>,
    #[serde(default)]
    pub user_data: Option<PayloadField>,
    #[serde(default)]
    pub unattend_xml: Option<PayloadField>,
    #[serde(default, rename = "ks.cfg")]
    pub ks_cfg: Option<PayloadField>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl Recipe {
    /// Builds a recipe with no optional fields, for tests and simple jobs.
    pub fn minimal(target: impl Into<String>, disk: impl Into<String>) -> Self {
        Recipe {
            target: target.into(),
            disk: disk.into(),
            schema_version: None,
            oci_url: None,
            firmware_url: None,
            wim_index: None,
            partition_layout: None,
            user_data: None,
            unattend_xml: None,
            ks_cfg: None,
            env: BTreeMap::new(),
        }
    }

    /// Validates that every present payload field uses a representation
    /// this core can resolve. Schema-level validation (required keys,
    /// types) happens separately against the embedded JSON Schema before a
    /// `Recipe` is ever constructed from request JSON.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.target.trim().is_empty() {
            return Err(DomainError::InvalidJobId("recipe.target is empty".into()));
        }
        for field in [&self.user_data, &self.unattend_xml, &self.ks_cfg].into_iter().flatten() {
            field.resolve()?;
        }
        Ok(())
    }

    /// The named file payloads present on this recipe, as `(filename,
    /// field)` pairs, for whoever writes them out on the task ISO or the
    /// target filesystem (`user-data`, `unattend.xml`, `ks.cfg`).
    pub fn payload_files(&self) -> Vec<(&'static str, &PayloadField)> {
        let mut files = Vec::new();
        if let Some(f) = &self.user_data {
            files.push(("user-data", f));
        }
        if let Some(f) = &self.unattend_xml {
            files.push(("unattend.xml", f));
        }
        if let Some(f) = &self.ks_cfg {
            files.push(("ks.cfg", f));
        }
        files
    }

    /// Renders `env` as sorted `KEY=value` lines suitable for a
    /// `recipe.env` file: keys uppercased, values with embedded CR/LF
    /// replaced by a space. Keys are already sorted by virtue of
    /// `BTreeMap`.
    pub fn to_env_lines(&self) -> Vec<String> {
        self.env
            .iter()
            .map(|(key, value)| format!("{}={}", sanitize_env_key(key), sanitize_env_value(value)))
            .collect()
    }
}

/// Uppercases and replaces any byte outside `[A-Za-z0-9_]` with `_`.
fn sanitize_env_key(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c.to_ascii_uppercase() } else { '_' })
        .collect()
}

/// Replaces embedded CR/LF with a space so a value can't inject extra lines
/// into `recipe.env`.
fn sanitize_env_value(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_and_content_resolve() {
        assert_eq!(PayloadField::Inline("x".into()).resolve().unwrap(), "x");
        assert_eq!(PayloadField::Content { content: "y".into() }.resolve().unwrap(), "y");
    }

    #[test]
    fn url_and_path_are_rejected() {
        assert!(PayloadField::Url { url: "http://x".into() }.resolve().is_err());
        assert!(PayloadField::Path { path: "/tmp/x".into() }.resolve().is_err());
    }

    #[test]
    fn payload_field_deserializes_from_bare_string_or_content_object() {
        let inline: PayloadField = serde_json::from_str("\"hello\"").unwrap();
        assert!(matches!(inline, PayloadField::Inline(ref s) if s == "hello"));
        let content: PayloadField = serde_json::from_str(r#"{"content":"hi"}"#).unwrap();
        assert!(matches!(content, PayloadField::Content { ref content } if content == "hi"));
    }

    #[test]
    fn env_lines_are_sorted_and_sanitized() {
        let mut recipe = Recipe::minimal("install.target", "/dev/sda");
        recipe.env.insert("hostname".into(), "node-1".into());
        recipe.env.insert("ssh-key".into(), "ssh-rsa AAAA".into());
        let lines = recipe.to_env_lines();
        assert_eq!(lines, vec!["HOSTNAME=node-1", "SSH_KEY=ssh-rsa AAAA"]);
    }

    #[test]
    fn env_value_cr_lf_is_sanitized() {
        let mut recipe = Recipe::minimal("install.target", "/dev/sda");
        recipe.env.insert("note".into(), "line1\r\nline2".into());
        let lines = recipe.to_env_lines();
        assert_eq!(lines, vec!["NOTE=line1  line2"]);
    }

    #[test]
    fn recipe_round_trips_wire_field_names() {
        let json = serde_json::json!({
            "task_target": "install-linux.target",
            "target_disk": "/dev/sda",
            "oci_url": "ctrl:8080/img:latest",
            "env": { "http_proxy": "http://p:3128" },
        });
        let recipe: Recipe = serde_json::from_value(json).unwrap();
        assert_eq!(recipe.target, "install-linux.target");
        assert_eq!(recipe.disk, "/dev/sda");
        assert_eq!(recipe.oci_url.as_deref(), Some("ctrl:8080/img:latest"));
        assert_eq!(recipe.env.get("http_proxy").map(String::as_str), Some("http://p:3128"));
    }
}
