//! Display configuration for the chat client's agent-activity rendering.
//!
//! The client reads `agentwire.toml` into [`DisplayConfig`] and hands the derived
//! [`SanitizePolicy`] and [`PlainTextOptions`] to `agentwire-core`.

use agentwire_core::sanitize::{PlainTextOptions, SanitizePolicy};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Canonical config file name.
pub const CONFIG_FILE_NAME: &str = "agentwire.toml";

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("invalid agentwire.toml: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level display configuration (persisted as `agentwire.toml`).
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DisplayConfig {
    #[serde(default)]
    pub links: LinkSettings,
    #[serde(default)]
    pub text: TextSettings,
}

impl DisplayConfig {
    /// Parse TOML and apply [`apply_compat_fallbacks`].
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let mut config: DisplayConfig = toml::from_str(raw)?;
        apply_compat_fallbacks(&mut config);
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkSettings {
    /// Emit real, clickable links for allowed schemes.
    #[serde(default = "default_false")]
    pub hyperlinks_enabled: bool,
    #[serde(default = "default_allowed_schemes")]
    pub allowed_schemes: Vec<String>,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            hyperlinks_enabled: false,
            allowed_schemes: default_allowed_schemes(),
        }
    }
}

impl LinkSettings {
    pub fn sanitize_policy(&self) -> SanitizePolicy {
        SanitizePolicy {
            hyperlinks_enabled: self.hyperlinks_enabled,
            allowed_schemes: self
                .allowed_schemes
                .iter()
                .filter_map(|scheme| normalize_scheme(scheme))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextSettings {
    #[serde(default = "default_true")]
    pub preserve_newlines: bool,
    #[serde(default = "default_true")]
    pub preserve_tabs: bool,
}

impl Default for TextSettings {
    fn default() -> Self {
        Self {
            preserve_newlines: true,
            preserve_tabs: true,
        }
    }
}

impl TextSettings {
    pub fn plain_text_options(&self) -> PlainTextOptions {
        PlainTextOptions {
            preserve_newlines: self.preserve_newlines,
            preserve_tabs: self.preserve_tabs,
        }
    }
}

// ── Serde default functions ─────────────────────────────────────────────

fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_allowed_schemes() -> Vec<String> {
    agentwire_core::sanitize::default_allowed_schemes()
        .into_iter()
        .collect()
}

/// Lowercase, trim and strip a trailing `:`. `None` for an empty or malformed name.
fn normalize_scheme(raw: &str) -> Option<String> {
    let scheme = raw.trim().trim_end_matches(':').to_ascii_lowercase();
    let mut chars = scheme.chars();
    let first = chars.next()?;
    let valid = first.is_ascii_alphabetic()
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then_some(scheme)
}

/// Apply compatibility fallbacks after loading raw TOML.
/// Returns true when any field was updated.
pub fn apply_compat_fallbacks(config: &mut DisplayConfig) -> bool {
    let mut seen = HashSet::new();
    let normalized: Vec<String> = config
        .links
        .allowed_schemes
        .iter()
        .filter_map(|scheme| normalize_scheme(scheme))
        .filter(|scheme| seen.insert(scheme.clone()))
        .collect();

    if normalized == config.links.allowed_schemes {
        return false;
    }
    config.links.allowed_schemes = normalized;
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_disable_hyperlinks() {
        let cfg = DisplayConfig::default();
        let policy = cfg.links.sanitize_policy();
        assert_eq!(policy, SanitizePolicy::default());
        assert!(!policy.allows("https"));
        assert_eq!(cfg.text.plain_text_options(), PlainTextOptions::default());
    }

    #[test]
    fn empty_file_uses_defaults() {
        let cfg = DisplayConfig::from_toml_str("").expect("parse empty config");
        assert_eq!(cfg, DisplayConfig::default());
    }

    #[test]
    fn links_section_deserializes() {
        let cfg = DisplayConfig::from_toml_str(
            r#"
[links]
hyperlinks_enabled = true
allowed_schemes = ["https"]

[text]
preserve_tabs = false
"#,
        )
        .expect("parse links config");

        let policy = cfg.links.sanitize_policy();
        assert!(policy.allows("https"));
        assert!(!policy.allows("http"));
        assert!(cfg.text.preserve_newlines);
        assert!(!cfg.text.plain_text_options().preserve_tabs);
    }

    #[test]
    fn apply_compat_fallbacks_normalizes_schemes() {
        let mut cfg = DisplayConfig::default();
        cfg.links.allowed_schemes = vec![
            " HTTPS: ".to_string(),
            "https".to_string(),
            String::new(),
            "1bad".to_string(),
            "Mailto".to_string(),
        ];

        let changed = apply_compat_fallbacks(&mut cfg);
        assert!(changed);
        assert_eq!(cfg.links.allowed_schemes, vec!["https", "mailto"]);
    }

    #[test]
    fn apply_compat_fallbacks_is_noop_for_clean_values() {
        let mut cfg = DisplayConfig::default();
        let before = cfg.clone();
        assert!(!apply_compat_fallbacks(&mut cfg));
        assert_eq!(cfg, before);
    }

    #[test]
    fn empty_allowlist_is_kept() {
        let cfg = DisplayConfig::from_toml_str(
            r#"
[links]
hyperlinks_enabled = true
allowed_schemes = []
"#,
        )
        .expect("parse config");
        assert!(cfg.links.allowed_schemes.is_empty());
        assert!(!cfg.links.sanitize_policy().allows("https"));
    }

    #[test]
    fn invalid_toml_is_reported() {
        let err = DisplayConfig::from_toml_str("[links]\nhyperlinks_enabled = \"yes\"")
            .expect_err("string is not a bool");
        assert!(err.to_string().contains(CONFIG_FILE_NAME));
    }

    #[test]
    fn settings_serialize_round_trip() {
        let cfg = DisplayConfig::default();
        let encoded = toml::to_string(&cfg).expect("serialize config");
        assert!(encoded.contains("[links]"));
        assert!(encoded.contains("hyperlinks_enabled = false"));
        let decoded = DisplayConfig::from_toml_str(&encoded).expect("parse encoded config");
        assert_eq!(decoded, cfg);
    }
}
