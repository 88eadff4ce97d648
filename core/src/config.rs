use crate::explainer::ChangeWindow;
use serde::{Deserialize, Serialize};

// ── Email policy ───────────────────────────────────────────────────

/// Knobs for the masked-display heuristic and the common-provider escape hatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailPolicy {
    /// Substring that marks a local-part as a masked display copy (`axxx@…`).
    pub mask_marker: String,
    /// Masked copy counts when local-parts have equal length.
    #[serde(default = "default_true")]
    pub match_same_length: bool,
    /// Masked copy counts when local-parts share their first character.
    #[serde(default = "default_true")]
    pub match_same_first_char: bool,
    /// Providers that make an unverifiable destination non-alarming
    /// when the member has no profile email at all.
    pub common_providers: Vec<String>,
    /// TLD suffixes that flag a destination for investigator attention.
    #[serde(default)]
    pub suspicious_tlds: Vec<String>,
    /// Domain fragments that flag a destination for investigator attention.
    #[serde(default)]
    pub suspicious_domain_fragments: Vec<String>,
}

impl EmailPolicy {
    pub fn is_common_provider(&self, domain: &str) -> bool {
        self.common_providers.iter().any(|p| p.eq_ignore_ascii_case(domain))
    }

    pub fn is_suspicious_domain(&self, domain: &str) -> bool {
        let domain = domain.to_ascii_lowercase();
        self.suspicious_tlds
            .iter()
            .any(|tld| domain.ends_with(&tld.to_ascii_lowercase()))
            || self
                .suspicious_domain_fragments
                .iter()
                .any(|frag| domain.contains(&frag.to_ascii_lowercase()))
    }
}

// ── Phone policy ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhonePolicy {
    /// Maximum Hamming distance still reported as a data-entry slip.
    pub close_match_threshold: u32,
    /// Placeholder character used in masked display copies (`xxx-xxx-1234`).
    pub mask_char: char,
}

// ── Root config ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    pub email: EmailPolicy,
    pub phone: PhonePolicy,
    #[serde(default)]
    pub change_window: ChangeWindow,
}

fn default_true() -> bool {
    true
}

impl AuditConfig {
    /// Load from the data/ directory.
    /// In tests, use AuditConfig::default_test().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let path = format!("{data_dir}/policy/classifier_policy.json");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: AuditConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        if config.email.mask_marker.is_empty() {
            anyhow::bail!("{path}: email.mask_marker must not be empty");
        }
        Ok(config)
    }

    /// Config with hardcoded defaults for use in unit tests.
    pub fn default_test() -> Self {
        Self {
            email: EmailPolicy {
                mask_marker: "x".into(),
                match_same_length: true,
                match_same_first_char: true,
                common_providers: [
                    "gmail.com",
                    "yahoo.com",
                    "hotmail.com",
                    "icloud.com",
                    "outlook.com",
                    "aol.com",
                    "me.com",
                    "att.net",
                    "cox.net",
                    "sbcglobal.net",
                    "msn.com",
                    "live.com",
                    "mail.com",
                ]
                .iter()
                .map(|s| s.to_string())
                .collect(),
                suspicious_tlds: [
                    ".xyz", ".top", ".ru", ".online", ".click", ".link", ".win", ".bid",
                ]
                .iter()
                .map(|s| s.to_string())
                .collect(),
                suspicious_domain_fragments: [
                    "yandex", "mailclone", "ibande", "zenmail", "protonmail",
                ]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            },
            phone: PhonePolicy {
                close_match_threshold: 2,
                mask_char: 'x',
            },
            change_window: ChangeWindow::Unwindowed,
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self::default_test()
    }
}
