//! Shipped classifier policy loads and agrees with the test defaults.

use otp_audit_core::{config::AuditConfig, explainer::ChangeWindow};

const DATA_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../data");

#[test]
fn shipped_policy_matches_test_defaults() {
    let loaded = AuditConfig::load(DATA_DIR).expect("load shipped policy");
    let defaults = AuditConfig::default_test();

    assert_eq!(loaded.email.mask_marker, defaults.email.mask_marker);
    assert_eq!(loaded.email.common_providers, defaults.email.common_providers);
    assert_eq!(loaded.email.suspicious_tlds, defaults.email.suspicious_tlds);
    assert_eq!(
        loaded.email.suspicious_domain_fragments,
        defaults.email.suspicious_domain_fragments
    );
    assert_eq!(loaded.phone.close_match_threshold, 2);
    assert_eq!(loaded.phone.mask_char, 'x');
    assert_eq!(loaded.change_window, ChangeWindow::Unwindowed);
}

#[test]
fn missing_policy_file_names_the_path() {
    let err = AuditConfig::load("/nonexistent-audit-data").unwrap_err();
    assert!(err.to_string().contains("Cannot read /nonexistent-audit-data/policy/classifier_policy.json"));
}

#[test]
fn omitted_fields_take_defaults() {
    let json = r#"{
        "email": { "mask_marker": "*", "common_providers": ["gmail.com"] },
        "phone": { "close_match_threshold": 1, "mask_char": "X" }
    }"#;
    let cfg: AuditConfig = serde_json::from_str(json).expect("parse");
    assert!(cfg.email.match_same_length);
    assert!(cfg.email.match_same_first_char);
    assert!(cfg.email.suspicious_tlds.is_empty());
    assert_eq!(cfg.change_window, ChangeWindow::Unwindowed);
    assert!(cfg.email.is_common_provider("GMail.com"));
}

#[test]
fn suspicious_domain_checks_tld_and_fragment() {
    let cfg = AuditConfig::default_test();
    assert!(cfg.email.is_suspicious_domain("ibande.com"));
    assert!(cfg.email.is_suspicious_domain("Mail.TOP"));
    assert!(!cfg.email.is_suspicious_domain("gmail.com"));
}
