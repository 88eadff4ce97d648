//! ContactAnomalyClassifier scenarios over in-memory snapshots.
//!
//! Covers the five reference scenarios plus the resolution, exclusion and
//! exactly-once properties of the report.

use chrono::NaiveDate;
use otp_audit_core::{
    classifier::{classify_snapshot, ContactAnomalyClassifier, Finding, Label},
    config::AuditConfig,
    explainer::{ChangeWindow, Explanation},
    snapshot::{AuditSnapshot, ContactChangeEvent, ContactRecord, RawDelivery, SubjectRef, SubjectRow},
    types::{Channel, ContactKind, Timestamp},
};

fn at(day: u32, hour: u32) -> Timestamp {
    NaiveDate::from_ymd_opt(2025, 12, day)
        .unwrap()
        .and_hms_opt(hour, 0, 0)
        .unwrap()
}

fn delivery(event_id: i64, subject: Option<&str>, username: Option<&str>, payload: &str) -> RawDelivery {
    RawDelivery {
        event_id,
        subject_id: subject.map(str::to_string),
        username: username.map(str::to_string),
        payload: payload.into(),
        timestamp: at(10, (event_id % 24) as u32),
        ip_address: None,
    }
}

fn email_payload(dest: &str) -> String {
    format!(r#"["email", "{dest}", null, null, "success"]"#)
}

fn text_payload(full: &str) -> String {
    format!(r#"["text", "xxx-xxx-{}", null, "{full}", "success"]"#, &full[full.len() - 4..])
}

fn contact(subject: &str, kind: ContactKind, value: &str) -> ContactRecord {
    ContactRecord {
        subject: SubjectRef::Id(subject.into()),
        kind,
        value: value.into(),
        is_primary: false,
    }
}

fn classify_one(snapshot: &AuditSnapshot, config: &AuditConfig) -> Finding {
    let tables = snapshot.index();
    let classifier = ContactAnomalyClassifier::new(config, &tables);
    classifier.classify(&snapshot.deliveries[0])
}

// ── Reference scenarios ────────────────────────────────────────────

#[test]
fn scenario_a_unexplained_domain_change() {
    let snapshot = AuditSnapshot {
        deliveries: vec![delivery(1, Some("M-A"), Some("joey"), &email_payload("joeynaj@ibande.xyz"))],
        ..Default::default()
    };
    let f = classify_one(&snapshot, &AuditConfig::default_test());
    assert_eq!(f.label, Label::DomainMismatch);
    assert_eq!(f.explanation, Some(Explanation::Unexplained));
    assert_eq!(f.verdict(), "DOMAIN_MISMATCH + UNEXPLAINED");
    assert!(f.is_alarming());
    assert!(f.suspicious_domain, "ibande.xyz is on the suspicious list");
    assert!(f.profile_contacts_considered.is_empty());
}

#[test]
fn scenario_b_close_phone_match() {
    let snapshot = AuditSnapshot {
        deliveries: vec![delivery(1, Some("M-B"), None, &text_payload("619-218-5471"))],
        contacts: vec![contact("M-B", ContactKind::Phone, "619-218-5479")],
        ..Default::default()
    };
    let f = classify_one(&snapshot, &AuditConfig::default_test());
    assert_eq!(f.channel, Channel::Sms);
    assert_eq!(f.label, Label::CloseMatch);
    assert_eq!(f.closest_distance, Some(1));
    assert_eq!(f.explanation, None);
    assert_eq!(f.profile_contacts_considered, vec!["6192185479".to_string()]);
}

#[test]
fn scenario_c_masked_email_match() {
    let snapshot = AuditSnapshot {
        deliveries: vec![delivery(1, Some("M-C"), None, &email_payload("axxx@gmail.com"))],
        contacts: vec![contact("M-C", ContactKind::Email, "ASmith@gmail.com")],
        ..Default::default()
    };
    let f = classify_one(&snapshot, &AuditConfig::default_test());
    assert_eq!(f.label, Label::MaskedMatch);
    assert_eq!(f.matched_contact.as_deref(), Some("asmith@gmail.com"));
}

#[test]
fn scenario_d_short_numbers_are_excluded_not_fatal() {
    // Short profile phone: excluded, leaving no usable phone on file.
    let snapshot = AuditSnapshot {
        deliveries: vec![delivery(1, Some("M-D"), None, &text_payload("619-218-5471"))],
        contacts: vec![contact("M-D", ContactKind::Phone, "218-5471")],
        ..Default::default()
    };
    let f = classify_one(&snapshot, &AuditConfig::default_test());
    assert_eq!(f.label, Label::NoProfilePhone);

    let report = classify_snapshot(&"run-d".to_string(), &snapshot, &AuditConfig::default_test());
    assert_eq!(report.invalid_contacts, 1);

    // Short destination: excluded from comparison.
    let snapshot = AuditSnapshot {
        deliveries: vec![delivery(
            2,
            Some("M-D"),
            None,
            r#"["text", "xxx-xxx-5471", null, "218-5471", "success"]"#,
        )],
        contacts: vec![contact("M-D", ContactKind::Phone, "619-218-5471")],
        ..Default::default()
    };
    let f = classify_one(&snapshot, &AuditConfig::default_test());
    assert_eq!(f.label, Label::UnknownChannel);
    assert_eq!(f.channel, Channel::Unknown);
    assert_eq!(f.parse_failure.as_ref().map(|p| p.kind()), Some("missing_destination"));
}

#[test]
fn scenario_e_unresolvable_subject() {
    let snapshot = AuditSnapshot {
        deliveries: vec![
            delivery(1, None, None, &email_payload("joeynaj@ibande.xyz")),
            delivery(2, Some("M-E"), None, &email_payload("joeynaj@ibande.xyz")),
        ],
        ..Default::default()
    };
    let report = classify_snapshot(&"run-e".to_string(), &snapshot, &AuditConfig::default_test());
    assert_eq!(report.counts.get(Label::Unresolved, None), 1);
    assert_eq!(
        report.counts.get(Label::DomainMismatch, Some(Explanation::Unexplained)),
        1,
        "unresolved must not be counted as unexplained"
    );
    let unresolved = report
        .findings
        .iter()
        .find(|f| f.label == Label::Unresolved)
        .unwrap();
    assert_eq!(unresolved.event_id, 1);
    assert_eq!(unresolved.explanation, None);
    assert!(!unresolved.is_alarming());
}

// ── Resolution ─────────────────────────────────────────────────────

#[test]
fn username_resolves_through_subject_table() {
    let snapshot = AuditSnapshot {
        subjects: vec![SubjectRow {
            subject_id: "M-9".into(),
            username: Some("JDoe".into()),
            ..Default::default()
        }],
        deliveries: vec![delivery(1, None, Some("jdoe"), &email_payload("jdoe@cox.net"))],
        contacts: vec![ContactRecord {
            subject: SubjectRef::Username("jdoe".into()),
            kind: ContactKind::Email,
            value: "JDoe@cox.net".into(),
            is_primary: true,
        }],
        ..Default::default()
    };
    let f = classify_one(&snapshot, &AuditConfig::default_test());
    assert_eq!(f.subject_id.as_deref(), Some("M-9"));
    assert_eq!(f.label, Label::ExactMatch);
}

#[test]
fn username_resolves_through_other_deliveries() {
    let snapshot = AuditSnapshot {
        deliveries: vec![
            delivery(1, None, Some("kgray"), &email_payload("kgray@ibande.xyz")),
            delivery(2, Some("M-7"), Some("KGray"), &email_payload("kgray@ibande.xyz")),
        ],
        changes: vec![ContactChangeEvent {
            subject_id: "M-7".into(),
            kind: ContactKind::Email,
            changed_at: at(1, 8),
        }],
        ..Default::default()
    };
    let f = classify_one(&snapshot, &AuditConfig::default_test());
    assert_eq!(f.subject_id.as_deref(), Some("M-7"));
    assert_eq!(f.verdict(), "DOMAIN_MISMATCH + EXPLAINED");
}

#[test]
fn member_details_follow_the_resolved_subject() {
    let snapshot = AuditSnapshot {
        subjects: vec![SubjectRow {
            subject_id: "M-9".into(),
            username: Some("jdoe".into()),
            member_number: Some("004417".into()),
            first_name: Some("Jane".into()),
            last_name: Some(" Doe ".into()),
        }],
        deliveries: vec![
            delivery(1, None, Some("JDOE"), &email_payload("jdoe@ibande.xyz")),
            delivery(2, Some("M-5"), None, &email_payload("x@ibande.xyz")),
        ],
        ..Default::default()
    };
    let report = classify_snapshot(&"run-m".to_string(), &snapshot, &AuditConfig::default_test());
    let jane = report.findings.iter().find(|f| f.event_id == 1).unwrap();
    assert_eq!(jane.member_number.as_deref(), Some("004417"));
    assert_eq!(jane.first_name.as_deref(), Some("Jane"));
    assert_eq!(jane.last_name.as_deref(), Some("Doe"));

    let other = report.findings.iter().find(|f| f.event_id == 2).unwrap();
    assert_eq!(other.member_number, None);
    assert_eq!(other.first_name, None);
}

#[test]
fn raw_payload_is_kept_on_every_finding() {
    let garbled = r#"["text","xxx-xxx-1234",null,"garbage","success"]"#;
    let snapshot = AuditSnapshot {
        deliveries: vec![
            delivery(1, Some("M-1"), None, garbled),
            delivery(2, None, None, "not json"),
            delivery(3, Some("M-1"), None, &email_payload("a@gmail.com")),
        ],
        ..Default::default()
    };
    let report = classify_snapshot(&"run-r".to_string(), &snapshot, &AuditConfig::default_test());
    for f in &report.findings {
        let expected = &snapshot.deliveries[(f.event_id - 1) as usize].payload;
        assert_eq!(&f.raw_payload, expected, "event {}", f.event_id);
    }

    let garbled_finding = report.findings.iter().find(|f| f.event_id == 1).unwrap();
    assert_eq!(garbled_finding.label, Label::UnknownChannel);
    let json = serde_json::to_value(garbled_finding).unwrap();
    assert_eq!(json["raw_payload"], garbled);
    assert_eq!(report.parse_failures.get("missing_destination"), Some(&1));
}

#[test]
fn unknown_username_is_unresolved() {
    let snapshot = AuditSnapshot {
        deliveries: vec![delivery(1, None, Some("ghost"), &email_payload("ghost@gmail.com"))],
        ..Default::default()
    };
    let f = classify_one(&snapshot, &AuditConfig::default_test());
    assert_eq!(f.label, Label::Unresolved);
    assert_eq!(f.subject_id, None);
}

#[test]
fn orphan_contacts_are_counted() {
    let snapshot = AuditSnapshot {
        deliveries: vec![delivery(1, Some("M-1"), None, &email_payload("a@gmail.com"))],
        contacts: vec![ContactRecord {
            subject: SubjectRef::Username("nobody".into()),
            kind: ContactKind::Email,
            value: "a@gmail.com".into(),
            is_primary: false,
        }],
        ..Default::default()
    };
    let report = classify_snapshot(&"run-o".to_string(), &snapshot, &AuditConfig::default_test());
    assert_eq!(report.orphan_contacts, 1);
    assert_eq!(report.findings[0].label, Label::UnverifiableCommonDomain);
}

// ── Channel separation and explanation ─────────────────────────────

#[test]
fn email_destination_never_compared_to_phone_contacts() {
    let snapshot = AuditSnapshot {
        deliveries: vec![delivery(1, Some("M-1"), None, &email_payload("jdoe@ibande.xyz"))],
        contacts: vec![contact("M-1", ContactKind::Phone, "619-555-1234")],
        changes: vec![ContactChangeEvent {
            subject_id: "M-1".into(),
            kind: ContactKind::Phone,
            changed_at: at(1, 8),
        }],
        ..Default::default()
    };
    let f = classify_one(&snapshot, &AuditConfig::default_test());
    assert!(f.profile_contacts_considered.is_empty());
    assert_eq!(f.verdict(), "DOMAIN_MISMATCH + UNEXPLAINED", "phone change does not explain email");
}

#[test]
fn phone_change_explains_true_mismatch() {
    let mut snapshot = AuditSnapshot {
        deliveries: vec![delivery(1, Some("M-1"), None, &text_payload("760-555-0000"))],
        contacts: vec![contact("M-1", ContactKind::Phone, "619-218-5479")],
        changes: vec![ContactChangeEvent {
            subject_id: "M-1".into(),
            kind: ContactKind::Phone,
            changed_at: at(20, 8),
        }],
        ..Default::default()
    };
    let f = classify_one(&snapshot, &AuditConfig::default_test());
    assert_eq!(f.verdict(), "TRUE_MISMATCH + EXPLAINED");

    let mut windowed = AuditConfig::default_test();
    windowed.change_window = ChangeWindow::AtOrBefore;
    let f = classify_one(&snapshot, &windowed);
    assert_eq!(f.verdict(), "TRUE_MISMATCH + UNEXPLAINED", "change logged after delivery");

    snapshot.changes.clear();
    let f = classify_one(&snapshot, &AuditConfig::default_test());
    assert!(f.is_alarming());
}

#[test]
fn all_invalid_contacts_count_as_none_on_file() {
    let snapshot = AuditSnapshot {
        deliveries: vec![delivery(1, Some("M-1"), None, &email_payload("newbie@yahoo.com"))],
        contacts: vec![
            contact("M-1", ContactKind::Email, "not an email"),
            contact("M-1", ContactKind::Email, ""),
        ],
        ..Default::default()
    };
    let f = classify_one(&snapshot, &AuditConfig::default_test());
    assert_eq!(f.label, Label::UnverifiableCommonDomain);

    // One valid contact among invalid ones still counts as "on file".
    let snapshot = AuditSnapshot {
        contacts: vec![
            contact("M-1", ContactKind::Email, "not an email"),
            contact("M-1", ContactKind::Email, "owner@cox.net"),
        ],
        ..snapshot
    };
    let f = classify_one(&snapshot, &AuditConfig::default_test());
    assert_eq!(f.label, Label::DomainMismatch);
}

// ── Report-level properties ────────────────────────────────────────

#[test]
fn every_event_gets_exactly_one_finding() {
    let snapshot = AuditSnapshot {
        deliveries: vec![
            delivery(1, Some("M-1"), None, &email_payload("asmith@gmail.com")),
            delivery(2, Some("M-1"), None, "not json"),
            delivery(3, None, None, "not json"),
            delivery(4, Some("M-1"), None, r#"["jdoe@gmail.com", "xxx-xxx-4321", "success"]"#),
            delivery(5, Some("M-1"), None, &text_payload("619-555-1234")),
            delivery(6, Some("M-1"), None, r#"["fax", "1"]"#),
        ],
        contacts: vec![
            contact("M-1", ContactKind::Email, "asmith@gmail.com"),
            contact("M-1", ContactKind::Phone, "+1 619 555 1234"),
        ],
        ..Default::default()
    };
    let report = classify_snapshot(&"run-x".to_string(), &snapshot, &AuditConfig::default_test());

    let mut ids: Vec<i64> = report.findings.iter().map(|f| f.event_id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(report.counts.total(), 6);

    assert_eq!(report.counts.get(Label::ExactMatch, None), 2);
    assert_eq!(report.counts.get(Label::UnknownChannel, None), 3);
    assert_eq!(report.counts.get(Label::Unresolved, None), 1);

    // Both "not json" rows are tallied, including the unresolved one.
    assert_eq!(report.parse_failures.get("malformed"), Some(&2));
    assert_eq!(report.parse_failures.get("unrecognized_channel"), Some(&1));
    assert_eq!(report.parse_failure_total(), 3);
}

#[test]
fn report_puts_alarming_findings_first() {
    let snapshot = AuditSnapshot {
        deliveries: vec![
            delivery(1, Some("M-1"), None, &email_payload("asmith@gmail.com")),
            delivery(2, Some("M-2"), None, &email_payload("evil@ibande.xyz")),
            delivery(3, None, None, &email_payload("x@y.com")),
        ],
        contacts: vec![
            contact("M-1", ContactKind::Email, "asmith@gmail.com"),
            contact("M-2", ContactKind::Email, "owner@cox.net"),
        ],
        ..Default::default()
    };
    let report = classify_snapshot(&"run-s".to_string(), &snapshot, &AuditConfig::default_test());
    let order: Vec<i64> = report.findings.iter().map(|f| f.event_id).collect();
    assert_eq!(order, vec![2, 3, 1]);
    assert_eq!(report.alarming().count(), 1);
}

#[test]
fn classification_is_deterministic() {
    let snapshot = AuditSnapshot {
        deliveries: (0..40)
            .map(|i| {
                let payload = if i % 2 == 0 {
                    email_payload(&format!("user{i}@ibande.xyz"))
                } else {
                    text_payload(&format!("619-555-{:04}", i))
                };
                delivery(i, Some(&format!("M-{}", i % 5)), None, &payload)
            })
            .collect(),
        contacts: (0..5)
            .map(|i| contact(&format!("M-{i}"), ContactKind::Phone, &format!("619-555-{:04}", i)))
            .collect(),
        ..Default::default()
    };
    let cfg = AuditConfig::default_test();
    let a = classify_snapshot(&"run-1".to_string(), &snapshot, &cfg);
    let b = classify_snapshot(&"run-1".to_string(), &snapshot, &cfg);
    assert_eq!(a.findings, b.findings);
    assert_eq!(a.counts, b.counts);
}
