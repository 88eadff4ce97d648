//! ContactAnomalyClassifier: labels every OTP delivery against the
//! member's profile.
//!
//! Per-event state machine (no transitions back):
//!
//!   resolve subject ──none──▶ UNRESOLVED
//!        │
//!   decode payload ──failure / unknown channel──▶ UNKNOWN_CHANNEL
//!        │
//!   evaluate ──matched──▶ EXACT_MATCH | MASKED_MATCH | UNVERIFIABLE_COMMON_DOMAIN
//!        │                | CLOSE_MATCH | NO_PROFILE_PHONE
//!        └──unmatched──▶ DOMAIN_MISMATCH | TRUE_MISMATCH  + EXPLAINED | UNEXPLAINED
//!
//! Every input event yields exactly one `Finding`. Nothing here returns
//! an error: a bad row is a label, not an aborted run.

use crate::{
    config::AuditConfig,
    contact::email_domain,
    evaluator::{evaluate_email, evaluate_phone, MatchOutcome},
    explainer::Explanation,
    payload::{normalize, ParseFailure},
    report::AuditReport,
    snapshot::{AuditSnapshot, LookupTables, RawDelivery},
    types::{Channel, ContactKind, RunId, SubjectId, Timestamp},
};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Label {
    ExactMatch,
    MaskedMatch,
    UnverifiableCommonDomain,
    CloseMatch,
    NoProfilePhone,
    DomainMismatch,
    TrueMismatch,
    UnknownChannel,
    Unresolved,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExactMatch => "EXACT_MATCH",
            Self::MaskedMatch => "MASKED_MATCH",
            Self::UnverifiableCommonDomain => "UNVERIFIABLE_COMMON_DOMAIN",
            Self::CloseMatch => "CLOSE_MATCH",
            Self::NoProfilePhone => "NO_PROFILE_PHONE",
            Self::DomainMismatch => "DOMAIN_MISMATCH",
            Self::TrueMismatch => "TRUE_MISMATCH",
            Self::UnknownChannel => "UNKNOWN_CHANNEL",
            Self::Unresolved => "UNRESOLVED",
        }
    }
}

impl From<MatchOutcome> for Label {
    fn from(outcome: MatchOutcome) -> Self {
        match outcome {
            MatchOutcome::ExactMatch => Self::ExactMatch,
            MatchOutcome::MaskedMatch => Self::MaskedMatch,
            MatchOutcome::UnverifiableCommonDomain => Self::UnverifiableCommonDomain,
            MatchOutcome::DomainMismatch => Self::DomainMismatch,
            MatchOutcome::CloseMatch => Self::CloseMatch,
            MatchOutcome::NoProfilePhone => Self::NoProfilePhone,
            MatchOutcome::TrueMismatch => Self::TrueMismatch,
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One evaluated delivery, as handed to the reporting side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub event_id: i64,
    pub subject_id: Option<SubjectId>,
    pub username: Option<String>,
    /// Member number and name from the subject table, when on file.
    pub member_number: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub timestamp: Timestamp,
    pub channel: Channel,
    pub destination: Option<String>,
    pub masked_display: Option<String>,
    pub label: Label,
    /// Only set for unmatched labels.
    pub explanation: Option<Explanation>,
    /// Canonical profile values of the compared kind.
    pub profile_contacts_considered: Vec<String>,
    pub matched_contact: Option<String>,
    pub closest_distance: Option<u32>,
    /// Destination domain is on the suspicious list (email only).
    pub suspicious_domain: bool,
    pub parse_failure: Option<ParseFailure>,
    pub ip_address: Option<String>,
    /// The delivery payload exactly as logged.
    pub raw_payload: String,
}

impl Finding {
    fn skeleton(raw: &RawDelivery) -> Self {
        Self {
            event_id: raw.event_id,
            subject_id: None,
            username: raw.username.clone(),
            member_number: None,
            first_name: None,
            last_name: None,
            timestamp: raw.timestamp,
            channel: Channel::Unknown,
            destination: None,
            masked_display: None,
            label: Label::Unresolved,
            explanation: None,
            profile_contacts_considered: Vec::new(),
            matched_contact: None,
            closest_distance: None,
            suspicious_domain: false,
            parse_failure: None,
            ip_address: raw.ip_address.clone(),
            raw_payload: raw.payload.clone(),
        }
    }

    /// Combined label, e.g. `DOMAIN_MISMATCH + UNEXPLAINED`.
    pub fn verdict(&self) -> String {
        verdict(self.label, self.explanation)
    }

    /// An unmatched destination with no logged change to explain it.
    pub fn is_alarming(&self) -> bool {
        matches!(self.label, Label::DomainMismatch | Label::TrueMismatch)
            && self.explanation == Some(Explanation::Unexplained)
    }

    /// Report ordering rank; higher sorts first.
    pub fn severity(&self) -> u8 {
        match (self.label, self.explanation) {
            (Label::DomainMismatch | Label::TrueMismatch, Some(Explanation::Unexplained)) => 9,
            (Label::NoProfilePhone, _) => 8,
            (Label::DomainMismatch | Label::TrueMismatch, _) => 7,
            (Label::CloseMatch, _) => 6,
            (Label::UnverifiableCommonDomain, _) => 5,
            (Label::UnknownChannel, _) => 4,
            (Label::Unresolved, _) => 3,
            (Label::MaskedMatch, _) => 2,
            (Label::ExactMatch, _) => 1,
        }
    }
}

pub fn verdict(label: Label, explanation: Option<Explanation>) -> String {
    match explanation {
        Some(e) => format!("{label} + {e}"),
        None => label.to_string(),
    }
}

// ── Classifier ─────────────────────────────────────────────────────

pub struct ContactAnomalyClassifier<'a> {
    config: &'a AuditConfig,
    tables: &'a LookupTables,
}

impl<'a> ContactAnomalyClassifier<'a> {
    pub fn new(config: &'a AuditConfig, tables: &'a LookupTables) -> Self {
        Self { config, tables }
    }

    pub fn classify(&self, raw: &RawDelivery) -> Finding {
        let mut finding = Finding::skeleton(raw);
        let decoded = normalize(raw, &self.config.phone);

        match &decoded {
            Ok(event) => {
                finding.channel = event.channel;
                finding.destination = event.destination.clone();
                finding.masked_display = event.masked_display.clone();
            }
            Err(failure) => finding.parse_failure = Some(failure.clone()),
        }

        let resolved = self
            .tables
            .directory
            .resolve(raw.subject_id.as_deref(), raw.username.as_deref());
        let Some(subject_id) = resolved else {
            finding.label = Label::Unresolved;
            return finding;
        };
        if let Some(member) = self.tables.directory.member(&subject_id) {
            finding.member_number = member.member_number.clone();
            finding.first_name = member.first_name.clone();
            finding.last_name = member.last_name.clone();
        }
        finding.subject_id = Some(subject_id.clone());

        let Ok(event) = decoded else {
            finding.label = Label::UnknownChannel;
            return finding;
        };
        let (Some(kind), Some(destination)) = (event.channel.contact_kind(), event.destination)
        else {
            finding.label = Label::UnknownChannel;
            return finding;
        };

        let profile = self.tables.profiles.contacts(&subject_id, kind);
        let evaluation = match kind {
            ContactKind::Email => evaluate_email(&destination, profile, &self.config.email),
            ContactKind::Phone => evaluate_phone(&destination, profile, &self.config.phone),
        };
        let Some(evaluation) = evaluation else {
            finding.label = Label::UnknownChannel;
            return finding;
        };

        if kind == ContactKind::Email {
            finding.suspicious_domain = email_domain(&evaluation.destination)
                .map_or(false, |d| self.config.email.is_suspicious_domain(d));
        }
        if evaluation.outcome.needs_explanation() {
            finding.explanation = Some(self.tables.ledger.explain(
                &subject_id,
                kind,
                event.timestamp,
                self.config.change_window,
            ));
        }
        finding.label = evaluation.outcome.into();
        finding.profile_contacts_considered = profile.to_vec();
        finding.matched_contact = evaluation.matched_contact;
        finding.closest_distance = evaluation.closest_distance;
        finding
    }

    pub fn classify_all(&self, deliveries: &[RawDelivery]) -> Vec<Finding> {
        deliveries.iter().map(|raw| self.classify(raw)).collect()
    }
}

/// Index a snapshot, classify every delivery in it, and build the report.
pub fn classify_snapshot(run_id: &RunId, snapshot: &AuditSnapshot, config: &AuditConfig) -> AuditReport {
    let tables = snapshot.index();
    let classifier = ContactAnomalyClassifier::new(config, &tables);
    let findings = classifier.classify_all(&snapshot.deliveries);
    AuditReport::build(run_id.clone(), findings, &tables)
}
