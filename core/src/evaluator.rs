//! Match evaluator: decides whether one delivery destination is explained
//! by the subject's profile contacts of the same kind.
//!
//! Inputs are canonical profile values (see `contact`). Both evaluators
//! return `None` when the destination itself cannot be canonicalized;
//! such an event is excluded from comparison, never forced into a label.

use crate::{
    config::{EmailPolicy, PhonePolicy},
    contact::{canonical_email, canonical_phone, hamming_distance, split_email},
};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchOutcome {
    ExactMatch,
    MaskedMatch,
    UnverifiableCommonDomain,
    DomainMismatch,
    CloseMatch,
    NoProfilePhone,
    TrueMismatch,
}

impl MatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExactMatch => "EXACT_MATCH",
            Self::MaskedMatch => "MASKED_MATCH",
            Self::UnverifiableCommonDomain => "UNVERIFIABLE_COMMON_DOMAIN",
            Self::DomainMismatch => "DOMAIN_MISMATCH",
            Self::CloseMatch => "CLOSE_MATCH",
            Self::NoProfilePhone => "NO_PROFILE_PHONE",
            Self::TrueMismatch => "TRUE_MISMATCH",
        }
    }

    /// Unmatched outcomes go on to the mismatch explainer.
    pub fn needs_explanation(&self) -> bool {
        matches!(self, Self::DomainMismatch | Self::TrueMismatch)
    }
}

impl fmt::Display for MatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub outcome: MatchOutcome,
    /// Canonical destination that was compared.
    pub destination: String,
    /// Profile value responsible for an exact, masked or close match.
    pub matched_contact: Option<String>,
    /// Smallest Hamming distance to any profile phone (phone channel only).
    pub closest_distance: Option<u32>,
}

impl Evaluation {
    fn new(outcome: MatchOutcome, destination: String) -> Self {
        Self {
            outcome,
            destination,
            matched_contact: None,
            closest_distance: None,
        }
    }
}

// ── Email ──────────────────────────────────────────────────────────

pub fn evaluate_email(
    destination: &str,
    profile_emails: &[String],
    policy: &EmailPolicy,
) -> Option<Evaluation> {
    let canonical = canonical_email(destination);
    let dest = canonical.as_str()?.to_string();

    if let Some(hit) = profile_emails.iter().find(|p| **p == dest) {
        let mut eval = Evaluation::new(MatchOutcome::ExactMatch, dest);
        eval.matched_contact = Some(hit.clone());
        return Some(eval);
    }

    if let Some(hit) = profile_emails.iter().find(|p| is_masked_copy(&dest, p, policy)) {
        let mut eval = Evaluation::new(MatchOutcome::MaskedMatch, dest);
        eval.matched_contact = Some(hit.clone());
        return Some(eval);
    }

    let domain = split_email(&dest).map(|(_, d)| d);
    if profile_emails.is_empty() && domain.map_or(false, |d| policy.is_common_provider(d)) {
        return Some(Evaluation::new(MatchOutcome::UnverifiableCommonDomain, dest));
    }

    Some(Evaluation::new(MatchOutcome::DomainMismatch, dest))
}

/// Could `dest` be a masked display copy of `profile`?
/// Same domain, marker present in the local-part (case-insensitive), and one of the enabled
/// shape rules holds. Approximate by nature.
pub fn is_masked_copy(dest: &str, profile: &str, policy: &EmailPolicy) -> bool {
    let (Some((dest_local, dest_domain)), Some((prof_local, prof_domain))) =
        (split_email(dest), split_email(profile))
    else {
        return false;
    };
    let marker = policy.mask_marker.to_lowercase();
    if dest_domain != prof_domain || marker.is_empty() || !dest_local.to_lowercase().contains(&marker) {
        return false;
    }
    let same_length = dest_local.chars().count() == prof_local.chars().count();
    let same_first = dest_local.chars().next() == prof_local.chars().next();
    (policy.match_same_length && same_length) || (policy.match_same_first_char && same_first)
}

// ── Phone ──────────────────────────────────────────────────────────

pub fn evaluate_phone(
    destination: &str,
    profile_phones: &[String],
    policy: &PhonePolicy,
) -> Option<Evaluation> {
    let canonical = canonical_phone(destination);
    let dest = canonical.as_str()?.to_string();

    if let Some(hit) = profile_phones.iter().find(|p| **p == dest) {
        let mut eval = Evaluation::new(MatchOutcome::ExactMatch, dest);
        eval.matched_contact = Some(hit.clone());
        eval.closest_distance = Some(0);
        return Some(eval);
    }

    let closest = profile_phones
        .iter()
        .filter_map(|p| hamming_distance(&dest, p).map(|d| (d, p)))
        .min_by_key(|(d, _)| *d);

    if let Some((distance, hit)) = closest {
        if distance <= policy.close_match_threshold {
            let mut eval = Evaluation::new(MatchOutcome::CloseMatch, dest);
            eval.matched_contact = Some(hit.clone());
            eval.closest_distance = Some(distance);
            return Some(eval);
        }
    }

    if profile_phones.is_empty() {
        return Some(Evaluation::new(MatchOutcome::NoProfilePhone, dest));
    }

    let mut eval = Evaluation::new(MatchOutcome::TrueMismatch, dest);
    eval.closest_distance = closest.map(|(d, _)| d);
    Some(eval)
}

/// Symmetric close-match test on two raw phone values.
pub fn is_close_match(a: &str, b: &str, policy: &PhonePolicy) -> bool {
    let (ca, cb) = (canonical_phone(a), canonical_phone(b));
    match (ca.as_str(), cb.as_str()) {
        (Some(x), Some(y)) => {
            hamming_distance(x, y).map_or(false, |d| d <= policy.close_match_threshold)
        }
        _ => false,
    }
}
