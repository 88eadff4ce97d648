//! Input snapshot: the bulk reads one audit run works from, and the
//! lookup tables built over them.
//!
//! RULE: inputs are pulled in a handful of bulk reads, never one query per
//! event. Everything below is read-only for the duration of a run.

use crate::{
    contact::canonicalize,
    explainer::ChangeLedger,
    types::{ContactKind, SubjectId, Timestamp},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ── Input rows ─────────────────────────────────────────────────────

/// Member id ↔ username, plus the identifying details an investigator
/// needs on the anomaly sheet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubjectRow {
    pub subject_id: SubjectId,
    pub username: Option<String>,
    pub member_number: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Member details carried onto every finding for that subject.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberDetails {
    pub member_number: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// One OTP delivery row as it comes out of the activity log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDelivery {
    pub event_id: i64,
    pub subject_id: Option<SubjectId>,
    pub username: Option<String>,
    pub payload: String,
    pub timestamp: Timestamp,
    pub ip_address: Option<String>,
}

/// How a contact record names its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", content = "value", rename_all = "snake_case")]
pub enum SubjectRef {
    Id(SubjectId),
    Username(String),
}

/// One profile-declared contact channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactRecord {
    pub subject: SubjectRef,
    pub kind: ContactKind,
    pub value: String,
    pub is_primary: bool,
}

/// A logged "member changed their email/phone" event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactChangeEvent {
    pub subject_id: SubjectId,
    pub kind: ContactKind,
    pub changed_at: Timestamp,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditSnapshot {
    pub subjects: Vec<SubjectRow>,
    pub deliveries: Vec<RawDelivery>,
    pub contacts: Vec<ContactRecord>,
    pub changes: Vec<ContactChangeEvent>,
}

// ── Subject directory ──────────────────────────────────────────────

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn username_key(username: &str) -> Option<String> {
    let key = username.trim().to_lowercase();
    if key.is_empty() {
        None
    } else {
        Some(key)
    }
}

/// Lower-cased username → subject id. The first mapping seen wins.
#[derive(Debug, Default, Clone)]
pub struct SubjectDirectory {
    by_username: HashMap<String, SubjectId>,
    members: HashMap<SubjectId, MemberDetails>,
}

impl SubjectDirectory {
    pub fn build(subjects: &[SubjectRow], deliveries: &[RawDelivery]) -> Self {
        let mut dir = Self::default();
        for s in subjects {
            if let Some(username) = &s.username {
                dir.insert(username, &s.subject_id);
            }
            let details = MemberDetails {
                member_number: non_blank(&s.member_number),
                first_name: non_blank(&s.first_name),
                last_name: non_blank(&s.last_name),
            };
            if details != MemberDetails::default() {
                dir.members.insert(s.subject_id.trim().to_string(), details);
            }
        }
        for d in deliveries {
            if let (Some(id), Some(username)) = (&d.subject_id, &d.username) {
                dir.insert(username, id);
            }
        }
        dir
    }

    pub fn insert(&mut self, username: &str, subject_id: &str) {
        let subject_id = subject_id.trim();
        let Some(key) = username_key(username) else { return };
        if subject_id.is_empty() {
            return;
        }
        match self.by_username.get(&key) {
            Some(existing) if existing != subject_id => {
                log::debug!(
                    "username '{key}' maps to both {existing} and {subject_id}; keeping {existing}"
                );
            }
            Some(_) => {}
            None => {
                self.by_username.insert(key, subject_id.to_string());
            }
        }
    }

    pub fn lookup(&self, username: &str) -> Option<&SubjectId> {
        self.by_username.get(&username_key(username)?)
    }

    pub fn member(&self, subject_id: &str) -> Option<&MemberDetails> {
        self.members.get(subject_id)
    }

    /// The event's own id when present, otherwise its username's mapping.
    pub fn resolve(&self, subject_id: Option<&str>, username: Option<&str>) -> Option<SubjectId> {
        if let Some(id) = subject_id.map(str::trim).filter(|id| !id.is_empty()) {
            return Some(id.to_string());
        }
        username.and_then(|u| self.lookup(u)).cloned()
    }

    pub fn len(&self) -> usize {
        self.by_username.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_username.is_empty()
    }
}

// ── Profile book ───────────────────────────────────────────────────

/// Canonical, de-duplicated contacts of one subject. Primary values first.
#[derive(Debug, Default, Clone)]
pub struct Profile {
    pub emails: Vec<String>,
    pub phones: Vec<String>,
}

impl Profile {
    pub fn contacts(&self, kind: ContactKind) -> &[String] {
        match kind {
            ContactKind::Email => &self.emails,
            ContactKind::Phone => &self.phones,
        }
    }

    fn push(&mut self, kind: ContactKind, value: String, is_primary: bool) {
        let list = match kind {
            ContactKind::Email => &mut self.emails,
            ContactKind::Phone => &mut self.phones,
        };
        if let Some(pos) = list.iter().position(|v| *v == value) {
            if is_primary && pos != 0 {
                let v = list.remove(pos);
                list.insert(0, v);
            }
            return;
        }
        if is_primary {
            list.insert(0, value);
        } else {
            list.push(value);
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct ProfileBook {
    profiles: HashMap<SubjectId, Profile>,
    /// Records whose owner could not be resolved to any subject.
    pub orphans: usize,
    /// Records excluded because their value failed canonicalization.
    pub invalid: usize,
}

impl ProfileBook {
    pub fn build(contacts: &[ContactRecord], directory: &SubjectDirectory) -> Self {
        let mut book = Self::default();
        for record in contacts {
            let owner = match &record.subject {
                SubjectRef::Id(id) => directory.resolve(Some(id), None),
                SubjectRef::Username(u) => directory.lookup(u).cloned(),
            };
            let Some(owner) = owner else {
                log::warn!("contact record for {:?} has no resolvable subject", record.subject);
                book.orphans += 1;
                continue;
            };
            let profile = book.profiles.entry(owner).or_default();
            match canonicalize(record.kind, &record.value).as_str() {
                Some(canonical) => profile.push(record.kind, canonical.to_string(), record.is_primary),
                None => {
                    log::debug!("excluding invalid {} value '{}'", record.kind, record.value);
                    book.invalid += 1;
                }
            }
        }
        book
    }

    pub fn profile(&self, subject_id: &str) -> Option<&Profile> {
        self.profiles.get(subject_id)
    }

    /// Usable canonical contacts of `kind`; empty when none are on file.
    pub fn contacts(&self, subject_id: &str, kind: ContactKind) -> &[String] {
        self.profile(subject_id)
            .map(|p| p.contacts(kind))
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

// ── Lookup tables ──────────────────────────────────────────────────

/// Everything the classifier consults, keyed by subject identity.
#[derive(Debug, Default, Clone)]
pub struct LookupTables {
    pub directory: SubjectDirectory,
    pub profiles: ProfileBook,
    pub ledger: ChangeLedger,
}

impl AuditSnapshot {
    pub fn index(&self) -> LookupTables {
        let directory = SubjectDirectory::build(&self.subjects, &self.deliveries);
        let profiles = ProfileBook::build(&self.contacts, &directory);
        let ledger = ChangeLedger::from_events(&self.changes);
        log::debug!(
            "lookup tables: {} usernames, {} profiles, {} change pairs",
            directory.len(),
            profiles.len(),
            ledger.len()
        );
        LookupTables { directory, profiles, ledger }
    }
}
