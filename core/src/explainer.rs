//! Mismatch explainer: a logged contact change on the same channel
//! explains an otherwise unmatched destination.

use crate::{
    snapshot::ContactChangeEvent,
    types::{ContactKind, SubjectId, Timestamp},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Which change events count as exculpatory for a delivery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeWindow {
    /// Any change of that kind for the subject, regardless of timing.
    #[default]
    Unwindowed,
    /// Only changes recorded at or before the delivery timestamp.
    AtOrBefore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Explanation {
    Explained,
    Unexplained,
}

impl Explanation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Explained => "EXPLAINED",
            Self::Unexplained => "UNEXPLAINED",
        }
    }
}

impl fmt::Display for Explanation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Change events indexed by (subject, kind). Timestamps kept sorted.
#[derive(Debug, Default, Clone)]
pub struct ChangeLedger {
    changes: HashMap<(SubjectId, ContactKind), Vec<Timestamp>>,
}

impl ChangeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_events<'a>(events: impl IntoIterator<Item = &'a ContactChangeEvent>) -> Self {
        let mut ledger = Self::new();
        for event in events {
            ledger.record(event);
        }
        ledger
    }

    pub fn record(&mut self, event: &ContactChangeEvent) {
        let stamps = self
            .changes
            .entry((event.subject_id.clone(), event.kind))
            .or_default();
        let pos = stamps.partition_point(|t| *t <= event.changed_at);
        stamps.insert(pos, event.changed_at);
    }

    pub fn has_change(&self, subject_id: &str, kind: ContactKind) -> bool {
        self.stamps(subject_id, kind).map_or(false, |s| !s.is_empty())
    }

    pub fn explain(
        &self,
        subject_id: &str,
        kind: ContactKind,
        delivered_at: Timestamp,
        window: ChangeWindow,
    ) -> Explanation {
        let explained = match (self.stamps(subject_id, kind), window) {
            (None, _) => false,
            (Some(stamps), ChangeWindow::Unwindowed) => !stamps.is_empty(),
            (Some(stamps), ChangeWindow::AtOrBefore) => {
                stamps.first().map_or(false, |first| *first <= delivered_at)
            }
        };
        if explained {
            Explanation::Explained
        } else {
            Explanation::Unexplained
        }
    }

    /// Number of distinct (subject, kind) pairs with at least one change.
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    fn stamps(&self, subject_id: &str, kind: ContactKind) -> Option<&Vec<Timestamp>> {
        self.changes.get(&(subject_id.to_string(), kind))
    }
}
