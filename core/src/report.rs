//! Audit report: severity-ordered findings plus the aggregate tallies
//! the summary needs.

use crate::{
    classifier::{verdict, Finding, Label},
    explainer::Explanation,
    snapshot::LookupTables,
    types::RunId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Finding count per combined verdict (`TRUE_MISMATCH + UNEXPLAINED`, …).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelCounts(BTreeMap<String, usize>);

impl LabelCounts {
    pub fn tally<'a>(findings: impl IntoIterator<Item = &'a Finding>) -> Self {
        let mut counts = BTreeMap::new();
        for f in findings {
            *counts.entry(f.verdict()).or_insert(0) += 1;
        }
        Self(counts)
    }

    pub fn get(&self, label: Label, explanation: Option<Explanation>) -> usize {
        self.0.get(&verdict(label, explanation)).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditReport {
    pub run_id: RunId,
    pub findings: Vec<Finding>,
    pub counts: LabelCounts,
    /// Parse failures by kind. Counted for every event, including unresolved ones.
    pub parse_failures: BTreeMap<String, usize>,
    pub orphan_contacts: usize,
    pub invalid_contacts: usize,
}

impl AuditReport {
    pub fn build(run_id: RunId, mut findings: Vec<Finding>, tables: &LookupTables) -> Self {
        findings.sort_by(|a, b| {
            b.severity()
                .cmp(&a.severity())
                .then(a.timestamp.cmp(&b.timestamp))
                .then(a.event_id.cmp(&b.event_id))
        });

        let counts = LabelCounts::tally(&findings);
        let mut parse_failures = BTreeMap::new();
        for failure in findings.iter().filter_map(|f| f.parse_failure.as_ref()) {
            *parse_failures.entry(failure.kind().to_string()).or_insert(0) += 1;
        }

        log::info!(
            "run {run_id}: {} findings, {} alarming, {} parse failures",
            findings.len(),
            findings.iter().filter(|f| f.is_alarming()).count(),
            parse_failures.values().sum::<usize>()
        );

        Self {
            run_id,
            findings,
            counts,
            parse_failures,
            orphan_contacts: tables.profiles.orphans,
            invalid_contacts: tables.profiles.invalid,
        }
    }

    /// Unexplained destination changes, the pattern investigators chase first.
    pub fn alarming(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.is_alarming())
    }

    pub fn parse_failure_total(&self) -> usize {
        self.parse_failures.values().sum()
    }

    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("run_id:            {}", self.run_id),
            format!("events evaluated:  {}", self.findings.len()),
            format!("alarming:          {}", self.alarming().count()),
            format!("parse failures:    {}", self.parse_failure_total()),
            format!("orphan contacts:   {}", self.orphan_contacts),
            format!("invalid contacts:  {}", self.invalid_contacts),
        ];
        for (verdict, count) in self.counts.iter() {
            lines.push(format!("  {verdict:<34} {count:>8}"));
        }
        lines
    }
}
