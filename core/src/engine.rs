//! The audit engine: one run over one snapshot database.
//!
//! RUN ORDER (fixed):
//!   1. Bulk-read the snapshot (subjects, deliveries, contacts, changes).
//!   2. Build lookup tables keyed by subject identity.
//!   3. Classify every delivery, sequentially.
//!   4. Persist the run and its findings in one transaction.
//!
//! Classification is pure: the same snapshot and config always produce
//! the same findings in the same order.

use crate::{
    classifier::classify_snapshot,
    config::AuditConfig,
    error::AuditResult,
    report::AuditReport,
    store::AuditStore,
    types::RunId,
};

pub struct AuditEngine {
    pub run_id: RunId,
    pub config: AuditConfig,
    pub store: AuditStore,
}

impl AuditEngine {
    pub fn new(run_id: RunId, config: AuditConfig, store: AuditStore) -> Self {
        Self { run_id, config, store }
    }

    /// In-memory, migrated store with test defaults. Used by tests.
    pub fn build_test(run_id: RunId) -> AuditResult<Self> {
        let store = AuditStore::in_memory()?;
        store.migrate()?;
        Ok(Self::new(run_id, AuditConfig::default_test(), store))
    }

    /// Classify without persisting anything.
    pub fn evaluate(&self) -> AuditResult<AuditReport> {
        let snapshot = self.store.load_snapshot()?;
        Ok(classify_snapshot(&self.run_id, &snapshot, &self.config))
    }

    /// Classify and persist. The run row and its findings commit together.
    pub fn run(&self) -> AuditResult<AuditReport> {
        let started_at = chrono::Local::now().naive_local();
        let report = self.evaluate()?;

        self.store.record_run(
            &self.run_id,
            env!("CARGO_PKG_VERSION"),
            started_at,
            &report.findings,
        )?;

        log::info!(
            "run {} persisted: {} findings",
            self.run_id,
            report.findings.len()
        );
        Ok(report)
    }
}
