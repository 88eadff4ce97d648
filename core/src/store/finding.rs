//! Store methods for audit runs and their labeled findings.

use super::AuditStore;
use crate::{
    classifier::Finding,
    error::{AuditError, AuditResult},
    types::Timestamp,
};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;

impl AuditStore {
    /// Persist the run row and every finding of the run in one transaction.
    /// Either all of it lands or none of it does.
    pub fn record_run(
        &self,
        run_id: &str,
        version: &str,
        started_at: Timestamp,
        findings: &[Finding],
    ) -> AuditResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO audit_run (run_id, version, started_at, event_count)
             VALUES (?1, ?2, ?3, ?4)",
            params![run_id, version, started_at, findings.len() as i64],
        )?;
        write_findings(&tx, run_id, findings)?;
        tx.commit()?;
        Ok(())
    }

    pub fn finding_count(&self, run_id: &str) -> AuditResult<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM finding WHERE run_id = ?1",
            params![run_id],
            |r| r.get(0),
        )?)
    }

    /// Findings per verdict for a run, as persisted.
    pub fn verdict_counts(&self, run_id: &str) -> AuditResult<BTreeMap<String, i64>> {
        let mut stmt = self.conn.prepare(
            "SELECT verdict, COUNT(*) FROM finding WHERE run_id = ?1
             GROUP BY verdict ORDER BY verdict",
        )?;
        let rows = stmt.query_map(params![run_id], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?;
        let mut counts = BTreeMap::new();
        for row in rows {
            let (verdict, n) = row?;
            counts.insert(verdict, n);
        }
        Ok(counts)
    }

    /// Raw delivery payload stored for one finding.
    pub fn raw_payload(&self, run_id: &str, event_id: i64) -> AuditResult<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT raw_payload FROM finding WHERE run_id = ?1 AND event_id = ?2",
                params![run_id, event_id],
                |r| r.get(0),
            )
            .optional()?)
    }

    /// Read back the serialized findings of a run in insertion order.
    pub fn findings_for_run(&self, run_id: &str) -> AuditResult<Vec<Finding>> {
        if self.run_event_count(run_id)?.is_none() {
            return Err(AuditError::RunNotFound { run_id: run_id.to_string() });
        }
        let mut stmt = self.conn.prepare(
            "SELECT finding_json FROM finding WHERE run_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![run_id], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        rows.iter()
            .map(|json| serde_json::from_str(json).map_err(Into::into))
            .collect()
    }
}

fn write_findings(conn: &Connection, run_id: &str, findings: &[Finding]) -> AuditResult<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO finding (
             run_id, event_id, subject_id, username, member_number, first_name, last_name,
             activity_ts, channel, destination, label, explanation, verdict, contacts_json,
             suspicious_domain, parse_failure, raw_payload, finding_json
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
    )?;
    for f in findings {
        stmt.execute(params![
            run_id,
            f.event_id,
            f.subject_id,
            f.username,
            f.member_number,
            f.first_name,
            f.last_name,
            f.timestamp,
            f.channel.as_str(),
            f.destination,
            f.label.as_str(),
            f.explanation.map(|e| e.as_str()),
            f.verdict(),
            serde_json::to_string(&f.profile_contacts_considered)?,
            if f.suspicious_domain { 1 } else { 0 },
            f.parse_failure.as_ref().map(|p| p.to_string()),
            f.raw_payload,
            serde_json::to_string(f)?,
        ])?;
    }
    Ok(())
}
