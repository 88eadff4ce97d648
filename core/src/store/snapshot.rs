//! Input tables: bulk loaders used once per run, and insert helpers used
//! by the upstream hand-off (and by tests) to seed a snapshot database.

use super::AuditStore;
use crate::{
    error::{AuditError, AuditResult},
    snapshot::{AuditSnapshot, ContactChangeEvent, ContactRecord, RawDelivery, SubjectRef, SubjectRow},
    types::{ContactKind, Timestamp},
};
use rusqlite::params;

pub const OTP_EVENT_CATEGORY: &str = "OTP Authentication";

const CHANGE_CATEGORIES: [&str; 3] = [
    "Change Primary email",
    "Change Alternate email",
    "Change Phone Number",
];

impl AuditStore {
    // ── Bulk reads ─────────────────────────────────────────────────

    /// All four bulk reads in one go.
    pub fn load_snapshot(&self) -> AuditResult<AuditSnapshot> {
        let snapshot = AuditSnapshot {
            subjects: self.load_subjects()?,
            deliveries: self.load_delivery_events()?,
            contacts: self.load_contact_records()?,
            changes: self.load_contact_changes()?,
        };
        log::debug!(
            "snapshot: {} subjects, {} deliveries, {} contacts, {} changes",
            snapshot.subjects.len(),
            snapshot.deliveries.len(),
            snapshot.contacts.len(),
            snapshot.changes.len()
        );
        Ok(snapshot)
    }

    pub fn load_subjects(&self) -> AuditResult<Vec<SubjectRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT subject_id, username, member_number, first_name, last_name
             FROM subject ORDER BY subject_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(SubjectRow {
                subject_id: row.get(0)?,
                username: row.get(1)?,
                member_number: row.get(2)?,
                first_name: row.get(3)?,
                last_name: row.get(4)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn load_delivery_events(&self) -> AuditResult<Vec<RawDelivery>> {
        let mut stmt = self.conn.prepare(
            "SELECT event_id, subject_id, username, payload, activity_ts, ip_address
             FROM delivery_event WHERE event_category = ?1
             ORDER BY activity_ts ASC, event_id ASC",
        )?;
        let rows = stmt.query_map(params![OTP_EVENT_CATEGORY], |row| {
            Ok(RawDelivery {
                event_id: row.get(0)?,
                subject_id: row.get(1)?,
                username: row.get(2)?,
                payload: row.get(3)?,
                timestamp: row.get(4)?,
                ip_address: row.get(5)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn load_contact_records(&self) -> AuditResult<Vec<ContactRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, subject_id, username, kind, value, is_primary
             FROM contact_record ORDER BY id ASC",
        )?;
        let raw = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, i32>(5)? != 0,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(|(id, subject_id, username, kind, value, is_primary)| {
                let kind = ContactKind::parse(&kind).ok_or(AuditError::InvalidColumn {
                    column: "contact_record.kind",
                    value: kind.clone(),
                    row_id: id,
                })?;
                let subject = match (subject_id, username) {
                    (Some(id), _) => SubjectRef::Id(id),
                    (None, Some(username)) => SubjectRef::Username(username),
                    (None, None) => {
                        return Err(AuditError::InvalidColumn {
                            column: "contact_record.subject_id",
                            value: "NULL".into(),
                            row_id: id,
                        })
                    }
                };
                Ok(ContactRecord { subject, kind, value, is_primary })
            })
            .collect()
    }

    /// Presence set of contact changes. Categories that don't map to a
    /// contact kind are filtered out in SQL.
    pub fn load_contact_changes(&self) -> AuditResult<Vec<ContactChangeEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT subject_id, event_category, changed_at FROM contact_change
             WHERE event_category IN (?1, ?2, ?3)
             ORDER BY changed_at ASC, id ASC",
        )?;
        let rows = stmt
            .query_map(params![CHANGE_CATEGORIES[0], CHANGE_CATEGORIES[1], CHANGE_CATEGORIES[2]], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Timestamp>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows
            .into_iter()
            .filter_map(|(subject_id, category, changed_at)| {
                ContactKind::from_change_category(&category).map(|kind| ContactChangeEvent {
                    subject_id,
                    kind,
                    changed_at,
                })
            })
            .collect())
    }

    // ── Seeding ────────────────────────────────────────────────────

    pub fn insert_subject(&self, row: &SubjectRow) -> AuditResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO subject (subject_id, username, member_number, first_name, last_name)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![row.subject_id, row.username, row.member_number, row.first_name, row.last_name],
        )?;
        Ok(())
    }

    /// Insert an OTP delivery row; returns its event id.
    pub fn insert_delivery_event(
        &self,
        subject_id: Option<&str>,
        username: Option<&str>,
        payload: &str,
        activity_ts: Timestamp,
        ip_address: Option<&str>,
    ) -> AuditResult<i64> {
        self.insert_activity(OTP_EVENT_CATEGORY, subject_id, username, payload, activity_ts, ip_address)
    }

    /// Insert any activity-log row. Non-OTP categories are ignored by the loader.
    pub fn insert_activity(
        &self,
        event_category: &str,
        subject_id: Option<&str>,
        username: Option<&str>,
        payload: &str,
        activity_ts: Timestamp,
        ip_address: Option<&str>,
    ) -> AuditResult<i64> {
        self.conn.execute(
            "INSERT INTO delivery_event (subject_id, username, event_category, payload, activity_ts, ip_address)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![subject_id, username, event_category, payload, activity_ts, ip_address],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn insert_contact_record(&self, record: &ContactRecord) -> AuditResult<()> {
        let (subject_id, username) = match &record.subject {
            SubjectRef::Id(id) => (Some(id.as_str()), None),
            SubjectRef::Username(u) => (None, Some(u.as_str())),
        };
        self.conn.execute(
            "INSERT INTO contact_record (subject_id, username, kind, value, is_primary)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                subject_id,
                username,
                record.kind.as_str(),
                record.value,
                if record.is_primary { 1 } else { 0 }
            ],
        )?;
        Ok(())
    }

    pub fn insert_contact_change(
        &self,
        subject_id: &str,
        event_category: &str,
        changed_at: Timestamp,
    ) -> AuditResult<()> {
        self.conn.execute(
            "INSERT INTO contact_change (subject_id, event_category, changed_at)
             VALUES (?1, ?2, ?3)",
            params![subject_id, event_category, changed_at],
        )?;
        Ok(())
    }
}
