//! SQLite persistence for the civic knowledge base.
//!
//! One struct owns the connection; callers share it behind an `Arc`. The
//! connection sits behind a `std::sync::Mutex` and the lock is only ever held
//! across synchronous statements, never across an await point.
//!
//! Schema:
//! - verification_records: claim lifecycle (PENDING -> terminal judgment)
//! - information_requests: data-gap ledger, upserted by (topic, category, unanswered)
//! - threat_reports: citizen cyber-threat intake with reference backfill
//! - daily_statistics: one counter row per calendar day

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Mutex;

use crate::model::{
    truncate_topic, ClaimCategory, Confidence, DailyStats, InformationRequest, Priority,
    ThreatReport, ThreatStatus, ThreatType, VerificationRecord, VerificationStatus,
};

/// Reference numbers look like `CTR-2026-000042`.
const THREAT_REF_PREFIX: &str = "CTR";

/// SQLite-backed store shared by every tool handler
pub struct CivicDb {
    conn: Mutex<Connection>,
}

impl CivicDb {
    /// Open or create the database at a path (daemon use)
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .with_context(|| format!("opening database at {}", path.as_ref().display()))?;
        Self::init(conn)
    }

    /// In-memory database (tests)
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        // WAL for better concurrent access on real files; no-op in memory
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS verification_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                claim TEXT NOT NULL,
                category TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'PENDING',
                confidence TEXT,
                explanation TEXT,
                retrieval_response TEXT,
                sources TEXT,
                response_time_ms INTEGER,
                requester TEXT NOT NULL,
                created_at TEXT NOT NULL,
                verified_at TEXT
            );

            CREATE TABLE IF NOT EXISTS information_requests (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                topic TEXT NOT NULL,
                category TEXT NOT NULL,
                ministry TEXT,
                priority TEXT NOT NULL DEFAULT 'NORMAL',
                request_count INTEGER NOT NULL DEFAULT 1,
                was_answered INTEGER NOT NULL DEFAULT 0,
                is_data_gap INTEGER NOT NULL DEFAULT 1,
                first_requested TEXT NOT NULL,
                last_requested TEXT NOT NULL,
                last_requester TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_requests_key
                ON information_requests(topic, category, was_answered);

            CREATE TABLE IF NOT EXISTS threat_reports (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                threat_type TEXT NOT NULL,
                description TEXT NOT NULL,
                platform TEXT,
                amount_lost INTEGER,
                perpetrator_contact TEXT,
                date_occurred TEXT,
                is_urgent INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'PENDING',
                reference_number TEXT,
                reporter TEXT NOT NULL,
                evidence_ref TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_threats_contact
                ON threat_reports(perpetrator_contact);

            CREATE TABLE IF NOT EXISTS daily_statistics (
                day TEXT PRIMARY KEY,
                total_verifications INTEGER NOT NULL DEFAULT 0,
                verified_count INTEGER NOT NULL DEFAULT 0,
                false_count INTEGER NOT NULL DEFAULT 0,
                partially_true_count INTEGER NOT NULL DEFAULT 0,
                unverified_count INTEGER NOT NULL DEFAULT 0,
                total_threats INTEGER NOT NULL DEFAULT 0,
                urgent_threats INTEGER NOT NULL DEFAULT 0,
                total_amount_lost INTEGER NOT NULL DEFAULT 0,
                active_users INTEGER NOT NULL DEFAULT 0,
                new_users INTEGER NOT NULL DEFAULT 0,
                avg_response_time_ms INTEGER NOT NULL DEFAULT 0
            );
            "#,
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        // A poisoned lock means a panic mid-statement; propagating the
        // poison would take the whole daemon down for every later turn.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ========================================================================
    // Verification records
    // ========================================================================

    /// Persist a new claim in PENDING status. Returns the record id.
    #[allow(clippy::too_many_arguments)]
    pub fn insert_verification(
        &self,
        claim: &str,
        category: ClaimCategory,
        retrieval_response: Option<&str>,
        sources: Option<&str>,
        response_time_ms: Option<i64>,
        requester: &str,
    ) -> Result<i64> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO verification_records
                 (claim, category, status, retrieval_response, sources,
                  response_time_ms, requester, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                claim,
                category.as_str(),
                VerificationStatus::Pending.as_str(),
                retrieval_response,
                sources,
                response_time_ms,
                requester,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Set the terminal judgment on a record. The only writer of status and
    /// confidence after creation; re-invocation overwrites the judgment.
    /// Returns false when no record with that id exists.
    pub fn set_judgment(
        &self,
        id: i64,
        status: VerificationStatus,
        confidence: Confidence,
        explanation: Option<&str>,
    ) -> Result<bool> {
        let conn = self.lock();
        let changed = conn.execute(
            "UPDATE verification_records
             SET status = ?1, confidence = ?2, explanation = ?3, verified_at = ?4
             WHERE id = ?5",
            params![
                status.as_str(),
                confidence.as_str(),
                explanation,
                Utc::now().to_rfc3339(),
                id,
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn get_verification(&self, id: i64) -> Result<Option<VerificationRecord>> {
        let conn = self.lock();
        let record = conn
            .query_row(
                "SELECT id, claim, category, status, confidence, explanation,
                        retrieval_response, sources, response_time_ms, requester,
                        created_at, verified_at
                 FROM verification_records WHERE id = ?1",
                params![id],
                verification_from_row,
            )
            .optional()?;
        Ok(record)
    }

    // ========================================================================
    // Information requests / data gaps
    // ========================================================================

    /// Upsert an information request keyed by (topic, category, unanswered).
    ///
    /// A hit increments `request_count`, refreshes `last_requested`, and
    /// raises priority if the new request's priority is strictly higher;
    /// priority is never lowered. A miss inserts a fresh row with count 1.
    pub fn upsert_information_request(
        &self,
        topic: &str,
        category: ClaimCategory,
        priority: Priority,
        ministry: Option<&str>,
        requester: &str,
    ) -> Result<InformationRequest> {
        let topic = truncate_topic(topic);
        let now = Utc::now().to_rfc3339();

        let conn = self.lock();
        let tx = conn.unchecked_transaction()?;

        let existing: Option<(i64, String)> = tx
            .query_row(
                "SELECT id, priority FROM information_requests
                 WHERE topic = ?1 AND category = ?2 AND was_answered = 0",
                params![topic, category.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let id = match existing {
            Some((id, old_priority)) => {
                let old = Priority::from_str(&old_priority).unwrap_or(Priority::Normal);
                let raised = old.max(priority);
                tx.execute(
                    "UPDATE information_requests
                     SET request_count = request_count + 1,
                         priority = ?1,
                         last_requested = ?2,
                         last_requester = ?3
                     WHERE id = ?4",
                    params![raised.as_str(), now, requester, id],
                )?;
                id
            }
            None => {
                tx.execute(
                    "INSERT INTO information_requests
                         (topic, category, ministry, priority,
                          first_requested, last_requested, last_requester)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?6)",
                    params![topic, category.as_str(), ministry, priority.as_str(), now, requester],
                )?;
                tx.last_insert_rowid()
            }
        };

        let request = tx.query_row(
            "SELECT id, topic, category, ministry, priority, request_count,
                    was_answered, is_data_gap, first_requested, last_requested,
                    last_requester
             FROM information_requests WHERE id = ?1",
            params![id],
            information_request_from_row,
        )?;
        tx.commit()?;
        Ok(request)
    }

    // ========================================================================
    // Threat reports
    // ========================================================================

    /// Create a threat report and backfill its reference number
    /// (`CTR-<year>-<zero-padded id>`) in the same transaction.
    #[allow(clippy::too_many_arguments)]
    pub fn insert_threat_report(
        &self,
        threat_type: ThreatType,
        description: &str,
        platform: Option<&str>,
        amount_lost: Option<i64>,
        perpetrator_contact: Option<&str>,
        date_occurred: Option<&str>,
        is_urgent: bool,
        reporter: &str,
        evidence_ref: Option<&str>,
    ) -> Result<ThreatReport> {
        let status = if is_urgent {
            ThreatStatus::Urgent
        } else {
            ThreatStatus::Pending
        };
        let now = Utc::now();

        let conn = self.lock();
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO threat_reports
                 (threat_type, description, platform, amount_lost,
                  perpetrator_contact, date_occurred, is_urgent, status,
                  reporter, evidence_ref, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                threat_type.as_str(),
                description,
                platform,
                amount_lost,
                perpetrator_contact,
                date_occurred,
                is_urgent,
                status.as_str(),
                reporter,
                evidence_ref,
                now.to_rfc3339(),
            ],
        )?;
        let id = tx.last_insert_rowid();
        let reference = format!("{}-{}-{:06}", THREAT_REF_PREFIX, now.format("%Y"), id);
        tx.execute(
            "UPDATE threat_reports SET reference_number = ?1 WHERE id = ?2",
            params![reference, id],
        )?;

        let report = tx.query_row(
            "SELECT id, threat_type, description, platform, amount_lost,
                    perpetrator_contact, date_occurred, is_urgent, status,
                    reference_number, reporter, evidence_ref, created_at
             FROM threat_reports WHERE id = ?1",
            params![id],
            threat_from_row,
        )?;
        tx.commit()?;
        Ok(report)
    }

    /// Prior reports whose perpetrator contact contains the given string,
    /// newest first, capped at `limit`.
    pub fn threats_by_contact(&self, contact: &str, limit: usize) -> Result<Vec<ThreatReport>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, threat_type, description, platform, amount_lost,
                    perpetrator_contact, date_occurred, is_urgent, status,
                    reference_number, reporter, evidence_ref, created_at
             FROM threat_reports
             WHERE perpetrator_contact IS NOT NULL
               AND instr(perpetrator_contact, ?1) > 0
             ORDER BY id DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![contact, limit as i64], threat_from_row)?;
        let mut reports = Vec::new();
        for row in rows {
            reports.push(row?);
        }
        Ok(reports)
    }

    // ========================================================================
    // Daily statistics aggregator
    // ========================================================================

    /// Record one verification event against today's counter row.
    ///
    /// The daily total always increments. The outcome-specific column only
    /// increments when the status at event time is terminal; records created
    /// in PENDING bump the total alone, and the later judgment never
    /// re-increments. Per-status daily columns therefore undercount relative
    /// to the total; dashboards consuming these rows rely on that behavior.
    ///
    /// The running average uses the count from before this increment:
    /// `new_avg = round((old_avg * old_count + sample) / (old_count + 1))`.
    pub fn record_verification(
        &self,
        status: VerificationStatus,
        response_time_ms: Option<i64>,
    ) -> Result<()> {
        let day = today();
        let conn = self.lock();
        let tx = conn.unchecked_transaction()?;
        ensure_day_row(&tx, day)?;

        let (old_total, old_avg): (i64, i64) = tx.query_row(
            "SELECT total_verifications, avg_response_time_ms
             FROM daily_statistics WHERE day = ?1",
            params![day_key(day)],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let new_avg = match response_time_ms {
            Some(sample) => next_average(old_avg, old_total, sample),
            None => old_avg,
        };

        let outcome_col = match status {
            VerificationStatus::Verified => Some("verified_count"),
            VerificationStatus::False => Some("false_count"),
            VerificationStatus::PartiallyTrue => Some("partially_true_count"),
            VerificationStatus::Unverified => Some("unverified_count"),
            VerificationStatus::Pending => None,
        };

        tx.execute(
            "UPDATE daily_statistics
             SET total_verifications = total_verifications + 1,
                 avg_response_time_ms = ?1
             WHERE day = ?2",
            params![new_avg, day_key(day)],
        )?;
        if let Some(col) = outcome_col {
            // Column name comes from the closed match above, never from input
            tx.execute(
                &format!(
                    "UPDATE daily_statistics SET {col} = {col} + 1 WHERE day = ?1"
                ),
                params![day_key(day)],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Record one threat event against today's counter row.
    pub fn record_threat(&self, is_urgent: bool, amount_lost: Option<i64>) -> Result<()> {
        let day = today();
        let conn = self.lock();
        let tx = conn.unchecked_transaction()?;
        ensure_day_row(&tx, day)?;
        tx.execute(
            "UPDATE daily_statistics
             SET total_threats = total_threats + 1,
                 urgent_threats = urgent_threats + ?1,
                 total_amount_lost = total_amount_lost + ?2
             WHERE day = ?3",
            params![is_urgent as i64, amount_lost.unwrap_or(0), day_key(day)],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Record that a conversation session was created today. Counts the user
    /// as new when they have never appeared in the knowledge base before.
    pub fn record_session(&self, user_id: &str) -> Result<()> {
        let day = today();
        let conn = self.lock();
        let tx = conn.unchecked_transaction()?;
        ensure_day_row(&tx, day)?;

        let known: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM verification_records WHERE requester = ?1)
                 OR EXISTS(SELECT 1 FROM threat_reports WHERE reporter = ?1)",
            params![user_id],
            |row| row.get(0),
        )?;

        tx.execute(
            "UPDATE daily_statistics
             SET active_users = active_users + 1,
                 new_users = new_users + ?1
             WHERE day = ?2",
            params![(!known) as i64, day_key(day)],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Counter row for a given day, if any event has been recorded.
    pub fn daily_stats(&self, day: NaiveDate) -> Result<Option<DailyStats>> {
        let conn = self.lock();
        let stats = conn
            .query_row(
                "SELECT day, total_verifications, verified_count, false_count,
                        partially_true_count, unverified_count, total_threats,
                        urgent_threats, total_amount_lost, active_users,
                        new_users, avg_response_time_ms
                 FROM daily_statistics WHERE day = ?1",
                params![day_key(day)],
                |row| {
                    Ok(DailyStats {
                        day: NaiveDate::parse_from_str(&row.get::<_, String>(0)?, "%Y-%m-%d").ok(),
                        total_verifications: row.get(1)?,
                        verified_count: row.get(2)?,
                        false_count: row.get(3)?,
                        partially_true_count: row.get(4)?,
                        unverified_count: row.get(5)?,
                        total_threats: row.get(6)?,
                        urgent_threats: row.get(7)?,
                        total_amount_lost: row.get(8)?,
                        active_users: row.get(9)?,
                        new_users: row.get(10)?,
                        avg_response_time_ms: row.get(11)?,
                    })
                },
            )
            .optional()?;
        Ok(stats)
    }
}

/// Today in local time; daily rows truncate to local midnight.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn day_key(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

fn ensure_day_row(tx: &rusqlite::Transaction<'_>, day: NaiveDate) -> Result<()> {
    tx.execute(
        "INSERT OR IGNORE INTO daily_statistics (day) VALUES (?1)",
        params![day_key(day)],
    )?;
    Ok(())
}

/// Counter-dependent running average; `old_count` is the total from before
/// the increment this sample arrives with.
fn next_average(old_avg: i64, old_count: i64, sample: i64) -> i64 {
    let total = old_avg as f64 * old_count as f64 + sample as f64;
    (total / (old_count + 1) as f64).round() as i64
}

fn parse_ts(s: String) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn verification_from_row(row: &Row<'_>) -> rusqlite::Result<VerificationRecord> {
    Ok(VerificationRecord {
        id: row.get(0)?,
        claim: row.get(1)?,
        category: ClaimCategory::from_text(&row.get::<_, String>(2)?),
        status: VerificationStatus::from_str(&row.get::<_, String>(3)?)
            .unwrap_or(VerificationStatus::Pending),
        confidence: row
            .get::<_, Option<String>>(4)?
            .and_then(|s| Confidence::from_str(&s)),
        explanation: row.get(5)?,
        retrieval_response: row.get(6)?,
        sources: row.get(7)?,
        response_time_ms: row.get(8)?,
        requester: row.get(9)?,
        created_at: parse_ts(row.get(10)?).unwrap_or_else(Utc::now),
        verified_at: row.get::<_, Option<String>>(11)?.and_then(parse_ts),
    })
}

fn information_request_from_row(row: &Row<'_>) -> rusqlite::Result<InformationRequest> {
    Ok(InformationRequest {
        id: row.get(0)?,
        topic: row.get(1)?,
        category: ClaimCategory::from_text(&row.get::<_, String>(2)?),
        ministry: row.get(3)?,
        priority: Priority::from_str(&row.get::<_, String>(4)?).unwrap_or(Priority::Normal),
        request_count: row.get(5)?,
        was_answered: row.get(6)?,
        is_data_gap: row.get(7)?,
        first_requested: parse_ts(row.get(8)?).unwrap_or_else(Utc::now),
        last_requested: parse_ts(row.get(9)?).unwrap_or_else(Utc::now),
        last_requester: row.get(10)?,
    })
}

fn threat_from_row(row: &Row<'_>) -> rusqlite::Result<ThreatReport> {
    Ok(ThreatReport {
        id: row.get(0)?,
        threat_type: ThreatType::from_str(&row.get::<_, String>(1)?),
        description: row.get(2)?,
        platform: row.get(3)?,
        amount_lost: row.get(4)?,
        perpetrator_contact: row.get(5)?,
        date_occurred: row.get(6)?,
        is_urgent: row.get(7)?,
        status: ThreatStatus::from_str(&row.get::<_, String>(8)?).unwrap_or(ThreatStatus::Pending),
        reference_number: row.get(9)?,
        reporter: row.get(10)?,
        evidence_ref: row.get(11)?,
        created_at: parse_ts(row.get(12)?).unwrap_or_else(Utc::now),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verification_starts_pending_and_accepts_judgment() {
        let db = CivicDb::open_in_memory().unwrap();
        let id = db
            .insert_verification(
                "Government bans okada bikes",
                ClaimCategory::GovernmentPolicy,
                Some("No matching official content."),
                None,
                Some(420),
                "+2348012345678",
            )
            .unwrap();

        let record = db.get_verification(id).unwrap().unwrap();
        assert_eq!(record.status, VerificationStatus::Pending);
        assert!(record.confidence.is_none());

        let found = db
            .set_judgment(id, VerificationStatus::False, Confidence::High, Some("Debunked"))
            .unwrap();
        assert!(found);

        let record = db.get_verification(id).unwrap().unwrap();
        assert_eq!(record.status, VerificationStatus::False);
        assert_eq!(record.confidence, Some(Confidence::High));
        assert!(record.verified_at.is_some());

        assert!(!db
            .set_judgment(9999, VerificationStatus::Verified, Confidence::Low, None)
            .unwrap());
    }

    #[test]
    fn judgment_overwrite_is_idempotent_in_effect() {
        let db = CivicDb::open_in_memory().unwrap();
        let id = db
            .insert_verification("claim", ClaimCategory::Other, None, None, None, "u")
            .unwrap();
        db.set_judgment(id, VerificationStatus::Unverified, Confidence::Low, None)
            .unwrap();
        db.set_judgment(id, VerificationStatus::Verified, Confidence::Medium, None)
            .unwrap();
        let record = db.get_verification(id).unwrap().unwrap();
        assert_eq!(record.status, VerificationStatus::Verified);
        assert_eq!(record.confidence, Some(Confidence::Medium));
    }

    #[test]
    fn information_request_upsert_increments_instead_of_duplicating() {
        let db = CivicDb::open_in_memory().unwrap();
        let first = db
            .upsert_information_request(
                "fuel subsidy removal timeline",
                ClaimCategory::Economy,
                Priority::Normal,
                None,
                "userA",
            )
            .unwrap();
        assert_eq!(first.request_count, 1);
        assert!(first.is_data_gap);
        assert!(!first.was_answered);

        let second = db
            .upsert_information_request(
                "fuel subsidy removal timeline",
                ClaimCategory::Economy,
                Priority::Urgent,
                Some("Ministry of Petroleum"),
                "userB",
            )
            .unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.request_count, 2);
        assert_eq!(second.priority, Priority::Urgent);
        assert_eq!(second.last_requester.as_deref(), Some("userB"));

        // Priority never goes back down
        let third = db
            .upsert_information_request(
                "fuel subsidy removal timeline",
                ClaimCategory::Economy,
                Priority::Normal,
                None,
                "userC",
            )
            .unwrap();
        assert_eq!(third.priority, Priority::Urgent);
        assert_eq!(third.request_count, 3);
    }

    #[test]
    fn same_topic_different_category_is_a_new_row() {
        let db = CivicDb::open_in_memory().unwrap();
        let a = db
            .upsert_information_request("curfew hours", ClaimCategory::Security, Priority::Normal, None, "u")
            .unwrap();
        let b = db
            .upsert_information_request("curfew hours", ClaimCategory::Health, Priority::Normal, None, "u")
            .unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn long_topics_collapse_onto_one_row() {
        let db = CivicDb::open_in_memory().unwrap();
        let long: String = "a".repeat(400);
        let first = db
            .upsert_information_request(&long, ClaimCategory::Other, Priority::Normal, None, "u")
            .unwrap();
        let second = db
            .upsert_information_request(&long, ClaimCategory::Other, Priority::Normal, None, "u")
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.request_count, 2);
    }

    #[test]
    fn threat_reference_number_is_backfilled() {
        let db = CivicDb::open_in_memory().unwrap();
        let report = db
            .insert_threat_report(
                ThreatType::Phishing,
                "Fake bank SMS asking for OTP",
                Some("SMS"),
                None,
                Some("+2348099999999"),
                None,
                false,
                "reporter",
                None,
            )
            .unwrap();
        let year = Utc::now().format("%Y").to_string();
        assert_eq!(
            report.reference_number.as_deref(),
            Some(format!("CTR-{}-{:06}", year, report.id).as_str())
        );
        assert_eq!(report.status, ThreatStatus::Pending);

        let urgent = db
            .insert_threat_report(
                ThreatType::FinancialFraud,
                "Investment scam",
                Some("WhatsApp"),
                Some(500_000),
                None,
                None,
                true,
                "reporter",
                None,
            )
            .unwrap();
        assert_eq!(urgent.status, ThreatStatus::Urgent);
    }

    #[test]
    fn threats_by_contact_matches_substring_newest_first() {
        let db = CivicDb::open_in_memory().unwrap();
        for i in 0..7 {
            db.insert_threat_report(
                ThreatType::FinancialFraud,
                &format!("report {i}"),
                None,
                None,
                Some("+2348055555555"),
                None,
                false,
                "r",
                None,
            )
            .unwrap();
        }
        db.insert_threat_report(
            ThreatType::Phishing,
            "unrelated",
            None,
            None,
            Some("+2347011111111"),
            None,
            false,
            "r",
            None,
        )
        .unwrap();

        let matches = db.threats_by_contact("8055555555", 5).unwrap();
        assert_eq!(matches.len(), 5);
        assert!(matches[0].id > matches[4].id);
        assert!(db.threats_by_contact("0000000", 5).unwrap().is_empty());
    }

    #[test]
    fn running_average_uses_pre_increment_count() {
        let db = CivicDb::open_in_memory().unwrap();
        db.record_verification(VerificationStatus::Pending, Some(100))
            .unwrap();
        db.record_verification(VerificationStatus::Pending, Some(300))
            .unwrap();
        let stats = db.daily_stats(today()).unwrap().unwrap();
        assert_eq!(stats.avg_response_time_ms, 200);
        assert_eq!(stats.total_verifications, 2);
    }

    #[test]
    fn pending_bumps_total_but_no_outcome_column() {
        let db = CivicDb::open_in_memory().unwrap();
        db.record_verification(VerificationStatus::Pending, None).unwrap();
        db.record_verification(VerificationStatus::False, None).unwrap();
        let stats = db.daily_stats(today()).unwrap().unwrap();
        assert_eq!(stats.total_verifications, 2);
        assert_eq!(stats.false_count, 1);
        assert_eq!(stats.verified_count, 0);
        assert_eq!(stats.unverified_count, 0);
    }

    #[test]
    fn threat_counters_and_amounts_accumulate() {
        let db = CivicDb::open_in_memory().unwrap();
        db.record_threat(true, Some(500_000)).unwrap();
        db.record_threat(true, Some(250_000)).unwrap();
        db.record_threat(false, None).unwrap();
        let stats = db.daily_stats(today()).unwrap().unwrap();
        assert_eq!(stats.total_threats, 3);
        assert_eq!(stats.urgent_threats, 2);
        assert_eq!(stats.total_amount_lost, 750_000);
    }

    #[test]
    fn session_recording_tracks_new_and_returning_users() {
        let db = CivicDb::open_in_memory().unwrap();
        db.record_session("+2348012345678").unwrap();
        let stats = db.daily_stats(today()).unwrap().unwrap();
        assert_eq!(stats.active_users, 1);
        assert_eq!(stats.new_users, 1);

        db.insert_verification("c", ClaimCategory::Other, None, None, None, "+2348012345678")
            .unwrap();
        db.record_session("+2348012345678").unwrap();
        let stats = db.daily_stats(today()).unwrap().unwrap();
        assert_eq!(stats.active_users, 2);
        assert_eq!(stats.new_users, 1);
    }

    #[test]
    fn reopening_the_database_preserves_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("civica.db");
        let id = {
            let db = CivicDb::open_at(&path).unwrap();
            db.insert_verification("claim", ClaimCategory::Health, None, None, None, "u")
                .unwrap()
        };
        let db = CivicDb::open_at(&path).unwrap();
        let record = db.get_verification(id).unwrap().unwrap();
        assert_eq!(record.claim, "claim");
    }

    #[test]
    fn average_formula_rounds() {
        assert_eq!(next_average(0, 0, 100), 100);
        assert_eq!(next_average(100, 1, 300), 200);
        assert_eq!(next_average(100, 2, 101), 100);
    }
}
