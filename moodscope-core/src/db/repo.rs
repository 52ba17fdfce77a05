//! Database repository layer
//!
//! Query and mutation operations for journal entries, mood digests, and
//! the subscriber mirror.

use crate::error::Result;
use crate::types::*;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::PathBuf;
use std::sync::Mutex;

/// Database handle with connection pooling (single connection for now)
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &PathBuf) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // Enable foreign keys and WAL mode for better concurrency
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -64000;  -- 64MB cache
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        super::schema::run_migrations(&conn)
    }

    // ============================================
    // Journal entry operations
    // ============================================

    /// Insert a journal entry row.
    ///
    /// Entry writes belong to the journaling subsystem; the aggregation
    /// engine only ever reads. Returns the new row ID.
    pub fn insert_entry(&self, entry: &NewJournalEntry) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO journal_entries (user_id, entry_date, mood_score, factors, free_text, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                entry.user_id,
                entry.entry_date.format("%Y-%m-%d").to_string(),
                entry.mood_score,
                serde_json::to_string(entry.factors)?,
                entry.free_text,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Mark a journal entry as deleted without removing the row.
    pub fn soft_delete_entry(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE journal_entries SET deleted_at = ?1 WHERE id = ?2",
            params![Utc::now().to_rfc3339(), id],
        )?;
        Ok(())
    }

    /// Fetch a user's entries within an inclusive date range, oldest first.
    ///
    /// Soft-deleted rows are excluded. Rows for the same date keep insertion
    /// order so the merge tie-break ("first non-null mood wins") is stable.
    pub fn entries_in_range(
        &self,
        user_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<JournalEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT id, user_id, entry_date, mood_score, factors, free_text, created_at, deleted_at
            FROM journal_entries
            WHERE user_id = ?1
              AND entry_date >= ?2
              AND entry_date <= ?3
              AND deleted_at IS NULL
            ORDER BY entry_date ASC, id ASC
            "#,
        )?;

        let entries = stmt
            .query_map(
                params![
                    user_id,
                    from.format("%Y-%m-%d").to_string(),
                    to.format("%Y-%m-%d").to_string(),
                ],
                row_to_entry,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    // ============================================
    // Digest operations
    // ============================================

    /// Look up the digest for one exact (user, year, month, week_index).
    pub fn get_digest(
        &self,
        user_id: &str,
        year: i32,
        month: u32,
        week_index: u32,
    ) -> Result<Option<MoodDigest>> {
        let conn = self.conn.lock().unwrap();
        let digest = conn
            .query_row(
                &format!(
                    "SELECT {DIGEST_COLUMNS} FROM mood_digests
                     WHERE user_id = ?1 AND year = ?2 AND month = ?3 AND week_index = ?4"
                ),
                params![user_id, year, month, week_index],
                row_to_digest,
            )
            .optional()?;
        Ok(digest)
    }

    /// Insert or update a digest keyed by its natural tuple.
    ///
    /// On conflict the content, window fields, and `updated_at` are
    /// replaced; `created_at` keeps the first generation time. Returns the
    /// stored row.
    pub fn upsert_digest(&self, digest: &NewDigest) -> Result<MoodDigest> {
        let now = Utc::now().to_rfc3339();
        {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                r#"
                INSERT INTO mood_digests (
                    user_id, year, month, week_index, days_analyzed, is_final, status,
                    overview, positive_trends, decline_reasons, recommendations,
                    reflection_prompts, full_text, created_at, updated_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)
                ON CONFLICT(user_id, year, month, week_index) DO UPDATE SET
                    days_analyzed = excluded.days_analyzed,
                    is_final = excluded.is_final,
                    status = excluded.status,
                    overview = excluded.overview,
                    positive_trends = excluded.positive_trends,
                    decline_reasons = excluded.decline_reasons,
                    recommendations = excluded.recommendations,
                    reflection_prompts = excluded.reflection_prompts,
                    full_text = excluded.full_text,
                    updated_at = excluded.updated_at
                "#,
                params![
                    digest.user_id,
                    digest.year,
                    digest.month,
                    digest.week_index,
                    digest.days_analyzed,
                    digest.is_final,
                    digest.status.as_str(),
                    digest.sections.overview,
                    digest.sections.positive_trends,
                    digest.sections.decline_reasons,
                    digest.sections.recommendations,
                    digest.sections.reflection_prompts,
                    digest.full_text,
                    now,
                ],
            )?;
        }

        let stored = {
            let conn = self.conn.lock().unwrap();
            conn.query_row(
                &format!(
                    "SELECT {DIGEST_COLUMNS} FROM mood_digests
                     WHERE user_id = ?1 AND year = ?2 AND month = ?3 AND week_index = ?4"
                ),
                params![digest.user_id, digest.year, digest.month, digest.week_index],
                row_to_digest,
            )?
        };
        Ok(stored)
    }

    /// The digest a reader should see for a month: the final one if it
    /// exists, else the highest week index, else none.
    pub fn latest_digest(
        &self,
        user_id: &str,
        year: i32,
        month: u32,
    ) -> Result<Option<MoodDigest>> {
        let conn = self.conn.lock().unwrap();
        let digest = conn
            .query_row(
                &format!(
                    "SELECT {DIGEST_COLUMNS} FROM mood_digests
                     WHERE user_id = ?1 AND year = ?2 AND month = ?3
                     ORDER BY is_final DESC, week_index DESC
                     LIMIT 1"
                ),
                params![user_id, year, month],
                row_to_digest,
            )
            .optional()?;
        Ok(digest)
    }

    /// All digests for a month, oldest week first.
    pub fn list_digests(&self, user_id: &str, year: i32, month: u32) -> Result<Vec<MoodDigest>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {DIGEST_COLUMNS} FROM mood_digests
             WHERE user_id = ?1 AND year = ?2 AND month = ?3
             ORDER BY week_index ASC"
        ))?;

        let digests = stmt
            .query_map(params![user_id, year, month], row_to_digest)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(digests)
    }

    // ============================================
    // Subscriber operations
    // ============================================

    /// Insert or update a subscriber mirror row.
    pub fn upsert_subscriber(&self, subscriber: &Subscriber) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO subscribers (user_id, tier, active, started_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(user_id) DO UPDATE SET
                tier = excluded.tier,
                active = excluded.active,
                started_at = excluded.started_at
            "#,
            params![
                subscriber.user_id,
                subscriber.tier.as_str(),
                subscriber.active,
                subscriber.started_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// User IDs with an active paid subscription, in stable order.
    pub fn paid_active_user_ids(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT user_id FROM subscribers
             WHERE active = 1 AND tier = ?1
             ORDER BY user_id ASC",
        )?;

        let ids = stmt
            .query_map(params![SubscriptionTier::Premium.as_str()], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(ids)
    }

    // ============================================
    // Month statistics
    // ============================================

    /// Aggregate mood statistics for a user over an inclusive date range.
    pub fn month_stats(
        &self,
        user_id: &str,
        from: NaiveDate,
        to: NaiveDate,
        top_factors: usize,
    ) -> Result<MonthStats> {
        let conn = self.conn.lock().unwrap();
        let from_str = from.format("%Y-%m-%d").to_string();
        let to_str = to.format("%Y-%m-%d").to_string();

        let (total_entries, scored_entries, average_mood): (i64, i64, Option<f64>) = conn
            .query_row(
                r#"
                SELECT
                    COUNT(*),
                    COUNT(mood_score),
                    AVG(CAST(mood_score AS REAL))
                FROM journal_entries
                WHERE user_id = ?1
                  AND entry_date >= ?2
                  AND entry_date <= ?3
                  AND deleted_at IS NULL
                "#,
                params![user_id, from_str, to_str],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )?;

        let mut stmt = conn.prepare(
            r#"
            SELECT je.value AS factor, COUNT(*) AS cnt
            FROM journal_entries e, json_each(e.factors) je
            WHERE e.user_id = ?1
              AND e.entry_date >= ?2
              AND e.entry_date <= ?3
              AND e.deleted_at IS NULL
            GROUP BY je.value
            ORDER BY cnt DESC, factor ASC
            LIMIT ?4
            "#,
        )?;

        let factors = stmt
            .query_map(
                params![user_id, from_str, to_str, top_factors as i64],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
            )?
            .filter_map(|r| r.ok())
            .collect();

        Ok(MonthStats {
            total_entries,
            scored_entries,
            average_mood,
            top_factors: factors,
        })
    }
}

/// Digest column list shared by every digest SELECT so mappers stay in sync.
const DIGEST_COLUMNS: &str = "id, user_id, year, month, week_index, days_analyzed, is_final, \
     status, overview, positive_trends, decline_reasons, recommendations, \
     reflection_prompts, full_text, created_at, updated_at";

// ============================================
// Row mappers
// ============================================

fn row_to_entry(row: &Row) -> rusqlite::Result<JournalEntry> {
    let entry_date: String = row.get(2)?;
    let factors: String = row.get(4)?;
    let created_at: String = row.get(6)?;
    let deleted_at: Option<String> = row.get(7)?;

    Ok(JournalEntry {
        id: row.get(0)?,
        user_id: row.get(1)?,
        entry_date: NaiveDate::parse_from_str(&entry_date, "%Y-%m-%d").unwrap_or_default(),
        mood_score: row.get(3)?,
        factors: serde_json::from_str(&factors).unwrap_or_default(),
        free_text: row.get(5)?,
        created_at: parse_timestamp(&created_at),
        deleted_at: deleted_at.as_deref().map(parse_timestamp),
    })
}

fn row_to_digest(row: &Row) -> rusqlite::Result<MoodDigest> {
    let status: String = row.get(7)?;
    let created_at: String = row.get(14)?;
    let updated_at: String = row.get(15)?;

    Ok(MoodDigest {
        id: row.get(0)?,
        user_id: row.get(1)?,
        year: row.get(2)?,
        month: row.get(3)?,
        week_index: row.get(4)?,
        days_analyzed: row.get(5)?,
        is_final: row.get(6)?,
        status: status.parse().unwrap_or(DigestStatus::Completed),
        sections: DigestSections {
            overview: row.get(8)?,
            positive_trends: row.get(9)?,
            decline_reasons: row.get(10)?,
            recommendations: row.get(11)?,
            reflection_prompts: row.get(12)?,
        },
        full_text: row.get(13)?,
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
