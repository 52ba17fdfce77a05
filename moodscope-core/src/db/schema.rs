//! Database schema and migrations
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.

use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: Initial schema
    r#"
    -- ============================================
    -- Mirrored journaling data (read-only here)
    -- ============================================

    CREATE TABLE IF NOT EXISTS journal_entries (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id     TEXT NOT NULL,
        entry_date  TEXT NOT NULL,      -- YYYY-MM-DD
        mood_score  INTEGER,            -- 1..5, NULL when unscored
        factors     JSON NOT NULL DEFAULT '[]',
        free_text   TEXT,
        created_at  DATETIME NOT NULL,
        deleted_at  DATETIME            -- soft deletion; set rows are invisible
    );

    CREATE INDEX IF NOT EXISTS idx_journal_entries_user_date
        ON journal_entries(user_id, entry_date);

    -- ============================================
    -- Derived analytics (regenerable)
    -- ============================================

    CREATE TABLE IF NOT EXISTS mood_digests (
        id                 INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id            TEXT NOT NULL,
        year               INTEGER NOT NULL,
        month              INTEGER NOT NULL,
        week_index         INTEGER NOT NULL,
        days_analyzed      INTEGER NOT NULL,
        is_final           INTEGER NOT NULL DEFAULT 0,
        status             TEXT NOT NULL,

        overview           TEXT NOT NULL DEFAULT '',
        positive_trends    TEXT NOT NULL DEFAULT '',
        decline_reasons    TEXT NOT NULL DEFAULT '',
        recommendations    TEXT NOT NULL DEFAULT '',
        reflection_prompts TEXT NOT NULL DEFAULT '',
        full_text          TEXT NOT NULL DEFAULT '',

        created_at         DATETIME NOT NULL,
        updated_at         DATETIME NOT NULL,

        -- Natural key; concurrent generation for the same window resolves
        -- to one row via upsert-on-conflict
        UNIQUE (user_id, year, month, week_index)
    );

    CREATE INDEX IF NOT EXISTS idx_mood_digests_user_month
        ON mood_digests(user_id, year, month);

    -- ============================================
    -- Mirrored billing state (sweep population)
    -- ============================================

    CREATE TABLE IF NOT EXISTS subscribers (
        user_id     TEXT PRIMARY KEY,
        tier        TEXT NOT NULL,
        active      INTEGER NOT NULL DEFAULT 0,
        started_at  DATETIME NOT NULL
    );
    "#,
];

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> crate::error::Result<()> {
    let current_version: i32 = conn
        .query_row("PRAGMA user_version", [], |r| r.get(0))
        .unwrap_or(0);

    tracing::info!(
        current_version,
        target_version = SCHEMA_VERSION,
        "Checking database migrations"
    );

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::info!(version, "Running migration");
            conn.execute_batch(migration)?;
            conn.execute(&format!("PRAGMA user_version = {}", version), [])?;
        }
    }

    if current_version < SCHEMA_VERSION {
        tracing::info!(
            from = current_version,
            to = SCHEMA_VERSION,
            "Migrations complete"
        );
    }

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> crate::error::Result<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    Ok(version)
}
