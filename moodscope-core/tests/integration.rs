//! Integration tests for the digest pipeline
//!
//! These tests drive the public API end-to-end: window calculation, the
//! generation engine, and the subscriber sweep, against a real SQLite file
//! with a scripted summarizer standing in for the LLM provider.

use chrono::NaiveDate;
use moodscope_core::config::DigestConfig;
use moodscope_core::digest::{DigestOutcome, GenerateIntent, SkipReason};
use moodscope_core::error::{Error, Result};
use moodscope_core::summarizer::SummaryClient;
use moodscope_core::types::{NewJournalEntry, Subscriber, SubscriptionTier};
use moodscope_core::{Database, DigestEngine, MonthWindow, SweepRunner};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const FIVE_PARAGRAPHS: &str = "The month held steady overall.\n\nYour walks kept coming back as bright spots.\n\nShort nights preceded most dips.\n\nTry closing the day before midnight this week.\n\nWhat would an easier Monday look like?";

/// Scripted summarizer that records every prompt it receives.
struct ScriptedSummarizer {
    response: &'static str,
    fail: bool,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl SummaryClient for ScriptedSummarizer {
    fn summarize(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if self.fail {
            Err(Error::Summarizer("upstream timed out".to_string()))
        } else {
            Ok(self.response.to_string())
        }
    }
}

fn scripted_engine(fail: bool) -> (DigestEngine, Arc<Mutex<Vec<String>>>) {
    let prompts = Arc::new(Mutex::new(Vec::new()));
    let engine = DigestEngine::new(Box::new(ScriptedSummarizer {
        response: FIVE_PARAGRAPHS,
        fail,
        prompts: prompts.clone(),
    }));
    (engine, prompts)
}

fn open_db(dir: &TempDir) -> Database {
    let db = Database::open(&dir.path().join("test.db")).expect("database should open");
    db.migrate().expect("migrations should run");
    db
}

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

fn seed_entry(
    db: &Database,
    user: &str,
    day: NaiveDate,
    mood: Option<i32>,
    factors: &[&str],
    text: Option<&str>,
) {
    let factors: Vec<String> = factors.iter().map(|f| f.to_string()).collect();
    db.insert_entry(&NewJournalEntry {
        user_id: user,
        entry_date: day,
        mood_score: mood,
        factors: &factors,
        free_text: text,
    })
    .expect("entry insert should succeed");
}

fn seed_subscriber(db: &Database, user: &str) {
    db.upsert_subscriber(&Subscriber {
        user_id: user.to_string(),
        tier: SubscriptionTier::Premium,
        active: true,
        started_at: chrono::Utc::now(),
    })
    .expect("subscriber insert should succeed");
}

fn batch_config() -> DigestConfig {
    DigestConfig {
        interactive_min_entries: 1,
        sweep_min_entries: 3,
        sweep_retries: 1,
        sweep_token: None,
    }
}

// ============================================
// Window Calculation
// ============================================

#[test]
fn test_leap_year_month_end_is_final() {
    let window = MonthWindow::compute(2024, 2, date(2024, 2, 29)).expect("valid window");
    assert_eq!(window.days_elapsed, 29);
    assert_eq!(window.week_index, 5);
    assert!(window.is_final);
}

// ============================================
// Engine Decisions
// ============================================

#[test]
fn test_interactive_generates_where_batch_skips() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);
    let (engine, _) = scripted_engine(false);

    // Two scored days in March, viewed from the 10th
    seed_entry(&db, "u1", date(2025, 3, 1), Some(4), &[], Some("fresh start"));
    seed_entry(&db, "u1", date(2025, 3, 8), Some(2), &[], Some("slow day"));

    // Batch threshold (3) skips
    let batch = engine
        .generate_or_skip(
            &db,
            "u1",
            2025,
            3,
            date(2025, 3, 10),
            GenerateIntent::IfMissing,
            3,
        )
        .expect("batch attempt should not error");
    assert!(matches!(
        batch,
        DigestOutcome::Skipped(SkipReason::InsufficientData { .. })
    ));
    assert!(db.list_digests("u1", 2025, 3).unwrap().is_empty());

    // Interactive threshold (1) generates
    let interactive = engine
        .generate_or_skip(
            &db,
            "u1",
            2025,
            3,
            date(2025, 3, 10),
            GenerateIntent::Force,
            1,
        )
        .expect("interactive attempt should not error");
    let digest = match interactive {
        DigestOutcome::Generated(d) => d,
        other => panic!("expected Generated, got {other:?}"),
    };
    assert_eq!(digest.days_analyzed, 10);
    assert_eq!(digest.week_index, 2);
    assert!(!digest.is_final);
    assert_eq!(digest.sections.overview, "The month held steady overall.");
}

#[test]
fn test_merged_day_reaches_summarizer_as_one_line() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);
    let (engine, prompts) = scripted_engine(false);

    // Two physical rows for the same day: a scored note and a tagged
    // voice-note transcription without a score
    seed_entry(&db, "u1", date(2025, 3, 4), Some(3), &[], Some("slept badly"));
    seed_entry(&db, "u1", date(2025, 3, 4), None, &["stress"], None);

    engine
        .generate_or_skip(
            &db,
            "u1",
            2025,
            3,
            date(2025, 3, 10),
            GenerateIntent::IfMissing,
            1,
        )
        .expect("generation should succeed");

    let prompts = prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(
        prompts[0].contains("2025-03-04 mood 3/5 [stress]: slept badly"),
        "merged day should appear once with the first mood and unioned factors:\n{}",
        prompts[0]
    );
}

#[test]
fn test_failed_summary_leaves_no_trace() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);
    let (engine, _) = scripted_engine(true);

    seed_entry(&db, "u1", date(2025, 3, 1), Some(4), &[], Some("note"));

    let err = engine
        .generate_or_skip(
            &db,
            "u1",
            2025,
            3,
            date(2025, 3, 10),
            GenerateIntent::Force,
            1,
        )
        .expect_err("summarizer failure should surface");
    assert!(matches!(err, Error::Summarizer(_)));
    assert!(
        db.latest_digest("u1", 2025, 3).unwrap().is_none(),
        "no record may exist after a failed attempt"
    );
}

// ============================================
// Sweep Pipeline
// ============================================

#[test]
fn test_sweep_twice_in_a_day_generates_once() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);
    let (engine, prompts) = scripted_engine(false);

    seed_subscriber(&db, "u1");
    for day in [1, 3, 5, 8] {
        seed_entry(&db, "u1", date(2025, 3, day), Some(3), &[], Some("entry"));
    }

    let runner = SweepRunner::new(&batch_config());

    let first = runner
        .run(&engine, &db, &db, date(2025, 3, 10))
        .expect("first sweep should run");
    assert_eq!(first.generated, 1);
    assert_eq!(first.already_covered, 0);

    let second = runner
        .run(&engine, &db, &db, date(2025, 3, 10))
        .expect("second sweep should run");
    assert_eq!(second.generated, 0);
    assert_eq!(second.already_covered, 1);

    assert_eq!(prompts.lock().unwrap().len(), 1, "only one provider call");
    assert_eq!(db.list_digests("u1", 2025, 3).unwrap().len(), 1);
}

#[test]
fn test_month_of_weekly_sweeps_reaches_final_record() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);
    let (engine, _) = scripted_engine(false);

    seed_subscriber(&db, "u1");
    for day in [2, 9, 16, 23] {
        seed_entry(&db, "u1", date(2025, 3, day), Some(4), &["sleep"], Some("entry"));
    }

    let runner = SweepRunner::new(&batch_config());

    // Cron fires weekly, then once more on the month's last day
    let mut last_days = 0;
    for day in [7u32, 14, 21, 28, 31] {
        let report = runner
            .run(&engine, &db, &db, date(2025, 3, day))
            .expect("sweep should run");
        assert_eq!(report.failed, 0);

        let latest = db.latest_digest("u1", 2025, 3).unwrap().unwrap();
        assert!(latest.days_analyzed >= last_days, "coverage never shrinks");
        last_days = latest.days_analyzed;
    }

    let latest = db.latest_digest("u1", 2025, 3).unwrap().unwrap();
    assert!(latest.is_final);
    assert_eq!(latest.days_analyzed, 31);
    assert_eq!(db.list_digests("u1", 2025, 3).unwrap().len(), 5);
}

#[test]
fn test_sweep_only_touches_paid_active_users() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);
    let (engine, _) = scripted_engine(false);

    seed_subscriber(&db, "paid");
    db.upsert_subscriber(&Subscriber {
        user_id: "free".to_string(),
        tier: SubscriptionTier::Free,
        active: true,
        started_at: chrono::Utc::now(),
    })
    .unwrap();
    for user in ["paid", "free"] {
        for day in [1, 2, 3] {
            seed_entry(&db, user, date(2025, 3, day), Some(3), &[], Some("entry"));
        }
    }

    let runner = SweepRunner::new(&batch_config());
    let report = runner
        .run(&engine, &db, &db, date(2025, 3, 10))
        .expect("sweep should run");

    assert_eq!(report.users_considered, 1);
    assert_eq!(report.generated, 1);
    assert!(db.latest_digest("paid", 2025, 3).unwrap().is_some());
    assert!(db.latest_digest("free", 2025, 3).unwrap().is_none());
}
