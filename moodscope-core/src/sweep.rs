//! Monthly digest sweep
//!
//! Walks every active paid subscriber and brings the current month's
//! digest up to date. One user's failure never stops the run; failures are
//! counted and reported. Re-running on the same day is a no-op for users
//! already covered, so the sweep can sit safely behind cron.

use crate::config::DigestConfig;
use crate::db::Database;
use crate::digest::{DigestEngine, DigestOutcome, GenerateIntent, SkipReason};
use crate::error::{Error, Result};
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

/// Source of the user population a sweep covers (allows mocking in tests)
pub trait SubscriberDirectory {
    fn eligible_user_ids(&self) -> Result<Vec<String>>;
}

impl SubscriberDirectory for Database {
    fn eligible_user_ids(&self) -> Result<Vec<String>> {
        self.paid_active_user_ids()
    }
}

/// Outcome counts for one sweep run
#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    /// Correlation ID stamped on every log line of the run
    pub run_id: String,
    pub as_of: NaiveDate,
    pub users_considered: usize,
    pub generated: usize,
    pub already_covered: usize,
    pub insufficient_data: usize,
    pub awaiting_first_day: usize,
    pub failed: usize,
    /// (user_id, error) per failed user, in processing order
    pub errors: Vec<(String, String)>,
}

impl SweepReport {
    pub fn skipped(&self) -> usize {
        self.already_covered + self.insufficient_data + self.awaiting_first_day
    }
}

/// Drives one digest attempt per eligible user for the month `as_of`
/// falls in.
pub struct SweepRunner {
    min_scored_days: usize,
    retries: usize,
}

impl SweepRunner {
    pub fn new(config: &DigestConfig) -> Self {
        Self {
            min_scored_days: config.sweep_min_entries,
            retries: config.sweep_retries,
        }
    }

    /// Run the sweep sequentially over the directory's users.
    ///
    /// Only enumerating the population can fail; per-user errors land in
    /// the report instead.
    pub fn run(
        &self,
        engine: &DigestEngine,
        db: &Database,
        subscribers: &dyn SubscriberDirectory,
        as_of: NaiveDate,
    ) -> Result<SweepReport> {
        let run_id = Uuid::new_v4().to_string();
        let year = as_of.year();
        let month = as_of.month();
        let user_ids = subscribers.eligible_user_ids()?;

        info!(
            run_id = %run_id,
            %as_of,
            users = user_ids.len(),
            "digest sweep started"
        );

        let mut report = SweepReport {
            run_id: run_id.clone(),
            as_of,
            users_considered: user_ids.len(),
            generated: 0,
            already_covered: 0,
            insufficient_data: 0,
            awaiting_first_day: 0,
            failed: 0,
            errors: Vec::new(),
        };

        for user_id in &user_ids {
            match self.attempt_user(engine, db, user_id, year, month, as_of) {
                Ok(DigestOutcome::Generated(_)) => report.generated += 1,
                Ok(DigestOutcome::Skipped(SkipReason::AlreadyExists)) => {
                    report.already_covered += 1
                }
                Ok(DigestOutcome::Skipped(SkipReason::InsufficientData { .. })) => {
                    report.insufficient_data += 1
                }
                Ok(DigestOutcome::Skipped(SkipReason::NoElapsedDays)) => {
                    report.awaiting_first_day += 1
                }
                Err(e) => {
                    warn!(run_id = %run_id, user_id = %user_id, error = %e, "sweep user failed");
                    report.failed += 1;
                    report.errors.push((user_id.clone(), e.to_string()));
                }
            }
        }

        info!(
            run_id = %run_id,
            generated = report.generated,
            skipped = report.skipped(),
            failed = report.failed,
            "digest sweep finished"
        );

        Ok(report)
    }

    fn attempt_user(
        &self,
        engine: &DigestEngine,
        db: &Database,
        user_id: &str,
        year: i32,
        month: u32,
        as_of: NaiveDate,
    ) -> Result<DigestOutcome> {
        let mut attempt = 0;
        loop {
            match engine.generate_or_skip(
                db,
                user_id,
                year,
                month,
                as_of,
                GenerateIntent::IfMissing,
                self.min_scored_days,
            ) {
                Err(e) if attempt < self.retries && is_retryable(&e) => {
                    attempt += 1;
                    warn!(user_id, error = %e, attempt, "retrying digest generation");
                }
                other => return other,
            }
        }
    }
}

/// Transient failures worth one more attempt. Window validation errors are
/// deterministic and never retried.
fn is_retryable(error: &Error) -> bool {
    matches!(
        error,
        Error::EntryFetch(_) | Error::Summarizer(_) | Error::Persistence(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summarizer::SummaryClient;
    use crate::types::{NewJournalEntry, Subscriber, SubscriptionTier};
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FixedDirectory(Vec<String>);

    impl SubscriberDirectory for FixedDirectory {
        fn eligible_user_ids(&self) -> Result<Vec<String>> {
            Ok(self.0.clone())
        }
    }

    /// Fails for one poisoned user, succeeds for everyone else.
    struct SelectiveSummarizer {
        poisoned_marker: String,
        calls: Arc<AtomicUsize>,
    }

    impl SummaryClient for SelectiveSummarizer {
        fn summarize(&self, prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if prompt.contains(&self.poisoned_marker) {
                Err(Error::Summarizer("provider timed out".to_string()))
            } else {
                Ok("One.\n\nTwo.\n\nThree.\n\nFour.\n\nFive.".to_string())
            }
        }
    }

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        db
    }

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn seed_month(db: &Database, user: &str, scored_days: u32, marker: &str) {
        for day in 1..=scored_days {
            db.insert_entry(&NewJournalEntry {
                user_id: user,
                entry_date: date(2025, 3, day),
                mood_score: Some(3),
                factors: &[],
                free_text: Some(marker),
            })
            .unwrap();
        }
    }

    fn sweep_config(retries: usize) -> DigestConfig {
        DigestConfig {
            interactive_min_entries: 1,
            sweep_min_entries: 3,
            sweep_retries: retries,
            sweep_token: None,
        }
    }

    fn make_engine(calls: &Arc<AtomicUsize>) -> DigestEngine {
        DigestEngine::new(Box::new(SelectiveSummarizer {
            poisoned_marker: "POISON".to_string(),
            calls: calls.clone(),
        }))
    }

    #[test]
    fn test_sweep_counts_outcomes_and_continues_past_failures() {
        let db = test_db();
        seed_month(&db, "ok-user", 4, "fine day");
        seed_month(&db, "sparse-user", 2, "fine day");
        seed_month(&db, "broken-user", 4, "POISON");

        let calls = Arc::new(AtomicUsize::new(0));
        let engine = make_engine(&calls);
        let runner = SweepRunner::new(&sweep_config(0));
        let directory = FixedDirectory(vec![
            "ok-user".to_string(),
            "sparse-user".to_string(),
            "broken-user".to_string(),
            "silent-user".to_string(),
        ]);

        let report = runner
            .run(&engine, &db, &directory, date(2025, 3, 10))
            .unwrap();

        assert_eq!(report.users_considered, 4);
        assert_eq!(report.generated, 1);
        assert_eq!(report.insufficient_data, 2, "sparse and silent users");
        assert_eq!(report.failed, 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].0, "broken-user");

        // The failure left no partial row behind
        assert!(db.list_digests("broken-user", 2025, 3).unwrap().is_empty());
        assert_eq!(db.list_digests("ok-user", 2025, 3).unwrap().len(), 1);
    }

    #[test]
    fn test_sweep_same_day_is_idempotent() {
        let db = test_db();
        seed_month(&db, "ok-user", 4, "fine day");

        let calls = Arc::new(AtomicUsize::new(0));
        let engine = make_engine(&calls);
        let runner = SweepRunner::new(&sweep_config(0));
        let directory = FixedDirectory(vec!["ok-user".to_string()]);

        let first = runner
            .run(&engine, &db, &directory, date(2025, 3, 10))
            .unwrap();
        assert_eq!(first.generated, 1);

        let second = runner
            .run(&engine, &db, &directory, date(2025, 3, 10))
            .unwrap();
        assert_eq!(second.generated, 0);
        assert_eq!(second.already_covered, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(db.list_digests("ok-user", 2025, 3).unwrap().len(), 1);
    }

    #[test]
    fn test_sweep_retries_transient_failures_once() {
        let db = test_db();
        seed_month(&db, "broken-user", 4, "POISON");

        let calls = Arc::new(AtomicUsize::new(0));
        let engine = make_engine(&calls);
        let runner = SweepRunner::new(&sweep_config(1));
        let directory = FixedDirectory(vec!["broken-user".to_string()]);

        let report = runner
            .run(&engine, &db, &directory, date(2025, 3, 10))
            .unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2, "one retry after the failure");
    }

    #[test]
    fn test_database_directory_lists_active_paid_users() {
        let db = test_db();
        for (user, tier, active) in [
            ("paid", SubscriptionTier::Premium, true),
            ("free", SubscriptionTier::Free, true),
            ("lapsed", SubscriptionTier::Premium, false),
        ] {
            db.upsert_subscriber(&Subscriber {
                user_id: user.to_string(),
                tier,
                active,
                started_at: Utc::now(),
            })
            .unwrap();
        }

        let ids = (&db as &dyn SubscriberDirectory).eligible_user_ids().unwrap();
        assert_eq!(ids, vec!["paid".to_string()]);
    }

    #[test]
    fn test_report_serializes_for_export() {
        let report = SweepReport {
            run_id: "run-1".to_string(),
            as_of: date(2025, 3, 10),
            users_considered: 2,
            generated: 1,
            already_covered: 1,
            insufficient_data: 0,
            awaiting_first_day: 0,
            failed: 0,
            errors: Vec::new(),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["generated"], 1);
        assert_eq!(json["as_of"], "2025-03-10");
        assert_eq!(report.skipped(), 1);
    }
}
