//! Digest generation engine
//!
//! One generation attempt is a straight pipeline: compute the window,
//! decide whether a stored digest already covers it, fetch and merge the
//! month's entries, summarize, and upsert. Attempts either complete, skip
//! with a reason, or fail without leaving a partial row behind. The engine
//! never retries; callers own retry policy.

use super::{merge_daily, DigestOutcome, GenerateIntent, SkipReason};
use crate::db::Database;
use crate::error::{Error, Result};
use crate::notify::DigestNotifier;
use crate::period::MonthWindow;
use crate::summarizer::{summarize_month, SummaryClient};
use crate::types::{DigestSections, DigestStatus, NewDigest};
use chrono::NaiveDate;
use tracing::{debug, info, warn};

pub struct DigestEngine {
    summarizer: Box<dyn SummaryClient>,
    notifier: Option<Box<dyn DigestNotifier>>,
}

impl DigestEngine {
    pub fn new(summarizer: Box<dyn SummaryClient>) -> Self {
        Self {
            summarizer,
            notifier: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Box<dyn DigestNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Generate the digest for (user, year, month) as seen from `as_of`,
    /// or skip with a reason.
    ///
    /// `min_scored_days` is the merged-day mood threshold below which the
    /// month is considered too sparse to summarize. A digest failure before
    /// the upsert leaves storage untouched, so a later attempt starts
    /// clean.
    #[allow(clippy::too_many_arguments)]
    pub fn generate_or_skip(
        &self,
        db: &Database,
        user_id: &str,
        year: i32,
        month: u32,
        as_of: NaiveDate,
        intent: GenerateIntent,
        min_scored_days: usize,
    ) -> Result<DigestOutcome> {
        let window = MonthWindow::compute(year, month, as_of)?;

        if window.days_elapsed == 0 {
            debug!(user_id, year, month, %as_of, "window has no elapsed days");
            return Ok(DigestOutcome::Skipped(SkipReason::NoElapsedDays));
        }

        if let Some(stored) = db.get_digest(user_id, year, month, window.week_index)? {
            // A provisional digest at the closing week still gets one more
            // pass so the month ends with a final record.
            let finalizing = window.is_final && !stored.is_final;
            if intent == GenerateIntent::IfMissing && !finalizing {
                debug!(
                    user_id,
                    year,
                    month,
                    week_index = window.week_index,
                    "digest already covers this window"
                );
                return Ok(DigestOutcome::Skipped(SkipReason::AlreadyExists));
            }
        }

        let entries = db
            .entries_in_range(user_id, window.month_start, window.window_end())
            .map_err(|e| Error::EntryFetch(e.to_string()))?;

        let merged = merge_daily(&entries);
        let scored = merged.iter().filter(|m| m.mood_score.is_some()).count();
        if scored < min_scored_days {
            debug!(
                user_id,
                year,
                month,
                scored,
                required = min_scored_days,
                "not enough scored days to summarize"
            );
            return Ok(DigestOutcome::Skipped(SkipReason::InsufficientData {
                scored,
                required: min_scored_days,
            }));
        }

        let full_text = summarize_month(self.summarizer.as_ref(), &merged, &window)?;
        let sections = DigestSections::from_full_text(&full_text);

        let stored = db
            .upsert_digest(&NewDigest {
                user_id,
                year: window.year,
                month: window.month,
                week_index: window.week_index,
                days_analyzed: window.days_elapsed,
                is_final: window.is_final,
                status: DigestStatus::Completed,
                sections: &sections,
                full_text: &full_text,
            })
            .map_err(|e| Error::Persistence(e.to_string()))?;

        if let Some(notifier) = &self.notifier {
            if let Err(e) = notifier.digest_generated(&stored) {
                warn!(user_id, error = %e, "digest notification failed");
            }
        }

        info!(
            user_id,
            year = stored.year,
            month = stored.month,
            week_index = stored.week_index,
            days_analyzed = stored.days_analyzed,
            is_final = stored.is_final,
            "digest generated"
        );

        Ok(DigestOutcome::Generated(stored))
    }
}
