//! Monthly mood digest generation
//!
//! Turns a month of journal entries into a stored narrative digest. The
//! pipeline merges same-day entries, asks the summarizer for the narrative,
//! splits it into sections, and upserts one row per (user, month, week).

use crate::types::{JournalEntry, MergedEntry, MoodDigest};
use std::fmt;

pub mod engine;

pub use engine::DigestEngine;

/// Whether an existing digest for the window should be regenerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerateIntent {
    /// Skip when a digest for the window already exists, except to replace
    /// a provisional digest once the month has closed.
    IfMissing,
    /// Regenerate unconditionally.
    Force,
}

/// Why generation was skipped without touching storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NoElapsedDays,
    AlreadyExists,
    InsufficientData { scored: usize, required: usize },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoElapsedDays => write!(f, "month has no elapsed days yet"),
            SkipReason::AlreadyExists => write!(f, "digest already up to date"),
            SkipReason::InsufficientData { scored, required } => {
                write!(f, "insufficient data: {scored} scored day(s), {required} required")
            }
        }
    }
}

/// Result of one generation attempt that completed without error.
#[derive(Debug)]
pub enum DigestOutcome {
    Generated(MoodDigest),
    Skipped(SkipReason),
}

/// Collapse raw entries into one record per calendar day.
///
/// Input must be ordered by (entry_date, id), which is how
/// [`crate::db::Database::entries_in_range`] returns it. Within a day the
/// earliest non-null mood wins, free texts are stacked in order, and
/// factors are unioned keeping first appearance.
pub fn merge_daily(entries: &[JournalEntry]) -> Vec<MergedEntry> {
    let mut merged: Vec<MergedEntry> = Vec::new();
    for entry in entries {
        match merged.last_mut() {
            Some(m) if m.entry_date == entry.entry_date => merge_into(m, entry),
            _ => {
                let mut m = MergedEntry {
                    entry_date: entry.entry_date,
                    mood_score: None,
                    factors: Vec::new(),
                    text: String::new(),
                };
                merge_into(&mut m, entry);
                merged.push(m);
            }
        }
    }
    merged
}

fn merge_into(target: &mut MergedEntry, entry: &JournalEntry) {
    if target.mood_score.is_none() {
        target.mood_score = entry.mood_score;
    }
    for factor in &entry.factors {
        if !target.factors.contains(factor) {
            target.factors.push(factor.clone());
        }
    }
    if let Some(text) = entry.free_text.as_deref() {
        let text = text.trim();
        if !text.is_empty() {
            if !target.text.is_empty() {
                target.text.push('\n');
            }
            target.text.push_str(text);
        }
    }
}
