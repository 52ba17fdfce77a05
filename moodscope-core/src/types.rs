//! Core domain types for moodscope
//!
//! These types model the journaling data the aggregator reads and the
//! narrative digests it produces.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **JournalEntry** | One stored diary row: a date, an optional mood score, tags, text. Owned by the journaling subsystem; read-only here |
//! | **MergedEntry** | All of a date's sub-records collapsed into one logical entry |
//! | **MoodDigest** | A persisted narrative summary for one (user, year, month, week index) |
//! | **Week index** | 1-based bucket of elapsed days in a month, at 7-day granularity |
//! | **Final digest** | A digest whose window reaches the end of its month |
//! | **Subscriber** | A row in the sweep population; only active paid tiers are swept |
//!
//! A date can be journaled more than once (e.g. a typed note plus a
//! transcribed voice note). The merge rule is the documented tie-break:
//! first non-null mood score wins, texts concatenate, factor tags union.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ============================================
// Journal entries
// ============================================

/// A single stored journal row.
///
/// Physically there may be several rows per user per date; callers that need
/// the one-entry-per-date view go through [`crate::digest::merge_daily`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Row ID
    pub id: i64,
    /// Owning user (opaque identifier from the surrounding system)
    pub user_id: String,
    /// Calendar date the entry is about
    pub entry_date: NaiveDate,
    /// Mood score 1..=5, if the user logged one
    pub mood_score: Option<i32>,
    /// Contextual factor tags (e.g. "sleep", "stress")
    pub factors: Vec<String>,
    /// Free-form entry text
    pub free_text: Option<String>,
    /// When the row was written
    pub created_at: DateTime<Utc>,
    /// Soft-deletion marker; deleted rows are invisible to the aggregator
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Field values for inserting a journal row.
///
/// Writes belong to the journaling subsystem; the aggregation engine never
/// inserts entries. This exists for that subsystem and for test fixtures.
#[derive(Debug, Clone)]
pub struct NewJournalEntry<'a> {
    pub user_id: &'a str,
    pub entry_date: NaiveDate,
    pub mood_score: Option<i32>,
    pub factors: &'a [String],
    pub free_text: Option<&'a str>,
}

/// One calendar date's sub-records collapsed into a single logical entry.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedEntry {
    /// The date all merged rows share
    pub entry_date: NaiveDate,
    /// First non-null mood score across the date's rows, in row order
    pub mood_score: Option<i32>,
    /// Union of factor tags, first occurrence order preserved
    pub factors: Vec<String>,
    /// All texts for the date joined with newlines (may be empty)
    pub text: String,
}

// ============================================
// Digest sections
// ============================================

/// How many narrative sections a digest carries.
pub const SECTION_COUNT: usize = 5;

/// The five ordered narrative sections of a digest.
///
/// The summarizer returns free prose; [`DigestSections::from_full_text`] is
/// the lenient splitter that turns it into this fixed shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DigestSections {
    pub overview: String,
    pub positive_trends: String,
    pub decline_reasons: String,
    pub recommendations: String,
    pub reflection_prompts: String,
}

impl DigestSections {
    /// Split narrative text into the five sections.
    ///
    /// Paragraphs are separated by blank lines (two consecutive newlines).
    /// Whitespace-only fragments are dropped, so sloppy triple/quadruple
    /// newlines from the model do not produce ghost sections. Paragraphs
    /// beyond the fifth are discarded; missing ones stay empty. The output
    /// format is a convention, not a schema, so this never fails.
    pub fn from_full_text(text: &str) -> Self {
        let mut parts = text
            .split("\n\n")
            .map(str::trim)
            .filter(|part| !part.is_empty());

        Self {
            overview: parts.next().unwrap_or_default().to_string(),
            positive_trends: parts.next().unwrap_or_default().to_string(),
            decline_reasons: parts.next().unwrap_or_default().to_string(),
            recommendations: parts.next().unwrap_or_default().to_string(),
            reflection_prompts: parts.next().unwrap_or_default().to_string(),
        }
    }

    /// Section contents in display order, paired with their labels.
    pub fn labeled(&self) -> [(&'static str, &str); SECTION_COUNT] {
        [
            ("Overview", self.overview.as_str()),
            ("Positive trends", self.positive_trends.as_str()),
            ("Decline reasons", self.decline_reasons.as_str()),
            ("Recommendations", self.recommendations.as_str()),
            ("Reflection prompts", self.reflection_prompts.as_str()),
        ]
    }
}

// ============================================
// Mood digests
// ============================================

/// Generation status of a stored digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DigestStatus {
    Completed,
    Failed,
}

impl DigestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DigestStatus::Completed => "completed",
            DigestStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for DigestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(DigestStatus::Completed),
            "failed" => Ok(DigestStatus::Failed),
            _ => Err(format!("unknown digest status: {}", s)),
        }
    }
}

/// A persisted narrative summary.
///
/// At most one digest exists per `(user_id, year, month, week_index)`;
/// regeneration updates the row in place. Digests are never deleted here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoodDigest {
    /// Row ID
    pub id: i64,
    /// Owning user
    pub user_id: String,
    /// Target year
    pub year: i32,
    /// Target month (1-12)
    pub month: u32,
    /// 1-based week bucket within the month
    pub week_index: u32,
    /// Days of the month covered by this digest's window (>= 1)
    pub days_analyzed: u32,
    /// True once the window reaches the month's last day
    pub is_final: bool,
    /// Generation status
    pub status: DigestStatus,
    /// The five narrative sections
    pub sections: DigestSections,
    /// Raw summarizer output the sections were split from
    pub full_text: String,
    /// First successful generation time
    pub created_at: DateTime<Utc>,
    /// Last regeneration time
    pub updated_at: DateTime<Utc>,
}

/// Field values for upserting a digest.
#[derive(Debug, Clone)]
pub struct NewDigest<'a> {
    pub user_id: &'a str,
    pub year: i32,
    pub month: u32,
    pub week_index: u32,
    pub days_analyzed: u32,
    pub is_final: bool,
    pub status: DigestStatus,
    pub sections: &'a DigestSections,
    pub full_text: &'a str,
}

// ============================================
// Subscribers
// ============================================

/// Subscription tier of a journaling user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionTier {
    Free,
    Premium,
}

impl SubscriptionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionTier::Free => "free",
            SubscriptionTier::Premium => "premium",
        }
    }
}

impl std::str::FromStr for SubscriptionTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(SubscriptionTier::Free),
            "premium" => Ok(SubscriptionTier::Premium),
            _ => Err(format!("unknown subscription tier: {}", s)),
        }
    }
}

/// A user's subscription state, as mirrored from the billing system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscriber {
    /// Owning user
    pub user_id: String,
    /// Current tier
    pub tier: SubscriptionTier,
    /// Whether the subscription is currently active
    pub active: bool,
    /// Subscription start
    pub started_at: DateTime<Utc>,
}

// ============================================
// Month statistics
// ============================================

/// Aggregate mood statistics for a month window, shown alongside digests.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MonthStats {
    /// Journal rows in the window (soft-deleted excluded)
    pub total_entries: i64,
    /// Rows carrying a mood score
    pub scored_entries: i64,
    /// Mean mood score across scored rows, if any
    pub average_mood: Option<f64>,
    /// Factor tags by frequency, most common first
    pub top_factors: Vec<(String, i64)>,
}

impl MonthStats {
    /// Format the average mood for display (e.g. "3.4/5").
    pub fn average_mood_display(&self) -> String {
        match self.average_mood {
            Some(avg) => format!("{:.1}/5", avg),
            None => "-".to_string(),
        }
    }
}
