//! moodscope-core: Incremental monthly mood analytics for journal data
//!
//! This crate turns a mood journal into monthly narrative digests. Journal
//! entries and subscriber state are mirrored in from the journaling app
//! and treated as read-only here; digests are derived data, keyed by
//! (user, year, month, week), and can always be regenerated from the
//! entries.
//!
//! The [`digest::DigestEngine`] performs one generation attempt at a time:
//! it windows the month as of a given date, merges same-day entries, asks
//! the configured LLM provider for a five-part reflection, and upserts the
//! result. [`sweep::SweepRunner`] fans that out across every active paid
//! subscriber for unattended monthly runs.

pub mod config;
pub mod db;
pub mod digest;
pub mod error;
pub mod logging;
pub mod notify;
pub mod period;
pub mod summarizer;
pub mod sweep;
pub mod types;

pub use config::Config;
pub use db::Database;
pub use digest::{DigestEngine, DigestOutcome, GenerateIntent, SkipReason};
pub use error::{Error, Result};
pub use period::MonthWindow;
pub use sweep::{SubscriberDirectory, SweepReport, SweepRunner};
