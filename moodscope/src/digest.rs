//! moodscope-digest: show or generate a user's monthly mood digest
//!
//! The default action prints the stored digest for the month alongside
//! entry statistics. With `--generate` it runs one generation attempt and
//! reports the outcome.

use anyhow::{bail, Context, Result};
use chrono::{Datelike, NaiveDate};
use clap::Parser;
use moodscope_core::notify::WebhookNotifier;
use moodscope_core::summarizer::create_summary_client;
use moodscope_core::types::{MonthStats, MoodDigest};
use moodscope_core::{
    logging, period, Config, Database, DigestEngine, DigestOutcome, Error, GenerateIntent,
    MonthWindow, SkipReason,
};

#[derive(Parser)]
#[command(
    name = "moodscope-digest",
    about = "Show or generate a user's monthly mood digest",
    version
)]
struct Args {
    /// User the digest belongs to
    #[arg(long)]
    user: String,

    /// Target month as YYYY-MM (defaults to the as-of month)
    #[arg(long)]
    month: Option<String>,

    /// Date treated as today, YYYY-MM-DD (defaults to the current UTC date)
    #[arg(long)]
    as_of: Option<String>,

    /// Generate or refresh the digest instead of just showing it
    #[arg(long)]
    generate: bool,

    /// With --generate, regenerate even when the window is already covered
    #[arg(long)]
    force: bool,

    /// Output format: terminal or json
    #[arg(long, default_value = "terminal")]
    format: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    Config::ensure_xdg_env();
    let config = Config::load().context("failed to load config")?;
    let _logging_guard = logging::init(&config.logging).context("failed to initialize logging")?;

    let as_of = match args.as_of.as_deref() {
        Some(s) => parse_date(s)?,
        None => period::today_utc(),
    };
    let (year, month) = match args.month.as_deref() {
        Some(s) => parse_month(s)?,
        None => (as_of.year(), as_of.month()),
    };

    let db_path = Config::database_path();
    if !db_path.exists() && !args.generate {
        bail!(
            "no database found at {} (nothing has been journaled yet)",
            db_path.display()
        );
    }
    let db = Database::open(&db_path)?;
    db.migrate()?;

    if args.generate {
        generate(&args, &config, &db, year, month, as_of)
    } else {
        show(&args, &db, year, month, as_of)
    }
}

fn generate(
    args: &Args,
    config: &Config,
    db: &Database,
    year: i32,
    month: u32,
    as_of: NaiveDate,
) -> Result<()> {
    let window = MonthWindow::compute(year, month, as_of)?;

    let summarizer_config = config
        .summarizer
        .as_ref()
        .context("no [summarizer] section in the config; add one to generate digests")?;
    let client = create_summary_client(summarizer_config)?;
    let mut engine = DigestEngine::new(client);
    if let Some(notifier) = WebhookNotifier::from_config(&config.notifier)? {
        engine = engine.with_notifier(Box::new(notifier));
    }

    let intent = if args.force {
        GenerateIntent::Force
    } else {
        GenerateIntent::IfMissing
    };

    let outcome = engine.generate_or_skip(
        db,
        &args.user,
        year,
        month,
        as_of,
        intent,
        config.digest.interactive_min_entries,
    );

    match outcome {
        Ok(DigestOutcome::Generated(digest)) => {
            if args.format == "json" {
                println!("{}", serde_json::to_string_pretty(&digest)?);
            } else {
                println!(
                    "Digest for {} updated: week {}, {} day(s) analyzed{}.",
                    window.display_name(),
                    digest.week_index,
                    digest.days_analyzed,
                    if digest.is_final { ", final" } else { "" }
                );
                print_sections(&digest);
            }
            Ok(())
        }
        Ok(DigestOutcome::Skipped(SkipReason::AlreadyExists)) => {
            println!(
                "Already up to date for {}. Use --force to regenerate.",
                window.display_name()
            );
            Ok(())
        }
        Ok(DigestOutcome::Skipped(SkipReason::InsufficientData { scored, required })) => {
            println!(
                "Not enough entries yet: {scored} day(s) with a mood score this month, {required} needed. Keep journaling."
            );
            Ok(())
        }
        Ok(DigestOutcome::Skipped(SkipReason::NoElapsedDays)) => {
            println!("{} has not started yet, nothing to analyze.", window.display_name());
            Ok(())
        }
        Err(Error::Summarizer(detail)) => {
            bail!("the generation service is unavailable, try again shortly ({detail})")
        }
        Err(e) => Err(e.into()),
    }
}

fn show(args: &Args, db: &Database, year: i32, month: u32, as_of: NaiveDate) -> Result<()> {
    let window = MonthWindow::compute(year, month, as_of)?;
    let latest = db.latest_digest(&args.user, year, month)?;
    let stats = db.month_stats(&args.user, window.month_start, window.window_end(), 5)?;

    match args.format.as_str() {
        "terminal" => print_terminal(&args.user, &window, latest.as_ref(), &stats),
        "json" => print_json(&window, latest.as_ref(), &stats)?,
        other => bail!("unknown format '{other}' (expected terminal or json)"),
    }
    Ok(())
}

fn print_terminal(user: &str, window: &MonthWindow, latest: Option<&MoodDigest>, stats: &MonthStats) {
    println!();
    println!("  {} mood digest for {}", window.display_name(), user);
    println!("  {}", "=".repeat(52));
    println!();
    println!("  Entries this month     {}", stats.total_entries);
    println!("  Days with a score      {}", stats.scored_entries);
    println!("  Average mood           {}", stats.average_mood_display());
    if !stats.top_factors.is_empty() {
        let factors: Vec<String> = stats
            .top_factors
            .iter()
            .map(|(name, count)| format!("{name} ({count})"))
            .collect();
        println!("  Common factors         {}", factors.join(", "));
    }
    println!();

    match latest {
        Some(digest) => {
            let coverage = if digest.is_final {
                "final".to_string()
            } else {
                format!("through week {}", digest.week_index)
            };
            println!(
                "  Digest ({coverage}, {} day(s) analyzed, updated {})",
                digest.days_analyzed,
                digest.updated_at.format("%Y-%m-%d")
            );
            print_sections(digest);
        }
        None => {
            println!("  No digest yet for this month. Run with --generate to create one.");
        }
    }
    println!();
}

fn print_sections(digest: &MoodDigest) {
    for (label, text) in digest.sections.labeled() {
        if text.is_empty() {
            continue;
        }
        println!();
        println!("  {label}");
        println!("  {text}");
    }
}

fn print_json(window: &MonthWindow, latest: Option<&MoodDigest>, stats: &MonthStats) -> Result<()> {
    let value = serde_json::json!({
        "year": window.year,
        "month": window.month,
        "as_of": window.as_of,
        "digest": latest,
        "stats": stats,
    });
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("invalid date '{s}', expected YYYY-MM-DD"))
}

fn parse_month(s: &str) -> Result<(i32, u32)> {
    let parts: Vec<&str> = s.split('-').collect();
    if parts.len() != 2 {
        bail!("invalid month '{s}', expected YYYY-MM");
    }
    let year: i32 = parts[0]
        .parse()
        .with_context(|| format!("invalid year in '{s}'"))?;
    let month: u32 = parts[1]
        .parse()
        .with_context(|| format!("invalid month in '{s}'"))?;
    if !(1..=12).contains(&month) {
        bail!("month must be between 1 and 12, got {month}");
    }
    Ok((year, month))
}
