//! moodscope-sweep: bring every active paid subscriber's monthly digest up
//! to date
//!
//! Intended to run from cron. Re-running on the same day is safe; users
//! already covered are skipped. When a sweep token is configured the
//! caller must present it via --token or MOODSCOPE_SWEEP_TOKEN.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use moodscope_core::notify::WebhookNotifier;
use moodscope_core::summarizer::create_summary_client;
use moodscope_core::{logging, period, Config, Database, DigestEngine, SweepReport, SweepRunner};
use tracing::info;

#[derive(Parser)]
#[command(
    name = "moodscope-sweep",
    about = "Generate missing monthly digests for active paid subscribers",
    version
)]
struct Args {
    /// Date treated as today, YYYY-MM-DD (defaults to the current UTC date)
    #[arg(long)]
    as_of: Option<String>,

    /// Sweep authorization token (or set MOODSCOPE_SWEEP_TOKEN)
    #[arg(long)]
    token: Option<String>,

    /// Print the run report as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    Config::ensure_xdg_env();
    let config = Config::load().context("failed to load config")?;
    let _logging_guard = logging::init(&config.logging).context("failed to initialize logging")?;

    authorize(&config, args.token.as_deref())?;

    let as_of = match args.as_of.as_deref() {
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("invalid --as-of date '{s}', expected YYYY-MM-DD"))?,
        None => period::today_utc(),
    };

    let summarizer_config = config
        .summarizer
        .as_ref()
        .context("no [summarizer] section in the config; the sweep cannot run without one")?;
    let client = create_summary_client(summarizer_config)?;
    let mut engine = DigestEngine::new(client);
    if let Some(notifier) = WebhookNotifier::from_config(&config.notifier)? {
        engine = engine.with_notifier(Box::new(notifier));
    }

    let db = Database::open(&Config::database_path())?;
    db.migrate()?;

    let runner = SweepRunner::new(&config.digest);
    let report = runner.run(&engine, &db, &db, as_of)?;

    info!(
        run_id = %report.run_id,
        generated = report.generated,
        skipped = report.skipped(),
        failed = report.failed,
        "sweep report ready"
    );

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    Ok(())
}

/// Per-user failures are already inside the report; only a configured
/// token mismatch stops the run.
fn authorize(config: &Config, cli_token: Option<&str>) -> Result<()> {
    let Some(expected) = config.digest.sweep_token.as_deref() else {
        return Ok(());
    };

    let presented = cli_token
        .map(|t| t.to_string())
        .or_else(|| std::env::var("MOODSCOPE_SWEEP_TOKEN").ok());

    match presented.as_deref() {
        Some(token) if token == expected => Ok(()),
        Some(_) => bail!("sweep token does not match the configured token"),
        None => bail!("a sweep token is required; pass --token or set MOODSCOPE_SWEEP_TOKEN"),
    }
}

fn print_report(report: &SweepReport) {
    println!();
    println!("  Digest sweep {} (run {})", report.as_of, report.run_id);
    println!("  {}", "=".repeat(52));
    println!("  Users considered       {}", report.users_considered);
    println!("  Generated              {}", report.generated);
    println!("  Already covered        {}", report.already_covered);
    println!("  Insufficient data      {}", report.insufficient_data);
    println!("  Awaiting first day     {}", report.awaiting_first_day);
    println!("  Failed                 {}", report.failed);
    if !report.errors.is_empty() {
        println!();
        println!("  Failures:");
        for (user_id, error) in &report.errors {
            println!("    {user_id}: {error}");
        }
    }
    println!();
}
