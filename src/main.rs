use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use chrono::Local;
use clap::{Parser, Subcommand, ValueEnum};
use cutoff_tracker::batch::{run_batch, BatchEntry, BatchOptions};
use cutoff_tracker::config::{Config, ConfigOverrides};
use cutoff_tracker::courses::{course_name, filter_courses, load_courses, CourseCatalogue};
use cutoff_tracker::history::{HistoryStore, MergeReport, ScoreLedger};
use cutoff_tracker::output::csv::{courses_to_csv, history_to_csv, offers_to_csv};
use cutoff_tracker::output::json::{history_to_json, render_json};
use cutoff_tracker::output::table::{
    render_batch_table, render_courses_table, render_history_table, render_offers_table,
};
use cutoff_tracker::pipeline::{SyncOutcome, SyncPipeline, SyncReport};
use cutoff_tracker::progress::MilestoneLogger;
use cutoff_tracker::providers::{build_provider, ProviderKind};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
    Csv,
}

#[derive(Debug, Parser)]
#[command(
    name = "cutoff-tracker",
    about = "Daily cutoff score history for university admission offers"
)]
struct Cli {
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(long = "data-dir")]
    data_dir: Option<String>,
    #[arg(short, long)]
    provider: Option<String>,
    #[arg(short, long)]
    workers: Option<usize>,
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Capture today's scores for one course.
    Sync {
        #[arg(long)]
        course: String,
        #[arg(long)]
        force: bool,
        #[arg(long)]
        sequential: bool,
    },
    /// Capture today's scores for a list of courses.
    Batch {
        /// Comma separated course ids; defaults to the configured list.
        #[arg(long)]
        courses: Option<String>,
        #[arg(long)]
        force: bool,
    },
    History {
        #[arg(long)]
        course: String,
        #[arg(long, default_value = "official")]
        source: String,
        /// Read from the SQLite ledger instead of the CSV store.
        #[arg(long)]
        ledger: bool,
        /// Most recent days to show in the table view; 0 shows all.
        #[arg(long, default_value_t = 0)]
        days: usize,
    },
    Courses {
        #[arg(long)]
        filter: Option<String>,
    },
    /// Import every partial day published by the specialist source.
    Specialist {
        #[arg(long)]
        course: String,
        /// Course name as listed by the source; looked up in the catalogue when omitted.
        #[arg(long)]
        name: Option<String>,
    },
    Config {
        #[arg(long)]
        init: bool,
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load(Some(&config_path))?;
    config.apply_overrides(ConfigOverrides {
        data_dir: cli.data_dir.clone(),
        provider: cli.provider.clone(),
        workers: cli.workers,
        sequential: matches!(cli.command, Commands::Sync { sequential: true, .. }),
    });

    match &cli.command {
        Commands::Sync { course, force, .. } => {
            let pipeline = sync_pipeline(&config)?;
            let captured_at = Local::now().naive_local();
            if !*force && pipeline.is_up_to_date(course, captured_at.date())? {
                info!("course {course} already updated today; pass --force to capture again");
                return Ok(());
            }
            let progress = MilestoneLogger::new(format!("course {course}"));
            match pipeline.run(course, captured_at, &progress).await? {
                SyncOutcome::NoData { course_id } => {
                    warn!("no offers found for course {course_id}; nothing was written");
                }
                SyncOutcome::Completed(report) => print_sync(&report, cli.output)?,
            }
        }
        Commands::Batch { courses, force } => {
            let course_ids = match courses {
                Some(raw) => parse_course_list(raw)?,
                None => config.batch.courses.clone(),
            };
            let pipeline = sync_pipeline(&config)?;
            let options = BatchOptions {
                force: *force,
                pause: Duration::from_millis(config.batch.pause_ms),
            };
            let entries =
                run_batch(&pipeline, &course_ids, Local::now().naive_local(), &options).await;
            print_batch(&entries, cli.output)?;
        }
        Commands::History {
            course,
            source,
            ledger,
            days,
        } => {
            let source = ProviderKind::from_str(source)?;
            let table = if *ledger {
                ScoreLedger::open(&config.ledger_path(), config.history.descriptive_policy)?
                    .load_table(course, source.as_slug())?
            } else {
                history_store(&config).load(course, source.as_slug())?
            };
            if table.is_empty() {
                warn!("no {source} history recorded for course {course}");
                return Ok(());
            }
            match cli.output {
                OutputFormat::Table => println!("{}", render_history_table(&table, *days)),
                OutputFormat::Json => println!("{}", history_to_json(&table)?),
                OutputFormat::Csv => print!("{}", history_to_csv(&table)?),
            }
        }
        Commands::Courses { filter } => {
            let catalogue = load_courses(&config.courses_file());
            let shown = match filter {
                Some(needle) => filter_courses(&catalogue, needle),
                None => catalogue,
            };
            print_courses(&shown, cli.output)?;
        }
        Commands::Specialist { course, name } => {
            let course_name = match name {
                Some(name) => name.clone(),
                None => course_name(&load_courses(&config.courses_file()), course).ok_or_else(
                    || anyhow!("course {course} is not in the catalogue; pass --name"),
                )?,
            };
            let provider = build_provider(ProviderKind::Specialist, &config)?;
            let pipeline = SyncPipeline::from_config(&config, provider)?;
            let merged = pipeline.import_full_history(course, &course_name).await?;
            if merged.is_empty() {
                warn!("specialist source returned nothing for {course_name}");
                return Ok(());
            }
            print_merges(&merged, cli.output)?;
        }
        Commands::Config { init, show } => {
            if *init {
                Config::write_template(&config_path)?;
                println!("Wrote config template to {}", config_path.display());
            }
            if *show || !*init {
                println!("{}", render_json(&config)?);
            }
        }
    }

    Ok(())
}

fn sync_pipeline(config: &Config) -> Result<SyncPipeline> {
    let kind = ProviderKind::from_str(&config.sync.provider)?;
    if kind == ProviderKind::Specialist {
        bail!("the specialist source has no per-offer scores; use the specialist command");
    }
    SyncPipeline::from_config(config, build_provider(kind, config)?)
}

fn history_store(config: &Config) -> HistoryStore {
    HistoryStore::new(
        config.history_dir(),
        config.history.descriptive_policy,
        Duration::from_secs(config.history.lock_stale_secs),
    )
}

fn parse_course_list(raw: &str) -> Result<Vec<String>> {
    let mut out = Vec::new();
    for piece in raw.split(',') {
        let trimmed = piece.trim();
        if trimmed.is_empty() || out.iter().any(|c| c == trimmed) {
            continue;
        }
        out.push(trimmed.to_string());
    }
    if out.is_empty() {
        return Err(anyhow!("course list is empty"));
    }
    Ok(out)
}

fn print_sync(report: &SyncReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            println!("{}", render_offers_table(&report.offers));
            println!(
                "{} of {} offers scored, {} without score; history {} updated ({})",
                report.scored(),
                report.offers.len(),
                report.unscored(),
                report.history.path.display(),
                report.history.column
            );
        }
        OutputFormat::Json => println!("{}", render_json(report)?),
        OutputFormat::Csv => print!("{}", offers_to_csv(&report.offers)?),
    }
    Ok(())
}

fn print_batch(entries: &[BatchEntry], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => println!("{}", render_batch_table(entries)),
        OutputFormat::Json => println!("{}", render_json(entries)?),
        OutputFormat::Csv => {
            warn!("CSV output for batch not implemented, using JSON");
            println!("{}", render_json(entries)?);
        }
    }
    Ok(())
}

fn print_courses(courses: &CourseCatalogue, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => println!("{}", render_courses_table(courses)),
        OutputFormat::Json => println!("{}", render_json(courses)?),
        OutputFormat::Csv => print!("{}", courses_to_csv(courses)?),
    }
    Ok(())
}

fn print_merges(merged: &[MergeReport], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", render_json(merged)?),
        OutputFormat::Table | OutputFormat::Csv => {
            for report in merged {
                println!(
                    "{} -> {}: {} inserted, {} updated, {} rows",
                    report.column,
                    report.path.display(),
                    report.summary.rows_inserted,
                    report.summary.rows_updated,
                    report.summary.total_rows
                );
            }
        }
    }
    Ok(())
}
