use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{ArgGroup, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tokio::io::{AsyncBufReadExt, BufReader};

mod aggregate;
mod cache;
mod config;
mod cost;
mod dates;
mod error;
mod filter;
mod ingest;
mod models;
mod report;
mod source;
mod window;

use cache::SnapshotCache;
use config::DashboardConfig;
use filter::{PopulationFilter, SortKey};
use models::Snapshot;
use source::{CsvSource, PgSource, Source, WorkbookSource};
use window::DateWindow;

#[derive(Parser)]
#[command(name = "hcu-dashboard")]
#[command(about = "High cost utilizer enrollment dashboard", long_about = None)]
#[command(group(
    ArgGroup::new("source")
        .args(["csv_dir", "workbook", "postgres"])
        .required(true)
        .multiple(false)
))]
struct Cli {
    /// Directory of CSV exports, one `<sheet>.csv` per worksheet
    #[arg(long)]
    csv_dir: Option<PathBuf>,
    /// Spreadsheet workbook (.xlsx, .xls, .ods)
    #[arg(long)]
    workbook: Option<PathBuf>,
    /// Read tables from the database at DATABASE_URL
    #[arg(long)]
    postgres: bool,
    /// YAML configuration file
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Per-employer enrollment summary
    Summary {
        /// Date window, e.g. 2026, 2026-01 or "Jan=2026-01" (repeatable)
        #[arg(long = "window")]
        windows: Vec<DateWindow>,
        /// Enrollment target as a fraction of the population
        #[arg(long)]
        fraction: Option<f64>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Filtered listing of the HCU population
    Users {
        #[arg(long)]
        employer: Option<String>,
        #[arg(long)]
        status: Option<String>,
        /// Case-insensitive match on name or email
        #[arg(long)]
        search: Option<String>,
        /// total, name or year:YYYY
        #[arg(long, default_value = "total")]
        sort: SortKey,
    },
    /// Interactive summary: Enter re-renders, `r` refreshes, `q` quits
    Dashboard,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hcu_dashboard=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => DashboardConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => DashboardConfig::default(),
    };
    let source = open_source(&cli).await?;
    tracing::info!(source = %source.describe(), "using row source");

    match cli.command {
        Commands::Summary {
            windows,
            fraction,
            out,
        } => {
            if let Some(fraction) = fraction {
                config.target_fraction = fraction;
            }
            if !windows.is_empty() {
                config.windows = windows;
            }
            config.validate()?;

            let snapshot = fetch(&source, &config).await?;
            let summary = render_summary(&snapshot, &config);
            match out {
                Some(path) => {
                    std::fs::write(&path, summary)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("Report written to {}.", path.display());
                }
                None => print!("{summary}"),
            }
        }
        Commands::Users {
            employer,
            status,
            search,
            sort,
        } => {
            let snapshot = fetch(&source, &config).await?;
            let population = &snapshot.population;
            warn_unknown_choice("employer", employer.as_deref(), &filter::employers(population));
            warn_unknown_choice("status", status.as_deref(), &filter::statuses(population));

            let selection = PopulationFilter {
                employer,
                status,
                search,
                sort,
            };
            let selected = selection.apply(&snapshot.population);
            let metrics = filter::listing_metrics(&selected, &config.cost_years);
            print!(
                "{}",
                report::build_user_listing(
                    &selected,
                    snapshot.population.len(),
                    &config.cost_years,
                    &metrics
                )
            );
        }
        Commands::Dashboard => {
            config.validate()?;
            run_dashboard(&source, &config).await?;
        }
    }

    Ok(())
}

async fn open_source(cli: &Cli) -> anyhow::Result<Source> {
    if let Some(dir) = &cli.csv_dir {
        return Ok(Source::Csv(CsvSource::new(dir)));
    }
    if let Some(path) = &cli.workbook {
        if !source::is_workbook(path) {
            anyhow::bail!("{} is not a spreadsheet workbook", path.display());
        }
        return Ok(Source::Workbook(WorkbookSource::new(path)));
    }

    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set when reading from Postgres")?;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;
    Ok(Source::Postgres(PgSource::new(pool)))
}

async fn fetch(source: &Source, config: &DashboardConfig) -> anyhow::Result<Snapshot> {
    ingest::fetch_snapshot(source, config)
        .await
        .context("failed to fetch worksheets")
}

fn render_summary(snapshot: &Snapshot, config: &DashboardConfig) -> String {
    let report_config = config.report_config(Utc::now().date_naive());
    let table = aggregate::summarize(&snapshot.population, &snapshot.events, &report_config);
    report::build_summary_report(&table, snapshot.fetched_at)
}

fn warn_unknown_choice(kind: &str, value: Option<&str>, choices: &[String]) {
    if let Some(value) = value {
        if !choices.iter().any(|choice| choice == value) {
            eprintln!("No {kind} named '{value}'. Available: {}", choices.join(", "));
        }
    }
}

async fn run_dashboard(source: &Source, config: &DashboardConfig) -> anyhow::Result<()> {
    let mut cache = SnapshotCache::new(config.freshness()?);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        match cache
            .get_or_fetch(Utc::now(), || ingest::fetch_snapshot(source, config))
            .await
        {
            Ok(snapshot) => print!("{}", render_summary(&snapshot, config)),
            Err(err) => eprintln!("Fetch failed: {err}"),
        }
        println!();
        println!("[Enter] re-render  [r] refresh  [q] quit");

        let Some(line) = lines.next_line().await? else {
            break;
        };
        match line.trim() {
            "q" | "quit" => break,
            "r" | "refresh" => cache.invalidate(),
            _ => {}
        }
    }

    Ok(())
}
