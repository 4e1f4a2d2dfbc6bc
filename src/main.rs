mod config;
mod loader;
mod models;
mod normalizer;
mod pipeline;
mod scraper;
mod storage;
mod telemetry;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use crate::config::AppConfig;
use crate::pipeline::Pipeline;
use crate::storage::Repository;
use crate::telemetry::{group_digits, RunLog, Timer};

#[derive(Parser)]
#[command(name = "catalog-etl", about = "Storefront catalogue scraper and loader", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Append logs to this file instead of the configured one
    #[arg(long, global = true, env = "CATALOG_LOG_FILE")]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Walk category listings and save the product URL list
    Crawl {
        /// Category start URL (repeatable; defaults to the configured list)
        #[arg(short, long = "category")]
        categories: Vec<String>,

        /// Output CSV (default: <output_dir>/productos_urls_<timestamp>.csv)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Fetch every product in a URL list and write the normalized table
    Scrape {
        #[arg(short, long)]
        links: PathBuf,

        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Load a product table CSV into DuckDB
    Import {
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Crawl, scrape, normalize, write CSV and import in one go
    Run {
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Show database statistics
    Stats,

    /// Apply schema migrations without loading data
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load()?;

    let log_file = cli.log_file.clone().or_else(|| config.pipeline.log_file.clone());
    let run_log = RunLog::open(cli.verbose, log_file.as_deref())?;

    let outcome = execute(cli.command, config).await;
    if let Err(e) = &outcome {
        tracing::error!("{:#}", e);
    }
    run_log.close()?;
    outcome
}

async fn execute(command: Command, config: AppConfig) -> Result<()> {
    match command {
        Command::Crawl { categories, out } => {
            let pipeline = Pipeline::new(config)?;
            let categories = if categories.is_empty() {
                pipeline.config().scraper.category_urls.clone()
            } else {
                categories
            };
            let out = out.unwrap_or_else(|| {
                loader::timestamped_path(&pipeline.config().storage.output_dir, "productos_urls")
            });

            let report = pipeline.crawl_categories(&categories).await;
            loader::write_links(&out, &report.links)?;
            info!(
                "Done: {} links from {} categories ({} failed) → {:?}",
                report.links.len(),
                report.categories,
                report.failed,
                out
            );
        }

        Command::Scrape { links, out } => {
            let pipeline = Pipeline::new(config)?;
            let links = loader::read_links(&links)?;
            let out = out.unwrap_or_else(|| pipeline.default_output());

            let report = pipeline.scrape_links(&links).await;
            let failures = report.failures;
            let table = pipeline.normalize(report.records);
            let written = loader::write_product_table(&out, &table)?;
            info!(
                "Done: {} rows written ({} duplicates removed, {} pages failed)",
                written, table.duplicates_removed, failures
            );
        }

        Command::Import { input } => {
            let _t = Timer::start("CSV import");
            let table = loader::read_product_table(&input)?;
            let repo = Repository::open_configured(&config.storage)?;
            let summary = repo
                .persist(&table)
                .with_context(|| format!("Import of {:?} failed", input))?;
            info!(
                "Done: {} persisted, {} already present, {} rejected",
                summary.persisted, summary.conflicts, summary.rejected
            );
        }

        Command::Run { out } => {
            let t = Timer::start("Full pipeline run");
            let stats = Pipeline::new(config)?.run(out).await?;
            if stats.persisted > 0 {
                info!(
                    "{:.1} products/s",
                    stats.persisted as f64 / t.elapsed().as_secs_f64().max(f64::EPSILON)
                );
            }
        }

        Command::Stats => {
            let repo = Repository::open_configured(&config.storage)?;
            let counts = repo.table_counts()?;
            println!("─────────────────────────────────");
            println!("  Catalog ETL · Database Stats");
            println!("─────────────────────────────────");
            println!("  Products      : {}", group_digits(counts.products));
            println!("  Categories    : {}", group_digits(counts.categories));
            println!("  Subcategories : {}", group_digits(counts.subcategories));
            println!("  Colors        : {}", group_digits(counts.colors));
            println!("  Sizes         : {}", group_digits(counts.sizes));
            println!("  Images        : {}", group_digits(counts.images));
            println!("─────────────────────────────────");
        }

        Command::Migrate => {
            Repository::open(&config.storage.db_path)?.run_migrations()?;
            println!("Migrations applied.");
        }
    }

    Ok(())
}
