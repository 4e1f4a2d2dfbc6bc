//! Pipeline orchestrator: ties scraper → normalizer → loader → storage together.
//!
//! ## Stages
//!
//! 1. Crawl every category listing into one list of product links.
//!    A category whose first page cannot be fetched is counted and skipped.
//! 2. Fetch and extract each product page in turn, with retries and a polite
//!    pause between requests. Pages that cannot be fetched are counted.
//! 3. Normalize the batch (dedup, subcategory columns, sizes).
//! 4. Write the product table CSV, then persist it to DuckDB row by row.
//!
//! Everything runs sequentially: one request in flight at a time.

use crate::config::AppConfig;
use crate::loader;
use crate::models::{NormalizedTable, ProductLink, ProductRecord};
use crate::normalizer::normalize;
use crate::scraper::{crawl, scrape_product, HttpClient, PageFetcher, RetryPolicy};
use crate::storage::{PersistSummary, Repository};
use crate::telemetry::Timer;
use anyhow::{Context, Result};
use rand::Rng;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info};

pub struct Pipeline {
    config: AppConfig,
    fetcher: Box<dyn PageFetcher>,
}

#[derive(Debug, Default)]
pub struct CrawlReport {
    pub links: Vec<ProductLink>,
    pub categories: usize,
    pub failed: usize,
}

#[derive(Debug, Default)]
pub struct ScrapeReport {
    pub records: Vec<ProductRecord>,
    pub failures: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PipelineStats {
    pub categories: usize,
    pub categories_failed: usize,
    pub links: usize,
    pub fetched: usize,
    pub fetch_failures: usize,
    pub duplicates_removed: usize,
    pub rows_written: usize,
    pub persisted: usize,
    pub conflicts: usize,
    pub rejected: usize,
}

impl Pipeline {
    pub fn new(config: AppConfig) -> Result<Self> {
        let client = HttpClient::new(&config.scraper).context("Failed to build HTTP client")?;
        Ok(Self::with_fetcher(config, Box::new(client)))
    }

    pub fn with_fetcher(config: AppConfig, fetcher: Box<dyn PageFetcher>) -> Self {
        Self { config, fetcher }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    // ── Stage 1 ───────────────────────────────────────────────────────────────

    /// Crawl each category in order. Positions and page numbers restart per
    /// category.
    pub async fn crawl_categories(&self, categories: &[String]) -> CrawlReport {
        let _t = Timer::start(format!("Crawl of {} categories", categories.len()));
        let mut report = CrawlReport { categories: categories.len(), ..Default::default() };

        for url in categories {
            match crawl(self.fetcher.as_ref(), url, self.config.scraper.max_pages).await {
                Ok(links) => report.links.extend(links),
                Err(e) => {
                    error!("Category {} skipped: {}", url, e);
                    report.failed += 1;
                }
            }
        }

        info!(
            "{} links from {} categories ({} failed)",
            report.links.len(),
            report.categories,
            report.failed
        );
        report
    }

    // ── Stage 2 ───────────────────────────────────────────────────────────────

    pub async fn scrape_links(&self, links: &[ProductLink]) -> ScrapeReport {
        let _t = Timer::start(format!("Scrape of {} product pages", links.len()));
        let policy = RetryPolicy::from_config(&self.config.scraper);
        let mut report = ScrapeReport::default();

        for (i, link) in links.iter().enumerate() {
            if i > 0 {
                self.pause().await;
            }
            match scrape_product(self.fetcher.as_ref(), link, &policy).await {
                Some(record) => report.records.push(record),
                None => report.failures += 1,
            }
        }

        info!("{} products extracted, {} pages failed", report.records.len(), report.failures);
        report
    }

    fn next_delay(&self) -> Duration {
        let cfg = &self.config.scraper;
        let jitter = if cfg.jitter_ms > 0 { rand::rng().random_range(0..=cfg.jitter_ms) } else { 0 };
        Duration::from_millis(cfg.request_delay_ms + jitter)
    }

    async fn pause(&self) {
        let delay = self.next_delay();
        if !delay.is_zero() {
            debug!("Sleeping {:?}", delay);
            tokio::time::sleep(delay).await;
        }
    }

    // ── Stage 3 ───────────────────────────────────────────────────────────────

    pub fn normalize(&self, records: Vec<ProductRecord>) -> NormalizedTable {
        normalize(records, self.config.pipeline.subcategory_columns)
    }

    /// Where the product table goes when no path is given.
    pub fn default_output(&self) -> PathBuf {
        loader::timestamped_path(&self.config.storage.output_dir, "productos")
    }

    // ── Full run ──────────────────────────────────────────────────────────────

    pub async fn run(&self, out: Option<PathBuf>) -> Result<PipelineStats> {
        let repo = Repository::open_configured(&self.config.storage)?;
        let out = out.unwrap_or_else(|| self.default_output());
        self.run_into(&repo, &out).await
    }

    /// Crawl, extract, normalize, write `out`, and persist into `repo`.
    pub async fn run_into(&self, repo: &Repository, out: &Path) -> Result<PipelineStats> {
        info!("=== Step 1: Crawling category listings ===");
        let crawl = self.crawl_categories(&self.config.scraper.category_urls).await;

        info!("=== Step 2: Extracting {} product pages ===", crawl.links.len());
        let scrape = self.scrape_links(&crawl.links).await;
        let fetched = scrape.records.len();

        info!("=== Step 3: Normalizing ===");
        let table = self.normalize(scrape.records);

        info!("=== Step 4: Writing {:?} and persisting ===", out);
        let rows_written = loader::write_product_table(out, &table)?;
        let PersistSummary { persisted, conflicts, rejected } =
            repo.persist(&table).context("Import into DuckDB failed")?;

        let stats = PipelineStats {
            categories: crawl.categories,
            categories_failed: crawl.failed,
            links: crawl.links.len(),
            fetched,
            fetch_failures: scrape.failures,
            duplicates_removed: table.duplicates_removed,
            rows_written,
            persisted,
            conflicts,
            rejected,
        };

        info!(
            "=== Done: {} categories ({} failed) | {} links | {} fetched ({} failed) | {} duplicates removed | {} rows written | {} persisted, {} already present, {} rejected ===",
            stats.categories,
            stats.categories_failed,
            stats.links,
            stats.fetched,
            stats.fetch_failures,
            stats.duplicates_removed,
            stats.rows_written,
            stats.persisted,
            stats.conflicts,
            stats.rejected,
        );
        Ok(stats)
    }
}
