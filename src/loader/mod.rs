//! CSV files exchanged between pipeline stages.
//!
//! - URL lists: `url, position, page_number`, written by `crawl` and read by `scrape`.
//! - Product tables: the normalized output table. Collection cells hold JSON.

use crate::models::{NormalizedTable, ProductLink, ProductRow};
use anyhow::{bail, Context, Result};
use chrono::Local;
use csv::StringRecord;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// `<dir>/<stem>_YYYYmmdd_HHMMSS.csv`
pub fn timestamped_path(dir: &Path, stem: &str) -> PathBuf {
    dir.join(format!("{}_{}.csv", stem, Local::now().format("%Y%m%d_%H%M%S")))
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Could not create dir {:?}", parent))?;
    }
    Ok(())
}

// ── URL lists ─────────────────────────────────────────────────────────────────

pub fn write_links(path: &Path, links: &[ProductLink]) -> Result<()> {
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {:?}", path))?;
    for link in links {
        writer.serialize(link)?;
    }
    writer.flush()?;
    info!("Wrote {} links to {:?}", links.len(), path);
    Ok(())
}

pub fn read_links(path: &Path) -> Result<Vec<ProductLink>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open {:?}", path))?;

    let mut links = Vec::new();
    for (i, result) in reader.deserialize::<ProductLink>().enumerate() {
        match result {
            Ok(link) => links.push(link),
            Err(e) => warn!("Row {} in {:?}: {}", i + 1, path, e),
        }
    }
    debug!("Read {} links from {:?}", links.len(), path);
    Ok(links)
}

// ── Product tables ────────────────────────────────────────────────────────────

fn row_to_record(table: &NormalizedTable, row: &ProductRow) -> Result<Vec<String>> {
    let mut cells = vec![row.name.clone(), row.main_category.clone().unwrap_or_default()];
    cells.extend(
        (0..table.subcategory_columns)
            .map(|i| row.subcategories.get(i).cloned().flatten().unwrap_or_default()),
    );
    cells.extend([
        row.reference.clone(),
        row.price.clone(),
        row.discount.clone(),
        serde_json::to_string(&row.colors)?,
        serde_json::to_string(&row.sizes)?,
        row.description.clone(),
        serde_json::to_string(&row.specifications)?,
        serde_json::to_string(&row.care_instructions)?,
        serde_json::to_string(&row.image_urls)?,
        row.position.to_string(),
        row.page_number.to_string(),
    ]);
    Ok(cells)
}

pub fn write_product_table(path: &Path, table: &NormalizedTable) -> Result<usize> {
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {:?}", path))?;

    writer.write_record(table.headers())?;
    for row in &table.rows {
        writer
            .write_record(row_to_record(table, row)?)
            .with_context(|| format!("write row {}", row.reference))?;
    }
    writer.flush()?;

    info!("Wrote {} products to {:?}", table.rows.len(), path);
    Ok(table.rows.len())
}

/// Column positions looked up by header name.
struct Columns {
    index: HashMap<String, usize>,
    subcategories: Vec<usize>,
}

impl Columns {
    fn from_headers(headers: &StringRecord) -> Result<Self> {
        let index: HashMap<String, usize> = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.trim().to_string(), i))
            .collect();

        for required in ["name", "reference", "price"] {
            if !index.contains_key(required) {
                bail!("Missing column {:?}", required);
            }
        }

        let mut subcategories: Vec<(usize, usize)> = index
            .iter()
            .filter_map(|(name, &i)| {
                let n = name.strip_prefix("subcategory_")?.parse::<usize>().ok()?;
                Some((n, i))
            })
            .collect();
        subcategories.sort();

        Ok(Self { index, subcategories: subcategories.into_iter().map(|(_, i)| i).collect() })
    }

    fn text(&self, record: &StringRecord, name: &str) -> String {
        self.index
            .get(name)
            .and_then(|&i| record.get(i))
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    }

    fn list(&self, record: &StringRecord, name: &str) -> Result<Vec<String>> {
        let raw = self.text(record, name);
        if raw.is_empty() {
            return Ok(vec![]);
        }
        serde_json::from_str(&raw).with_context(|| format!("column {} is not a JSON list", name))
    }

    fn map(&self, record: &StringRecord, name: &str) -> Result<BTreeMap<String, String>> {
        let raw = self.text(record, name);
        if raw.is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&raw).with_context(|| format!("column {} is not a JSON object", name))
    }

    fn number(&self, record: &StringRecord, name: &str) -> u32 {
        self.text(record, name).parse().unwrap_or(0)
    }
}

fn record_to_row(cols: &Columns, record: &StringRecord) -> Result<ProductRow> {
    let main_category = Some(cols.text(record, "main_category")).filter(|s| !s.is_empty());
    let subcategories = cols
        .subcategories
        .iter()
        .map(|&i| record.get(i).map(str::trim).filter(|s| !s.is_empty()).map(str::to_string))
        .collect();

    Ok(ProductRow {
        name: cols.text(record, "name"),
        main_category,
        subcategories,
        reference: cols.text(record, "reference"),
        price: cols.text(record, "price"),
        discount: cols.text(record, "discount"),
        colors: cols.list(record, "colors")?,
        sizes: cols.list(record, "sizes")?,
        description: cols.text(record, "description"),
        specifications: cols.map(record, "specifications")?,
        care_instructions: cols.list(record, "care_instructions")?,
        image_urls: cols.list(record, "image_urls")?,
        position: cols.number(record, "position"),
        page_number: cols.number(record, "page_number"),
    })
}

/// Read a product table written by [`write_product_table`]. Unreadable rows
/// are logged and skipped.
pub fn read_product_table(path: &Path) -> Result<NormalizedTable> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open {:?}", path))?;

    let cols = Columns::from_headers(reader.headers()?)?;
    let mut rows = Vec::new();

    for (i, result) in reader.records().enumerate() {
        let parsed = result
            .map_err(anyhow::Error::from)
            .and_then(|record| record_to_row(&cols, &record));
        match parsed {
            Ok(row) => rows.push(row),
            Err(e) => warn!("Row {} in {:?}: {:#}", i + 1, path, e),
        }
    }

    info!("{:?}: {} products loaded", path, rows.len());
    Ok(NormalizedTable {
        subcategory_columns: cols.subcategories.len(),
        rows,
        duplicates_removed: 0,
    })
}
