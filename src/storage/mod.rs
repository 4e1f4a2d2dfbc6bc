use crate::config::StorageConfig;
use crate::models::{NormalizedTable, ProductRow};
use crate::scraper::cleaner::{parse_discount, parse_price};
use anyhow::{Context, Result};
use chrono::Utc;
use duckdb::{params, Connection, Transaction};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

// ── Schema ────────────────────────────────────────────────────────────────────

const DDL: &str = r#"
CREATE SEQUENCE IF NOT EXISTS categories_id_seq;
CREATE SEQUENCE IF NOT EXISTS subcategories_id_seq;
CREATE SEQUENCE IF NOT EXISTS colors_id_seq;
CREATE SEQUENCE IF NOT EXISTS sizes_id_seq;
CREATE SEQUENCE IF NOT EXISTS products_id_seq;
CREATE SEQUENCE IF NOT EXISTS images_id_seq;
CREATE SEQUENCE IF NOT EXISTS care_recommendations_id_seq;
CREATE SEQUENCE IF NOT EXISTS import_runs_id_seq;

CREATE TABLE IF NOT EXISTS categories (
    id          INTEGER PRIMARY KEY DEFAULT nextval('categories_id_seq'),
    name        VARCHAR NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS subcategories (
    id          INTEGER PRIMARY KEY DEFAULT nextval('subcategories_id_seq'),
    name        VARCHAR NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS colors (
    id          INTEGER PRIMARY KEY DEFAULT nextval('colors_id_seq'),
    name        VARCHAR NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS sizes (
    id          INTEGER PRIMARY KEY DEFAULT nextval('sizes_id_seq'),
    name        VARCHAR NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS products (
    id              INTEGER PRIMARY KEY DEFAULT nextval('products_id_seq'),
    name            VARCHAR NOT NULL,
    category_id     INTEGER REFERENCES categories (id),
    reference       VARCHAR NOT NULL UNIQUE,
    price           DECIMAL(12, 2) NOT NULL,
    discount        DECIMAL(5, 2),
    description     VARCHAR,
    specifications  VARCHAR,    -- JSON object
    position        INTEGER,
    page_number     INTEGER,
    imported_at     TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS product_colors (
    product_id  INTEGER NOT NULL REFERENCES products (id),
    color_id    INTEGER NOT NULL REFERENCES colors (id),
    PRIMARY KEY (product_id, color_id)
);

CREATE TABLE IF NOT EXISTS product_sizes (
    product_id  INTEGER NOT NULL REFERENCES products (id),
    size_id     INTEGER NOT NULL REFERENCES sizes (id),
    PRIMARY KEY (product_id, size_id)
);

CREATE TABLE IF NOT EXISTS product_subcategories (
    product_id      INTEGER NOT NULL REFERENCES products (id),
    subcategory_id  INTEGER NOT NULL REFERENCES subcategories (id),
    PRIMARY KEY (product_id, subcategory_id)
);

CREATE TABLE IF NOT EXISTS images (
    id          INTEGER PRIMARY KEY DEFAULT nextval('images_id_seq'),
    product_id  INTEGER NOT NULL REFERENCES products (id),
    url         VARCHAR NOT NULL
);

CREATE TABLE IF NOT EXISTS care_recommendations (
    id              INTEGER PRIMARY KEY DEFAULT nextval('care_recommendations_id_seq'),
    product_id      INTEGER NOT NULL REFERENCES products (id),
    recommendation  VARCHAR NOT NULL
);

CREATE TABLE IF NOT EXISTS import_runs (
    id              INTEGER PRIMARY KEY DEFAULT nextval('import_runs_id_seq'),
    started_at      TIMESTAMP NOT NULL,
    finished_at     TIMESTAMP,
    status          VARCHAR NOT NULL DEFAULT 'running',
    rows_persisted  INTEGER DEFAULT 0,
    rows_rejected   INTEGER DEFAULT 0,
    error_msg       VARCHAR
);

CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TIMESTAMP NOT NULL
);
"#;

const INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_products_category ON products (category_id);
CREATE INDEX IF NOT EXISTS idx_images_product    ON images (product_id);
CREATE INDEX IF NOT EXISTS idx_care_product      ON care_recommendations (product_id);
"#;

/// Lookup tables resolved by name before a product row is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Category,
    Subcategory,
    Color,
    Size,
}

impl Lookup {
    fn table(self) -> &'static str {
        match self {
            Lookup::Category => "categories",
            Lookup::Subcategory => "subcategories",
            Lookup::Color => "colors",
            Lookup::Size => "sizes",
        }
    }

    /// Many-to-many table and its foreign-key column. Categories hang off
    /// `products.category_id` instead.
    fn association(self) -> Option<(&'static str, &'static str)> {
        match self {
            Lookup::Category => None,
            Lookup::Subcategory => Some(("product_subcategories", "subcategory_id")),
            Lookup::Color => Some(("product_colors", "color_id")),
            Lookup::Size => Some(("product_sizes", "size_id")),
        }
    }
}

// ── Row-level outcomes ────────────────────────────────────────────────────────

/// Why a single product row was not written. None of these stop an import.
#[derive(Debug, Error)]
pub enum RowError {
    #[error("reference {reference} already stored")]
    Conflict { reference: String },

    #[error("{reference}: cannot parse {field} from {value:?}")]
    MalformedField { reference: String, field: &'static str, value: String },

    #[error("database error: {0}")]
    Db(#[from] duckdb::Error),

    #[error("cannot encode specifications: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PersistSummary {
    pub persisted: usize,
    pub conflicts: usize,
    pub rejected: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TableCounts {
    pub products: i64,
    pub categories: i64,
    pub subcategories: i64,
    pub colors: i64,
    pub sizes: i64,
    pub images: i64,
}

// ── Repository ────────────────────────────────────────────────────────────────

pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Could not create dir {:?}", parent))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open DuckDB at {:?}", path))?;
        Ok(Self { conn })
    }

    /// Open `config.db_path`, applying the schema when `run_migrations` is set.
    pub fn open_configured(config: &StorageConfig) -> Result<Self> {
        let repo = Self::open(&config.db_path)?;
        if config.run_migrations {
            repo.run_migrations()?;
        }
        Ok(repo)
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self { conn: Connection::open_in_memory()? })
    }

    pub fn run_migrations(&self) -> Result<()> {
        info!("Running migrations…");
        self.conn.execute_batch(DDL).context("DDL failed")?;
        self.conn.execute_batch(INDEXES).context("Index creation failed")?;
        self.conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, ?)",
            params![Utc::now().naive_utc()],
        )?;
        info!("Migrations done.");
        Ok(())
    }

    // ── Import ────────────────────────────────────────────────────────────────

    /// Write every row of `table`, one transaction per row.
    ///
    /// A row that fails is rolled back and counted; the rest carry on. Only a
    /// failure outside the per-row work (e.g. the connection) returns `Err`.
    pub fn persist(&self, table: &NormalizedTable) -> Result<PersistSummary> {
        let run_id = self.begin_import_run()?;
        let mut summary = PersistSummary::default();

        for row in &table.rows {
            match self.insert_product(row) {
                Ok(id) => {
                    debug!("{} stored as product {}", row.reference, id);
                    summary.persisted += 1;
                }
                Err(RowError::Conflict { reference }) => {
                    info!("Product {} already exists, skipping", reference);
                    summary.conflicts += 1;
                }
                Err(e) => {
                    warn!("Row {} rolled back: {}", row.reference, e);
                    summary.rejected += 1;
                }
            }
        }

        let error = (summary.rejected > 0).then(|| format!("{} rows rejected", summary.rejected));
        self.finish_import_run(run_id, &summary, error.as_deref())?;

        info!(
            "Import done: {} persisted, {} already present, {} rejected",
            summary.persisted, summary.conflicts, summary.rejected
        );
        Ok(summary)
    }

    /// Insert one product with its lookups, associations and child rows.
    /// Nothing is left behind if any step fails.
    pub fn insert_product(&self, row: &ProductRow) -> Result<i64, RowError> {
        let tx = self.conn.unchecked_transaction()?;

        if product_exists(&tx, &row.reference)? {
            return Err(RowError::Conflict { reference: row.reference.clone() });
        }

        let category_id = row
            .main_category
            .as_deref()
            .map(|name| resolve(&tx, Lookup::Category, name))
            .transpose()?;

        let mut subcategory_ids = Vec::new();
        for name in row.present_subcategories() {
            subcategory_ids.push(resolve(&tx, Lookup::Subcategory, name)?);
        }
        let mut color_ids = Vec::new();
        for name in &row.colors {
            color_ids.push(resolve(&tx, Lookup::Color, name)?);
        }
        let mut size_ids = Vec::new();
        for name in &row.sizes {
            size_ids.push(resolve(&tx, Lookup::Size, name)?);
        }

        let price = parse_price(&row.price).ok_or_else(|| RowError::MalformedField {
            reference: row.reference.clone(),
            field: "price",
            value: row.price.clone(),
        })?;
        let discount = parse_discount(&row.discount).ok_or_else(|| RowError::MalformedField {
            reference: row.reference.clone(),
            field: "discount",
            value: row.discount.clone(),
        })?;

        let product_id: i64 = tx.query_row(
            r#"INSERT INTO products
                   (name, category_id, reference, price, discount, description,
                    specifications, position, page_number, imported_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               RETURNING id"#,
            params![
                row.name,
                category_id,
                row.reference,
                price,
                discount,
                row.description,
                serde_json::to_string(&row.specifications)?,
                row.position as i64,
                row.page_number as i64,
                Utc::now().naive_utc(),
            ],
            |r| r.get(0),
        )?;

        link_all(&tx, Lookup::Subcategory, product_id, &subcategory_ids)?;
        link_all(&tx, Lookup::Color, product_id, &color_ids)?;
        link_all(&tx, Lookup::Size, product_id, &size_ids)?;

        for url in &row.image_urls {
            tx.execute(
                "INSERT INTO images (product_id, url) VALUES (?, ?)",
                params![product_id, url],
            )?;
        }
        for text in &row.care_instructions {
            tx.execute(
                "INSERT INTO care_recommendations (product_id, recommendation) VALUES (?, ?)",
                params![product_id, text],
            )?;
        }

        tx.commit()?;
        Ok(product_id)
    }

    // ── Reads ─────────────────────────────────────────────────────────────────

    fn count(&self, table: &str) -> Result<i64> {
        let mut s = self.conn.prepare(&format!("SELECT COUNT(*) FROM {}", table))?;
        Ok(s.query_row([], |r| r.get(0))?)
    }

    pub fn table_counts(&self) -> Result<TableCounts> {
        Ok(TableCounts {
            products: self.count("products")?,
            categories: self.count("categories")?,
            subcategories: self.count("subcategories")?,
            colors: self.count("colors")?,
            sizes: self.count("sizes")?,
            images: self.count("images")?,
        })
    }

    /// Names linked to a product through one of the association tables.
    #[cfg(test)]
    pub fn product_lookup_names(&self, reference: &str, lookup: Lookup) -> Result<Vec<String>> {
        let table = lookup.table();
        let sql = match lookup.association() {
            Some((link_table, key)) => format!(
                "SELECT l.name FROM products p
                 JOIN {link_table} pl ON pl.product_id = p.id
                 JOIN {table} l ON l.id = pl.{key}
                 WHERE p.reference = ? ORDER BY l.name"
            ),
            None => format!(
                "SELECT l.name FROM products p
                 JOIN {table} l ON l.id = p.category_id
                 WHERE p.reference = ?"
            ),
        };
        let mut stmt = self.conn.prepare(&sql)?;
        let names = stmt
            .query_map(params![reference], |r| r.get(0))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(names)
    }

    // ── Import run log ────────────────────────────────────────────────────────

    fn begin_import_run(&self) -> Result<i64> {
        let id = self.conn.query_row(
            "INSERT INTO import_runs (started_at, status) VALUES (?, 'running') RETURNING id",
            params![Utc::now().naive_utc()],
            |r| r.get(0),
        )?;
        Ok(id)
    }

    fn finish_import_run(&self, run_id: i64, summary: &PersistSummary, error: Option<&str>) -> Result<()> {
        self.conn.execute(
            r#"UPDATE import_runs SET
               finished_at = ?, status = ?,
               rows_persisted = ?, rows_rejected = ?, error_msg = ?
               WHERE id = ?"#,
            params![
                Utc::now().naive_utc(),
                if error.is_none() { "success" } else { "partial" },
                summary.persisted as i64,
                summary.rejected as i64,
                error,
                run_id,
            ],
        )?;
        Ok(())
    }
}

fn product_exists(tx: &Transaction<'_>, reference: &str) -> Result<bool, RowError> {
    let n: i64 = tx.query_row(
        "SELECT COUNT(*) FROM products WHERE reference = ?",
        params![reference],
        |r| r.get(0),
    )?;
    Ok(n > 0)
}

/// Id of the lookup row called `name`, inserting it first if needed.
fn resolve(tx: &Transaction<'_>, lookup: Lookup, name: &str) -> Result<i64, RowError> {
    let table = lookup.table();
    tx.execute(
        &format!("INSERT INTO {} (name) VALUES (?) ON CONFLICT (name) DO NOTHING", table),
        params![name],
    )?;
    let id = tx.query_row(
        &format!("SELECT id FROM {} WHERE name = ?", table),
        params![name],
        |r| r.get(0),
    )?;
    Ok(id)
}

fn link_all(tx: &Transaction<'_>, lookup: Lookup, product_id: i64, ids: &[i64]) -> Result<(), RowError> {
    let Some((table, key)) = lookup.association() else { return Ok(()) };
    let sql = format!(
        "INSERT INTO {} (product_id, {}) VALUES (?, ?) ON CONFLICT DO NOTHING",
        table, key
    );
    for &id in ids {
        tx.execute(&sql, params![product_id, id])?;
    }
    Ok(())
}
