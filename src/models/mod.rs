use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Placeholder for a text field whose markup was absent on the page.
pub const UNAVAILABLE: &str = "unavailable";

/// Discount shown when a product page has no discount badge.
pub const NO_DISCOUNT: &str = "0%";

// ── Listing crawl ─────────────────────────────────────────────────────────────

/// One product URL discovered on a category listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProductLink {
    pub url: String,
    /// 1-based, global to the category crawl.
    pub position: u32,
    pub page_number: u32,
}

// ── Extracted product ─────────────────────────────────────────────────────────

/// Everything pulled off one product page, still in display form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductRecord {
    pub name: String,
    pub main_category: Option<String>,
    pub subcategories: Vec<String>,
    /// Business key.
    pub reference: String,
    pub price: String,     // raw, e.g. "$123.456"
    pub discount: String,  // raw, e.g. "20%"
    pub colors: Vec<String>,
    pub sizes: Vec<String>,
    pub description: String,
    pub specifications: BTreeMap<String, String>,
    pub care_instructions: Vec<String>,
    pub image_urls: Vec<String>,
    pub position: u32,
    pub page_number: u32,
}

impl ProductRecord {
    /// A record with every field at its documented default.
    pub fn empty(position: u32, page_number: u32) -> Self {
        Self {
            name: UNAVAILABLE.to_string(),
            main_category: None,
            subcategories: Vec::new(),
            reference: UNAVAILABLE.to_string(),
            price: UNAVAILABLE.to_string(),
            discount: NO_DISCOUNT.to_string(),
            colors: Vec::new(),
            sizes: Vec::new(),
            description: UNAVAILABLE.to_string(),
            specifications: BTreeMap::new(),
            care_instructions: Vec::new(),
            image_urls: Vec::new(),
            position,
            page_number,
        }
    }
}

// ── Normalized table ──────────────────────────────────────────────────────────

/// A flat, persistence-ready row. `subcategories` always has exactly
/// `NormalizedTable::subcategory_columns` slots.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductRow {
    pub name: String,
    pub main_category: Option<String>,
    pub subcategories: Vec<Option<String>>,
    pub reference: String,
    pub price: String,
    pub discount: String,
    pub colors: Vec<String>,
    pub sizes: Vec<String>,
    pub description: String,
    pub specifications: BTreeMap<String, String>,
    pub care_instructions: Vec<String>,
    pub image_urls: Vec<String>,
    pub position: u32,
    pub page_number: u32,
}

impl ProductRow {
    /// Subcategory names that are actually present, in ordinal order.
    pub fn present_subcategories(&self) -> impl Iterator<Item = &str> {
        self.subcategories.iter().filter_map(|s| s.as_deref())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedTable {
    pub subcategory_columns: usize,
    pub rows: Vec<ProductRow>,
    pub duplicates_removed: usize,
}

impl NormalizedTable {
    /// Column names in output order.
    pub fn headers(&self) -> Vec<String> {
        let mut headers = vec!["name".to_string(), "main_category".to_string()];
        headers.extend((1..=self.subcategory_columns).map(|i| format!("subcategory_{}", i)));
        headers.extend(
            [
                "reference",
                "price",
                "discount",
                "colors",
                "sizes",
                "description",
                "specifications",
                "care_instructions",
                "image_urls",
                "position",
                "page_number",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        headers
    }
}
