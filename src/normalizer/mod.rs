//! Batch reshaping of extracted records into the flat output table.
//!
//! Three passes, none of which can fail:
//!   1. drop repeated references (first seen wins)
//!   2. spread subcategories over a fixed number of ordinal columns
//!   3. split and tidy size tokens

use crate::models::{NormalizedTable, ProductRecord, ProductRow};
use std::collections::HashSet;
use tracing::{debug, info};

pub fn normalize(records: Vec<ProductRecord>, subcategory_columns: usize) -> NormalizedTable {
    let (records, duplicates_removed) = dedup_by_reference(records);

    let rows = records
        .into_iter()
        .map(|r| {
            if r.subcategories.len() > subcategory_columns {
                debug!(
                    "{}: {} subcategories, keeping the first {}",
                    r.reference,
                    r.subcategories.len(),
                    subcategory_columns
                );
            }
            ProductRow {
                subcategories: flatten_subcategories(&r.subcategories, subcategory_columns),
                colors: unique(r.colors),
                sizes: expand_sizes(&r.sizes),
                name: r.name,
                main_category: r.main_category,
                reference: r.reference,
                price: r.price,
                discount: r.discount,
                description: r.description,
                specifications: r.specifications,
                care_instructions: r.care_instructions,
                image_urls: r.image_urls,
                position: r.position,
                page_number: r.page_number,
            }
        })
        .collect::<Vec<_>>();

    info!("Normalized {} rows ({} duplicates removed)", rows.len(), duplicates_removed);

    NormalizedTable { subcategory_columns, rows, duplicates_removed }
}

/// Keep the first record for each reference. Returns the survivors and how
/// many were dropped.
pub fn dedup_by_reference(records: Vec<ProductRecord>) -> (Vec<ProductRecord>, usize) {
    let before = records.len();
    let mut seen = HashSet::new();
    let kept: Vec<ProductRecord> = records
        .into_iter()
        .filter(|r| seen.insert(r.reference.clone()))
        .collect();
    let removed = before - kept.len();
    (kept, removed)
}

pub fn flatten_subcategories(subcategories: &[String], columns: usize) -> Vec<Option<String>> {
    (0..columns).map(|i| subcategories.get(i).cloned()).collect()
}

/// Cleaned size values for one token.
/// "08" → ["8"] | "10-12" → ["10", "12"] | "S/M" → ["S", "M"] | "XL" → ["XL"]
pub fn clean_size_token(token: &str) -> Vec<String> {
    let token = token.trim();
    let parts: Vec<&str> = if token.contains('-') {
        token.split('-').collect()
    } else if token.contains('/') {
        token.split('/').collect()
    } else {
        vec![token]
    };

    parts
        .into_iter()
        .map(|p| strip_leading_zero(p.trim()))
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// "08" → "8"; anything else is returned as is.
fn strip_leading_zero(s: &str) -> &str {
    let mut chars = s.chars();
    match (chars.next(), chars.next(), chars.next()) {
        (Some('0'), Some(d), None) if d.is_ascii_digit() => &s[1..],
        _ => s,
    }
}

/// All cleaned sizes for a product, first occurrence order, no repeats.
pub fn expand_sizes(tokens: &[String]) -> Vec<String> {
    unique(tokens.iter().flat_map(|t| clean_size_token(t)))
}

fn unique(values: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    values.into_iter().filter(|v| seen.insert(v.clone())).collect()
}
