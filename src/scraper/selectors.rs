//! CSS locators for the VTEX storefront markup.
//!
//! Every scalar field on a product page is one [`FieldRule`]: where to look
//! and what to substitute when nothing is there. When the storefront markup
//! changes, this file is the only one that should need editing.

use crate::models::{NO_DISCOUNT, UNAVAILABLE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Name,
    Reference,
    Price,
    Discount,
    Description,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextMode {
    /// Whitespace-collapsed text of the whole element.
    Collapsed,
    /// Non-empty text fragments joined by a space, dropping UI toggles.
    Fragments,
    /// Trimmed text fragments glued together. Prices render each digit
    /// group in its own span.
    Joined,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    pub field: Field,
    pub locator: &'static str,
    pub mode: TextMode,
    pub default: &'static str,
}

pub const TEXT_FIELDS: &[FieldRule] = &[
    FieldRule {
        field: Field::Name,
        locator: "span.vtex-store-components-3-x-productBrand",
        mode: TextMode::Collapsed,
        default: UNAVAILABLE,
    },
    FieldRule {
        field: Field::Reference,
        locator: "span.vtex-product-identifier-0-x-product-identifier__value",
        mode: TextMode::Joined,
        default: UNAVAILABLE,
    },
    FieldRule {
        field: Field::Price,
        locator: "span.vtex-product-price-1-x-sellingPriceValue",
        mode: TextMode::Joined,
        default: UNAVAILABLE,
    },
    FieldRule {
        field: Field::Discount,
        locator: "div.vtex-store-components-3-x-discountContainer div.vtex-store-components-3-x-discountInsideContainer",
        mode: TextMode::Joined,
        default: NO_DISCOUNT,
    },
    FieldRule {
        field: Field::Description,
        locator: "div.vtex-store-components-3-x-productDescriptionText",
        mode: TextMode::Fragments,
        default: UNAVAILABLE,
    },
];

/// Label of the "show more" toggle inside the description block.
pub const DESCRIPTION_TOGGLE: &str = "Mostrar más";

pub const BREADCRUMB_LINKS: &str = r#"div[data-testid="breadcrumb"] a"#;

pub const SPEC_ITEMS: &str =
    "td.vtex-store-components-3-x-specificationItemSpecifications--especificacionesdeta li";
pub const CARE_ITEMS: &str =
    "td.vtex-store-components-3-x-specificationItemSpecifications--especificacionesapli li";

pub const GALLERY_IMAGES: &str =
    "div.vtex-store-components-3-x-carouselGaleryCursor img.vtex-store-components-3-x-productImageTag";

// ── SKU selectors (colours / sizes) ──────────────────────────────────────────

pub const COLOR_GROUP: &str = "div.vtex-store-components-3-x-skuSelectorSubcontainer--colores";
pub const SIZE_GROUP: &str = "div.vtex-store-components-3-x-skuSelectorSubcontainer--talla";
pub const SKU_OPTION: &str = "div.vtex-store-components-3-x-skuSelectorItem";
pub const SKU_OPTION_LABEL: &str = "div.vtex-store-components-3-x-skuSelectorItemTextValue";

/// Any of these classes on an option means it cannot be picked.
pub const CROSSED_OUT_CLASS: &str = "vtex-store-components-3-x-diagonalCross";
pub const DISABLED_CLASS: &str = "vtex-store-components-3-x-skuSelectorItem--disabled";

// ── Listing pages ────────────────────────────────────────────────────────────

pub const PRODUCT_ANCHOR: &str = "a.vtex-product-summary-2-x-clearLink";
pub const NEXT_PAGE_ANCHOR: &str = r#"a[href*="page="]"#;

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Selector;

    #[test]
    fn every_locator_parses() {
        let fixed = [
            BREADCRUMB_LINKS,
            SPEC_ITEMS,
            CARE_ITEMS,
            GALLERY_IMAGES,
            COLOR_GROUP,
            SIZE_GROUP,
            SKU_OPTION,
            SKU_OPTION_LABEL,
            PRODUCT_ANCHOR,
            NEXT_PAGE_ANCHOR,
        ];
        for css in TEXT_FIELDS.iter().map(|r| r.locator).chain(fixed) {
            assert!(Selector::parse(css).is_ok(), "bad selector: {}", css);
        }
    }

    #[test]
    fn one_rule_per_field() {
        for field in [Field::Name, Field::Reference, Field::Price, Field::Discount, Field::Description] {
            assert_eq!(TEXT_FIELDS.iter().filter(|r| r.field == field).count(), 1);
        }
    }
}
