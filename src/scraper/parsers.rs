use crate::models::{ProductRecord, UNAVAILABLE};
use crate::scraper::selectors::{self, Field, FieldRule, TextMode, TEXT_FIELDS};
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;
use tracing::debug;
use url::Url;

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn collapsed_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn joined_text(el: ElementRef<'_>) -> String {
    el.text().map(str::trim).collect()
}

fn fragment_text(el: ElementRef<'_>) -> String {
    el.text()
        .map(str::trim)
        .filter(|part| !part.is_empty() && !part.contains(selectors::DESCRIPTION_TOGGLE))
        .collect::<Vec<_>>()
        .join(" ")
}

// ── Product page ──────────────────────────────────────────────────────────────

/// Turn a product page into a record. Never fails: each field falls back to
/// its documented default when the markup is missing.
pub fn extract_product(html: &str, position: u32, page_number: u32) -> ProductRecord {
    let doc = Html::parse_document(html);
    let mut record = ProductRecord::empty(position, page_number);

    for rule in TEXT_FIELDS {
        let value = read_field(&doc, rule);
        match rule.field {
            Field::Name => record.name = value,
            Field::Reference => record.reference = value,
            Field::Price => record.price = value,
            Field::Discount => record.discount = value,
            Field::Description => record.description = value,
        }
    }

    let mut trail = breadcrumb(&doc).into_iter();
    record.main_category = trail.next();
    record.subcategories = trail.collect();

    record.specifications = specifications(&doc);
    record.care_instructions = list_items(&doc, selectors::CARE_ITEMS);
    record.image_urls = image_urls(&doc);
    record.colors = sku_options(&doc, selectors::COLOR_GROUP);
    record.sizes = sku_options(&doc, selectors::SIZE_GROUP);

    record
}

fn read_field(doc: &Html, rule: &FieldRule) -> String {
    let found = selector(rule.locator).and_then(|sel| {
        doc.select(&sel).next().map(|el| match rule.mode {
            TextMode::Collapsed => collapsed_text(el),
            TextMode::Fragments => fragment_text(el),
            TextMode::Joined => joined_text(el),
        })
    });

    found.unwrap_or_else(|| {
        debug!("{:?} not on page, using {:?}", rule.field, rule.default);
        rule.default.to_string()
    })
}

/// Non-empty breadcrumb labels, outermost first.
fn breadcrumb(doc: &Html) -> Vec<String> {
    let Some(sel) = selector(selectors::BREADCRUMB_LINKS) else { return vec![] };
    doc.select(&sel)
        .map(collapsed_text)
        .filter(|label| !label.is_empty())
        .collect()
}

/// "Label: value" rows. Rows without a colon are not specifications.
fn specifications(doc: &Html) -> BTreeMap<String, String> {
    list_items(doc, selectors::SPEC_ITEMS)
        .into_iter()
        .filter_map(|line| {
            let (key, value) = line.split_once(':')?;
            Some((key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

fn list_items(doc: &Html, css: &str) -> Vec<String> {
    let Some(sel) = selector(css) else { return vec![] };
    doc.select(&sel)
        .map(|li| li.text().collect::<String>().trim().to_string())
        .collect()
}

/// Gallery image URLs with the resize query string removed.
fn image_urls(doc: &Html) -> Vec<String> {
    let Some(sel) = selector(selectors::GALLERY_IMAGES) else { return vec![] };
    doc.select(&sel)
        .filter_map(|img| img.value().attr("src"))
        .filter_map(|src| src.split('?').next())
        .filter(|base| !base.is_empty())
        .map(str::to_string)
        .collect()
}

/// Labels of the options in one SKU selector group that can still be picked.
fn sku_options(doc: &Html, group_css: &str) -> Vec<String> {
    let (Some(group_sel), Some(option_sel), Some(label_sel)) = (
        selector(group_css),
        selector(selectors::SKU_OPTION),
        selector(selectors::SKU_OPTION_LABEL),
    ) else {
        return vec![];
    };
    let Some(group) = doc.select(&group_sel).next() else { return vec![] };

    group
        .select(&option_sel)
        .filter(|option| is_selectable(*option))
        .map(|option| {
            option
                .select(&label_sel)
                .next()
                .map(collapsed_text)
                .unwrap_or_else(|| UNAVAILABLE.to_string())
        })
        .collect()
}

fn is_selectable(option: ElementRef<'_>) -> bool {
    let crossed_out = std::iter::once(option)
        .chain(option.descendants().filter_map(ElementRef::wrap))
        .any(|el| el.value().classes().any(|c| c == selectors::CROSSED_OUT_CLASS));
    let disabled_class = option.value().classes().any(|c| c == selectors::DISABLED_CLASS);
    let disabled_attr = option.value().attr("aria-disabled") == Some("true")
        || option.value().attr("disabled").is_some();

    !(crossed_out || disabled_class || disabled_attr)
}

// ── Listing page ──────────────────────────────────────────────────────────────

#[derive(Debug, Default, PartialEq)]
pub struct ListingPage {
    /// Product hrefs as written in the markup, in page order.
    pub product_hrefs: Vec<String>,
    pub next_href: Option<String>,
}

pub fn parse_listing_page(html: &str) -> ListingPage {
    let doc = Html::parse_document(html);
    let mut page = ListingPage::default();

    if let Some(sel) = selector(selectors::PRODUCT_ANCHOR) {
        page.product_hrefs = doc
            .select(&sel)
            .filter_map(|a| a.value().attr("href"))
            .map(str::trim)
            .filter(|href| !href.is_empty())
            .map(str::to_string)
            .collect();
    }

    if let Some(sel) = selector(selectors::NEXT_PAGE_ANCHOR) {
        page.next_href = doc
            .select(&sel)
            .filter_map(|a| a.value().attr("href"))
            .next()
            .map(str::to_string);
    }

    page
}

/// Absolute URL for a product href found on a listing.
pub fn resolve_url(base: &Url, href: &str) -> Option<String> {
    base.join(href).ok().map(String::from)
}

/// URL of the next listing page.
///
/// A bare query (`?page=2`) replaces the current query string; anything else
/// is resolved like a normal link so absolute targets work too.
pub fn next_page_url(current: &str, href: &str) -> Option<String> {
    if href.starts_with('?') {
        let base = current.split(['?', '#']).next().unwrap_or(current);
        return Some(format!("{}{}", base, href));
    }
    Url::parse(current).ok()?.join(href).ok().map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRODUCT_PAGE: &str = r##"
    <html><body>
      <div data-testid="breadcrumb">
        <a href="/">Hombre</a><a href="/hombre/camisas">Camisas</a>
        <a href="#"> </a><a href="/hombre/camisas/formales">Formales</a>
      </div>
      <span class="vtex-store-components-3-x-productBrand">Camisa   Oxford
        Slim</span>
      <span class="vtex-product-identifier-0-x-product-identifier__value">10123456</span>
      <span class="vtex-product-price-1-x-sellingPriceValue"><span>$</span><span>&nbsp;</span><span>189</span><span>.</span><span>900</span></span>
      <div class="vtex-store-components-3-x-discountContainer">
        <div class="vtex-store-components-3-x-discountInsideContainer">20%</div>
      </div>
      <div class="vtex-store-components-3-x-productDescriptionText">
        <p>Camisa en algodón.</p><p>Corte slim.</p><button>Mostrar más</button>
      </div>
      <table><tr>
        <td class="vtex-store-components-3-x-specificationItemSpecifications--especificacionesdeta">
          <ul><li>Material: 100% algodón</li><li>Sin separador</li><li>Fit: Slim: moderno</li></ul>
        </td>
        <td class="vtex-store-components-3-x-specificationItemSpecifications--especificacionesapli">
          <ul><li> Lavar a mano </li><li>No usar blanqueador</li></ul>
        </td>
      </tr></table>
      <div class="vtex-store-components-3-x-carouselGaleryCursor">
        <img class="vtex-store-components-3-x-productImageTag" src="https://cdn.example/a.jpg?width=300&height=400">
        <img class="vtex-store-components-3-x-productImageTag" src="https://cdn.example/b.jpg">
        <img class="other" src="https://cdn.example/thumb.jpg">
      </div>
      <div class="vtex-store-components-3-x-skuSelectorSubcontainer--colores">
        <div class="vtex-store-components-3-x-skuSelectorItem">
          <div class="vtex-store-components-3-x-skuSelectorItemTextValue">Azul</div>
        </div>
        <div class="vtex-store-components-3-x-skuSelectorItem vtex-store-components-3-x-skuSelectorItem--disabled">
          <div class="vtex-store-components-3-x-skuSelectorItemTextValue">Rojo</div>
        </div>
        <div class="vtex-store-components-3-x-skuSelectorItem"></div>
      </div>
      <div class="vtex-store-components-3-x-skuSelectorSubcontainer--talla">
        <div class="vtex-store-components-3-x-skuSelectorItem">
          <div class="vtex-store-components-3-x-skuSelectorItemTextValue">S</div>
        </div>
        <div class="vtex-store-components-3-x-skuSelectorItem vtex-store-components-3-x-diagonalCross">
          <div class="vtex-store-components-3-x-skuSelectorItemTextValue">M</div>
        </div>
        <div class="vtex-store-components-3-x-skuSelectorItem" aria-disabled="true">
          <div class="vtex-store-components-3-x-skuSelectorItemTextValue">L</div>
        </div>
        <div class="vtex-store-components-3-x-skuSelectorItem">
          <div class="vtex-store-components-3-x-skuSelectorItemTextValue">XL</div>
          <div class="vtex-store-components-3-x-diagonalCross"></div>
        </div>
        <div class="vtex-store-components-3-x-skuSelectorItem">
          <div class="vtex-store-components-3-x-skuSelectorItemTextValue">08</div>
        </div>
        <div class="vtex-store-components-3-x-skuSelectorItem" disabled>
          <div class="vtex-store-components-3-x-skuSelectorItemTextValue">XXL</div>
        </div>
      </div>
    </body></html>
    "##;

    #[test]
    fn extracts_every_field() {
        let r = extract_product(PRODUCT_PAGE, 3, 1);
        assert_eq!(r.name, "Camisa Oxford Slim");
        assert_eq!(r.main_category.as_deref(), Some("Hombre"));
        assert_eq!(r.subcategories, ["Camisas", "Formales"]);
        assert_eq!(r.reference, "10123456");
        assert_eq!(r.price, "$189.900");
        assert_eq!(r.discount, "20%");
        assert_eq!(r.description, "Camisa en algodón. Corte slim.");
        assert_eq!(r.care_instructions, ["Lavar a mano", "No usar blanqueador"]);
        assert_eq!(r.image_urls, ["https://cdn.example/a.jpg", "https://cdn.example/b.jpg"]);
        assert_eq!((r.position, r.page_number), (3, 1));
    }

    #[test]
    fn split_price_spans_keep_raw_display_form() {
        let html = r#"<span class="vtex-product-price-1-x-sellingPriceValue">
            <span>$</span><span>&nbsp;</span><span>1</span><span>.</span><span>299</span><span>.</span><span>900</span>
        </span>
        <span class="vtex-product-identifier-0-x-product-identifier__value">
            10123
        </span>"#;
        let r = extract_product(html, 1, 1);
        assert_eq!(r.price, "$1.299.900");
        assert_eq!(r.reference, "10123");
    }

    #[test]
    fn specification_rows_split_on_first_colon() {
        let r = extract_product(PRODUCT_PAGE, 1, 1);
        assert_eq!(r.specifications.len(), 2);
        assert_eq!(r.specifications["Material"], "100% algodón");
        assert_eq!(r.specifications["Fit"], "Slim: moderno");
    }

    #[test]
    fn disabled_options_are_dropped() {
        let r = extract_product(PRODUCT_PAGE, 1, 1);
        assert_eq!(r.colors, ["Azul", UNAVAILABLE]);
        assert_eq!(r.sizes, ["S", "08"]);
    }

    #[test]
    fn missing_price_yields_sentinel() {
        let html = PRODUCT_PAGE.replace("sellingPriceValue", "somethingElse");
        let r = extract_product(&html, 1, 1);
        assert_eq!(r.price, UNAVAILABLE);
        assert_eq!(r.name, "Camisa Oxford Slim");
    }

    #[test]
    fn blank_page_yields_all_defaults() {
        let r = extract_product("<html><body><p>Mantenimiento</p></body></html>", 9, 4);
        assert_eq!(r, ProductRecord::empty(9, 4));
    }

    #[test]
    fn missing_discount_defaults_to_zero() {
        let html = PRODUCT_PAGE.replace("discountContainer", "promoBanner");
        assert_eq!(extract_product(&html, 1, 1).discount, "0%");
    }

    const LISTING: &str = r#"
      <div>
        <a class="vtex-product-summary-2-x-clearLink" href="/camisa-oxford/p">x</a>
        <a class="vtex-product-summary-2-x-clearLink" href="/pantalon/p">y</a>
        <a class="vtex-product-summary-2-x-clearLink">no href</a>
        <a href="?page=2">Mostrar más</a>
      </div>"#;

    #[test]
    fn listing_collects_anchors_and_next_link() {
        let page = parse_listing_page(LISTING);
        assert_eq!(page.product_hrefs, ["/camisa-oxford/p", "/pantalon/p"]);
        assert_eq!(page.next_href.as_deref(), Some("?page=2"));
    }

    #[test]
    fn listing_without_next_link() {
        let page = parse_listing_page(r#"<a class="vtex-product-summary-2-x-clearLink" href="/a/p">a</a>"#);
        assert_eq!(page.next_href, None);
    }

    #[test]
    fn resolves_relative_product_hrefs() {
        let base = Url::parse("https://www.arturocalle.com").unwrap();
        assert_eq!(
            resolve_url(&base, "/camisa-oxford/p").as_deref(),
            Some("https://www.arturocalle.com/camisa-oxford/p")
        );
        assert_eq!(
            resolve_url(&base, "https://other.example/x").as_deref(),
            Some("https://other.example/x")
        );
    }

    #[test]
    fn next_page_url_replaces_query() {
        assert_eq!(
            next_page_url("https://shop.example/hombre?page=2", "?page=3").as_deref(),
            Some("https://shop.example/hombre?page=3")
        );
        assert_eq!(
            next_page_url("https://shop.example/hombre", "?page=2").as_deref(),
            Some("https://shop.example/hombre?page=2")
        );
    }

    #[test]
    fn next_page_url_handles_absolute_targets() {
        assert_eq!(
            next_page_url("https://shop.example/hombre?page=2", "https://shop.example/woman?page=1").as_deref(),
            Some("https://shop.example/woman?page=1")
        );
        assert_eq!(
            next_page_url("https://shop.example/hombre", "/hombre?page=5").as_deref(),
            Some("https://shop.example/hombre?page=5")
        );
    }
}
