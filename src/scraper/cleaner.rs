//! Turns display strings from product pages into numbers for the sink.

fn is_blank(s: &str) -> bool {
    s.is_empty() || s == "-" || s == "—" || s.eq_ignore_ascii_case("n/a")
}

/// Parse a Colombian-peso display price.
/// "$123.456" → 123456 | "$ 1.299.900" → 1299900 | "$89.900,50" → 89900.5
///
/// Dots are thousands separators and a comma marks decimals.
pub fn parse_price(s: &str) -> Option<f64> {
    let s = s.trim();
    if is_blank(s) {
        return None;
    }
    let kept: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    if !kept.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    kept.replace('.', "").replace(',', ".").parse().ok()
}

/// "20%" → 20.0 | "-15 %" → 15.0 | "0%" → 0.0
///
/// Discount badges sometimes carry a leading minus; the stored value is the
/// magnitude.
pub fn parse_discount(s: &str) -> Option<f64> {
    let s = s.trim().replace('%', "").replace(',', ".");
    let s = s.trim().trim_start_matches('-').trim();
    if is_blank(s) {
        return None;
    }
    s.parse::<f64>().ok().filter(|d| (0.0..=100.0).contains(d))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
